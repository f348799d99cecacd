//! Dataset identity: content hashing and variable name resolution

use std::fmt::Write as _;
use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float16Type, Float32Type, Float64Type};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::frame::{Frame, FrameError};

/// Rows fingerprinted per rayon task
const HASH_CHUNK_ROWS: usize = 4096;

const FIELD_SEP: u8 = 0x1f;
const NULL_MARK: u8 = 0x00;
const VALUE_MARK: u8 = 0x01;

/// Hex encoded SHA-256 over the frame's schema and per-row fingerprints.
///
/// Each row fingerprint is the first 8 bytes of a SHA-256 over the index
/// label and every cell, so any value change or row reordering changes the
/// result. Cells are length-prefixed. Float NaN hashes as null, since query
/// engines hand NaN back as null.
pub fn content_hash(frame: &Frame) -> Result<String, FrameError> {
    let num_rows = frame.num_rows();
    let chunks: Vec<(usize, usize)> = (0..num_rows)
        .step_by(HASH_CHUNK_ROWS)
        .map(|start| (start, (start + HASH_CHUNK_ROWS).min(num_rows)))
        .collect();

    let fingerprints = chunks
        .par_iter()
        .map(|&(start, end)| fingerprint_rows(frame, start, end))
        .collect::<Result<Vec<_>, FrameError>>()?;

    let mut hasher = Sha256::new();
    for field in frame.schema().fields() {
        hasher.update(field.name().as_bytes());
        hasher.update([FIELD_SEP]);
        hasher.update(field.data_type().to_string().as_bytes());
        hasher.update([FIELD_SEP]);
    }
    hasher.update(frame.index_name().unwrap_or_default().as_bytes());
    hasher.update([FIELD_SEP]);
    for chunk in fingerprints {
        for fingerprint in chunk {
            hasher.update(fingerprint);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

fn fingerprint_rows(frame: &Frame, start: usize, end: usize) -> Result<Vec<[u8; 8]>, FrameError> {
    let options = FormatOptions::default();
    let mut arrays: Vec<&dyn Array> = Vec::with_capacity(frame.num_columns() + 1);
    arrays.push(frame.index().as_ref());
    arrays.extend(frame.batch().columns().iter().map(|c| c.as_ref()));

    let formatters = arrays
        .iter()
        .map(|array| ArrayFormatter::try_new(*array, &options))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(end - start);
    let mut buf = String::new();
    for row in start..end {
        let mut hasher = Sha256::new();
        for (array, formatter) in arrays.iter().zip(&formatters) {
            if is_missing(*array, row) {
                hasher.update([NULL_MARK]);
            } else {
                buf.clear();
                // Writing into a String cannot fail
                let _ = write!(buf, "{}", formatter.value(row));
                hasher.update([VALUE_MARK]);
                hasher.update((buf.len() as u64).to_le_bytes());
                hasher.update(buf.as_bytes());
            }
            hasher.update([FIELD_SEP]);
        }
        let digest = hasher.finalize();
        let mut fingerprint = [0u8; 8];
        fingerprint.copy_from_slice(&digest[..8]);
        out.push(fingerprint);
    }
    Ok(out)
}

fn is_missing(array: &dyn Array, row: usize) -> bool {
    if array.is_null(row) {
        return true;
    }
    match array.data_type() {
        DataType::Float16 => array.as_primitive::<Float16Type>().value(row).is_nan(),
        DataType::Float32 => array.as_primitive::<Float32Type>().value(row).is_nan(),
        DataType::Float64 => array.as_primitive::<Float64Type>().value(row).is_nan(),
        _ => false,
    }
}

/// Host capability that maps a frame to the name it is bound to
pub trait NameResolver {
    /// Best matching live binding for `frame`, if any
    fn resolve(&self, frame: &Frame) -> Option<String>;
}

/// Snapshot of the host namespace, oldest binding first
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, Arc<Frame>)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a binding; later bindings are considered more recent
    pub fn bind(&mut self, name: impl Into<String>, frame: Arc<Frame>) {
        self.entries.push((name.into(), frame));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NameResolver for Bindings {
    fn resolve(&self, frame: &Frame) -> Option<String> {
        let matches: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, value)| std::ptr::eq(value.as_ref(), frame) || value.as_ref() == frame)
            .map(|(name, _)| name.as_str())
            .collect();

        // Underscore names are REPL history references
        matches
            .iter()
            .rev()
            .find(|name| !name.starts_with('_'))
            .or_else(|| matches.last())
            .map(|name| name.to_string())
    }
}

/// Name for `frame`, or a fresh `unk_dataframe_<hex>` placeholder
pub fn resolve_variable_name(frame: &Frame, resolver: &dyn NameResolver) -> String {
    resolver
        .resolve(frame)
        .unwrap_or_else(|| format!("unk_dataframe_{}", Uuid::new_v4().simple()))
}
