//! Display registry
//!
//! Maps display slots to tracked datasets, content hashes to display slots,
//! and subset hashes back to the slot of the dataset they were filtered from.
//! One registry lives for the whole kernel session and is shared by the
//! formatter and the resample controller. Every public operation runs as a
//! single critical section, except that [`DisplayRegistry::register`] calls
//! the host name resolver with the lock released.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHashMap;
use arrow::array::Array;
use arrow::datatypes::DataType;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::filter::FilterSpec;
use crate::frame::{Frame, FrameDimensions, FrameError};
use crate::identity::{content_hash, resolve_variable_name, NameResolver};

/// Errors raised by registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown display slot '{0}'")]
    UnknownSlot(String),

    #[error("Failed to hash dataset: {0}")]
    Hash(#[from] FrameError),
}

/// One resample, as recorded in a dataset's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSnapshot {
    pub timestamp: DateTime<Utc>,
    pub filters: Vec<FilterSpec>,
    pub dimensions: FrameDimensions,
}

/// Bookkeeping for a top-level dataset that has been displayed
#[derive(Debug, Clone)]
pub struct TrackedDataset {
    pub id: Uuid,
    pub display_slot: String,
    pub content_hash: String,
    pub variable_name: String,
    /// Query-engine table holding the full dataset
    pub table_name: String,
    pub original_column_types: IndexMap<String, DataType>,
    pub index_name: Option<String>,
    pub index_type: DataType,
    pub original_dimensions: FrameDimensions,
    pub applied_filters: Vec<FilterSpec>,
    pub sample_history: VecDeque<SampleSnapshot>,
    pub created_at: DateTime<Utc>,
}

/// How a registered frame was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A new tracked dataset was created
    New,
    /// The frame has the same content as an already tracked dataset
    Existing,
    /// The frame is a known subset of a tracked dataset
    Subset,
}

/// Result of [`DisplayRegistry::register`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub display_slot: String,
    pub content_hash: String,
    pub resolution: Resolution,
}

impl Registration {
    pub fn is_new(&self) -> bool {
        self.resolution == Resolution::New
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SubsetLink {
    parent_slot: String,
    cell_id: Option<String>,
}

#[derive(Default)]
struct RegistryState {
    slot_to_dataset: AHashMap<String, TrackedDataset>,
    hash_to_slot: AHashMap<String, String>,
    subset_hash_to_parent: AHashMap<String, SubsetLink>,
}

/// Session-wide registry of displayed datasets
pub struct DisplayRegistry {
    state: Mutex<RegistryState>,
    history_depth: AtomicUsize,
}

impl DisplayRegistry {
    /// Create a registry keeping `history_depth` resample snapshots per dataset
    pub fn new(history_depth: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            history_depth: AtomicUsize::new(history_depth),
        }
    }

    /// Resolve `frame` to a display slot, tracking it if it is new.
    ///
    /// Known subsets resolve to their parent's slot and frames identical to a
    /// tracked dataset resolve to that dataset's slot; neither creates a new
    /// record. The variable name is only resolved for new datasets.
    pub fn register(
        &self,
        frame: &Frame,
        resolver: &dyn NameResolver,
    ) -> Result<Registration, RegistryError> {
        let hash = content_hash(frame)?;
        let known = Self::resolve_known(&self.state.lock(), &hash);
        if let Some(registration) = known {
            return Ok(registration);
        }

        // The resolver is host code and may call back into the registry
        let variable_name = resolve_variable_name(frame, resolver);

        let mut state = self.state.lock();
        if let Some(registration) = Self::resolve_known(&state, &hash) {
            return Ok(registration);
        }

        let display_slot = Uuid::new_v4().to_string();
        let dataset = TrackedDataset {
            id: Uuid::new_v4(),
            display_slot: display_slot.clone(),
            content_hash: hash.clone(),
            table_name: format!("{}_{}", variable_name, hash),
            variable_name,
            original_column_types: frame.column_types(),
            index_name: frame.index_name().map(str::to_string),
            index_type: frame.index().data_type().clone(),
            original_dimensions: FrameDimensions {
                size_bytes: 0,
                num_rows: frame.num_rows(),
                num_cols: frame.num_columns(),
            },
            applied_filters: Vec::new(),
            sample_history: VecDeque::with_capacity(self.history_depth()),
            created_at: Utc::now(),
        };

        debug!(
            "Tracking '{}' ({}x{}) at slot {}",
            dataset.variable_name,
            frame.num_rows(),
            frame.num_columns(),
            display_slot
        );
        state.hash_to_slot.insert(hash.clone(), display_slot.clone());
        state.slot_to_dataset.insert(display_slot.clone(), dataset);

        Ok(Registration {
            display_slot,
            content_hash: hash,
            resolution: Resolution::New,
        })
    }

    fn resolve_known(state: &RegistryState, hash: &str) -> Option<Registration> {
        if let Some(link) = state.subset_hash_to_parent.get(hash) {
            debug!("Frame {} is a subset of slot {}", hash, link.parent_slot);
            return Some(Registration {
                display_slot: link.parent_slot.clone(),
                content_hash: hash.to_string(),
                resolution: Resolution::Subset,
            });
        }

        state.hash_to_slot.get(hash).map(|slot| {
            debug!("Frame {} already tracked at slot {}", hash, slot);
            Registration {
                display_slot: slot.clone(),
                content_hash: hash.to_string(),
                resolution: Resolution::Existing,
            }
        })
    }

    /// Record that `subset_hash` was produced by filtering the dataset at
    /// `parent_slot`.
    ///
    /// Re-linking to the same parent is a no-op and re-linking to another
    /// parent overwrites the previous link. Hashes of tracked top-level
    /// datasets are never linked; returns whether a link is in place.
    pub fn link_subset(
        &self,
        subset_hash: &str,
        parent_slot: &str,
        cell_id: Option<&str>,
    ) -> Result<bool, RegistryError> {
        let mut state = self.state.lock();

        if !state.slot_to_dataset.contains_key(parent_slot) {
            return Err(RegistryError::UnknownSlot(parent_slot.to_string()));
        }
        if state.hash_to_slot.contains_key(subset_hash) {
            debug!("Not linking {}: it is a tracked dataset", subset_hash);
            return Ok(false);
        }

        let link = SubsetLink {
            parent_slot: parent_slot.to_string(),
            cell_id: cell_id.map(str::to_string),
        };
        match state.subset_hash_to_parent.insert(subset_hash.to_string(), link) {
            Some(previous) if previous.parent_slot != parent_slot => {
                warn!(
                    "Subset {} moved from slot {} to slot {}",
                    subset_hash, previous.parent_slot, parent_slot
                );
            }
            _ => {}
        }
        Ok(true)
    }

    /// Append a resample snapshot and replace the applied filters
    pub fn record_sample(
        &self,
        slot: &str,
        filters: Vec<FilterSpec>,
        dimensions: FrameDimensions,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        let dataset = state
            .slot_to_dataset
            .get_mut(slot)
            .ok_or_else(|| RegistryError::UnknownSlot(slot.to_string()))?;

        dataset.sample_history.push_back(SampleSnapshot {
            timestamp: Utc::now(),
            filters: filters.clone(),
            dimensions,
        });
        let depth = self.history_depth();
        while dataset.sample_history.len() > depth {
            dataset.sample_history.pop_front();
        }
        dataset.applied_filters = filters;
        Ok(())
    }

    /// Change the variable name reported for a slot
    pub fn rename(&self, slot: &str, variable_name: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        let dataset = state
            .slot_to_dataset
            .get_mut(slot)
            .ok_or_else(|| RegistryError::UnknownSlot(slot.to_string()))?;
        dataset.variable_name = variable_name.to_string();
        Ok(())
    }

    /// Store the estimated size of the full dataset once it is known
    pub fn set_original_size(&self, slot: &str, size_bytes: usize) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        let dataset = state
            .slot_to_dataset
            .get_mut(slot)
            .ok_or_else(|| RegistryError::UnknownSlot(slot.to_string()))?;
        dataset.original_dimensions.size_bytes = size_bytes;
        Ok(())
    }

    /// Stop tracking `slot`, dropping its hash and any subsets linked to it
    pub fn remove(&self, slot: &str) -> Option<TrackedDataset> {
        let mut state = self.state.lock();
        let dataset = state.slot_to_dataset.remove(slot)?;
        state.hash_to_slot.remove(&dataset.content_hash);
        state
            .subset_hash_to_parent
            .retain(|_, link| link.parent_slot != slot);
        Some(dataset)
    }

    /// Snapshot of the dataset tracked at `slot`
    pub fn get(&self, slot: &str) -> Option<TrackedDataset> {
        self.state.lock().slot_to_dataset.get(slot).cloned()
    }

    pub fn slot_for_hash(&self, hash: &str) -> Option<String> {
        self.state.lock().hash_to_slot.get(hash).cloned()
    }

    /// Parent slot and originating cell of a known subset
    pub fn parent_of_subset(&self, subset_hash: &str) -> Option<(String, Option<String>)> {
        self.state
            .lock()
            .subset_hash_to_parent
            .get(subset_hash)
            .map(|link| (link.parent_slot.clone(), link.cell_id.clone()))
    }

    /// Number of tracked top-level datasets
    pub fn len(&self) -> usize {
        self.state.lock().slot_to_dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn history_depth(&self) -> usize {
        self.history_depth.load(Ordering::Relaxed)
    }

    /// Change how many snapshots later resamples keep
    pub fn set_history_depth(&self, depth: usize) {
        self.history_depth.store(depth, Ordering::Relaxed);
    }
}
