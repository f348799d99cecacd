//! Reduction of frames to fit the display limits
//!
//! Columns are trimmed first, then rows, then rows again in fractional steps
//! until the estimated size fits the byte budget. Row and column counts alone
//! do not bound frames with very large cells, hence the last step.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use dx_core::{DisplaySettings, Frame, FrameDimensions, FrameError};

use crate::memory::estimate;
use crate::sampling::{sample_columns, SamplingStrategy};
use crate::schema::restore_column_types;

/// Upper bound on byte-budget steps for a single reduction
const MAX_BYTE_STEPS: usize = 10_000;

/// Axis a sampling strategy applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Rows,
    Columns,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Rows => f.write_str("row"),
            Axis::Columns => f.write_str("column"),
        }
    }
}

/// Errors that can occur while reducing a frame
#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("Unknown {axis} sampling strategy '{value}'")]
    UnknownStrategy { axis: Axis, value: String },

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Bounds a frame is reduced to
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionLimits {
    pub max_rows: usize,
    pub max_cols: usize,
    pub max_bytes: usize,
    pub row_strategy: SamplingStrategy,
    pub col_strategy: SamplingStrategy,
    pub seed: u64,
    /// Fraction of remaining rows removed per byte-budget step
    pub sampling_factor: f64,
}

impl ReductionLimits {
    /// Limits from settings, seeded with the configured random seed.
    ///
    /// Row and column strategy names are validated separately so the error
    /// names the offending axis.
    pub fn from_settings(settings: &DisplaySettings) -> Result<Self, ReduceError> {
        let row_strategy = settings
            .row_sampling_strategy
            .parse()
            .map_err(|value| ReduceError::UnknownStrategy { axis: Axis::Rows, value })?;
        let col_strategy = settings
            .column_sampling_strategy
            .parse()
            .map_err(|value| ReduceError::UnknownStrategy { axis: Axis::Columns, value })?;

        Ok(Self {
            max_rows: settings.max_rows,
            max_cols: settings.max_columns,
            max_bytes: settings.max_bytes,
            row_strategy,
            col_strategy,
            seed: settings.random_seed,
            sampling_factor: settings.sampling_factor,
        })
    }

    /// Same limits with a different random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// What a reduction did
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionReport {
    pub before: FrameDimensions,
    pub after: FrameDimensions,
    pub byte_steps: usize,
    pub sampling_time: Duration,
}

impl ReductionReport {
    pub fn is_truncated(&self) -> bool {
        self.before.num_rows != self.after.num_rows || self.before.num_cols != self.after.num_cols
    }
}

/// Reduce `frame` to fit `limits`
pub fn reduce(frame: &Frame, limits: &ReductionLimits) -> Result<Frame, ReduceError> {
    reduce_with_report(frame, limits).map(|(frame, _)| frame)
}

/// Reduce `frame` to fit `limits`, reporting dimensions before and after
pub fn reduce_with_report(
    frame: &Frame,
    limits: &ReductionLimits,
) -> Result<(Frame, ReductionReport), ReduceError> {
    let started = Instant::now();
    let before = estimate(frame);
    let original_types = frame.column_types();
    let mut reduced = frame.clone();

    if reduced.num_columns() > limits.max_cols {
        debug!(
            "Sampling columns {} -> {} ({})",
            reduced.num_columns(),
            limits.max_cols,
            limits.col_strategy
        );
        reduced = sample_columns(&reduced, limits.col_strategy, limits.max_cols, limits.seed)?;
    }

    if reduced.num_rows() > limits.max_rows {
        debug!(
            "Sampling rows {} -> {} ({})",
            reduced.num_rows(),
            limits.max_rows,
            limits.row_strategy
        );
        let positions = limits
            .row_strategy
            .select(reduced.num_rows(), limits.max_rows, limits.seed);
        reduced = reduced.take_rows(&positions)?;
    }

    let (reduced, byte_steps) = fit_byte_budget(reduced, limits)?;

    let reduced = if reduced.column_types() == original_types {
        reduced
    } else {
        // Only surviving columns are looked up, dropped ones are skipped
        let (restored, _failures) = restore_column_types(&reduced, &original_types)?;
        restored
    };

    let after = estimate(&reduced);
    let report = ReductionReport {
        before,
        after,
        byte_steps,
        sampling_time: started.elapsed(),
    };
    Ok((reduced, report))
}

/// Drop `sampling_factor` of the remaining rows at a time until the frame fits
/// `max_bytes` or only one row is left
fn fit_byte_budget(mut frame: Frame, limits: &ReductionLimits) -> Result<(Frame, usize), ReduceError> {
    let mut size = estimate(&frame).size_bytes;
    let mut steps = 0;

    while size > limits.max_bytes && frame.num_rows() > 1 && steps < MAX_BYTE_STEPS {
        let rows = frame.num_rows();
        let remove = ((rows as f64 * limits.sampling_factor) as usize).max(1);
        let target = rows.saturating_sub(remove).max(1);

        let mut positions = limits.row_strategy.select(rows, target, limits.seed);
        if positions.is_empty() {
            // inner/outer round a single-row target down to nothing
            positions = match limits.row_strategy {
                SamplingStrategy::Inner => vec![rows / 2],
                SamplingStrategy::Last => vec![rows - 1],
                _ => vec![0],
            };
        }

        frame = frame.take_rows(&positions)?;
        size = estimate(&frame).size_bytes;
        steps += 1;
    }

    if size > limits.max_bytes {
        warn!(
            "Frame still estimated at {} bytes (budget {}) after {} steps",
            size, limits.max_bytes, steps
        );
    } else if steps > 0 {
        debug!("Fit byte budget in {} steps, {} rows left", steps, frame.num_rows());
    }
    Ok((frame, steps))
}
