//! Memory estimation for frames

use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use dx_core::{Frame, FrameDimensions};

/// Estimated per-field metadata overhead
const FIELD_OVERHEAD_BYTES: usize = 64;

/// Row/column counts and estimated in-memory footprint of a frame
pub fn estimate(frame: &Frame) -> FrameDimensions {
    FrameDimensions {
        size_bytes: estimate_frame_memory(frame),
        num_rows: frame.num_rows(),
        num_cols: frame.num_columns(),
    }
}

/// Estimate memory usage of a frame, index included
pub fn estimate_frame_memory(frame: &Frame) -> usize {
    let index = frame.index();
    let mut total_bytes = estimate_batch_memory(frame.batch());

    total_bytes += index.get_array_memory_size();
    if index.null_count() > 0 {
        total_bytes += (index.len() + 7) / 8;
    }
    total_bytes
}

/// Estimate memory usage of a RecordBatch
pub fn estimate_batch_memory(batch: &RecordBatch) -> usize {
    let mut total_bytes = 0;

    for column in batch.columns() {
        // Base data size
        total_bytes += column.get_array_memory_size();

        // Null bitmap, 1 bit per row
        if column.null_count() > 0 {
            total_bytes += (batch.num_rows() + 7) / 8;
        }
    }

    total_bytes += std::mem::size_of::<RecordBatch>();
    total_bytes += batch.schema().fields().len() * FIELD_OVERHEAD_BYTES;

    total_bytes
}
