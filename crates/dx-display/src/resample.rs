//! Resampling of tracked datasets on front-end request
//!
//! The full dataset lives in the query engine. A resample request filters it
//! there, restores the Arrow types the engine lost, reduces the result to the
//! display limits and re-renders it in the slot it was first displayed at.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use dx_core::{content_hash, FilterSpec, Frame, TrackedDataset};
use dx_data::schema::cast_strict;
use dx_data::{build_resample_query, reduce_with_report, restore_column_types, seed_from_slot, ReductionLimits};

use crate::payload::{build_metadata, build_payload};
use crate::session::DisplaySession;
use crate::DisplayError;

/// Inbound resample message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleRequest {
    /// Slot of the dataset to resample
    pub display_id: String,

    /// Filters ANDed together; empty selects everything
    #[serde(default)]
    pub filters: Vec<FilterSpec>,

    /// Row limit for the query, `max_rows` when absent
    #[serde(default)]
    pub limit: Option<usize>,

    /// Cell the request originated from
    #[serde(default)]
    pub cell_id: Option<String>,
}

impl ResampleRequest {
    pub fn new(display_id: impl Into<String>, filters: Vec<FilterSpec>) -> Self {
        Self {
            display_id: display_id.into(),
            filters,
            limit: None,
            cell_id: None,
        }
    }
}

pub struct ResampleController {
    session: DisplaySession,
}

impl ResampleController {
    pub fn new(session: DisplaySession) -> Self {
        Self { session }
    }

    /// Parse and run one inbound message.
    ///
    /// Malformed messages are logged and dropped with `Ok(None)`.
    pub fn handle_message(&self, message: &str) -> Result<Option<Frame>, DisplayError> {
        let request: ResampleRequest = match serde_json::from_str(message) {
            Ok(request) => request,
            Err(e) => {
                error!("Dropping malformed resample message: {}", e);
                return Ok(None);
            }
        };
        self.resample(&request).map(Some)
    }

    /// Re-query the dataset at `request.display_id` with the request's
    /// filters and update its display. Returns the reduced frame.
    pub fn resample(&self, request: &ResampleRequest) -> Result<Frame, DisplayError> {
        let slot = request.display_id.as_str();
        let registry = &self.session.registry;
        let dataset = registry
            .get(slot)
            .ok_or_else(|| DisplayError::UnknownDisplaySlot(slot.to_string()))?;
        let settings = self.session.settings();

        let limit = request.limit.unwrap_or(settings.max_rows);
        let sql = build_resample_query(&dataset.table_name, &request.filters, Some(limit));
        info!("Resampling slot {} with {} filters", slot, request.filters.len());
        debug!("Resample query: {}", sql);

        let batch = self
            .session
            .connector
            .execute(&sql)
            .map_err(|source| DisplayError::ResampleQueryFailed {
                slot: slot.to_string(),
                source,
            })?;
        let frame = restore_types(Frame::from_batch_with_index(batch, dataset.index_name.clone())?, &dataset)?;

        let hash = content_hash(&frame)?;
        if !request.filters.is_empty() && hash != dataset.content_hash {
            registry.link_subset(&hash, slot, request.cell_id.as_deref())?;
        }

        let limits = ReductionLimits::from_settings(&settings)?.with_seed(seed_from_slot(slot));
        let (reduced, report) = reduce_with_report(&frame, &limits)?;
        registry.record_sample(slot, request.filters.clone(), report.before)?;

        let dataset = registry
            .get(slot)
            .ok_or_else(|| DisplayError::UnknownDisplaySlot(slot.to_string()))?;
        let payload = build_payload(
            &reduced,
            settings.display_mode,
            settings.media_type(),
            slot,
            self.session.normalizer.as_ref(),
        );
        let metadata = build_metadata(slot, Some(&dataset), &report, settings.display_mode)?;
        self.session
            .renderer
            .render(&payload, &metadata, slot, true)
            .map_err(DisplayError::render)?;

        debug!(
            "Resampled slot {}: {} rows matched, {} sent",
            slot,
            frame.num_rows(),
            reduced.num_rows()
        );
        Ok(reduced)
    }
}

/// Cast the index and columns of a query result back to the types the
/// dataset was displayed with. Columns that cannot be cast keep the engine's
/// type.
fn restore_types(frame: Frame, dataset: &TrackedDataset) -> Result<Frame, DisplayError> {
    let frame = if frame.index().data_type() == &dataset.index_type {
        frame
    } else {
        match cast_strict(frame.index().as_ref(), &dataset.index_type) {
            Ok(index) => frame.replace_index(index, dataset.index_name.clone())?,
            Err(e) => {
                warn!(
                    "Could not restore index of slot {} to {}: {}",
                    dataset.display_slot, dataset.index_type, e
                );
                frame
            }
        }
    };

    let (frame, failures) = restore_column_types(&frame, &dataset.original_column_types)?;
    if !failures.is_empty() {
        debug!(
            "{} columns of slot {} kept their engine types",
            failures.len(),
            dataset.display_slot
        );
    }
    Ok(frame)
}
