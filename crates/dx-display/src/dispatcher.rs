//! Display-time entry point
//!
//! Every displayable object goes through [`FormatDispatcher::display`]: it is
//! converted to a [`Frame`], tracked when tracking is enabled, reduced to the
//! display limits and rendered. Tracking is best effort. When hashing, naming
//! or registering the frame with the query engine fails, the frame is still
//! displayed, only without a resample link.

use tracing::{debug, info};
use uuid::Uuid;

use dx_core::{DisplaySettings, Frame, IntoFrame, NameResolver, Registration};
use dx_data::{estimate, reduce_with_report, seed_from_slot, ReductionLimits, ReductionReport};

use crate::payload::{build_metadata, build_payload};
use crate::session::DisplaySession;
use crate::DisplayError;

/// What a call to [`FormatDispatcher::display`] did
#[derive(Debug, Clone)]
pub struct DisplayOutcome {
    /// Slot the payload was rendered at
    pub display_slot: String,
    /// The reduced frame that was sent
    pub frame: Frame,
    pub report: ReductionReport,
    /// Registration, when the frame is tracked
    pub registration: Option<Registration>,
    /// Whether an existing slot was updated
    pub is_update: bool,
}

impl DisplayOutcome {
    pub fn is_tracked(&self) -> bool {
        self.registration.is_some()
    }
}

pub struct FormatDispatcher {
    session: DisplaySession,
}

impl FormatDispatcher {
    pub fn new(session: DisplaySession) -> Self {
        Self { session }
    }

    /// Display `obj`, resolving its variable name from `bindings`
    pub fn display<T: IntoFrame>(
        &self,
        obj: T,
        bindings: &dyn NameResolver,
    ) -> Result<DisplayOutcome, DisplayError> {
        let frame = obj.into_frame()?;
        let settings = self.session.settings();
        let limits = ReductionLimits::from_settings(&settings)?;

        if settings.tracking_enabled {
            match self.track(&frame, bindings) {
                Ok(registration) => {
                    return self.display_tracked(&frame, registration, &settings, limits);
                }
                Err(e) => debug!("Displaying untracked, tracking failed: {}", e),
            }
        }

        self.display_untracked(&frame, &settings, limits)
    }

    /// Register `frame` and, when it is new, store it in the query engine
    fn track(&self, frame: &Frame, bindings: &dyn NameResolver) -> Result<Registration, DisplayError> {
        let registry = &self.session.registry;
        let registration = registry.register(frame, bindings)?;
        if !registration.is_new() {
            return Ok(registration);
        }

        let slot = &registration.display_slot;
        let dataset = registry
            .get(slot)
            .ok_or_else(|| DisplayError::UnknownDisplaySlot(slot.clone()))?;

        if let Err(e) = self.session.connector.register_table(&dataset.table_name, frame) {
            registry.remove(slot);
            return Err(e.into());
        }
        registry.set_original_size(slot, estimate(frame).size_bytes)?;

        info!(
            "Registered '{}' as table {} in {}",
            dataset.variable_name,
            dataset.table_name,
            self.session.connector.engine_name()
        );
        Ok(registration)
    }

    fn display_tracked(
        &self,
        frame: &Frame,
        registration: Registration,
        settings: &DisplaySettings,
        limits: ReductionLimits,
    ) -> Result<DisplayOutcome, DisplayError> {
        let slot = registration.display_slot.clone();
        let limits = limits.with_seed(seed_from_slot(&slot));
        let (reduced, report) = reduce_with_report(frame, &limits)?;

        let dataset = self.session.registry.get(&slot);
        let payload = build_payload(
            &reduced,
            settings.display_mode,
            settings.media_type(),
            &slot,
            self.session.normalizer.as_ref(),
        );
        let metadata = build_metadata(&slot, dataset.as_ref(), &report, settings.display_mode)?;

        let is_update = !registration.is_new();
        self.session
            .renderer
            .render(&payload, &metadata, &slot, is_update)
            .map_err(DisplayError::render)?;

        Ok(DisplayOutcome {
            display_slot: slot,
            frame: reduced,
            report,
            registration: Some(registration),
            is_update,
        })
    }

    fn display_untracked(
        &self,
        frame: &Frame,
        settings: &DisplaySettings,
        limits: ReductionLimits,
    ) -> Result<DisplayOutcome, DisplayError> {
        let slot = Uuid::new_v4().to_string();
        let (reduced, report) = reduce_with_report(frame, &limits)?;

        let payload = build_payload(
            &reduced,
            settings.display_mode,
            settings.media_type(),
            &slot,
            self.session.normalizer.as_ref(),
        );
        let metadata = build_metadata(&slot, None, &report, settings.display_mode)?;
        self.session
            .renderer
            .render(&payload, &metadata, &slot, false)
            .map_err(DisplayError::render)?;

        Ok(DisplayOutcome {
            display_slot: slot,
            frame: reduced,
            report,
            registration: None,
            is_update: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MemoryRenderer;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use dx_core::{Bindings, Resolution};
    use std::sync::Arc;

    fn batch(n: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from_iter_values(0..n))]).unwrap()
    }

    fn session() -> (DisplaySession, Arc<MemoryRenderer>) {
        let renderer = Arc::new(MemoryRenderer::new());
        let session = DisplaySession::in_memory(DisplaySettings::default(), renderer.clone()).unwrap();
        (session, renderer)
    }

    #[test]
    fn test_display_registers_table() {
        let (session, renderer) = session();
        let outcome = session.dispatcher().display(batch(10), &Bindings::new()).unwrap();

        let registration = outcome.registration.unwrap();
        assert_eq!(registration.resolution, Resolution::New);
        let dataset = session.registry.get(&outcome.display_slot).unwrap();
        assert!(dataset.variable_name.starts_with("unk_dataframe_"));
        assert!(dataset.original_dimensions.size_bytes > 0);
        assert!(session.connector.has_table(&dataset.table_name).unwrap());

        let rendered = renderer.last().unwrap();
        assert!(!rendered.is_update);
        assert_eq!(rendered.display_slot, outcome.display_slot);
    }

    #[test]
    fn test_redisplay_updates_slot() {
        let (session, renderer) = session();
        let dispatcher = session.dispatcher();
        let first = dispatcher.display(batch(5), &Bindings::new()).unwrap();
        let second = dispatcher.display(batch(5), &Bindings::new()).unwrap();

        assert_eq!(first.display_slot, second.display_slot);
        assert!(second.is_update);
        assert_eq!(session.registry.len(), 1);
        assert_eq!(renderer.len(), 2);
    }

    #[test]
    fn test_tracking_disabled() {
        let (session, renderer) = session();
        session.update_settings(|s| s.tracking_enabled = false);

        let outcome = session.dispatcher().display(batch(5), &Bindings::new()).unwrap();
        assert!(!outcome.is_tracked());
        assert!(session.registry.is_empty());
        assert_eq!(renderer.last().unwrap().metadata["datalink"]["tracked"], false);
    }

    #[test]
    fn test_unknown_strategy_is_surfaced() {
        let (session, _renderer) = session();
        session.update_settings(|s| s.row_sampling_strategy = "sideways".to_string());
        assert!(matches!(
            session.dispatcher().display(batch(5), &Bindings::new()),
            Err(DisplayError::Reduce(_))
        ));
    }
}
