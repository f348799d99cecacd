//! Shared state of one kernel session

use std::sync::Arc;

use parking_lot::RwLock;

use dx_core::{DisplayRegistry, DisplaySettings};
use dx_data::{QueryConnector, SqliteConnector};

use crate::dispatcher::FormatDispatcher;
use crate::payload::{DefaultNormalizer, ValueNormalizer};
use crate::render::RenderTarget;
use crate::resample::ResampleController;
use crate::DisplayError;

/// Everything the dispatcher and the resample controller share
#[derive(Clone)]
pub struct DisplaySession {
    /// Current settings, read at every display and resample
    pub settings: Arc<RwLock<DisplaySettings>>,

    /// Registry of displayed datasets
    pub registry: Arc<DisplayRegistry>,

    /// Engine holding the full tracked datasets
    pub connector: Arc<dyn QueryConnector>,

    pub renderer: Arc<dyn RenderTarget>,

    pub normalizer: Arc<dyn ValueNormalizer>,
}

impl DisplaySession {
    pub fn new(
        settings: DisplaySettings,
        connector: Arc<dyn QueryConnector>,
        renderer: Arc<dyn RenderTarget>,
    ) -> Self {
        let registry = Arc::new(DisplayRegistry::new(settings.sample_history_depth));
        Self {
            settings: Arc::new(RwLock::new(settings)),
            registry,
            connector,
            renderer,
            normalizer: Arc::new(DefaultNormalizer),
        }
    }

    /// Session backed by an in-memory SQLite database
    pub fn in_memory(
        settings: DisplaySettings,
        renderer: Arc<dyn RenderTarget>,
    ) -> Result<Self, DisplayError> {
        let connector = Arc::new(SqliteConnector::open_in_memory()?);
        Ok(Self::new(settings, connector, renderer))
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn ValueNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Copy of the current settings
    pub fn settings(&self) -> DisplaySettings {
        self.settings.read().clone()
    }

    /// Change settings for later displays and resamples
    pub fn update_settings(&self, update: impl FnOnce(&mut DisplaySettings)) {
        let mut settings = self.settings.write();
        update(&mut *settings);
        self.registry.set_history_depth(settings.sample_history_depth);
    }

    pub fn dispatcher(&self) -> FormatDispatcher {
        FormatDispatcher::new(self.clone())
    }

    pub fn resampler(&self) -> ResampleController {
        ResampleController::new(self.clone())
    }
}
