//! Display layer for the dx formatter
//!
//! Turns displayable objects into front-end payloads, tracks them in the
//! session registry and answers resample requests coming back from the
//! front end.

pub mod dispatcher;
pub mod payload;
pub mod render;
pub mod resample;
pub mod session;

use arrow::error::ArrowError;
use dx_core::{FrameError, RegistryError};
use dx_data::{DataError, ReduceError};
use thiserror::Error;

// Re-exports
pub use dispatcher::{DisplayOutcome, FormatDispatcher};
pub use payload::{build_metadata, build_payload, DefaultNormalizer, DisplayMetadata, ValueNormalizer};
pub use render::{JsonLinesRenderer, MemoryRenderer, RenderTarget, RenderedOutput};
pub use resample::{ResampleController, ResampleRequest};
pub use session::DisplaySession;

/// Errors that can occur while displaying or resampling
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Unknown display slot '{0}'")]
    UnknownDisplaySlot(String),

    #[error("Resample query for slot '{slot}' failed: {source}")]
    ResampleQueryFailed {
        slot: String,
        #[source]
        source: DataError,
    },

    #[error("Reduction error: {0}")]
    Reduce(#[from] ReduceError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DisplayError {
    pub(crate) fn render(error: anyhow::Error) -> Self {
        DisplayError::Render(format!("{:#}", error))
    }
}
