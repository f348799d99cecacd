//! Core functionality for the dx display formatter
//!
//! This crate provides the canonical tabular form, the filter and settings
//! types shared by every layer, dataset identity and the display registry.

pub mod filter;
pub mod frame;
pub mod identity;
pub mod registry;
pub mod settings;

// Re-export commonly used types
pub use filter::{FilterSpec, DateFilter, DimensionFilter, MetricFilter};
pub use frame::{Frame, FrameDimensions, FrameError, IntoFrame, INDEX_COLUMN, ROW_ORDER_COLUMN};
pub use identity::{content_hash, resolve_variable_name, Bindings, NameResolver};
pub use registry::{DisplayRegistry, Registration, Resolution, RegistryError, SampleSnapshot, TrackedDataset};
pub use settings::{DisplayMode, DisplaySettings};
