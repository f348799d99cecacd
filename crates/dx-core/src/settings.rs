//! Display settings
//!
//! Settings are plain serde structs with defaults. They can be loaded from a
//! JSON document or overridden from `DX_*` environment variables.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Shape of the payload sent to the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Row-major records keyed by column name, with an `index` field
    Simple,
    /// Column-major arrays, index first
    Enhanced,
}

impl DisplayMode {
    /// Media type the payload is keyed by
    pub fn media_type(&self) -> &'static str {
        match self {
            DisplayMode::Simple => "application/vnd.dataresource+json",
            DisplayMode::Enhanced => "application/vnd.dex.v1+json",
        }
    }
}

impl std::str::FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(DisplayMode::Simple),
            "enhanced" => Ok(DisplayMode::Enhanced),
            other => Err(format!("unknown display mode '{}'", other)),
        }
    }
}

/// Settings consumed by the reduction, registry and display layers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Payload shape
    pub display_mode: DisplayMode,

    /// Overrides the media type implied by `display_mode`
    pub media_type: Option<String>,

    /// Maximum rows sent to the front end
    pub max_rows: usize,

    /// Maximum columns sent to the front end
    pub max_columns: usize,

    /// Maximum estimated in-memory size of the sent frame
    pub max_bytes: usize,

    /// One of `first`, `last`, `inner`, `outer`, `random`
    pub row_sampling_strategy: String,

    /// One of `first`, `last`, `inner`, `outer`, `random`
    pub column_sampling_strategy: String,

    /// Fraction of remaining rows dropped per byte-budget step
    pub sampling_factor: f64,

    /// Seed for random sampling of untracked frames
    pub random_seed: u64,

    /// Number of resample snapshots kept per dataset
    pub sample_history_depth: usize,

    /// Whether displayed frames are tracked for resampling
    pub tracking_enabled: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::Simple,
            media_type: None,
            max_rows: 50_000,
            max_columns: 50,
            max_bytes: 100 * 1024 * 1024,
            row_sampling_strategy: "random".to_string(),
            column_sampling_strategy: "outer".to_string(),
            sampling_factor: 0.1,
            random_seed: 12_648_430,
            sample_history_depth: 5,
            tracking_enabled: true,
        }
    }
}

impl DisplaySettings {
    /// Parse settings from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Defaults overridden by `DX_*` environment variables
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env_vars(std::env::vars());
        settings
    }

    /// Media type the payload is keyed by
    pub fn media_type(&self) -> &str {
        self.media_type
            .as_deref()
            .unwrap_or_else(|| self.display_mode.media_type())
    }

    /// Apply `DX_*` overrides. Unparseable values are logged and skipped.
    pub fn apply_env_vars<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix("DX_") else {
                continue;
            };
            let applied = match name {
                "DISPLAY_MODE" => value.parse().map(|v| self.display_mode = v).is_ok(),
                "MEDIA_TYPE" => {
                    self.media_type = Some(value.clone());
                    true
                }
                "MAX_ROWS" => value.parse().map(|v| self.max_rows = v).is_ok(),
                "MAX_COLUMNS" => value.parse().map(|v| self.max_columns = v).is_ok(),
                "MAX_BYTES" => value.parse().map(|v| self.max_bytes = v).is_ok(),
                "ROW_SAMPLING_STRATEGY" => {
                    self.row_sampling_strategy = value.clone();
                    true
                }
                "COLUMN_SAMPLING_STRATEGY" => {
                    self.column_sampling_strategy = value.clone();
                    true
                }
                "SAMPLING_FACTOR" => value
                    .parse::<f64>()
                    .ok()
                    .filter(|f| *f > 0.0 && *f < 1.0)
                    .map(|v| self.sampling_factor = v)
                    .is_some(),
                "RANDOM_SEED" => value.parse().map(|v| self.random_seed = v).is_ok(),
                "SAMPLE_HISTORY_DEPTH" => value.parse().map(|v| self.sample_history_depth = v).is_ok(),
                "TRACKING_ENABLED" => parse_bool(&value).map(|v| self.tracking_enabled = v).is_some(),
                _ => continue,
            };
            if !applied {
                warn!("Ignoring invalid value {:?} for {}", value, key);
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
