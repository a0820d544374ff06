//! Tunable constants of the comment rail.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Vertical gap between stacked thread cards (px).
pub const THREAD_GAP: f64 = 15.0;
/// Card height used before a card has been measured (px).
pub const DEFAULT_CARD_HEIGHT: f64 = 68.0;
/// Fraction of the viewport height a selected anchor is scrolled to.
pub const SCROLL_ANCHOR_RATIO: f64 = 0.31;
/// Window-resize debounce (ms).
pub const RESIZE_DEBOUNCE_MS: u64 = 150;

#[derive(Debug, Error)]
/// Errors produced when loading a [`MarginConfig`].
pub enum ConfigError {
    #[error("config parse error: {0}")]
    /// The JSON document could not be parsed.
    Json(#[from] serde_json::Error),

    #[error("invalid value for '{field}': {reason}")]
    /// A field parsed but is out of range.
    Invalid {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Layout, scrolling and scheduling parameters.
///
/// Every field is optional in serialized form and falls back to the defaults above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginConfig {
    /// Gap between stacked cards (px).
    pub thread_gap: f64,
    /// Fallback card height (px).
    pub default_card_height: f64,
    /// Viewport fraction used when scrolling to a selected anchor.
    pub scroll_ratio: f64,
    /// Window-resize debounce (ms).
    pub resize_debounce_ms: u64,
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            thread_gap: THREAD_GAP,
            default_card_height: DEFAULT_CARD_HEIGHT,
            scroll_ratio: SCROLL_ANCHOR_RATIO,
            resize_debounce_ms: RESIZE_DEBOUNCE_MS,
        }
    }
}

impl MarginConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.thread_gap.is_finite() || self.thread_gap < 0.0 {
            return Err(ConfigError::Invalid {
                field: "thread_gap",
                reason: format!("expected a non-negative number, got {}", self.thread_gap),
            });
        }
        if !self.default_card_height.is_finite() || self.default_card_height <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "default_card_height",
                reason: format!("expected a positive number, got {}", self.default_card_height),
            });
        }
        if !(0.0..=1.0).contains(&self.scroll_ratio) {
            return Err(ConfigError::Invalid {
                field: "scroll_ratio",
                reason: format!("expected a value in 0..=1, got {}", self.scroll_ratio),
            });
        }
        Ok(())
    }

    /// The resize debounce as a [`Duration`].
    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }
}
