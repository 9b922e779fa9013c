//! Runtime configuration.
//!
//! Each thread runs its own engine, so configuration is per thread as well.
//! The defaults match the behaviour described in the crate docs: bitmask
//! diffing for the first 30 nesting levels, exhaustive re-tracking beyond.

use serde::{Deserialize, Serialize};

use super::context;
use super::error::{ReactiveError, Result};

/// Widest marker mask the engine supports.
///
/// Nesting level `n` uses bit `n` of a `u32` mask; bit 0 is never assigned.
pub const MAX_MARKER_BITS: u32 = 30;

/// How an effect run maintains its dependency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStrategy {
    /// Diff the previous and current dependency sets with per-level bits,
    /// falling back to `Exhaustive` past `max_marker_bits` levels.
    #[default]
    Bitmask,
    /// Drop every subscription before each run and re-subscribe by
    /// membership check. Always correct, used as the baseline.
    Exhaustive,
}

/// Engine configuration for the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Nesting levels that get a dedicated marker bit.
    pub max_marker_bits: u32,
    pub strategy: TrackingStrategy,
}

impl RuntimeConfig {
    /// The baseline configuration: no bitmask diffing at any depth.
    pub fn exhaustive() -> Self {
        Self {
            strategy: TrackingStrategy::Exhaustive,
            ..Self::default()
        }
    }

    /// Check that the configuration can be installed.
    pub fn validate(&self) -> Result<()> {
        if self.max_marker_bits > MAX_MARKER_BITS {
            return Err(ReactiveError::MarkerBitsOutOfRange {
                requested: self.max_marker_bits,
                max: MAX_MARKER_BITS,
            });
        }
        Ok(())
    }

    /// Whether a run at `depth` uses marker bits.
    pub(crate) fn uses_markers_at(&self, depth: u32) -> bool {
        self.strategy == TrackingStrategy::Bitmask && depth <= self.max_marker_bits
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_marker_bits: MAX_MARKER_BITS,
            strategy: TrackingStrategy::Bitmask,
        }
    }
}

/// Install `config` for the current thread.
///
/// Runs already in progress keep the mode they started with.
pub fn configure(config: RuntimeConfig) -> Result<()> {
    config.validate()?;
    context::set_config(config);
    tracing::debug!(?config, "runtime configured");
    Ok(())
}

/// The configuration installed for the current thread.
pub fn current_config() -> RuntimeConfig {
    context::config()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_marker_bits, 30);
        assert_eq!(config.strategy, TrackingStrategy::Bitmask);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_too_many_marker_bits() {
        let config = RuntimeConfig {
            max_marker_bits: 31,
            ..RuntimeConfig::default()
        };
        assert_eq!(
            configure(config),
            Err(ReactiveError::MarkerBitsOutOfRange {
                requested: 31,
                max: 30,
            })
        );
        assert_eq!(current_config(), RuntimeConfig::default());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"strategy":"exhaustive"}"#)
            .expect("valid config json");
        assert_eq!(config, RuntimeConfig::exhaustive());

        let config: RuntimeConfig =
            serde_json::from_str(r#"{"max_marker_bits":4}"#).expect("valid config json");
        assert_eq!(config.max_marker_bits, 4);
        assert_eq!(config.strategy, TrackingStrategy::Bitmask);
    }

    #[test]
    fn marker_usage_by_depth() {
        let config = RuntimeConfig {
            max_marker_bits: 2,
            ..RuntimeConfig::default()
        };
        assert!(config.uses_markers_at(1));
        assert!(config.uses_markers_at(2));
        assert!(!config.uses_markers_at(3));
        assert!(!RuntimeConfig::exhaustive().uses_markers_at(1));
    }
}
