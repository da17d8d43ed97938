//! Editor configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! stock configuration. Unknown keys are rejected so typos surface as
//! load errors instead of silently-ignored settings.

use serde::Deserialize;
use thiserror::Error;

use crate::history::CoalescePolicy;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
  /// Files at or above this many bytes open in Performance Mode.
  pub performance_threshold_bytes: u64,
  pub coalesce:                    CoalesceConfig,
  pub highlight:                   HighlightConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      performance_threshold_bytes: crate::mode::PERFORMANCE_THRESHOLD_BYTES,
      coalesce:                    CoalesceConfig::default(),
      highlight:                   HighlightConfig::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CoalesceConfig {
  /// Inserts further apart than this start a new undo unit.
  pub timeout_ms:             u64,
  pub max_run:                usize,
  /// Performance Mode keeps undo units shorter.
  pub performance_timeout_ms: u64,
  pub performance_max_run:    usize,
}

impl Default for CoalesceConfig {
  fn default() -> Self {
    let full = CoalescePolicy::full();
    let performance = CoalescePolicy::performance();
    Self {
      timeout_ms:             full.timeout.as_millis() as u64,
      max_run:                full.max_run,
      performance_timeout_ms: performance.timeout.as_millis() as u64,
      performance_max_run:    performance.max_run,
    }
  }
}

impl CoalesceConfig {
  pub fn policy(&self, mode: crate::mode::Mode) -> CoalescePolicy {
    use std::time::Duration;
    if mode.is_performance() {
      CoalescePolicy {
        timeout: Duration::from_millis(self.performance_timeout_ms),
        max_run: self.performance_max_run,
      }
    } else {
      CoalescePolicy {
        timeout: Duration::from_millis(self.timeout_ms),
        max_run: self.max_run,
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct HighlightConfig {
  /// Extra lines above and below an edit to retokenize, on top of the
  /// per-language context.
  pub context_lines: usize,
  /// How long typing must settle before background tokenization runs.
  pub debounce_ms:   u64,
}

impl Default for HighlightConfig {
  fn default() -> Self {
    Self {
      context_lines: 0,
      debounce_ms:   150,
    }
  }
}

impl Config {
  pub fn from_toml(contents: &str) -> Result<Self> {
    Ok(toml::from_str(contents)?)
  }
}
