//! Full vs Performance editing mode.
//!
//! Large files trade features for responsiveness: Performance Mode keeps
//! the line index lazy, coalesces undo more aggressively, and skips
//! background highlighting. The mode is chosen once when a document is
//! loaded and stays fixed for its lifetime; growing past the threshold
//! mid-session does not flip it (an explicit reselect is opt-in).

/// Documents at or above this size load in Performance Mode.
pub const PERFORMANCE_THRESHOLD_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
  #[default]
  Full,
  Performance,
}

impl Mode {
  /// Pick the mode for a document of `size_bytes`, against `threshold`
  /// (inclusive: exactly threshold-sized files get Performance Mode).
  pub fn select(size_bytes: u64, threshold: u64) -> Self {
    if size_bytes >= threshold {
      Mode::Performance
    } else {
      Mode::Full
    }
  }

  pub fn is_performance(self) -> bool {
    self == Mode::Performance
  }

  /// Whether background retokenization runs in this mode.
  pub fn highlights(self) -> bool {
    self == Mode::Full
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn small_files_get_full_mode() {
    assert_eq!(Mode::select(0, PERFORMANCE_THRESHOLD_BYTES), Mode::Full);
    assert_eq!(
      Mode::select(500 * 1024, PERFORMANCE_THRESHOLD_BYTES),
      Mode::Full
    );
  }

  #[test]
  fn threshold_is_inclusive() {
    assert_eq!(
      Mode::select(PERFORMANCE_THRESHOLD_BYTES, PERFORMANCE_THRESHOLD_BYTES),
      Mode::Performance
    );
    assert_eq!(
      Mode::select(PERFORMANCE_THRESHOLD_BYTES - 1, PERFORMANCE_THRESHOLD_BYTES),
      Mode::Full
    );
  }

  #[test]
  fn large_files_get_performance_mode() {
    assert_eq!(
      Mode::select(2 * 1024 * 1024, PERFORMANCE_THRESHOLD_BYTES),
      Mode::Performance
    );
  }
}
