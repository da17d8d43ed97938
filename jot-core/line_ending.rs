use ropey::{
  Rope,
  RopeSlice,
};

#[cfg(target_os = "windows")]
pub const NATIVE_LINE_ENDING: LineEnding = LineEnding::Crlf;

#[cfg(not(target_os = "windows"))]
pub const NATIVE_LINE_ENDING: LineEnding = LineEnding::LF;

/// The two line endings the editor round-trips. Anything more exotic is
/// normalized away on load.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum LineEnding {
  /// CarriageReturn followed by LineFeed.
  Crlf,

  /// U+000A -- LineFeed
  LF,
}

impl LineEnding {
  #[inline]
  pub const fn len_chars(&self) -> usize {
    match self {
      Self::Crlf => 2,
      Self::LF => 1,
    }
  }

  #[inline]
  pub const fn as_str(&self) -> &'static str {
    match self {
      Self::Crlf => "\u{000D}\u{000A}",
      Self::LF => "\u{000A}",
    }
  }

  #[inline]
  pub const fn from_char(ch: char) -> Option<LineEnding> {
    match ch {
      '\u{000A}' => Some(LineEnding::LF),
      _ => None,
    }
  }

  // Matching from_char's return type is more useful here than the FromStr
  // trait would be.
  #[allow(clippy::should_implement_trait)]
  #[inline]
  pub fn from_str(g: &str) -> Option<LineEnding> {
    match g {
      "\u{000D}\u{000A}" => Some(LineEnding::Crlf),
      "\u{000A}" => Some(LineEnding::LF),
      _ => None,
    }
  }
}

/// Attempts to detect what line ending the passed document uses.
///
/// Only the first hundred lines are inspected, which is plenty for files
/// that are consistent and cheap for files that are huge.
pub fn auto_detect_line_ending(doc: &Rope) -> Option<LineEnding> {
  doc
    .lines()
    .take(100)
    .find_map(|line| get_line_ending(&line))
}

/// Returns the passed line's line ending, if any.
pub fn get_line_ending(line: &RopeSlice) -> Option<LineEnding> {
  // Last two chars as str, or empty if non-contiguous. Ropey guarantees
  // CRLF is contiguous, so punting on the non-contiguous case is fine.
  let tail = line
    .slice(line.len_chars().saturating_sub(2)..)
    .as_str()
    .unwrap_or("");

  let last = line
    .slice(line.len_chars().saturating_sub(1)..)
    .as_str()
    .unwrap_or("");

  LineEnding::from_str(tail).or_else(|| LineEnding::from_str(last))
}
