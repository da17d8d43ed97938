//! Line-number to offset addressing, kept incrementally consistent.
//!
//! The index is an ordered vector of line-start offsets (char indices):
//! entry 0 is always 0, and every other entry is the offset just past a
//! line break. Entries are strictly increasing and there is exactly one
//! entry per line break plus one, so `line_count` is the entry count.
//!
//! On an edit the index is patched, not rebuilt: entries inside the edited
//! region are recomputed from the new text and everything after shifts by
//! the length delta. In Performance Mode the owner calls [`invalidate`]
//! instead and the index rebuilds lazily on the next query, never per
//! keystroke.
//!
//! [`invalidate`]: LineIndex::invalidate

use ropey::RopeSlice;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LineIndexError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineIndexError {
  #[error("line {line} is out of bounds for line count {count}")]
  LineOutOfBounds { line: usize, count: usize },
  #[error("offset {offset} is out of bounds for document length {len}")]
  OffsetOutOfBounds { offset: usize, len: usize },
}

#[derive(Debug, Clone)]
pub struct LineIndex {
  /// Char offset of each line start. `starts[0] == 0` always.
  starts: Vec<usize>,
  stale:  bool,
}

impl LineIndex {
  pub fn new(text: RopeSlice) -> Self {
    Self {
      starts: scan_line_starts(text, 0, text.len_chars()),
      stale:  false,
    }
  }

  /// An index that will be built on first query.
  pub fn lazy() -> Self {
    Self {
      starts: vec![0],
      stale:  true,
    }
  }

  /// Drop the index contents; the next query rebuilds from the text.
  pub fn invalidate(&mut self) {
    self.stale = true;
  }

  pub fn is_stale(&self) -> bool {
    self.stale
  }

  fn ensure_fresh(&mut self, text: RopeSlice) {
    if self.stale {
      self.starts = scan_line_starts(text, 0, text.len_chars());
      self.stale = false;
    }
  }

  pub fn line_count(&mut self, text: RopeSlice) -> usize {
    self.ensure_fresh(text);
    self.starts.len()
  }

  /// Char offset of the start of line `line` (zero-based).
  pub fn offset_of_line(&mut self, text: RopeSlice, line: usize) -> Result<usize> {
    self.ensure_fresh(text);
    self
      .starts
      .get(line)
      .copied()
      .ok_or(LineIndexError::LineOutOfBounds {
        line,
        count: self.starts.len(),
      })
  }

  /// Zero-based line containing `offset`. `offset == len` maps to the last
  /// line.
  pub fn line_of_offset(&mut self, text: RopeSlice, offset: usize) -> Result<usize> {
    self.ensure_fresh(text);
    let len = text.len_chars();
    if offset > len {
      return Err(LineIndexError::OffsetOutOfBounds { offset, len });
    }
    // Index of the last start <= offset. starts[0] == 0 guarantees >= 1.
    Ok(self.starts.partition_point(|&s| s <= offset) - 1)
  }

  /// Patch the index for a replacement of old-range `from..to` by
  /// `inserted` chars. `text_after` is the document after the edit; text
  /// before `from` is unchanged, which is what makes the patch sound.
  ///
  /// No-op while stale: the pending rebuild subsumes any patch.
  pub fn edit(&mut self, text_after: RopeSlice, from: usize, to: usize, inserted: usize) {
    if self.stale {
      return;
    }

    // Entry s corresponds to a break at s - 1, so breaks deleted by the
    // edit are exactly the entries in (from, to].
    let lo = self.starts.partition_point(|&s| s <= from);
    let hi = self.starts.partition_point(|&s| s <= to);

    let fresh = scan_line_starts_tail(text_after, from, from + inserted);
    let fresh_count = fresh.len();
    self.starts.splice(lo..hi, fresh);

    let delta = inserted as isize - (to - from) as isize;
    for s in &mut self.starts[lo + fresh_count..] {
      *s = (*s as isize + delta) as usize;
    }

    debug_assert!(self.starts.windows(2).all(|w| w[0] < w[1]));
  }

  #[cfg(test)]
  fn starts(&self) -> &[usize] {
    &self.starts
  }
}

/// Line starts for `from..to`, including the implicit start at 0 when
/// `from == 0`.
fn scan_line_starts(text: RopeSlice, from: usize, to: usize) -> Vec<usize> {
  let mut starts = if from == 0 { vec![0] } else { Vec::new() };
  starts.extend(scan_line_starts_tail(text, from, to));
  starts
}

/// Line starts produced by breaks within `from..to`, excluding any
/// implicit document start.
fn scan_line_starts_tail(text: RopeSlice, from: usize, to: usize) -> Vec<usize> {
  let mut starts = Vec::new();
  for (i, ch) in text.slice(from..to).chars().enumerate() {
    if ch == '\n' {
      starts.push(from + i + 1);
    }
  }
  starts
}
