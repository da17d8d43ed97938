//! Dirty-region tracking for syntax highlighting.
//!
//! The tracker accumulates the char range that needs retokenizing. Every
//! edit widens the pending range; the highlight worker drains it with
//! [`DirtyTracker::take_dirty`], tokenizes a snapshot, and reports back
//! what it actually covered. The invariant throughout is that the dirty
//! region is a superset of the text whose highlighting is out of date,
//! so a crash or a dropped result can only cause extra work, never stale
//! colors.

use crate::transaction::{
  Assoc,
  ChangeSet,
};
use ropey::RopeSlice;
use thiserror::Error;

/// Half-open char range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharRange {
  pub start: usize,
  pub end:   usize,
}

impl CharRange {
  pub fn new(start: usize, end: usize) -> Self {
    debug_assert!(start <= end);
    Self { start, end }
  }

  pub fn is_empty(&self) -> bool {
    self.start >= self.end
  }

  pub fn len(&self) -> usize {
    self.end.saturating_sub(self.start)
  }

  /// Smallest range covering both.
  pub fn union(self, other: Self) -> Self {
    Self {
      start: self.start.min(other.start),
      end:   self.end.max(other.end),
    }
  }

  pub fn contains_range(&self, other: &Self) -> bool {
    self.start <= other.start && other.end <= self.end
  }
}

/// Token classes the highlighter can produce. Closed set: tokenizers map
/// whatever their grammar emits onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
  Keyword,
  Identifier,
  Function,
  Type,
  String,
  Escape,
  Number,
  Operator,
  Punctuation,
  Comment,
  Whitespace,
  Error,
  Text,
}

/// A highlighted span in char coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
  pub range: CharRange,
  pub kind:  TokenKind,
}

/// What a tokenizer run produced: the range it actually covered (always a
/// superset of what was requested, widened to line boundaries) and the
/// tokens within it.
#[derive(Debug, Clone)]
pub struct Retokenization {
  pub processed: CharRange,
  pub tokens:    Vec<TokenSpan>,
}

#[derive(Debug, Error)]
pub enum TokenizerError {
  #[error("tokenizer failed over {start}..{end}: {message}")]
  Failed {
    start:   usize,
    end:     usize,
    message: String,
  },
}

/// A syntax tokenizer. Runs over a snapshot slice; must not assume the
/// live document still matches by the time results land.
pub trait Tokenizer: Send + Sync {
  fn tokenize(&self, text: RopeSlice, range: CharRange) -> Result<Retokenization, TokenizerError>;
}

/// Accumulates the region whose highlighting is stale.
#[derive(Debug, Default)]
pub struct DirtyTracker {
  dirty: Option<CharRange>,
}

impl DirtyTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Mark the whole document dirty. Used on load and on tokenizer
  /// failure recovery.
  pub fn mark_all(&mut self, len_chars: usize) {
    self.mark_dirty(CharRange::new(0, len_chars));
  }

  pub fn mark_dirty(&mut self, range: CharRange) {
    self.dirty = Some(match self.dirty {
      Some(existing) => existing.union(range),
      None => range,
    });
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty.is_some_and(|range| !range.is_empty())
  }

  pub fn dirty(&self) -> Option<CharRange> {
    self.dirty
  }

  /// Widen the dirty region for an edit: the edited span, extended to
  /// full lines plus `context_lines` above and below (multi-line string
  /// and comment constructs re-color beyond the touched chars), unioned
  /// with whatever was already pending. Pending ranges from earlier
  /// edits are remapped through the changeset first so they still point
  /// at the same text.
  pub fn extend_for_edit(
    &mut self,
    text_after: RopeSlice,
    changes: &ChangeSet,
    context_lines: usize,
  ) {
    if let Some(existing) = self.dirty.take() {
      let len = changes.len();
      let start = changes
        .map_pos(existing.start.min(len), Assoc::Before)
        .unwrap_or(0);
      let end = changes
        .map_pos(existing.end.min(len), Assoc::After)
        .unwrap_or(changes.len_after());
      self.dirty = Some(CharRange::new(start.min(end), start.max(end)));
    }

    // changes_iter yields old-document coordinates; track the running
    // length delta to place each edit in the new document.
    let mut delta: isize = 0;
    for (from, to, inserted) in changes.changes_iter() {
      let inserted_len = inserted.as_ref().map_or(0, |text| text.chars().count());
      let new_from = (from as isize + delta).max(0) as usize;
      let edited = CharRange::new(new_from, new_from + inserted_len);
      self.mark_dirty(widen_to_lines(text_after, edited, context_lines));
      delta += inserted_len as isize - (to - from) as isize;
    }
  }

  /// Take the pending region, leaving the tracker clean. The caller owns
  /// getting it retokenized; if that fails, [`mark_dirty`] it back.
  ///
  /// [`mark_dirty`]: DirtyTracker::mark_dirty
  pub fn take_dirty(&mut self) -> Option<CharRange> {
    self.dirty.take().filter(|range| !range.is_empty())
  }

  /// A retokenization finished. Anything it did not cover stays dirty.
  pub fn on_retokenized(&mut self, requested: CharRange, processed: CharRange) {
    if processed.contains_range(&requested) {
      return;
    }
    if requested.start < processed.start {
      self.mark_dirty(CharRange::new(requested.start, processed.start));
    }
    if processed.end < requested.end {
      self.mark_dirty(CharRange::new(processed.end, requested.end));
    }
  }
}

/// Extend `range` to whole lines with `context_lines` of surrounding
/// context, clamped to the document.
pub fn widen_to_lines(text: RopeSlice, range: CharRange, context_lines: usize) -> CharRange {
  let len = text.len_chars();
  let start = range.start.min(len);
  let end = range.end.min(len);

  let first_line = text.char_to_line(start).saturating_sub(context_lines);
  let last_line = (text.char_to_line(end) + context_lines + 1).min(text.len_lines());

  CharRange::new(
    text.line_to_char(first_line),
    if last_line >= text.len_lines() {
      len
    } else {
      text.line_to_char(last_line)
    },
  )
}
