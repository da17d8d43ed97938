//! The span store: document text as a sequence of immutable chunks.
//!
//! Backed by [`ropey::Rope`], whose leaf chunks are the spans: a balanced
//! tree of copy-on-write string runs with O(log n) insertion and deletion
//! at arbitrary offsets. The rope maintains the invariant that the chunk
//! lengths sum to the document length, and keeps per-node line counts that
//! the line index leans on.
//!
//! Offsets are character indices validated against `[0, len]`; anything
//! outside is a [`StoreError`] surfaced to the caller, never a clamp.
//! Mutation happens either through the direct `insert`/`delete` contract
//! or by applying a validated [`ChangeSet`]; both leave the store
//! untouched on error.

use std::borrow::Cow;

use ropey::{
  Rope,
  RopeSlice,
};
use thiserror::Error;

use crate::{
  Tendril,
  transaction::ChangeSet,
};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Range errors: a caller handed us an offset outside the document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
  #[error("offset {offset} is out of bounds for document length {len}")]
  OffsetOutOfBounds { offset: usize, len: usize },
  #[error("range {from}..{to} is out of bounds for document length {len}")]
  RangeOutOfBounds {
    from: usize,
    to:   usize,
    len:  usize,
  },
  #[error("invalid range: start {from} is after end {to}")]
  InvalidRange { from: usize, to: usize },
}

#[derive(Debug, Clone, Default)]
pub struct SpanStore {
  text: Rope,
}

impl SpanStore {
  pub fn new() -> Self {
    Self { text: Rope::new() }
  }

  pub fn from_rope(text: Rope) -> Self {
    Self { text }
  }

  pub fn from_str(text: &str) -> Self {
    Self {
      text: Rope::from_str(text),
    }
  }

  #[inline]
  pub fn len_chars(&self) -> usize {
    self.text.len_chars()
  }

  #[inline]
  pub fn len_bytes(&self) -> usize {
    self.text.len_bytes()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.text.len_chars() == 0
  }

  /// The full text as a rope slice. Reads through this are zero-copy.
  #[inline]
  pub fn slice_all(&self) -> RopeSlice<'_> {
    self.text.slice(..)
  }

  pub fn rope(&self) -> &Rope {
    &self.text
  }

  /// Iterate the store's spans in document order. Concatenated they are
  /// the document; their lengths sum to `len_bytes`.
  pub fn spans(&self) -> impl Iterator<Item = &str> {
    self.text.chunks()
  }

  fn validate_range(&self, from: usize, to: usize) -> Result<()> {
    if from > to {
      return Err(StoreError::InvalidRange { from, to });
    }
    let len = self.text.len_chars();
    if to > len {
      return Err(StoreError::RangeOutOfBounds { from, to, len });
    }
    Ok(())
  }

  /// Read `from..to`. Borrows when the range lies within one span.
  pub fn read(&self, from: usize, to: usize) -> Result<Cow<'_, str>> {
    self.validate_range(from, to)?;
    Ok(Cow::from(self.text.slice(from..to)))
  }

  /// Insert `text` at `offset`. `offset == len` appends.
  pub fn insert(&mut self, offset: usize, text: &str) -> Result<()> {
    let len = self.text.len_chars();
    if offset > len {
      return Err(StoreError::OffsetOutOfBounds { offset, len });
    }
    self.text.insert(offset, text);
    Ok(())
  }

  /// Delete `from..to` and return the removed text.
  pub fn delete(&mut self, from: usize, to: usize) -> Result<Tendril> {
    self.validate_range(from, to)?;
    let removed = Tendril::from(Cow::from(self.text.slice(from..to)).as_ref());
    self.text.remove(from..to);
    Ok(removed)
  }

  /// Apply a validated changeset in-place. The changeset's expected length
  /// is checked before any mutation happens, so a failure leaves the store
  /// unchanged.
  pub fn apply(&mut self, changes: &ChangeSet) -> crate::transaction::Result<()> {
    changes.apply(&mut self.text)?;
    debug_assert_eq!(self.text.len_chars(), changes.len_after());
    Ok(())
  }
}

impl From<Rope> for SpanStore {
  fn from(text: Rope) -> Self {
    Self::from_rope(text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_delete_read() {
    let mut store = SpanStore::from_str("hello world");

    store.insert(5, ",").unwrap();
    assert_eq!(store.read(0, store.len_chars()).unwrap(), "hello, world");

    let removed = store.delete(5, 6).unwrap();
    assert_eq!(removed, Tendril::from(","));
    assert_eq!(store.read(0, store.len_chars()).unwrap(), "hello world");
  }

  #[test]
  fn append_at_len_is_allowed() {
    let mut store = SpanStore::from_str("abc");
    store.insert(3, "def").unwrap();
    assert_eq!(store.read(0, 6).unwrap(), "abcdef");
  }

  #[test]
  fn out_of_range_is_an_error_not_a_clamp() {
    let mut store = SpanStore::from_str("abc");

    assert_eq!(store.insert(4, "x"), Err(StoreError::OffsetOutOfBounds {
      offset: 4,
      len:    3,
    }));
    assert_eq!(store.read(1, 9).unwrap_err(), StoreError::RangeOutOfBounds {
      from: 1,
      to:   9,
      len:  3,
    });
    assert_eq!(store.delete(2, 1).unwrap_err(), StoreError::InvalidRange {
      from: 2,
      to:   1,
    });
    // Nothing mutated.
    assert_eq!(store.read(0, 3).unwrap(), "abc");
  }

  #[test]
  fn spans_concatenate_to_document() {
    let text = "the quick brown fox\n".repeat(2000);
    let store = SpanStore::from_str(&text);

    let mut total = 0;
    let mut rebuilt = String::with_capacity(text.len());
    for span in store.spans() {
      total += span.len();
      rebuilt.push_str(span);
    }
    assert_eq!(total, store.len_bytes());
    assert_eq!(rebuilt, text);
  }

  #[test]
  fn delete_returns_multibyte_text_intact() {
    let mut store = SpanStore::from_str("a世界b");
    let removed = store.delete(1, 3).unwrap();
    assert_eq!(removed, Tendril::from("世界"));
    assert_eq!(store.read(0, 2).unwrap(), "ab");
  }
}
