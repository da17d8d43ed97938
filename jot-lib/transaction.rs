//! Edit operations over the span store.
//!
//! Edits are expressed as a run of [`Operation`]s applied from the start of
//! the document: retain `n` characters, delete `n` characters, or insert a
//! string. A [`ChangeSet`] is such a run together with the document length
//! it expects; a [`Transaction`] pairs a changeset with an optional cursor
//! position to restore when the transaction is applied.
//!
//! Changesets compose (`a` then `b` collapses into one changeset) and
//! invert (the inversion captures deleted text, so applying a changeset and
//! then its inversion restores the prior content exactly). Both properties
//! are what the undo history is built on.
//!
//! All positions are character indices. A range that falls outside the
//! document is an error, never a clamp.

use std::borrow::Cow;

use ropey::{
  Rope,
  RopeSlice,
};
use thiserror::Error;

use crate::Tendril;

pub type Result<T> = std::result::Result<T, TransactionError>;

/// (from, to, replacement) in old-document coordinates. `None` deletes.
pub type Change = (usize, usize, Option<Tendril>);

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransactionError {
  #[error("changeset length mismatch: expected {expected}, got {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("cannot compose: left output length {left_len_after}, right input length {right_len}")]
  ComposeLengthMismatch {
    left_len_after: usize,
    right_len:      usize,
  },
  #[error("invalid change range: start {from} is after end {to}")]
  InvalidRange { from: usize, to: usize },
  #[error("change range {from}..{to} is out of bounds for document length {len}")]
  RangeOutOfBounds {
    from: usize,
    to:   usize,
    len:  usize,
  },
  #[error("change range {from}..{to} overlaps previous end {prev_end}")]
  OverlappingRange {
    prev_end: usize,
    from:     usize,
    to:       usize,
  },
  #[error("position {pos} is out of bounds for changeset length {len}")]
  PositionOutOfBounds { pos: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
  /// Keep n characters unchanged.
  Retain(usize),

  /// Delete n characters.
  Delete(usize),

  /// Insert text at the current position.
  Insert(Tendril),
}

/// Which side of an insertion a mapped position sticks to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assoc {
  Before,
  After,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
  pub(crate) operations: Vec<Operation>,
  /// Document length this changeset applies to. Application refuses to run
  /// against anything else.
  len:                   usize,
  len_after:             usize,
}

impl ChangeSet {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      operations: Vec::with_capacity(capacity),
      len:        0,
      len_after:  0,
    }
  }

  #[must_use]
  pub fn identity(doc: RopeSlice) -> Self {
    let len = doc.len_chars();
    Self {
      operations: Vec::new(),
      len,
      len_after: len,
    }
  }

  pub fn operations(&self) -> &[Operation] {
    &self.operations
  }

  /// The document length this changeset expects.
  pub fn len(&self) -> usize {
    self.len
  }

  /// The document length after this changeset is applied.
  pub fn len_after(&self) -> usize {
    self.len_after
  }

  // Builder operations. Adjacent runs of the same kind are merged so the
  // operation list stays canonical.
  //

  pub fn retain(&mut self, n: usize) {
    if n == 0 {
      return;
    }
    self.len += n;
    self.len_after += n;

    if let Some(Operation::Retain(count)) = self.operations.last_mut() {
      *count += n;
    } else {
      self.operations.push(Operation::Retain(n));
    }
  }

  pub fn delete(&mut self, n: usize) {
    if n == 0 {
      return;
    }
    self.len += n;

    if let Some(Operation::Delete(count)) = self.operations.last_mut() {
      *count += n;
    } else {
      self.operations.push(Operation::Delete(n));
    }
  }

  pub fn insert(&mut self, fragment: Tendril) {
    use Operation::*;

    if fragment.is_empty() {
      return;
    }
    self.len_after += fragment.chars().count();

    // Insertions always sort before an adjacent delete, so a replacement is
    // canonically Insert followed by Delete.
    let new_last = match self.operations.as_mut_slice() {
      [.., Insert(prev)] | [.., Insert(prev), Delete(_)] => {
        prev.push_str(&fragment);
        return;
      },
      [.., last @ Delete(_)] => std::mem::replace(last, Insert(fragment)),
      _ => Insert(fragment),
    };
    self.operations.push(new_last);
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.operations.is_empty() || self.operations == [Operation::Retain(self.len)]
  }

  /// True when this changeset only inserts (possibly at several points).
  pub fn is_insert_only(&self) -> bool {
    !self
      .operations
      .iter()
      .any(|op| matches!(op, Operation::Delete(_)))
  }

  /// If this changeset is a single insertion at one point, returns
  /// `(position, inserted_text)`. Used by undo coalescing.
  pub fn as_single_insert(&self) -> Option<(usize, &str)> {
    let mut pos = 0;
    let mut found: Option<(usize, &str)> = None;
    for op in &self.operations {
      match op {
        Operation::Retain(n) => pos += n,
        Operation::Delete(_) => return None,
        Operation::Insert(s) => {
          if found.is_some() {
            return None;
          }
          found = Some((pos, s.as_str()));
        },
      }
    }
    found
  }

  fn ensure_len(&self, text_len: usize) -> Result<()> {
    if text_len != self.len {
      return Err(TransactionError::LengthMismatch {
        expected: self.len,
        actual:   text_len,
      });
    }
    Ok(())
  }

  /// Apply this changeset in-place.
  pub fn apply(&self, text: &mut Rope) -> Result<()> {
    self.ensure_len(text.len_chars())?;

    let mut pos = 0;
    for op in &self.operations {
      match op {
        Operation::Retain(n) => pos += n,
        Operation::Delete(n) => text.remove(pos..pos + *n),
        Operation::Insert(s) => {
          text.insert(pos, s);
          pos += s.chars().count();
        },
      }
    }
    Ok(())
  }

  /// Returns the changeset that undoes this one. `original_doc` is the
  /// document as it was *before* this changeset was applied; deletions pull
  /// their text from it, which is why the inversion restores content
  /// exactly.
  pub fn invert(&self, original_doc: &Rope) -> Result<Self> {
    if self.operations.is_empty() {
      return Ok(ChangeSet {
        operations: Vec::new(),
        len:        self.len_after,
        len_after:  self.len,
      });
    }

    self.ensure_len(original_doc.len_chars())?;

    let mut inverted = Self::with_capacity(self.operations.len());
    let mut pos = 0;

    for op in &self.operations {
      match op {
        Operation::Retain(n) => {
          inverted.retain(*n);
          pos += n;
        },
        Operation::Delete(n) => {
          let text = Cow::from(original_doc.slice(pos..pos + *n));
          inverted.insert(Tendril::from(text.as_ref()));
          pos += n;
        },
        Operation::Insert(s) => {
          inverted.delete(s.chars().count());
        },
      }
    }

    Ok(inverted)
  }

  /// Combine two changesets into one equivalent to applying `self` then
  /// `other`.
  pub fn compose(self, other: Self) -> Result<Self> {
    if self.len_after != other.len {
      return Err(TransactionError::ComposeLengthMismatch {
        left_len_after: self.len_after,
        right_len:      other.len,
      });
    }

    // An empty side composes to the other unchanged.
    if self.operations.is_empty() {
      return Ok(other);
    }
    if other.operations.is_empty() {
      return Ok(self);
    }

    use std::cmp::Ordering;

    use Operation::*;

    let capacity = self.operations.len();
    let mut ops_a = self.operations.into_iter();
    let mut ops_b = other.operations.into_iter();
    let mut head_a = ops_a.next();
    let mut head_b = ops_b.next();
    let mut out = Self::with_capacity(capacity);

    loop {
      match (head_a, head_b) {
        (None, None) => break,
        // A's deletions happen before B ever sees the text.
        (Some(Delete(n)), b) => {
          out.delete(n);
          head_a = ops_a.next();
          head_b = b;
        },
        // B's insertions land regardless of what A did.
        (a, Some(Insert(s))) => {
          out.insert(s);
          head_a = a;
          head_b = ops_b.next();
        },
        (None, val) | (val, None) => unreachable!("compose desync: {val:?}"),
        (Some(Retain(i)), Some(Retain(j))) => match i.cmp(&j) {
          Ordering::Less => {
            out.retain(i);
            head_a = ops_a.next();
            head_b = Some(Retain(j - i));
          },
          Ordering::Equal => {
            out.retain(i);
            head_a = ops_a.next();
            head_b = ops_b.next();
          },
          Ordering::Greater => {
            out.retain(j);
            head_a = Some(Retain(i - j));
            head_b = ops_b.next();
          },
        },
        (Some(Insert(s)), Some(Delete(j))) => {
          let ins = s.chars().count();
          match ins.cmp(&j) {
            Ordering::Less => {
              head_a = ops_a.next();
              head_b = Some(Delete(j - ins));
            },
            Ordering::Equal => {
              head_a = ops_a.next();
              head_b = ops_b.next();
            },
            Ordering::Greater => {
              // B consumed only a prefix of A's insertion.
              let byte = char_boundary(&s, j);
              head_a = Some(Insert(Tendril::from(&s[byte..])));
              head_b = ops_b.next();
            },
          }
        },
        (Some(Insert(s)), Some(Retain(j))) => {
          let ins = s.chars().count();
          match ins.cmp(&j) {
            Ordering::Less => {
              out.insert(s);
              head_a = ops_a.next();
              head_b = Some(Retain(j - ins));
            },
            Ordering::Equal => {
              out.insert(s);
              head_a = ops_a.next();
              head_b = ops_b.next();
            },
            Ordering::Greater => {
              let byte = char_boundary(&s, j);
              out.insert(Tendril::from(&s[..byte]));
              head_a = Some(Insert(Tendril::from(&s[byte..])));
              head_b = ops_b.next();
            },
          }
        },
        (Some(Retain(i)), Some(Delete(j))) => match i.cmp(&j) {
          Ordering::Less => {
            out.delete(i);
            head_a = ops_a.next();
            head_b = Some(Delete(j - i));
          },
          Ordering::Equal => {
            out.delete(j);
            head_a = ops_a.next();
            head_b = ops_b.next();
          },
          Ordering::Greater => {
            out.delete(j);
            head_a = Some(Retain(i - j));
            head_b = ops_b.next();
          },
        },
      }
    }

    debug_assert!(out.len == self.len);
    Ok(out)
  }

  /// Map a position in the old document through this changeset.
  ///
  /// Positions inside a deleted range collapse to the deletion point.
  /// `assoc` decides which side of an insertion at exactly `pos` the
  /// result sticks to.
  pub fn map_pos(&self, pos: usize, assoc: Assoc) -> Result<usize> {
    if pos > self.len {
      return Err(TransactionError::PositionOutOfBounds { pos, len: self.len });
    }

    let mut old_pos = 0;
    let mut new_pos = 0;

    for op in &self.operations {
      match op {
        Operation::Retain(n) => {
          if pos < old_pos + n {
            return Ok(new_pos + (pos - old_pos));
          }
          old_pos += n;
          new_pos += n;
        },
        Operation::Delete(n) => {
          if pos < old_pos + n {
            return Ok(new_pos);
          }
          old_pos += n;
        },
        Operation::Insert(s) => {
          let ins = s.chars().count();
          if pos == old_pos {
            return Ok(match assoc {
              Assoc::Before => new_pos,
              Assoc::After => new_pos + ins,
            });
          }
          new_pos += ins;
        },
      }
    }

    // pos == self.len and every operation has been consumed.
    Ok(new_pos)
  }

  pub fn changes_iter(&self) -> ChangeIterator<'_> {
    ChangeIterator::new(self)
  }
}

/// Iterates a changeset as `(from, to, replacement)` triples in
/// old-document coordinates.
pub struct ChangeIterator<'a> {
  iter: std::iter::Peekable<std::slice::Iter<'a, Operation>>,
  pos:  usize,
}

impl<'a> ChangeIterator<'a> {
  fn new(changeset: &'a ChangeSet) -> Self {
    Self {
      iter: changeset.operations.iter().peekable(),
      pos:  0,
    }
  }
}

impl Iterator for ChangeIterator<'_> {
  type Item = Change;

  fn next(&mut self) -> Option<Self::Item> {
    use Operation::*;

    loop {
      match self.iter.next()? {
        Retain(len) => {
          self.pos += len;
        },
        Delete(len) => {
          let start = self.pos;
          self.pos += len;
          return Some((start, self.pos, None));
        },
        Insert(s) => {
          let start = self.pos;
          // A delete right after an insert is a replacement.
          if let Some(Delete(len)) = self.iter.peek() {
            self.iter.next();
            self.pos += len;
            return Some((start, self.pos, Some(s.clone())));
          }
          return Some((start, start, Some(s.clone())));
        },
      }
    }
  }
}

/// Byte index of the `n`th char of `s` (or its end).
fn char_boundary(s: &str, n: usize) -> usize {
  s.char_indices().nth(n).map_or(s.len(), |(byte, _)| byte)
}

fn validate_change_bounds(from: usize, to: usize, len: usize) -> Result<()> {
  if from > to {
    return Err(TransactionError::InvalidRange { from, to });
  }
  if to > len {
    return Err(TransactionError::RangeOutOfBounds { from, to, len });
  }
  Ok(())
}

/// A changeset plus the cursor position that should hold after applying it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transaction {
  changes: ChangeSet,
  cursor:  Option<usize>,
}

impl From<ChangeSet> for Transaction {
  fn from(changes: ChangeSet) -> Self {
    Self {
      changes,
      cursor: None,
    }
  }
}

impl Transaction {
  pub fn changes(&self) -> &ChangeSet {
    &self.changes
  }

  /// When set, the cursor position to adopt after this transaction.
  pub fn cursor(&self) -> Option<usize> {
    self.cursor
  }

  pub fn with_cursor(mut self, cursor: usize) -> Self {
    self.cursor = Some(cursor);
    self
  }

  pub fn apply(&self, doc: &mut Rope) -> Result<()> {
    self.changes.apply(doc)
  }

  pub fn invert(&self, original: &Rope) -> Result<Self> {
    Ok(Self {
      changes: self.changes.invert(original)?,
      cursor:  None,
    })
  }

  pub fn compose(mut self, other: Self) -> Result<Self> {
    self.changes = self.changes.compose(other.changes)?;
    // The later transaction's cursor wins.
    self.cursor = other.cursor;
    Ok(self)
  }

  /// Build a transaction from non-overlapping changes sorted by position.
  pub fn change<I>(doc: &Rope, changes: I) -> Result<Self>
  where
    I: IntoIterator<Item = Change>,
  {
    let len = doc.len_chars();
    let changes = changes.into_iter();
    let (lower, upper) = changes.size_hint();
    let mut changeset = ChangeSet::with_capacity(2 * upper.unwrap_or(lower) + 1);

    let mut last = 0;
    for (from, to, replacement) in changes {
      validate_change_bounds(from, to, len)?;
      if from < last {
        return Err(TransactionError::OverlappingRange {
          prev_end: last,
          from,
          to,
        });
      }

      changeset.retain(from - last);
      let removed = to - from;
      match replacement {
        Some(text) => {
          changeset.insert(text);
          changeset.delete(removed);
        },
        None => changeset.delete(removed),
      }
      last = to;
    }
    changeset.retain(len - last);

    Ok(Self::from(changeset))
  }

  /// Insert `text` at `pos`, leaving the cursor after the insertion.
  pub fn insert_at(doc: &Rope, pos: usize, text: Tendril) -> Result<Self> {
    let end_cursor = pos + text.chars().count();
    Ok(
      Self::change(doc, std::iter::once((pos, pos, Some(text))))?.with_cursor(end_cursor),
    )
  }

  /// Delete `from..to`, leaving the cursor at the deletion point.
  pub fn delete_range(doc: &Rope, from: usize, to: usize) -> Result<Self> {
    Ok(Self::change(doc, std::iter::once((from, to, None)))?.with_cursor(from))
  }

  pub fn changes_iter(&self) -> ChangeIterator<'_> {
    self.changes.changes_iter()
  }
}
