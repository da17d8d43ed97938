//! Undo/redo history with keystroke coalescing.
//!
//! The history is a pair of stacks of [`Revision`]s. Each revision stores
//! the forward transaction, an inversion built against the document as it
//! was before the transaction (delete operations don't carry the text they
//! remove, so the inversion is captured at commit time), and a timestamp.
//!
//! Committing clears the redo stack: once the user edits past an undo the
//! divergent timeline is gone. Undo and redo underflow are observable
//! no-ops, not errors.
//!
//! # Coalescing
//!
//! Consecutive single-point insertions compose into one revision when they
//! continue the previous insertion run (new text starts where the last
//! ended), land within the policy's timeout, and the run hasn't hit its
//! cap. Inserting a line ending always starts a new revision, as does any
//! delete or an explicit [`History::break_run`] (cursor moves, clicks).
//! Undoing a coalesced revision therefore removes the whole typed word,
//! not one character.

use std::time::{
  Duration,
  Instant,
};

use ropey::Rope;
use thiserror::Error;

use crate::transaction::{
  Transaction,
  TransactionError,
};

pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Error)]
pub enum HistoryError {
  #[error("transaction error: {0}")]
  Transaction(#[from] TransactionError),
}

/// When consecutive insertions merge into one undo unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescePolicy {
  /// Inserts further apart than this start a new revision.
  pub timeout: Duration,
  /// Maximum number of insert transactions merged into one revision.
  pub max_run: usize,
}

impl CoalescePolicy {
  /// Full-fidelity interactive typing.
  pub const fn full() -> Self {
    Self {
      timeout: Duration::from_millis(750),
      max_run: 100,
    }
  }

  /// Performance Mode keeps coalescing within a small window only.
  pub const fn performance() -> Self {
    Self {
      timeout: Duration::from_millis(250),
      max_run: 16,
    }
  }
}

impl Default for CoalescePolicy {
  fn default() -> Self {
    Self::full()
  }
}

#[derive(Debug, Clone)]
struct Revision {
  transaction: Transaction,
  inversion:   Transaction,
  timestamp:   Instant,
  /// Where the last coalesced insertion ended, if this revision is an
  /// open insert run.
  run_end:     Option<usize>,
  /// Number of transactions merged into this revision.
  run_len:     usize,
}

#[derive(Debug)]
pub struct History {
  undo:   Vec<Revision>,
  redo:   Vec<Revision>,
  policy: CoalescePolicy,
}

impl History {
  pub fn new(policy: CoalescePolicy) -> Self {
    Self {
      undo: Vec::new(),
      redo: Vec::new(),
      policy,
    }
  }

  /// Number of undoable revisions.
  pub fn len(&self) -> usize {
    self.undo.len()
  }

  pub fn is_empty(&self) -> bool {
    self.undo.is_empty()
  }

  pub fn redo_len(&self) -> usize {
    self.redo.len()
  }

  /// End the current insert run; the next commit starts a new revision.
  /// Called on cursor moves, selection changes, and focus changes.
  pub fn break_run(&mut self) {
    if let Some(last) = self.undo.last_mut() {
      last.run_end = None;
    }
  }

  /// Record `transaction` against `original` (the document before the
  /// transaction was applied). Clears the redo stack.
  pub fn commit(&mut self, transaction: &Transaction, original: &Rope) -> Result<()> {
    self.commit_at(transaction, original, Instant::now())
  }

  pub fn commit_at(
    &mut self,
    transaction: &Transaction,
    original: &Rope,
    timestamp: Instant,
  ) -> Result<()> {
    if !self.redo.is_empty() {
      tracing::debug!(discarded = self.redo.len(), "clearing redo stack");
      self.redo.clear();
    }

    let inversion = transaction.invert(original)?;
    let insert = transaction.changes().as_single_insert();

    if let Some((pos, text)) = insert
      && self.try_coalesce(transaction, original, timestamp, pos, text)?
    {
      return Ok(());
    }

    let run_end = insert
      .filter(|(_, text)| !ends_run(text))
      .map(|(pos, text)| pos + text.chars().count());

    self.undo.push(Revision {
      transaction: transaction.clone(),
      inversion,
      timestamp,
      run_end,
      run_len: 1,
    });
    Ok(())
  }

  /// Merge an insertion into the previous revision when the policy allows.
  /// Returns true if the transaction was absorbed.
  fn try_coalesce(
    &mut self,
    transaction: &Transaction,
    original: &Rope,
    timestamp: Instant,
    pos: usize,
    text: &str,
  ) -> Result<bool> {
    let Some(last) = self.undo.last_mut() else {
      return Ok(false);
    };
    let Some(run_end) = last.run_end else {
      return Ok(false);
    };

    let continues = pos == run_end
      && last.run_len < self.policy.max_run
      && timestamp.saturating_duration_since(last.timestamp) <= self.policy.timeout
      && !ends_run(text);
    if !continues {
      return Ok(false);
    }

    // Applying the merged revision is prev then this, so the merged
    // inversion is this-inverted then prev-inverted.
    let merged_tx = last.transaction.clone().compose(transaction.clone())?;
    let merged_inv = transaction.invert(original)?.compose(last.inversion.clone())?;

    last.transaction = merged_tx;
    last.inversion = merged_inv;
    last.timestamp = timestamp;
    last.run_end = Some(pos + text.chars().count());
    last.run_len += 1;
    Ok(true)
  }

  /// The transaction that would undo the latest revision, or `None` when
  /// there is nothing to undo. The caller applies it, then confirms with
  /// [`applied_undo`] so history state only moves after a successful
  /// application.
  ///
  /// [`applied_undo`]: History::applied_undo
  pub fn undo(&self) -> Option<&Transaction> {
    self.undo.last().map(|rev| &rev.inversion)
  }

  /// The transaction that would redo the latest undone revision.
  pub fn redo(&self) -> Option<&Transaction> {
    self.redo.last().map(|rev| &rev.transaction)
  }

  pub fn applied_undo(&mut self) {
    if let Some(mut rev) = self.undo.pop() {
      rev.run_end = None;
      self.redo.push(rev);
    }
  }

  pub fn applied_redo(&mut self) {
    if let Some(rev) = self.redo.pop() {
      self.undo.push(rev);
    }
  }
}

impl Default for History {
  fn default() -> Self {
    Self::new(CoalescePolicy::default())
  }
}

/// Line endings end a coalescing run, Tk-autoseparator style: undo should
/// not swallow text across a newline.
fn ends_run(text: &str) -> bool {
  text.chars().any(jot_core::chars::char_is_line_ending)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn insert(doc: &Rope, pos: usize, text: &str) -> Transaction {
    Transaction::insert_at(doc, pos, text.into()).unwrap()
  }

  fn commit_and_apply(history: &mut History, doc: &mut Rope, tx: &Transaction, at: Instant) {
    history.commit_at(tx, doc, at).unwrap();
    tx.apply(doc).unwrap();
  }

  fn undo(history: &mut History, doc: &mut Rope) -> bool {
    let Some(inversion) = history.undo().cloned() else {
      return false;
    };
    inversion.apply(doc).unwrap();
    history.applied_undo();
    true
  }

  fn redo(history: &mut History, doc: &mut Rope) -> bool {
    let Some(tx) = history.redo().cloned() else {
      return false;
    };
    tx.apply(doc).unwrap();
    history.applied_redo();
    true
  }

  #[test]
  fn undo_redo_roundtrip() {
    let mut history = History::default();
    let mut doc = Rope::from("hello");
    let t0 = Instant::now();

    let tx = insert(&doc, 5, " world");
    commit_and_apply(&mut history, &mut doc, &tx, t0);
    history.break_run();

    let tx = Transaction::change(&doc, vec![(6, 11, Some("世界".into()))]).unwrap();
    commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_secs(5));
    assert_eq!(doc, "hello 世界");

    assert!(undo(&mut history, &mut doc));
    assert_eq!(doc, "hello world");
    assert!(redo(&mut history, &mut doc));
    assert_eq!(doc, "hello 世界");

    assert!(undo(&mut history, &mut doc));
    assert!(undo(&mut history, &mut doc));
    assert_eq!(doc, "hello");

    // Underflow is a no-op, not an error.
    assert!(!undo(&mut history, &mut doc));
    assert_eq!(doc, "hello");
  }

  #[test]
  fn typing_a_word_coalesces_to_one_revision() {
    let mut history = History::default();
    let mut doc = Rope::from("");
    let t0 = Instant::now();

    for (i, ch) in ["h", "e", "l", "l", "o"].iter().enumerate() {
      let tx = insert(&doc, i, ch);
      commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_millis(i as u64 * 40));
    }

    assert_eq!(doc, "hello");
    assert_eq!(history.len(), 1);

    assert!(undo(&mut history, &mut doc));
    assert_eq!(doc, "");
  }

  #[test]
  fn timeout_starts_a_new_revision() {
    let mut history = History::new(CoalescePolicy {
      timeout: Duration::from_millis(100),
      max_run: 100,
    });
    let mut doc = Rope::from("");
    let t0 = Instant::now();

    let tx = insert(&doc, 0, "a");
    commit_and_apply(&mut history, &mut doc, &tx, t0);
    let tx = insert(&doc, 1, "b");
    commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_millis(50));
    let tx = insert(&doc, 2, "c");
    commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_secs(2));

    assert_eq!(history.len(), 2);
    assert!(undo(&mut history, &mut doc));
    assert_eq!(doc, "ab");
  }

  #[test]
  fn cursor_break_and_nonadjacent_insert_split_runs() {
    let mut history = History::default();
    let mut doc = Rope::from("");
    let t0 = Instant::now();

    let tx = insert(&doc, 0, "ab");
    commit_and_apply(&mut history, &mut doc, &tx, t0);
    history.break_run();
    let tx = insert(&doc, 2, "cd");
    commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_millis(10));
    assert_eq!(history.len(), 2);

    // Insert somewhere else entirely: never coalesced.
    let tx = insert(&doc, 0, "x");
    commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_millis(20));
    assert_eq!(history.len(), 3);
  }

  #[test]
  fn newline_ends_the_run() {
    let mut history = History::default();
    let mut doc = Rope::from("");
    let t0 = Instant::now();

    let tx = insert(&doc, 0, "a");
    commit_and_apply(&mut history, &mut doc, &tx, t0);
    let tx = insert(&doc, 1, "\n");
    commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_millis(10));
    let tx = insert(&doc, 2, "b");
    commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_millis(20));

    assert_eq!(history.len(), 3);
  }

  #[test]
  fn delete_is_never_coalesced() {
    let mut history = History::default();
    let mut doc = Rope::from("");
    let t0 = Instant::now();

    let tx = insert(&doc, 0, "abc");
    commit_and_apply(&mut history, &mut doc, &tx, t0);
    let tx = Transaction::delete_range(&doc, 2, 3).unwrap();
    commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_millis(10));

    assert_eq!(history.len(), 2);
    assert!(undo(&mut history, &mut doc));
    assert_eq!(doc, "abc");
  }

  #[test]
  fn commit_clears_redo() {
    let mut history = History::default();
    let mut doc = Rope::from("");
    let t0 = Instant::now();

    let tx = insert(&doc, 0, "a");
    commit_and_apply(&mut history, &mut doc, &tx, t0);
    history.break_run();
    let tx = insert(&doc, 1, "b");
    commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_secs(2));

    assert!(undo(&mut history, &mut doc));
    assert_eq!(history.redo_len(), 1);

    // A fresh edit discards the divergent timeline.
    let tx = insert(&doc, 1, "z");
    commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_secs(4));
    assert_eq!(history.redo_len(), 0);
    assert!(!redo(&mut history, &mut doc));
    assert_eq!(doc, "az");
  }

  #[test]
  fn max_run_caps_coalescing() {
    let mut history = History::new(CoalescePolicy {
      timeout: Duration::from_secs(10),
      max_run: 3,
    });
    let mut doc = Rope::from("");
    let t0 = Instant::now();

    for i in 0..7 {
      let tx = insert(&doc, i, "x");
      commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_millis(i as u64));
    }

    // 7 inserts with a cap of 3: revisions of 3, 3, 1.
    assert_eq!(history.len(), 3);
    assert!(undo(&mut history, &mut doc));
    assert_eq!(doc, "xxxxxx");
    assert!(undo(&mut history, &mut doc));
    assert_eq!(doc, "xxx");
  }

  #[test]
  fn coalesced_undo_restores_exactly() {
    let mut history = History::default();
    let mut doc = Rope::from("prefix ");
    let t0 = Instant::now();

    let baseline = doc.clone();
    for (i, ch) in "word".chars().enumerate() {
      let tx = insert(&doc, 7 + i, &ch.to_string());
      commit_and_apply(&mut history, &mut doc, &tx, t0 + Duration::from_millis(i as u64));
    }
    assert_eq!(doc, "prefix word");
    assert_eq!(history.len(), 1);

    assert!(undo(&mut history, &mut doc));
    assert_eq!(doc, baseline);
    assert!(redo(&mut history, &mut doc));
    assert_eq!(doc, "prefix word");
  }
}
