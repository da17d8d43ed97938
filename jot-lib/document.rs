//! A single open document: text, line index, undo history, highlight
//! state, and editing mode, kept consistent through every edit.
//!
//! All mutation funnels through [`Document::apply_transaction`]. A
//! transaction is validated before anything is touched, so a rejected
//! edit leaves the document byte-for-byte unchanged; once it passes, the
//! store, line index, history, dirty tracker, version, and cursor all
//! move together.

use std::{
  num::NonZeroUsize,
  path::{
    Path,
    PathBuf,
  },
};

use encoding_rs::Encoding;
use ropey::{
  Rope,
  RopeSlice,
};
use thiserror::Error;

use crate::{
  Tendril,
  config::Config,
  highlight::{
    CharRange,
    DirtyTracker,
    Retokenization,
    TokenSpan,
  },
  highlight_async::HighlightEvent,
  history::{
    History,
    HistoryError,
  },
  io::{
    self,
    IoError,
    LoadedFile,
  },
  language::Language,
  line_index::{
    LineIndex,
    LineIndexError,
  },
  mode::Mode,
  store::{
    SpanStore,
    StoreError,
  },
  transaction::{
    Assoc,
    Transaction,
    TransactionError,
  },
};
use jot_core::line_ending::{
  LineEnding,
  NATIVE_LINE_ENDING,
};

pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Error)]
pub enum DocumentError {
  #[error(transparent)]
  Transaction(#[from] TransactionError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  LineIndex(#[from] LineIndexError),
  #[error(transparent)]
  History(#[from] HistoryError),
  #[error(transparent)]
  Io(#[from] IoError),
  #[error("document has no file path")]
  NoPath,
}

/// Identifies a document within a workspace. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(pub NonZeroUsize);

impl Default for DocumentId {
  fn default() -> Self {
    Self(NonZeroUsize::MIN)
  }
}

impl std::fmt::Display for DocumentId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "doc{}", self.0)
  }
}

pub struct Document {
  id:           DocumentId,
  path:         Option<PathBuf>,
  store:        SpanStore,
  line_index:   LineIndex,
  history:      History,
  dirty:        DirtyTracker,
  tokens:       Vec<TokenSpan>,
  mode:         Mode,
  language:     Language,
  line_ending:  LineEnding,
  encoding:     &'static Encoding,
  config:       Config,
  cursor:       usize,
  /// Bumped on every applied transaction, undo, and redo. Async results
  /// carry the version of the snapshot they were produced from.
  version:      u64,
  modified:     bool,
}

impl Document {
  /// An empty, unnamed document. Always Full mode.
  pub fn new_untitled(id: DocumentId, config: Config) -> Self {
    let store = SpanStore::new();
    let mut doc = Self {
      id,
      path: None,
      line_index: LineIndex::new(store.slice_all()),
      history: History::new(config.coalesce.policy(Mode::Full)),
      dirty: DirtyTracker::new(),
      tokens: Vec::new(),
      mode: Mode::Full,
      language: Language::Text,
      line_ending: NATIVE_LINE_ENDING,
      encoding: encoding_rs::UTF_8,
      config,
      cursor: 0,
      version: 0,
      modified: false,
      store,
    };
    doc.dirty.mark_all(doc.store.len_chars());
    doc
  }

  /// Open a file. Mode is selected from the on-disk size and stays fixed
  /// for the document's lifetime.
  pub fn open(id: DocumentId, path: &Path, config: Config) -> Result<Self> {
    let loaded = io::load(path)?;
    Ok(Self::from_loaded(id, path.to_path_buf(), loaded, config))
  }

  pub fn from_loaded(id: DocumentId, path: PathBuf, loaded: LoadedFile, config: Config) -> Self {
    let mode = Mode::select(loaded.size_bytes, config.performance_threshold_bytes);
    let first_line: String = loaded.text.line(0).chars().take(128).collect();
    let language = Language::detect(&path, &first_line);
    let store = SpanStore::from_rope(loaded.text);

    let line_index = if mode.is_performance() {
      LineIndex::lazy()
    } else {
      LineIndex::new(store.slice_all())
    };

    tracing::info!(
      id = %id,
      path = %path.display(),
      size_bytes = loaded.size_bytes,
      ?mode,
      ?language,
      "opened document"
    );

    let mut doc = Self {
      id,
      path: Some(path),
      line_index,
      history: History::new(config.coalesce.policy(mode)),
      dirty: DirtyTracker::new(),
      tokens: Vec::new(),
      mode,
      language,
      line_ending: loaded.line_ending,
      encoding: loaded.encoding,
      config,
      cursor: 0,
      version: 0,
      modified: false,
      store,
    };
    if doc.mode.highlights() {
      doc.dirty.mark_all(doc.store.len_chars());
    }
    doc
  }

  pub fn id(&self) -> DocumentId {
    self.id
  }

  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  pub fn display_name(&self) -> String {
    self
      .path
      .as_deref()
      .and_then(Path::file_name)
      .and_then(|name| name.to_str())
      .map(str::to_owned)
      .unwrap_or_else(|| "untitled".to_owned())
  }

  pub fn mode(&self) -> Mode {
    self.mode
  }

  pub fn language(&self) -> Language {
    self.language
  }

  pub fn line_ending(&self) -> LineEnding {
    self.line_ending
  }

  pub fn version(&self) -> u64 {
    self.version
  }

  pub fn is_modified(&self) -> bool {
    self.modified
  }

  pub fn cursor(&self) -> usize {
    self.cursor
  }

  pub fn len_chars(&self) -> usize {
    self.store.len_chars()
  }

  pub fn text(&self) -> RopeSlice<'_> {
    self.store.slice_all()
  }

  pub fn tokens(&self) -> &[TokenSpan] {
    &self.tokens
  }

  /// A cheap immutable snapshot of the text, for read-only consumers
  /// (linters, background workers) that must not hold the document lock.
  pub fn snapshot(&self) -> Rope {
    self.store.rope().clone()
  }

  /// Read a slice of the document. Out-of-range requests are errors, not
  /// clamped.
  pub fn read(&self, from: usize, to: usize) -> Result<std::borrow::Cow<'_, str>> {
    Ok(self.store.read(from, to)?)
  }

  pub fn line_count(&mut self) -> usize {
    self.line_index.line_count(self.store.slice_all())
  }

  pub fn offset_of_line(&mut self, line: usize) -> Result<usize> {
    Ok(self.line_index.offset_of_line(self.store.slice_all(), line)?)
  }

  pub fn line_of_offset(&mut self, offset: usize) -> Result<usize> {
    Ok(self.line_index.line_of_offset(self.store.slice_all(), offset)?)
  }

  /// Insert `text` at `offset`, leaving the cursor after it.
  pub fn insert(&mut self, offset: usize, text: &str) -> Result<()> {
    let tx = Transaction::insert_at(self.store.rope(), offset, text.into())?;
    self.apply_transaction(&tx)
  }

  /// Delete `[from, to)`, returning the removed text.
  pub fn delete(&mut self, from: usize, to: usize) -> Result<Tendril> {
    let removed: Tendril = self.store.read(from, to)?.into();
    let tx = Transaction::delete_range(self.store.rope(), from, to)?;
    self.apply_transaction(&tx)?;
    Ok(removed)
  }

  /// Replace `[from, to)` with `text` as one atomic edit.
  pub fn replace(&mut self, from: usize, to: usize, text: &str) -> Result<()> {
    let end_cursor = from + text.chars().count();
    let tx = Transaction::change(self.store.rope(), std::iter::once((
      from,
      to,
      Some(Tendril::from(text)),
    )))?
    .with_cursor(end_cursor);
    self.apply_transaction(&tx)
  }

  /// Apply a validated transaction and record it in history.
  pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<()> {
    if tx.changes().is_empty() {
      return Ok(());
    }
    let original = self.store.rope().clone();
    self.history.commit(tx, &original)?;
    self.apply_without_history(tx)?;
    Ok(())
  }

  /// Undo the latest revision. Returns false when there is nothing to
  /// undo.
  pub fn undo(&mut self) -> Result<bool> {
    let Some(inversion) = self.history.undo().cloned() else {
      return Ok(false);
    };
    self.apply_without_history(&inversion)?;
    self.history.applied_undo();
    tracing::debug!(id = %self.id, version = self.version, "undo");
    Ok(true)
  }

  /// Re-apply the latest undone revision. Returns false when the redo
  /// stack is empty.
  pub fn redo(&mut self) -> Result<bool> {
    let Some(tx) = self.history.redo().cloned() else {
      return Ok(false);
    };
    self.apply_without_history(&tx)?;
    self.history.applied_redo();
    tracing::debug!(id = %self.id, version = self.version, "redo");
    Ok(true)
  }

  fn apply_without_history(&mut self, tx: &Transaction) -> Result<()> {
    let single = single_change(tx);
    self.store.apply(tx.changes())?;
    let text = self.store.slice_all();

    if self.mode.is_performance() && self.line_index.is_stale() {
      // Lazy index stays lazy until queried.
    } else {
      match single {
        Some((from, to, inserted)) => self.line_index.edit(text, from, to, inserted),
        None => self.line_index.invalidate(),
      }
    }

    let context = self.language.highlight_context_lines() + self.config.highlight.context_lines;
    self.dirty.extend_for_edit(text, tx.changes(), context);

    match tx.cursor() {
      Some(cursor) => self.cursor = cursor.min(self.store.len_chars()),
      // Inversions carry no cursor of their own. Map the current cursor
      // through the edit so it stays in bounds after undo.
      None => {
        let changes = tx.changes();
        self.cursor = changes
          .map_pos(self.cursor.min(changes.len()), Assoc::After)
          .unwrap_or_else(|_| self.store.len_chars());
      }
    }
    self.version += 1;
    self.modified = true;
    Ok(())
  }

  /// Move the cursor. Ends the current undo coalescing run.
  pub fn set_cursor(&mut self, pos: usize) -> Result<()> {
    if pos > self.store.len_chars() {
      return Err(
        TransactionError::PositionOutOfBounds {
          pos,
          len: self.store.len_chars(),
        }
        .into(),
      );
    }
    self.cursor = pos;
    self.history.break_run();
    Ok(())
  }

  /// The event to hand the highlight worker, if this document wants
  /// retokenization. Performance Mode never highlights.
  pub fn highlight_event(&self) -> Option<HighlightEvent> {
    if !self.mode.highlights() {
      return None;
    }
    let range = self.dirty.dirty().filter(|range| !range.is_empty())?;
    Some(HighlightEvent {
      snapshot: self.store.rope().clone(),
      version: self.version,
      range,
      request_id: 0,
    })
  }

  /// Accept a finished retokenization: replaces tokens in the processed
  /// range and clears the corresponding dirty region. The caller has
  /// already checked the result is for the current version.
  pub fn apply_retokenization(&mut self, requested: CharRange, result: Retokenization) {
    let processed = result.processed;
    self
      .tokens
      .retain(|span| span.range.end <= processed.start || span.range.start >= processed.end);
    self.tokens.extend(result.tokens);
    self.tokens.sort_by_key(|span| span.range.start);

    if let Some(pending) = self.dirty.take_dirty() {
      // Keep whatever the run did not cover.
      self.dirty.on_retokenized(pending, processed);
    }
    self.dirty.on_retokenized(requested, processed);
  }

  /// A tokenizer run failed; keep old tokens and leave the range dirty
  /// for a retry.
  pub fn retokenization_failed(&mut self, requested: CharRange) {
    tracing::warn!(id = %self.id, "retokenization failed, keeping previous tokens");
    self.dirty.mark_dirty(requested);
  }

  /// Re-run mode selection against the current size. Opt-in: growing or
  /// shrinking across the threshold never changes mode on its own.
  pub fn reselect_mode(&mut self) {
    let size = self.store.len_bytes() as u64;
    let mode = Mode::select(size, self.config.performance_threshold_bytes);
    if mode == self.mode {
      return;
    }
    tracing::info!(id = %self.id, from = ?self.mode, to = ?mode, "mode reselected");
    self.mode = mode;
    self.history = History::new(self.config.coalesce.policy(mode));
    if mode.highlights() {
      self.dirty.mark_all(self.store.len_chars());
    } else {
      self.tokens.clear();
    }
  }

  pub fn save(&mut self) -> Result<()> {
    let path = self.path.clone().ok_or(DocumentError::NoPath)?;
    io::save(&path, self.store.rope(), self.encoding)?;
    self.modified = false;
    tracing::info!(id = %self.id, path = %path.display(), "saved");
    Ok(())
  }

  pub fn save_as(&mut self, path: &Path) -> Result<()> {
    self.path = Some(path.to_path_buf());
    self.save()
  }
}

/// `(from, to, inserted_chars)` when the transaction is one contiguous
/// change, in coordinates valid both before and after it.
fn single_change(tx: &Transaction) -> Option<(usize, usize, usize)> {
  let mut iter = tx.changes_iter();
  let (from, to, inserted) = iter.next()?;
  if iter.next().is_some() {
    return None;
  }
  let inserted = inserted.map_or(0, |text| text.chars().count());
  Some((from, to, inserted))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn doc(text: &str) -> Document {
    let mut doc = Document::new_untitled(DocumentId::default(), Config::default());
    if !text.is_empty() {
      doc.insert(0, text).unwrap();
      doc.history = History::new(Config::default().coalesce.policy(Mode::Full));
      doc.modified = false;
    }
    doc
  }

  #[test]
  fn insert_delete_replace_roundtrip() {
    let mut d = doc("hello world");
    d.insert(5, ",").unwrap();
    assert_eq!(d.text(), "hello, world");
    assert_eq!(d.cursor(), 6);

    let removed = d.delete(5, 6).unwrap();
    assert_eq!(removed, ",");
    assert_eq!(d.text(), "hello world");
    assert_eq!(d.cursor(), 5);

    d.replace(6, 11, "世界").unwrap();
    assert_eq!(d.text(), "hello 世界");
    assert_eq!(d.cursor(), 8);
    assert!(d.is_modified());
  }

  #[test]
  fn rejected_edit_leaves_document_unchanged() {
    let mut d = doc("abc");
    let version = d.version();

    assert!(d.insert(99, "x").is_err());
    assert!(d.delete(1, 99).is_err());
    assert!(d.replace(2, 1, "y").is_err());

    assert_eq!(d.text(), "abc");
    assert_eq!(d.version(), version);
    assert_eq!(d.line_count(), 1);
  }

  #[test]
  fn line_index_tracks_edits() {
    let mut d = doc("one\ntwo\nthree");
    assert_eq!(d.line_count(), 3);
    assert_eq!(d.offset_of_line(2).unwrap(), 8);

    d.insert(3, "\nand a half").unwrap();
    assert_eq!(d.line_count(), 4);
    assert_eq!(d.offset_of_line(1).unwrap(), 4);
    assert_eq!(d.line_of_offset(16).unwrap(), 2);
  }

  #[test]
  fn undo_redo_moves_version_forward() {
    let mut d = doc("base");
    let v0 = d.version();
    d.insert(4, "!").unwrap();
    let v1 = d.version();
    assert!(v1 > v0);

    assert!(d.undo().unwrap());
    assert_eq!(d.text(), "base");
    assert!(d.version() > v1, "undo is a new version, not a rollback");

    assert!(d.redo().unwrap());
    assert_eq!(d.text(), "base!");

    assert!(!d.redo().unwrap());
  }

  #[test]
  fn typed_word_undoes_as_one_unit() {
    let mut d = doc("");
    for (i, ch) in "hello".char_indices() {
      d.insert(i, &ch.to_string()).unwrap();
    }
    assert_eq!(d.text(), "hello");

    assert!(d.undo().unwrap());
    assert_eq!(d.text(), "");
  }

  #[test]
  fn undo_keeps_cursor_in_bounds() {
    let mut d = doc("");
    d.insert(0, "hello").unwrap();
    assert_eq!(d.cursor(), 5);

    assert!(d.undo().unwrap());
    assert!(d.cursor() <= d.len_chars());
    assert_eq!(d.cursor(), 0);

    assert!(d.redo().unwrap());
    assert_eq!(d.cursor(), 5);
  }

  #[test]
  fn undo_of_delete_places_cursor_after_restored_text() {
    let mut d = doc("abc def");
    d.delete(0, 4).unwrap();
    assert_eq!(d.text(), "def");
    assert_eq!(d.cursor(), 0);

    assert!(d.undo().unwrap());
    assert_eq!(d.text(), "abc def");
    assert_eq!(d.cursor(), 4);
  }

  #[test]
  fn cursor_move_breaks_coalescing() {
    let mut d = doc("");
    d.insert(0, "ab").unwrap();
    d.set_cursor(2).unwrap();
    d.insert(2, "cd").unwrap();

    assert!(d.undo().unwrap());
    assert_eq!(d.text(), "ab");
  }

  #[test]
  fn edits_mark_highlight_dirty() {
    let mut d = doc("fn main() {}\n");
    // Untitled docs start fully dirty; drain that first.
    let _ = d.highlight_event();
    d.apply_retokenization(
      CharRange::new(0, d.len_chars()),
      Retokenization {
        processed: CharRange::new(0, d.len_chars()),
        tokens:    Vec::new(),
      },
    );
    assert!(d.highlight_event().is_none());

    d.insert(3, "x").unwrap();
    let event = d.highlight_event().unwrap();
    assert_eq!(event.version, d.version());
    assert!(event.range.start <= 3 && event.range.end >= 4);
  }

  #[test]
  fn failed_retokenization_stays_dirty() {
    let mut d = doc("text");
    let range = CharRange::new(0, 4);
    d.apply_retokenization(range, Retokenization {
      processed: range,
      tokens:    Vec::new(),
    });
    assert!(d.highlight_event().is_none());

    d.retokenization_failed(range);
    assert!(d.highlight_event().is_some());
  }

  #[test]
  fn untitled_documents_are_full_mode() {
    let d = Document::new_untitled(DocumentId::default(), Config::default());
    assert_eq!(d.mode(), Mode::Full);
    assert_eq!(d.display_name(), "untitled");
  }

  #[test]
  fn replay_matches_reference_string() {
    use quickcheck::{
      Arbitrary,
      Gen,
      quickcheck,
    };

    #[derive(Debug, Clone)]
    enum Op {
      Insert(usize, String),
      Delete(usize, usize),
      Undo,
      Redo,
    }

    impl Arbitrary for Op {
      fn arbitrary(g: &mut Gen) -> Self {
        match u8::arbitrary(g) % 5 {
          0 | 1 => Op::Insert(usize::arbitrary(g), String::arbitrary(g)),
          2 => Op::Delete(usize::arbitrary(g), usize::arbitrary(g)),
          3 => Op::Undo,
          _ => Op::Redo,
        }
      }
    }

    fn char_to_byte(s: &str, chars: usize) -> usize {
      s.char_indices().nth(chars).map_or(s.len(), |(idx, _)| idx)
    }

    fn prop(ops: Vec<Op>) -> bool {
      let mut d = Document::new_untitled(DocumentId::default(), Config::default());
      let mut reference = String::new();
      let mut undo_stack: Vec<String> = Vec::new();
      let mut redo_stack: Vec<String> = Vec::new();

      for op in ops {
        match op {
          Op::Insert(pos, text) => {
            let len = reference.chars().count();
            let pos = if len == 0 { 0 } else { pos % (len + 1) };
            // Normalize CR so the reference's line semantics match.
            let text: String = text.replace('\r', "");
            if text.is_empty() {
              // Empty edits don't reach history.
              continue;
            }
            undo_stack.push(reference.clone());
            redo_stack.clear();
            d.insert(pos, &text).unwrap();
            // A fresh insert may coalesce with the previous one; force
            // separate revisions so the reference stacks line up.
            d.set_cursor(d.cursor()).unwrap();
            reference.insert_str(char_to_byte(&reference, pos), &text);
          },
          Op::Delete(a, b) => {
            let len = reference.chars().count();
            if len == 0 {
              continue;
            }
            let from = a % len;
            let to = from + 1 + (b % (len - from));
            undo_stack.push(reference.clone());
            redo_stack.clear();
            d.delete(from, to).unwrap();
            let from_b = char_to_byte(&reference, from);
            let to_b = char_to_byte(&reference, to);
            reference.replace_range(from_b..to_b, "");
          },
          Op::Undo => {
            let undone = d.undo().unwrap();
            match undo_stack.pop() {
              Some(prev) => {
                assert!(undone);
                redo_stack.push(reference.clone());
                reference = prev;
              },
              None => assert!(!undone),
            }
          },
          Op::Redo => {
            let redone = d.redo().unwrap();
            match redo_stack.pop() {
              Some(next) => {
                assert!(redone);
                undo_stack.push(reference.clone());
                reference = next;
              },
              None => assert!(!redone),
            }
          },
        }
        if d.text() != reference.as_str() {
          return false;
        }
        let expected_lines = reference.matches('\n').count() + 1;
        if d.line_count() != expected_lines {
          return false;
        }
      }
      true
    }

    quickcheck(prop as fn(Vec<Op>) -> bool);
  }
}
