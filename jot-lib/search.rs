//! Plain-text search and replace over a rope.
//!
//! Matching is literal (no regex), optionally case-insensitive and
//! optionally restricted to whole words. Positions are char indices.
//! Replace-all builds one transaction so the whole pass is a single undo
//! unit.

use ropey::RopeSlice;

use crate::{
  Tendril,
  transaction::{
    Result,
    Transaction,
  },
};
use jot_core::chars::char_is_word;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
  Forward,
  Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchOptions {
  pub case_sensitive: bool,
  pub whole_word:     bool,
}

/// A match in char coordinates, half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
  pub start: usize,
  pub end:   usize,
}

/// All matches of `needle`, left to right, non-overlapping.
pub fn find_all(text: RopeSlice, needle: &str, options: SearchOptions) -> Vec<Match> {
  let needle_chars = fold_needle(needle, options);
  if needle_chars.is_empty() {
    return Vec::new();
  }

  let mut matches = Vec::new();
  let mut pos = 0;
  while let Some(found) = find_from(text, &needle_chars, pos, options) {
    pos = found.end;
    matches.push(found);
  }
  matches
}

/// The next match starting from `pos` (exclusive of a match beginning
/// exactly at `pos` when searching forward is not needed here: callers
/// pass the char after the cursor). Wraps around the document end.
pub fn find_next(
  text: RopeSlice,
  needle: &str,
  pos: usize,
  direction: SearchDirection,
  options: SearchOptions,
) -> Option<Match> {
  let needle_chars = fold_needle(needle, options);
  if needle_chars.is_empty() {
    return None;
  }
  let pos = pos.min(text.len_chars());

  match direction {
    SearchDirection::Forward => find_from(text, &needle_chars, pos, options)
      .or_else(|| find_from(text, &needle_chars, 0, options)),
    SearchDirection::Backward => {
      let before = last_match_before(text, &needle_chars, pos, options);
      before.or_else(|| last_match_before(text, &needle_chars, text.len_chars(), options))
    },
  }
}

/// Replace every match of `needle` with `replacement`, as one
/// transaction. Returns the transaction and the number of replacements.
pub fn replace_all(
  text: &ropey::Rope,
  needle: &str,
  replacement: &str,
  options: SearchOptions,
) -> Result<(Transaction, usize)> {
  let matches = find_all(text.slice(..), needle, options);
  let count = matches.len();
  let replacement: Tendril = replacement.into();
  let transaction = Transaction::change(
    text,
    matches
      .iter()
      .map(|found| (found.start, found.end, Some(replacement.clone()))),
  )?;
  Ok((transaction, count))
}

// Must fold exactly like fold_char so a needle containing one of the
// multi-char-lowercase codepoints still lines up with folded document
// chars.
fn fold_needle(needle: &str, options: SearchOptions) -> Vec<char> {
  needle.chars().map(|ch| fold_char(ch, options)).collect()
}

fn fold_char(ch: char, options: SearchOptions) -> char {
  if options.case_sensitive {
    ch
  } else {
    // to_lowercase can expand to multiple chars for a handful of
    // codepoints; taking the first keeps positions aligned with the
    // document, which matters more than exotic case folds.
    ch.to_lowercase().next().unwrap_or(ch)
  }
}

fn find_from(
  text: RopeSlice,
  needle: &[char],
  from: usize,
  options: SearchOptions,
) -> Option<Match> {
  let len = text.len_chars();
  let mut start = from;
  while start + needle.len() <= len {
    if matches_at(text, needle, start, options) {
      let found = Match {
        start,
        end: start + needle.len(),
      };
      if !options.whole_word || is_whole_word(text, &found) {
        return Some(found);
      }
    }
    start += 1;
  }
  None
}

fn last_match_before(
  text: RopeSlice,
  needle: &[char],
  before: usize,
  options: SearchOptions,
) -> Option<Match> {
  // Upper bound on where a match ending at or before `before` can start.
  let limit = before.checked_sub(needle.len())?;
  let mut start = limit;
  loop {
    if matches_at(text, needle, start, options) {
      let found = Match {
        start,
        end: start + needle.len(),
      };
      if !options.whole_word || is_whole_word(text, &found) {
        return Some(found);
      }
    }
    start = start.checked_sub(1)?;
  }
}

fn matches_at(text: RopeSlice, needle: &[char], start: usize, options: SearchOptions) -> bool {
  let mut chars = text.chars_at(start);
  needle
    .iter()
    .all(|&expected| chars.next().is_some_and(|ch| fold_char(ch, options) == expected))
}

fn is_whole_word(text: RopeSlice, found: &Match) -> bool {
  let before_ok = found.start == 0 || !char_is_word(text.char(found.start - 1));
  let after_ok = found.end >= text.len_chars() || !char_is_word(text.char(found.end));
  before_ok && after_ok
}
