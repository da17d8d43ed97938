//! Buffer core for the jot editor: rope-backed text storage,
//! transactional edits with undo/redo coalescing, a line index,
//! highlight invalidation, search, and file IO.

use smartstring::{
  LazyCompact,
  SmartString,
};

pub mod config;
pub mod document;
pub mod highlight;
pub mod highlight_async;
pub mod history;
pub mod io;
pub mod language;
pub mod line_index;
pub mod mode;
pub mod search;
pub mod store;
pub mod transaction;
pub mod workspace;

pub type Tendril = SmartString<LazyCompact>;
