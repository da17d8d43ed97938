//! Open documents, one editing tab each.
//!
//! Every document lives behind its own mutex: an edit takes the lock for
//! one document only, so typing in one tab never waits on background work
//! against another. Ids are allocated once and never reused, which keeps
//! late async results addressed to a closed tab harmless.

use std::{
  collections::BTreeMap,
  num::NonZeroUsize,
  path::Path,
  sync::Arc,
};

use parking_lot::Mutex;

use crate::{
  config::Config,
  document::{
    Document,
    DocumentId,
    Result,
  },
};

pub type SharedDocument = Arc<Mutex<Document>>;

pub struct Workspace {
  documents: BTreeMap<DocumentId, SharedDocument>,
  next_id:   NonZeroUsize,
  active:    Option<DocumentId>,
  config:    Config,
}

impl Workspace {
  pub fn new(config: Config) -> Self {
    Self {
      documents: BTreeMap::new(),
      next_id: NonZeroUsize::MIN,
      active: None,
      config,
    }
  }

  fn allocate_id(&mut self) -> DocumentId {
    let id = DocumentId(self.next_id);
    self.next_id = self.next_id.saturating_add(1);
    id
  }

  /// Open `path` in a new tab. If it is already open, focus the existing
  /// tab instead of loading a second copy.
  pub fn open(&mut self, path: &Path) -> Result<DocumentId> {
    let existing = self.documents.iter().find_map(|(id, doc)| {
      (doc.lock().path() == Some(path)).then_some(*id)
    });
    if let Some(id) = existing {
      self.active = Some(id);
      return Ok(id);
    }

    let id = self.allocate_id();
    let document = Document::open(id, path, self.config.clone())?;
    self.documents.insert(id, Arc::new(Mutex::new(document)));
    self.active = Some(id);
    Ok(id)
  }

  pub fn new_untitled(&mut self) -> DocumentId {
    let id = self.allocate_id();
    let document = Document::new_untitled(id, self.config.clone());
    self.documents.insert(id, Arc::new(Mutex::new(document)));
    self.active = Some(id);
    id
  }

  /// Close a tab. Late async results for the id simply find no document.
  pub fn close(&mut self, id: DocumentId) -> bool {
    let removed = self.documents.remove(&id).is_some();
    if self.active == Some(id) {
      self.active = self.documents.keys().next_back().copied();
    }
    removed
  }

  pub fn get(&self, id: DocumentId) -> Option<SharedDocument> {
    self.documents.get(&id).cloned()
  }

  pub fn active(&self) -> Option<DocumentId> {
    self.active
  }

  pub fn set_active(&mut self, id: DocumentId) -> bool {
    if self.documents.contains_key(&id) {
      self.active = Some(id);
      true
    } else {
      false
    }
  }

  pub fn len(&self) -> usize {
    self.documents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.documents.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (DocumentId, &SharedDocument)> {
    self.documents.iter().map(|(id, doc)| (*id, doc))
  }
}
