//! Background retokenization.
//!
//! Tokenizing runs off the edit path: edits notify [`HighlightHook`], which
//! debounces bursts and runs the tokenizer over a rope snapshot once typing
//! settles. Results flow back tagged with the document version they were
//! produced for; anything stale is dropped, never merged.
//!
//! [`RetokenizeLifecycle`] is the coordination state machine on the consumer
//! side: one tokenization in flight at a time, at most one queued behind it,
//! newer queued requests replacing older ones. [`HighlightPipeline`] ties
//! the pieces together for a document.

use std::{
  sync::Arc,
  time::Duration,
};

use jot_event::AsyncHook;
use ropey::Rope;
use tokio::{
  sync::mpsc,
  time::Instant,
};

use crate::{
  document::Document,
  highlight::{
    CharRange,
    Retokenization,
    Tokenizer,
  },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetokenizeMeta {
  pub request_id:  u64,
  pub doc_version: u64,
}

#[derive(Debug)]
pub struct RetokenizeRequest<T> {
  pub meta:    RetokenizeMeta,
  pub payload: T,
}

#[derive(Debug)]
pub enum QueueDecision<T> {
  /// Nothing was running; start this request now.
  Start(RetokenizeRequest<T>),
  /// A tokenization is in flight; this request waits (replacing any
  /// previously queued one).
  Deferred(RetokenizeMeta),
}

#[derive(Debug)]
pub struct ResultDecision<T> {
  /// Whether the finished result is current and should be applied.
  pub apply:      bool,
  /// The queued request to start next, if any.
  pub start_next: Option<RetokenizeRequest<T>>,
}

/// Single in-flight tokenization with one queued replacement.
///
/// Only one tokenizer job runs per document at a time; a newer queued job
/// replaces an older queued job; when the in-flight job completes, the
/// queued one starts. Results for a superseded request or a stale document
/// version are discarded.
pub struct RetokenizeLifecycle<T> {
  next_request_id: u64,
  in_flight:       Option<RetokenizeMeta>,
  queued:          Option<RetokenizeRequest<T>>,
}

impl<T> Default for RetokenizeLifecycle<T> {
  fn default() -> Self {
    Self {
      next_request_id: 0,
      in_flight:       None,
      queued:          None,
    }
  }
}

impl<T> RetokenizeLifecycle<T> {
  pub fn queue(&mut self, doc_version: u64, payload: T) -> QueueDecision<T> {
    self.next_request_id = self.next_request_id.saturating_add(1);
    let request = RetokenizeRequest {
      meta: RetokenizeMeta {
        request_id: self.next_request_id,
        doc_version,
      },
      payload,
    };

    if self.in_flight.is_none() {
      self.in_flight = Some(request.meta);
      QueueDecision::Start(request)
    } else {
      let meta = request.meta;
      self.queued = Some(request);
      QueueDecision::Deferred(meta)
    }
  }

  /// A tokenization finished. Applies only when both the request is still
  /// the in-flight one and the document hasn't moved past the version the
  /// snapshot was taken at.
  pub fn on_result(
    &mut self,
    request_id: u64,
    doc_version: u64,
    current_doc_version: u64,
  ) -> ResultDecision<T> {
    let Some(in_flight) = self.in_flight else {
      return ResultDecision {
        apply:      false,
        start_next: None,
      };
    };

    if in_flight.request_id != request_id {
      return ResultDecision {
        apply:      false,
        start_next: None,
      };
    }

    self.in_flight = None;
    let apply = in_flight.doc_version == doc_version && doc_version == current_doc_version;
    let start_next = self.queued.take().map(|request| {
      self.in_flight = Some(request.meta);
      request
    });

    ResultDecision { apply, start_next }
  }

  /// Drop everything pending. Used when the document closes or its
  /// language changes.
  pub fn cancel_pending(&mut self) {
    self.in_flight = None;
    self.queued = None;
  }

  pub fn in_flight(&self) -> Option<RetokenizeMeta> {
    self.in_flight
  }

  pub fn queued(&self) -> Option<RetokenizeMeta> {
    self.queued.as_ref().map(|request| request.meta)
  }
}

/// An edit notification for the highlight worker: an immutable snapshot of
/// the text plus the region whose highlighting is stale.
#[derive(Debug, Clone)]
pub struct HighlightEvent {
  pub snapshot:   Rope,
  pub version:    u64,
  pub range:      CharRange,
  /// Lifecycle bookkeeping, stamped by [`HighlightPipeline`] before the
  /// event reaches the worker.
  pub request_id: u64,
}

/// What the worker sends back once a tokenization attempt finishes.
#[derive(Debug)]
pub struct TokenizeOutcome {
  pub request_id: u64,
  pub version:    u64,
  pub range:      CharRange,
  /// `None` when the tokenizer failed; the document re-marks the range
  /// dirty and keeps its previous tokens.
  pub result:     Option<Retokenization>,
}

/// Debounced worker that tokenizes snapshots in the background.
///
/// Events replace each other during the debounce window: only the latest
/// snapshot is tokenized once typing settles. The document keeps its dirty
/// tracker marked until an outcome confirms coverage, so dropped events
/// never lose invalidation.
pub struct HighlightHook {
  tokenizer: Arc<dyn Tokenizer>,
  debounce:  Duration,
  pending:   Option<HighlightEvent>,
  out:       mpsc::Sender<TokenizeOutcome>,
}

impl HighlightHook {
  pub fn new(
    tokenizer: Arc<dyn Tokenizer>,
    debounce: Duration,
    out: mpsc::Sender<TokenizeOutcome>,
  ) -> Self {
    Self {
      tokenizer,
      debounce,
      pending: None,
      out,
    }
  }
}

impl jot_event::AsyncHook for HighlightHook {
  type Event = HighlightEvent;

  fn handle_event(&mut self, event: HighlightEvent, _timeout: Option<Instant>) -> Option<Instant> {
    // Later snapshots supersede earlier ones wholesale; the dirty range in
    // the latest event already covers everything still stale.
    self.pending = Some(event);
    Some(Instant::now() + self.debounce)
  }

  fn finish_debounce(&mut self) {
    let Some(event) = self.pending.take() else {
      return;
    };

    let result = match self.tokenizer.tokenize(event.snapshot.slice(..), event.range) {
      Ok(retokenization) => Some(retokenization),
      Err(err) => {
        tracing::warn!(version = event.version, error = %err, "tokenizer failed");
        None
      },
    };

    let outcome = TokenizeOutcome {
      request_id: event.request_id,
      version: event.version,
      range: event.range,
      result,
    };
    if !jot_event::try_send(&self.out, outcome) {
      tracing::debug!("highlight result channel full or closed, dropping outcome");
    }
  }
}

/// Owns the whole background-highlight loop for one document: versioned
/// snapshots go out through the debounced worker, finished tokenizations
/// come back and land in the document only while still current.
///
/// The edit path calls [`notify`] with the document lock held; a poll point
/// (the same place the UI repaints from) calls [`drain`]. Neither blocks on
/// tokenizer work.
///
/// [`notify`]: HighlightPipeline::notify
/// [`drain`]: HighlightPipeline::drain
pub struct HighlightPipeline {
  lifecycle: RetokenizeLifecycle<HighlightEvent>,
  worker:    mpsc::Sender<HighlightEvent>,
  results:   mpsc::Receiver<TokenizeOutcome>,
}

impl HighlightPipeline {
  /// Spawn the worker for `tokenizer`. Must be called inside a tokio
  /// runtime for the worker task to actually run.
  pub fn new(tokenizer: Arc<dyn Tokenizer>, debounce: Duration) -> Self {
    let (out_tx, out_rx) = mpsc::channel(16);
    let worker = HighlightHook::new(tokenizer, debounce, out_tx).spawn();
    Self {
      lifecycle: RetokenizeLifecycle::default(),
      worker,
      results: out_rx,
    }
  }

  /// Called after an edit. Snapshots the stale region and hands it to the
  /// lifecycle; documents in Performance Mode and clean documents produce
  /// no event and this is a no-op.
  pub fn notify(&mut self, document: &Document) {
    let Some(event) = document.highlight_event() else {
      return;
    };
    match self.lifecycle.queue(event.version, event) {
      QueueDecision::Start(request) => self.dispatch(request),
      QueueDecision::Deferred(_) => {},
    }
  }

  /// Drain finished tokenizations into the document. Results for a
  /// superseded request or a stale document version are dropped; the dirty
  /// tracker still holds their ranges, so a later [`notify`] re-requests
  /// them.
  ///
  /// [`notify`]: HighlightPipeline::notify
  pub fn drain(&mut self, document: &mut Document) {
    while let Ok(outcome) = self.results.try_recv() {
      let decision =
        self
          .lifecycle
          .on_result(outcome.request_id, outcome.version, document.version());
      if decision.apply {
        match outcome.result {
          Some(result) => document.apply_retokenization(outcome.range, result),
          None => document.retokenization_failed(outcome.range),
        }
      }
      if let Some(next) = decision.start_next {
        self.dispatch(next);
      }
    }
  }

  /// Forget everything pending. Used when the document closes or its
  /// language changes.
  pub fn cancel(&mut self) {
    self.lifecycle.cancel_pending();
  }

  fn dispatch(&self, request: RetokenizeRequest<HighlightEvent>) {
    let mut event = request.payload;
    event.request_id = request.meta.request_id;
    jot_event::send_blocking(&self.worker, event);
  }
}
