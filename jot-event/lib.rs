//! Debounced background hooks for work that must stay off the edit path.
//!
//! An edit enqueues a notification and returns immediately; the hook runs
//! as a tokio task that drains the channel, debounces bursts, and does the
//! expensive work (retokenization, linting) when the timeline settles.

use std::time::Duration;

use futures_executor::block_on;
use tokio::{
  sync::mpsc::{
    self,
    Sender,
    error::TrySendError,
  },
  time::Instant,
};

/// Maximum time to block when sending to a full channel. Dropping a
/// notification is better than stalling a keystroke.
const SEND_TIMEOUT_MS: u64 = 2;

/// A debounced async event handler.
///
/// Implementors receive every event immediately via [`handle_event`] and
/// decide whether to act on it now or push the debounce deadline out; when
/// the deadline passes without new events, [`finish_debounce`] runs.
///
/// [`handle_event`]: AsyncHook::handle_event
/// [`finish_debounce`]: AsyncHook::finish_debounce
pub trait AsyncHook: Sync + Send + 'static + Sized {
  type Event: Sync + Send + 'static;

  /// Called for every received event. Returning `Some(instant)` arms (or
  /// re-arms) the debounce deadline; returning `None` disarms it.
  fn handle_event(&mut self, event: Self::Event, timeout: Option<Instant>) -> Option<Instant>;

  /// Called once the debounce deadline is reached.
  fn finish_debounce(&mut self);

  fn spawn(self) -> mpsc::Sender<Self::Event> {
    // Rapid typing can outpace the worker briefly, so leave headroom.
    let (tx, rx) = mpsc::channel(256);
    // Only spawn the worker inside a runtime, so unrelated unit tests
    // don't need one.
    if tokio::runtime::Handle::try_current().is_ok() {
      tokio::spawn(run(self, rx));
    }
    tx
  }
}

async fn run<Hook: AsyncHook>(mut hook: Hook, mut rx: mpsc::Receiver<Hook::Event>) {
  let mut deadline = None;
  loop {
    let event = match deadline {
      Some(deadline_) => match tokio::time::timeout_at(deadline_, rx.recv()).await {
        Ok(event) => event,
        Err(_) => {
          hook.finish_debounce();
          deadline = None;
          continue;
        },
      },
      None => rx.recv().await,
    };
    let Some(event) = event else {
      break;
    };
    deadline = hook.handle_event(event, deadline);
  }
}

/// Send an event to a hook, blocking only briefly if its channel is full.
///
/// Designed for synchronous edit-path code: tries a non-blocking send
/// first, then blocks for at most [`SEND_TIMEOUT_MS`] before dropping the
/// message entirely.
pub fn send_blocking<T>(tx: &Sender<T>, data: T) {
  match tx.try_send(data) {
    Ok(()) => {},
    Err(TrySendError::Full(data)) => {
      let _ = block_on(tx.send_timeout(data, Duration::from_millis(SEND_TIMEOUT_MS)));
    },
    Err(TrySendError::Closed(_)) => {
      log::warn!("attempted to send to closed hook channel");
    },
  }
}

/// Try to send an event without blocking at all.
/// Returns true if the event was accepted.
pub fn try_send<T>(tx: &Sender<T>, data: T) -> bool {
  tx.try_send(data).is_ok()
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{
      AtomicUsize,
      Ordering,
    },
  };

  use super::*;

  struct CountingHook {
    received:  Arc<AtomicUsize>,
    finished:  Arc<AtomicUsize>,
    debounce:  Duration,
  }

  impl AsyncHook for CountingHook {
    type Event = ();

    fn handle_event(&mut self, _event: (), _timeout: Option<Instant>) -> Option<Instant> {
      self.received.fetch_add(1, Ordering::SeqCst);
      Some(Instant::now() + self.debounce)
    }

    fn finish_debounce(&mut self) {
      self.finished.fetch_add(1, Ordering::SeqCst);
    }
  }

  #[tokio::test]
  async fn burst_of_events_debounces_to_one_finish() {
    let received = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let tx = CountingHook {
      received: received.clone(),
      finished: finished.clone(),
      debounce: Duration::from_millis(10),
    }
    .spawn();

    for _ in 0..5 {
      tx.send(()).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(received.load(Ordering::SeqCst), 5);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn spawn_without_runtime_returns_disconnected_sender() {
    let received = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let tx = CountingHook {
      received,
      finished,
      debounce: Duration::from_millis(1),
    }
    .spawn();

    // No runtime, so no worker: the send fails but must not panic.
    assert!(!try_send(&tx, ()));
  }
}
