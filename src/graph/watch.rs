//! Live query subscriptions.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{never, select, unbounded, Receiver, Sender};
use tracing::debug;

use crate::error::{KbError, KbResult};
use crate::storage::{ChangeEvent, ChangeStream, Document, Selector};
use crate::triple::{Triple, TriplePattern};

use super::codec::decode_triple;
use super::store::StoreInner;

/// Consumer-held handle that detaches a [`WatchStream`] from any thread.
#[derive(Debug, Clone)]
pub struct WatchCancel {
    cancelled: Arc<AtomicBool>,
    tx: Sender<()>,
}

impl WatchCancel {
    /// Detaches the stream. Idempotent; a blocked `recv` returns promptly.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            let _ = self.tx.try_send(());
        }
    }

    /// True once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Push-based stream of triples matching a pattern, inserted after the
/// subscription was made.
///
/// Delivery is at-least-once. The pattern is compiled against the
/// hierarchy at subscription time; [`WatchStream::restart`] re-subscribes
/// and recompiles. Dropping the stream detaches it from the database.
pub struct WatchStream {
    inner: Arc<StoreInner>,
    pattern: TriplePattern,
    selector: Selector,
    events: ChangeStream,
    cancelled: Arc<AtomicBool>,
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
}

impl WatchStream {
    pub(crate) fn subscribe(inner: Arc<StoreInner>, pattern: TriplePattern) -> KbResult<Self> {
        let selector = inner.compile(&pattern, &BTreeSet::new())?;
        let events = inner.triples.watch()?;
        let (cancel_tx, cancel_rx) = unbounded();
        debug!(selector = %selector.to_json(), "watch subscribed");
        Ok(Self {
            inner,
            pattern,
            selector,
            events,
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel_tx,
            cancel_rx,
        })
    }

    /// The subscribed pattern.
    #[must_use]
    pub const fn pattern(&self) -> &TriplePattern {
        &self.pattern
    }

    /// A handle that cancels the stream from another thread.
    #[must_use]
    pub fn cancel_handle(&self) -> WatchCancel {
        WatchCancel {
            cancelled: Arc::clone(&self.cancelled),
            tx: self.cancel_tx.clone(),
        }
    }

    /// Detaches the stream.
    pub fn cancel(&mut self) {
        self.cancel_handle().cancel();
        self.detach();
    }

    /// True once cancelled, from here or through a handle.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Re-subscribes with the pattern recompiled against the current
    /// hierarchy. Clears a previous cancellation. Inserts that happened
    /// while detached are not replayed.
    ///
    /// # Errors
    ///
    /// Returns pattern and storage errors; the stream stays detached.
    pub fn restart(&mut self) -> KbResult<()> {
        self.detach();
        let selector = self.inner.compile(&self.pattern, &BTreeSet::new())?;
        let events = self.inner.triples.watch()?;
        while self.cancel_rx.try_recv().is_ok() {}
        self.selector = selector;
        self.events = events;
        self.cancelled.store(false, Ordering::Release);
        debug!("watch restarted");
        Ok(())
    }

    /// Blocks until the next matching insert.
    ///
    /// # Errors
    ///
    /// Returns `KbError::Disconnected` once the stream is cancelled or the
    /// collection is dropped.
    pub fn recv(&mut self) -> KbResult<Triple> {
        self.next_match(None)
    }

    /// Like [`WatchStream::recv`] with an upper bound on the wait.
    ///
    /// # Errors
    ///
    /// Returns `KbError::Timeout` if nothing matched in time.
    pub fn recv_timeout(&mut self, timeout: Duration) -> KbResult<Triple> {
        self.next_match(Some(timeout))
    }

    /// Returns a pending match without blocking.
    ///
    /// # Errors
    ///
    /// Returns `KbError::Disconnected` if the stream is detached.
    pub fn try_recv(&mut self) -> KbResult<Option<Triple>> {
        if self.is_cancelled() {
            self.detach();
            return Err(disconnected());
        }
        while let Ok(event) = self.events.try_recv() {
            if let Some(triple) = self.accept(event)? {
                return Ok(Some(triple));
            }
        }
        Ok(None)
    }

    fn next_match(&mut self, timeout: Option<Duration>) -> KbResult<Triple> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.is_cancelled() {
                self.detach();
                return Err(disconnected());
            }
            let event = match deadline {
                None => select! {
                    recv(self.events) -> event => event.map_err(|_| disconnected())?,
                    recv(self.cancel_rx) -> _ => continue,
                },
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    select! {
                        recv(self.events) -> event => event.map_err(|_| disconnected())?,
                        recv(self.cancel_rx) -> _ => continue,
                        default(remaining) => {
                            return Err(KbError::Timeout {
                                duration_ms: timeout
                                    .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
                            });
                        }
                    }
                }
            };
            if let Some(triple) = self.accept(event)? {
                return Ok(triple);
            }
        }
    }

    fn accept(&mut self, event: ChangeEvent) -> KbResult<Option<Triple>> {
        match event {
            ChangeEvent::Inserted(doc) => Ok(self.decode_match(&doc)),
            ChangeEvent::Deleted(_) => Ok(None),
            ChangeEvent::Dropped => {
                self.detach();
                Err(disconnected())
            }
        }
    }

    fn decode_match(&self, doc: &Document) -> Option<Triple> {
        if !self.selector.matches(doc) {
            return None;
        }
        let triple = decode_triple(doc).ok()?;
        self.pattern.bindings(&triple).map(|_| triple)
    }

    /// Drops the database subscription.
    fn detach(&mut self) {
        self.events = never();
    }
}

fn disconnected() -> KbError {
    KbError::Disconnected {
        path: "watch_query".to_string(),
    }
}
