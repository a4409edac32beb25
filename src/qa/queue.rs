//! The unified answer queue and the per-process sinks feeding it.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, SendTimeoutError, Sender};

use crate::answer::{Answer, AnswerToken, TokenPublisher};

use super::cancel::CancellationToken;

/// Message on the shared channel. Per-process end-of-stream markers are
/// consumed by the queue and never reach the caller.
#[derive(Debug)]
pub(crate) enum QueueItem {
    Answer(Answer),
    ProcessEos { process: String },
}

/// Producer side of one reasoning process.
///
/// Blocks while the queue is full instead of dropping answers. Stamps
/// every answer with the producing reasoner.
pub struct AnswerSink {
    process: String,
    reasoner: String,
    tx: Sender<QueueItem>,
    cancel: CancellationToken,
    poll: Duration,
    emitted: Cell<usize>,
}

impl AnswerSink {
    pub(crate) fn new(
        process: String,
        reasoner: String,
        tx: Sender<QueueItem>,
        cancel: CancellationToken,
        poll: Duration,
    ) -> Self {
        Self {
            process,
            reasoner,
            tx,
            cancel,
            poll,
            emitted: Cell::new(0),
        }
    }

    /// Pushes an answer, waiting for room if the queue is bounded and full.
    ///
    /// Returns false, discarding the answer, once the process is cancelled or
    /// the consumer is gone. The reasoner should return in that case.
    pub fn push(&self, mut answer: Answer) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if answer.reasoner.is_none() {
            answer.reasoner = Some(self.reasoner.clone());
        }
        if self.send(QueueItem::Answer(answer)) {
            self.emitted.set(self.emitted.get() + 1);
            true
        } else {
            false
        }
    }

    /// Number of answers accepted by the queue so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted.get()
    }

    /// True once the consumer has cancelled the stream.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Emits the end-of-stream marker of this process.
    pub(crate) fn finish(&self) {
        let item = QueueItem::ProcessEos {
            process: self.process.clone(),
        };
        if !self.send(item) {
            // Only reachable after a stop; the queue then reports its own end.
            tracing::debug!(process = %self.process, "end of stream not delivered");
        }
    }

    fn send(&self, mut item: QueueItem) -> bool {
        loop {
            match self.tx.send_timeout(item, self.poll) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) => {
                    if self.cancel.is_cancelled() {
                        return false;
                    }
                    item = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }
}

impl TokenPublisher for AnswerSink {
    fn publish(&self, token: AnswerToken) -> bool {
        match token {
            AnswerToken::Answer(answer) => self.push(answer),
            // The process wrapper emits the one end-of-stream marker.
            AnswerToken::Eos => !self.is_cancelled(),
        }
    }
}

/// Consumer side of a blackboard: the merged answers of every process.
///
/// Answers arrive in completion order across processes and in emission
/// order within one process. The single end-of-stream token is returned
/// once every process has finished, or as soon as the blackboard is
/// stopped; after that `pop` keeps returning end-of-stream.
pub struct AnswerQueue {
    rx: Receiver<QueueItem>,
    stop_rx: Receiver<()>,
    stopped: Arc<AtomicBool>,
    pending: usize,
    finished: bool,
}

impl AnswerQueue {
    pub(crate) fn new(rx: Receiver<QueueItem>, stop_rx: Receiver<()>, stopped: Arc<AtomicBool>, processes: usize) -> Self {
        Self {
            rx,
            stop_rx,
            stopped,
            pending: processes,
            finished: false,
        }
    }

    /// Blocks until the next answer or the end of the stream.
    pub fn pop(&mut self) -> AnswerToken {
        loop {
            if let Some(token) = self.check_finished() {
                return token;
            }
            let item = select! {
                recv(self.rx) -> item => item.ok(),
                recv(self.stop_rx) -> _ => {
                    self.finished = true;
                    continue;
                }
            };
            if let Some(token) = self.handle(item) {
                return token;
            }
        }
    }

    /// Like [`AnswerQueue::pop`], giving up after `timeout`.
    pub fn pop_timeout(&mut self, timeout: Duration) -> Option<AnswerToken> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(token) = self.check_finished() {
                return Some(token);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let item = select! {
                recv(self.rx) -> item => item.ok(),
                recv(self.stop_rx) -> _ => {
                    self.finished = true;
                    continue;
                }
                default(remaining) => return None,
            };
            if let Some(token) = self.handle(item) {
                return Some(token);
            }
        }
    }

    /// Whether end-of-stream has been reached.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Processes that have not yet ended their stream.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.pending
    }

    fn check_finished(&mut self) -> Option<AnswerToken> {
        if self.pending == 0 || self.stopped.load(Ordering::Acquire) {
            self.finished = true;
        }
        self.finished.then_some(AnswerToken::Eos)
    }

    fn handle(&mut self, item: Option<QueueItem>) -> Option<AnswerToken> {
        match item {
            Some(QueueItem::Answer(answer)) => {
                // Answers racing a stop are discarded.
                if self.stopped.load(Ordering::Acquire) {
                    self.finished = true;
                    return Some(AnswerToken::Eos);
                }
                Some(AnswerToken::Answer(answer))
            }
            Some(QueueItem::ProcessEos { process }) => {
                self.pending = self.pending.saturating_sub(1);
                tracing::trace!(%process, pending = self.pending, "process stream ended");
                None
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

impl Iterator for AnswerQueue {
    type Item = Answer;

    fn next(&mut self) -> Option<Answer> {
        self.pop().into_answer()
    }
}
