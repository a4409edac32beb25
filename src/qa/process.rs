//! One reasoner running one segment on its own thread.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{KbError, KbResult};
use crate::reasoner::{Reasoner, ReasonerId};

use super::cancel::CancellationToken;
use super::goal::Goal;
use super::queue::AnswerSink;

/// Lifecycle of a reasoning process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProcessState {
    /// Spawned, not yet running.
    Created,
    /// Producing answers.
    Running,
    /// Finished normally.
    Completed,
    /// Ended with an error or a panic.
    Failed,
    /// Stopped on request.
    Cancelled,
}

impl ProcessState {
    /// True once the process will not change state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// What went wrong in a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FaultKind {
    /// `run` returned an error.
    ReasonerFault,
    /// `run` panicked.
    Panicked,
    /// The process ignored a stop request and was abandoned.
    CancellationTimeout {
        /// Grace period that elapsed.
        grace_ms: u64,
    },
}

/// A failure isolated to one process. The rest of the query is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessFault {
    /// Process name, `<reasoner>#<segment>`.
    pub process: String,
    /// Reasoner that ran the process.
    pub reasoner: ReasonerId,
    /// Failure category.
    pub kind: FaultKind,
    /// Human-readable cause.
    pub message: String,
}

impl ProcessFault {
    /// The fault as an error value.
    #[must_use]
    pub fn to_error(&self) -> KbError {
        match self.kind {
            FaultKind::ReasonerFault | FaultKind::Panicked => {
                KbError::reasoner_fault(self.reasoner.as_str(), self.message.clone())
            }
            FaultKind::CancellationTimeout { grace_ms } => KbError::CancellationTimeout {
                process: self.process.clone(),
                grace_ms,
            },
        }
    }
}

impl fmt::Display for ProcessFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.process, self.reasoner, self.message)
    }
}

#[derive(Debug)]
struct Shared {
    state: ProcessState,
    fault: Option<ProcessFault>,
}

pub(crate) struct ReasoningProcess {
    id: String,
    reasoner: ReasonerId,
    cancel: CancellationToken,
    shared: Arc<Mutex<Shared>>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl ReasoningProcess {
    /// Starts `reasoner` on `goal`. The process always ends its stream on
    /// `sink`, whatever the outcome of `run`.
    pub(crate) fn spawn(
        id: String,
        reasoner_id: ReasonerId,
        reasoner: Arc<dyn Reasoner>,
        goal: Goal,
        sink: AnswerSink,
        cancel: CancellationToken,
    ) -> KbResult<Self> {
        let shared = Arc::new(Mutex::new(Shared {
            state: ProcessState::Created,
            fault: None,
        }));
        let (done_tx, done_rx) = bounded::<()>(1);

        let thread_shared = Arc::clone(&shared);
        let thread_cancel = cancel.clone();
        let thread_id = id.clone();
        let thread_reasoner = reasoner_id.clone();
        let handle = thread::Builder::new()
            .name(format!("kb-reasoner-{id}"))
            .spawn(move || {
                set_state(&thread_shared, ProcessState::Running);
                let outcome = catch_unwind(AssertUnwindSafe(|| reasoner.run(&goal, &thread_cancel, &sink)));
                let (state, fault) = match outcome {
                    Ok(Ok(())) if thread_cancel.is_cancelled() => (ProcessState::Cancelled, None),
                    Ok(Ok(())) => (ProcessState::Completed, None),
                    Ok(Err(err)) => (
                        ProcessState::Failed,
                        Some((FaultKind::ReasonerFault, err.to_string())),
                    ),
                    Err(payload) => (
                        ProcessState::Failed,
                        Some((FaultKind::Panicked, panic_message(payload.as_ref()))),
                    ),
                };
                if let Some((kind, message)) = fault {
                    warn!(process = %thread_id, reasoner = %thread_reasoner, %message, "reasoning process failed");
                    record_fault(
                        &thread_shared,
                        ProcessFault {
                            process: thread_id.clone(),
                            reasoner: thread_reasoner,
                            kind,
                            message,
                        },
                    );
                }
                set_state(&thread_shared, state);
                debug!(process = %thread_id, answers = sink.emitted(), ?state, "reasoning process ended");
                sink.finish();
                let _ = done_tx.send(());
            })
            .map_err(|e| KbError::internal(format!("failed to spawn reasoning process {id}: {e}")))?;

        Ok(Self {
            id,
            reasoner: reasoner_id,
            cancel,
            shared,
            done_rx,
            handle: Some(handle),
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn state(&self) -> ProcessState {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner).state
    }

    pub(crate) fn fault(&self) -> Option<ProcessFault> {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fault
            .clone()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocks until the thread has ended.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.done_rx.recv();
            let _ = handle.join();
        }
    }

    /// Joins if the thread ends before `deadline`. Returns false if it is
    /// still running.
    pub(crate) fn join_until(&mut self, deadline: Instant) -> bool {
        if self.handle.is_none() {
            return true;
        }
        match self.done_rx.recv_deadline(deadline) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Detaches a thread that ignored its stop request.
    pub(crate) fn abandon(&mut self, grace_ms: u64) {
        if self.handle.take().is_none() {
            return;
        }
        warn!(process = %self.id, reasoner = %self.reasoner, grace_ms, "reasoning process abandoned");
        record_fault(
            &self.shared,
            ProcessFault {
                process: self.id.clone(),
                reasoner: self.reasoner.clone(),
                kind: FaultKind::CancellationTimeout { grace_ms },
                message: format!("did not stop within {grace_ms}ms"),
            },
        );
    }
}

fn set_state(shared: &Mutex<Shared>, state: ProcessState) {
    shared.lock().unwrap_or_else(PoisonError::into_inner).state = state;
}

fn record_fault(shared: &Mutex<Shared>, fault: ProcessFault) {
    let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.fault.is_none() {
        guard.fault = Some(fault);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::Answer;
    use crate::qa::queue::QueueItem;
    use crate::term::{PredicateIndicator, Substitution};
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    struct Scripted {
        answers: usize,
        fail: bool,
        panic: bool,
    }

    impl Reasoner for Scripted {
        fn can_reason_about(&self, _: &PredicateIndicator) -> bool {
            true
        }

        fn run(&self, _: &Goal, _: &CancellationToken, sink: &AnswerSink) -> KbResult<()> {
            for _ in 0..self.answers {
                sink.push(Answer::new(Substitution::new()));
            }
            assert!(!self.panic, "scripted panic");
            if self.fail {
                return Err(KbError::internal("scripted failure"));
            }
            Ok(())
        }
    }

    fn start(reasoner: Scripted) -> (ReasoningProcess, Receiver<QueueItem>) {
        let (tx, rx) = unbounded();
        let cancel = CancellationToken::new();
        let sink = AnswerSink::new(
            "p-0".to_string(),
            "scripted".to_string(),
            tx,
            cancel.clone(),
            Duration::from_millis(5),
        );
        let process = ReasoningProcess::spawn(
            "p-0".to_string(),
            ReasonerId::new("scripted"),
            Arc::new(reasoner),
            Goal::default(),
            sink,
            cancel,
        )
        .unwrap();
        (process, rx)
    }

    fn drain(rx: &Receiver<QueueItem>) -> (usize, usize) {
        let mut answers = 0;
        let mut eos = 0;
        while let Ok(item) = rx.try_recv() {
            match item {
                QueueItem::Answer(_) => answers += 1,
                QueueItem::ProcessEos { .. } => eos += 1,
            }
        }
        (answers, eos)
    }

    #[test]
    fn completed_process_emits_one_eos_last() {
        let (mut process, rx) = start(Scripted {
            answers: 2,
            fail: false,
            panic: false,
        });
        process.join();
        assert_eq!(process.state(), ProcessState::Completed);
        assert!(process.fault().is_none());
        assert_eq!(drain(&rx), (2, 1));
    }

    #[test]
    fn failure_is_recorded_and_stream_still_ends() {
        let (mut process, rx) = start(Scripted {
            answers: 1,
            fail: true,
            panic: false,
        });
        process.join();
        assert_eq!(process.state(), ProcessState::Failed);
        let fault = process.fault().unwrap();
        assert_eq!(fault.kind, FaultKind::ReasonerFault);
        assert!(matches!(fault.to_error(), KbError::ReasonerFault { .. }));
        assert_eq!(drain(&rx), (1, 1));
    }

    #[test]
    fn panic_is_caught() {
        let (mut process, rx) = start(Scripted {
            answers: 0,
            fail: false,
            panic: true,
        });
        process.join();
        assert_eq!(process.state(), ProcessState::Failed);
        let fault = process.fault().unwrap();
        assert_eq!(fault.kind, FaultKind::Panicked);
        assert!(fault.message.contains("scripted panic"));
        assert_eq!(drain(&rx), (0, 1));
    }
}
