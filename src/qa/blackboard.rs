//! Scatter/gather evaluation of a goal across reasoners.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Sender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BlackboardConfig;
use crate::error::{KbError, KbResult};
use crate::reasoner::ReasonerRegistry;

use super::cancel::CancellationToken;
use super::goal::Goal;
use super::process::{ProcessFault, ProcessState, ReasoningProcess};
use super::queue::{AnswerQueue, AnswerSink, QueueItem};
use super::segment::decompose;

/// Owner of the reasoning processes of one query.
///
/// A blackboard is created together with its [`AnswerQueue`] by
/// [`Blackboard::evaluate`]. Every segment of the goal is run by every
/// reasoner able to answer it, each on its own thread, and their answers
/// are merged into the queue. The queue's end-of-stream is delivered only
/// after every process has ended its own stream.
///
/// Dropping the blackboard stops the query.
pub struct Blackboard {
    id: Uuid,
    processes: Vec<ReasoningProcess>,
    stopped: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    config: BlackboardConfig,
    leaked: usize,
}

impl Blackboard {
    /// Decomposes `goal`, starts one process per (segment, reasoner) pair
    /// and returns the queue their answers are merged into.
    ///
    /// # Errors
    ///
    /// Returns `KbError::UnsupportedPredicate` if some literal has no
    /// reasoner, configuration errors, and thread spawn failures. No
    /// process is left running on error.
    pub fn evaluate(
        registry: &ReasonerRegistry,
        goal: Goal,
        config: &BlackboardConfig,
    ) -> KbResult<(Self, AnswerQueue)> {
        let config = config.clone().validate()?;
        let segments = decompose(&goal, registry)?;

        let mut plan = Vec::new();
        for segment in &segments {
            for reasoner_id in &segment.reasoners {
                let reasoner = registry.get(reasoner_id)?.ok_or_else(|| {
                    KbError::internal(format!("reasoner {reasoner_id} unregistered during dispatch"))
                })?;
                plan.push((segment, reasoner_id.clone(), reasoner));
            }
        }

        let (tx, rx) = match config.queue_capacity {
            Some(capacity) => bounded::<QueueItem>(capacity),
            None => unbounded::<QueueItem>(),
        };
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let stopped = Arc::new(AtomicBool::new(false));
        let queue = AnswerQueue::new(rx, stop_rx, Arc::clone(&stopped), plan.len());

        let mut board = Self {
            id: Uuid::new_v4(),
            processes: Vec::with_capacity(plan.len()),
            stopped,
            stop_tx: Some(stop_tx),
            config,
            leaked: 0,
        };
        info!(
            query = %board.id,
            segments = segments.len(),
            processes = plan.len(),
            goal = %goal,
            "dispatching query"
        );

        for (segment, reasoner_id, reasoner) in plan {
            let process_id = format!("{}-s{}-{reasoner_id}", board.short_id(), segment.index);
            let cancel = CancellationToken::new();
            let sink = AnswerSink::new(
                process_id.clone(),
                reasoner_id.to_string(),
                tx.clone(),
                cancel.clone(),
                board.config.poll_interval(),
            );
            let subgoal = goal.with_literals(segment.literals.clone());
            debug!(process = %process_id, goal = %subgoal, "starting reasoning process");
            // On failure `board` is dropped here, which stops the processes already started.
            let process = ReasoningProcess::spawn(process_id, reasoner_id, reasoner, subgoal, sink, cancel)?;
            board.processes.push(process);
        }

        Ok((board, queue))
    }

    /// Unique id of this blackboard.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Waits for every process to end on its own.
    ///
    /// With a bounded queue this only returns if the queue is being drained
    /// concurrently.
    pub fn join(&mut self) {
        for process in &mut self.processes {
            process.join();
        }
    }

    /// Cancels every process and waits for them to terminate.
    ///
    /// Processes still running after the grace period are abandoned, logged
    /// and reported as `CancellationTimeout` faults. Once this returns the
    /// queue yields only end-of-stream. Idempotent.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if self.stop_tx.take().is_some() {
            debug!(query = %self.id, "stopping query");
        }
        for process in &self.processes {
            process.cancel();
        }

        let grace = self.config.grace();
        let deadline = Instant::now() + grace;
        for process in &mut self.processes {
            if !process.join_until(deadline) {
                process.abandon(self.config.cancellation_grace_ms);
                self.leaked += 1;
            }
        }
        if self.leaked > 0 {
            warn!(query = %self.id, leaked = self.leaked, "query stopped with abandoned processes");
        }
    }

    /// True once [`Blackboard::stop`] has run.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Faults recorded so far, in process order.
    #[must_use]
    pub fn faults(&self) -> Vec<ProcessFault> {
        self.processes.iter().filter_map(ReasoningProcess::fault).collect()
    }

    /// Current lifecycle state of every process.
    #[must_use]
    pub fn process_states(&self) -> Vec<(String, ProcessState)> {
        self.processes
            .iter()
            .map(|p| (p.id().to_string(), p.state()))
            .collect()
    }

    /// Processes abandoned by [`Blackboard::stop`] after ignoring their
    /// stop request.
    #[must_use]
    pub const fn leaked_processes(&self) -> usize {
        self.leaked
    }

    fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

impl Drop for Blackboard {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::Answer;
    use crate::qa::goal::Literal;
    use crate::reasoner::Reasoner;
    use crate::term::{PredicateIndicator, Substitution, Term};
    use std::thread;
    use std::time::Duration;

    struct Emit {
        functor: &'static str,
        count: usize,
    }

    impl Reasoner for Emit {
        fn can_reason_about(&self, indicator: &PredicateIndicator) -> bool {
            indicator.functor == self.functor
        }

        fn run(&self, _: &Goal, _: &CancellationToken, sink: &AnswerSink) -> KbResult<()> {
            for _ in 0..self.count {
                if !sink.push(Answer::new(Substitution::new())) {
                    break;
                }
            }
            Ok(())
        }
    }

    struct Spin;

    impl Reasoner for Spin {
        fn can_reason_about(&self, indicator: &PredicateIndicator) -> bool {
            indicator.functor == "spin"
        }

        fn run(&self, _: &Goal, cancel: &CancellationToken, _: &AnswerSink) -> KbResult<()> {
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }
    }

    fn goal(functors: &[&str]) -> Goal {
        Goal::new(
            functors
                .iter()
                .map(|f| Literal::call(*f, vec![Term::var("x")]))
                .collect(),
        )
    }

    #[test]
    fn merges_and_terminates_once() {
        let registry = ReasonerRegistry::new();
        registry.register("a", Arc::new(Emit { functor: "a", count: 2 })).unwrap();
        registry.register("b", Arc::new(Emit { functor: "b", count: 3 })).unwrap();

        let (mut board, queue) =
            Blackboard::evaluate(&registry, goal(&["a", "b"]), &BlackboardConfig::default()).unwrap();
        assert_eq!(queue.count(), 5);
        board.join();
        assert!(board
            .process_states()
            .iter()
            .all(|(_, state)| *state == ProcessState::Completed));
        assert!(board.faults().is_empty());
    }

    #[test]
    fn stop_cancels_cooperative_processes() {
        let registry = ReasonerRegistry::new();
        registry.register("spin", Arc::new(Spin)).unwrap();

        let (mut board, mut queue) =
            Blackboard::evaluate(&registry, goal(&["spin"]), &BlackboardConfig::default()).unwrap();
        assert!(queue.pop_timeout(Duration::from_millis(20)).is_none());
        board.stop();
        assert!(queue.pop().is_eos());
        assert_eq!(board.leaked_processes(), 0);
        assert_eq!(board.process_states()[0].1, ProcessState::Cancelled);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let registry = ReasonerRegistry::new();
        let config = BlackboardConfig {
            queue_capacity: Some(0),
            ..BlackboardConfig::default()
        };
        assert!(Blackboard::evaluate(&registry, Goal::default(), &config).is_err());
    }

    #[test]
    fn empty_goal_ends_immediately() {
        let registry = ReasonerRegistry::new();
        let (_board, mut queue) =
            Blackboard::evaluate(&registry, Goal::default(), &BlackboardConfig::default()).unwrap();
        assert!(queue.pop().is_eos());
    }
}
