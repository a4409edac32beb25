//! Answers and the tokens that carry them through streams.

use std::collections::BTreeSet;
use std::fmt;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::modal::ModalIteration;
use crate::term::Substitution;
use crate::time::TimeInterval;

/// One solution of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Bindings of the goal's variables.
    pub substitution: Substitution,
    /// Origins of every triple that contributed to the answer.
    pub origins: BTreeSet<String>,
    /// Modal context the answer holds in.
    pub frame: ModalIteration,
    /// Interval during which every supporting triple holds.
    pub interval: TimeInterval,
    /// Reasoner that produced the answer, when it came through a blackboard.
    pub reasoner: Option<String>,
}

impl Answer {
    /// An answer with no origins, an empty frame and an unbounded interval.
    #[must_use]
    pub fn new(substitution: Substitution) -> Self {
        Self {
            substitution,
            origins: BTreeSet::new(),
            frame: ModalIteration::empty(),
            interval: TimeInterval::always(),
            reasoner: None,
        }
    }

    /// Adds a supporting origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origins.insert(origin.into());
        self
    }

    /// Sets the modal context.
    #[must_use]
    pub fn with_frame(mut self, frame: ModalIteration) -> Self {
        self.frame = frame;
        self
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.frame.is_empty() {
            write!(f, "{} ", self.frame)?;
        }
        write!(f, "{}", self.substitution)
    }
}

/// An element of an answer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerToken {
    /// A solution.
    Answer(Answer),
    /// End of stream. Carries no payload and is always the last token.
    Eos,
}

impl AnswerToken {
    /// True for the end-of-stream marker.
    #[must_use]
    pub const fn is_eos(&self) -> bool {
        matches!(self, Self::Eos)
    }

    /// The answer carried by the token, `None` at end of stream.
    #[must_use]
    pub fn into_answer(self) -> Option<Answer> {
        match self {
            Self::Answer(a) => Some(a),
            Self::Eos => None,
        }
    }
}

/// Destination of answer tokens.
pub trait TokenPublisher {
    /// Publishes a token. Returns false once the consumer is gone; producers
    /// should stop early in that case.
    fn publish(&self, token: AnswerToken) -> bool;
}

impl TokenPublisher for Sender<AnswerToken> {
    fn publish(&self, token: AnswerToken) -> bool {
        self.send(token).is_ok()
    }
}

/// Channel suitable for [`TokenPublisher`]. `None` means unbounded.
#[must_use]
pub fn token_channel(capacity: Option<usize>) -> (Sender<AnswerToken>, Receiver<AnswerToken>) {
    match capacity {
        Some(cap) => bounded(cap.max(1)),
        None => unbounded(),
    }
}
