//! Query answering over an ensemble of reasoners.
//!
//! A [`Goal`] is split into segments, each segment is handed to every
//! reasoner able to answer it, and the answers of all reasoning processes
//! are merged into one [`AnswerQueue`]. Cancellation is cooperative: a
//! [`Blackboard`] sets each process's [`CancellationToken`] and joins.

mod blackboard;
mod cancel;
mod goal;
mod process;
mod queue;
mod segment;

pub use blackboard::Blackboard;
pub use cancel::CancellationToken;
pub use goal::{Goal, Literal};
pub use process::{FaultKind, ProcessFault, ProcessState};
pub use queue::{AnswerQueue, AnswerSink};
pub use segment::{decompose, Segment};
