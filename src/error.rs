//! Error types for knowbase.
//!
//! All errors are strongly typed using thiserror. Store-level errors are
//! synchronous failures of the call that raised them; blackboard-level errors
//! are isolated per segment and recorded rather than propagated.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// `since` is not strictly before `until`.
    #[error("Invalid time interval: since ({since}) must be before until ({until})")]
    InvalidTimeInterval {
        /// Start of the interval.
        since: DateTime<Utc>,
        /// End of the interval.
        until: DateTime<Utc>,
    },

    /// A triple position held a non-atomic term.
    #[error("Triple {field} must be an atomic term, got '{term}'")]
    NonAtomicTerm {
        /// Position name: subject, predicate or object.
        field: &'static str,
        /// The offending term, rendered.
        term: String,
    },

    /// A required field is absent.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Name of the absent field.
        field: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },

    /// A registration reused an identifier.
    #[error("Identifier '{id}' is already registered")]
    DuplicateId {
        /// The reused identifier.
        id: String,
    },
}

/// Top-level error type for knowbase.
#[derive(Debug, Error)]
pub enum KbError {
    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The underlying database failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The store was unreachable at connect time; the store is unusable.
    #[error("Connection error: {message}")]
    Connection {
        /// Driver message.
        message: String,
    },

    /// A mutating call was rejected because the store is read-only.
    #[error("Store is read-only, rejected '{operation}'")]
    ReadOnlyViolation {
        /// Name of the rejected store operation.
        operation: &'static str,
    },

    /// The pattern is malformed or forbidden by policy. No scan was issued.
    #[error("Pattern error: {reason}")]
    Pattern {
        /// Why the pattern was refused.
        reason: String,
    },

    /// A taxonomic edge would have closed a cycle and was rejected.
    #[error("Hierarchy cycle: '{child}' is already an ancestor of '{parent}'")]
    HierarchyCycle {
        /// Subject of the rejected edge.
        child: String,
        /// Object of the rejected edge.
        parent: String,
    },

    /// No registered reasoner can answer a literal of the goal.
    #[error("No reasoner can answer predicate {indicator}")]
    UnsupportedPredicate {
        /// Functor and arity, e.g. `fly/1`.
        indicator: String,
    },

    /// A reasoning process failed internally.
    #[error("Reasoner '{reasoner}' failed: {reason}")]
    ReasonerFault {
        /// Id of the failing reasoner.
        reasoner: String,
        /// Error reported by the reasoner.
        reason: String,
    },

    /// A reasoning process ignored a stop request past the grace period.
    #[error("Process {process} did not stop within {grace_ms}ms and was abandoned")]
    CancellationTimeout {
        /// Name of the abandoned process.
        process: String,
        /// Grace period that elapsed.
        grace_ms: u64,
    },

    /// A blocking receive gave up.
    #[error("Timed out after {duration_ms}ms")]
    Timeout {
        /// How long the receive waited.
        duration_ms: u64,
    },

    /// The producing side of a stream is gone or was cancelled.
    #[error("Stream disconnected: {path}")]
    Disconnected {
        /// What was disconnected.
        path: String,
    },

    /// An invariant of the crate was broken.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the broken invariant.
        message: String,
    },
}

impl KbError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a pattern error.
    #[must_use]
    pub fn pattern(reason: impl Into<String>) -> Self {
        Self::Pattern {
            reason: reason.into(),
        }
    }

    /// Creates a reasoner fault.
    #[must_use]
    pub fn reasoner_fault(reasoner: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReasonerFault {
            reasoner: reasoner.into(),
            reason: reason.into(),
        }
    }

    /// True for validation errors.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True if a read-only store rejected a write.
    #[must_use]
    pub const fn is_read_only_violation(&self) -> bool {
        matches!(self, Self::ReadOnlyViolation { .. })
    }

    /// True if an edge was rejected for closing a cycle.
    #[must_use]
    pub const fn is_hierarchy_cycle(&self) -> bool {
        matches!(self, Self::HierarchyCycle { .. })
    }

    /// True for malformed or forbidden patterns.
    #[must_use]
    pub const fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern { .. })
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Storage(e) => matches!(
                e,
                StorageError::ConnectionError(_) | StorageError::Disconnected(_)
            ),
            _ => false,
        }
    }
}

/// Result type alias for knowbase operations.
pub type KbResult<T> = Result<T, KbError>;
