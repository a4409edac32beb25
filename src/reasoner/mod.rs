//! Pluggable reasoners and their registry.

mod graph;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{KbError, KbResult, ValidationError};
use crate::qa::{AnswerSink, CancellationToken, Goal};
use crate::term::PredicateIndicator;

pub use graph::GraphReasoner;

/// Name under which a reasoner is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReasonerId(String);

impl ReasonerId {
    /// Wraps a registration name.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The registration name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReasonerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReasonerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ReasonerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Capability surface of a reasoning backend.
///
/// One instance serves many queries, possibly concurrently.
pub trait Reasoner: Send + Sync {
    /// Called once by the registry before the reasoner receives any query.
    ///
    /// # Errors
    ///
    /// A failing reasoner is not registered.
    fn initialize(&self) -> KbResult<()> {
        Ok(())
    }

    /// Whether literals with this indicator can be answered. Must not have
    /// side effects.
    fn can_reason_about(&self, indicator: &PredicateIndicator) -> bool;

    /// Answers `goal`, pushing every solution into `sink`.
    ///
    /// Implementations poll `cancel` between units of work and return once it
    /// is set or once `sink.push` returns false. The end-of-stream marker is
    /// emitted by the caller.
    ///
    /// # Errors
    ///
    /// Errors are recorded as a fault of this process only.
    fn run(&self, goal: &Goal, cancel: &CancellationToken, sink: &AnswerSink) -> KbResult<()>;
}

/// Registered reasoners, shared read-mostly across queries.
#[derive(Default)]
pub struct ReasonerRegistry {
    reasoners: RwLock<BTreeMap<ReasonerId, Arc<dyn Reasoner>>>,
}

impl ReasonerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> KbResult<RwLockReadGuard<'_, BTreeMap<ReasonerId, Arc<dyn Reasoner>>>> {
        self.reasoners
            .read()
            .map_err(|_| KbError::internal("poisoned lock: reasoner registry"))
    }

    fn write(&self) -> KbResult<RwLockWriteGuard<'_, BTreeMap<ReasonerId, Arc<dyn Reasoner>>>> {
        self.reasoners
            .write()
            .map_err(|_| KbError::internal("poisoned lock: reasoner registry"))
    }

    /// Initializes `reasoner` and makes it eligible for queries.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateId` if `id` is taken, or the error
    /// of `initialize`. The reasoner is not registered in either case.
    pub fn register(&self, id: impl Into<ReasonerId>, reasoner: Arc<dyn Reasoner>) -> KbResult<()> {
        let id = id.into();
        if self.read()?.contains_key(&id) {
            return Err(ValidationError::DuplicateId { id: id.to_string() }.into());
        }
        // Not under the lock: initialization may be slow.
        reasoner.initialize()?;

        let mut reasoners = self.write()?;
        if reasoners.contains_key(&id) {
            return Err(ValidationError::DuplicateId { id: id.to_string() }.into());
        }
        info!(reasoner = %id, "reasoner registered");
        reasoners.insert(id, reasoner);
        Ok(())
    }

    /// Removes a reasoner. Queries already running keep their instance.
    ///
    /// # Errors
    ///
    /// Returns an error only on a poisoned lock.
    pub fn unregister(&self, id: &ReasonerId) -> KbResult<Option<Arc<dyn Reasoner>>> {
        Ok(self.write()?.remove(id))
    }

    /// # Errors
    ///
    /// Returns an error only on a poisoned lock.
    pub fn get(&self, id: &ReasonerId) -> KbResult<Option<Arc<dyn Reasoner>>> {
        Ok(self.read()?.get(id).cloned())
    }

    /// # Errors
    ///
    /// Returns an error only on a poisoned lock.
    pub fn ids(&self) -> KbResult<Vec<ReasonerId>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    /// Reasoners able to answer `indicator`, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error only on a poisoned lock.
    pub fn reasoners_for(&self, indicator: &PredicateIndicator) -> KbResult<Vec<ReasonerId>> {
        Ok(self
            .read()?
            .iter()
            .filter(|(_, reasoner)| reasoner.can_reason_about(indicator))
            .map(|(id, _)| id.clone())
            .collect())
    }

    /// # Errors
    ///
    /// Returns an error only on a poisoned lock.
    pub fn len(&self) -> KbResult<usize> {
        Ok(self.read()?.len())
    }

    /// # Errors
    ///
    /// Returns an error only on a poisoned lock.
    pub fn is_empty(&self) -> KbResult<bool> {
        Ok(self.read()?.is_empty())
    }
}

impl fmt::Debug for ReasonerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = self.ids().unwrap_or_default();
        f.debug_struct("ReasonerRegistry").field("reasoners", &ids).finish()
    }
}
