//! The knowledge base facade.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::answer::{Answer, AnswerToken};
use crate::config::KnowledgeBaseConfig;
use crate::error::KbResult;
use crate::graph::{DataBackend, FactStore};
use crate::qa::{AnswerQueue, Blackboard, Goal, ProcessFault};
use crate::reasoner::{GraphReasoner, Reasoner, ReasonerId, ReasonerRegistry};
use crate::triple::Triple;

/// Name of the built-in reasoner over the fact store.
pub const GRAPH_REASONER: &str = "graph";

/// A fact store together with the reasoners that answer queries over it.
pub struct KnowledgeBase {
    config: KnowledgeBaseConfig,
    store: FactStore,
    registry: Arc<ReasonerRegistry>,
}

impl KnowledgeBase {
    /// Connects the store and registers the built-in graph reasoner.
    ///
    /// # Errors
    ///
    /// Returns configuration and connection errors.
    pub fn new(config: KnowledgeBaseConfig) -> KbResult<Self> {
        let config = config.validate()?;
        let store = FactStore::connect(config.store.clone())?;
        let registry = Arc::new(ReasonerRegistry::new());
        registry.register(GRAPH_REASONER, Arc::new(GraphReasoner::new(store.clone())))?;
        info!(db = store.db_name(), "knowledge base ready");
        Ok(Self {
            config,
            store,
            registry,
        })
    }

    /// The underlying fact store.
    #[must_use]
    pub const fn store(&self) -> &FactStore {
        &self.store
    }

    /// Registered reasoners.
    #[must_use]
    pub fn registry(&self) -> &ReasonerRegistry {
        &self.registry
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &KnowledgeBaseConfig {
        &self.config
    }

    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateId` or the reasoner's
    /// initialization error.
    pub fn register_reasoner(&self, id: impl Into<ReasonerId>, reasoner: Arc<dyn Reasoner>) -> KbResult<()> {
        self.registry.register(id, reasoner)
    }

    /// Starts answering `goal` on a blackboard of its own.
    ///
    /// # Errors
    ///
    /// Returns `KbError::UnsupportedPredicate` if some literal has no
    /// reasoner.
    pub fn submit_query(&self, goal: Goal) -> KbResult<QueryHandle> {
        let (blackboard, queue) = Blackboard::evaluate(&self.registry, goal, &self.config.blackboard)?;
        Ok(QueryHandle { blackboard, queue })
    }

    /// Answers `goal` to completion.
    ///
    /// # Errors
    ///
    /// As for [`KnowledgeBase::submit_query`].
    pub fn ask(&self, goal: Goal) -> KbResult<Vec<Answer>> {
        Ok(self.submit_query(goal)?.collect())
    }

    /// # Errors
    ///
    /// Returns store errors.
    pub fn insert(&self, triple: &Triple) -> KbResult<()> {
        self.store.insert_one(triple)
    }

    /// # Errors
    ///
    /// Returns store errors.
    pub fn insert_all(&self, triples: &[Triple]) -> KbResult<()> {
        self.store.insert_all(triples)
    }

    /// # Errors
    ///
    /// Returns store errors.
    pub fn remove(&self, triple: &Triple) -> KbResult<usize> {
        self.store.remove_one(triple)
    }
}

/// A running query. Iterating yields its answers; dropping it stops it.
pub struct QueryHandle {
    blackboard: Blackboard,
    queue: AnswerQueue,
}

impl QueryHandle {
    /// Blocks until the next answer or end-of-stream.
    pub fn pop(&mut self) -> AnswerToken {
        self.queue.pop()
    }

    /// Like [`QueryHandle::pop`], returning `None` on timeout.
    pub fn pop_timeout(&mut self, timeout: Duration) -> Option<AnswerToken> {
        self.queue.pop_timeout(timeout)
    }

    /// Cancels and joins every process of the query.
    pub fn stop(&mut self) {
        self.blackboard.stop();
    }

    /// Process faults recorded so far.
    #[must_use]
    pub fn faults(&self) -> Vec<ProcessFault> {
        self.blackboard.faults()
    }

    /// The blackboard evaluating this query.
    #[must_use]
    pub const fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }
}

impl Iterator for QueryHandle {
    type Item = Answer;

    fn next(&mut self) -> Option<Answer> {
        self.queue.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::qa::Literal;
    use crate::term::Term;

    fn kb(host: &str) -> KnowledgeBase {
        let config = KnowledgeBaseConfig {
            store: StoreConfig::with_uri(format!("memory://{host}")),
            ..KnowledgeBaseConfig::default()
        };
        let kb = KnowledgeBase::new(config).unwrap();
        kb.store().drop_all().unwrap();
        kb
    }

    #[test]
    fn each_query_gets_its_own_blackboard() {
        let kb = kb("kb-fresh-boards");
        kb.insert(&Triple::new("Dog", "subClassOf", "Animal").unwrap()).unwrap();
        kb.insert(&Triple::new("rex", "type", "Dog").unwrap()).unwrap();

        let animals = Goal::new(vec![Literal::call(
            "instance_of",
            vec![Term::var("x"), Term::atom("Animal")],
        )]);
        let dogs = Goal::new(vec![Literal::call(
            "subclass_of",
            vec![Term::var("c"), Term::atom("Animal")],
        )]);

        let first = kb.submit_query(animals).unwrap();
        let second = kb.submit_query(dogs).unwrap();
        assert_ne!(first.blackboard().id(), second.blackboard().id());

        let answers: Vec<_> = first.collect();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].substitution.get_by_name("x"), Some(&Term::atom("rex")));
        assert_eq!(answers[0].reasoner.as_deref(), Some(GRAPH_REASONER));

        let classes: Vec<_> = second.collect();
        assert_eq!(classes.len(), 1);
    }

    #[test]
    fn property_inserted_after_startup_is_answerable() {
        let kb = kb("kb-late-property");
        kb.insert(&Triple::new("rex", "hasOwner", "alice").unwrap()).unwrap();

        let goal = Goal::new(vec![Literal::call(
            "hasOwner",
            vec![Term::var("x"), Term::var("y")],
        )]);
        let answers = kb.ask(goal).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].substitution.get_by_name("y"), Some(&Term::atom("alice")));
    }

    #[test]
    fn unsupported_goal_is_rejected() {
        let kb = kb("kb-unsupported");
        let goal = Goal::new(vec![Literal::call("fly", vec![Term::var("x")])]);
        assert!(kb.submit_query(goal).is_err());
    }
}
