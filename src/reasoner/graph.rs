use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::TaxonomicKind;
use crate::error::{KbError, KbResult};
use crate::graph::{FactStore, GraphQuery, QueryableBackend};
use crate::qa::{AnswerSink, CancellationToken, Goal, Literal};
use crate::term::PredicateIndicator;
use crate::triple::TriplePattern;

use super::Reasoner;

const TRIPLE: &str = "triple";
const INSTANCE_OF: &str = "instance_of";
const SUBCLASS_OF: &str = "subclass_of";
const SUBPROPERTY_OF: &str = "subproperty_of";

/// Answers goals directly from the fact store.
///
/// Understands `triple/3`, `instance_of/2`, `subclass_of/2`,
/// `subproperty_of/2`, and `p/2` for every property `p` currently stored
/// or added with [`GraphReasoner::with_property`]. A
/// segment runs as one conjunctive query, so subclass and subproperty
/// closure come from the store's taxonomic widening.
pub struct GraphReasoner {
    store: FactStore,
    declared: BTreeSet<String>,
}

impl GraphReasoner {
    /// A reasoner over `store` with no declared properties.
    #[must_use]
    pub fn new(store: FactStore) -> Self {
        Self {
            store,
            declared: BTreeSet::new(),
        }
    }

    /// Declares a binary predicate stored as a property.
    #[must_use]
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.declared.insert(property.into());
        self
    }

    fn is_property(&self, name: &str) -> bool {
        if self.declared.contains(name) {
            return true;
        }
        self.store.has_property(name).unwrap_or_else(|err| {
            warn!(%err, property = name, "property check failed");
            false
        })
    }

    fn pattern_for(&self, literal: &Literal, goal: &Goal) -> KbResult<TriplePattern> {
        let vocab = self.store.vocabulary();
        let args = literal.args();
        let pattern = match (literal.functor(), args) {
            (TRIPLE, [s, p, o]) => TriplePattern::new(s.clone(), p.clone(), o.clone()),
            (INSTANCE_OF, [s, o]) => {
                TriplePattern::new(s.clone(), vocab.canonical(TaxonomicKind::Instance), o.clone())
            }
            (SUBCLASS_OF, [s, o]) => {
                TriplePattern::new(s.clone(), vocab.canonical(TaxonomicKind::Subclass), o.clone())
            }
            (SUBPROPERTY_OF, [s, o]) => {
                TriplePattern::new(s.clone(), vocab.canonical(TaxonomicKind::Subproperty), o.clone())
            }
            (property, [s, o]) if self.is_property(property) => TriplePattern::new(s.clone(), property, o.clone()),
            _ => {
                return Err(KbError::UnsupportedPredicate {
                    indicator: literal.indicator().to_string(),
                })
            }
        };
        let pattern = pattern.in_context(goal.frame.clone());
        Ok(match goal.time_at {
            Some(at) => pattern.at_time(at),
            None => pattern,
        })
    }
}

impl Reasoner for GraphReasoner {
    fn initialize(&self) -> KbResult<()> {
        let properties = self.store.properties()?;
        debug!(
            stored = properties.len(),
            declared = self.declared.len(),
            "graph reasoner ready"
        );
        Ok(())
    }

    fn can_reason_about(&self, indicator: &PredicateIndicator) -> bool {
        match (indicator.functor.as_str(), indicator.arity) {
            (TRIPLE, 3) | (INSTANCE_OF | SUBCLASS_OF | SUBPROPERTY_OF, 2) => true,
            (name, 2) => self.is_property(name),
            _ => false,
        }
    }

    fn run(&self, goal: &Goal, cancel: &CancellationToken, sink: &AnswerSink) -> KbResult<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let patterns = goal
            .literals
            .iter()
            .map(|literal| self.pattern_for(literal, goal))
            .collect::<KbResult<Vec<_>>>()?;
        // Answers stop as soon as the sink reports cancellation.
        self.store.evaluate_query(&GraphQuery::new(patterns), sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::graph::DataBackend;
    use crate::term::Term;
    use crate::triple::Triple;

    fn store(host: &str) -> FactStore {
        let store = FactStore::connect(StoreConfig::with_uri(format!("memory://{host}"))).unwrap();
        store.drop_all().unwrap();
        store
    }

    #[test]
    fn capabilities_follow_stored_properties() {
        let store = store("graph-reasoner-caps");
        let reasoner = GraphReasoner::new(store.clone()).with_property("likes");
        reasoner.initialize().unwrap();
        assert!(!reasoner.can_reason_about(&PredicateIndicator::new("hasOwner", 2)));

        store
            .insert_one(&Triple::new("rex", "hasOwner", "alice").unwrap().with_origin("test"))
            .unwrap();
        assert!(reasoner.can_reason_about(&PredicateIndicator::new("hasOwner", 2)));
        // Taxonomic predicates are not properties.
        store
            .insert_one(&Triple::new("rex", "type", "Dog").unwrap().with_origin("test"))
            .unwrap();
        assert!(!reasoner.can_reason_about(&PredicateIndicator::new("type", 2)));
        assert!(reasoner.can_reason_about(&PredicateIndicator::new("likes", 2)));
        assert!(reasoner.can_reason_about(&PredicateIndicator::new("triple", 3)));
        assert!(!reasoner.can_reason_about(&PredicateIndicator::new("triple", 2)));
        assert!(!reasoner.can_reason_about(&PredicateIndicator::new("unknown", 2)));
    }

    #[test]
    fn literals_map_to_canonical_predicates() {
        let reasoner = GraphReasoner::new(store("graph-reasoner-map"));
        let goal = Goal::default();
        let lit = Literal::call(INSTANCE_OF, vec![Term::var("x"), Term::atom("Dog")]);
        let pattern = reasoner.pattern_for(&lit, &goal).unwrap();
        assert_eq!(pattern.predicate, Term::atom("type"));
        assert_eq!(pattern.frame.modal, Some(goal.frame.clone()));

        let unknown = Literal::call("nope", vec![Term::var("x"), Term::var("y")]);
        assert!(reasoner.pattern_for(&unknown, &goal).is_err());
    }
}
