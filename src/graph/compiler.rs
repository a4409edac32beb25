//! Translation of triple patterns into document selectors.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::config::{TaxonomicKind, TaxonomicVocabulary};
use crate::error::{KbError, KbResult};
use crate::storage::{Condition, Selector};
use crate::term::{Term, Variable};
use crate::triple::{ObjectOperator, TriplePattern};

use super::codec::{
    encode_term, F_MODAL_KEY, F_OBJECT, F_OBJECT_TYPE, F_ORIGIN, F_PREDICATE, F_SINCE, F_SUBJECT, F_TAXONOMIC,
    F_UNTIL,
};
use super::hierarchy::{HierarchyCache, Taxonomy};

/// Compiles patterns against a snapshot of the taxonomy.
///
/// Objects of taxonomic predicates are widened to the named class or
/// property and every descendant known at compile time. All other
/// positions use exact matching.
pub struct PatternCompiler<'a> {
    vocabulary: &'a TaxonomicVocabulary,
    taxonomy: &'a Taxonomy,
    allow_unbound_scan: bool,
}

impl<'a> PatternCompiler<'a> {
    /// Compiler over a vocabulary and a taxonomy snapshot.
    #[must_use]
    pub const fn new(vocabulary: &'a TaxonomicVocabulary, taxonomy: &'a Taxonomy, allow_unbound_scan: bool) -> Self {
        Self {
            vocabulary,
            taxonomy,
            allow_unbound_scan,
        }
    }

    /// Checks and compiles a single pattern.
    ///
    /// # Errors
    ///
    /// Returns `KbError::Pattern` if the pattern is malformed or is a fully
    /// unbound scan while such scans are disabled.
    pub fn compile(&self, pattern: &TriplePattern) -> KbResult<Selector> {
        self.check(pattern, &BTreeSet::new())?;
        Ok(self.build(pattern))
    }

    /// Validates a pattern. Variables in `bound` count as bound, as they are
    /// for later stages of a pipeline.
    pub(crate) fn check(&self, pattern: &TriplePattern, bound: &BTreeSet<Variable>) -> KbResult<()> {
        for (position, term) in [("subject", &pattern.subject), ("predicate", &pattern.predicate)] {
            if !matches!(term, Term::Atom(_) | Term::Variable(_)) {
                return Err(KbError::pattern(format!(
                    "{position} must be an atom or a variable, got '{term}'"
                )));
            }
        }
        if !pattern.object.is_variable() && encode_term(&pattern.object).is_none() {
            return Err(KbError::pattern(format!(
                "object must be atomic or a variable, got '{}'",
                pattern.object
            )));
        }
        if pattern.object_operator.is_comparison() && pattern.object.is_variable() {
            return Err(KbError::pattern("comparison operators need a bound object"));
        }

        let unbound = |t: &Term| t.as_variable().is_some_and(|v| !bound.contains(v));
        if !self.allow_unbound_scan && pattern.frame.origins.is_empty() && pattern.terms().into_iter().all(unbound) {
            return Err(KbError::pattern(
                "subject, predicate and object are all unbound; restrict the pattern or its origin",
            ));
        }
        Ok(())
    }

    /// Builds the selector of an already checked pattern.
    pub(crate) fn build(&self, pattern: &TriplePattern) -> Selector {
        let mut parts = Vec::new();

        if let Term::Atom(subject) = &pattern.subject {
            parts.push(Selector::eq(F_SUBJECT, subject.as_str()));
        }

        match &pattern.predicate {
            Term::Atom(predicate) => {
                let kind = self.vocabulary.kind_of(predicate);
                // A taxonomic predicate also matches its configured equivalents.
                parts.push(match kind {
                    Some(kind) => Selector::one_of(F_PREDICATE, self.predicate_names(&[kind])),
                    None => Selector::eq(F_PREDICATE, predicate.as_str()),
                });
                let widen = kind.map(|kind| self.cache_for(kind));
                parts.extend(object_selector(&pattern.object, pattern.object_operator, widen));
            }
            _ => parts.extend(self.any_predicate_object(pattern)),
        }

        let frame = &pattern.frame;
        if !frame.origins.is_empty() {
            let origins = frame.origins.iter().map(|o| Value::from(o.as_str())).collect();
            parts.push(Selector::one_of(F_ORIGIN, origins));
        }
        if let Some(at) = frame.time_at {
            let t = Value::from(at.timestamp_millis());
            parts.push(Selector::or(vec![
                Selector::field(F_SINCE, Condition::Exists(false)),
                Selector::field(F_SINCE, Condition::Lte(t.clone())),
            ]));
            parts.push(Selector::or(vec![
                Selector::field(F_UNTIL, Condition::Exists(false)),
                Selector::field(F_UNTIL, Condition::Gt(t)),
            ]));
        }
        if let Some(modal) = &frame.modal {
            parts.push(Selector::eq(F_MODAL_KEY, modal.key()));
        }

        Selector::and(parts)
    }

    /// Object constraint when the predicate is a variable: a widened branch
    /// per taxonomic hierarchy plus an exact branch for everything else.
    fn any_predicate_object(&self, pattern: &TriplePattern) -> Option<Selector> {
        let widenable = pattern.object_operator == ObjectOperator::Eq && matches!(pattern.object, Term::Atom(_));
        if !widenable {
            return object_selector(&pattern.object, pattern.object_operator, None);
        }

        let class_branch = Selector::and(vec![
            Selector::one_of(
                F_PREDICATE,
                self.predicate_names(&[TaxonomicKind::Instance, TaxonomicKind::Subclass]),
            ),
            object_selector(&pattern.object, ObjectOperator::Eq, Some(&self.taxonomy.classes))?,
        ]);
        let property_branch = Selector::and(vec![
            Selector::one_of(F_PREDICATE, self.predicate_names(&[TaxonomicKind::Subproperty])),
            object_selector(&pattern.object, ObjectOperator::Eq, Some(&self.taxonomy.properties))?,
        ]);
        let plain_branch = Selector::and(vec![
            Selector::eq(F_TAXONOMIC, false),
            object_selector(&pattern.object, ObjectOperator::Exact, None)?,
        ]);
        Some(Selector::or(vec![class_branch, property_branch, plain_branch]))
    }

    fn predicate_names(&self, kinds: &[TaxonomicKind]) -> Vec<Value> {
        kinds
            .iter()
            .flat_map(|k| self.vocabulary.names(*k))
            .map(|n| Value::from(n.as_str()))
            .collect()
    }

    const fn cache_for(&self, kind: TaxonomicKind) -> &'a HierarchyCache {
        match kind {
            TaxonomicKind::Instance | TaxonomicKind::Subclass => &self.taxonomy.classes,
            TaxonomicKind::Subproperty => &self.taxonomy.properties,
        }
    }
}

fn object_selector(object: &Term, op: ObjectOperator, widen: Option<&HierarchyCache>) -> Option<Selector> {
    let (value, otype) = encode_term(object)?;
    let selector = match (op, widen, object) {
        (ObjectOperator::Eq, Some(cache), Term::Atom(name)) => Selector::and(vec![
            Selector::one_of(
                F_OBJECT,
                cache.with_descendants(name).into_iter().map(Value::from).collect(),
            ),
            Selector::eq(F_OBJECT_TYPE, "atom"),
        ]),
        (ObjectOperator::Eq | ObjectOperator::Exact, _, _) => {
            Selector::and(vec![Selector::eq(F_OBJECT, value), Selector::eq(F_OBJECT_TYPE, otype)])
        }
        (ObjectOperator::Lt, _, _) => Selector::field(F_OBJECT, Condition::Lt(value)),
        (ObjectOperator::Leq, _, _) => Selector::field(F_OBJECT, Condition::Lte(value)),
        (ObjectOperator::Gt, _, _) => Selector::field(F_OBJECT, Condition::Gt(value)),
        (ObjectOperator::Geq, _, _) => Selector::field(F_OBJECT, Condition::Gte(value)),
    };
    Some(selector)
}
