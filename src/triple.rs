//! Stored triples and the patterns used to query them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KbResult, ValidationError};
use crate::modal::ModalIteration;
use crate::term::{Substitution, Term, Variable};
use crate::time::TimeInterval;

/// Origin assigned to triples asserted without an explicit provenance tag.
pub const DEFAULT_ORIGIN: &str = "user";

/// Origins whose triples only live for one session.
pub const SESSION_ORIGINS: [&str; 2] = ["user", "session"];

/// A fact with provenance and optional temporal and modal qualification.
///
/// Subject and predicate are atoms; the object is any atomic term that is
/// not a variable. The invariant is checked on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Triple {
    subject: Term,
    predicate: Term,
    object: Term,
    origin: String,
    interval: TimeInterval,
    frame: ModalIteration,
}

impl Triple {
    /// Creates a triple with the default origin, no time bounds and no modal frame.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonAtomicTerm` if subject or predicate is not
    /// an atom, or if the object is a variable, a compound or a modal operator.
    pub fn new(subject: impl Into<Term>, predicate: impl Into<Term>, object: impl Into<Term>) -> KbResult<Self> {
        let subject = subject.into();
        let predicate = predicate.into();
        let object = object.into();

        if subject.as_atom().is_none() {
            return Err(non_atomic("subject", &subject));
        }
        if predicate.as_atom().is_none() {
            return Err(non_atomic("predicate", &predicate));
        }
        if !object.is_atomic() || matches!(object, Term::Modal(_)) {
            return Err(non_atomic("object", &object));
        }

        Ok(Self {
            subject,
            predicate,
            object,
            origin: DEFAULT_ORIGIN.to_string(),
            interval: TimeInterval::always(),
            frame: ModalIteration::empty(),
        })
    }

    /// Sets the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Restricts validity to `interval`.
    #[must_use]
    pub fn with_interval(mut self, interval: TimeInterval) -> Self {
        self.interval = interval;
        self
    }

    /// Qualifies the triple with a modal context.
    #[must_use]
    pub fn with_frame(mut self, frame: ModalIteration) -> Self {
        self.frame = frame;
        self
    }

    /// The subject atom.
    #[must_use]
    pub const fn subject(&self) -> &Term {
        &self.subject
    }

    /// The predicate atom.
    #[must_use]
    pub const fn predicate(&self) -> &Term {
        &self.predicate
    }

    /// The object term.
    #[must_use]
    pub const fn object(&self) -> &Term {
        &self.object
    }

    /// Subject name. Always present by construction.
    #[must_use]
    pub fn subject_name(&self) -> &str {
        self.subject.as_atom().unwrap_or_default()
    }

    /// Predicate name. Always present by construction.
    #[must_use]
    pub fn predicate_name(&self) -> &str {
        self.predicate.as_atom().unwrap_or_default()
    }

    /// Source the triple came from.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Validity interval.
    #[must_use]
    pub const fn interval(&self) -> &TimeInterval {
        &self.interval
    }

    /// Modal context, empty for plain facts.
    #[must_use]
    pub const fn frame(&self) -> &ModalIteration {
        &self.frame
    }
}

fn non_atomic(field: &'static str, term: &Term) -> crate::error::KbError {
    ValidationError::NonAtomicTerm {
        field,
        term: term.to_string(),
    }
    .into()
}

/// How the object of a pattern is compared with stored objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectOperator {
    /// Equality, widened to subsumed classes and properties where the
    /// predicate is taxonomic.
    #[default]
    Eq,
    /// Equality, never widened.
    Exact,
    /// Stored object is less than the pattern's.
    Lt,
    /// Less than or equal.
    Leq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Geq,
}

impl ObjectOperator {
    /// True for the ordering operators.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(self, Self::Lt | Self::Leq | Self::Gt | Self::Geq)
    }
}

/// Contextual constraints of a pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternFrame {
    /// Accepted origins. Empty means any origin.
    pub origins: Vec<String>,
    /// Only triples valid at this instant match.
    pub time_at: Option<DateTime<Utc>>,
    /// Only triples qualified by exactly this modal context match.
    /// `None` accepts any context.
    pub modal: Option<ModalIteration>,
}

impl PatternFrame {
    /// True if the frame accepts every triple.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.origins.is_empty() && self.time_at.is_none() && self.modal.is_none()
    }
}

/// A triple pattern. Any of subject, predicate and object may be a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriplePattern {
    /// Subject atom or variable.
    pub subject: Term,
    /// Predicate atom or variable.
    pub predicate: Term,
    /// Object term or variable.
    pub object: Term,
    /// How the object is compared.
    #[serde(default)]
    pub object_operator: ObjectOperator,
    /// Origin, time and modal constraints.
    #[serde(default)]
    pub frame: PatternFrame,
}

impl TriplePattern {
    /// A pattern with equality on the object and no frame constraints.
    #[must_use]
    pub fn new(subject: impl Into<Term>, predicate: impl Into<Term>, object: impl Into<Term>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            object_operator: ObjectOperator::Eq,
            frame: PatternFrame::default(),
        }
    }

    /// Pattern matching exactly the given triple, including its frame.
    #[must_use]
    pub fn exact(triple: &Triple) -> Self {
        Self {
            subject: triple.subject.clone(),
            predicate: triple.predicate.clone(),
            object: triple.object.clone(),
            object_operator: ObjectOperator::Exact,
            frame: PatternFrame {
                origins: vec![triple.origin.clone()],
                time_at: None,
                modal: Some(triple.frame.clone()),
            },
        }
    }

    /// Sets the object operator.
    #[must_use]
    pub fn with_operator(mut self, op: ObjectOperator) -> Self {
        self.object_operator = op;
        self
    }

    /// Adds `origin` to the accepted origins.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.frame.origins.push(origin.into());
        self
    }

    /// Restricts matches to triples valid at `time`.
    #[must_use]
    pub fn at_time(mut self, time: DateTime<Utc>) -> Self {
        self.frame.time_at = Some(time);
        self
    }

    /// Restricts matches to triples in exactly the `modal` context.
    #[must_use]
    pub fn in_context(mut self, modal: ModalIteration) -> Self {
        self.frame.modal = Some(modal);
        self
    }

    /// Subject, predicate and object in order.
    #[must_use]
    pub fn terms(&self) -> [&Term; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// Variables of the pattern in position order.
    #[must_use]
    pub fn variables(&self) -> Vec<Variable> {
        let mut out = Vec::new();
        for term in self.terms() {
            for var in term.variables() {
                if !out.contains(&var) {
                    out.push(var);
                }
            }
        }
        out
    }

    /// Replaces bound variables.
    #[must_use]
    pub fn substitute(&self, substitution: &Substitution) -> Self {
        Self {
            subject: self.subject.substitute(substitution),
            predicate: self.predicate.substitute(substitution),
            object: self.object.substitute(substitution),
            object_operator: self.object_operator,
            frame: self.frame.clone(),
        }
    }

    /// Binds the pattern's variables to the corresponding positions of a
    /// matched triple. Constant positions are not re-checked.
    ///
    /// Returns None if one variable occurs at two positions with different values.
    #[must_use]
    pub fn bindings(&self, triple: &Triple) -> Option<Substitution> {
        let mut out = Substitution::new();
        for (pattern_term, value) in self.terms().into_iter().zip(triple_terms(triple)) {
            if let Term::Variable(var) = pattern_term {
                if !out.bind(var.clone(), value.clone()) {
                    return None;
                }
            }
        }
        Some(out)
    }
}

fn triple_terms(triple: &Triple) -> [&Term; 3] {
    [&triple.subject, &triple.predicate, &triple.object]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modal::{Modality, ModalOperator};

    #[test]
    fn rejects_variable_subject_and_predicate() {
        let err = Triple::new(Term::var("x"), "p", "o").unwrap_err();
        assert!(err.is_validation());
        assert!(Triple::new("s", Term::var("p"), "o").is_err());
        assert!(Triple::new("s", Term::Integer(3), "o").is_err());
    }

    #[test]
    fn rejects_non_atomic_object() {
        assert!(Triple::new("s", "p", Term::var("o")).is_err());
        assert!(Triple::new("s", "p", Term::compound("f", vec![Term::atom("a")])).is_err());
        assert!(Triple::new("s", "p", Term::Modal(ModalOperator::necessity(Modality::knowledge()))).is_err());
    }

    #[test]
    fn accepts_literal_objects() {
        let t = Triple::new("robot", "weight", 12.5).unwrap().with_origin("onto");
        assert_eq!(t.object(), &Term::Double(12.5));
        assert_eq!(t.origin(), "onto");
        assert_eq!(t.subject_name(), "robot");
        assert_eq!(t.predicate_name(), "weight");
    }

    #[test]
    fn default_origin_is_user() {
        let t = Triple::new("a", "p", "b").unwrap();
        assert_eq!(t.origin(), DEFAULT_ORIGIN);
        assert!(t.interval().is_unbounded());
        assert!(t.frame().is_empty());
    }

    #[test]
    fn bindings_respect_repeated_variables() {
        let pattern = TriplePattern::new(Term::var("x"), "knows", Term::var("x"));
        let reflexive = Triple::new("a", "knows", "a").unwrap();
        let other = Triple::new("a", "knows", "b").unwrap();

        let sub = pattern.bindings(&reflexive).unwrap();
        assert_eq!(sub.get_by_name("x"), Some(&Term::atom("a")));
        assert!(pattern.bindings(&other).is_none());
    }

    #[test]
    fn substitute_grounds_bound_positions() {
        let pattern = TriplePattern::new(Term::var("x"), "knows", Term::var("y"));
        let mut sub = Substitution::new();
        sub.bind(Variable::new("x"), Term::atom("alice"));

        let grounded = pattern.substitute(&sub);
        assert_eq!(grounded.subject, Term::atom("alice"));
        assert!(grounded.object.is_variable());
        assert_eq!(grounded.variables(), vec![Variable::new("y")]);
    }

    #[test]
    fn exact_pattern_pins_frame() {
        let t = Triple::new("a", "p", "b").unwrap().with_origin("o1");
        let pattern = TriplePattern::exact(&t);
        assert_eq!(pattern.object_operator, ObjectOperator::Exact);
        assert_eq!(pattern.frame.origins, vec!["o1".to_string()]);
        assert_eq!(pattern.frame.modal, Some(ModalIteration::empty()));
    }
}
