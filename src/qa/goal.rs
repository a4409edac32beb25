use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KbError, KbResult};
use crate::modal::ModalIteration;
use crate::term::{PredicateIndicator, Term};

/// One literal of a goal: an atom or a compound term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    term: Term,
}

impl Literal {
    /// Wraps a term as a literal.
    ///
    /// # Errors
    ///
    /// Returns `KbError::Pattern` unless `term` is an atom or a compound.
    pub fn new(term: Term) -> KbResult<Self> {
        match term {
            Term::Atom(_) | Term::Compound(_) => Ok(Self { term }),
            other => Err(KbError::pattern(format!("'{other}' is not a callable literal"))),
        }
    }

    /// `functor(args...)`.
    #[must_use]
    pub fn call(functor: impl Into<String>, args: Vec<Term>) -> Self {
        let term = if args.is_empty() {
            Term::atom(functor)
        } else {
            Term::compound(functor, args)
        };
        Self { term }
    }

    /// The literal as a term.
    #[must_use]
    pub const fn term(&self) -> &Term {
        &self.term
    }

    /// Predicate name, empty for non-callable terms.
    #[must_use]
    pub fn functor(&self) -> &str {
        match &self.term {
            Term::Compound(c) => &c.functor,
            Term::Atom(a) => a,
            _ => "",
        }
    }

    /// Arguments, empty for atoms.
    #[must_use]
    pub fn args(&self) -> &[Term] {
        match &self.term {
            Term::Compound(c) => &c.args,
            _ => &[],
        }
    }

    /// Functor and arity.
    #[must_use]
    pub fn indicator(&self) -> PredicateIndicator {
        PredicateIndicator::new(self.functor(), self.args().len())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.term)
    }
}

/// A conjunctive goal evaluated under a modal context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    /// Conjuncts in evaluation order.
    pub literals: Vec<Literal>,
    /// Modal context the goal is asked in. Empty means plain facts.
    #[serde(default)]
    pub frame: ModalIteration,
    /// Only facts valid at this instant are used.
    #[serde(default)]
    pub time_at: Option<DateTime<Utc>>,
}

impl Goal {
    /// A goal in the empty modal context with no time constraint.
    #[must_use]
    pub fn new(literals: Vec<Literal>) -> Self {
        Self {
            literals,
            frame: ModalIteration::empty(),
            time_at: None,
        }
    }

    /// Asks the goal in the modal context `frame`.
    #[must_use]
    pub fn with_frame(mut self, frame: ModalIteration) -> Self {
        self.frame = frame;
        self
    }

    /// Restricts the goal to facts valid at `time`.
    #[must_use]
    pub fn at_time(mut self, time: DateTime<Utc>) -> Self {
        self.time_at = Some(time);
        self
    }

    /// The same context with different literals.
    #[must_use]
    pub fn with_literals(&self, literals: Vec<Literal>) -> Self {
        Self {
            literals,
            frame: self.frame.clone(),
            time_at: self.time_at,
        }
    }

    /// True for the trivially true goal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.frame.is_empty() {
            write!(f, "{} ", self.frame)?;
        }
        for (i, lit) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{lit}")?;
        }
        Ok(())
    }
}
