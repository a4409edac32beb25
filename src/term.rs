//! Terms, variables and substitutions.
//!
//! Terms are a tagged union with structural equality. Doubles compare and hash
//! by their bit pattern so that every term can be used as a map key.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::modal::ModalOperator;

/// A named logic variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variable(String);

impl Variable {
    /// A variable named `name`, without the `?` prefix.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name without the `?` prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// A compound term `functor(arg1, ..., argN)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Compound {
    /// Name of the compound.
    pub functor: String,
    /// Arguments in order.
    pub args: Vec<Term>,
}

/// A term of the query language.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Term {
    /// A symbol or IRI.
    Atom(String),
    /// A logic variable.
    Variable(Variable),
    /// A string literal.
    String(String),
    /// A signed integer literal.
    Integer(i64),
    /// A floating-point literal.
    Double(f64),
    /// A boolean literal.
    Bool(bool),
    /// A functor applied to arguments.
    Compound(Compound),
    /// A modal operator used as a term, e.g. inside a modal frame literal.
    Modal(ModalOperator),
}

impl Term {
    /// An atom named `name`.
    #[must_use]
    pub fn atom(name: impl Into<String>) -> Self {
        Self::Atom(name.into())
    }

    /// A variable named `name`.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(Variable::new(name))
    }

    /// A string literal.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// A compound `functor(args...)`.
    #[must_use]
    pub fn compound(functor: impl Into<String>, args: Vec<Term>) -> Self {
        Self::Compound(Compound {
            functor: functor.into(),
            args,
        })
    }

    /// True for variables.
    #[must_use]
    pub const fn is_variable(&self) -> bool {
        matches!(self, Self::Variable(_))
    }

    /// Atomic terms have no sub-terms and are not variables.
    #[must_use]
    pub const fn is_atomic(&self) -> bool {
        !matches!(self, Self::Variable(_) | Self::Compound(_))
    }

    /// A term is ground if it contains no variables.
    #[must_use]
    pub fn is_ground(&self) -> bool {
        match self {
            Self::Variable(_) => false,
            Self::Compound(c) => c.args.iter().all(Self::is_ground),
            _ => true,
        }
    }

    /// The name of an atom.
    #[must_use]
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(a) => Some(a),
            _ => None,
        }
    }

    /// The variable, if this is one.
    #[must_use]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Self::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Collects the variables of this term in first-occurrence order.
    #[must_use]
    pub fn variables(&self) -> Vec<Variable> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<Variable>) {
        match self {
            Self::Variable(v) => {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Self::Compound(c) => {
                for arg in &c.args {
                    arg.collect_variables(out);
                }
            }
            _ => {}
        }
    }

    /// Applies a substitution, replacing bound variables by their values.
    #[must_use]
    pub fn substitute(&self, substitution: &Substitution) -> Self {
        match self {
            Self::Variable(v) => substitution.get(v).cloned().unwrap_or_else(|| self.clone()),
            Self::Compound(c) => Self::Compound(Compound {
                functor: c.functor.clone(),
                args: c.args.iter().map(|a| a.substitute(substitution)).collect(),
            }),
            _ => self.clone(),
        }
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Atom(a), Self::Atom(b)) | (Self::String(a), Self::String(b)) => a == b,
            (Self::Variable(a), Self::Variable(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Compound(a), Self::Compound(b)) => a == b,
            (Self::Modal(a), Self::Modal(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Atom(a) | Self::String(a) => a.hash(state),
            Self::Variable(v) => v.hash(state),
            Self::Integer(i) => i.hash(state),
            Self::Double(d) => d.to_bits().hash(state),
            Self::Bool(b) => b.hash(state),
            Self::Compound(c) => c.hash(state),
            Self::Modal(op) => op.hash(state),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(a) => write!(f, "{a}"),
            Self::Variable(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Compound(c) => {
                write!(f, "{}(", c.functor)?;
                for (i, arg) in c.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Modal(op) => write!(f, "{op}"),
        }
    }
}

impl From<&str> for Term {
    fn from(value: &str) -> Self {
        Self::atom(value)
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Term {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Identifies a predicate by functor and arity, e.g. `triple/3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PredicateIndicator {
    /// Predicate name.
    pub functor: String,
    /// Number of arguments.
    pub arity: usize,
}

impl PredicateIndicator {
    /// The indicator `functor/arity`.
    #[must_use]
    pub fn new(functor: impl Into<String>, arity: usize) -> Self {
        Self {
            functor: functor.into(),
            arity,
        }
    }
}

impl fmt::Display for PredicateIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.functor, self.arity)
    }
}

/// A mapping from variables to terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Substitution {
    bindings: BTreeMap<Variable, Term>,
}

impl Substitution {
    /// An empty substitution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The term bound to `var`.
    #[must_use]
    pub fn get(&self, var: &Variable) -> Option<&Term> {
        self.bindings.get(var)
    }

    /// Looks up a binding by variable name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Term> {
        self.bindings.get(&Variable::new(name))
    }

    /// True if `var` is bound.
    #[must_use]
    pub fn contains(&self, var: &Variable) -> bool {
        self.bindings.contains_key(var)
    }

    /// Binds `var` to `term`.
    ///
    /// Returns false, leaving the substitution unchanged, if `var` is already
    /// bound to a different term.
    pub fn bind(&mut self, var: Variable, term: Term) -> bool {
        match self.bindings.get(&var) {
            Some(existing) => *existing == term,
            None => {
                self.bindings.insert(var, term);
                true
            }
        }
    }

    /// Combines two substitutions. Returns None if they disagree on a variable.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Option<Self> {
        let mut out = self.clone();
        for (var, term) in &other.bindings {
            if !out.bind(var.clone(), term.clone()) {
                return None;
            }
        }
        Some(out)
    }

    /// Bindings in variable order.
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.bindings.iter()
    }

    /// Number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (var, term)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{var}: {term}")?;
        }
        write!(f, "}}")
    }
}
