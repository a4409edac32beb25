use std::fmt;

use serde::{Deserialize, Serialize};

use super::modality::Modality;

/// The type of a modal operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalKind {
    /// Box, e.g. "knows".
    Necessity,
    /// Diamond, e.g. "considers possible".
    Possibility,
}

impl ModalKind {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Necessity => "necessity",
            Self::Possibility => "possibility",
        }
    }
}

/// An operator of the modal language, e.g. `K` ("knows") or `B` ("believes").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModalOperator {
    modality: Modality,
    kind: ModalKind,
}

impl ModalOperator {
    /// An operator of the given kind over `modality`.
    #[must_use]
    pub const fn new(modality: Modality, kind: ModalKind) -> Self {
        Self { modality, kind }
    }

    /// The box operator of `modality`.
    #[must_use]
    pub const fn necessity(modality: Modality) -> Self {
        Self::new(modality, ModalKind::Necessity)
    }

    /// The diamond operator of `modality`.
    #[must_use]
    pub const fn possibility(modality: Modality) -> Self {
        Self::new(modality, ModalKind::Possibility)
    }

    /// The modality the operator ranges over.
    #[must_use]
    pub const fn modality(&self) -> &Modality {
        &self.modality
    }

    /// Box or diamond.
    #[must_use]
    pub const fn kind(&self) -> ModalKind {
        self.kind
    }

    /// True if the accessibility relation of this operator's modality is transitive.
    #[must_use]
    pub const fn is_transitive(&self) -> bool {
        self.modality.is_transitive()
    }

    /// True if the accessibility relation of this operator's modality is euclidean.
    #[must_use]
    pub const fn is_euclidean(&self) -> bool {
        self.modality.is_euclidean()
    }

    /// True if the accessibility relation of this operator's modality is reflexive.
    #[must_use]
    pub const fn is_reflexive(&self) -> bool {
        self.modality.is_reflexive()
    }

    /// Display glyph, e.g. `K`.
    #[must_use]
    pub fn symbol(&self) -> &str {
        self.modality.symbol(self.kind)
    }
}

impl fmt::Display for ModalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A nested modal context: a sequence of operators, outermost first.
///
/// The sequence is kept collapsed: every `push_back` normalizes the tail
/// according to the axioms of the pushed operator's modality, so equality is
/// structural over the collapsed sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<ModalOperator>", into = "Vec<ModalOperator>")]
pub struct ModalIteration {
    operators: Vec<ModalOperator>,
}

impl ModalIteration {
    /// The empty iteration (no modal qualification).
    #[must_use]
    pub const fn empty() -> Self {
        Self { operators: Vec::new() }
    }

    /// Appends an operator, collapsing the tail where the axioms allow it.
    ///
    /// - transitive and reflexive: `□□ ≡ □` and `◇◇ ≡ ◇`, the append is a no-op.
    /// - euclidean: `□◇ ≡ ◇`, the necessity is dropped in favour of the later
    ///   possibility.
    ///
    /// Rules are re-applied until the tail is stable, since dropping an
    /// operator can expose a new collapsible pair.
    pub fn push_back(&mut self, op: ModalOperator) {
        loop {
            let Some(last) = self.operators.last() else {
                break;
            };
            if last.modality() != op.modality() {
                break;
            }
            if op.is_transitive() && op.is_reflexive() && last.kind() == op.kind() {
                return;
            }
            if op.is_euclidean()
                && last.kind() == ModalKind::Necessity
                && op.kind() == ModalKind::Possibility
            {
                self.operators.pop();
                continue;
            }
            break;
        }
        self.operators.push(op);
    }

    /// Composes `self` with an inner context.
    #[must_use]
    pub fn then(&self, inner: &Self) -> Self {
        let mut out = self.clone();
        for op in &inner.operators {
            out.push_back(op.clone());
        }
        out
    }

    /// Nesting depth.
    #[must_use]
    pub fn num_operators(&self) -> usize {
        self.operators.len()
    }

    /// True for the empty context.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Operators from outermost to innermost.
    pub fn iter(&self) -> std::slice::Iter<'_, ModalOperator> {
        self.operators.iter()
    }

    /// Canonical string used to index the iteration; empty for no qualification.
    #[must_use]
    pub fn key(&self) -> String {
        self.operators
            .iter()
            .map(|op| format!("{}:{}", op.modality().name(), op.kind().as_str()))
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl From<Vec<ModalOperator>> for ModalIteration {
    fn from(operators: Vec<ModalOperator>) -> Self {
        operators.into_iter().collect()
    }
}

impl From<ModalIteration> for Vec<ModalOperator> {
    fn from(iteration: ModalIteration) -> Self {
        iteration.operators
    }
}

impl FromIterator<ModalOperator> for ModalIteration {
    fn from_iter<I: IntoIterator<Item = ModalOperator>>(iter: I) -> Self {
        let mut out = Self::empty();
        for op in iter {
            out.push_back(op);
        }
        out
    }
}

impl<'a> IntoIterator for &'a ModalIteration {
    type Item = &'a ModalOperator;
    type IntoIter = std::slice::Iter<'a, ModalOperator>;

    fn into_iter(self) -> Self::IntoIter {
        self.operators.iter()
    }
}

impl fmt::Display for ModalIteration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.operators {
            write!(f, "{op}")?;
        }
        Ok(())
    }
}
