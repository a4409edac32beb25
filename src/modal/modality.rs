use std::fmt;

use serde::{Deserialize, Serialize};

use super::operator::ModalKind;

/// Frame conditions of an accessibility relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ModalAxioms {
    /// Every world sees itself.
    pub reflexive: bool,
    /// Reachability composes.
    pub transitive: bool,
    /// Worlds reachable from a common world see each other.
    pub euclidean: bool,
}

impl ModalAxioms {
    /// S5: reflexive, transitive and euclidean.
    pub const S5: Self = Self {
        reflexive: true,
        transitive: true,
        euclidean: true,
    };

    /// KD45: transitive and euclidean, not reflexive.
    pub const KD45: Self = Self {
        reflexive: false,
        transitive: true,
        euclidean: true,
    };

    /// K4: transitive only.
    pub const K4: Self = Self {
        reflexive: false,
        transitive: true,
        euclidean: false,
    };
}

/// A named kind of accessibility relation with a fixed axiom set.
///
/// The axioms are fixed at construction time; operators over the modality
/// derive their properties from them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modality {
    name: String,
    axioms: ModalAxioms,
    necessity_symbol: String,
    possibility_symbol: String,
}

impl Modality {
    /// A modality with the given display symbols for necessity and possibility.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        axioms: ModalAxioms,
        necessity_symbol: impl Into<String>,
        possibility_symbol: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            axioms,
            necessity_symbol: necessity_symbol.into(),
            possibility_symbol: possibility_symbol.into(),
        }
    }

    /// Epistemic modality: "the agent knows" (S5).
    #[must_use]
    pub fn knowledge() -> Self {
        Self::new("knowledge", ModalAxioms::S5, "K", "M")
    }

    /// Doxastic modality: "the agent believes" (KD45).
    #[must_use]
    pub fn belief() -> Self {
        Self::new("belief", ModalAxioms::KD45, "B", "C")
    }

    /// Temporal modality over the past: "always was" / "once was" (K4).
    #[must_use]
    pub fn past() -> Self {
        Self::new("past", ModalAxioms::K4, "H", "P")
    }

    /// Name, e.g. `knowledge`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frame conditions of the accessibility relation.
    #[must_use]
    pub const fn axioms(&self) -> ModalAxioms {
        self.axioms
    }

    /// True if the accessibility relation is reflexive.
    #[must_use]
    pub const fn is_reflexive(&self) -> bool {
        self.axioms.reflexive
    }

    /// True if the accessibility relation is transitive.
    #[must_use]
    pub const fn is_transitive(&self) -> bool {
        self.axioms.transitive
    }

    /// True if the accessibility relation is euclidean.
    #[must_use]
    pub const fn is_euclidean(&self) -> bool {
        self.axioms.euclidean
    }

    /// Display glyph of the operator of the given kind over this modality.
    #[must_use]
    pub fn symbol(&self, kind: ModalKind) -> &str {
        match kind {
            ModalKind::Necessity => &self.necessity_symbol,
            ModalKind::Possibility => &self.possibility_symbol,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_axioms() {
        let k = Modality::knowledge();
        assert!(k.is_reflexive() && k.is_transitive() && k.is_euclidean());

        let b = Modality::belief();
        assert!(!b.is_reflexive());
        assert!(b.is_transitive() && b.is_euclidean());

        let p = Modality::past();
        assert!(p.is_transitive());
        assert!(!p.is_euclidean());
        assert!(!p.is_reflexive());
    }

    #[test]
    fn symbols_are_fixed_per_kind() {
        let b = Modality::belief();
        assert_eq!(b.symbol(ModalKind::Necessity), "B");
        assert_eq!(b.symbol(ModalKind::Possibility), "C");
        assert_eq!(Modality::past().symbol(ModalKind::Possibility), "P");
    }

    #[test]
    fn custom_modality() {
        let m = Modality::new("obligation", ModalAxioms::default(), "O", "Pm");
        assert_eq!(m.name(), "obligation");
        assert_eq!(m.axioms(), ModalAxioms::default());
        assert_ne!(m, Modality::knowledge());
    }
}
