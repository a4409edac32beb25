//! Modal algebra for qualifying answers with epistemic context.
//!
//! A [`Modality`] names an accessibility relation and fixes its axioms.
//! [`ModalOperator`]s (necessity/possibility over a modality) are composed into
//! a [`ModalIteration`], which collapses adjacent operators whenever the
//! modality's axioms make the longer sequence equivalent to the shorter one.

/// Modalities and their axiom sets.
pub mod modality;
/// Modal operators and iterations.
pub mod operator;

pub use modality::{ModalAxioms, Modality};
pub use operator::{ModalIteration, ModalKind, ModalOperator};
