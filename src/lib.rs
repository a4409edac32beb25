//! # knowbase
//!
//! A knowledge base that keeps provenance- and time-aware triples in a
//! document database and answers goals by running pluggable reasoners
//! concurrently over them.
//!
//! ## Core Concepts
//!
//! - **Triple**: a fact with an origin, an optional validity interval and an
//!   optional modal frame
//! - **FactStore**: compiles triple patterns to database selectors, widening
//!   taxonomic matches through an in-memory subsumption hierarchy
//! - **ModalIteration**: nested knowledge/belief operators that qualify
//!   answers
//! - **Blackboard**: splits a goal across reasoners and merges their answers
//!   into one stream ending with a single end-of-stream token
//!
//! ## Usage
//!
//! ```rust
//! use knowbase::qa::{Goal, Literal};
//! use knowbase::{KnowledgeBase, KnowledgeBaseConfig, StoreConfig, Term, Triple};
//!
//! let config = KnowledgeBaseConfig {
//!     store: StoreConfig::with_uri("memory://crate-doc"),
//!     ..KnowledgeBaseConfig::default()
//! };
//! let kb = KnowledgeBase::new(config)?;
//! kb.insert(&Triple::new("Dog", "subClassOf", "Animal")?)?;
//! kb.insert(&Triple::new("rex", "type", "Dog")?)?;
//!
//! let goal = Goal::new(vec![Literal::call(
//!     "instance_of",
//!     vec![Term::var("x"), Term::atom("Animal")],
//! )]);
//! let answers = kb.ask(goal)?;
//! assert_eq!(answers.len(), 1);
//! # Ok::<(), knowbase::KbError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod answer;
pub mod config;
pub mod error;
pub mod modal;
pub mod term;
pub mod time;
pub mod triple;

// Store and reasoning
pub mod graph;
pub mod kb;
pub mod qa;
pub mod reasoner;
pub mod storage;

pub use answer::{Answer, AnswerToken, TokenPublisher};
pub use config::{BlackboardConfig, KnowledgeBaseConfig, StoreConfig, TaxonomicKind, TaxonomicVocabulary};
pub use error::{KbError, KbResult, ValidationError};
pub use graph::{DataBackend, FactStore, GraphQuery, PersistentBackend, QueryableBackend};
pub use kb::{KnowledgeBase, QueryHandle};
pub use modal::{ModalIteration, ModalKind, ModalOperator, Modality};
pub use qa::{AnswerQueue, Blackboard, CancellationToken, Goal, Literal};
pub use reasoner::{GraphReasoner, Reasoner, ReasonerId, ReasonerRegistry};
pub use storage::StorageError;
pub use term::{PredicateIndicator, Substitution, Term, Variable};
pub use time::TimeInterval;
pub use triple::{ObjectOperator, PatternFrame, Triple, TriplePattern};
