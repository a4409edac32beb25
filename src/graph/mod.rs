//! The fact store.
//!
//! Triples live as documents in a document database. Queries are triple
//! patterns compiled to database selectors by the [`PatternCompiler`],
//! which consults the in-memory [`HierarchyCache`] to widen objects of
//! taxonomic predicates to every subsumed class or property.
//!
//! ```
//! use knowbase::graph::{DataBackend, FactStore, QueryableBackend};
//! use knowbase::{StoreConfig, Term, Triple, TriplePattern};
//!
//! let store = FactStore::connect(StoreConfig::with_uri("memory://graph-doc")).unwrap();
//! store.insert_one(&Triple::new("Dog", "subClassOf", "Animal").unwrap()).unwrap();
//! store.insert_one(&Triple::new("rex", "type", "Dog").unwrap()).unwrap();
//!
//! let animals: Vec<_> = store
//!     .lookup(&TriplePattern::new(Term::var("x"), "type", "Animal"))
//!     .unwrap()
//!     .collect();
//! assert_eq!(animals.len(), 1);
//! ```

mod codec;
mod compiler;
mod cursor;
mod hierarchy;
mod query;
mod store;
mod traits;
mod watch;

pub use compiler::PatternCompiler;
pub use cursor::{AnswerCursor, TripleCursor};
pub use hierarchy::{HierarchyCache, Taxonomy};
pub use query::GraphQuery;
pub use store::FactStore;
pub use traits::{DataBackend, PersistentBackend, QueryableBackend};
pub use watch::{WatchCancel, WatchStream};
