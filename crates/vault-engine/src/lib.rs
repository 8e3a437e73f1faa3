//! Embedded SPARQL engine for vault knowledge graphs
//!
//! This crate is the facade over the whole pipeline: the in-memory triple
//! store, the SPARQL parser and executors, the result cache with file
//! invalidation, and the subclass/sameAs inference helpers. Hosts that
//! lift note frontmatter into RDF talk to [`Engine`] only.
//!
//! # Example
//!
//! ```rust
//! use vault_engine::{Engine, QueryOutcome};
//!
//! let engine = Engine::default();
//! engine.update(
//!     "PREFIX ex: <http://example.org/> \
//!      INSERT DATA { ex:task1 ex:label \"Task 1\" }",
//! ).unwrap();
//!
//! let outcome = engine.query(
//!     "PREFIX ex: <http://example.org/> SELECT ?l WHERE { ex:task1 ex:label ?l }",
//! ).unwrap();
//! let QueryOutcome::Solutions(results) = outcome else { panic!() };
//! assert_eq!(results.rows.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod config;
mod engine;
pub mod inference;

pub use config::EngineConfig;
pub use engine::{
    serialize_boolean, serialize_solutions, Engine, EngineError, QueryOptions, QueryOutcome,
};

// Re-export the surface hosts commonly need alongside the engine
pub use graph_store::TripleStore;
pub use query_cache::{CacheStats, ChangeKind};
pub use rdf_io::{RdfFormat, ResultSet, ResultsFormat};
pub use rdf_model::{Dictionary, Direction, Node, Triple, Vocabulary};
pub use sparql::{CancelFlag, DescribeOptions, QueryError, UpdateStat};
