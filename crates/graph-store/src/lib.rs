//! Indexed in-memory triple store
//!
//! The store holds exactly one default graph and any number of named graphs
//! keyed by IRI. Each graph keeps postings indexes for the three common
//! access patterns (bound subject, bound predicate, bound object), so a
//! match with any bound component touches only the candidate triples under
//! that key and is never a scan of the whole graph.
//!
//! Quoted triples are ordinary [`rdf_model::Node`] index keys - their
//! structural hash makes an RDF-star term indexable exactly like an atomic
//! term.
//!
//! # Example
//!
//! ```rust
//! use graph_store::TripleStore;
//! use rdf_model::{Node, Triple};
//!
//! let mut store = TripleStore::new();
//! let dict = store.dictionary().clone();
//!
//! let triple = Triple::try_new(
//!     Node::iri(dict.intern("http://example.org/task1")),
//!     Node::iri(dict.intern("http://example.org/label")),
//!     Node::literal_str(dict.intern("Task 1")),
//! ).unwrap();
//!
//! store.add(triple.clone());
//! let hits = store.match_pattern(None, None, Some(&triple.object));
//! assert_eq!(hits.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod index;
mod pattern;
mod store;

pub use index::{IndexKind, IndexedGraph};
pub use pattern::{NodePattern, StorePattern};
pub use store::TripleStore;

/// Errors raised by store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Graph names must be IRIs
    #[error("graph name must be an IRI: {0}")]
    GraphName(String),

    /// The named graph does not exist
    #[error("unknown graph: {0}")]
    UnknownGraph(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
