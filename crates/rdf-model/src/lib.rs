//! RDF/RDF-star term model for the vault knowledge graph
//!
//! This crate provides the core RDF data model:
//! - Zero-copy node representations using lifetimes
//! - String interning for memory efficiency
//! - RDF-star support (quoted triples)
//! - Directional language-tagged literals (RDF 1.2)
//! - Vault note IRIs (`obsidian://vault/<path>`)
//!
//! # Architecture
//!
//! All strings inside nodes are expected to be interned via [`Dictionary`],
//! which hands out stable references for the lifetime of the dictionary.
//! Nodes, triples and quads are immutable value objects; only the store
//! layer above this crate mutates anything.
//!
//! # Example
//!
//! ```rust
//! use rdf_model::{Dictionary, Node, Triple};
//!
//! let dict = Dictionary::new();
//! let subject = Node::iri(dict.intern("http://example.org/task1"));
//! let predicate = Node::iri(dict.intern("http://example.org/label"));
//! let object = Node::literal_str(dict.intern("Task 1"));
//!
//! let triple = Triple::try_new(subject, predicate, object).unwrap();
//! assert_eq!(triple.to_ntriples(), "<http://example.org/task1> <http://example.org/label> \"Task 1\" .");
//! ```

#![deny(unsafe_code)]  // Overridden per module where interning needs it
#![warn(missing_docs, rust_2018_idioms)]

mod dictionary;
mod node;
mod quad;
mod triple;
mod vault;
mod vocab;

pub use dictionary::{BlankNodeAllocator, Dictionary};
pub use node::{escape_literal, BlankNodeId, Direction, IriRef, Literal, Node, VarName};
pub use quad::Quad;
pub use triple::Triple;
pub use vault::{note_iri, note_path, VAULT_SCHEME};
pub use vocab::Vocabulary;

/// Errors that can occur when constructing RDF terms
#[derive(Debug, thiserror::Error)]
pub enum RdfError {
    /// IRI does not satisfy absolute-IRI syntax
    #[error("invalid IRI: {0}")]
    InvalidIri(String),

    /// Literal violates a term-model invariant
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),

    /// Term kind not allowed at this triple position
    #[error("invalid term position: {0}")]
    TermPosition(String),
}

/// Result type for term construction
pub type Result<T> = std::result::Result<T, RdfError>;
