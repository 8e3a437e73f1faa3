//! RDF format parsers and serializers
//!
//! Graph formats: Turtle, N-Triples and JSON-LD, all round-tripping the
//! engine's term model including quoted triples (`<< s p o >>`) and
//! directional language tags (`"..."@ar--rtl`, `@direction` in JSON-LD).
//! Result formats for SELECT/ASK: SPARQL-JSON (with a `direction` member),
//! SPARQL-XML, CSV, and a human-readable Turtle-style listing.
//!
//! Serializers emit in bounded memory: Turtle and JSON-LD support chunked
//! emission driven by a configurable batch size.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod jsonld;
pub mod ntriples;
pub mod results;
pub mod turtle;

use rdf_model::Node;

/// Graph serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
    /// Turtle (.ttl)
    Turtle,
    /// N-Triples (.nt)
    NTriples,
    /// JSON-LD (.jsonld)
    JsonLd,
}

/// SELECT / ASK result formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsFormat {
    /// SPARQL 1.1 Results JSON
    Json,
    /// SPARQL Results XML
    Xml,
    /// Comma-separated values
    Csv,
    /// Human-readable `?var = term` listing
    Turtle,
}

/// Errors raised while parsing or serializing
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Syntax error with source position
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// 1-based line
        line: usize,
        /// 1-based column
        column: usize,
        /// What went wrong
        message: String,
    },

    /// Invalid term encountered while building nodes
    #[error(transparent)]
    Term(#[from] rdf_model::RdfError),

    /// Malformed JSON document
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document shape is not what the reader expects
    #[error("unsupported document structure: {0}")]
    Structure(String),
}

/// Result type for format operations
pub type IoResult<T> = Result<T, IoError>;

/// Materialized SELECT result for the serializers
///
/// Variables are listed in projection order; rows hold one optional term
/// per variable (`None` = unbound).
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet<'a> {
    /// Result variables in order
    pub variables: Vec<String>,
    /// Rows of optional terms, one per variable
    pub rows: Vec<Vec<Option<Node<'a>>>>,
}

impl<'a> ResultSet<'a> {
    /// Empty result with the given variables
    pub fn new(variables: Vec<String>) -> Self {
        Self {
            variables,
            rows: Vec::new(),
        }
    }
}
