//! Query-layer error taxonomy

use thiserror::Error;

/// Errors surfaced to the query caller
///
/// FILTER evaluation errors are absorbed per SPARQL semantics (the row is
/// dropped) and never appear here; everything else aborts the surrounding
/// operation and propagates with its kind.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Unparseable query or update text
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        /// 1-based line of the failure
        line: usize,
        /// 1-based column of the failure
        column: usize,
        /// What the parser expected
        message: String,
    },

    /// A required binding was missing (CONSTRUCT/UPDATE data contexts)
    #[error("unbound variable: ?{0}")]
    UnboundVariable(String),

    /// Wrong term kind for a position or operation
    #[error("type error: {0}")]
    Type(String),

    /// Internal algebra invariant violated
    #[error("bad position: {0}")]
    BadPosition(String),

    /// No registration for the referenced extension function IRI
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// No registration for the referenced aggregate IRI
    #[error("unknown aggregate: {0}")]
    UnknownAggregate(String),

    /// Recognized operation the engine does not execute
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Execution was cancelled between yields
    #[error("query cancelled")]
    Cancelled,

    /// The executor deadline elapsed
    #[error("query deadline exceeded")]
    Timeout,

    /// Property paths inside a GRAPH clause are a declared feature gap
    #[error("property paths are not supported inside GRAPH patterns")]
    NamedGraphPathUnsupported,

    /// Variables are illegal in INSERT DATA / DELETE DATA blocks
    #[error("variable ?{0} is not allowed in a data block")]
    VariableInData(String),

    /// The named graph does not exist
    #[error("unknown graph: {0}")]
    UnknownGraph(String),

    /// An operation in a multi-operation update request failed
    ///
    /// Operations before `index` remain committed.
    #[error("update operation {index} failed: {source}")]
    UpdateFailed {
        /// Zero-based index of the failing operation
        index: usize,
        /// The underlying failure
        #[source]
        source: Box<QueryError>,
    },

    /// Term construction failure (invalid IRI or literal, bad position)
    #[error(transparent)]
    Term(#[from] rdf_model::RdfError),

    /// Store-level failure
    #[error(transparent)]
    Store(#[from] graph_store::StoreError),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
