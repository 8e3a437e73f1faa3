//! Engine configuration

use serde::{Deserialize, Serialize};

/// Recognized engine options
///
/// Hosts usually deserialize this from their settings store; every field
/// has a stated effect and a sensible default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// LIMIT applied when a SELECT omits one (None = unlimited)
    pub default_limit: Option<usize>,

    /// Cap for any LIMIT, explicit or defaulted
    pub max_limit: Option<usize>,

    /// Result-cache entry lifetime in milliseconds
    pub cache_ttl_ms: u64,

    /// Result-cache LRU capacity
    pub cache_max_entries: usize,

    /// Results estimated above this size are not cached
    pub cache_max_result_bytes: usize,

    /// Whether cached entries are tagged with and dropped by source files
    pub enable_file_invalidation: bool,

    /// Bound for class-hierarchy walks in the inference helpers
    pub max_inheritance_depth: usize,

    /// Similarity cutoff for the optional vector-search extension
    ///
    /// Orthogonal to the SPARQL core; recognized here so host settings
    /// round-trip through one config object.
    pub similarity_threshold: f32,

    /// Coalescing window of the change recorder in milliseconds
    pub change_window_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: None,
            max_limit: None,
            cache_ttl_ms: 300_000,
            cache_max_entries: 256,
            cache_max_result_bytes: 4 * 1024 * 1024,
            enable_file_invalidation: true,
            max_inheritance_depth: 10,
            similarity_threshold: 0.5,
            change_window_ms: 250,
        }
    }
}
