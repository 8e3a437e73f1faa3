//! LRU result cache with TTL and file-based invalidation

use crate::normalize_query;
use lru::LruCache;
use rdf_io::ntriples::{self, NTriplesParser};
use rdf_io::{results, ResultSet};
use rdf_model::{Dictionary, Triple};
use rustc_hash::FxHashSet;
use serde_json::{json, Value};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache policy knobs
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// LRU capacity
    pub max_entries: usize,
    /// Entry lifetime
    pub ttl: Duration,
    /// Results estimated above this size are refused (not an error)
    pub max_result_bytes: usize,
    /// Whether file tags are recorded and honored
    pub enable_file_invalidation: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            ttl: Duration::from_secs(300),
            max_result_bytes: 4 * 1024 * 1024,
            enable_file_invalidation: true,
        }
    }
}

/// Cache effectiveness counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that missed
    pub misses: u64,
    /// Entries dropped because their TTL elapsed
    pub ttl_evictions: u64,
    /// Entries dropped by file invalidation
    pub file_invalidations: u64,
    /// Results refused for exceeding the size ceiling
    pub refused: u64,
}

/// A cached, typed query result
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResult<'a> {
    /// SELECT solutions
    Solutions(ResultSet<'a>),
    /// CONSTRUCT / DESCRIBE triples
    Graph(Vec<Triple<'a>>),
    /// ASK verdict
    Boolean(bool),
}

/// Snapshot restore errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The snapshot version is not supported
    #[error("unsupported cache snapshot version {0}")]
    Version(u64),
    /// The snapshot payload is malformed
    #[error("malformed cache snapshot: {0}")]
    Malformed(String),
    /// A serialized result failed to parse back
    #[error(transparent)]
    Io(#[from] rdf_io::IoError),
}

struct CacheEntry<'a> {
    result: CachedResult<'a>,
    inserted_at: Instant,
    timestamp_ms: u64,
    files: FxHashSet<String>,
}

/// Normalized-query result cache
pub struct QueryCache<'a> {
    entries: LruCache<String, CacheEntry<'a>>,
    config: CacheConfig,
    stats: CacheStats,
}

impl<'a> QueryCache<'a> {
    /// Create a cache with the given policy
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Look up a query; a TTL-expired entry counts as a miss
    pub fn get(&mut self, query: &str) -> Option<CachedResult<'a>> {
        let key = normalize_query(query);
        let expired = match self.entries.peek(&key) {
            Some(entry) => entry.inserted_at.elapsed() > self.config.ttl,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };
        if expired {
            self.entries.pop(&key);
            self.stats.ttl_evictions += 1;
            self.stats.misses += 1;
            debug!(target: "vaultkg::cache", key = %key, "ttl eviction");
            return None;
        }
        self.stats.hits += 1;
        self.entries.get(&key).map(|entry| entry.result.clone())
    }

    /// Store a result, tagged with the source files it depends on
    ///
    /// Oversized results are refused silently (counted in the stats).
    pub fn put(
        &mut self,
        query: &str,
        result: CachedResult<'a>,
        files: &[String],
        timestamp_ms: u64,
    ) {
        let size = estimate_size(&result);
        if size > self.config.max_result_bytes {
            self.stats.refused += 1;
            debug!(target: "vaultkg::cache", size, "result refused");
            return;
        }
        let files = if self.config.enable_file_invalidation {
            files.iter().cloned().collect()
        } else {
            FxHashSet::default()
        };
        self.entries.put(
            normalize_query(query),
            CacheEntry {
                result,
                inserted_at: Instant::now(),
                timestamp_ms,
                files,
            },
        );
    }

    /// Drop every entry tagged with the changed file
    ///
    /// Returns the number of dropped entries (also added to the
    /// file-invalidation counter).
    pub fn invalidate_file(&mut self, path: &str) -> usize {
        if !self.config.enable_file_invalidation {
            return 0;
        }
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.files.contains(path))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.entries.pop(key);
        }
        self.stats.file_invalidations += keys.len() as u64;
        if !keys.is_empty() {
            debug!(target: "vaultkg::cache", path, dropped = keys.len(), "file invalidation");
        }
        keys.len()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Effectiveness counters
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Serialize the cache as a versioned snapshot
    ///
    /// Results are stored in their text formats (SPARQL-JSON for
    /// solutions, N-Triples for graphs); the version field gates restores.
    pub fn snapshot(&self) -> Value {
        let entries: Vec<Value> = self
            .entries
            .iter()
            .map(|(key, entry)| {
                let (kind, payload) = match &entry.result {
                    CachedResult::Solutions(results) => {
                        ("select", results::json::serialize_solutions(results))
                    }
                    CachedResult::Graph(triples) => ("graph", ntriples::serialize(triples)),
                    CachedResult::Boolean(value) => {
                        ("boolean", results::json::serialize_boolean(*value))
                    }
                };
                json!({
                    "id": key,
                    "kind": kind,
                    "results": payload,
                    "timestamp": entry.timestamp_ms,
                    "affectedFiles": entry.files.iter().collect::<Vec<_>>(),
                })
            })
            .collect();
        json!({ "version": 1, "entries": entries })
    }

    /// Restore entries from a snapshot produced by [`QueryCache::snapshot`]
    pub fn restore(&mut self, snapshot: &Value, dict: &Arc<Dictionary>) -> Result<usize, CacheError> {
        let version = snapshot
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| CacheError::Malformed("missing version".into()))?;
        if version != 1 {
            return Err(CacheError::Version(version));
        }
        let entries = snapshot
            .get("entries")
            .and_then(Value::as_array)
            .ok_or_else(|| CacheError::Malformed("missing entries".into()))?;

        let mut restored = 0;
        for entry in entries {
            let id = entry
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| CacheError::Malformed("entry without id".into()))?;
            let kind = entry
                .get("kind")
                .and_then(Value::as_str)
                .ok_or_else(|| CacheError::Malformed("entry without kind".into()))?;
            let payload = entry
                .get("results")
                .and_then(Value::as_str)
                .ok_or_else(|| CacheError::Malformed("entry without results".into()))?;
            let timestamp_ms = entry
                .get("timestamp")
                .and_then(Value::as_u64)
                .unwrap_or_default();
            let files: Vec<String> = entry
                .get("affectedFiles")
                .and_then(Value::as_array)
                .map(|array| {
                    array
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let result = match kind {
                "select" => {
                    CachedResult::Solutions(results::json::parse_solutions(payload, dict)?)
                }
                "graph" => {
                    let mut parser = NTriplesParser::new(dict.clone());
                    CachedResult::Graph(parser.parse(payload)?)
                }
                "boolean" => CachedResult::Boolean(results::json::parse_boolean(payload)?),
                other => {
                    return Err(CacheError::Malformed(format!("unknown kind '{other}'")))
                }
            };
            self.put(id, result, &files, timestamp_ms);
            restored += 1;
        }
        Ok(restored)
    }
}

fn estimate_size(result: &CachedResult<'_>) -> usize {
    match result {
        CachedResult::Solutions(results) => results
            .rows
            .iter()
            .flatten()
            .flatten()
            .map(|node| node.to_string().len())
            .sum(),
        CachedResult::Graph(triples) => {
            triples.iter().map(|t| t.to_ntriples().len()).sum()
        }
        CachedResult::Boolean(_) => 1,
    }
}
