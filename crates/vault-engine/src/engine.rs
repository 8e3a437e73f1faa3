//! The engine facade
//!
//! Wires the store, parser, executors, registries and result cache behind
//! one object. The store follows a coarse reader/writer discipline:
//! queries take the read lock, updates the write lock; the cache has its
//! own lock and is cleared whenever an update may have committed writes.

use crate::{inference, EngineConfig};
use graph_store::TripleStore;
use parking_lot::{Mutex, RwLock};
use query_cache::{
    CacheConfig, CacheStats, CachedResult, ChangeKind, ChangeRecorder, QueryCache,
};
use rdf_io::jsonld::{JsonLdParser, JsonLdSerializer};
use rdf_io::turtle::{TurtleParser, TurtleSerializer};
use rdf_io::{ntriples, results, RdfFormat, ResultSet, ResultsFormat};
use rdf_model::{Dictionary, Node, Triple};
use sparql::{
    AggregateRegistry, Algebra, BindingSet, CancelFlag, CustomAggregate, DescribeOptions,
    ExecControl, Executor, FunctionRegistry, Projection, Query, SparqlParser, UpdateExecutor,
    UpdateStat, VarOrNode,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Errors surfaced by the engine API
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Query layer failure (parse, type, execution control, ...)
    #[error(transparent)]
    Query(#[from] sparql::QueryError),

    /// Serialization / parsing failure
    #[error(transparent)]
    Io(#[from] rdf_io::IoError),

    /// Cache snapshot failure
    #[error(transparent)]
    Cache(#[from] query_cache::CacheError),

    /// Store failure
    #[error(transparent)]
    Store(#[from] graph_store::StoreError),

    /// Term construction failure
    #[error(transparent)]
    Term(#[from] rdf_model::RdfError),
}

/// Per-query options
#[derive(Default, Clone)]
pub struct QueryOptions {
    /// Source files whose change invalidates the cached result
    pub source_files: Vec<String>,

    /// Deadline checked at every executor yield point
    pub deadline: Option<Instant>,

    /// Cooperative cancellation flag
    pub cancel: Option<CancelFlag>,

    /// Bypass the result cache entirely
    pub skip_cache: bool,
}

/// Typed query outcome
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// SELECT solutions in projection order
    Solutions(ResultSet<'static>),
    /// CONSTRUCT / DESCRIBE triples (a set; order is unspecified)
    Graph(Vec<Triple<'static>>),
    /// ASK verdict
    Boolean(bool),
}

/// Embedded SPARQL engine over an in-memory vault graph
pub struct Engine {
    dictionary: Arc<Dictionary>,
    store: RwLock<TripleStore<'static>>,
    cache: Mutex<QueryCache<'static>>,
    recorder: Mutex<ChangeRecorder>,
    functions: FunctionRegistry<'static>,
    aggregates: AggregateRegistry<'static>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        let dictionary = Arc::new(Dictionary::new());
        let cache = QueryCache::new(CacheConfig {
            max_entries: config.cache_max_entries,
            ttl: std::time::Duration::from_millis(config.cache_ttl_ms),
            max_result_bytes: config.cache_max_result_bytes,
            enable_file_invalidation: config.enable_file_invalidation,
        });
        Self {
            store: RwLock::new(TripleStore::with_dictionary(dictionary.clone())),
            cache: Mutex::new(cache),
            recorder: Mutex::new(ChangeRecorder::new(config.change_window_ms)),
            functions: FunctionRegistry::new(),
            aggregates: AggregateRegistry::with_extensions(),
            dictionary,
            config,
        }
    }

    /// The engine dictionary
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// The active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register an extension function under its IRI
    pub fn register_function<F>(&mut self, iri: &str, function: F)
    where
        F: Fn(&[Node<'static>], &sparql::Binding<'static>) -> Option<Node<'static>>
            + Send
            + Sync
            + 'static,
    {
        self.functions.register(iri, function);
    }

    /// Register a custom aggregate under its IRI
    pub fn register_aggregate(&mut self, iri: &str, aggregate: CustomAggregate<'static>) {
        self.aggregates.register(iri, aggregate);
    }

    // ---- data -----------------------------------------------------------

    /// Add a triple to the default graph
    pub fn insert(&self, triple: Triple<'static>) -> bool {
        let added = self.store.write().add(triple);
        if added {
            self.cache.lock().clear();
        }
        added
    }

    /// Build the vault note IRI for a path
    pub fn note_iri(&self, path: &str) -> Node<'static> {
        rdf_model::note_iri(&self.dictionary, path)
    }

    /// Load a graph document into the default graph
    pub fn load_graph(&self, text: &str, format: RdfFormat) -> Result<usize, EngineError> {
        let triples = match format {
            RdfFormat::Turtle => TurtleParser::new(self.dictionary.clone()).parse(text)?,
            RdfFormat::NTriples => {
                ntriples::NTriplesParser::new(self.dictionary.clone()).parse(text)?
            }
            RdfFormat::JsonLd => JsonLdParser::new(self.dictionary.clone()).parse(text)?,
        };
        let mut store = self.store.write();
        let mut added = 0;
        for triple in triples {
            if store.add(triple) {
                added += 1;
            }
        }
        drop(store);
        if added > 0 {
            self.cache.lock().clear();
        }
        debug!(target: "vaultkg::engine", added, ?format, "graph loaded");
        Ok(added)
    }

    /// Serialize the default graph
    pub fn dump_graph(&self, format: RdfFormat) -> String {
        let store = self.store.read();
        let triples: Vec<Triple<'static>> = store.iter_default().cloned().collect();
        drop(store);
        match format {
            RdfFormat::Turtle => TurtleSerializer::new().serialize(&triples),
            RdfFormat::NTriples => ntriples::serialize(&triples),
            RdfFormat::JsonLd => JsonLdSerializer::new().serialize(&triples),
        }
    }

    /// Triple count of the default graph
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    /// Whether the default graph is empty
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// Remove every triple and cached result
    pub fn clear(&self) {
        self.store.write().clear();
        self.cache.lock().clear();
    }

    // ---- queries --------------------------------------------------------

    /// Run a query with default options
    pub fn query(&self, text: &str) -> Result<QueryOutcome, EngineError> {
        self.query_with(text, QueryOptions::default())
    }

    /// Run a query
    ///
    /// SELECT results honor `default_limit` / `max_limit`; outcomes are
    /// cached under the normalized query text and tagged with
    /// `options.source_files`.
    pub fn query_with(
        &self,
        text: &str,
        options: QueryOptions,
    ) -> Result<QueryOutcome, EngineError> {
        if !options.skip_cache {
            if let Some(cached) = self.cache.lock().get(text) {
                debug!(target: "vaultkg::engine", "cache hit");
                return Ok(outcome_from_cached(cached));
            }
        }

        let mut parser = SparqlParser::new(self.dictionary.clone());
        let query: Query<'static> = parser.parse_query(text)?;

        let mut control = ExecControl::unbounded();
        if let Some(deadline) = options.deadline {
            control = control.with_deadline(deadline);
        }
        if let Some(cancel) = options.cancel.clone() {
            control = control.with_cancel(cancel);
        }

        let store = self.store.read();
        let executor = Executor::new(&store)
            .with_functions(&self.functions)
            .with_aggregates(&self.aggregates)
            .with_control(control);

        let outcome = match query {
            Query::Select {
                projection,
                pattern,
                limit,
                offset,
            } => {
                // Drain the lazy stream so cancellation and deadlines are
                // observed between rows even while materializing
                let mut rows = BindingSet::new();
                for row in executor.execute_streaming(&pattern)? {
                    rows.add(row?);
                }
                if let Some(offset) = offset {
                    rows.offset(offset);
                }
                if let Some(limit) = self.effective_limit(limit) {
                    rows.limit(limit);
                }
                QueryOutcome::Solutions(to_result_set(rows, &projection))
            }
            Query::Construct {
                template,
                pattern,
                limit,
                offset,
            } => {
                let pattern = match (offset, self.effective_limit(limit)) {
                    (None, None) => pattern,
                    (start, length) => Algebra::Slice {
                        start,
                        length,
                        input: Box::new(pattern),
                    },
                };
                QueryOutcome::Graph(executor.execute_construct(&template, &pattern)?)
            }
            Query::Describe {
                resources,
                pattern,
                options,
            } => QueryOutcome::Graph(executor.execute_describe(
                &resources,
                pattern.as_ref(),
                options,
            )?),
            Query::Ask { pattern } => {
                QueryOutcome::Boolean(!executor.execute(&pattern)?.is_empty())
            }
        };
        drop(store);

        if !options.skip_cache {
            self.cache.lock().put(
                text,
                cached_from_outcome(&outcome),
                &options.source_files,
                now_ms(),
            );
        }
        Ok(outcome)
    }

    /// Describe concrete resources with explicit traversal options
    ///
    /// This is the engine surface for the asymmetric DESCRIBE branch,
    /// which has no query syntax.
    pub fn describe_resources(
        &self,
        resources: &[Node<'static>],
        options: DescribeOptions,
    ) -> Result<Vec<Triple<'static>>, EngineError> {
        let store = self.store.read();
        let executor = Executor::new(&store);
        let resources: Vec<VarOrNode<'static>> = resources
            .iter()
            .cloned()
            .map(VarOrNode::Node)
            .collect();
        Ok(executor.execute_describe(&resources, None, options)?)
    }

    fn effective_limit(&self, explicit: Option<usize>) -> Option<usize> {
        let requested = explicit.or(self.config.default_limit);
        match (requested, self.config.max_limit) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (Some(limit), None) => Some(limit),
            (None, Some(max)) => Some(max),
            (None, None) => None,
        }
    }

    // ---- updates --------------------------------------------------------

    /// Execute an update request
    ///
    /// Operations commit sequentially; a failure reports its index while
    /// earlier operations stay committed. Cached results are dropped
    /// whenever writes may have landed.
    pub fn update(&self, text: &str) -> Result<Vec<UpdateStat>, EngineError> {
        let mut parser = SparqlParser::new(self.dictionary.clone());
        let request = parser.parse_update(text)?;

        let mut store = self.store.write();
        let mut executor = UpdateExecutor::new(&mut store)
            .with_functions(&self.functions)
            .with_aggregates(&self.aggregates);
        let result = executor.execute_request(&request);
        drop(store);

        // Committed writes (even before a failing operation) invalidate
        // cached results
        self.cache.lock().clear();

        Ok(result?)
    }

    // ---- invalidation ---------------------------------------------------

    /// Invalidate cached results tagged with a changed file
    pub fn file_changed(&self, path: &str) -> usize {
        self.cache.lock().invalidate_file(path)
    }

    /// Record a file event into the change recorder
    pub fn record_change(&self, path: &str, kind: ChangeKind, timestamp_ms: u64) {
        self.recorder.lock().record(path, kind, timestamp_ms);
    }

    /// Flush the recorder and invalidate cache entries for the batch
    pub fn flush_changes(&self) -> usize {
        let batch = self.recorder.lock().flush();
        let mut cache = self.cache.lock();
        batch
            .iter()
            .map(|change| cache.invalidate_file(&change.path))
            .sum()
    }

    /// Remember the observed `(mtime, size)` of a path
    pub fn note_file_seen(&self, path: &str, mtime: u64, size: u64) {
        self.recorder.lock().note_seen(path, mtime, size);
    }

    /// Whether a file differs from its last observation
    pub fn has_file_changed(&self, path: &str, mtime: u64, size: u64) -> bool {
        self.recorder.lock().has_changed(path, mtime, size)
    }

    /// Cache effectiveness counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Serialize the cache for persistence
    pub fn cache_snapshot(&self) -> serde_json::Value {
        self.cache.lock().snapshot()
    }

    /// Restore a cache snapshot produced by [`Engine::cache_snapshot`]
    pub fn cache_restore(&self, snapshot: &serde_json::Value) -> Result<usize, EngineError> {
        Ok(self.cache.lock().restore(snapshot, &self.dictionary)?)
    }

    // ---- inference helpers ----------------------------------------------

    /// Subclasses of a class within the configured inheritance depth
    pub fn subclasses_of(&self, class: &Node<'static>) -> Vec<Node<'static>> {
        let store = self.store.read();
        inference::subclasses_of(&store, class, self.config.max_inheritance_depth)
    }

    /// Superclasses of a class within the configured inheritance depth
    pub fn superclasses_of(&self, class: &Node<'static>) -> Vec<Node<'static>> {
        let store = self.store.read();
        inference::superclasses_of(&store, class, self.config.max_inheritance_depth)
    }

    /// The `owl:sameAs` identity closure of a node
    pub fn same_as_closure(&self, node: &Node<'static>) -> Vec<Node<'static>> {
        let store = self.store.read();
        inference::same_as_closure(&store, node)
    }

    /// Instances of a class or any subclass
    pub fn instances_of(&self, class: &Node<'static>) -> Vec<Node<'static>> {
        let store = self.store.read();
        inference::instances_of(&store, class, self.config.max_inheritance_depth)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Serialize a SELECT result set in the given format
pub fn serialize_solutions(
    results: &ResultSet<'_>,
    format: ResultsFormat,
) -> Result<String, EngineError> {
    Ok(match format {
        ResultsFormat::Json => results::json::serialize_solutions(results),
        ResultsFormat::Xml => results::xml::serialize_solutions(results)?,
        ResultsFormat::Csv => results::csv::serialize_solutions(results),
        ResultsFormat::Turtle => results::turtle_listing(results),
    })
}

/// Serialize an ASK verdict in the given format
pub fn serialize_boolean(value: bool, format: ResultsFormat) -> Result<String, EngineError> {
    Ok(match format {
        ResultsFormat::Json => results::json::serialize_boolean(value),
        ResultsFormat::Xml => results::xml::serialize_boolean(value)?,
        ResultsFormat::Csv => format!("result\r\n{value}\r\n"),
        ResultsFormat::Turtle => value.to_string(),
    })
}

fn to_result_set(rows: BindingSet<'static>, projection: &Projection<'static>) -> ResultSet<'static> {
    let variables: Vec<String> = match projection {
        Projection::Variables(vars) => vars.iter().map(|v| v.name().to_string()).collect(),
        Projection::All => {
            // SELECT *: every user-visible variable, hidden helpers dropped
            let mut names = BTreeSet::new();
            for row in rows.iter() {
                for var in row.without_internal().variables() {
                    names.insert(var.name().to_string());
                }
            }
            names.into_iter().collect()
        }
    };

    let result_rows = rows
        .into_iter()
        .map(|row| {
            variables
                .iter()
                .map(|name| row.get_named(name).cloned())
                .collect()
        })
        .collect();

    ResultSet {
        variables,
        rows: result_rows,
    }
}

fn cached_from_outcome(outcome: &QueryOutcome) -> CachedResult<'static> {
    match outcome {
        QueryOutcome::Solutions(results) => CachedResult::Solutions(results.clone()),
        QueryOutcome::Graph(triples) => CachedResult::Graph(triples.clone()),
        QueryOutcome::Boolean(value) => CachedResult::Boolean(*value),
    }
}

fn outcome_from_cached(cached: CachedResult<'static>) -> QueryOutcome {
    match cached {
        CachedResult::Solutions(results) => QueryOutcome::Solutions(results),
        CachedResult::Graph(triples) => QueryOutcome::Graph(triples),
        CachedResult::Boolean(value) => QueryOutcome::Boolean(value),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
