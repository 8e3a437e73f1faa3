//! Triple store with default and named graphs

use crate::{IndexedGraph, StoreError, StoreResult};
use rdf_model::{Dictionary, Node, Quad, Triple};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::trace;

/// In-memory triple store
///
/// Holds one default graph and any number of named graphs keyed by IRI.
/// Triple membership is graph-scoped; the same triple may live in several
/// graphs independently. Mutation happens only through the methods here or
/// the update executor's staged batches.
pub struct TripleStore<'a> {
    dictionary: Arc<Dictionary>,
    default: IndexedGraph<'a>,
    named: FxHashMap<Node<'a>, IndexedGraph<'a>>,
}

impl<'a> TripleStore<'a> {
    /// Create an empty store with its own dictionary
    pub fn new() -> Self {
        Self::with_dictionary(Arc::new(Dictionary::new()))
    }

    /// Create an empty store sharing an existing dictionary
    pub fn with_dictionary(dictionary: Arc<Dictionary>) -> Self {
        Self {
            dictionary,
            default: IndexedGraph::new(),
            named: FxHashMap::default(),
        }
    }

    /// The interning dictionary backing this store
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// Add a triple to the default graph; returns false on duplicate
    pub fn add(&mut self, triple: Triple<'a>) -> bool {
        trace!(triple = %triple, "add");
        self.default.insert(triple)
    }

    /// Remove a triple from the default graph; returns whether it existed
    pub fn remove(&mut self, triple: &Triple<'a>) -> bool {
        trace!(triple = %triple, "remove");
        self.default.remove(triple)
    }

    /// Add a triple to a named graph (created implicitly)
    pub fn add_to_graph(&mut self, triple: Triple<'a>, graph: Node<'a>) -> StoreResult<bool> {
        if !graph.is_iri() {
            return Err(StoreError::GraphName(graph.to_string()));
        }
        trace!(triple = %triple, graph = %graph, "add_to_graph");
        Ok(self.named.entry(graph).or_default().insert(triple))
    }

    /// Remove a triple from a named graph; returns whether it existed
    pub fn remove_from_graph(&mut self, triple: &Triple<'a>, graph: &Node<'a>) -> StoreResult<bool> {
        if !graph.is_iri() {
            return Err(StoreError::GraphName(graph.to_string()));
        }
        trace!(triple = %triple, graph = %graph, "remove_from_graph");
        Ok(self
            .named
            .get_mut(graph)
            .map(|g| g.remove(triple))
            .unwrap_or(false))
    }

    /// Add a quad, routing on its graph component
    pub fn add_quad(&mut self, quad: Quad<'a>) -> StoreResult<bool> {
        let triple = quad.to_triple();
        match quad.graph {
            Some(graph) => self.add_to_graph(triple, graph),
            None => Ok(self.add(triple)),
        }
    }

    /// Remove a quad, routing on its graph component
    pub fn remove_quad(&mut self, quad: &Quad<'a>) -> StoreResult<bool> {
        let triple = quad.to_triple();
        match &quad.graph {
            Some(graph) => self.remove_from_graph(&triple, graph),
            None => Ok(self.remove(&triple)),
        }
    }

    /// Match a wildcard pattern against the default graph
    pub fn match_pattern(
        &self,
        subject: Option<&Node<'a>>,
        predicate: Option<&Node<'a>>,
        object: Option<&Node<'a>>,
    ) -> Vec<Triple<'a>> {
        self.default.match_pattern(subject, predicate, object)
    }

    /// Match a [`crate::StorePattern`] against the default graph
    pub fn find(&self, pattern: &crate::StorePattern<'a>) -> Vec<Triple<'a>> {
        self.default.find(pattern)
    }

    /// Match a wildcard pattern against one named graph
    ///
    /// An unknown graph matches nothing.
    pub fn match_in_graph(
        &self,
        subject: Option<&Node<'a>>,
        predicate: Option<&Node<'a>>,
        object: Option<&Node<'a>>,
        graph: &Node<'a>,
    ) -> Vec<Triple<'a>> {
        self.named
            .get(graph)
            .map(|g| g.match_pattern(subject, predicate, object))
            .unwrap_or_default()
    }

    /// Whether the default graph contains the triple
    pub fn contains(&self, triple: &Triple<'a>) -> bool {
        self.default.contains(triple)
    }

    /// Whether a named graph contains the triple
    pub fn contains_in_graph(&self, triple: &Triple<'a>, graph: &Node<'a>) -> bool {
        self.named.get(graph).is_some_and(|g| g.contains(triple))
    }

    /// Names of all named graphs (arbitrary order)
    pub fn graphs(&self) -> Vec<Node<'a>> {
        self.named.keys().cloned().collect()
    }

    /// Whether a named graph exists
    pub fn has_graph(&self, graph: &Node<'a>) -> bool {
        self.named.contains_key(graph)
    }

    /// Triple count of the default graph
    pub fn len(&self) -> usize {
        self.default.len()
    }

    /// Whether the default graph is empty
    pub fn is_empty(&self) -> bool {
        self.default.is_empty()
    }

    /// Triple count of a named graph (0 when absent)
    pub fn graph_len(&self, graph: &Node<'a>) -> usize {
        self.named.get(graph).map(IndexedGraph::len).unwrap_or(0)
    }

    /// Total triple count across all graphs
    pub fn total_len(&self) -> usize {
        self.len() + self.named.values().map(IndexedGraph::len).sum::<usize>()
    }

    /// Distinct subjects of the default graph
    pub fn subjects(&self) -> Vec<Node<'a>> {
        self.default.subjects().cloned().collect()
    }

    /// Iterate the default graph
    pub fn iter_default(&self) -> impl Iterator<Item = &Triple<'a>> {
        self.default.iter()
    }

    /// Iterate one named graph (empty for unknown graphs)
    pub fn iter_graph(&self, graph: &Node<'a>) -> impl Iterator<Item = &Triple<'a>> {
        self.named.get(graph).into_iter().flat_map(IndexedGraph::iter)
    }

    /// Empty the default graph
    pub fn clear_default(&mut self) {
        trace!("clear_default");
        self.default.clear();
    }

    /// Empty one named graph; returns whether it existed
    pub fn clear_graph(&mut self, graph: &Node<'a>) -> bool {
        trace!(graph = %graph, "clear_graph");
        match self.named.get_mut(graph) {
            Some(g) => {
                g.clear();
                true
            }
            None => false,
        }
    }

    /// Remove a named graph entirely; returns whether it existed
    pub fn drop_graph(&mut self, graph: &Node<'a>) -> bool {
        trace!(graph = %graph, "drop_graph");
        self.named.remove(graph).is_some()
    }

    /// Remove all named graphs
    pub fn drop_all_named(&mut self) {
        trace!("drop_all_named");
        self.named.clear();
    }

    /// Empty the whole store (default and named graphs)
    pub fn clear(&mut self) {
        trace!("clear");
        self.default.clear();
        self.named.clear();
    }
}

impl<'a> Default for TripleStore<'a> {
    fn default() -> Self {
        Self::new()
    }
}
