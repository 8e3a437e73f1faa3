//! Per-graph postings indexes
//!
//! Each graph keeps a membership set plus three postings maps keyed by
//! subject, predicate and object. A lookup picks the most selective bound
//! position and filters the remaining components, so matching is O(k) in
//! the candidates under the chosen key.

use rdf_model::{Node, Triple};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// Postings under one key; most subjects and objects carry few triples
type Postings<'a> = SmallVec<[Triple<'a>; 2]>;

/// Which index answers a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Subject postings; for (s ? ?) and (s p ?) shapes
    Subject,
    /// Predicate postings; for (? p ?) shapes
    Predicate,
    /// Object postings; for (? ? o) and (? p o) shapes
    Object,
    /// No bound position - full enumeration
    Scan,
}

impl IndexKind {
    /// Select the index for a pattern given which positions are bound
    ///
    /// Subjects and objects are usually far more selective than
    /// predicates, so a bound predicate is only used when nothing else is.
    pub fn select(subject_bound: bool, predicate_bound: bool, object_bound: bool) -> IndexKind {
        match (subject_bound, predicate_bound, object_bound) {
            (true, _, _) => IndexKind::Subject,
            (false, _, true) => IndexKind::Object,
            (false, true, false) => IndexKind::Predicate,
            (false, false, false) => IndexKind::Scan,
        }
    }
}

/// One graph with membership set and three postings indexes
pub struct IndexedGraph<'a> {
    triples: FxHashSet<Triple<'a>>,
    by_subject: FxHashMap<Node<'a>, Postings<'a>>,
    by_predicate: FxHashMap<Node<'a>, Vec<Triple<'a>>>,
    by_object: FxHashMap<Node<'a>, Postings<'a>>,
}

impl<'a> IndexedGraph<'a> {
    /// Create an empty graph
    pub fn new() -> Self {
        Self {
            triples: FxHashSet::default(),
            by_subject: FxHashMap::default(),
            by_predicate: FxHashMap::default(),
            by_object: FxHashMap::default(),
        }
    }

    /// Insert a triple; returns false if it was already present
    pub fn insert(&mut self, triple: Triple<'a>) -> bool {
        if !self.triples.insert(triple.clone()) {
            return false;
        }
        self.by_subject
            .entry(triple.subject.clone())
            .or_default()
            .push(triple.clone());
        self.by_predicate
            .entry(triple.predicate.clone())
            .or_default()
            .push(triple.clone());
        self.by_object
            .entry(triple.object.clone())
            .or_default()
            .push(triple);
        true
    }

    /// Remove a triple; returns whether it existed
    pub fn remove(&mut self, triple: &Triple<'a>) -> bool {
        if !self.triples.remove(triple) {
            return false;
        }
        if let Some(postings) = self.by_subject.get_mut(&triple.subject) {
            postings.retain(|t| t != triple);
            if postings.is_empty() {
                self.by_subject.remove(&triple.subject);
            }
        }
        if let Some(postings) = self.by_predicate.get_mut(&triple.predicate) {
            postings.retain(|t| t != triple);
            if postings.is_empty() {
                self.by_predicate.remove(&triple.predicate);
            }
        }
        if let Some(postings) = self.by_object.get_mut(&triple.object) {
            postings.retain(|t| t != triple);
            if postings.is_empty() {
                self.by_object.remove(&triple.object);
            }
        }
        true
    }

    /// Whether the graph contains the triple
    pub fn contains(&self, triple: &Triple<'a>) -> bool {
        self.triples.contains(triple)
    }

    /// Number of triples
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Whether the graph is empty
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Drop every triple and index entry
    pub fn clear(&mut self) {
        self.triples.clear();
        self.by_subject.clear();
        self.by_predicate.clear();
        self.by_object.clear();
    }

    /// Iterate all triples (arbitrary order)
    pub fn iter(&self) -> impl Iterator<Item = &Triple<'a>> {
        self.triples.iter()
    }

    /// Distinct subject nodes (seeds for reflexive path closures)
    pub fn subjects(&self) -> impl Iterator<Item = &Node<'a>> {
        self.by_subject.keys()
    }

    /// Match a wildcard pattern, cloning the hits
    ///
    /// A fully unbound pattern enumerates the graph; any bound position
    /// goes through the selected postings index.
    pub fn match_pattern(
        &self,
        subject: Option<&Node<'a>>,
        predicate: Option<&Node<'a>>,
        object: Option<&Node<'a>>,
    ) -> Vec<Triple<'a>> {
        let pattern = crate::StorePattern::new(
            crate::NodePattern::from(subject),
            crate::NodePattern::from(predicate),
            crate::NodePattern::from(object),
        );
        self.find(&pattern)
    }

    /// Match a [`crate::StorePattern`], cloning the hits
    pub fn find(&self, pattern: &crate::StorePattern<'a>) -> Vec<Triple<'a>> {
        let kind = IndexKind::select(
            pattern.subject.is_concrete(),
            pattern.predicate.is_concrete(),
            pattern.object.is_concrete(),
        );

        let filter = |t: &&Triple<'a>| pattern.matches(t);

        match kind {
            IndexKind::Subject => match pattern.subject.as_node().and_then(|s| self.by_subject.get(s)) {
                Some(postings) => postings.iter().filter(filter).cloned().collect(),
                None => Vec::new(),
            },
            IndexKind::Object => match pattern.object.as_node().and_then(|o| self.by_object.get(o)) {
                Some(postings) => postings.iter().filter(filter).cloned().collect(),
                None => Vec::new(),
            },
            IndexKind::Predicate => {
                match pattern.predicate.as_node().and_then(|p| self.by_predicate.get(p)) {
                    Some(postings) => postings.iter().filter(filter).cloned().collect(),
                    None => Vec::new(),
                }
            }
            IndexKind::Scan => self.triples.iter().filter(filter).cloned().collect(),
        }
    }
}

impl<'a> Default for IndexedGraph<'a> {
    fn default() -> Self {
        Self::new()
    }
}
