//! Class-hierarchy and identity inference helpers
//!
//! The small OWL subset the engine carries: `rdfs:subClassOf` hierarchy
//! walks (bounded by the configured depth) and `owl:sameAs` identity
//! closure. Hosts use these for style resolution over note types.

use graph_store::TripleStore;
use rdf_model::{Node, Vocabulary};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Subclasses of a class, bounded by `max_depth` hierarchy levels
///
/// The class itself is included (depth 0).
pub fn subclasses_of<'a>(
    store: &TripleStore<'a>,
    class: &Node<'a>,
    max_depth: usize,
) -> Vec<Node<'a>> {
    hierarchy_walk(store, class, max_depth, false)
}

/// Superclasses of a class, bounded by `max_depth` hierarchy levels
pub fn superclasses_of<'a>(
    store: &TripleStore<'a>,
    class: &Node<'a>,
    max_depth: usize,
) -> Vec<Node<'a>> {
    hierarchy_walk(store, class, max_depth, true)
}

fn hierarchy_walk<'a>(
    store: &TripleStore<'a>,
    class: &Node<'a>,
    max_depth: usize,
    upward: bool,
) -> Vec<Node<'a>> {
    let subclass_of = Node::iri(store.dictionary().intern(Vocabulary::RDFS_SUBCLASSOF));

    let mut visited: FxHashSet<Node<'a>> = FxHashSet::default();
    let mut order = vec![class.clone()];
    let mut frontier = VecDeque::from([(class.clone(), 0usize)]);
    visited.insert(class.clone());

    while let Some((current, depth)) = frontier.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let neighbors = if upward {
            // current rdfs:subClassOf ?super
            store
                .match_pattern(Some(&current), Some(&subclass_of), None)
                .into_iter()
                .map(|t| t.object)
                .collect::<Vec<_>>()
        } else {
            // ?sub rdfs:subClassOf current
            store
                .match_pattern(None, Some(&subclass_of), Some(&current))
                .into_iter()
                .map(|t| t.subject)
                .collect::<Vec<_>>()
        };
        for neighbor in neighbors {
            if visited.insert(neighbor.clone()) {
                order.push(neighbor.clone());
                frontier.push_back((neighbor, depth + 1));
            }
        }
    }
    order
}

/// The `owl:sameAs` identity closure of a node (symmetric, transitive)
///
/// The node itself is included.
pub fn same_as_closure<'a>(store: &TripleStore<'a>, node: &Node<'a>) -> Vec<Node<'a>> {
    let same_as = Node::iri(store.dictionary().intern(Vocabulary::OWL_SAME_AS));

    let mut visited: FxHashSet<Node<'a>> = FxHashSet::default();
    let mut order = vec![node.clone()];
    let mut frontier = VecDeque::from([node.clone()]);
    visited.insert(node.clone());

    while let Some(current) = frontier.pop_front() {
        let mut neighbors: Vec<Node<'a>> = store
            .match_pattern(Some(&current), Some(&same_as), None)
            .into_iter()
            .map(|t| t.object)
            .collect();
        neighbors.extend(
            store
                .match_pattern(None, Some(&same_as), Some(&current))
                .into_iter()
                .map(|t| t.subject),
        );
        for neighbor in neighbors {
            if visited.insert(neighbor.clone()) {
                order.push(neighbor.clone());
                frontier.push_back(neighbor);
            }
        }
    }
    order
}

/// Instances of a class or any of its subclasses
pub fn instances_of<'a>(
    store: &TripleStore<'a>,
    class: &Node<'a>,
    max_depth: usize,
) -> Vec<Node<'a>> {
    let rdf_type = Node::iri(store.dictionary().intern(Vocabulary::RDF_TYPE));

    let mut seen: FxHashSet<Node<'a>> = FxHashSet::default();
    let mut order = Vec::new();
    for class in subclasses_of(store, class, max_depth) {
        for triple in store.match_pattern(None, Some(&rdf_type), Some(&class)) {
            if seen.insert(triple.subject.clone()) {
                order.push(triple.subject);
            }
        }
    }
    order
}
