//! CONSTRUCT and DESCRIBE executors
//!
//! Both produce sets of triples: CONSTRUCT instantiates a template per
//! solution, DESCRIBE walks the graph around a set of resources. Output
//! order is unspecified; dedup uses the canonical triple text.

use crate::algebra::{Algebra, DescribeOptions, PredicatePattern, TermPattern, TriplePattern, VarOrNode};
use crate::{Binding, Executor, QueryError, QueryResult};
use rdf_model::{Node, Triple};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

impl<'a, 's> Executor<'a, 's> {
    /// Instantiate a CONSTRUCT template against the WHERE solutions
    ///
    /// Template triples with unbound variables, a literal subject, or a
    /// non-IRI predicate are skipped silently per SPARQL semantics.
    pub fn execute_construct(
        &self,
        template: &[TriplePattern<'a>],
        pattern: &Algebra<'a>,
    ) -> QueryResult<Vec<Triple<'a>>> {
        for entry in template {
            if matches!(entry.predicate, PredicatePattern::Path(_)) {
                return Err(QueryError::BadPosition(
                    "property path in CONSTRUCT template".into(),
                ));
            }
        }

        let solutions = self.execute(pattern)?;
        let mut seen = FxHashSet::default();
        let mut triples = Vec::new();

        for row in solutions.iter() {
            self.control.check()?;
            for entry in template {
                let PredicatePattern::Term(predicate) = &entry.predicate else {
                    continue;
                };
                let (Some(s), Some(p), Some(o)) = (
                    instantiate(&entry.subject, row),
                    instantiate(predicate, row),
                    instantiate(&entry.object, row),
                ) else {
                    continue;
                };
                // Illegal positions skip the template triple, not the query
                let Ok(triple) = Triple::try_new(s, p, o) else {
                    continue;
                };
                if seen.insert(triple.to_ntriples()) {
                    triples.push(triple);
                }
            }
        }
        Ok(triples)
    }

    /// Describe a set of resources
    ///
    /// Breadth-first expansion with a visited set; by default symmetric
    /// (outgoing and incoming triples) and unlimited depth.
    pub fn execute_describe(
        &self,
        resources: &[VarOrNode<'a>],
        pattern: Option<&Algebra<'a>>,
        options: DescribeOptions,
    ) -> QueryResult<Vec<Triple<'a>>> {
        let mut roots = Vec::new();
        match pattern {
            Some(pattern) => {
                let solutions = self.execute(pattern)?;
                for resource in resources {
                    match resource {
                        VarOrNode::Var(var) => {
                            for row in solutions.iter() {
                                if let Some(node) = row.get(var) {
                                    roots.push(node.clone());
                                }
                            }
                        }
                        VarOrNode::Node(node) => roots.push(node.clone()),
                    }
                }
            }
            None => {
                for resource in resources {
                    if let VarOrNode::Node(node) = resource {
                        roots.push(node.clone());
                    }
                }
            }
        }

        let mut visited: FxHashSet<String> = FxHashSet::default();
        let mut seen_triples: FxHashSet<String> = FxHashSet::default();
        let mut triples = Vec::new();
        let mut frontier: VecDeque<(Node<'a>, usize)> = VecDeque::new();

        for root in roots {
            if visited.insert(root.to_string()) {
                frontier.push_back((root, 0));
            }
        }

        while let Some((node, depth)) = frontier.pop_front() {
            self.control.check()?;
            if let Some(max) = options.depth {
                if depth >= max {
                    continue;
                }
            }

            let outgoing = self.store.match_pattern(Some(&node), None, None);
            let incoming = if options.symmetric {
                self.store.match_pattern(None, None, Some(&node))
            } else {
                Vec::new()
            };

            for triple in outgoing {
                let next = triple.object.clone();
                if seen_triples.insert(triple.to_ntriples()) {
                    triples.push(triple);
                }
                if !next.is_literal() && visited.insert(next.to_string()) {
                    frontier.push_back((next, depth + 1));
                }
            }
            for triple in incoming {
                let next = triple.subject.clone();
                if seen_triples.insert(triple.to_ntriples()) {
                    triples.push(triple);
                }
                if visited.insert(next.to_string()) {
                    frontier.push_back((next, depth + 1));
                }
            }
        }
        Ok(triples)
    }
}

/// Instantiate a template element; None when a variable is unbound
fn instantiate<'a>(pattern: &TermPattern<'a>, row: &Binding<'a>) -> Option<Node<'a>> {
    match pattern {
        TermPattern::Var(var) => row.get(var).cloned(),
        TermPattern::Node(node) => Some(node.clone()),
        TermPattern::Quoted(q) => {
            let subject = instantiate(&q.subject, row)?;
            let predicate = instantiate(&q.predicate, row)?;
            let object = instantiate(&q.object, row)?;
            Triple::try_new(subject, predicate, object)
                .ok()
                .map(Node::quoted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_store::TripleStore;
    use rdf_model::{VarName, Vocabulary};

    fn sample_store() -> TripleStore<'static> {
        let mut store = TripleStore::new();
        let dict = store.dictionary().clone();
        for (task, label) in [("task1", "Task 1"), ("task2", "Task 2")] {
            store.add(
                Triple::try_new(
                    Node::iri(dict.intern(&format!("http://example.org/{task}"))),
                    Node::iri(dict.intern("http://example.org/label")),
                    Node::literal_str(dict.intern(label)),
                )
                .unwrap(),
            );
        }
        store
    }

    fn label_pattern() -> Algebra<'static> {
        Algebra::Bgp(vec![TriplePattern::new(
            TermPattern::Var(VarName::new("s")),
            TermPattern::Node(Node::iri("http://example.org/label")),
            TermPattern::Var(VarName::new("l")),
        )])
    }

    #[test]
    fn construct_instantiates_template() {
        let store = sample_store();
        let executor = Executor::new(&store);

        let template = vec![TriplePattern::new(
            TermPattern::Var(VarName::new("s")),
            TermPattern::Node(Node::iri("http://example.org/title")),
            TermPattern::Var(VarName::new("l")),
        )];
        let triples = executor
            .execute_construct(&template, &label_pattern())
            .unwrap();
        assert_eq!(triples.len(), 2);
        assert!(triples
            .iter()
            .all(|t| t.predicate_iri() == Some("http://example.org/title")));
    }

    #[test]
    fn construct_skips_unbound_and_deduplicates() {
        let store = sample_store();
        let executor = Executor::new(&store);

        let template = vec![
            // ?missing is never bound: this template triple drops out
            TriplePattern::new(
                TermPattern::Var(VarName::new("s")),
                TermPattern::Node(Node::iri("http://example.org/title")),
                TermPattern::Var(VarName::new("missing")),
            ),
            // Constant triple instantiates once per solution, kept once
            TriplePattern::new(
                TermPattern::Node(Node::iri("http://example.org/graph")),
                TermPattern::Node(Node::iri(Vocabulary::RDF_TYPE)),
                TermPattern::Node(Node::iri("http://example.org/Export")),
            ),
        ];
        let triples = executor
            .execute_construct(&template, &label_pattern())
            .unwrap();
        assert_eq!(triples.len(), 1);
    }

    #[test]
    fn construct_is_idempotent_on_its_output() {
        let store = sample_store();
        let executor = Executor::new(&store);

        let template = vec![TriplePattern::new(
            TermPattern::Var(VarName::new("s")),
            TermPattern::Node(Node::iri("http://example.org/label")),
            TermPattern::Var(VarName::new("l")),
        )];
        let once = executor
            .execute_construct(&template, &label_pattern())
            .unwrap();

        // Rebuild a store from the output and construct again
        let mut second_store = TripleStore::with_dictionary(store.dictionary().clone());
        for t in &once {
            second_store.add(t.clone());
        }
        let second_executor = Executor::new(&second_store);
        let twice = second_executor
            .execute_construct(&template, &label_pattern())
            .unwrap();

        let a: FxHashSet<String> = once.iter().map(Triple::to_ntriples).collect();
        let b: FxHashSet<String> = twice.iter().map(Triple::to_ntriples).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn construct_quoted_template() {
        let store = sample_store();
        let executor = Executor::new(&store);

        let template = vec![TriplePattern::new(
            TermPattern::Quoted(Box::new(crate::algebra::QuotedPattern {
                subject: TermPattern::Var(VarName::new("s")),
                predicate: TermPattern::Node(Node::iri("http://example.org/label")),
                object: TermPattern::Var(VarName::new("l")),
            })),
            TermPattern::Node(Node::iri("http://example.org/assertedBy")),
            TermPattern::Node(Node::iri("http://example.org/vault")),
        )];
        let triples = executor
            .execute_construct(&template, &label_pattern())
            .unwrap();
        assert_eq!(triples.len(), 2);
        assert!(triples.iter().all(|t| t.subject.is_quoted()));
    }

    #[test]
    fn describe_symmetric_follows_both_directions() {
        let mut store = TripleStore::new();
        let dict = store.dictionary().clone();
        let task = Node::iri(dict.intern("http://example.org/task1"));
        store.add(
            Triple::try_new(
                task.clone(),
                Node::iri(dict.intern("http://example.org/parent")),
                Node::iri(dict.intern("http://example.org/proj1")),
            )
            .unwrap(),
        );
        store.add(
            Triple::try_new(
                Node::iri(dict.intern("http://example.org/note1")),
                Node::iri(dict.intern("http://example.org/mentions")),
                task.clone(),
            )
            .unwrap(),
        );

        let executor = Executor::new(&store);
        let triples = executor
            .execute_describe(
                &[VarOrNode::Node(task.clone())],
                None,
                DescribeOptions {
                    depth: Some(1),
                    symmetric: true,
                },
            )
            .unwrap();
        assert_eq!(triples.len(), 2);

        let outgoing_only = executor
            .execute_describe(
                &[VarOrNode::Node(task)],
                None,
                DescribeOptions {
                    depth: Some(1),
                    symmetric: false,
                },
            )
            .unwrap();
        assert_eq!(outgoing_only.len(), 1);
    }

    #[test]
    fn describe_expands_breadth_first_with_cycle_guard() {
        let mut store = TripleStore::new();
        let dict = store.dictionary().clone();
        // a -> b -> a cycle plus b -> c
        for (s, o) in [("a", "b"), ("b", "a"), ("b", "c")] {
            store.add(
                Triple::try_new(
                    Node::iri(dict.intern(&format!("http://example.org/{s}"))),
                    Node::iri(dict.intern("http://example.org/linksTo")),
                    Node::iri(dict.intern(&format!("http://example.org/{o}"))),
                )
                .unwrap(),
            );
        }

        let executor = Executor::new(&store);
        let triples = executor
            .execute_describe(
                &[VarOrNode::Node(Node::iri(dict.intern("http://example.org/a")))],
                None,
                DescribeOptions::default(),
            )
            .unwrap();
        // Every edge appears exactly once despite the cycle
        assert_eq!(triples.len(), 3);
    }
}
