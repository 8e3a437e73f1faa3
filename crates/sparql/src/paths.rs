//! Property-path evaluation
//!
//! Paths are evaluated against resolved endpoints (concrete term or
//! variable). Closures run a breadth-first traversal with a visited set
//! per traversal root, so every reachable node is emitted exactly once and
//! cycles terminate. With both endpoints unbound, the subjects of the
//! graph seed the traversal, which makes `p*` reflexive over all subjects.

use crate::algebra::{PropertyPath, TermPattern};
use crate::executor::{as_concrete, resolve};
use crate::{Binding, BindingSet, Executor, QueryError, QueryResult};
use rdf_model::{Node, VarName};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Resolved path endpoint
#[derive(Clone)]
pub(crate) enum PathEnd<'a> {
    /// Concrete term
    Term(Node<'a>),
    /// Still-unbound variable
    Var(VarName<'a>),
}

fn end_of<'a>(pattern: &TermPattern<'a>) -> QueryResult<PathEnd<'a>> {
    match pattern {
        TermPattern::Var(v) => Ok(PathEnd::Var(*v)),
        other => match as_concrete(other) {
            Some(node) => Ok(PathEnd::Term(node)),
            None => Err(QueryError::NotImplemented(
                "quoted-triple patterns with variables as path endpoints".into(),
            )),
        },
    }
}

impl<'a, 's> Executor<'a, 's> {
    /// Evaluate one path pattern under an existing solution
    pub(crate) fn eval_path_pattern(
        &self,
        subject: &TermPattern<'a>,
        path: &PropertyPath<'a>,
        object: &TermPattern<'a>,
        binding: &Binding<'a>,
        out: &mut BindingSet<'a>,
    ) -> QueryResult<()> {
        let s = end_of(&resolve(subject, binding))?;
        let o = end_of(&resolve(object, binding))?;
        for row in self.eval_path(&s, path, &o)? {
            if let Some(merged) = binding.merge(&row) {
                out.add(merged);
            }
        }
        Ok(())
    }

    /// Evaluate a path between two endpoints
    ///
    /// Returned rows bind only the endpoint variables.
    fn eval_path(
        &self,
        subject: &PathEnd<'a>,
        path: &PropertyPath<'a>,
        object: &PathEnd<'a>,
    ) -> QueryResult<Vec<Binding<'a>>> {
        self.control.check()?;
        match path {
            PropertyPath::Predicate(predicate) => {
                let sq = match subject {
                    PathEnd::Term(node) => Some(node.clone()),
                    PathEnd::Var(_) => None,
                };
                let oq = match object {
                    PathEnd::Term(node) => Some(node.clone()),
                    PathEnd::Var(_) => None,
                };
                let hits = self.store.match_pattern(
                    sq.as_ref(),
                    Some(predicate),
                    oq.as_ref(),
                );
                let mut rows = Vec::with_capacity(hits.len());
                for triple in hits {
                    self.control.check()?;
                    let mut row = Binding::new();
                    let mut ok = true;
                    if let PathEnd::Var(v) = subject {
                        ok &= row.bind(*v, triple.subject.clone());
                    }
                    if let PathEnd::Var(v) = object {
                        ok &= row.bind(*v, triple.object.clone());
                    }
                    if ok {
                        rows.push(row);
                    }
                }
                Ok(rows)
            }

            PropertyPath::Inverse(inner) => self.eval_path(object, inner, subject),

            PropertyPath::Sequence(first, second) => {
                let mid = VarName::new("__pathmid");
                let mut rows = Vec::new();
                for left in self.eval_path(subject, first, &PathEnd::Var(mid))? {
                    self.control.check()?;
                    let Some(mid_val) = left.get(&mid).cloned() else {
                        continue;
                    };
                    let base = match subject {
                        PathEnd::Var(v) => left.project(&[*v]),
                        PathEnd::Term(_) => Binding::new(),
                    };
                    for right in self.eval_path(&PathEnd::Term(mid_val), second, object)? {
                        if let Some(merged) = base.merge(&right) {
                            rows.push(merged);
                        }
                    }
                }
                Ok(rows)
            }

            PropertyPath::Alternative(left, right) => {
                let mut rows = self.eval_path(subject, left, object)?;
                rows.extend(self.eval_path(subject, right, object)?);
                Ok(rows)
            }

            PropertyPath::ZeroOrMore(inner) => self.eval_closure(subject, inner, object, true),
            PropertyPath::OneOrMore(inner) => self.eval_closure(subject, inner, object, false),

            PropertyPath::ZeroOrOne(inner) => {
                let mut rows = self.identity_rows(subject, object)?;
                rows.extend(self.eval_path(subject, inner, object)?);
                // A one-step self-loop duplicates the identity row
                let mut seen = FxHashSet::default();
                rows.retain(|row| seen.insert(row.canonical_key()));
                Ok(rows)
            }

            PropertyPath::NegatedPropertySet(excluded) => {
                let sq = match subject {
                    PathEnd::Term(node) => Some(node.clone()),
                    PathEnd::Var(_) => None,
                };
                let oq = match object {
                    PathEnd::Term(node) => Some(node.clone()),
                    PathEnd::Var(_) => None,
                };
                let hits = self.store.match_pattern(sq.as_ref(), None, oq.as_ref());
                let mut rows = Vec::new();
                for triple in hits {
                    self.control.check()?;
                    if excluded.contains(&triple.predicate) {
                        continue;
                    }
                    let mut row = Binding::new();
                    let mut ok = true;
                    if let PathEnd::Var(v) = subject {
                        ok &= row.bind(*v, triple.subject.clone());
                    }
                    if let PathEnd::Var(v) = object {
                        ok &= row.bind(*v, triple.object.clone());
                    }
                    if ok {
                        rows.push(row);
                    }
                }
                Ok(rows)
            }
        }
    }

    /// Transitive closure; `include_zero` adds the zero-length path
    fn eval_closure(
        &self,
        subject: &PathEnd<'a>,
        inner: &PropertyPath<'a>,
        object: &PathEnd<'a>,
        include_zero: bool,
    ) -> QueryResult<Vec<Binding<'a>>> {
        match (subject, object) {
            (PathEnd::Term(start), PathEnd::Term(goal)) => {
                let reachable = self.reachable_from(start, inner, include_zero)?;
                if reachable.iter().any(|n| n == goal) {
                    Ok(vec![Binding::new()])
                } else {
                    Ok(Vec::new())
                }
            }
            (PathEnd::Term(start), PathEnd::Var(ov)) => {
                let reachable = self.reachable_from(start, inner, include_zero)?;
                Ok(reachable
                    .into_iter()
                    .map(|node| Binding::from_pairs([(*ov, node)]))
                    .collect())
            }
            (PathEnd::Var(sv), PathEnd::Term(goal)) => {
                let inverse = PropertyPath::Inverse(Box::new(inner.clone()));
                let reachable = self.reachable_from(goal, &inverse, include_zero)?;
                Ok(reachable
                    .into_iter()
                    .map(|node| Binding::from_pairs([(*sv, node)]))
                    .collect())
            }
            (PathEnd::Var(sv), PathEnd::Var(ov)) if sv == ov => {
                let mut rows = Vec::new();
                for seed in self.store.subjects() {
                    self.control.check()?;
                    let keep = if include_zero {
                        true
                    } else {
                        self.reachable_from(&seed, inner, false)?
                            .iter()
                            .any(|n| n == &seed)
                    };
                    if keep {
                        rows.push(Binding::from_pairs([(*sv, seed)]));
                    }
                }
                Ok(rows)
            }
            (PathEnd::Var(sv), PathEnd::Var(ov)) => {
                let mut rows = Vec::new();
                for seed in self.store.subjects() {
                    self.control.check()?;
                    for node in self.reachable_from(&seed, inner, include_zero)? {
                        rows.push(Binding::from_pairs([(*sv, seed.clone()), (*ov, node)]));
                    }
                }
                Ok(rows)
            }
        }
    }

    /// Breadth-first reachability from one root
    ///
    /// The visited set is rooted at the query point; each node appears at
    /// most once in the result, and the root itself is included either for
    /// the zero-length path or when a cycle leads back to it.
    fn reachable_from(
        &self,
        start: &Node<'a>,
        step: &PropertyPath<'a>,
        include_zero: bool,
    ) -> QueryResult<Vec<Node<'a>>> {
        let mut visited: FxHashSet<Node<'a>> = FxHashSet::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        let mut start_reached = false;

        visited.insert(start.clone());
        queue.push_back(start.clone());

        while let Some(current) = queue.pop_front() {
            self.control.check()?;
            for next in self.successors(&current, step)? {
                if &next == start {
                    start_reached = true;
                }
                if visited.insert(next.clone()) {
                    order.push(next.clone());
                    queue.push_back(next);
                }
            }
        }

        if include_zero || start_reached {
            order.insert(0, start.clone());
        }
        Ok(order)
    }

    /// One-step successors of a node under a path
    fn successors(&self, node: &Node<'a>, step: &PropertyPath<'a>) -> QueryResult<Vec<Node<'a>>> {
        let target = VarName::new("__pathstep");
        let rows = self.eval_path(&PathEnd::Term(node.clone()), step, &PathEnd::Var(target))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get(&target).cloned())
            .collect())
    }

    /// Zero-length path rows (`p?` and closure seeding)
    fn identity_rows(
        &self,
        subject: &PathEnd<'a>,
        object: &PathEnd<'a>,
    ) -> QueryResult<Vec<Binding<'a>>> {
        Ok(match (subject, object) {
            (PathEnd::Term(a), PathEnd::Term(b)) => {
                if a == b {
                    vec![Binding::new()]
                } else {
                    Vec::new()
                }
            }
            (PathEnd::Term(a), PathEnd::Var(v)) | (PathEnd::Var(v), PathEnd::Term(a)) => {
                vec![Binding::from_pairs([(*v, a.clone())])]
            }
            (PathEnd::Var(v1), PathEnd::Var(v2)) if v1 == v2 => self
                .store
                .subjects()
                .into_iter()
                .map(|s| Binding::from_pairs([(*v1, s)]))
                .collect(),
            (PathEnd::Var(v1), PathEnd::Var(v2)) => self
                .store
                .subjects()
                .into_iter()
                .map(|s| Binding::from_pairs([(*v1, s.clone()), (*v2, s)]))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Algebra, TriplePattern};
    use crate::algebra::PredicatePattern;
    use graph_store::TripleStore;
    use rdf_model::Triple;

    fn hierarchy_store() -> TripleStore<'static> {
        // task1 -> proj1 -> area1
        let mut store = TripleStore::new();
        let dict = store.dictionary().clone();
        for (child, parent) in [("task1", "proj1"), ("proj1", "area1")] {
            store.add(
                Triple::try_new(
                    Node::iri(dict.intern(&format!("http://example.org/{child}"))),
                    Node::iri(dict.intern("http://example.org/parent")),
                    Node::iri(dict.intern(&format!("http://example.org/{parent}"))),
                )
                .unwrap(),
            );
        }
        store
    }

    fn parent_path(store: &TripleStore<'static>) -> PropertyPath<'static> {
        PropertyPath::Predicate(Node::iri(
            store.dictionary().intern("http://example.org/parent"),
        ))
    }

    fn path_bgp(
        subject: TermPattern<'static>,
        path: PropertyPath<'static>,
        object: TermPattern<'static>,
    ) -> Algebra<'static> {
        Algebra::Bgp(vec![TriplePattern {
            subject,
            predicate: PredicatePattern::Path(path),
            object,
        }])
    }

    #[test]
    fn one_or_more_reaches_ancestors() {
        let store = hierarchy_store();
        let executor = Executor::new(&store);
        let dict = store.dictionary().clone();

        let algebra = path_bgp(
            TermPattern::Node(Node::iri(dict.intern("http://example.org/task1"))),
            PropertyPath::OneOrMore(Box::new(parent_path(&store))),
            TermPattern::Var(VarName::new("a")),
        );

        let rows = executor.execute(&algebra).unwrap();
        let mut ancestors: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get(&VarName::new("a")).map(|n| n.to_string()))
            .collect();
        ancestors.sort();
        assert_eq!(
            ancestors,
            vec![
                "<http://example.org/area1>".to_string(),
                "<http://example.org/proj1>".to_string(),
            ]
        );
    }

    #[test]
    fn zero_or_more_includes_start() {
        let store = hierarchy_store();
        let executor = Executor::new(&store);
        let dict = store.dictionary().clone();

        let algebra = path_bgp(
            TermPattern::Node(Node::iri(dict.intern("http://example.org/task1"))),
            PropertyPath::ZeroOrMore(Box::new(parent_path(&store))),
            TermPattern::Var(VarName::new("a")),
        );

        let rows = executor.execute(&algebra).unwrap();
        assert_eq!(rows.len(), 3); // task1 itself, proj1, area1
    }

    #[test]
    fn zero_or_more_with_same_var_covers_all_subjects() {
        let store = hierarchy_store();
        let executor = Executor::new(&store);

        let algebra = path_bgp(
            TermPattern::Var(VarName::new("s")),
            PropertyPath::ZeroOrMore(Box::new(parent_path(&store))),
            TermPattern::Var(VarName::new("s")),
        );

        let rows = executor.execute(&algebra).unwrap();
        // every subject appears as a reflexive closure seed
        assert_eq!(rows.len(), store.subjects().len());
    }

    #[test]
    fn sequence_and_inverse() {
        let store = hierarchy_store();
        let executor = Executor::new(&store);
        let dict = store.dictionary().clone();

        // parent/parent from task1 lands on area1
        let algebra = path_bgp(
            TermPattern::Node(Node::iri(dict.intern("http://example.org/task1"))),
            PropertyPath::Sequence(
                Box::new(parent_path(&store)),
                Box::new(parent_path(&store)),
            ),
            TermPattern::Var(VarName::new("a")),
        );
        let rows = executor.execute(&algebra).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows.rows()[0].get(&VarName::new("a")).unwrap().to_string(),
            "<http://example.org/area1>"
        );

        // ^parent from proj1 yields task1
        let algebra = path_bgp(
            TermPattern::Node(Node::iri(dict.intern("http://example.org/proj1"))),
            PropertyPath::Inverse(Box::new(parent_path(&store))),
            TermPattern::Var(VarName::new("c")),
        );
        let rows = executor.execute(&algebra).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows.rows()[0].get(&VarName::new("c")).unwrap().to_string(),
            "<http://example.org/task1>"
        );
    }

    #[test]
    fn cycle_terminates_and_emits_once() {
        let mut store = TripleStore::new();
        let dict = store.dictionary().clone();
        for (a, b) in [("x", "y"), ("y", "x")] {
            store.add(
                Triple::try_new(
                    Node::iri(dict.intern(&format!("http://example.org/{a}"))),
                    Node::iri(dict.intern("http://example.org/next")),
                    Node::iri(dict.intern(&format!("http://example.org/{b}"))),
                )
                .unwrap(),
            );
        }

        let executor = Executor::new(&store);
        let path = PropertyPath::OneOrMore(Box::new(PropertyPath::Predicate(Node::iri(
            dict.intern("http://example.org/next"),
        ))));
        let algebra = path_bgp(
            TermPattern::Node(Node::iri(dict.intern("http://example.org/x"))),
            path,
            TermPattern::Var(VarName::new("n")),
        );

        let rows = executor.execute(&algebra).unwrap();
        // x reaches y and itself (via the cycle), each exactly once
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn negated_property_set() {
        let mut store = TripleStore::new();
        let dict = store.dictionary().clone();
        store.add(
            Triple::try_new(
                Node::iri(dict.intern("http://s")),
                Node::iri(dict.intern("http://keep")),
                Node::iri(dict.intern("http://o1")),
            )
            .unwrap(),
        );
        store.add(
            Triple::try_new(
                Node::iri(dict.intern("http://s")),
                Node::iri(dict.intern("http://skip")),
                Node::iri(dict.intern("http://o2")),
            )
            .unwrap(),
        );

        let executor = Executor::new(&store);
        let algebra = path_bgp(
            TermPattern::Node(Node::iri(dict.intern("http://s"))),
            PropertyPath::NegatedPropertySet(vec![Node::iri(dict.intern("http://skip"))]),
            TermPattern::Var(VarName::new("o")),
        );
        let rows = executor.execute(&algebra).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows.rows()[0].get(&VarName::new("o")).unwrap().to_string(),
            "<http://o1>"
        );
    }
}
