//! Query executor
//!
//! Walks the algebra bottom-up. Every operator is evaluated under a seed
//! set of solutions: the public entry point seeds with the unit mapping,
//! while LATERAL and EXISTS seed with the outer row, which is exactly the
//! substitution semantics both need. BGP evaluation is left-deep in source
//! order: each pattern is instantiated under every accumulated solution
//! before matching, and incompatible merges are dropped.

use crate::algebra::*;
use crate::{AggregateRegistry, Binding, BindingSet, ExecControl, QueryError, QueryResult};
use graph_store::TripleStore;
use rdf_model::{Dictionary, Node, Triple, VarName};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Custom scalar function: arguments plus the current row, optional result
pub type CustomFunction<'a> =
    Box<dyn Fn(&[Node<'a>], &Binding<'a>) -> Option<Node<'a>> + Send + Sync>;

/// Registry of extension functions keyed by IRI
///
/// One registry per engine; built-ins are compiled in, user registrations
/// live for the engine's lifetime.
#[derive(Default)]
pub struct FunctionRegistry<'a> {
    functions: FxHashMap<String, CustomFunction<'a>>,
}

impl<'a> FunctionRegistry<'a> {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under its IRI (replacing any previous one)
    pub fn register<F>(&mut self, iri: &str, function: F)
    where
        F: Fn(&[Node<'a>], &Binding<'a>) -> Option<Node<'a>> + Send + Sync + 'static,
    {
        self.functions.insert(iri.to_string(), Box::new(function));
    }

    /// Remove a registration
    pub fn unregister(&mut self, iri: &str) -> bool {
        self.functions.remove(iri).is_some()
    }

    /// Whether an IRI is registered
    pub fn contains(&self, iri: &str) -> bool {
        self.functions.contains_key(iri)
    }

    /// Invoke a registered function
    pub fn call(
        &self,
        iri: &str,
        args: &[Node<'a>],
        binding: &Binding<'a>,
    ) -> Option<Option<Node<'a>>> {
        self.functions.get(iri).map(|f| f(args, binding))
    }
}

/// Read-only query executor over a triple store
pub struct Executor<'a, 's> {
    pub(crate) store: &'s TripleStore<'a>,
    pub(crate) dict: &'s Dictionary,
    pub(crate) graph: Option<Node<'a>>,
    pub(crate) functions: Option<&'s FunctionRegistry<'a>>,
    pub(crate) aggregates: Option<&'s AggregateRegistry<'a>>,
    pub(crate) control: ExecControl,
}

impl<'a, 's> Executor<'a, 's> {
    /// Create an executor for the default graph
    pub fn new(store: &'s TripleStore<'a>) -> Self {
        Self {
            store,
            dict: store.dictionary(),
            graph: None,
            functions: None,
            aggregates: None,
            control: ExecControl::unbounded(),
        }
    }

    /// Attach an extension function registry
    pub fn with_functions(mut self, registry: &'s FunctionRegistry<'a>) -> Self {
        self.functions = Some(registry);
        self
    }

    /// Attach an aggregate registry
    pub fn with_aggregates(mut self, registry: &'s AggregateRegistry<'a>) -> Self {
        self.aggregates = Some(registry);
        self
    }

    /// Attach execution control (cancellation / deadline)
    pub fn with_control(mut self, control: ExecControl) -> Self {
        self.control = control;
        self
    }

    /// Executor scoped to a named graph
    fn in_graph(&self, graph: Node<'a>) -> Executor<'a, 's> {
        Executor {
            store: self.store,
            dict: self.dict,
            graph: Some(graph),
            functions: self.functions,
            aggregates: self.aggregates,
            control: self.control.clone(),
        }
    }

    /// Evaluate an algebra tree to a solution set
    pub fn execute(&self, algebra: &Algebra<'a>) -> QueryResult<BindingSet<'a>> {
        debug!(target: "vaultkg::sparql", "executing algebra");
        self.eval(algebra, BindingSet::unit())
    }

    /// Evaluate to a lazy solution stream
    ///
    /// Every `next` on the stream is a yield point: the caller observes
    /// cancellation or an elapsed deadline between rows.
    pub fn execute_streaming(
        &self,
        algebra: &Algebra<'a>,
    ) -> QueryResult<crate::Solutions<'a>> {
        Ok(self.execute(algebra)?.into_solutions(self.control.clone()))
    }

    /// Evaluate under a seed solution set
    pub(crate) fn eval(
        &self,
        algebra: &Algebra<'a>,
        seeds: BindingSet<'a>,
    ) -> QueryResult<BindingSet<'a>> {
        self.control.check()?;
        match algebra {
            Algebra::Bgp(patterns) => self.eval_bgp(patterns, seeds),

            Algebra::Join { left, right } => {
                let left = self.eval(left, seeds.clone())?;
                let right = self.eval(right, seeds)?;
                Ok(left.join(&right))
            }

            Algebra::LeftJoin { left, right, expr } => {
                let left = self.eval(left, seeds.clone())?;
                let right = self.eval(right, seeds)?;
                Ok(left.left_join(&right, |row| match expr {
                    Some(expr) => self.effective_boolean(expr, row),
                    None => true,
                }))
            }

            Algebra::Filter { expr, input } => {
                let mut rows = self.eval(input, seeds)?;
                rows.filter(|row| self.effective_boolean(expr, row));
                Ok(rows)
            }

            Algebra::Union { left, right } => {
                let mut rows = self.eval(left, seeds.clone())?;
                rows.union(self.eval(right, seeds)?);
                Ok(rows)
            }

            Algebra::Minus { left, right } => {
                let left = self.eval(left, seeds.clone())?;
                let right = self.eval(right, seeds)?;
                Ok(left.minus(&right))
            }

            Algebra::Graph { graph, input } => self.eval_graph(graph, input, seeds),

            Algebra::Extend { var, expr, input } => {
                let mut rows = self.eval(input, seeds)?;
                for row in rows.rows_mut() {
                    // Evaluation errors leave the variable unbound
                    if let Ok(Some(value)) = self.eval_expression(expr, row) {
                        row.bind(*var, value);
                    }
                }
                Ok(rows)
            }

            Algebra::Project { vars, input } => {
                let mut rows = self.eval(input, seeds)?;
                rows.project(vars);
                Ok(rows)
            }

            Algebra::Distinct { input } | Algebra::Reduced { input } => {
                let mut rows = self.eval(input, seeds)?;
                rows.distinct();
                Ok(rows)
            }

            Algebra::OrderBy { conditions, input } => {
                let mut rows = self.eval(input, seeds)?;
                rows.sort_by(|a, b| {
                    for condition in conditions {
                        let av = self.eval_expression(&condition.expr, a).ok().flatten();
                        let bv = self.eval_expression(&condition.expr, b).ok().flatten();
                        let ordering = match (av, bv) {
                            (Some(av), Some(bv)) => self.compare_terms(&av, &bv),
                            (Some(_), None) => std::cmp::Ordering::Greater,
                            (None, Some(_)) => std::cmp::Ordering::Less,
                            (None, None) => std::cmp::Ordering::Equal,
                        };
                        if ordering != std::cmp::Ordering::Equal {
                            return if condition.ascending {
                                ordering
                            } else {
                                ordering.reverse()
                            };
                        }
                    }
                    std::cmp::Ordering::Equal
                });
                Ok(rows)
            }

            Algebra::Slice {
                start,
                length,
                input,
            } => {
                let mut rows = self.eval(input, seeds)?;
                if let Some(offset) = start {
                    rows.offset(*offset);
                }
                if let Some(limit) = length {
                    rows.limit(*limit);
                }
                Ok(rows)
            }

            Algebra::Group {
                vars,
                aggregates,
                input,
            } => {
                let rows = self.eval(input, seeds)?;
                self.eval_group(vars, aggregates, rows)
            }

            Algebra::Table { vars, rows } => {
                let mut table = BindingSet::new();
                for row in rows {
                    let mut binding = Binding::new();
                    let mut ok = true;
                    for (i, var) in vars.iter().enumerate() {
                        if let Some(Some(node)) = row.get(i) {
                            ok &= binding.bind(*var, node.clone());
                        }
                    }
                    if ok {
                        table.add(binding);
                    }
                }
                Ok(seeds.join(&table))
            }

            Algebra::Lateral { left, right } => {
                let lefts = self.eval(left, seeds)?;
                let mut out = BindingSet::new();
                for row in lefts.iter() {
                    self.control.check()?;
                    let rights =
                        self.eval(right, BindingSet::from_rows(vec![row.clone()]))?;
                    for inner in rights.into_iter() {
                        if let Some(merged) = row.merge(&inner) {
                            out.add(merged);
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    // ---- BGP ------------------------------------------------------------

    fn eval_bgp(
        &self,
        patterns: &[TriplePattern<'a>],
        seeds: BindingSet<'a>,
    ) -> QueryResult<BindingSet<'a>> {
        let mut solutions = seeds;
        for pattern in patterns {
            self.control.check()?;
            check_positions(pattern)?;

            let mut next = BindingSet::new();
            match &pattern.predicate {
                PredicatePattern::Path(path) => {
                    if self.graph.is_some() {
                        return Err(QueryError::NamedGraphPathUnsupported);
                    }
                    for binding in solutions.iter() {
                        self.control.check()?;
                        self.eval_path_pattern(
                            &pattern.subject,
                            path,
                            &pattern.object,
                            binding,
                            &mut next,
                        )?;
                    }
                }
                PredicatePattern::Term(predicate) => {
                    for binding in solutions.iter() {
                        self.control.check()?;
                        self.match_instantiated(
                            &pattern.subject,
                            predicate,
                            &pattern.object,
                            binding,
                            &mut next,
                        )?;
                    }
                }
            }
            solutions = next;
        }
        Ok(solutions)
    }

    /// Instantiate a pattern under a binding, match the store, unify hits
    fn match_instantiated(
        &self,
        subject: &TermPattern<'a>,
        predicate: &TermPattern<'a>,
        object: &TermPattern<'a>,
        binding: &Binding<'a>,
        out: &mut BindingSet<'a>,
    ) -> QueryResult<()> {
        let s = resolve(subject, binding);
        let p = resolve(predicate, binding);
        let o = resolve(object, binding);

        let sq = as_concrete(&s);
        let pq = as_concrete(&p);
        let oq = as_concrete(&o);

        let hits = match &self.graph {
            Some(graph) => self
                .store
                .match_in_graph(sq.as_ref(), pq.as_ref(), oq.as_ref(), graph),
            None => self.store.match_pattern(sq.as_ref(), pq.as_ref(), oq.as_ref()),
        };

        for triple in hits {
            self.control.check()?;
            let mut row = binding.clone();
            if unify(&s, &triple.subject, &mut row)
                && unify(&p, &triple.predicate, &mut row)
                && unify(&o, &triple.object, &mut row)
            {
                out.add(row);
            }
        }
        Ok(())
    }

    fn eval_graph(
        &self,
        graph: &VarOrNode<'a>,
        input: &Algebra<'a>,
        seeds: BindingSet<'a>,
    ) -> QueryResult<BindingSet<'a>> {
        match graph {
            VarOrNode::Node(node) => self.in_graph(node.clone()).eval(input, seeds),
            VarOrNode::Var(var) => {
                let mut out = BindingSet::new();
                for name in self.store.graphs() {
                    self.control.check()?;
                    let rows = self.in_graph(name.clone()).eval(input, seeds.clone())?;
                    for row in rows.into_iter() {
                        let mut row = row;
                        if row.bind(*var, name.clone()) {
                            out.add(row);
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

/// Substitute bound variables in a pattern element
pub(crate) fn resolve<'a>(
    pattern: &TermPattern<'a>,
    binding: &Binding<'a>,
) -> TermPattern<'a> {
    match pattern {
        TermPattern::Var(v) => match binding.get(v) {
            Some(node) => TermPattern::Node(node.clone()),
            None => pattern.clone(),
        },
        TermPattern::Node(_) => pattern.clone(),
        TermPattern::Quoted(q) => TermPattern::Quoted(Box::new(QuotedPattern {
            subject: resolve(&q.subject, binding),
            predicate: resolve(&q.predicate, binding),
            object: resolve(&q.object, binding),
        })),
    }
}

/// Concrete store query key for an element, None when variables remain
///
/// A fully concrete quoted pattern becomes a quoted-triple term, which the
/// store indexes like any other node; quoted patterns with embedded
/// variables stay wildcards and are unified per candidate.
pub(crate) fn as_concrete<'a>(pattern: &TermPattern<'a>) -> Option<Node<'a>> {
    match pattern {
        TermPattern::Var(_) => None,
        TermPattern::Node(node) => Some(node.clone()),
        TermPattern::Quoted(q) => {
            let subject = as_concrete(&q.subject)?;
            let predicate = as_concrete(&q.predicate)?;
            let object = as_concrete(&q.object)?;
            Some(Node::quoted(Triple::new_unchecked(subject, predicate, object)))
        }
    }
}

/// Unify a pattern element with a term, extending the row
pub(crate) fn unify<'a>(
    pattern: &TermPattern<'a>,
    node: &Node<'a>,
    row: &mut Binding<'a>,
) -> bool {
    match pattern {
        TermPattern::Var(v) => row.bind(*v, node.clone()),
        TermPattern::Node(expected) => expected == node,
        TermPattern::Quoted(q) => match node.as_quoted() {
            Some(triple) => {
                unify(&q.subject, &triple.subject, row)
                    && unify(&q.predicate, &triple.predicate, row)
                    && unify(&q.object, &triple.object, row)
            }
            None => false,
        },
    }
}

/// Static position checks on a pattern
fn check_positions(pattern: &TriplePattern<'_>) -> QueryResult<()> {
    if let TermPattern::Node(node) = &pattern.subject {
        if node.is_literal() {
            return Err(QueryError::BadPosition(
                "literal in subject position of a pattern".into(),
            ));
        }
    }
    if let PredicatePattern::Term(term) = &pattern.predicate {
        match term {
            TermPattern::Var(_) => {}
            TermPattern::Node(node) if node.is_iri() => {}
            _ => {
                return Err(QueryError::BadPosition(
                    "pattern predicate must be a variable or IRI".into(),
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdf_model::Vocabulary;

    fn store_with_tasks() -> TripleStore<'static> {
        let mut store = TripleStore::new();
        let dict = store.dictionary().clone();
        let rdf_type = dict.intern(Vocabulary::RDF_TYPE);
        for (task, label) in [("task1", "Task 1"), ("task2", "Task 2")] {
            store.add(
                Triple::try_new(
                    Node::iri(dict.intern(&format!("http://example.org/{task}"))),
                    Node::iri(rdf_type),
                    Node::iri(dict.intern("http://example.org/Task")),
                )
                .unwrap(),
            );
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

    fn var(name: &'static str) -> TermPattern<'static> {
        TermPattern::Var(VarName::new(name))
    }

    fn iri<'a>(store: &TripleStore<'a>, s: &str) -> TermPattern<'a> {
        TermPattern::Node(Node::iri(store.dictionary().intern(s)))
    }

    #[test]
    fn bgp_join_binds_both_patterns() {
        let store = store_with_tasks();
        let executor = Executor::new(&store);

        let bgp = Algebra::Bgp(vec![
            TriplePattern::new(var("t"), iri(&store, Vocabulary::RDF_TYPE), iri(&store, "http://example.org/Task")),
            TriplePattern::new(var("t"), iri(&store, "http://example.org/label"), var("l")),
        ]);

        let rows = executor.execute(&bgp).unwrap();
        assert_eq!(rows.len(), 2);
        for row in rows.iter() {
            assert!(row.contains(&VarName::new("t")));
            assert!(row.contains(&VarName::new("l")));
        }
    }

    #[test]
    fn bgp_order_does_not_change_result_set() {
        let store = store_with_tasks();
        let executor = Executor::new(&store);

        let forward = Algebra::Bgp(vec![
            TriplePattern::new(var("t"), iri(&store, Vocabulary::RDF_TYPE), iri(&store, "http://example.org/Task")),
            TriplePattern::new(var("t"), iri(&store, "http://example.org/label"), var("l")),
        ]);
        let reversed = Algebra::Bgp(vec![
            TriplePattern::new(var("t"), iri(&store, "http://example.org/label"), var("l")),
            TriplePattern::new(var("t"), iri(&store, Vocabulary::RDF_TYPE), iri(&store, "http://example.org/Task")),
        ]);

        let mut a: Vec<String> = executor
            .execute(&forward)
            .unwrap()
            .iter()
            .map(Binding::canonical_key)
            .collect();
        let mut b: Vec<String> = executor
            .execute(&reversed)
            .unwrap()
            .iter()
            .map(Binding::canonical_key)
            .collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn quoted_pattern_unifies_embedded_variable() {
        let mut store = TripleStore::new();
        let dict = store.dictionary().clone();

        let inner = Triple::try_new(
            Node::iri(dict.intern("http://example.org/alice")),
            Node::iri(dict.intern("http://example.org/knows")),
            Node::iri(dict.intern("http://example.org/bob")),
        )
        .unwrap();
        store.add(
            Triple::try_new(
                Node::quoted(inner),
                Node::iri(dict.intern("http://example.org/source")),
                Node::iri(dict.intern("http://example.org/wikipedia")),
            )
            .unwrap(),
        );

        let executor = Executor::new(&store);
        let bgp = Algebra::Bgp(vec![TriplePattern::new(
            TermPattern::Quoted(Box::new(QuotedPattern {
                subject: var("who"),
                predicate: iri(&store, "http://example.org/knows"),
                object: iri(&store, "http://example.org/bob"),
            })),
            iri(&store, "http://example.org/source"),
            iri(&store, "http://example.org/wikipedia"),
        )]);

        let rows = executor.execute(&bgp).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows.rows()[0].get(&VarName::new("who")),
            Some(&Node::iri("http://example.org/alice"))
        );
    }

    #[test]
    fn literal_subject_pattern_is_rejected() {
        let store = store_with_tasks();
        let executor = Executor::new(&store);

        let bgp = Algebra::Bgp(vec![TriplePattern::new(
            TermPattern::Node(Node::literal_str("nope")),
            var("p"),
            var("o"),
        )]);
        assert!(matches!(
            executor.execute(&bgp),
            Err(QueryError::BadPosition(_))
        ));
    }

    #[test]
    fn graph_variable_enumerates_named_graphs() {
        let mut store = TripleStore::new();
        let dict = store.dictionary().clone();
        let g1 = Node::iri(dict.intern("http://g1"));
        let g2 = Node::iri(dict.intern("http://g2"));
        let t = Triple::try_new(
            Node::iri(dict.intern("http://s")),
            Node::iri(dict.intern("http://p")),
            Node::iri(dict.intern("http://o")),
        )
        .unwrap();
        store.add_to_graph(t.clone(), g1).unwrap();
        store.add_to_graph(t, g2).unwrap();

        let executor = Executor::new(&store);
        let algebra = Algebra::Graph {
            graph: VarOrNode::Var(VarName::new("g")),
            input: Box::new(Algebra::Bgp(vec![TriplePattern::new(
                var("s"),
                var("p"),
                var("o"),
            )])),
        };
        let rows = executor.execute(&algebra).unwrap();
        assert_eq!(rows.len(), 2);
        for row in rows.iter() {
            assert!(row.contains(&VarName::new("g")));
        }
    }

    #[test]
    fn path_in_graph_clause_is_reported() {
        let store = store_with_tasks();
        let executor = Executor::new(&store);

        let algebra = Algebra::Graph {
            graph: VarOrNode::Node(Node::iri(
                store.dictionary().intern("http://example.org/g"),
            )),
            input: Box::new(Algebra::Bgp(vec![TriplePattern {
                subject: var("s"),
                predicate: PredicatePattern::Path(PropertyPath::OneOrMore(Box::new(
                    PropertyPath::Predicate(Node::iri(
                        store.dictionary().intern("http://example.org/parent"),
                    )),
                ))),
                object: var("o"),
            }])),
        };
        assert!(matches!(
            executor.execute(&algebra),
            Err(QueryError::NamedGraphPathUnsupported)
        ));
    }

    #[test]
    fn minus_and_union() {
        let store = store_with_tasks();
        let executor = Executor::new(&store);

        let all = Algebra::Bgp(vec![TriplePattern::new(
            var("t"),
            iri(&store, Vocabulary::RDF_TYPE),
            iri(&store, "http://example.org/Task"),
        )]);
        let task1 = Algebra::Bgp(vec![TriplePattern::new(
            iri(&store, "http://example.org/task1"),
            iri(&store, "http://example.org/label"),
            var("l"),
        )]);

        let union = Algebra::Union {
            left: Box::new(all.clone()),
            right: Box::new(task1.clone()),
        };
        assert_eq!(executor.execute(&union).unwrap().len(), 3);

        let minus = Algebra::Minus {
            left: Box::new(all),
            right: Box::new(Algebra::Bgp(vec![TriplePattern::new(
                iri(&store, "http://example.org/task1"),
                iri(&store, Vocabulary::RDF_TYPE),
                var("c"),
            )])),
        };
        // MINUS pattern shares no variable with the left side, so nothing
        // is removed
        assert_eq!(executor.execute(&minus).unwrap().len(), 2);
    }
}
