//! SPARQL UPDATE execution
//!
//! Operations within a request run sequentially; each operation stages all
//! of its writes before touching the store, so a failure or cancellation
//! observes no partial operation, while earlier operations of the request
//! stay committed. A failing operation surfaces as `UpdateFailed` carrying
//! its index.

use crate::algebra::{
    Algebra, GraphTarget, QuadPattern, TermPattern, TriplePattern, Update, UpdateRequest,
    VarOrNode,
};
use crate::executor::{as_concrete, resolve};
use crate::{
    AggregateRegistry, Binding, ExecControl, Executor, FunctionRegistry, QueryError, QueryResult,
};
use graph_store::TripleStore;
use rdf_model::Quad;
use tracing::debug;

/// Per-operation outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStat {
    /// Triples actually added (duplicates are no-ops)
    pub inserted: usize,
    /// Triples actually removed
    pub deleted: usize,
}

/// Executor for update requests; requires exclusive store access
pub struct UpdateExecutor<'a, 's> {
    store: &'s mut TripleStore<'a>,
    functions: Option<&'s FunctionRegistry<'a>>,
    aggregates: Option<&'s AggregateRegistry<'a>>,
    control: ExecControl,
}

impl<'a, 's> UpdateExecutor<'a, 's> {
    /// Create an update executor over a mutable store
    pub fn new(store: &'s mut TripleStore<'a>) -> Self {
        Self {
            store,
            functions: None,
            aggregates: None,
            control: ExecControl::unbounded(),
        }
    }

    /// Attach an extension function registry for WHERE evaluation
    pub fn with_functions(mut self, registry: &'s FunctionRegistry<'a>) -> Self {
        self.functions = Some(registry);
        self
    }

    /// Attach an aggregate registry for WHERE evaluation
    pub fn with_aggregates(mut self, registry: &'s AggregateRegistry<'a>) -> Self {
        self.aggregates = Some(registry);
        self
    }

    /// Attach execution control
    pub fn with_control(mut self, control: ExecControl) -> Self {
        self.control = control;
        self
    }

    /// Execute a whole request, sequentially
    pub fn execute_request(
        &mut self,
        request: &UpdateRequest<'a>,
    ) -> QueryResult<Vec<UpdateStat>> {
        let mut stats = Vec::with_capacity(request.operations.len());
        for (index, operation) in request.operations.iter().enumerate() {
            match self.execute(operation) {
                Ok(stat) => stats.push(stat),
                Err(source) => {
                    return Err(QueryError::UpdateFailed {
                        index,
                        source: Box::new(source),
                    })
                }
            }
        }
        Ok(stats)
    }

    /// Execute a single operation
    pub fn execute(&mut self, operation: &Update<'a>) -> QueryResult<UpdateStat> {
        match operation {
            Update::InsertData { quads } => self.insert_data(quads),
            Update::DeleteData { quads } => self.delete_data(quads),
            Update::DeleteInsert {
                delete,
                insert,
                pattern,
            } => self.delete_insert(delete, insert, pattern),
            Update::DeleteWhere { quads } => self.delete_where(quads),
            Update::Clear { target, silent } => self.clear(target, *silent),
            Update::Drop { target, silent } => self.drop_target(target, *silent),
            Update::Create { .. } => {
                // Graphs exist implicitly once a triple lands in them
                Ok(UpdateStat::default())
            }
            Update::Load { silent, .. } => self.unimplemented("LOAD", *silent),
            Update::Copy { silent, .. } => self.unimplemented("COPY", *silent),
            Update::Move { silent, .. } => self.unimplemented("MOVE", *silent),
            Update::Add { silent, .. } => self.unimplemented("ADD", *silent),
        }
    }

    fn unimplemented(&self, name: &str, silent: bool) -> QueryResult<UpdateStat> {
        if silent {
            Ok(UpdateStat::default())
        } else {
            Err(QueryError::NotImplemented(format!("{name} operation")))
        }
    }

    fn insert_data(&mut self, quads: &[QuadPattern<'a>]) -> QueryResult<UpdateStat> {
        let staged = self.stage_quads(quads, &Binding::new(), true)?;
        self.control.check()?;

        let mut inserted = 0;
        for quad in staged {
            if self.store.add_quad(quad)? {
                inserted += 1;
            }
        }
        debug!(target: "vaultkg::sparql", inserted, "INSERT DATA applied");
        Ok(UpdateStat {
            inserted,
            deleted: 0,
        })
    }

    fn delete_data(&mut self, quads: &[QuadPattern<'a>]) -> QueryResult<UpdateStat> {
        let staged = self.stage_quads(quads, &Binding::new(), true)?;
        self.control.check()?;

        let mut deleted = 0;
        for quad in staged {
            if self.store.remove_quad(&quad)? {
                deleted += 1;
            }
        }
        debug!(target: "vaultkg::sparql", deleted, "DELETE DATA applied");
        Ok(UpdateStat {
            inserted: 0,
            deleted,
        })
    }

    fn delete_insert(
        &mut self,
        delete: &[QuadPattern<'a>],
        insert: &[QuadPattern<'a>],
        pattern: &Algebra<'a>,
    ) -> QueryResult<UpdateStat> {
        let bindings = self.evaluate_where(pattern)?;

        let mut to_delete = Vec::new();
        let mut to_insert = Vec::new();
        for binding in bindings.iter() {
            self.control.check()?;
            // Template quads with unbound variables are skipped silently
            for quad in delete {
                if let Ok(staged) = self.concretize(quad, binding) {
                    to_delete.push(staged);
                }
            }
            for quad in insert {
                if let Ok(staged) = self.concretize(quad, binding) {
                    to_insert.push(staged);
                }
            }
        }

        self.control.check()?;
        let mut stat = UpdateStat::default();
        for quad in to_delete {
            if self.store.remove_quad(&quad)? {
                stat.deleted += 1;
            }
        }
        for quad in to_insert {
            if self.store.add_quad(quad)? {
                stat.inserted += 1;
            }
        }
        debug!(
            target: "vaultkg::sparql",
            inserted = stat.inserted,
            deleted = stat.deleted,
            "DELETE/INSERT applied"
        );
        Ok(stat)
    }

    fn delete_where(&mut self, quads: &[QuadPattern<'a>]) -> QueryResult<UpdateStat> {
        let pattern = quads_to_algebra(quads);
        let bindings = self.evaluate_where(&pattern)?;

        let mut to_delete = Vec::new();
        for binding in bindings.iter() {
            self.control.check()?;
            for quad in quads {
                if let Ok(staged) = self.concretize(quad, binding) {
                    to_delete.push(staged);
                }
            }
        }

        self.control.check()?;
        let mut deleted = 0;
        for quad in to_delete {
            if self.store.remove_quad(&quad)? {
                deleted += 1;
            }
        }
        Ok(UpdateStat {
            inserted: 0,
            deleted,
        })
    }

    fn clear(&mut self, target: &GraphTarget<'a>, silent: bool) -> QueryResult<UpdateStat> {
        let mut deleted = 0;
        match target {
            GraphTarget::Default => {
                deleted = self.store.len();
                self.store.clear_default();
            }
            GraphTarget::Named(graph) => {
                deleted = self.store.graph_len(graph);
                if !self.store.clear_graph(graph) && !silent {
                    return Err(QueryError::UnknownGraph(graph.to_string()));
                }
            }
            GraphTarget::AllNamed => {
                for graph in self.store.graphs() {
                    deleted += self.store.graph_len(&graph);
                    self.store.clear_graph(&graph);
                }
            }
            GraphTarget::All => {
                deleted = self.store.total_len();
                self.store.clear();
            }
        }
        Ok(UpdateStat {
            inserted: 0,
            deleted,
        })
    }

    fn drop_target(&mut self, target: &GraphTarget<'a>, silent: bool) -> QueryResult<UpdateStat> {
        let mut deleted = 0;
        match target {
            GraphTarget::Default => {
                // Dropping the default graph empties it
                deleted = self.store.len();
                self.store.clear_default();
            }
            GraphTarget::Named(graph) => {
                deleted = self.store.graph_len(graph);
                if !self.store.drop_graph(graph) && !silent {
                    return Err(QueryError::UnknownGraph(graph.to_string()));
                }
            }
            GraphTarget::AllNamed => {
                for graph in self.store.graphs() {
                    deleted += self.store.graph_len(&graph);
                }
                self.store.drop_all_named();
            }
            GraphTarget::All => {
                deleted = self.store.total_len();
                self.store.clear();
            }
        }
        Ok(UpdateStat {
            inserted: 0,
            deleted,
        })
    }

    /// Evaluate a WHERE pattern with a read executor over the same store
    fn evaluate_where(&self, pattern: &Algebra<'a>) -> QueryResult<crate::BindingSet<'a>> {
        let mut executor =
            Executor::new(&*self.store).with_control(self.control.clone());
        if let Some(functions) = self.functions {
            executor = executor.with_functions(functions);
        }
        if let Some(aggregates) = self.aggregates {
            executor = executor.with_aggregates(aggregates);
        }
        executor.execute(pattern)
    }

    /// Stage a list of quad patterns under one binding
    fn stage_quads(
        &self,
        quads: &[QuadPattern<'a>],
        binding: &Binding<'a>,
        reject_vars: bool,
    ) -> QueryResult<Vec<Quad<'a>>> {
        let mut staged = Vec::with_capacity(quads.len());
        for quad in quads {
            if reject_vars {
                if let Some(var) = quad.first_var() {
                    return Err(QueryError::VariableInData(var.name().to_string()));
                }
            }
            staged.push(self.concretize(quad, binding)?);
        }
        Ok(staged)
    }

    /// Resolve a quad pattern to a concrete quad under a binding
    fn concretize(&self, quad: &QuadPattern<'a>, binding: &Binding<'a>) -> QueryResult<Quad<'a>> {
        let subject = concretize_term(&quad.subject, binding)?;
        let predicate = concretize_term(&quad.predicate, binding)?;
        let object = concretize_term(&quad.object, binding)?;
        let graph = match &quad.graph {
            None => None,
            Some(VarOrNode::Node(node)) => Some(node.clone()),
            Some(VarOrNode::Var(var)) => Some(
                binding
                    .get(var)
                    .cloned()
                    .ok_or_else(|| QueryError::UnboundVariable(var.name().to_string()))?,
            ),
        };
        Ok(Quad::try_new(subject, predicate, object, graph)?)
    }
}

fn concretize_term<'a>(
    pattern: &TermPattern<'a>,
    binding: &Binding<'a>,
) -> QueryResult<rdf_model::Node<'a>> {
    let resolved = resolve(pattern, binding);
    as_concrete(&resolved).ok_or_else(|| {
        let mut vars = Vec::new();
        resolved.collect_vars(&mut vars);
        QueryError::UnboundVariable(
            vars.first()
                .map(|v| v.name().to_string())
                .unwrap_or_default(),
        )
    })
}

/// DELETE WHERE patterns double as the match pattern
fn quads_to_algebra<'a>(quads: &[QuadPattern<'a>]) -> Algebra<'a> {
    let mut default_patterns = Vec::new();
    let mut graph_parts: Vec<Algebra<'a>> = Vec::new();

    for quad in quads {
        let triple = TriplePattern::new(
            quad.subject.clone(),
            quad.predicate.clone(),
            quad.object.clone(),
        );
        match &quad.graph {
            None => default_patterns.push(triple),
            Some(graph) => graph_parts.push(Algebra::Graph {
                graph: graph.clone(),
                input: Box::new(Algebra::Bgp(vec![triple])),
            }),
        }
    }

    let mut algebra = Algebra::Bgp(default_patterns);
    for part in graph_parts {
        algebra = Algebra::Join {
            left: Box::new(algebra),
            right: Box::new(part),
        };
    }
    algebra
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SparqlParser;
    use rdf_model::{Node, Triple};

    fn run<'a>(store: &mut TripleStore<'a>, text: &str) -> QueryResult<Vec<UpdateStat>> {
        let mut parser = SparqlParser::new(store.dictionary().clone());
        let request = parser.parse_update(text)?;
        UpdateExecutor::new(store).execute_request(&request)
    }

    #[test]
    fn insert_then_delete_counts() {
        let mut store = TripleStore::new();
        let stats = run(
            &mut store,
            "PREFIX ex: <http://example.org/> INSERT DATA { ex:a ex:p ex:b . ex:a ex:p ex:c }",
        )
        .unwrap();
        assert_eq!(stats[0].inserted, 2);
        assert_eq!(store.len(), 2);

        // Re-inserting is a no-op
        let stats = run(
            &mut store,
            "PREFIX ex: <http://example.org/> INSERT DATA { ex:a ex:p ex:b }",
        )
        .unwrap();
        assert_eq!(stats[0].inserted, 0);

        let stats = run(
            &mut store,
            "PREFIX ex: <http://example.org/> DELETE DATA { ex:a ex:p ex:b . ex:missing ex:p ex:b }",
        )
        .unwrap();
        assert_eq!(stats[0].deleted, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn insert_into_named_graph() {
        let mut store = TripleStore::new();
        run(
            &mut store,
            "INSERT DATA { GRAPH <http://g> { <http://s> <http://p> <http://o> } }",
        )
        .unwrap();
        assert_eq!(store.len(), 0);
        let graph = Node::iri(store.dictionary().intern("http://g"));
        assert_eq!(store.graph_len(&graph), 1);
    }

    #[test]
    fn delete_insert_where_rewrites() {
        let mut store = TripleStore::new();
        run(
            &mut store,
            "PREFIX ex: <http://example.org/> \
             INSERT DATA { ex:task1 ex:status ex:Open . ex:task2 ex:status ex:Open }",
        )
        .unwrap();

        let stats = run(
            &mut store,
            "PREFIX ex: <http://example.org/> \
             DELETE { ?t ex:status ex:Open } INSERT { ?t ex:status ex:Done } \
             WHERE { ?t ex:status ex:Open }",
        )
        .unwrap();
        assert_eq!(stats[0].deleted, 2);
        assert_eq!(stats[0].inserted, 2);

        let dict = store.dictionary().clone();
        let done = Node::iri(dict.intern("http://example.org/Done"));
        assert_eq!(store.match_pattern(None, None, Some(&done)).len(), 2);
    }

    #[test]
    fn delete_where_shorthand() {
        let mut store = TripleStore::new();
        run(
            &mut store,
            "PREFIX ex: <http://example.org/> \
             INSERT DATA { ex:a ex:p ex:b . ex:c ex:p ex:d . ex:a ex:q ex:b }",
        )
        .unwrap();

        let stats = run(
            &mut store,
            "PREFIX ex: <http://example.org/> DELETE WHERE { ?s ex:p ?o }",
        )
        .unwrap();
        assert_eq!(stats[0].deleted, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_operation_reports_index_and_keeps_earlier_commits() {
        let mut store = TripleStore::new();
        let err = run(
            &mut store,
            "PREFIX ex: <http://example.org/> \
             INSERT DATA { ex:a ex:p ex:b } ; \
             LOAD <http://example.org/file.ttl>",
        )
        .unwrap_err();

        match err {
            QueryError::UpdateFailed { index, .. } => assert_eq!(index, 1),
            other => panic!("expected UpdateFailed, got {other:?}"),
        }
        // The first operation stays committed
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_and_drop_named_graph() {
        let mut store = TripleStore::new();
        run(
            &mut store,
            "INSERT DATA { GRAPH <http://g> { <http://s> <http://p> <http://o> } }",
        )
        .unwrap();
        let graph = Node::iri(store.dictionary().intern("http://g"));

        let stats = run(&mut store, "CLEAR GRAPH <http://g>").unwrap();
        assert_eq!(stats[0].deleted, 1);
        assert!(store.has_graph(&graph));

        run(&mut store, "DROP GRAPH <http://g>").unwrap();
        assert!(!store.has_graph(&graph));

        // Dropping again without SILENT is an error
        let err = run(&mut store, "DROP GRAPH <http://g>").unwrap_err();
        assert!(matches!(
            err,
            QueryError::UpdateFailed { index: 0, .. }
        ));

        // ... and a no-op with SILENT
        run(&mut store, "DROP SILENT GRAPH <http://g>").unwrap();
    }

    #[test]
    fn cancelled_update_stages_no_partial_writes() {
        let mut store = TripleStore::new();
        let mut parser = SparqlParser::new(store.dictionary().clone());
        let request = parser
            .parse_update("PREFIX ex: <http://example.org/> INSERT DATA { ex:a ex:p ex:b }")
            .unwrap();

        let flag = crate::CancelFlag::new();
        flag.cancel();
        let control = ExecControl::unbounded().with_cancel(flag);
        let err = UpdateExecutor::new(&mut store)
            .with_control(control)
            .execute_request(&request)
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::UpdateFailed { index: 0, .. }
        ));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn blank_nodes_in_insert_data_are_fresh_terms() {
        let mut store = TripleStore::new();
        run(
            &mut store,
            "PREFIX ex: <http://example.org/> INSERT DATA { _:n ex:p ex:b . _:n ex:q ex:c }",
        )
        .unwrap();
        assert_eq!(store.len(), 2);
        let hits = store.match_pattern(None, None, None);
        let Node::BlankNode(first) = &hits[0].subject else {
            panic!("expected blank subject");
        };
        let Node::BlankNode(second) = &hits[1].subject else {
            panic!("expected blank subject");
        };
        // Same label, same id within one request
        assert_eq!(first, second);
        let _ = Triple::try_new(
            hits[0].subject.clone(),
            hits[0].predicate.clone(),
            hits[0].object.clone(),
        )
        .unwrap();
    }
}
