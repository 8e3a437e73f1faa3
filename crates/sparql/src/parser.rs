//! SPARQL parser
//!
//! Lowers pest parse trees into the algebra of [`crate::algebra`]. The
//! walker also performs the standard translation steps: blank nodes in
//! patterns become fresh unexposed variables, group filters apply to the
//! whole group, aggregates are hoisted into `Group` nodes, and SELECT
//! expressions become `Extend` wrappers.

use crate::algebra::*;
use crate::{QueryError, QueryResult};
use pest::iterators::Pair;
use pest::Parser as _;
use pest_derive::Parser;
use rdf_model::{Dictionary, Direction, Node, VarName, Vocabulary};
use rustc_hash::FxHashMap;
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Parser)]
#[grammar = "sparql.pest"]
struct PestSparql;

/// Context a term appears in
///
/// Blank nodes in patterns are variables with fresh hidden names; blank
/// nodes in data blocks are fresh blank node terms, consistent per label
/// within one request.
#[derive(Clone, Copy, PartialEq)]
enum TermCtx {
    Pattern,
    Data,
}

type AggSink<'a, 'b> = Option<&'b mut Vec<(VarName<'a>, Aggregate<'a>)>>;

/// SPARQL query and update parser
///
/// The lifetime parameter is the node lifetime of the produced algebra;
/// interned strings are stable, so it is independent of the parser itself.
pub struct SparqlParser<'a> {
    dict: Arc<Dictionary>,
    base: Option<String>,
    prefixes: FxHashMap<String, String>,
    anon_counter: u64,
    blank_counter: u64,
    blank_labels: FxHashMap<String, u64>,
    agg_counter: u64,
    _marker: PhantomData<&'a ()>,
}

impl<'a> SparqlParser<'a> {
    /// Create a parser interning through the given dictionary
    pub fn new(dict: Arc<Dictionary>) -> Self {
        Self {
            dict,
            base: None,
            prefixes: FxHashMap::default(),
            anon_counter: 0,
            blank_counter: 0,
            blank_labels: FxHashMap::default(),
            agg_counter: 0,
            _marker: PhantomData,
        }
    }

    /// Parse a query (SELECT / CONSTRUCT / DESCRIBE / ASK)
    pub fn parse_query(&mut self, text: &str) -> QueryResult<Query<'a>> {
        let mut pairs =
            PestSparql::parse(Rule::QueryUnit, text).map_err(pest_error)?;
        let unit = pairs.next().ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "empty query".into(),
        })?;

        let mut query = None;
        for inner in unit.into_inner() {
            match inner.as_rule() {
                Rule::Prologue => self.parse_prologue(inner)?,
                Rule::SelectQuery => query = Some(self.parse_select(inner)?),
                Rule::ConstructQuery => query = Some(self.parse_construct(inner)?),
                Rule::DescribeQuery => query = Some(self.parse_describe(inner)?),
                Rule::AskQuery => query = Some(self.parse_ask(inner)?),
                Rule::EOI => {}
                _ => {}
            }
        }
        query.ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "no query form found".into(),
        })
    }

    /// Parse an update request (possibly several `;`-separated operations)
    pub fn parse_update(&mut self, text: &str) -> QueryResult<UpdateRequest<'a>> {
        let mut pairs =
            PestSparql::parse(Rule::UpdateUnit, text).map_err(pest_error)?;
        let unit = pairs.next().ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "empty update".into(),
        })?;

        let mut operations = Vec::new();
        for inner in unit.into_inner() {
            match inner.as_rule() {
                Rule::Prologue => self.parse_prologue(inner)?,
                Rule::UpdateOp => operations.push(self.parse_update_op(inner)?),
                Rule::EOI => {}
                _ => {}
            }
        }
        Ok(UpdateRequest { operations })
    }

    // ---- prologue -------------------------------------------------------

    fn parse_prologue(&mut self, pair: Pair<'_, Rule>) -> QueryResult<()> {
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::BaseDecl => {
                    let iri = first_rule(inner, Rule::IRIREF)?;
                    self.base = Some(strip_angles(iri.as_str()).to_string());
                }
                Rule::PrefixDecl => {
                    let mut prefix = String::new();
                    let mut iri = String::new();
                    for part in inner.into_inner() {
                        match part.as_rule() {
                            Rule::PNAME_NS => {
                                let text = part.as_str();
                                prefix = text[..text.len() - 1].to_string();
                            }
                            Rule::IRIREF => {
                                iri = strip_angles(part.as_str()).to_string();
                            }
                            _ => {}
                        }
                    }
                    self.prefixes.insert(prefix, iri);
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ---- query forms ----------------------------------------------------

    fn parse_select(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Query<'a>> {
        let mut clause = None;
        let mut pattern = Algebra::Bgp(Vec::new());
        let mut modifier = SolutionModifierParts::default();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::SelectClause => clause = Some(self.parse_select_clause(inner)?),
                Rule::WhereClause => pattern = self.parse_where_clause(inner)?,
                Rule::SolutionModifier => modifier = self.parse_solution_modifier(inner)?,
                _ => {}
            }
        }
        let clause = clause.ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "missing SELECT clause".into(),
        })?;

        let (projection, pattern) = self.lower_select(clause, pattern, &mut modifier)?;
        Ok(Query::Select {
            projection,
            pattern,
            limit: modifier.limit,
            offset: modifier.offset,
        })
    }

    fn parse_construct(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Query<'a>> {
        let mut template = Vec::new();
        let mut pattern = Algebra::Bgp(Vec::new());
        let mut modifier = SolutionModifierParts::default();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::ConstructTemplate => {
                    for block in inner.into_inner() {
                        if block.as_rule() == Rule::TriplesBlock {
                            template.extend(self.parse_triples_block(block, TermCtx::Data)?);
                        }
                    }
                }
                Rule::WhereClause => pattern = self.parse_where_clause(inner)?,
                Rule::SolutionModifier => modifier = self.parse_solution_modifier(inner)?,
                _ => {}
            }
        }

        for t in &template {
            if matches!(t.predicate, PredicatePattern::Path(_)) {
                return Err(QueryError::BadPosition(
                    "property path in CONSTRUCT template".into(),
                ));
            }
        }

        let pattern = wrap_order(pattern, std::mem::take(&mut modifier.order));
        Ok(Query::Construct {
            template,
            pattern,
            limit: modifier.limit,
            offset: modifier.offset,
        })
    }

    fn parse_describe(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Query<'a>> {
        let mut resources = Vec::new();
        let mut pattern = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::Star => {}
                Rule::VarOrIri => resources.push(self.parse_var_or_iri(inner)?),
                Rule::WhereClause => pattern = Some(self.parse_where_clause(inner)?),
                Rule::SolutionModifier => {}
                _ => {}
            }
        }
        Ok(Query::Describe {
            resources,
            pattern,
            options: DescribeOptions::default(),
        })
    }

    fn parse_ask(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Query<'a>> {
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::WhereClause {
                return Ok(Query::Ask {
                    pattern: self.parse_where_clause(inner)?,
                });
            }
        }
        Err(QueryError::Parse {
            line: 1,
            column: 1,
            message: "ASK without WHERE clause".into(),
        })
    }

    // ---- SELECT lowering ------------------------------------------------

    fn parse_select_clause(&mut self, pair: Pair<'_, Rule>) -> QueryResult<SelectClauseParts<'a>> {
        let mut parts = SelectClauseParts {
            distinct: false,
            reduced: false,
            all: false,
            items: Vec::new(),
            aggregates: Vec::new(),
        };

        // Items may contain aggregates; collect them while parsing
        let mut aggregates = Vec::new();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::DistinctKw => parts.distinct = true,
                Rule::ReducedKw => parts.reduced = true,
                Rule::Star => parts.all = true,
                Rule::SelectItem => {
                    let item = only_inner(inner)?;
                    match item.as_rule() {
                        Rule::Var => {
                            let var = self.parse_var(&item);
                            parts.items.push((Expression::Var(var), var, true));
                        }
                        Rule::SelectExpr => {
                            let mut expr = None;
                            let mut var = None;
                            for part in item.into_inner() {
                                match part.as_rule() {
                                    Rule::Expression => {
                                        expr = Some(self.parse_expression(
                                            part,
                                            &mut Some(&mut aggregates),
                                        )?)
                                    }
                                    Rule::Var => var = Some(self.parse_var(&part)),
                                    _ => {}
                                }
                            }
                            let (expr, var) = match (expr, var) {
                                (Some(e), Some(v)) => (e, v),
                                _ => {
                                    return Err(QueryError::Parse {
                                        line: 1,
                                        column: 1,
                                        message: "malformed (expression AS ?var)".into(),
                                    })
                                }
                            };
                            parts.items.push((expr, var, false));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        parts.aggregates = aggregates;
        Ok(parts)
    }

    fn lower_select(
        &mut self,
        clause: SelectClauseParts<'a>,
        pattern: Algebra<'a>,
        modifier: &mut SolutionModifierParts<'a>,
    ) -> QueryResult<(Projection<'a>, Algebra<'a>)> {
        let mut aggregates = clause.aggregates;
        let mut pattern = pattern;

        // GROUP BY (expr AS ?v) conditions bind before grouping
        let mut group_vars = Vec::new();
        if let Some(conditions) = modifier.group.take() {
            for condition in conditions {
                match condition {
                    GroupCond::Var(v) => group_vars.push(v),
                    GroupCond::Expr(expr, v) => {
                        pattern = Algebra::Extend {
                            var: v,
                            expr,
                            input: Box::new(pattern),
                        };
                        group_vars.push(v);
                    }
                }
            }
        }

        // HAVING constraints may introduce further aggregates
        let mut having = Vec::new();
        for constraint in std::mem::take(&mut modifier.having) {
            having.push(self.reparse_having(constraint, &mut aggregates)?);
        }

        // In a grouped query, extension calls over solution values in the
        // projection are custom aggregates resolved against the registry
        let mut items = clause.items;
        if !group_vars.is_empty() || !aggregates.is_empty() {
            for (expr, _, plain) in &mut items {
                if !*plain {
                    hoist_custom_calls(self, expr, &mut aggregates);
                }
            }
        }

        let grouped = !group_vars.is_empty() || !aggregates.is_empty();
        if grouped {
            pattern = Algebra::Group {
                vars: group_vars,
                aggregates,
                input: Box::new(pattern),
            };
        }
        for expr in having {
            pattern = Algebra::Filter {
                expr,
                input: Box::new(pattern),
            };
        }

        // SELECT expressions extend the (possibly grouped) solutions
        let mut vars = Vec::new();
        for (expr, var, plain) in &items {
            vars.push(*var);
            if !plain {
                pattern = Algebra::Extend {
                    var: *var,
                    expr: expr.clone(),
                    input: Box::new(pattern),
                };
            }
        }

        pattern = wrap_order(pattern, std::mem::take(&mut modifier.order));

        let projection = if clause.all {
            Projection::All
        } else {
            pattern = Algebra::Project {
                vars: vars.clone(),
                input: Box::new(pattern),
            };
            Projection::Variables(vars)
        };

        if clause.distinct {
            pattern = Algebra::Distinct {
                input: Box::new(pattern),
            };
        } else if clause.reduced {
            pattern = Algebra::Reduced {
                input: Box::new(pattern),
            };
        }

        Ok((projection, pattern))
    }

    /// HAVING constraints are parsed late so their aggregates join the
    /// group node; stored as raw pairs would tie lifetimes to the input,
    /// so the solution-modifier walker keeps them as pre-parsed
    /// expressions with a private aggregate sink instead.
    fn reparse_having(
        &mut self,
        parsed: HavingConstraint<'a>,
        aggregates: &mut Vec<(VarName<'a>, Aggregate<'a>)>,
    ) -> QueryResult<Expression<'a>> {
        match parsed {
            HavingConstraint::Ready(expr) => Ok(expr),
            HavingConstraint::WithAggregates(expr, mut collected) => {
                aggregates.append(&mut collected);
                Ok(expr)
            }
        }
    }

    fn parse_solution_modifier(
        &mut self,
        pair: Pair<'_, Rule>,
    ) -> QueryResult<SolutionModifierParts<'a>> {
        let mut parts = SolutionModifierParts::default();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::GroupClause => {
                    let mut conditions = Vec::new();
                    for condition in inner.into_inner() {
                        if condition.as_rule() != Rule::GroupCondition {
                            continue;
                        }
                        let item = only_inner(condition)?;
                        match item.as_rule() {
                            Rule::Var => conditions.push(GroupCond::Var(self.parse_var(&item))),
                            Rule::GroupExpr => {
                                let mut expr = None;
                                let mut var = None;
                                for part in item.into_inner() {
                                    match part.as_rule() {
                                        Rule::Expression => {
                                            expr =
                                                Some(self.parse_expression(part, &mut None)?)
                                        }
                                        Rule::Var => var = Some(self.parse_var(&part)),
                                        _ => {}
                                    }
                                }
                                if let (Some(e), Some(v)) = (expr, var) {
                                    conditions.push(GroupCond::Expr(e, v));
                                }
                            }
                            _ => {}
                        }
                    }
                    parts.group = Some(conditions);
                }
                Rule::HavingClause => {
                    for constraint in inner.into_inner() {
                        if constraint.as_rule() == Rule::Constraint {
                            let mut collected = Vec::new();
                            let expr = self
                                .parse_constraint(constraint, &mut Some(&mut collected))?;
                            parts.having.push(if collected.is_empty() {
                                HavingConstraint::Ready(expr)
                            } else {
                                HavingConstraint::WithAggregates(expr, collected)
                            });
                        }
                    }
                }
                Rule::OrderClause => {
                    for condition in inner.into_inner() {
                        if condition.as_rule() != Rule::OrderCondition {
                            continue;
                        }
                        let item = only_inner(condition)?;
                        let (ascending, expr) = match item.as_rule() {
                            Rule::AscCond => {
                                (true, self.parse_bracketted(item, &mut None)?)
                            }
                            Rule::DescCond => {
                                (false, self.parse_bracketted(item, &mut None)?)
                            }
                            Rule::Constraint => {
                                (true, self.parse_constraint(item, &mut None)?)
                            }
                            Rule::Var => (true, Expression::Var(self.parse_var(&item))),
                            _ => continue,
                        };
                        parts.order.push(OrderCondition { expr, ascending });
                    }
                }
                Rule::LimitOffsetClauses => {
                    for clause in inner.into_inner() {
                        match clause.as_rule() {
                            Rule::LimitClause => {
                                parts.limit = Some(parse_usize(&only_inner(clause)?)?)
                            }
                            Rule::OffsetClause => {
                                parts.offset = Some(parse_usize(&only_inner(clause)?)?)
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(parts)
    }

    fn parse_bracketted(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::BrackettedExpression => return self.parse_bracketted(inner, aggs),
                Rule::Expression => return self.parse_expression(inner, aggs),
                _ => {}
            }
        }
        Err(QueryError::Parse {
            line: 1,
            column: 1,
            message: "empty bracketted expression".into(),
        })
    }

    // ---- group graph patterns ------------------------------------------

    fn parse_where_clause(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Algebra<'a>> {
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::GroupGraphPattern {
                return self.parse_group_graph_pattern(inner);
            }
        }
        Ok(Algebra::Bgp(Vec::new()))
    }

    fn parse_group_graph_pattern(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Algebra<'a>> {
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::SubSelect => return self.parse_sub_select(inner),
                Rule::GroupGraphPatternSub => return self.parse_group_sub(inner),
                _ => {}
            }
        }
        Ok(Algebra::Bgp(Vec::new()))
    }

    fn parse_sub_select(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Algebra<'a>> {
        let mut clause = None;
        let mut pattern = Algebra::Bgp(Vec::new());
        let mut modifier = SolutionModifierParts::default();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::SelectClause => clause = Some(self.parse_select_clause(inner)?),
                Rule::WhereClause => pattern = self.parse_where_clause(inner)?,
                Rule::SolutionModifier => modifier = self.parse_solution_modifier(inner)?,
                _ => {}
            }
        }
        let clause = clause.ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "sub-select without SELECT clause".into(),
        })?;

        let (_, mut lowered) = self.lower_select(clause, pattern, &mut modifier)?;
        if modifier.limit.is_some() || modifier.offset.is_some() {
            lowered = Algebra::Slice {
                start: modifier.offset,
                length: modifier.limit,
                input: Box::new(lowered),
            };
        }
        Ok(lowered)
    }

    fn parse_group_sub(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Algebra<'a>> {
        let mut current: Option<Algebra<'a>> = None;
        let mut filters = Vec::new();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::TriplesBlock => {
                    let patterns = self.parse_triples_block(inner, TermCtx::Pattern)?;
                    current = Some(join_bgp(current, patterns));
                }
                Rule::GraphPatternNotTriples => {
                    let element = only_inner(inner)?;
                    match element.as_rule() {
                        Rule::GroupOrUnionGraphPattern => {
                            let algebra = self.parse_group_or_union(element)?;
                            current = Some(join_algebra(current, algebra));
                        }
                        Rule::OptionalGraphPattern => {
                            let group = first_rule(element, Rule::GroupGraphPattern)?;
                            let right = self.parse_group_graph_pattern(group)?;
                            let left = current.take().unwrap_or(Algebra::Bgp(Vec::new()));
                            // The optional group's trailing filter is the join condition
                            let (right, expr) = match right {
                                Algebra::Filter { expr, input } => (*input, Some(expr)),
                                other => (other, None),
                            };
                            current = Some(Algebra::LeftJoin {
                                left: Box::new(left),
                                right: Box::new(right),
                                expr,
                            });
                        }
                        Rule::MinusGraphPattern => {
                            let group = first_rule(element, Rule::GroupGraphPattern)?;
                            let right = self.parse_group_graph_pattern(group)?;
                            let left = current.take().unwrap_or(Algebra::Bgp(Vec::new()));
                            current = Some(Algebra::Minus {
                                left: Box::new(left),
                                right: Box::new(right),
                            });
                        }
                        Rule::LateralGraphPattern => {
                            let group = first_rule(element, Rule::GroupGraphPattern)?;
                            let right = self.parse_group_graph_pattern(group)?;
                            let left = current.take().unwrap_or(Algebra::Bgp(Vec::new()));
                            current = Some(Algebra::Lateral {
                                left: Box::new(left),
                                right: Box::new(right),
                            });
                        }
                        Rule::GraphGraphPattern => {
                            let mut graph = None;
                            let mut input = None;
                            for part in element.into_inner() {
                                match part.as_rule() {
                                    Rule::VarOrIri => graph = Some(self.parse_var_or_iri(part)?),
                                    Rule::GroupGraphPattern => {
                                        input = Some(self.parse_group_graph_pattern(part)?)
                                    }
                                    _ => {}
                                }
                            }
                            if let (Some(graph), Some(input)) = (graph, input) {
                                let algebra = Algebra::Graph {
                                    graph,
                                    input: Box::new(input),
                                };
                                current = Some(join_algebra(current, algebra));
                            }
                        }
                        Rule::FilterClause => {
                            let constraint = first_rule(element, Rule::Constraint)?;
                            filters.push(self.parse_constraint(constraint, &mut None)?);
                        }
                        Rule::BindClause => {
                            let mut expr = None;
                            let mut var = None;
                            for part in element.into_inner() {
                                match part.as_rule() {
                                    Rule::Expression => {
                                        expr = Some(self.parse_expression(part, &mut None)?)
                                    }
                                    Rule::Var => var = Some(self.parse_var(&part)),
                                    _ => {}
                                }
                            }
                            if let (Some(expr), Some(var)) = (expr, var) {
                                let input = current.take().unwrap_or(Algebra::Bgp(Vec::new()));
                                current = Some(Algebra::Extend {
                                    var,
                                    expr,
                                    input: Box::new(input),
                                });
                            }
                        }
                        Rule::InlineData => {
                            let table = self.parse_inline_data(element)?;
                            current = Some(join_algebra(current, table));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        let mut algebra = current.unwrap_or(Algebra::Bgp(Vec::new()));
        for expr in filters {
            algebra = Algebra::Filter {
                expr,
                input: Box::new(algebra),
            };
        }
        Ok(algebra)
    }

    fn parse_group_or_union(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Algebra<'a>> {
        let mut branches = Vec::new();
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::GroupGraphPattern {
                branches.push(self.parse_group_graph_pattern(inner)?);
            }
        }
        let mut iter = branches.into_iter();
        let first = iter.next().unwrap_or(Algebra::Bgp(Vec::new()));
        Ok(iter.fold(first, |left, right| Algebra::Union {
            left: Box::new(left),
            right: Box::new(right),
        }))
    }

    fn parse_inline_data(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Algebra<'a>> {
        let block = first_rule(pair, Rule::DataBlock)?;
        let inner = only_inner(block)?;
        match inner.as_rule() {
            Rule::InlineDataOneVar => {
                let mut vars = Vec::new();
                let mut rows = Vec::new();
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::Var => vars.push(self.parse_var(&part)),
                        Rule::DataBlockValue => {
                            rows.push(vec![self.parse_data_block_value(part)?])
                        }
                        _ => {}
                    }
                }
                Ok(Algebra::Table { vars, rows })
            }
            Rule::InlineDataFull => {
                let mut vars = Vec::new();
                let mut rows = Vec::new();
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::Var => vars.push(self.parse_var(&part)),
                        Rule::DataBlockRow => {
                            let mut row = Vec::new();
                            for value in part.into_inner() {
                                if value.as_rule() == Rule::DataBlockValue {
                                    row.push(self.parse_data_block_value(value)?);
                                }
                            }
                            rows.push(row);
                        }
                        _ => {}
                    }
                }
                Ok(Algebra::Table { vars, rows })
            }
            _ => Ok(Algebra::Table {
                vars: Vec::new(),
                rows: Vec::new(),
            }),
        }
    }

    fn parse_data_block_value(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Option<Node<'a>>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::UndefKw => Ok(None),
            Rule::iri => Ok(Some(self.parse_iri(inner)?)),
            Rule::RDFLiteral => Ok(Some(self.parse_rdf_literal(inner)?)),
            Rule::NumericLiteral => Ok(Some(self.parse_numeric_literal(&inner))),
            Rule::BooleanLiteral => Ok(Some(self.parse_boolean_literal(&inner))),
            _ => Ok(None),
        }
    }

    // ---- triples --------------------------------------------------------

    fn parse_triples_block(
        &mut self,
        pair: Pair<'_, Rule>,
        ctx: TermCtx,
    ) -> QueryResult<Vec<TriplePattern<'a>>> {
        let mut patterns = Vec::new();
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::TriplesSameSubject {
                self.parse_triples_same_subject(inner, ctx, &mut patterns)?;
            }
        }
        Ok(patterns)
    }

    fn parse_triples_same_subject(
        &mut self,
        pair: Pair<'_, Rule>,
        ctx: TermCtx,
        out: &mut Vec<TriplePattern<'a>>,
    ) -> QueryResult<()> {
        let mut subject = None;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::VarOrTerm => subject = Some(self.parse_var_or_term(inner, ctx)?),
                Rule::PropertyList => {
                    let subject = subject.clone().ok_or_else(|| QueryError::Parse {
                        line: 1,
                        column: 1,
                        message: "property list without subject".into(),
                    })?;
                    for elem in inner.into_inner() {
                        if elem.as_rule() != Rule::PropertyListElem {
                            continue;
                        }
                        let mut predicate = None;
                        for part in elem.into_inner() {
                            match part.as_rule() {
                                Rule::Verb => {
                                    predicate = Some(self.parse_verb(part)?);
                                }
                                Rule::ObjectList => {
                                    let predicate =
                                        predicate.clone().ok_or_else(|| QueryError::Parse {
                                            line: 1,
                                            column: 1,
                                            message: "object list without predicate".into(),
                                        })?;
                                    for object in part.into_inner() {
                                        if object.as_rule() == Rule::VarOrTerm {
                                            let object =
                                                self.parse_var_or_term(object, ctx)?;
                                            out.push(TriplePattern {
                                                subject: subject.clone(),
                                                predicate: predicate.clone(),
                                                object,
                                            });
                                        }
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_verb(&mut self, pair: Pair<'_, Rule>) -> QueryResult<PredicatePattern<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::Var => Ok(PredicatePattern::Term(TermPattern::Var(
                self.parse_var(&inner),
            ))),
            Rule::Path => {
                let path = self.parse_path(inner)?;
                Ok(match path {
                    PropertyPath::Predicate(node) => {
                        PredicatePattern::Term(TermPattern::Node(node))
                    }
                    other => PredicatePattern::Path(other),
                })
            }
            _ => Err(QueryError::Parse {
                line: 1,
                column: 1,
                message: "unexpected verb".into(),
            }),
        }
    }

    fn parse_var_or_term(
        &mut self,
        pair: Pair<'_, Rule>,
        ctx: TermCtx,
    ) -> QueryResult<TermPattern<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::Var => Ok(TermPattern::Var(self.parse_var(&inner))),
            Rule::QuotedTP => {
                let mut elems = Vec::new();
                for part in inner.into_inner() {
                    if part.as_rule() == Rule::VarOrTerm {
                        elems.push(self.parse_var_or_term(part, ctx)?);
                    }
                }
                if elems.len() != 3 {
                    return Err(QueryError::Parse {
                        line: 1,
                        column: 1,
                        message: "quoted triple needs subject, predicate and object".into(),
                    });
                }
                let object = elems.pop().unwrap_or(TermPattern::Node(Node::blank(0)));
                let predicate = elems.pop().unwrap_or(TermPattern::Node(Node::blank(0)));
                let subject = elems.pop().unwrap_or(TermPattern::Node(Node::blank(0)));
                match &predicate {
                    TermPattern::Var(_) => {}
                    TermPattern::Node(n) if n.is_iri() => {}
                    _ => {
                        return Err(QueryError::BadPosition(
                            "quoted triple predicate must be a variable or IRI".into(),
                        ))
                    }
                }
                Ok(TermPattern::Quoted(Box::new(QuotedPattern {
                    subject,
                    predicate,
                    object,
                })))
            }
            Rule::GraphTerm => {
                let term = only_inner(inner)?;
                match term.as_rule() {
                    Rule::iri => Ok(TermPattern::Node(self.parse_iri(term)?)),
                    Rule::RDFLiteral => {
                        let node = self.parse_rdf_literal(term)?;
                        if ctx == TermCtx::Data {
                            if let Node::Literal(lit) = &node {
                                if lit.lexical.is_empty() {
                                    return Err(QueryError::Term(
                                        rdf_model::RdfError::InvalidLiteral(
                                            "empty lexical form in data block".into(),
                                        ),
                                    ));
                                }
                            }
                        }
                        Ok(TermPattern::Node(node))
                    }
                    Rule::NumericLiteral => {
                        Ok(TermPattern::Node(self.parse_numeric_literal(&term)))
                    }
                    Rule::BooleanLiteral => {
                        Ok(TermPattern::Node(self.parse_boolean_literal(&term)))
                    }
                    Rule::BlankNodeLabel => {
                        let label = term.as_str()[2..].to_string();
                        Ok(self.blank_term(ctx, Some(label)))
                    }
                    Rule::Anon => Ok(self.blank_term(ctx, None)),
                    _ => Err(QueryError::Parse {
                        line: 1,
                        column: 1,
                        message: "unexpected graph term".into(),
                    }),
                }
            }
            _ => Err(QueryError::Parse {
                line: 1,
                column: 1,
                message: "unexpected term".into(),
            }),
        }
    }

    fn blank_term(&mut self, ctx: TermCtx, label: Option<String>) -> TermPattern<'a> {
        match ctx {
            // Standard SPARQL semantics: a blank node in a pattern is a
            // variable with a fresh, unexposed name
            TermCtx::Pattern => {
                let name = match label {
                    Some(label) => self.dict.intern(&format!("__bnode_{label}")),
                    None => {
                        self.anon_counter += 1;
                        self.dict.intern(&format!("__anon_{}", self.anon_counter))
                    }
                };
                TermPattern::Var(VarName::new(name))
            }
            TermCtx::Data => {
                let id = match label {
                    Some(label) => *self.blank_labels.entry(label).or_insert_with(|| {
                        self.blank_counter += 1;
                        self.blank_counter
                    }),
                    None => {
                        self.blank_counter += 1;
                        self.blank_counter
                    }
                };
                TermPattern::Node(Node::blank(id))
            }
        }
    }

    // ---- paths ----------------------------------------------------------

    fn parse_path(&mut self, pair: Pair<'_, Rule>) -> QueryResult<PropertyPath<'a>> {
        let alt = first_rule(pair, Rule::PathAlternative)?;
        self.parse_path_alternative(alt)
    }

    fn parse_path_alternative(&mut self, pair: Pair<'_, Rule>) -> QueryResult<PropertyPath<'a>> {
        let mut branches = Vec::new();
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::PathSequence {
                branches.push(self.parse_path_sequence(inner)?);
            }
        }
        fold_paths(branches, PropertyPath::Alternative)
    }

    fn parse_path_sequence(&mut self, pair: Pair<'_, Rule>) -> QueryResult<PropertyPath<'a>> {
        let mut steps = Vec::new();
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::PathEltOrInverse {
                steps.push(self.parse_path_elt_or_inverse(inner)?);
            }
        }
        fold_paths(steps, PropertyPath::Sequence)
    }

    fn parse_path_elt_or_inverse(&mut self, pair: Pair<'_, Rule>) -> QueryResult<PropertyPath<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::InversePathElt => {
                let elt = first_rule(inner, Rule::PathElt)?;
                Ok(PropertyPath::Inverse(Box::new(self.parse_path_elt(elt)?)))
            }
            Rule::PathElt => self.parse_path_elt(inner),
            _ => Err(QueryError::Parse {
                line: 1,
                column: 1,
                message: "unexpected path element".into(),
            }),
        }
    }

    fn parse_path_elt(&mut self, pair: Pair<'_, Rule>) -> QueryResult<PropertyPath<'a>> {
        let mut primary = None;
        let mut modifier = None;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::PathPrimary => primary = Some(self.parse_path_primary(inner)?),
                Rule::PathMod => {
                    let m = only_inner(inner)?;
                    modifier = Some(m.as_rule());
                }
                _ => {}
            }
        }
        let primary = primary.ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "empty path element".into(),
        })?;
        Ok(match modifier {
            Some(Rule::StarMod) => PropertyPath::ZeroOrMore(Box::new(primary)),
            Some(Rule::PlusMod) => PropertyPath::OneOrMore(Box::new(primary)),
            Some(Rule::QuestionMod) => PropertyPath::ZeroOrOne(Box::new(primary)),
            _ => primary,
        })
    }

    fn parse_path_primary(&mut self, pair: Pair<'_, Rule>) -> QueryResult<PropertyPath<'a>> {
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::iri => return Ok(PropertyPath::Predicate(self.parse_iri(inner)?)),
                Rule::AToken => {
                    return Ok(PropertyPath::Predicate(Node::iri(
                        self.dict.intern(Vocabulary::RDF_TYPE),
                    )))
                }
                Rule::NegatedPath => {
                    let set = first_rule(inner, Rule::PathNegatedPropertySet)?;
                    let mut excluded = Vec::new();
                    for one in set.into_inner() {
                        if one.as_rule() == Rule::PathOneInPropertySet {
                            let p = only_inner(one)?;
                            match p.as_rule() {
                                Rule::iri => excluded.push(self.parse_iri(p)?),
                                Rule::AToken => excluded
                                    .push(Node::iri(self.dict.intern(Vocabulary::RDF_TYPE))),
                                _ => {}
                            }
                        }
                    }
                    return Ok(PropertyPath::NegatedPropertySet(excluded));
                }
                Rule::Path => return self.parse_path(inner),
                Rule::PathAlternative => return self.parse_path_alternative(inner),
                _ => {}
            }
        }
        Err(QueryError::Parse {
            line: 1,
            column: 1,
            message: "empty path".into(),
        })
    }

    // ---- expressions ----------------------------------------------------

    fn parse_constraint(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::BrackettedExpression => self.parse_bracketted(inner, aggs),
            Rule::ExistsFunc => {
                let group = first_rule(inner, Rule::GroupGraphPattern)?;
                Ok(Expression::Exists(Box::new(
                    self.parse_group_graph_pattern(group)?,
                )))
            }
            Rule::NotExistsFunc => {
                let group = first_rule(inner, Rule::GroupGraphPattern)?;
                Ok(Expression::NotExists(Box::new(
                    self.parse_group_graph_pattern(group)?,
                )))
            }
            Rule::BuiltInCall => self.parse_builtin(inner, aggs),
            Rule::FunctionCall => self.parse_function_call(inner, aggs),
            _ => Err(QueryError::Parse {
                line: 1,
                column: 1,
                message: "unexpected constraint".into(),
            }),
        }
    }

    fn parse_expression(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        match pair.as_rule() {
            Rule::Expression => {
                let inner = only_inner(pair)?;
                self.parse_expression(inner, aggs)
            }
            Rule::ConditionalOrExpression => {
                self.fold_binary(pair, aggs, Rule::ConditionalAndExpression, |l, r| {
                    Expression::Or(Box::new(l), Box::new(r))
                })
            }
            Rule::ConditionalAndExpression => {
                self.fold_binary(pair, aggs, Rule::RelationalExpression, |l, r| {
                    Expression::And(Box::new(l), Box::new(r))
                })
            }
            Rule::RelationalExpression => self.parse_relational(pair, aggs),
            Rule::AdditiveExpression => self.parse_additive(pair, aggs),
            Rule::MultiplicativeExpression => self.parse_multiplicative(pair, aggs),
            Rule::UnaryExpression => {
                let inner = only_inner(pair)?;
                match inner.as_rule() {
                    Rule::NotExpr => {
                        let prim = first_rule(inner, Rule::PrimaryExpression)?;
                        Ok(Expression::Not(Box::new(self.parse_primary(prim, aggs)?)))
                    }
                    Rule::NegExpr => {
                        let prim = first_rule(inner, Rule::PrimaryExpression)?;
                        Ok(Expression::Negate(Box::new(self.parse_primary(prim, aggs)?)))
                    }
                    Rule::PlusExpr => {
                        let prim = first_rule(inner, Rule::PrimaryExpression)?;
                        self.parse_primary(prim, aggs)
                    }
                    Rule::PrimaryExpression => self.parse_primary(inner, aggs),
                    _ => Err(QueryError::Parse {
                        line: 1,
                        column: 1,
                        message: "unexpected unary expression".into(),
                    }),
                }
            }
            Rule::PrimaryExpression => self.parse_primary(pair, aggs),
            _ => Err(QueryError::Parse {
                line: 1,
                column: 1,
                message: format!("unexpected expression rule {:?}", pair.as_rule()),
            }),
        }
    }

    fn fold_binary(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
        operand: Rule,
        combine: fn(Expression<'a>, Expression<'a>) -> Expression<'a>,
    ) -> QueryResult<Expression<'a>> {
        let mut result: Option<Expression<'a>> = None;
        for inner in pair.into_inner() {
            if inner.as_rule() == operand {
                let expr = self.parse_expression(inner, aggs)?;
                result = Some(match result {
                    None => expr,
                    Some(left) => combine(left, expr),
                });
            }
        }
        result.ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "empty expression".into(),
        })
    }

    fn parse_relational(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        let mut left = None;
        let mut op: Option<String> = None;
        let mut in_list = None;
        let mut negated_in = false;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::AdditiveExpression => {
                    let expr = self.parse_expression(inner, aggs)?;
                    if left.is_none() {
                        left = Some(expr);
                    } else if let Some(op) = op.take() {
                        let l = left.take().ok_or_else(|| QueryError::Parse {
                            line: 1,
                            column: 1,
                            message: "relational expression without left operand".into(),
                        })?;
                        left = Some(apply_rel_op(&op, l, expr));
                    }
                }
                Rule::RelOp => op = Some(inner.as_str().to_string()),
                Rule::InKw => negated_in = false,
                Rule::NotInKw => negated_in = true,
                Rule::ExpressionList => {
                    let mut list = Vec::new();
                    for expr in inner.into_inner() {
                        if expr.as_rule() == Rule::Expression {
                            list.push(self.parse_expression(expr, aggs)?);
                        }
                    }
                    in_list = Some(list);
                }
                _ => {}
            }
        }

        let left = left.ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "empty relational expression".into(),
        })?;
        Ok(match in_list {
            Some(list) if negated_in => Expression::NotIn(Box::new(left), list),
            Some(list) => Expression::In(Box::new(left), list),
            None => left,
        })
    }

    fn parse_additive(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        let mut result = None;
        let mut op = '+';
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::MultiplicativeExpression => {
                    let expr = self.parse_expression(inner, aggs)?;
                    result = Some(match result {
                        None => expr,
                        Some(left) if op == '+' => {
                            Expression::Add(Box::new(left), Box::new(expr))
                        }
                        Some(left) => Expression::Subtract(Box::new(left), Box::new(expr)),
                    });
                }
                Rule::AddOp => op = inner.as_str().chars().next().unwrap_or('+'),
                _ => {}
            }
        }
        result.ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "empty additive expression".into(),
        })
    }

    fn parse_multiplicative(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        let mut result = None;
        let mut op = '*';
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::UnaryExpression => {
                    let expr = self.parse_expression(inner, aggs)?;
                    result = Some(match result {
                        None => expr,
                        Some(left) if op == '*' => {
                            Expression::Multiply(Box::new(left), Box::new(expr))
                        }
                        Some(left) => Expression::Divide(Box::new(left), Box::new(expr)),
                    });
                }
                Rule::MulOp => op = inner.as_str().chars().next().unwrap_or('*'),
                _ => {}
            }
        }
        result.ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "empty multiplicative expression".into(),
        })
    }

    fn parse_primary(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::BrackettedExpression => self.parse_bracketted(inner, aggs),
            Rule::ExistsFunc => {
                let group = first_rule(inner, Rule::GroupGraphPattern)?;
                Ok(Expression::Exists(Box::new(
                    self.parse_group_graph_pattern(group)?,
                )))
            }
            Rule::NotExistsFunc => {
                let group = first_rule(inner, Rule::GroupGraphPattern)?;
                Ok(Expression::NotExists(Box::new(
                    self.parse_group_graph_pattern(group)?,
                )))
            }
            Rule::BuiltInCall => self.parse_builtin(inner, aggs),
            Rule::Aggregate => self.parse_aggregate(inner, aggs),
            Rule::FunctionCall => self.parse_function_call(inner, aggs),
            Rule::iri => Ok(Expression::Constant(self.parse_iri(inner)?)),
            Rule::RDFLiteral => Ok(Expression::Constant(self.parse_rdf_literal(inner)?)),
            Rule::NumericLiteral => Ok(Expression::Constant(self.parse_numeric_literal(&inner))),
            Rule::BooleanLiteral => Ok(Expression::Constant(self.parse_boolean_literal(&inner))),
            Rule::Var => Ok(Expression::Var(self.parse_var(&inner))),
            _ => Err(QueryError::Parse {
                line: 1,
                column: 1,
                message: format!("unexpected primary expression {:?}", inner.as_rule()),
            }),
        }
    }

    fn parse_aggregate(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        let inner = only_inner(pair)?;
        let rule = inner.as_rule();
        let mut distinct = false;
        let mut star = false;
        let mut expr = None;
        let mut separator = None;

        for part in inner.into_inner() {
            match part.as_rule() {
                Rule::DistinctKw => distinct = true,
                Rule::Star => star = true,
                Rule::Expression => expr = Some(self.parse_expression(part, &mut None)?),
                Rule::String => {
                    separator = Some(self.dict.intern(&unescape_string(part.as_str())))
                }
                _ => {}
            }
        }

        let aggregate = match rule {
            Rule::CountAgg => Aggregate::Count {
                expr: if star { None } else { expr.map(Box::new) },
                distinct,
            },
            Rule::SumAgg => Aggregate::Sum {
                expr: Box::new(required_expr(expr)?),
                distinct,
            },
            Rule::MinAgg => Aggregate::Min {
                expr: Box::new(required_expr(expr)?),
                distinct,
            },
            Rule::MaxAgg => Aggregate::Max {
                expr: Box::new(required_expr(expr)?),
                distinct,
            },
            Rule::AvgAgg => Aggregate::Avg {
                expr: Box::new(required_expr(expr)?),
                distinct,
            },
            Rule::SampleAgg => Aggregate::Sample {
                expr: Box::new(required_expr(expr)?),
                distinct,
            },
            Rule::GroupConcatAgg => Aggregate::GroupConcat {
                expr: Box::new(required_expr(expr)?),
                separator,
                distinct,
            },
            _ => {
                return Err(QueryError::Parse {
                    line: 1,
                    column: 1,
                    message: "unknown aggregate form".into(),
                })
            }
        };
        self.hoist_aggregate(aggregate, aggs)
    }

    /// Replace an aggregate expression by a fresh variable and record the
    /// computation for the enclosing Group node.
    fn hoist_aggregate(
        &mut self,
        aggregate: Aggregate<'a>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        let sink = aggs.as_deref_mut().ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "aggregates are only allowed in SELECT, HAVING or ORDER BY".into(),
        })?;
        self.agg_counter += 1;
        let var = VarName::new(self.dict.intern(&format!("__agg_{}", self.agg_counter)));
        sink.push((var, aggregate));
        Ok(Expression::Var(var))
    }

    fn parse_function_call(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        let mut iri = None;
        let mut distinct = false;
        let mut args = Vec::new();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::iri => iri = Some(self.parse_iri_str(inner)?),
                Rule::ArgList => {
                    for part in inner.into_inner() {
                        match part.as_rule() {
                            Rule::DistinctKw => distinct = true,
                            Rule::Expression => {
                                args.push(self.parse_expression(part, aggs)?)
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        let iri = iri.ok_or_else(|| QueryError::Parse {
            line: 1,
            column: 1,
            message: "function call without IRI".into(),
        })?;

        if distinct {
            // DISTINCT marks a custom aggregate invocation
            let expr = args.into_iter().next().ok_or_else(|| QueryError::Parse {
                line: 1,
                column: 1,
                message: "aggregate call without argument".into(),
            })?;
            return self.hoist_aggregate(
                Aggregate::Custom {
                    iri,
                    expr: Box::new(expr),
                    distinct: true,
                },
                aggs,
            );
        }

        Ok(Expression::FunctionCall { iri, args })
    }

    fn parse_builtin(
        &mut self,
        pair: Pair<'_, Rule>,
        aggs: &mut AggSink<'a, '_>,
    ) -> QueryResult<Expression<'a>> {
        use BuiltinFunction as F;

        let inner = only_inner(pair)?;
        let rule = inner.as_rule();

        if rule == Rule::BoundFunc {
            let var = first_rule(inner, Rule::Var)?;
            let var = self.parse_var(&var);
            return Ok(Expression::Builtin(F::Bound(var)));
        }

        let mut args = Vec::new();
        for part in inner.into_inner() {
            match part.as_rule() {
                Rule::Expression => args.push(self.parse_expression(part, aggs)?),
                Rule::ExpressionList => {
                    for expr in part.into_inner() {
                        if expr.as_rule() == Rule::Expression {
                            args.push(self.parse_expression(expr, aggs)?);
                        }
                    }
                }
                _ => {}
            }
        }
        let mut args = args.into_iter();
        let mut next = || {
            args.next().ok_or_else(|| QueryError::Parse {
                line: 1,
                column: 1,
                message: "missing builtin argument".into(),
            })
        };

        let builtin = match rule {
            Rule::StrFunc => F::Str(Box::new(next()?)),
            Rule::LangFunc => F::Lang(Box::new(next()?)),
            Rule::LangDirFunc => F::LangDir(Box::new(next()?)),
            Rule::LangMatchesFunc => F::LangMatches(Box::new(next()?), Box::new(next()?)),
            Rule::DatatypeFunc => F::Datatype(Box::new(next()?)),
            Rule::IriFunc | Rule::UriFunc => F::Iri(Box::new(next()?)),
            Rule::BNodeFunc => {
                let label = args.next();
                F::BNode(label.map(Box::new))
            }
            Rule::RandFunc => F::Rand,
            Rule::AbsFunc => F::Abs(Box::new(next()?)),
            Rule::CeilFunc => F::Ceil(Box::new(next()?)),
            Rule::FloorFunc => F::Floor(Box::new(next()?)),
            Rule::RoundFunc => F::Round(Box::new(next()?)),
            Rule::ConcatFunc => F::Concat(args.collect()),
            Rule::SubstrFunc => {
                let s = next()?;
                let start = next()?;
                let len = args.next();
                F::Substr(Box::new(s), Box::new(start), len.map(Box::new))
            }
            Rule::StrLenFunc => F::StrLen(Box::new(next()?)),
            Rule::ReplaceFunc => {
                let s = next()?;
                let pattern = next()?;
                let replacement = next()?;
                let flags = args.next();
                F::Replace(
                    Box::new(s),
                    Box::new(pattern),
                    Box::new(replacement),
                    flags.map(Box::new),
                )
            }
            Rule::RegexFunc => {
                let s = next()?;
                let pattern = next()?;
                let flags = args.next();
                F::Regex(Box::new(s), Box::new(pattern), flags.map(Box::new))
            }
            Rule::UCaseFunc => F::UCase(Box::new(next()?)),
            Rule::LCaseFunc => F::LCase(Box::new(next()?)),
            Rule::EncodeFunc => F::EncodeForUri(Box::new(next()?)),
            Rule::ContainsFunc => F::Contains(Box::new(next()?), Box::new(next()?)),
            Rule::StrStartsFunc => F::StrStarts(Box::new(next()?), Box::new(next()?)),
            Rule::StrEndsFunc => F::StrEnds(Box::new(next()?), Box::new(next()?)),
            Rule::StrBeforeFunc => F::StrBefore(Box::new(next()?), Box::new(next()?)),
            Rule::StrAfterFunc => F::StrAfter(Box::new(next()?), Box::new(next()?)),
            Rule::YearFunc => F::Year(Box::new(next()?)),
            Rule::MonthFunc => F::Month(Box::new(next()?)),
            Rule::DayFunc => F::Day(Box::new(next()?)),
            Rule::HoursFunc => F::Hours(Box::new(next()?)),
            Rule::MinutesFunc => F::Minutes(Box::new(next()?)),
            Rule::SecondsFunc => F::Seconds(Box::new(next()?)),
            Rule::TimezoneFunc => F::Timezone(Box::new(next()?)),
            Rule::TzFunc => F::Tz(Box::new(next()?)),
            Rule::NowFunc => F::Now,
            Rule::UuidFunc => F::Uuid,
            Rule::StrUuidFunc => F::StrUuid,
            Rule::CoalesceFunc => F::Coalesce(args.collect()),
            Rule::IfFunc => F::If(Box::new(next()?), Box::new(next()?), Box::new(next()?)),
            Rule::StrLangFunc => F::StrLang(Box::new(next()?), Box::new(next()?)),
            Rule::StrLangDirFunc => {
                F::StrLangDir(Box::new(next()?), Box::new(next()?), Box::new(next()?))
            }
            Rule::StrDtFunc => F::StrDt(Box::new(next()?), Box::new(next()?)),
            Rule::SameTermFunc => F::SameTerm(Box::new(next()?), Box::new(next()?)),
            Rule::IsIriFunc | Rule::IsUriFunc => F::IsIri(Box::new(next()?)),
            Rule::IsBlankFunc => F::IsBlank(Box::new(next()?)),
            Rule::IsLiteralFunc => F::IsLiteral(Box::new(next()?)),
            Rule::IsNumericFunc => F::IsNumeric(Box::new(next()?)),
            Rule::IsTripleFunc => F::IsTriple(Box::new(next()?)),
            Rule::TripleFunc => {
                F::TripleFn(Box::new(next()?), Box::new(next()?), Box::new(next()?))
            }
            Rule::SubjectFunc => F::SubjectFn(Box::new(next()?)),
            Rule::PredicateFunc => F::PredicateFn(Box::new(next()?)),
            Rule::ObjectFunc => F::ObjectFn(Box::new(next()?)),
            other => {
                return Err(QueryError::Parse {
                    line: 1,
                    column: 1,
                    message: format!("unhandled builtin {other:?}"),
                })
            }
        };
        Ok(Expression::Builtin(builtin))
    }

    // ---- updates --------------------------------------------------------

    fn parse_update_op(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Update<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::InsertDataOp => {
                let quads = self.parse_quad_data(inner, TermCtx::Data)?;
                ensure_concrete(&quads)?;
                Ok(Update::InsertData { quads })
            }
            Rule::DeleteDataOp => {
                let quads = self.parse_quad_data(inner, TermCtx::Data)?;
                ensure_concrete(&quads)?;
                Ok(Update::DeleteData { quads })
            }
            Rule::DeleteWhereOp => {
                let quads = self.parse_quad_data(inner, TermCtx::Pattern)?;
                Ok(Update::DeleteWhere { quads })
            }
            Rule::ModifyOp => {
                let mut delete = Vec::new();
                let mut insert = Vec::new();
                let mut pattern = Algebra::Bgp(Vec::new());
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::DeleteInsertClauses => {
                            for clause in part.into_inner() {
                                match clause.as_rule() {
                                    Rule::DeleteClause => {
                                        delete =
                                            self.parse_quad_data(clause, TermCtx::Pattern)?
                                    }
                                    Rule::InsertClause => {
                                        insert =
                                            self.parse_quad_data(clause, TermCtx::Pattern)?
                                    }
                                    _ => {}
                                }
                            }
                        }
                        Rule::GroupGraphPattern => {
                            pattern = self.parse_group_graph_pattern(part)?
                        }
                        _ => {}
                    }
                }
                Ok(Update::DeleteInsert {
                    delete,
                    insert,
                    pattern,
                })
            }
            Rule::LoadOp => {
                let mut silent = false;
                let mut source = "";
                let mut target = None;
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::SilentKw => silent = true,
                        Rule::IRIREF => {
                            source = self.dict.intern(strip_angles(part.as_str()))
                        }
                        Rule::iri => target = Some(self.parse_iri(part)?),
                        _ => {}
                    }
                }
                Ok(Update::Load {
                    source,
                    target,
                    silent,
                })
            }
            Rule::ClearOp => {
                let (target, silent) = self.parse_graph_ref(inner)?;
                Ok(Update::Clear { target, silent })
            }
            Rule::DropOp => {
                let (target, silent) = self.parse_graph_ref(inner)?;
                Ok(Update::Drop { target, silent })
            }
            Rule::CreateOp => {
                let mut silent = false;
                let mut graph = None;
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::SilentKw => silent = true,
                        Rule::iri => graph = Some(self.parse_iri(part)?),
                        _ => {}
                    }
                }
                let graph = graph.ok_or_else(|| QueryError::Parse {
                    line: 1,
                    column: 1,
                    message: "CREATE without graph".into(),
                })?;
                Ok(Update::Create { graph, silent })
            }
            Rule::CopyOp | Rule::MoveOp | Rule::AddGraphOp => {
                let rule = inner.as_rule();
                let mut silent = false;
                let mut targets = Vec::new();
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::SilentKw => silent = true,
                        Rule::GraphOrDefault => targets.push(self.parse_graph_or_default(part)?),
                        _ => {}
                    }
                }
                let mut targets = targets.into_iter();
                let from = targets.next().unwrap_or(GraphTarget::Default);
                let to = targets.next().unwrap_or(GraphTarget::Default);
                Ok(match rule {
                    Rule::CopyOp => Update::Copy { from, to, silent },
                    Rule::MoveOp => Update::Move { from, to, silent },
                    _ => Update::Add { from, to, silent },
                })
            }
            _ => Err(QueryError::Parse {
                line: 1,
                column: 1,
                message: "unknown update operation".into(),
            }),
        }
    }

    fn parse_graph_ref(
        &mut self,
        pair: Pair<'_, Rule>,
    ) -> QueryResult<(GraphTarget<'a>, bool)> {
        let mut silent = false;
        let mut target = GraphTarget::Default;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::SilentKw => silent = true,
                Rule::GraphRef => {
                    for inner in part.into_inner() {
                        match inner.as_rule() {
                            Rule::DefaultKw => target = GraphTarget::Default,
                            Rule::NamedKw => target = GraphTarget::AllNamed,
                            Rule::AllKw => target = GraphTarget::All,
                            Rule::iri => target = GraphTarget::Named(self.parse_iri(inner)?),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        Ok((target, silent))
    }

    fn parse_graph_or_default(&mut self, pair: Pair<'_, Rule>) -> QueryResult<GraphTarget<'a>> {
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::DefaultKw => return Ok(GraphTarget::Default),
                Rule::iri => return Ok(GraphTarget::Named(self.parse_iri(inner)?)),
                _ => {}
            }
        }
        Ok(GraphTarget::Default)
    }

    fn parse_quad_data(
        &mut self,
        pair: Pair<'_, Rule>,
        ctx: TermCtx,
    ) -> QueryResult<Vec<QuadPattern<'a>>> {
        let mut quads = Vec::new();
        for inner in pair.into_inner() {
            if inner.as_rule() != Rule::QuadData {
                continue;
            }
            for block in inner.into_inner() {
                if block.as_rule() != Rule::Quads {
                    continue;
                }
                for part in block.into_inner() {
                    match part.as_rule() {
                        Rule::TriplesBlock => {
                            for t in self.parse_triples_block(part, ctx)? {
                                quads.push(self.triple_to_quad(t, None)?);
                            }
                        }
                        Rule::QuadsNotTriples => {
                            let mut graph = None;
                            let mut triples = Vec::new();
                            for g in part.into_inner() {
                                match g.as_rule() {
                                    Rule::VarOrIri => {
                                        graph = Some(self.parse_var_or_iri(g)?)
                                    }
                                    Rule::TriplesBlock => {
                                        triples = self.parse_triples_block(g, ctx)?
                                    }
                                    _ => {}
                                }
                            }
                            for t in triples {
                                quads.push(self.triple_to_quad(t, graph.clone())?);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(quads)
    }

    fn triple_to_quad(
        &self,
        triple: TriplePattern<'a>,
        graph: Option<VarOrNode<'a>>,
    ) -> QueryResult<QuadPattern<'a>> {
        let predicate = match triple.predicate {
            PredicatePattern::Term(t) => t,
            PredicatePattern::Path(_) => {
                return Err(QueryError::BadPosition(
                    "property path in update quad pattern".into(),
                ))
            }
        };
        Ok(QuadPattern {
            subject: triple.subject,
            predicate,
            object: triple.object,
            graph,
        })
    }

    // ---- terminals ------------------------------------------------------

    fn parse_var(&self, pair: &Pair<'_, Rule>) -> VarName<'a> {
        VarName::new(self.dict.intern(&pair.as_str()[1..]))
    }

    fn parse_var_or_iri(&mut self, pair: Pair<'_, Rule>) -> QueryResult<VarOrNode<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::Var => Ok(VarOrNode::Var(self.parse_var(&inner))),
            Rule::iri => Ok(VarOrNode::Node(self.parse_iri(inner)?)),
            _ => Err(QueryError::Parse {
                line: 1,
                column: 1,
                message: "expected variable or IRI".into(),
            }),
        }
    }

    fn parse_iri(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Node<'a>> {
        let iri = self.parse_iri_str(pair)?;
        Ok(Node::iri(iri))
    }

    fn parse_iri_str(&mut self, pair: Pair<'_, Rule>) -> QueryResult<&'a str> {
        let (line, column) = pair.as_span().start_pos().line_col();
        let text = pair.as_str();
        let resolved = if text.starts_with('<') {
            let raw = strip_angles(text);
            match &self.base {
                Some(base) if !raw.contains(':') => format!("{base}{raw}"),
                _ => raw.to_string(),
            }
        } else {
            let colon = text.find(':').ok_or_else(|| QueryError::Parse {
                line,
                column,
                message: format!("malformed prefixed name '{text}'"),
            })?;
            let (prefix, local) = (&text[..colon], &text[colon + 1..]);
            let namespace = self.prefixes.get(prefix).ok_or_else(|| QueryError::Parse {
                line,
                column,
                message: format!("undefined prefix '{prefix}:'"),
            })?;
            format!("{namespace}{local}")
        };
        rdf_model::IriRef::parse(self.dict.intern(&resolved))
            .map(|iri| iri.as_str())
            .map_err(QueryError::Term)
    }

    fn parse_rdf_literal(&mut self, pair: Pair<'_, Rule>) -> QueryResult<Node<'a>> {
        let mut lexical = None;
        let mut language = None;
        let mut direction = None;
        let mut datatype = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::String => lexical = Some(unescape_string(inner.as_str())),
                Rule::LANGDIR => {
                    let tag = &inner.as_str()[1..];
                    match tag.split_once("--") {
                        Some((lang, dir)) => {
                            language = Some(lang.to_ascii_lowercase());
                            direction = Some(
                                Direction::parse(&dir.to_ascii_lowercase())
                                    .map_err(QueryError::Term)?,
                            );
                        }
                        None => language = Some(tag.to_ascii_lowercase()),
                    }
                }
                Rule::iri => datatype = Some(self.parse_iri_str(inner)?),
                _ => {}
            }
        }

        let lexical = self.dict.intern(&lexical.unwrap_or_default());
        Ok(match (language, direction, datatype) {
            (Some(lang), Some(dir), _) => {
                Node::literal_dir(lexical, self.dict.intern(&lang), dir)
            }
            (Some(lang), None, _) => Node::literal_lang(lexical, self.dict.intern(&lang)),
            (None, _, Some(dt)) => Node::literal_typed(lexical, dt),
            (None, _, None) => Node::literal_str(lexical),
        })
    }

    fn parse_numeric_literal(&self, pair: &Pair<'_, Rule>) -> Node<'a> {
        let text = pair.as_str();
        let datatype = if text.contains(['e', 'E']) {
            Vocabulary::XSD_DOUBLE
        } else if text.contains('.') {
            Vocabulary::XSD_DECIMAL
        } else {
            Vocabulary::XSD_INTEGER
        };
        Node::literal_typed(self.dict.intern(text), datatype)
    }

    fn parse_boolean_literal(&self, pair: &Pair<'_, Rule>) -> Node<'a> {
        let value = if pair.as_str().eq_ignore_ascii_case("true") {
            "true"
        } else {
            "false"
        };
        Node::literal_typed(self.dict.intern(value), Vocabulary::XSD_BOOLEAN)
    }
}

// ---- helper types -------------------------------------------------------

struct SelectClauseParts<'a> {
    distinct: bool,
    reduced: bool,
    all: bool,
    /// (expression, output variable, was a plain variable)
    items: Vec<(Expression<'a>, VarName<'a>, bool)>,
    aggregates: Vec<(VarName<'a>, Aggregate<'a>)>,
}

#[derive(Default)]
struct SolutionModifierParts<'a> {
    group: Option<Vec<GroupCond<'a>>>,
    having: Vec<HavingConstraint<'a>>,
    order: Vec<OrderCondition<'a>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

enum GroupCond<'a> {
    Var(VarName<'a>),
    Expr(Expression<'a>, VarName<'a>),
}

enum HavingConstraint<'a> {
    Ready(Expression<'a>),
    WithAggregates(Expression<'a>, Vec<(VarName<'a>, Aggregate<'a>)>),
}

// ---- helper functions ---------------------------------------------------

fn pest_error(err: pest::error::Error<Rule>) -> QueryError {
    let (line, column) = match err.line_col {
        pest::error::LineColLocation::Pos((l, c)) => (l, c),
        pest::error::LineColLocation::Span((l, c), _) => (l, c),
    };
    QueryError::Parse {
        line,
        column,
        message: err.variant.message().into_owned(),
    }
}

fn strip_angles(s: &str) -> &str {
    s.trim_start_matches('<').trim_end_matches('>')
}

fn only_inner(pair: Pair<'_, Rule>) -> QueryResult<Pair<'_, Rule>> {
    let (line, column) = pair.as_span().start_pos().line_col();
    pair.into_inner().next().ok_or(QueryError::Parse {
        line,
        column,
        message: "unexpected empty production".into(),
    })
}

fn first_rule(pair: Pair<'_, Rule>, rule: Rule) -> QueryResult<Pair<'_, Rule>> {
    let (line, column) = pair.as_span().start_pos().line_col();
    pair.into_inner()
        .find(|p| p.as_rule() == rule)
        .ok_or(QueryError::Parse {
            line,
            column,
            message: format!("missing {rule:?}"),
        })
}

fn parse_usize(pair: &Pair<'_, Rule>) -> QueryResult<usize> {
    let (line, column) = pair.as_span().start_pos().line_col();
    pair.as_str().parse().map_err(|_| QueryError::Parse {
        line,
        column,
        message: format!("invalid integer '{}'", pair.as_str()),
    })
}

fn required_expr<'a>(expr: Option<Expression<'a>>) -> QueryResult<Expression<'a>> {
    expr.ok_or_else(|| QueryError::Parse {
        line: 1,
        column: 1,
        message: "aggregate without expression".into(),
    })
}

/// Rewrite non-cast extension calls into custom aggregates
///
/// Only called on projection expressions of grouped queries; XSD casts
/// stay scalar.
fn hoist_custom_calls<'a>(
    parser: &mut SparqlParser<'a>,
    expr: &mut Expression<'a>,
    aggregates: &mut Vec<(VarName<'a>, Aggregate<'a>)>,
) {
    if let Expression::FunctionCall { iri, args } = expr {
        let iri_val: &'a str = iri;
        if !iri_val.starts_with(Vocabulary::XSD_NS) && args.len() == 1 {
            let inner = args.remove(0);
            parser.agg_counter += 1;
            let var = VarName::new(
                parser
                    .dict
                    .intern(&format!("__agg_{}", parser.agg_counter)),
            );
            aggregates.push((
                var,
                Aggregate::Custom {
                    iri: iri_val,
                    expr: Box::new(inner),
                    distinct: false,
                },
            ));
            *expr = Expression::Var(var);
            return;
        }
    }
    match expr {
        Expression::Or(a, b)
        | Expression::And(a, b)
        | Expression::Equal(a, b)
        | Expression::NotEqual(a, b)
        | Expression::Less(a, b)
        | Expression::Greater(a, b)
        | Expression::LessOrEqual(a, b)
        | Expression::GreaterOrEqual(a, b)
        | Expression::Add(a, b)
        | Expression::Subtract(a, b)
        | Expression::Multiply(a, b)
        | Expression::Divide(a, b) => {
            hoist_custom_calls(parser, a, aggregates);
            hoist_custom_calls(parser, b, aggregates);
        }
        Expression::Negate(a) | Expression::Not(a) => hoist_custom_calls(parser, a, aggregates),
        Expression::In(a, list) | Expression::NotIn(a, list) => {
            hoist_custom_calls(parser, a, aggregates);
            for item in list {
                hoist_custom_calls(parser, item, aggregates);
            }
        }
        Expression::FunctionCall { args, .. } => {
            for arg in args {
                hoist_custom_calls(parser, arg, aggregates);
            }
        }
        _ => {}
    }
}

fn ensure_concrete(quads: &[QuadPattern<'_>]) -> QueryResult<()> {
    for quad in quads {
        if let Some(var) = quad.first_var() {
            return Err(QueryError::VariableInData(var.name().to_string()));
        }
    }
    Ok(())
}

fn apply_rel_op<'a>(op: &str, left: Expression<'a>, right: Expression<'a>) -> Expression<'a> {
    let (left, right) = (Box::new(left), Box::new(right));
    match op {
        "=" => Expression::Equal(left, right),
        "!=" => Expression::NotEqual(left, right),
        "<" => Expression::Less(left, right),
        ">" => Expression::Greater(left, right),
        "<=" => Expression::LessOrEqual(left, right),
        _ => Expression::GreaterOrEqual(left, right),
    }
}

fn join_bgp<'a>(current: Option<Algebra<'a>>, patterns: Vec<TriplePattern<'a>>) -> Algebra<'a> {
    match current {
        // Consecutive triple blocks stay one BGP so join order follows
        // source order
        Some(Algebra::Bgp(mut existing)) => {
            existing.extend(patterns);
            Algebra::Bgp(existing)
        }
        Some(other) => Algebra::Join {
            left: Box::new(other),
            right: Box::new(Algebra::Bgp(patterns)),
        },
        None => Algebra::Bgp(patterns),
    }
}

fn join_algebra<'a>(current: Option<Algebra<'a>>, next: Algebra<'a>) -> Algebra<'a> {
    match current {
        Some(Algebra::Bgp(patterns)) if patterns.is_empty() => next,
        Some(left) => Algebra::Join {
            left: Box::new(left),
            right: Box::new(next),
        },
        None => next,
    }
}

fn wrap_order<'a>(pattern: Algebra<'a>, order: Vec<OrderCondition<'a>>) -> Algebra<'a> {
    if order.is_empty() {
        pattern
    } else {
        Algebra::OrderBy {
            conditions: order,
            input: Box::new(pattern),
        }
    }
}

fn fold_paths<'a>(
    mut paths: Vec<PropertyPath<'a>>,
    combine: fn(Box<PropertyPath<'a>>, Box<PropertyPath<'a>>) -> PropertyPath<'a>,
) -> QueryResult<PropertyPath<'a>> {
    match paths.len() {
        0 => Err(QueryError::Parse {
            line: 1,
            column: 1,
            message: "empty property path".into(),
        }),
        1 => Ok(paths.remove(0)),
        _ => {
            let mut iter = paths.into_iter();
            let mut acc = iter.next().ok_or_else(|| QueryError::Parse {
                line: 1,
                column: 1,
                message: "empty property path".into(),
            })?;
            for next in iter {
                acc = combine(Box::new(acc), Box::new(next));
            }
            Ok(acc)
        }
    }
}

/// Strip quotes and process escape sequences of a string token
fn unescape_string(token: &str) -> String {
    let inner = if token.len() >= 2 {
        &token[1..token.len() - 1]
    } else {
        token
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => push_unicode_escape(&mut chars, 4, &mut out),
            Some('U') => push_unicode_escape(&mut chars, 8, &mut out),
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

fn push_unicode_escape(chars: &mut std::str::Chars<'_>, len: usize, out: &mut String) {
    let hex: String = chars.by_ref().take(len).collect();
    if let Ok(code) = u32::from_str_radix(&hex, 16) {
        if let Some(c) = char::from_u32(code) {
            out.push(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Query<'static> {
        let dict = Arc::new(Dictionary::new());
        SparqlParser::new(dict).parse_query(text).unwrap()
    }

    fn parser() -> SparqlParser<'static> {
        SparqlParser::new(Arc::new(Dictionary::new()))
    }

    #[test]
    fn select_bgp_join() {
        let query = parse(
            "PREFIX ex: <http://example.org/> \
             PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> \
             SELECT ?t ?l WHERE { ?t rdf:type ex:Task . ?t ex:label ?l }",
        );
        let Query::Select { pattern, projection, .. } = query else {
            panic!("expected SELECT");
        };
        assert_eq!(
            projection,
            Projection::Variables(vec![VarName::new("t"), VarName::new("l")])
        );
        // Project wraps the two-pattern BGP
        let Algebra::Project { input, .. } = pattern else {
            panic!("expected projection node");
        };
        let Algebra::Bgp(patterns) = *input else {
            panic!("expected BGP, got {input:?}");
        };
        assert_eq!(patterns.len(), 2);
    }

    #[test]
    fn quoted_triple_pattern() {
        let query = parse(
            "PREFIX ex: <http://example.org/> \
             SELECT ?who WHERE { << ?who ex:knows ex:bob >> ex:source ex:wikipedia }",
        );
        let Query::Select { pattern, .. } = query else {
            panic!("expected SELECT");
        };
        let Algebra::Project { input, .. } = pattern else {
            panic!("expected projection node");
        };
        let Algebra::Bgp(patterns) = *input else {
            panic!("expected BGP");
        };
        assert!(matches!(patterns[0].subject, TermPattern::Quoted(_)));
    }

    #[test]
    fn property_path_plus() {
        let query = parse(
            "PREFIX ex: <http://example.org/> SELECT ?a WHERE { ex:task1 ex:parent+ ?a }",
        );
        let Query::Select { pattern, .. } = query else {
            panic!("expected SELECT");
        };
        let Algebra::Project { input, .. } = pattern else {
            panic!("expected projection node");
        };
        let Algebra::Bgp(patterns) = *input else {
            panic!("expected BGP");
        };
        assert!(matches!(
            patterns[0].predicate,
            PredicatePattern::Path(PropertyPath::OneOrMore(_))
        ));
    }

    #[test]
    fn path_modifier_does_not_eat_variable() {
        let query = parse(
            "PREFIX ex: <http://example.org/> SELECT ?o WHERE { ex:s ex:p ?o }",
        );
        let Query::Select { pattern, .. } = query else {
            panic!("expected SELECT");
        };
        let Algebra::Project { input, .. } = pattern else {
            panic!("expected projection node");
        };
        let Algebra::Bgp(patterns) = *input else {
            panic!("expected BGP");
        };
        assert!(matches!(
            patterns[0].predicate,
            PredicatePattern::Term(TermPattern::Node(_))
        ));
        assert!(matches!(patterns[0].object, TermPattern::Var(_)));
    }

    #[test]
    fn directional_literal_round_trips_through_algebra() {
        let query = parse(
            "PREFIX ex: <http://example.org/> \
             SELECT ?s WHERE { ?s ex:label \"مرحبا\"@ar--rtl }",
        );
        let Query::Select { pattern, .. } = query else {
            panic!("expected SELECT");
        };
        let Algebra::Project { input, .. } = pattern else {
            panic!("expected projection node");
        };
        let Algebra::Bgp(patterns) = *input else {
            panic!("expected BGP");
        };
        let TermPattern::Node(Node::Literal(lit)) = &patterns[0].object else {
            panic!("expected literal object");
        };
        assert_eq!(lit.language, Some("ar"));
        assert_eq!(lit.direction, Some(Direction::Rtl));
    }

    #[test]
    fn aggregates_are_hoisted_into_group() {
        let query = parse(
            "PREFIX ex: <http://example.org/> \
             SELECT (COUNT(*) AS ?n) (SUM(?x) AS ?s) WHERE { ?t ex:p ?x }",
        );
        let Query::Select { pattern, .. } = query else {
            panic!("expected SELECT");
        };
        // Project > Extend(?s) > Extend(?n) > Group
        let mut current = pattern;
        let mut found_group = false;
        loop {
            match current {
                Algebra::Project { input, .. }
                | Algebra::Extend { input, .. }
                | Algebra::Filter { input, .. } => current = *input,
                Algebra::Group {
                    ref vars,
                    ref aggregates,
                    ..
                } => {
                    assert!(vars.is_empty());
                    assert_eq!(aggregates.len(), 2);
                    found_group = true;
                    break;
                }
                other => panic!("unexpected node {other:?}"),
            }
        }
        assert!(found_group);
    }

    #[test]
    fn blank_nodes_in_patterns_become_variables() {
        let query = parse(
            "PREFIX ex: <http://example.org/> SELECT ?o WHERE { _:b ex:p ?o }",
        );
        let Query::Select { pattern, .. } = query else {
            panic!("expected SELECT");
        };
        let Algebra::Project { input, .. } = pattern else {
            panic!("expected projection node");
        };
        let Algebra::Bgp(patterns) = *input else {
            panic!("expected BGP");
        };
        let TermPattern::Var(v) = &patterns[0].subject else {
            panic!("expected hidden variable subject");
        };
        assert!(v.name().starts_with("__bnode_"));
    }

    #[test]
    fn insert_data_rejects_variables() {
        let err = parser()
            .parse_update("INSERT DATA { ?s <http://p> <http://o> }")
            .unwrap_err();
        assert!(matches!(err, QueryError::VariableInData(_)));
    }

    #[test]
    fn update_request_with_multiple_operations() {
        let request = parser()
            .parse_update(
                "PREFIX ex: <http://example.org/> \
                 INSERT DATA { ex:a ex:p ex:b } ; \
                 DELETE DATA { ex:a ex:p ex:b }",
            )
            .unwrap();
        assert_eq!(request.operations.len(), 2);
        assert!(matches!(request.operations[0], Update::InsertData { .. }));
        assert!(matches!(request.operations[1], Update::DeleteData { .. }));
    }

    #[test]
    fn named_graph_insert_data() {
        let request = parser()
            .parse_update(
                "INSERT DATA { GRAPH <http://g> { <http://s> <http://p> <http://o> } }",
            )
            .unwrap();
        let Update::InsertData { quads } = &request.operations[0] else {
            panic!("expected INSERT DATA");
        };
        assert_eq!(quads.len(), 1);
        assert!(quads[0].graph.is_some());
    }

    #[test]
    fn parse_error_carries_location() {
        let err = parser()
            .parse_query("SELECT ?x WHERE { ?x <http://p ")
            .unwrap_err();
        match err {
            QueryError::Parse { line, .. } => assert!(line >= 1),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn undefined_prefix_is_reported() {
        let err = parser()
            .parse_query("SELECT ?x WHERE { ?x ex:p ?y }")
            .unwrap_err();
        match err {
            QueryError::Parse { message, .. } => assert!(message.contains("undefined prefix")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn values_clause() {
        let query = parse(
            "SELECT ?x WHERE { VALUES ?x { <http://a> <http://b> UNDEF } }",
        );
        let Query::Select { pattern, .. } = query else {
            panic!("expected SELECT");
        };
        let Algebra::Project { input, .. } = pattern else {
            panic!("expected projection node");
        };
        let Algebra::Table { vars, rows } = *input else {
            panic!("expected VALUES table, got {input:?}");
        };
        assert_eq!(vars.len(), 1);
        assert_eq!(rows.len(), 3);
        assert!(rows[2][0].is_none());
    }

    #[test]
    fn construct_template_rejects_paths() {
        let err = parser()
            .parse_query(
                "PREFIX ex: <http://example.org/> \
                 CONSTRUCT { ?s ex:p+ ?o } WHERE { ?s ex:p ?o }",
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::BadPosition(_)));
    }

    #[test]
    fn lateral_group() {
        let query = parse(
            "PREFIX ex: <http://example.org/> \
             SELECT ?s ?l WHERE { ?s ex:p ?o LATERAL { ?s ex:label ?l } }",
        );
        let Query::Select { pattern, .. } = query else {
            panic!("expected SELECT");
        };
        let Algebra::Project { input, .. } = pattern else {
            panic!("expected projection node");
        };
        assert!(matches!(*input, Algebra::Lateral { .. }));
    }
}

#[cfg(test)]
mod scratch_debug {
    use super::*;
    #[test]
    fn debug_dump() {
        let q = "PREFIX ex: <http://example.org/> SELECT ?a WHERE { ex:task1 ex:parent+ ?a }";
        match PestSparql::parse(Rule::QueryUnit, q) {
            Ok(pairs) => {
                for p in pairs.flatten() {
                    eprintln!("{:?} -> {:?}", p.as_rule(), p.as_str());
                }
            }
            Err(e) => eprintln!("ERR {:?}", e),
        }
    }
}
