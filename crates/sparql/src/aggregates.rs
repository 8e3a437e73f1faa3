//! Grouping and aggregate evaluation
//!
//! Groups are keyed on the canonical text of the GROUP BY projection.
//! Built-in aggregates follow the result typing contract: COUNT is
//! `xsd:integer`, SUM and AVG are `xsd:decimal`, MIN/MAX/SAMPLE keep the
//! winning term (numeric type included), GROUP_CONCAT is a plain string.
//! Extension aggregates resolve through [`AggregateRegistry`], user
//! registrations first, packaged extensions second.

use crate::algebra::{Aggregate, Expression};
use crate::{Binding, BindingSet, Executor, QueryError, QueryResult};
use rdf_model::{Dictionary, Node, VarName, Vocabulary};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::expression::format_decimal;

/// Running state of a custom aggregate
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateState {
    /// Nothing accumulated yet
    Empty,
    /// A running count
    Count(u64),
    /// A running sum with its count
    Sum {
        /// Accumulated total
        total: f64,
        /// Number of accumulated values
        count: u64,
    },
    /// All numeric values seen (median, variance)
    Numbers(Vec<f64>),
    /// All string values seen
    Texts(Vec<String>),
}

/// Custom aggregate: init / step / finalize callbacks
pub struct CustomAggregate<'a> {
    /// Produce the initial state
    pub init: Box<dyn Fn() -> AggregateState + Send + Sync>,
    /// Fold one value into the state (non-matching values are skipped
    /// by returning the state unchanged)
    pub step: Box<dyn Fn(AggregateState, &Node<'a>) -> AggregateState + Send + Sync>,
    /// Turn the final state into a literal (None leaves the variable unbound)
    pub finalize: Box<dyn Fn(AggregateState, &Dictionary) -> Option<Node<'a>> + Send + Sync>,
}

/// Registry of extension aggregates keyed by IRI
///
/// Lookup consults user registrations before the packaged extensions, so a
/// host can shadow `median` or `variance` with its own version.
pub struct AggregateRegistry<'a> {
    user: FxHashMap<String, CustomAggregate<'a>>,
    builtins: FxHashMap<String, CustomAggregate<'a>>,
}

/// IRI of the packaged median extension aggregate
pub const MEDIAN_IRI: &str = "https://vaultkg.org/aggregates#median";
/// IRI of the packaged variance extension aggregate
pub const VARIANCE_IRI: &str = "https://vaultkg.org/aggregates#variance";

impl<'a> AggregateRegistry<'a> {
    /// Registry with the packaged extensions (median, variance)
    pub fn with_extensions() -> Self {
        let mut builtins = FxHashMap::default();
        builtins.insert(MEDIAN_IRI.to_string(), median_aggregate());
        builtins.insert(VARIANCE_IRI.to_string(), variance_aggregate());
        Self {
            user: FxHashMap::default(),
            builtins,
        }
    }

    /// Empty registry (no packaged extensions)
    pub fn new() -> Self {
        Self {
            user: FxHashMap::default(),
            builtins: FxHashMap::default(),
        }
    }

    /// Register a user aggregate under its IRI
    pub fn register(&mut self, iri: &str, aggregate: CustomAggregate<'a>) {
        self.user.insert(iri.to_string(), aggregate);
    }

    /// Remove a user registration
    pub fn unregister(&mut self, iri: &str) -> bool {
        self.user.remove(iri).is_some()
    }

    /// Resolve an IRI, user registrations first
    pub fn resolve(&self, iri: &str) -> Option<&CustomAggregate<'a>> {
        self.user.get(iri).or_else(|| self.builtins.get(iri))
    }
}

impl<'a> Default for AggregateRegistry<'a> {
    fn default() -> Self {
        Self::with_extensions()
    }
}

fn numeric_of(node: &Node<'_>) -> Option<f64> {
    match node {
        Node::Literal(lit) if lit.language.is_none() => match lit.datatype {
            Some(dt) if Vocabulary::is_numeric_datatype(dt) => lit.lexical.parse().ok(),
            _ => None,
        },
        _ => None,
    }
}

fn median_aggregate<'a>() -> CustomAggregate<'a> {
    CustomAggregate {
        init: Box::new(|| AggregateState::Numbers(Vec::new())),
        step: Box::new(|state, value| match (state, numeric_of(value)) {
            (AggregateState::Numbers(mut values), Some(n)) => {
                values.push(n);
                AggregateState::Numbers(values)
            }
            (state, _) => state,
        }),
        finalize: Box::new(|state, dict| match state {
            AggregateState::Numbers(mut values) if !values.is_empty() => {
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = values.len() / 2;
                let median = if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                };
                Some(Node::literal_typed(
                    dict.intern(&format_decimal(median)),
                    Vocabulary::XSD_DECIMAL,
                ))
            }
            _ => None,
        }),
    }
}

fn variance_aggregate<'a>() -> CustomAggregate<'a> {
    CustomAggregate {
        init: Box::new(|| AggregateState::Numbers(Vec::new())),
        step: Box::new(|state, value| match (state, numeric_of(value)) {
            (AggregateState::Numbers(mut values), Some(n)) => {
                values.push(n);
                AggregateState::Numbers(values)
            }
            (state, _) => state,
        }),
        finalize: Box::new(|state, dict| match state {
            AggregateState::Numbers(values) if !values.is_empty() => {
                let count = values.len() as f64;
                let mean = values.iter().sum::<f64>() / count;
                let variance =
                    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;
                Some(Node::literal_typed(
                    dict.intern(&format_decimal(variance)),
                    Vocabulary::XSD_DECIMAL,
                ))
            }
            _ => None,
        }),
    }
}

impl<'a, 's> Executor<'a, 's> {
    /// Group the input and evaluate the aggregates per group
    pub(crate) fn eval_group(
        &self,
        vars: &[VarName<'a>],
        aggregates: &[(VarName<'a>, Aggregate<'a>)],
        input: BindingSet<'a>,
    ) -> QueryResult<BindingSet<'a>> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: FxHashMap<String, (Binding<'a>, Vec<Binding<'a>>)> =
            FxHashMap::default();

        for row in input.into_iter() {
            self.control.check()?;
            let key_binding = row.project(vars);
            let key = key_binding.canonical_key();
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    (key_binding, Vec::new())
                })
                .1
                .push(row);
        }

        let mut out = BindingSet::new();

        // Aggregates over an empty input with no GROUP BY still produce
        // one row of zero values
        if groups.is_empty() {
            if vars.is_empty() && !aggregates.is_empty() {
                let mut row = Binding::new();
                for (var, aggregate) in aggregates {
                    if let Some(value) = self.aggregate_zero(aggregate)? {
                        row.bind(*var, value);
                    }
                }
                out.add(row);
            }
            return Ok(out);
        }

        for key in order {
            let Some((key_binding, rows)) = groups.remove(&key) else {
                continue;
            };
            self.control.check()?;
            // Only GROUP BY variables and aggregate outputs leave the group
            let mut result = key_binding;
            for (var, aggregate) in aggregates {
                if let Some(value) = self.eval_aggregate(aggregate, &rows)? {
                    result.bind(*var, value);
                }
            }
            out.add(result);
        }
        Ok(out)
    }

    /// Evaluate one aggregate over the rows of a group
    fn eval_aggregate(
        &self,
        aggregate: &Aggregate<'a>,
        rows: &[Binding<'a>],
    ) -> QueryResult<Option<Node<'a>>> {
        match aggregate {
            Aggregate::Count { expr, distinct } => match expr {
                None => {
                    if *distinct {
                        let mut seen = FxHashSet::default();
                        let count = rows
                            .iter()
                            .filter(|row| seen.insert(row.canonical_key()))
                            .count();
                        Ok(Some(self.integer_node(count as i64)))
                    } else {
                        Ok(Some(self.integer_node(rows.len() as i64)))
                    }
                }
                Some(expr) => {
                    let values = self.aggregate_values(expr, rows, *distinct)?;
                    Ok(Some(self.integer_node(values.len() as i64)))
                }
            },

            Aggregate::Sum { expr, distinct } => {
                let values = self.aggregate_values(expr, rows, *distinct)?;
                let total: f64 = values.iter().filter_map(numeric_of).sum();
                Ok(Some(self.decimal_node(total)))
            }

            Aggregate::Avg { expr, distinct } => {
                let values = self.aggregate_values(expr, rows, *distinct)?;
                let numbers: Vec<f64> = values.iter().filter_map(numeric_of).collect();
                if numbers.is_empty() {
                    Ok(Some(self.decimal_node(0.0)))
                } else {
                    let avg = numbers.iter().sum::<f64>() / numbers.len() as f64;
                    Ok(Some(self.decimal_node(avg)))
                }
            }

            Aggregate::Min { expr, distinct } | Aggregate::Max { expr, distinct } => {
                let take_min = matches!(aggregate, Aggregate::Min { .. });
                let values = self.aggregate_values(expr, rows, *distinct)?;
                let mut best: Option<Node<'a>> = None;
                for value in values {
                    best = Some(match best {
                        None => value,
                        Some(current) => {
                            let ordering = self.compare_terms(&value, &current);
                            let wins = if take_min {
                                ordering.is_lt()
                            } else {
                                ordering.is_gt()
                            };
                            if wins {
                                value
                            } else {
                                current
                            }
                        }
                    });
                }
                // MIN/MAX keep numeric literals as-is, other terms become strings
                Ok(best.map(|node| match node {
                    Node::Literal(_) => node,
                    other => self.string_form(&other),
                }))
            }

            Aggregate::Sample { expr, distinct } => {
                let values = self.aggregate_values(expr, rows, *distinct)?;
                Ok(values.into_iter().next())
            }

            Aggregate::GroupConcat {
                expr,
                separator,
                distinct,
            } => {
                let values = self.aggregate_values(expr, rows, *distinct)?;
                let parts: Vec<&str> = values
                    .iter()
                    .filter_map(|v| self.string_value(v))
                    .collect();
                let joined = parts.join(separator.unwrap_or(" "));
                Ok(Some(Node::literal_str(self.dict.intern(&joined))))
            }

            Aggregate::Custom {
                iri,
                expr,
                distinct,
            } => {
                let registry = self
                    .aggregates
                    .ok_or_else(|| QueryError::UnknownAggregate((*iri).to_string()))?;
                let custom = registry
                    .resolve(iri)
                    .ok_or_else(|| QueryError::UnknownAggregate((*iri).to_string()))?;
                let values = self.aggregate_values(expr, rows, *distinct)?;
                let mut state = (custom.init)();
                for value in &values {
                    state = (custom.step)(state, value);
                }
                Ok((custom.finalize)(state, self.dict))
            }
        }
    }

    /// Values of an expression over a group
    ///
    /// Evaluation errors drop the single value, per the propagation policy.
    fn aggregate_values(
        &self,
        expr: &Expression<'a>,
        rows: &[Binding<'a>],
        distinct: bool,
    ) -> QueryResult<Vec<Node<'a>>> {
        let mut values = Vec::new();
        let mut seen = FxHashSet::default();
        for row in rows {
            self.control.check()?;
            if let Ok(Some(value)) = self.eval_expression(expr, row) {
                if distinct && !seen.insert(value.to_string()) {
                    continue;
                }
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Zero value of an aggregate for the empty-group row
    ///
    /// String-typed aggregates yield a single space because literal
    /// lexical forms are non-empty.
    fn aggregate_zero(&self, aggregate: &Aggregate<'a>) -> QueryResult<Option<Node<'a>>> {
        Ok(match aggregate {
            Aggregate::Count { .. } => Some(self.integer_node(0)),
            Aggregate::Sum { .. } | Aggregate::Avg { .. } => Some(self.decimal_node(0.0)),
            Aggregate::Min { .. }
            | Aggregate::Max { .. }
            | Aggregate::Sample { .. }
            | Aggregate::GroupConcat { .. } => Some(Node::literal_str(" ")),
            Aggregate::Custom { iri, .. } => {
                let registry = self
                    .aggregates
                    .ok_or_else(|| QueryError::UnknownAggregate((*iri).to_string()))?;
                let custom = registry
                    .resolve(iri)
                    .ok_or_else(|| QueryError::UnknownAggregate((*iri).to_string()))?;
                (custom.finalize)((custom.init)(), self.dict)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Algebra, TermPattern, TriplePattern};
    use graph_store::TripleStore;
    use rdf_model::Triple;

    fn scores_store() -> TripleStore<'static> {
        let mut store = TripleStore::new();
        let dict = store.dictionary().clone();
        for (task, score) in [("task1", "2"), ("task2", "4"), ("task3", "6")] {
            store.add(
                Triple::try_new(
                    Node::iri(dict.intern(&format!("http://example.org/{task}"))),
                    Node::iri(dict.intern("http://example.org/score")),
                    Node::literal_typed(dict.intern(score), Vocabulary::XSD_INTEGER),
                )
                .unwrap(),
            );
        }
        store
    }

    fn score_bgp() -> Algebra<'static> {
        Algebra::Bgp(vec![TriplePattern::new(
            TermPattern::Var(VarName::new("s")),
            TermPattern::Node(Node::iri("http://example.org/score")),
            TermPattern::Var(VarName::new("x")),
        )])
    }

    fn group_all(aggregates: Vec<(VarName<'static>, Aggregate<'static>)>) -> Algebra<'static> {
        Algebra::Group {
            vars: vec![],
            aggregates,
            input: Box::new(score_bgp()),
        }
    }

    #[test]
    fn count_and_sum_over_group() {
        let store = scores_store();
        let registry = AggregateRegistry::with_extensions();
        let executor = Executor::new(&store).with_aggregates(&registry);

        let algebra = group_all(vec![
            (
                VarName::new("n"),
                Aggregate::Count {
                    expr: None,
                    distinct: false,
                },
            ),
            (
                VarName::new("total"),
                Aggregate::Sum {
                    expr: Box::new(Expression::Var(VarName::new("x"))),
                    distinct: false,
                },
            ),
        ]);

        let rows = executor.execute(&algebra).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows.rows()[0];

        let n = row.get(&VarName::new("n")).unwrap().as_literal().unwrap();
        assert_eq!(n.lexical, "3");
        assert_eq!(n.datatype, Some(Vocabulary::XSD_INTEGER));

        let total = row
            .get(&VarName::new("total"))
            .unwrap()
            .as_literal()
            .unwrap();
        assert_eq!(total.lexical, "12");
        assert_eq!(total.datatype, Some(Vocabulary::XSD_DECIMAL));
    }

    #[test]
    fn empty_input_yields_zero_row() {
        let store = TripleStore::new();
        let executor = Executor::new(&store);

        let algebra = group_all(vec![
            (
                VarName::new("n"),
                Aggregate::Count {
                    expr: None,
                    distinct: false,
                },
            ),
            (
                VarName::new("s"),
                Aggregate::Sum {
                    expr: Box::new(Expression::Var(VarName::new("x"))),
                    distinct: false,
                },
            ),
        ]);

        let rows = executor.execute(&algebra).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows.rows()[0];
        assert_eq!(
            row.get(&VarName::new("n")).unwrap().as_literal().unwrap().lexical,
            "0"
        );
        let sum = row.get(&VarName::new("s")).unwrap().as_literal().unwrap();
        assert_eq!(sum.lexical, "0");
        assert_eq!(sum.datatype, Some(Vocabulary::XSD_DECIMAL));
    }

    #[test]
    fn group_output_contains_only_group_and_aggregate_vars() {
        let store = scores_store();
        let executor = Executor::new(&store);

        let algebra = Algebra::Group {
            vars: vec![VarName::new("s")],
            aggregates: vec![(
                VarName::new("n"),
                Aggregate::Count {
                    expr: None,
                    distinct: false,
                },
            )],
            input: Box::new(score_bgp()),
        };

        let rows = executor.execute(&algebra).unwrap();
        assert_eq!(rows.len(), 3);
        for row in rows.iter() {
            assert!(row.contains(&VarName::new("s")));
            assert!(row.contains(&VarName::new("n")));
            // ?x must not leak through the group
            assert!(!row.contains(&VarName::new("x")));
        }
    }

    #[test]
    fn group_concat_with_separator() {
        let store = scores_store();
        let executor = Executor::new(&store);

        let algebra = group_all(vec![(
            VarName::new("all"),
            Aggregate::GroupConcat {
                expr: Box::new(Expression::Var(VarName::new("x"))),
                separator: Some(", "),
                distinct: false,
            },
        )]);

        let rows = executor.execute(&algebra).unwrap();
        let joined = rows.rows()[0]
            .get(&VarName::new("all"))
            .unwrap()
            .as_literal()
            .unwrap()
            .lexical;
        // Values of one subject each; order follows the BGP enumeration
        assert_eq!(joined.split(", ").count(), 3);
    }

    #[test]
    fn median_extension_aggregate() {
        let store = scores_store();
        let registry = AggregateRegistry::with_extensions();
        let executor = Executor::new(&store).with_aggregates(&registry);

        let algebra = group_all(vec![(
            VarName::new("m"),
            Aggregate::Custom {
                iri: MEDIAN_IRI,
                expr: Box::new(Expression::Var(VarName::new("x"))),
                distinct: false,
            },
        )]);

        let rows = executor.execute(&algebra).unwrap();
        let median = rows.rows()[0]
            .get(&VarName::new("m"))
            .unwrap()
            .as_literal()
            .unwrap();
        assert_eq!(median.lexical, "4");
    }

    #[test]
    fn unknown_aggregate_is_reported() {
        let store = scores_store();
        let registry = AggregateRegistry::with_extensions();
        let executor = Executor::new(&store).with_aggregates(&registry);

        let algebra = group_all(vec![(
            VarName::new("m"),
            Aggregate::Custom {
                iri: "http://example.org/nope",
                expr: Box::new(Expression::Var(VarName::new("x"))),
                distinct: false,
            },
        )]);

        assert!(matches!(
            executor.execute(&algebra),
            Err(QueryError::UnknownAggregate(_))
        ));
    }

    #[test]
    fn user_registration_shadows_builtin() {
        let mut registry = AggregateRegistry::with_extensions();
        registry.register(
            MEDIAN_IRI,
            CustomAggregate {
                init: Box::new(|| AggregateState::Count(0)),
                step: Box::new(|state, _| match state {
                    AggregateState::Count(n) => AggregateState::Count(n + 1),
                    other => other,
                }),
                finalize: Box::new(|state, dict| match state {
                    AggregateState::Count(n) => Some(Node::literal_typed(
                        dict.intern(&n.to_string()),
                        Vocabulary::XSD_INTEGER,
                    )),
                    _ => None,
                }),
            },
        );

        let store = scores_store();
        let executor = Executor::new(&store).with_aggregates(&registry);
        let algebra = group_all(vec![(
            VarName::new("m"),
            Aggregate::Custom {
                iri: MEDIAN_IRI,
                expr: Box::new(Expression::Var(VarName::new("x"))),
                distinct: false,
            },
        )]);

        let rows = executor.execute(&algebra).unwrap();
        let value = rows.rows()[0]
            .get(&VarName::new("m"))
            .unwrap()
            .as_literal()
            .unwrap();
        // The user version counts instead of computing a median
        assert_eq!(value.lexical, "3");
    }
}
