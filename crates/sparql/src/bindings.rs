//! Solution mappings and result sets
//!
//! A [`Binding`] is a partial function from variables to terms - one row of
//! a SPARQL result. [`BindingSet`] is the materialized multiset the
//! executors pass between operators; [`Solutions`] is the streaming view
//! handed to callers, with a control check between yields.

use crate::{ExecControl, QueryResult};
use rdf_model::{Node, VarName};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::fmt;

/// One solution mapping (variables to terms, sorted by variable name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding<'a> {
    entries: BTreeMap<VarName<'a>, Node<'a>>,
}

impl<'a> Binding<'a> {
    /// Empty mapping
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Build from (variable, term) pairs
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (VarName<'a>, Node<'a>)>,
    {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    /// Bind a variable
    ///
    /// Returns `true` when compatible (unbound, or bound to the same term);
    /// `false` leaves the mapping unchanged.
    pub fn bind(&mut self, var: VarName<'a>, node: Node<'a>) -> bool {
        match self.entries.get(&var) {
            Some(existing) => existing == &node,
            None => {
                self.entries.insert(var, node);
                true
            }
        }
    }

    /// Term bound to a variable
    pub fn get(&self, var: &VarName<'a>) -> Option<&Node<'a>> {
        self.entries.get(var)
    }

    /// Term bound to a variable, looked up by plain name
    pub fn get_named(&self, name: &str) -> Option<&Node<'a>> {
        self.entries.get(name)
    }

    /// Whether the variable is bound
    pub fn contains(&self, var: &VarName<'a>) -> bool {
        self.entries.contains_key(var)
    }

    /// Bound variables in name order
    pub fn variables(&self) -> impl Iterator<Item = &VarName<'a>> {
        self.entries.keys()
    }

    /// (variable, term) pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&VarName<'a>, &Node<'a>)> {
        self.entries.iter()
    }

    /// Number of bound variables
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union with another mapping, or `None` when incompatible
    pub fn merge(&self, other: &Binding<'a>) -> Option<Binding<'a>> {
        let mut merged = self.clone();
        for (var, node) in other.iter() {
            if !merged.bind(*var, node.clone()) {
                return None;
            }
        }
        Some(merged)
    }

    /// Whether the two mappings agree on every shared variable
    pub fn compatible_with(&self, other: &Binding<'a>) -> bool {
        self.entries
            .iter()
            .all(|(var, node)| other.get(var).map_or(true, |n| n == node))
    }

    /// Whether the two mappings share at least one variable
    pub fn shares_domain_with(&self, other: &Binding<'a>) -> bool {
        self.entries.keys().any(|var| other.contains(var))
    }

    /// Keep only the listed variables
    pub fn project(&self, vars: &[VarName<'a>]) -> Binding<'a> {
        Binding {
            entries: vars
                .iter()
                .filter_map(|var| self.get(var).map(|node| (*var, node.clone())))
                .collect(),
        }
    }

    /// Drop variables whose names mark them internal (`__` prefix)
    pub fn without_internal(&self) -> Binding<'a> {
        Binding {
            entries: self
                .entries
                .iter()
                .filter(|(var, _)| !var.name().starts_with("__"))
                .map(|(var, node)| (*var, node.clone()))
                .collect(),
        }
    }

    /// Overwrite-or-insert a binding (EXTEND semantics)
    pub fn extend(&mut self, var: VarName<'a>, node: Node<'a>) {
        self.entries.insert(var, node);
    }

    /// Canonical text of this row, used for DISTINCT and group keys
    pub fn canonical_key(&self) -> String {
        let mut key = String::new();
        for (var, node) in &self.entries {
            key.push('?');
            key.push_str(var.name());
            key.push('=');
            key.push_str(&node.to_string());
            key.push('\u{1f}');
        }
        key
    }
}

impl<'a> Default for Binding<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> fmt::Display for Binding<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for (i, (var, node)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{var} = {node}")?;
        }
        write!(f, " }}")
    }
}

/// Materialized multiset of solutions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindingSet<'a> {
    rows: Vec<Binding<'a>>,
}

impl<'a> BindingSet<'a> {
    /// Empty set (the join zero)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set holding one empty mapping (the join identity)
    pub fn unit() -> Self {
        Self {
            rows: vec![Binding::new()],
        }
    }

    /// Wrap existing rows
    pub fn from_rows(rows: Vec<Binding<'a>>) -> Self {
        Self { rows }
    }

    /// Append a row
    pub fn add(&mut self, binding: Binding<'a>) {
        self.rows.push(binding);
    }

    /// The rows, in order
    pub fn rows(&self) -> &[Binding<'a>] {
        &self.rows
    }

    /// Mutable row access
    pub fn rows_mut(&mut self) -> &mut Vec<Binding<'a>> {
        &mut self.rows
    }

    /// Row iterator
    pub fn iter(&self) -> impl Iterator<Item = &Binding<'a>> {
        self.rows.iter()
    }

    /// Row count
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Remove duplicate rows, keeping first occurrences
    pub fn distinct(&mut self) {
        let mut seen = FxHashSet::default();
        self.rows.retain(|row| seen.insert(row.canonical_key()));
    }

    /// Keep at most `n` rows
    pub fn limit(&mut self, n: usize) {
        self.rows.truncate(n);
    }

    /// Drop the first `n` rows
    pub fn offset(&mut self, n: usize) {
        if n < self.rows.len() {
            self.rows.drain(0..n);
        } else {
            self.rows.clear();
        }
    }

    /// Project every row to the listed variables
    pub fn project(&mut self, vars: &[VarName<'a>]) {
        for row in &mut self.rows {
            *row = row.project(vars);
        }
    }

    /// Sort rows with a comparison function
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&Binding<'a>, &Binding<'a>) -> std::cmp::Ordering,
    {
        self.rows.sort_by(compare);
    }

    /// Append all rows of another set (UNION)
    pub fn union(&mut self, other: BindingSet<'a>) {
        self.rows.extend(other.rows);
    }

    /// Keep rows satisfying the predicate
    pub fn filter<F>(&mut self, predicate: F)
    where
        F: Fn(&Binding<'a>) -> bool,
    {
        self.rows.retain(predicate);
    }

    /// Inner join: merge every compatible pair
    pub fn join(&self, other: &BindingSet<'a>) -> BindingSet<'a> {
        let mut result = BindingSet::new();
        for left in &self.rows {
            for right in &other.rows {
                if let Some(merged) = left.merge(right) {
                    result.add(merged);
                }
            }
        }
        result
    }

    /// Left join (OPTIONAL): keep unmatched left rows as-is
    ///
    /// `filter` sees the merged row and decides whether the match counts.
    pub fn left_join<F>(&self, other: &BindingSet<'a>, filter: F) -> BindingSet<'a>
    where
        F: Fn(&Binding<'a>) -> bool,
    {
        let mut result = BindingSet::new();
        for left in &self.rows {
            let mut matched = false;
            for right in &other.rows {
                if let Some(merged) = left.merge(right) {
                    if filter(&merged) {
                        result.add(merged);
                        matched = true;
                    }
                }
            }
            if !matched {
                result.add(left.clone());
            }
        }
        result
    }

    /// MINUS: drop left rows with a compatible right row sharing a variable
    ///
    /// Rows with disjoint domains are kept, per the SPARQL MINUS definition.
    pub fn minus(&self, other: &BindingSet<'a>) -> BindingSet<'a> {
        let mut result = BindingSet::new();
        for left in &self.rows {
            let removed = other.rows.iter().any(|right| {
                left.shares_domain_with(right) && left.compatible_with(right)
            });
            if !removed {
                result.add(left.clone());
            }
        }
        result
    }

    /// Hand the rows to a caller as a cancellable stream
    pub fn into_solutions(self, control: ExecControl) -> Solutions<'a> {
        Solutions {
            inner: self.rows.into_iter(),
            control,
        }
    }
}

impl<'a> IntoIterator for BindingSet<'a> {
    type Item = Binding<'a>;
    type IntoIter = std::vec::IntoIter<Binding<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> FromIterator<Binding<'a>> for BindingSet<'a> {
    fn from_iter<I: IntoIterator<Item = Binding<'a>>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Lazy stream of solutions
///
/// Each `next` is a yield point: cancellation or a deadline terminates the
/// stream with the corresponding error.
pub struct Solutions<'a> {
    inner: std::vec::IntoIter<Binding<'a>>,
    control: ExecControl,
}

impl<'a> Iterator for Solutions<'a> {
    type Item = QueryResult<Binding<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.control.check() {
            // Terminate after reporting the control error once
            self.inner.by_ref().for_each(drop);
            return Some(Err(e));
        }
        self.inner.next().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdf_model::Dictionary;

    fn iri<'a>(dict: &Dictionary, s: &str) -> Node<'a> {
        Node::iri(dict.intern(s))
    }

    #[test]
    fn bind_detects_conflicts() {
        let dict = Dictionary::new();
        let mut binding = Binding::new();
        let var = VarName::new("x");

        assert!(binding.bind(var, iri(&dict, "http://a")));
        assert!(binding.bind(var, iri(&dict, "http://a")));
        assert!(!binding.bind(var, iri(&dict, "http://b")));
        assert_eq!(binding.get(&var), Some(&iri(&dict, "http://a")));
    }

    #[test]
    fn merge_compatible_and_conflicting() {
        let dict = Dictionary::new();
        let mut a = Binding::new();
        a.bind(VarName::new("x"), iri(&dict, "http://1"));
        let mut b = Binding::new();
        b.bind(VarName::new("y"), iri(&dict, "http://2"));

        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.len(), 2);

        let mut conflict = Binding::new();
        conflict.bind(VarName::new("x"), iri(&dict, "http://other"));
        assert!(a.merge(&conflict).is_none());
    }

    #[test]
    fn minus_keeps_disjoint_domains() {
        let dict = Dictionary::new();
        let mut left_row = Binding::new();
        left_row.bind(VarName::new("x"), iri(&dict, "http://1"));

        let mut disjoint = Binding::new();
        disjoint.bind(VarName::new("y"), iri(&dict, "http://2"));

        let left = BindingSet::from_rows(vec![left_row.clone()]);
        let right = BindingSet::from_rows(vec![disjoint]);

        // No shared variable: nothing is removed
        assert_eq!(left.minus(&right).len(), 1);

        let right_sharing = BindingSet::from_rows(vec![left_row]);
        assert_eq!(left.minus(&right_sharing).len(), 0);
    }

    #[test]
    fn distinct_uses_term_identity() {
        let dict = Dictionary::new();
        let mut row = Binding::new();
        row.bind(VarName::new("x"), iri(&dict, "http://1"));

        let mut set = BindingSet::from_rows(vec![row.clone(), row.clone(), row]);
        set.distinct();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn projection_and_internal_vars() {
        let dict = Dictionary::new();
        let mut row = Binding::new();
        row.bind(VarName::new("x"), iri(&dict, "http://1"));
        row.bind(VarName::new("__mid0"), iri(&dict, "http://2"));

        let cleaned = row.without_internal();
        assert_eq!(cleaned.len(), 1);
        assert!(cleaned.contains(&VarName::new("x")));

        let projected = row.project(&[VarName::new("x")]);
        assert_eq!(projected.len(), 1);
    }

    #[test]
    fn solutions_stream_is_cancellable() {
        let dict = Dictionary::new();
        let mut row = Binding::new();
        row.bind(VarName::new("x"), iri(&dict, "http://1"));
        let set = BindingSet::from_rows(vec![row.clone(), row]);

        let flag = crate::CancelFlag::new();
        let mut stream = set.into_solutions(crate::ExecControl::unbounded().with_cancel(flag.clone()));

        assert!(stream.next().unwrap().is_ok());
        flag.cancel();
        assert!(matches!(
            stream.next(),
            Some(Err(crate::QueryError::Cancelled))
        ));
        assert!(stream.next().is_none());
    }
}
