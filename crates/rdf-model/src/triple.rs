//! RDF triple (subject, predicate, object)

use crate::{Node, RdfError, Result};
use std::fmt;

/// RDF triple
///
/// Position constraints: subjects are IRIs, blank nodes or quoted triples;
/// predicates are IRIs; objects may be any term. Quoted triples nest
/// recursively through [`Node::QuotedTriple`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Triple<'a> {
    /// Subject (IRI, blank node, or quoted triple)
    pub subject: Node<'a>,

    /// Predicate (IRI)
    pub predicate: Node<'a>,

    /// Object (any term kind except variable)
    pub object: Node<'a>,
}

impl<'a> Triple<'a> {
    /// Create a triple, rejecting terms in illegal positions
    pub fn try_new(subject: Node<'a>, predicate: Node<'a>, object: Node<'a>) -> Result<Self> {
        if !(subject.is_iri() || subject.is_blank() || subject.is_quoted()) {
            return Err(RdfError::TermPosition(format!(
                "subject must be an IRI, blank node or quoted triple, got {subject}"
            )));
        }
        if !predicate.is_iri() {
            return Err(RdfError::TermPosition(format!(
                "predicate must be an IRI, got {predicate}"
            )));
        }
        if object.is_variable() {
            return Err(RdfError::TermPosition(
                "object must be a concrete term, got a variable".into(),
            ));
        }
        Ok(Triple {
            subject,
            predicate,
            object,
        })
    }

    /// Create a triple without position checks
    ///
    /// Callers must uphold the position constraints themselves; the store
    /// and the executors rely on them.
    pub fn new_unchecked(subject: Node<'a>, predicate: Node<'a>, object: Node<'a>) -> Self {
        Triple {
            subject,
            predicate,
            object,
        }
    }

    /// Whether this triple matches a wildcard pattern
    ///
    /// `None` in any position matches anything.
    pub fn matches(
        &self,
        subject: Option<&Node<'a>>,
        predicate: Option<&Node<'a>>,
        object: Option<&Node<'a>>,
    ) -> bool {
        subject.map_or(true, |s| s == &self.subject)
            && predicate.map_or(true, |p| p == &self.predicate)
            && object.map_or(true, |o| o == &self.object)
    }

    /// Subject as an IRI string, if it is one
    pub fn subject_iri(&self) -> Option<&'a str> {
        self.subject.as_iri().map(|iri| iri.as_str())
    }

    /// Predicate as an IRI string
    pub fn predicate_iri(&self) -> Option<&'a str> {
        self.predicate.as_iri().map(|iri| iri.as_str())
    }

    /// Object as an IRI string, if it is one
    pub fn object_iri(&self) -> Option<&'a str> {
        self.object.as_iri().map(|iri| iri.as_str())
    }

    /// Canonical N-Triples line (terminated with ` .`)
    pub fn to_ntriples(&self) -> String {
        format!("{} {} {} .", self.subject, self.predicate, self.object)
    }
}

impl<'a> fmt::Debug for Triple<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Triple")
            .field("subject", &self.subject)
            .field("predicate", &self.predicate)
            .field("object", &self.object)
            .finish()
    }
}

impl<'a> fmt::Display for Triple<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}
