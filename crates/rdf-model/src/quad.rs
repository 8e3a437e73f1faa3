//! RDF quad (triple plus optional named graph)

use crate::{Node, RdfError, Result, Triple};
use std::fmt;

/// RDF quad: a triple scoped to a graph
///
/// `graph: None` places the triple in the default graph; named graphs are
/// identified by IRI.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Quad<'a> {
    /// Subject (IRI, blank node, or quoted triple)
    pub subject: Node<'a>,

    /// Predicate (IRI)
    pub predicate: Node<'a>,

    /// Object (any concrete term)
    pub object: Node<'a>,

    /// Graph name (None = default graph)
    pub graph: Option<Node<'a>>,
}

impl<'a> Quad<'a> {
    /// Create a quad, rejecting terms in illegal positions
    pub fn try_new(
        subject: Node<'a>,
        predicate: Node<'a>,
        object: Node<'a>,
        graph: Option<Node<'a>>,
    ) -> Result<Self> {
        let triple = Triple::try_new(subject, predicate, object)?;
        if let Some(ref g) = graph {
            if !g.is_iri() {
                return Err(RdfError::TermPosition(format!(
                    "graph name must be an IRI, got {g}"
                )));
            }
        }
        Ok(Self::from_triple_in(triple, graph))
    }

    /// Wrap a triple for the default graph
    pub fn from_triple(triple: Triple<'a>) -> Self {
        Self::from_triple_in(triple, None)
    }

    /// Wrap a triple for the given graph (None = default)
    pub fn from_triple_in(triple: Triple<'a>, graph: Option<Node<'a>>) -> Self {
        Quad {
            subject: triple.subject,
            predicate: triple.predicate,
            object: triple.object,
            graph,
        }
    }

    /// The triple component (graph dropped)
    pub fn to_triple(&self) -> Triple<'a> {
        Triple {
            subject: self.subject.clone(),
            predicate: self.predicate.clone(),
            object: self.object.clone(),
        }
    }

    /// Whether this quad lives in the default graph
    pub fn is_default_graph(&self) -> bool {
        self.graph.is_none()
    }
}

impl<'a> fmt::Debug for Quad<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Quad")
            .field("subject", &self.subject)
            .field("predicate", &self.predicate)
            .field("object", &self.object)
            .field("graph", &self.graph)
            .finish()
    }
}

impl<'a> fmt::Display for Quad<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(ref graph) = self.graph {
            write!(f, " {graph}")?;
        }
        Ok(())
    }
}
