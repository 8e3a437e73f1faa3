//! Wildcard patterns for store matching

use rdf_model::{Node, Triple};

/// Pattern for one triple position
///
/// `Any` is the wildcard that matches every node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodePattern<'a> {
    /// Match any node
    Any,

    /// Match one specific node
    Concrete(Node<'a>),
}

impl<'a> NodePattern<'a> {
    /// Whether this pattern accepts the node
    pub fn matches(&self, node: &Node<'a>) -> bool {
        match self {
            NodePattern::Any => true,
            NodePattern::Concrete(n) => n == node,
        }
    }

    /// Whether this is the wildcard
    pub fn is_wildcard(&self) -> bool {
        matches!(self, NodePattern::Any)
    }

    /// Whether this pattern is bound to a node
    pub fn is_concrete(&self) -> bool {
        matches!(self, NodePattern::Concrete(_))
    }

    /// The bound node, if any
    pub fn as_node(&self) -> Option<&Node<'a>> {
        match self {
            NodePattern::Concrete(n) => Some(n),
            NodePattern::Any => None,
        }
    }
}

impl<'a> From<Option<&Node<'a>>> for NodePattern<'a> {
    fn from(opt: Option<&Node<'a>>) -> Self {
        match opt {
            Some(node) => NodePattern::Concrete(node.clone()),
            None => NodePattern::Any,
        }
    }
}

impl<'a> From<Node<'a>> for NodePattern<'a> {
    fn from(node: Node<'a>) -> Self {
        NodePattern::Concrete(node)
    }
}

/// Wildcard pattern over a whole triple
#[derive(Clone, Debug)]
pub struct StorePattern<'a> {
    /// Subject position
    pub subject: NodePattern<'a>,

    /// Predicate position
    pub predicate: NodePattern<'a>,

    /// Object position
    pub object: NodePattern<'a>,
}

impl<'a> StorePattern<'a> {
    /// Build a pattern from the three positions
    pub fn new(
        subject: impl Into<NodePattern<'a>>,
        predicate: impl Into<NodePattern<'a>>,
        object: impl Into<NodePattern<'a>>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// The pattern that matches every triple
    pub fn all() -> Self {
        Self {
            subject: NodePattern::Any,
            predicate: NodePattern::Any,
            object: NodePattern::Any,
        }
    }

    /// Whether a triple satisfies this pattern
    pub fn matches(&self, triple: &Triple<'a>) -> bool {
        self.subject.matches(&triple.subject)
            && self.predicate.matches(&triple.predicate)
            && self.object.matches(&triple.object)
    }

    /// Number of bound positions
    pub fn bound_count(&self) -> usize {
        [&self.subject, &self.predicate, &self.object]
            .iter()
            .filter(|p| p.is_concrete())
            .count()
    }

    /// Whether every position is bound
    pub fn is_fully_bound(&self) -> bool {
        self.bound_count() == 3
    }
}

impl<'a> Default for StorePattern<'a> {
    fn default() -> Self {
        Self::all()
    }
}
