//! hx DOM - Document Object Model
//!
//! Arena-based DOM tree used by the hx exchange engine.
//!
//! Nodes live in a generational arena and are addressed by [`NodeId`].
//! Freed slots are recycled with a bumped generation, so an id held past
//! the release of its node resolves to nothing instead of a newer node.

mod attributes;
mod document;
mod event;
mod mutation;
mod node;
mod selector;
mod tree;

pub use attributes::{Attr, NamedNodeMap};
pub use document::Document;
pub use event::Event;
pub use mutation::{MutationRecord, MutationType};
pub use node::{ElementData, Node, NodeData};
pub use selector::{ElementQuery, Selector, SelectorError};
pub use tree::{Ancestors, Children, Descendants, DomTree};

/// Node identifier (arena index plus slot generation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Root (document) node ID
    pub const ROOT: NodeId = NodeId::new(0, 0);
    /// Sentinel for "no node"
    pub const NONE: NodeId = NodeId::new(u32::MAX, 0);

    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Check whether this id refers to a node
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::NONE
    }

    /// Raw arena index
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot this id was issued for
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    #[inline]
    pub(crate) fn some(self) -> Option<NodeId> {
        self.is_valid().then_some(self)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.generation == 0 {
            write!(f, "node#{}", self.index)
        } else {
            write!(f, "node#{}v{}", self.index, self.generation)
        }
    }
}

/// Result type for DOM operations
pub type DomResult<T> = Result<T, DomError>;

/// DOM operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// Node not found
    #[error("node not found: {0}")]
    NotFound(NodeId),
    /// Hierarchy error (e.g., inserting an ancestor into its descendant)
    #[error("hierarchy request error")]
    HierarchyRequest,
    /// Operation requires an element
    #[error("not an element: {0}")]
    NotAnElement(NodeId),
    /// Reference node is not a child of the given parent
    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
}
