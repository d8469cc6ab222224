//! Mutation Records
//!
//! The tree appends a record for every structural or attribute change.
//! Consumers drain them with [`DomTree::take_records`](crate::DomTree::take_records).

use crate::NodeId;

/// Mutation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationType {
    Attributes,
    CharacterData,
    ChildList,
}

/// Mutation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub mutation_type: MutationType,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub attribute_name: Option<String>,
    pub old_value: Option<String>,
}

impl MutationRecord {
    pub(crate) fn child_added(parent: NodeId, child: NodeId) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target: parent,
            added_nodes: vec![child],
            removed_nodes: Vec::new(),
            attribute_name: None,
            old_value: None,
        }
    }

    pub(crate) fn child_removed(parent: NodeId, child: NodeId) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target: parent,
            added_nodes: Vec::new(),
            removed_nodes: vec![child],
            attribute_name: None,
            old_value: None,
        }
    }

    pub(crate) fn attribute(target: NodeId, name: &str, old_value: Option<String>) -> Self {
        Self {
            mutation_type: MutationType::Attributes,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: Some(name.to_string()),
            old_value,
        }
    }

    pub(crate) fn character_data(target: NodeId, old_value: String) -> Self {
        Self {
            mutation_type: MutationType::CharacterData,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: None,
            old_value: Some(old_value),
        }
    }
}
