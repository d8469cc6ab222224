//! DOM Node
//!
//! Nodes link to each other through `NodeId`s (4 bytes) instead of pointers,
//! which keeps long-lived indexes free of reference cycles.

use crate::{NamedNodeMap, NodeId};

/// DOM Node - Core structure
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) parent: NodeId,
    pub(crate) first_child: NodeId,
    pub(crate) last_child: NodeId,
    pub(crate) prev_sibling: NodeId,
    pub(crate) next_sibling: NodeId,
    /// Node-specific data
    pub data: NodeData,
}

impl Node {
    pub(crate) fn new(data: NodeData) -> Self {
        Self {
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
            data,
        }
    }

    /// Parent node, if attached
    pub fn parent(&self) -> Option<NodeId> {
        self.parent.some()
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child.some()
    }

    pub fn last_child(&self) -> Option<NodeId> {
        self.last_child.some()
    }

    pub fn prev_sibling(&self) -> Option<NodeId> {
        self.prev_sibling.some()
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling.some()
    }

    /// Check if this is an element
    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    /// Check if this is text
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text(_))
    }

    /// Get element data if this is an element
    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get text content if this is a text node
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Node-specific data
#[derive(Debug, Clone)]
pub enum NodeData {
    /// Document root
    Document,
    /// DOCTYPE
    Doctype { name: String },
    /// Element
    Element(ElementData),
    /// Text content
    Text(String),
    /// Comment
    Comment(String),
}

/// Element-specific data
#[derive(Debug, Clone)]
pub struct ElementData {
    /// Lower-case tag name
    pub tag: String,
    /// Attributes in source order
    pub attrs: NamedNodeMap,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: NamedNodeMap::new(),
        }
    }

    /// Get an attribute value
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name)
    }

    /// The `id` attribute, if non-empty
    pub fn id(&self) -> Option<&str> {
        self.attrs.get("id").filter(|id| !id.is_empty())
    }

    /// Whitespace separated class names
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attrs.get("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_classes() {
        let mut elem = ElementData::new("DIV");
        elem.attrs.set("class", "  card  active ");

        assert_eq!(elem.tag, "div");
        assert!(elem.has_class("card"));
        assert!(elem.has_class("active"));
        assert!(!elem.has_class("car"));
    }

    #[test]
    fn test_empty_id_is_none() {
        let mut elem = ElementData::new("p");
        elem.attrs.set("id", "");
        assert_eq!(elem.id(), None);
    }

    #[test]
    fn test_fresh_node_is_detached() {
        let node = Node::new(NodeData::Text("hi".into()));
        assert!(node.parent().is_none());
        assert!(node.is_text());
        assert_eq!(node.as_text(), Some("hi"));
    }
}
