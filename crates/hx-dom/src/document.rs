//! Document - High-level document API

use crate::{DomTree, NodeId};

/// HTML Document
#[derive(Debug, Clone)]
pub struct Document {
    /// The DOM tree
    pub tree: DomTree,
    /// Document URL
    url: String,
    /// Document title
    title: String,
}

impl Document {
    /// Create a document with an empty html/head/body skeleton
    pub fn new(url: &str) -> Self {
        let mut tree = DomTree::new();
        let html = tree.create_element("html");
        let head = tree.create_element("head");
        let body = tree.create_element("body");

        // Fresh detached nodes cannot violate hierarchy rules
        let _ = tree.append_child(tree.root(), html);
        let _ = tree.append_child(html, head);
        let _ = tree.append_child(html, body);
        tree.take_records();

        Self {
            tree,
            url: url.to_string(),
            title: String::new(),
        }
    }

    /// Wrap an already built tree
    pub fn from_tree(tree: DomTree, url: &str, title: &str) -> Self {
        Self {
            tree,
            url: url.to_string(),
            title: title.to_string(),
        }
    }

    /// Get document URL
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    /// Get document title
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    /// Get `<html>` element
    pub fn document_element(&self) -> Option<NodeId> {
        self.tree
            .element_children(self.tree.root())
            .find(|&c| self.tree.tag_name(c) == Some("html"))
    }

    /// Get `<head>` element
    pub fn head(&self) -> Option<NodeId> {
        self.html_child("head")
    }

    /// Get `<body>` element
    pub fn body(&self) -> Option<NodeId> {
        self.html_child("body")
    }

    fn html_child(&self, tag: &str) -> Option<NodeId> {
        let html = self.document_element()?;
        self.tree
            .element_children(html)
            .find(|&c| self.tree.tag_name(c) == Some(tag))
    }

    /// Get connected element by ID
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.tree
            .descendants(self.tree.root())
            .find(|&n| self.tree.element(n).and_then(|e| e.id()) == Some(id))
    }

    /// Access the DOM tree
    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    /// Access the DOM tree mutably
    pub fn tree_mut(&mut self) -> &mut DomTree {
        &mut self.tree
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new("about:blank")
    }
}
