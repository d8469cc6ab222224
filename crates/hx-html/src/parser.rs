//! HTML5 Parser implementation
//!
//! Uses html5ever's RcDom and converts it to our arena format. Partial
//! responses are parsed inside a `<template>` so that context-sensitive
//! content such as table rows survives.

use crate::ParseError;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use hx_dom::{Document, DomTree, ElementQuery, NodeId};
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

/// Parsed response content: detached top-level nodes plus the extracted title
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    pub nodes: Vec<NodeId>,
    pub title: Option<String>,
}

impl Fragment {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// HTML5 parser
pub struct HtmlParser;

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self
    }

    /// Parse HTML string into a Document
    pub fn parse(&self, html: &str) -> Result<Document, ParseError> {
        self.parse_with_url(html, "about:blank")
    }

    /// Parse HTML with a base URL
    pub fn parse_with_url(&self, html: &str, url: &str) -> Result<Document, ParseError> {
        tracing::debug!("Parsing HTML document: {}", url);

        let dom = parse_document(RcDom::default(), Default::default()).one(html);

        let mut tree = DomTree::new();
        let root = tree.root();
        for child in dom.document.children.borrow().iter() {
            if let Some(id) = self.convert_node(child, &mut tree)? {
                tree.append_child(root, id)?;
            }
        }
        tree.take_records();

        let title = tree
            .query_selector(root, "head > title")
            .map(|t| tree.text_content(t))
            .unwrap_or_default();

        tracing::debug!("Parsed {} nodes", tree.len());
        Ok(Document::from_tree(tree, url, title.trim()))
    }

    /// Parse a response body into detached nodes owned by `tree`
    pub fn parse_fragment(&self, html: &str, tree: &mut DomTree) -> Result<Fragment, ParseError> {
        if looks_like_document(html) {
            return self.parse_document_fragment(html, tree);
        }

        let wrapped = format!("<body><template>{}</template></body>", html);
        let dom = parse_document(RcDom::default(), Default::default()).one(wrapped);
        let template = find_element(&dom.document, "template")
            .ok_or(ParseError::MissingElement("template"))?;
        let contents = match &template.data {
            RcNodeData::Element { template_contents, .. } => template_contents.borrow().clone(),
            _ => None,
        };
        let Some(contents) = contents else {
            return Ok(Fragment::default());
        };

        let mut fragment = Fragment::default();
        for child in contents.children.borrow().iter() {
            if let Some(id) = self.convert_node(child, tree)? {
                if tree.tag_name(id) == Some("title") && fragment.title.is_none() {
                    fragment.title = Some(tree.text_content(id).trim().to_string());
                    continue;
                }
                fragment.nodes.push(id);
            }
        }
        Ok(fragment)
    }

    fn parse_document_fragment(&self, html: &str, tree: &mut DomTree) -> Result<Fragment, ParseError> {
        let dom = parse_document(RcDom::default(), Default::default()).one(html);
        let body = find_element(&dom.document, "body").ok_or(ParseError::MissingElement("body"))?;

        let mut fragment = Fragment {
            nodes: Vec::new(),
            title: find_element(&dom.document, "title").map(|t| rc_text(&t).trim().to_string()),
        };
        for child in body.children.borrow().iter() {
            if let Some(id) = self.convert_node(child, tree)? {
                fragment.nodes.push(id);
            }
        }
        Ok(fragment)
    }

    /// Convert an RcDom node (and its subtree) into a detached node of `tree`
    fn convert_node(&self, handle: &Handle, tree: &mut DomTree) -> Result<Option<NodeId>, ParseError> {
        let id = match &handle.data {
            RcNodeData::Document | RcNodeData::ProcessingInstruction { .. } => return Ok(None),
            RcNodeData::Doctype { name, .. } => return Ok(Some(tree.create_doctype(name))),
            RcNodeData::Text { contents } => return Ok(Some(tree.create_text(&contents.borrow()))),
            RcNodeData::Comment { contents } => return Ok(Some(tree.create_comment(contents))),
            RcNodeData::Element { name, attrs, template_contents, .. } => {
                let attrs = attrs.borrow();
                let pairs: Vec<(&str, &str)> = attrs
                    .iter()
                    .map(|a| (&*a.name.local, &*a.value))
                    .collect();
                let id = tree.create_element_with_attrs(&name.local, &pairs);

                // Template children live in a separate fragment
                if let Some(contents) = template_contents.borrow().as_ref() {
                    for child in contents.children.borrow().iter() {
                        if let Some(child_id) = self.convert_node(child, tree)? {
                            tree.append_child(id, child_id)?;
                        }
                    }
                }
                id
            }
        };

        for child in handle.children.borrow().iter() {
            if let Some(child_id) = self.convert_node(child, tree)? {
                tree.append_child(id, child_id)?;
            }
        }
        Ok(Some(id))
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Full documents are recognised by a leading `<html`, `<head`, `<body` or doctype
fn looks_like_document(html: &str) -> bool {
    let trimmed = html.trim_start();
    let head: String = trimmed.chars().take(9).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype")
        || head.starts_with("<html")
        || head.starts_with("<head")
        || head.starts_with("<body")
}

fn find_element(handle: &Handle, tag: &str) -> Option<Handle> {
    if let RcNodeData::Element { name, .. } = &handle.data {
        if &*name.local == tag {
            return Some(handle.clone());
        }
    }
    handle
        .children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, tag))
}

fn rc_text(handle: &Handle) -> String {
    let mut out = String::new();
    for child in handle.children.borrow().iter() {
        match &child.data {
            RcNodeData::Text { contents } => out.push_str(&contents.borrow()),
            _ => out.push_str(&rc_text(child)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let html = "<html><head><title>Test</title></head><body><p>Hello</p></body></html>";
        let doc = HtmlParser::new().parse(html).unwrap();

        assert_eq!(doc.title(), "Test");
        assert!(doc.body().is_some());
    }

    #[test]
    fn test_parse_fragment_is_detached() {
        let mut tree = DomTree::new();
        let frag = HtmlParser::new()
            .parse_fragment("<div id=a>One</div><span>Two</span>", &mut tree)
            .unwrap();

        assert_eq!(frag.nodes.len(), 2);
        assert_eq!(tree.tag_name(frag.nodes[0]), Some("div"));
        assert!(!tree.is_connected(frag.nodes[0]));
    }

    #[test]
    fn test_parse_fragment_table_rows() {
        let mut tree = DomTree::new();
        let frag = HtmlParser::new()
            .parse_fragment("<tr><td>1</td></tr>", &mut tree)
            .unwrap();

        assert_eq!(frag.nodes.len(), 1);
        assert_eq!(tree.tag_name(frag.nodes[0]), Some("tr"));
    }

    #[test]
    fn test_fragment_title_extracted() {
        let mut tree = DomTree::new();
        let frag = HtmlParser::new()
            .parse_fragment("<title> New </title><p>x</p>", &mut tree)
            .unwrap();

        assert_eq!(frag.title.as_deref(), Some("New"));
        assert_eq!(frag.nodes.len(), 1);
    }

    #[test]
    fn test_document_response_uses_body() {
        let mut tree = DomTree::new();
        let frag = HtmlParser::new()
            .parse_fragment("<html><head><title>T</title></head><body><main></main></body></html>", &mut tree)
            .unwrap();

        assert_eq!(frag.title.as_deref(), Some("T"));
        assert_eq!(frag.nodes.len(), 1);
        assert_eq!(tree.tag_name(frag.nodes[0]), Some("main"));
    }
}
