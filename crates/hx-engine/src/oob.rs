//! Out-of-band fragments
//!
//! Elements in a response marked `hx-swap-oob` (or picked by
//! `hx-select-oob`) are pulled out of the primary content and swapped into
//! the live element they name, each independently of the others.

use crate::swap::SwapStyle;
use hx_dom::{DomTree, ElementQuery, NodeId};

/// One out-of-band swap found in a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OobInstruction {
    /// The response element (detached)
    pub element: NodeId,
    pub style: SwapStyle,
    /// Live-document selector to swap into
    pub selector: String,
}

impl OobInstruction {
    /// Parse an `hx-swap-oob` value for `element`. `true` means outerHTML
    /// into the element with the same id.
    pub fn parse(tree: &DomTree, element: NodeId, value: &str) -> Option<Self> {
        let id_selector = || {
            tree.element(element)
                .and_then(|e| e.id())
                .map(|id| format!("#{}", id))
        };
        let value = value.trim();
        let (style, selector) = if value.is_empty() || value == "true" {
            (SwapStyle::OuterHtml, id_selector())
        } else {
            match value.split_once(':') {
                Some((style, selector)) => (SwapStyle::parse(style), Some(selector.to_string())),
                None => (SwapStyle::parse(value), id_selector()),
            }
        };
        let Some(selector) = selector else {
            tracing::warn!("hx-swap-oob on {} has no id to target", element);
            return None;
        };
        Some(Self {
            element,
            style,
            selector,
        })
    }

    /// Nodes to insert for one target. outerHTML swaps the element itself,
    /// every other style its children. Each call after the first deep-copies.
    pub fn content(&self, tree: &mut DomTree, copy: bool) -> Vec<NodeId> {
        let source = if copy {
            match tree.clone_subtree(self.element) {
                Ok(c) => c,
                Err(_) => return Vec::new(),
            }
        } else {
            self.element
        };
        if matches!(self.style, SwapStyle::OuterHtml) {
            vec![source]
        } else {
            tree.children(source).collect()
        }
    }
}

/// Elements of `nodes` (inclusive) matching `selector`, in order
pub fn select_in(tree: &DomTree, nodes: &[NodeId], selector: &str) -> Vec<NodeId> {
    let mut found = Vec::new();
    for &node in nodes {
        if tree.matches(node, selector) {
            found.push(node);
        }
        found.extend(tree.query_selector_all(node, selector));
    }
    found
}

/// Extract out-of-band instructions from a parsed response.
///
/// Matching elements are detached from the fragment and removed from
/// `nodes`. `select_oob` is an `hx-select-oob` value (`sel[:style], ...`).
pub fn extract(
    tree: &mut DomTree,
    nodes: &mut Vec<NodeId>,
    select_oob: Option<&str>,
    allow_nested: bool,
) -> Vec<OobInstruction> {
    let mut marked: Vec<(NodeId, String)> = Vec::new();

    for &node in nodes.iter() {
        if let Some(value) = tree.get_attribute(node, "hx-swap-oob") {
            marked.push((node, value.to_string()));
        } else if allow_nested {
            for d in tree.query_selector_all(node, "[hx-swap-oob]") {
                // Skip markers inside an already-marked element
                if marked.iter().any(|(m, _)| tree.contains(*m, d)) {
                    continue;
                }
                if let Some(value) = tree.get_attribute(d, "hx-swap-oob") {
                    marked.push((d, value.to_string()));
                }
            }
        }
    }

    if let Some(select_oob) = select_oob {
        for entry in select_oob.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (selector, style) = match entry.split_once(':') {
                Some((sel, style)) => (sel.trim(), style.trim()),
                None => (entry, "true"),
            };
            for found in select_in(tree, nodes, selector) {
                if !marked.iter().any(|(m, _)| *m == found) {
                    marked.push((found, style.to_string()));
                }
            }
        }
    }

    let mut instructions = Vec::new();
    for (node, value) in marked {
        nodes.retain(|&n| n != node);
        // Fresh detached nodes: detaching cannot fail
        let _ = tree.remove(node);
        let _ = tree.remove_attribute(node, "hx-swap-oob");
        if let Some(instruction) = OobInstruction::parse(tree, node, &value) {
            instructions.push(instruction);
        }
    }
    instructions
}
