//! HTML Serialization (innerHTML/outerHTML)
//!
//! Serializes DOM nodes to HTML strings. Used for history snapshots and for
//! comparing swapped content.

use hx_dom::{DomTree, NodeData, NodeId};

/// HTML serializer
#[derive(Debug, Clone, Default)]
pub struct HtmlSerializer;

/// Void elements (no end tag)
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input",
    "link", "meta", "param", "source", "track", "wbr",
];

/// Raw text elements (no escaping for content)
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

impl HtmlSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Serialize innerHTML of a node (children only)
    pub fn serialize_inner(&self, tree: &DomTree, node_id: NodeId) -> String {
        let mut output = String::new();
        self.serialize_children(tree, node_id, &mut output);
        output
    }

    /// Serialize outerHTML of a node (including the node itself)
    pub fn serialize_outer(&self, tree: &DomTree, node_id: NodeId) -> String {
        let mut output = String::new();
        self.serialize_node(tree, node_id, &mut output);
        output
    }

    fn serialize_node(&self, tree: &DomTree, node_id: NodeId, output: &mut String) {
        let Some(node) = tree.get(node_id) else {
            return;
        };

        match &node.data {
            NodeData::Document => self.serialize_children(tree, node_id, output),
            NodeData::Element(elem) => {
                let tag = elem.tag.as_str();
                output.push('<');
                output.push_str(tag);
                for attr in elem.attrs.iter() {
                    output.push(' ');
                    output.push_str(&attr.name);
                    if !attr.value.is_empty() {
                        output.push_str("=\"");
                        escape_attribute(&attr.value, output);
                        output.push('"');
                    }
                }
                output.push('>');

                if VOID_ELEMENTS.contains(&tag) {
                    return;
                }
                if RAW_TEXT_ELEMENTS.contains(&tag) {
                    for child in tree.children(node_id) {
                        if let Some(text) = tree.get(child).and_then(|c| c.as_text()) {
                            output.push_str(text);
                        }
                    }
                } else {
                    self.serialize_children(tree, node_id, output);
                }
                output.push_str("</");
                output.push_str(tag);
                output.push('>');
            }
            NodeData::Text(text) => escape_text(text, output),
            NodeData::Comment(text) => {
                output.push_str("<!--");
                output.push_str(text);
                output.push_str("-->");
            }
            NodeData::Doctype { name } => {
                output.push_str("<!DOCTYPE ");
                output.push_str(name);
                output.push('>');
            }
        }
    }

    fn serialize_children(&self, tree: &DomTree, parent_id: NodeId, output: &mut String) {
        for child_id in tree.children(parent_id) {
            self.serialize_node(tree, child_id, output);
        }
    }
}

/// Escape text content for HTML
fn escape_text(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

/// Escape attribute value
fn escape_attribute(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            _ => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_nested() {
        let mut tree = DomTree::new();
        let div = tree.create_element_with_attrs("div", &[("id", "a"), ("hidden", "")]);
        let text = tree.create_text("1 < 2");
        let br = tree.create_element("br");
        tree.append_child(div, text).unwrap();
        tree.append_child(div, br).unwrap();

        let s = HtmlSerializer::new();
        assert_eq!(s.serialize_outer(&tree, div), r#"<div id="a" hidden>1 &lt; 2<br></div>"#);
        assert_eq!(s.serialize_inner(&tree, div), "1 &lt; 2<br>");
    }

    #[test]
    fn test_attribute_escaping() {
        let mut tree = DomTree::new();
        let a = tree.create_element_with_attrs("a", &[("title", "say \"hi\" & go")]);
        assert_eq!(
            HtmlSerializer::new().serialize_outer(&tree, a),
            r#"<a title="say &quot;hi&quot; &amp; go"></a>"#
        );
    }

    #[test]
    fn test_script_is_raw() {
        let mut tree = DomTree::new();
        let script = tree.create_element("script");
        let code = tree.create_text("if (a < b) {}");
        tree.append_child(script, code).unwrap();
        assert_eq!(
            HtmlSerializer::new().serialize_outer(&tree, script),
            "<script>if (a < b) {}</script>"
        );
    }
}
