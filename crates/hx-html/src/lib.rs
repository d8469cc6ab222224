//! hx HTML
//!
//! HTML5 parsing built on html5ever, and innerHTML/outerHTML serialization.
//! Response bodies are parsed into detached nodes of an existing tree so the
//! swap engine can splice them in without copying.

mod parser;
mod serializer;

pub use parser::{Fragment, HtmlParser};
pub use serializer::HtmlSerializer;

use hx_dom::{Document, DomTree, NodeId};

/// Parse an HTML page into a Document
pub fn parse_document(html: &str, url: &str) -> Result<Document, ParseError> {
    HtmlParser::new().parse_with_url(html, url)
}

/// Parse a response body into detached nodes of `tree`
pub fn parse_fragment(html: &str, tree: &mut DomTree) -> Result<Fragment, ParseError> {
    HtmlParser::new().parse_fragment(html, tree)
}

/// Serialize the children of `node`
pub fn inner_html(tree: &DomTree, node: NodeId) -> String {
    HtmlSerializer::new().serialize_inner(tree, node)
}

/// Serialize `node` including itself
pub fn outer_html(tree: &DomTree, node: NodeId) -> String {
    HtmlSerializer::new().serialize_outer(tree, node)
}

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("parsed document has no {0} element")]
    MissingElement(&'static str),

    #[error("DOM error while building tree: {0}")]
    Dom(#[from] hx_dom::DomError),
}
