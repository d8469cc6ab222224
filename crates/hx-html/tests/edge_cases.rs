//! Edge case tests for hx-html
//!
//! Fragment parsing of partial responses and serialization round trips.

use hx_dom::{DomTree, ElementQuery};
use hx_html::*;

// ============================================================================
// FRAGMENT TESTS
// ============================================================================

#[test]
fn test_empty_fragment() {
    let mut tree = DomTree::new();
    let frag = parse_fragment("", &mut tree).unwrap();
    assert!(frag.is_empty());
    assert!(frag.title.is_none());
}

#[test]
fn test_whitespace_text_is_kept() {
    let mut tree = DomTree::new();
    let frag = parse_fragment("  <b>x</b>  ", &mut tree).unwrap();
    assert_eq!(frag.nodes.len(), 3);
    assert_eq!(tree.tag_name(frag.nodes[1]), Some("b"));
}

#[test]
fn test_plain_text_fragment() {
    let mut tree = DomTree::new();
    let frag = parse_fragment("Saved!", &mut tree).unwrap();
    assert_eq!(frag.nodes.len(), 1);
    assert_eq!(tree.text_content(frag.nodes[0]), "Saved!");
}

#[test]
fn test_attributes_preserved() {
    let mut tree = DomTree::new();
    let frag = parse_fragment(
        r#"<div id="a" hx-swap-oob="true" hx-get="/x">A</div>"#,
        &mut tree,
    )
    .unwrap();
    let div = frag.nodes[0];
    assert_eq!(tree.get_attribute(div, "hx-swap-oob"), Some("true"));
    assert_eq!(tree.get_attribute(div, "hx-get"), Some("/x"));
}

#[test]
fn test_nested_template_contents() {
    let mut tree = DomTree::new();
    let frag = parse_fragment("<template><p>t</p></template>", &mut tree).unwrap();
    let template = frag.nodes[0];
    assert_eq!(tree.tag_name(template), Some("template"));
    assert!(tree.query_selector(template, "p").is_some());
}

#[test]
fn test_only_first_title_taken() {
    let mut tree = DomTree::new();
    let frag = parse_fragment("<title>One</title><title>Two</title>", &mut tree).unwrap();
    assert_eq!(frag.title.as_deref(), Some("One"));
    assert_eq!(frag.nodes.len(), 1);
}

#[test]
fn test_doctype_response_treated_as_document() {
    let mut tree = DomTree::new();
    let frag = parse_fragment(
        "<!DOCTYPE html><html><head><title>Page</title></head><body><h1>Hi</h1><p>x</p></body></html>",
        &mut tree,
    )
    .unwrap();
    assert_eq!(frag.title.as_deref(), Some("Page"));
    assert_eq!(frag.nodes.len(), 2);
}

// ============================================================================
// DOCUMENT TESTS
// ============================================================================

#[test]
fn test_parse_document_url_and_title() {
    let doc = parse_document("<title> Home </title><p id=p>x</p>", "http://localhost/home").unwrap();
    assert_eq!(doc.url(), "http://localhost/home");
    assert_eq!(doc.title(), "Home");
    assert!(doc.get_element_by_id("p").is_some());
}

#[test]
fn test_parse_document_has_no_pending_records() {
    let mut doc = parse_document("<div></div>", "about:blank").unwrap();
    assert!(doc.tree_mut().take_records().is_empty());
}

// ============================================================================
// SERIALIZER TESTS
// ============================================================================

#[test]
fn test_inner_html_round_trip() {
    let html = r#"<ul id="l"><li class="a">1</li><li>2 &amp; 3</li></ul>"#;
    let doc = parse_document(html, "about:blank").unwrap();
    let body = doc.body().unwrap();
    assert_eq!(inner_html(doc.tree(), body), html);
}

#[test]
fn test_outer_html_void() {
    let mut tree = DomTree::new();
    let frag = parse_fragment(r#"<input name="q" value="a&quot;b">"#, &mut tree).unwrap();
    assert_eq!(outer_html(&tree, frag.nodes[0]), r#"<input name="q" value="a&quot;b">"#);
}
