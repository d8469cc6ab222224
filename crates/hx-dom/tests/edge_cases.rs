//! Edge case tests for hx-dom
//!
//! Tree mutation, node identity, selectors, and mutation records.

use hx_dom::*;

fn sample() -> (DomTree, NodeId, NodeId, NodeId) {
    let mut tree = DomTree::new();
    let root = tree.root();
    let body = tree.create_element("body");
    let list = tree.create_element_with_attrs("ul", &[("id", "list"), ("class", "items big")]);
    let item = tree.create_element_with_attrs("li", &[("data-k", "v1")]);
    tree.append_child(root, body).unwrap();
    tree.append_child(body, list).unwrap();
    tree.append_child(list, item).unwrap();
    (tree, body, list, item)
}

// ============================================================================
// STRUCTURE TESTS
// ============================================================================

#[test]
fn test_insert_before_reorders() {
    let (mut tree, _, list, first) = sample();
    let second = tree.create_element("li");
    tree.insert_before(list, second, Some(first)).unwrap();

    let kids: Vec<NodeId> = tree.children(list).collect();
    assert_eq!(kids, vec![second, first]);
    assert_eq!(tree.previous_element_sibling(first), Some(second));
    assert_eq!(tree.next_element_sibling(second), Some(first));
}

#[test]
fn test_move_detaches_from_old_parent() {
    let (mut tree, body, list, item) = sample();
    tree.append_child(body, item).unwrap();

    assert_eq!(tree.children(list).count(), 0);
    assert_eq!(tree.parent(item), Some(body));
}

#[test]
fn test_cannot_insert_ancestor_into_descendant() {
    let (mut tree, body, _, item) = sample();
    assert_eq!(tree.append_child(item, body), Err(DomError::HierarchyRequest));
}

#[test]
fn test_reference_must_be_child() {
    let (mut tree, body, _, item) = sample();
    let fresh = tree.create_element("p");
    let err = tree.insert_before(body, fresh, Some(item)).unwrap_err();
    assert!(matches!(err, DomError::NotAChild { .. }));
}

#[test]
fn test_text_cannot_have_children() {
    let mut tree = DomTree::new();
    let text = tree.create_text("x");
    let span = tree.create_element("span");
    assert_eq!(tree.append_child(text, span), Err(DomError::HierarchyRequest));
}

#[test]
fn test_removed_node_keeps_identity() {
    let (mut tree, _, list, item) = sample();
    tree.remove(item).unwrap();

    assert!(!tree.is_connected(item));
    assert_eq!(tree.get_attribute(item, "data-k"), Some("v1"));

    tree.append_child(list, item).unwrap();
    assert!(tree.is_connected(item));
}

#[test]
fn test_remove_detached_is_noop() {
    let mut tree = DomTree::new();
    let div = tree.create_element("div");
    let before = tree.generation();
    tree.remove(div).unwrap();
    assert_eq!(tree.generation(), before);
}

#[test]
fn test_unknown_node_errors() {
    let mut tree = DomTree::new();
    let ghost = NodeId::NONE;
    assert!(tree.set_attribute(ghost, "a", "b").is_err());
    assert!(tree.get(ghost).is_none());
    assert_eq!(tree.children(ghost).count(), 0);
}

// ============================================================================
// GENERATION & RECORD TESTS
// ============================================================================

#[test]
fn test_generation_bumps_on_attribute_change_only() {
    let (mut tree, _, list, _) = sample();
    let g0 = tree.generation();
    tree.set_attribute(list, "id", "list").unwrap();
    assert_eq!(tree.generation(), g0);
    tree.set_attribute(list, "id", "other").unwrap();
    assert_eq!(tree.generation(), g0 + 1);
}

#[test]
fn test_records_drain() {
    let (mut tree, _, list, item) = sample();
    tree.take_records();
    tree.remove(item).unwrap();
    tree.add_class(list, "active").unwrap();

    let records = tree.take_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].mutation_type, MutationType::ChildList);
    assert_eq!(records[0].removed_nodes, vec![item]);
    assert_eq!(records[1].attribute_name.as_deref(), Some("class"));
    assert_eq!(records[1].old_value.as_deref(), Some("items big"));
    assert!(tree.take_records().is_empty());
}

#[test]
fn test_class_helpers() {
    let (mut tree, _, list, _) = sample();
    tree.remove_class(list, "items").unwrap();
    tree.remove_class(list, "big").unwrap();
    assert!(!tree.has_attribute(list, "class"));
    tree.add_class(list, "x").unwrap();
    tree.add_class(list, "x").unwrap();
    assert_eq!(tree.get_attribute(list, "class"), Some("x"));
}

// ============================================================================
// SELECTOR TESTS
// ============================================================================

#[test]
fn test_query_selector_variants() {
    let (tree, body, list, item) = sample();
    let root = tree.root();

    assert_eq!(tree.query_selector(root, "#list"), Some(list));
    assert_eq!(tree.query_selector(root, "ul.items.big > li"), Some(item));
    assert_eq!(tree.query_selector(root, "body li[data-k^=v]"), Some(item));
    assert_eq!(tree.query_selector(root, "ol, li"), Some(item));
    assert_eq!(tree.query_selector(body, "body"), None);
}

#[test]
fn test_closest_is_inclusive() {
    let (tree, _, list, item) = sample();
    assert_eq!(tree.closest(item, "li"), Some(item));
    assert_eq!(tree.closest(item, "#list"), Some(list));
    assert_eq!(tree.closest(item, "table"), None);
}

#[test]
fn test_invalid_selector_matches_nothing() {
    let (tree, _, _, item) = sample();
    assert!(tree.query_selector_all(tree.root(), "li[data-k").is_empty());
    assert!(!tree.matches(item, ""));
    assert!(Selector::parse("").is_err());
}

// ============================================================================
// DOCUMENT & EVENT TESTS
// ============================================================================

#[test]
fn test_document_skeleton() {
    let doc = Document::new("http://localhost/");
    assert!(doc.head().is_some());
    assert!(doc.body().is_some());
    assert_eq!(doc.url(), "http://localhost/");
    assert_eq!(doc.get_element_by_id("nope"), None);
}

#[test]
fn test_get_element_by_id_ignores_detached() {
    let mut doc = Document::new("http://localhost/");
    let body = doc.body().unwrap();
    let div = doc.tree_mut().create_element_with_attrs("div", &[("id", "x")]);
    assert_eq!(doc.get_element_by_id("x"), None);
    doc.tree_mut().append_child(body, div).unwrap();
    assert_eq!(doc.get_element_by_id("x"), Some(div));
}

#[test]
fn test_non_cancelable_event_ignores_prevent_default() {
    let mut event = Event::new("hx:load", NodeId::ROOT).non_cancelable();
    event.prevent_default();
    assert!(!event.is_default_prevented());
}
