//! Extended selectors
//!
//! `hx-target`, `hx-include`, `hx-indicator`, `hx-disabled-elt` and trigger
//! `from:` accept CSS plus a few relative forms: `this`, `closest X`,
//! `find X`, `next [X]`, `previous [X]`, `document`, `window` and `body`.

use hx_dom::{DomTree, ElementQuery, NodeId};

/// Resolve `expr` to one element. `element` anchors the relative forms and
/// `source` is what `this` means.
pub fn resolve(tree: &DomTree, expr: &str, element: NodeId, source: NodeId) -> Option<NodeId> {
    let expr = expr.trim();
    match split_relative(expr) {
        ("this", _) => Some(source),
        ("document" | "window", _) => Some(tree.root()),
        ("closest", Some(sel)) => tree.closest(element, sel),
        ("find", Some(sel)) => tree.query_selector(element, sel),
        ("next", None) => tree.next_element_sibling(element),
        ("next", Some(sel)) => following(tree, element, sel).into_iter().next(),
        ("previous", None) => tree.previous_element_sibling(element),
        ("previous", Some(sel)) => preceding(tree, element, sel).into_iter().last(),
        _ => tree.query_selector(tree.root(), expr),
    }
}

/// Resolve `expr` to every element it names. Plain CSS matches all
/// elements in the document; relative forms yield at most one.
pub fn resolve_all(tree: &DomTree, expr: &str, element: NodeId, source: NodeId) -> Vec<NodeId> {
    let expr = expr.trim();
    match split_relative(expr) {
        ("this" | "document" | "window" | "closest" | "find" | "next" | "previous", _) => {
            resolve(tree, expr, element, source).into_iter().collect()
        }
        _ => tree.query_selector_all(tree.root(), expr),
    }
}

/// Resolve a comma-free list of targets, e.g. an `hx-include` value.
/// Relative forms are resolved individually; CSS may match several.
pub fn resolve_list(tree: &DomTree, expr: &str, element: NodeId, source: NodeId) -> Vec<NodeId> {
    match split_relative(expr.trim()) {
        ("this" | "document" | "window" | "closest" | "find" | "next" | "previous", _) => {
            resolve(tree, expr, element, source).into_iter().collect()
        }
        _ => expr
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .flat_map(|s| resolve_all(tree, s, element, source))
            .collect(),
    }
}

fn split_relative(expr: &str) -> (&str, Option<&str>) {
    match expr.split_once(char::is_whitespace) {
        Some((head @ ("closest" | "find" | "next" | "previous"), rest)) => {
            let rest = rest.trim();
            (head, (!rest.is_empty()).then_some(rest))
        }
        _ => (expr, None),
    }
}

/// Matches after `element` in document order, excluding its descendants
fn following(tree: &DomTree, element: NodeId, selector: &str) -> Vec<NodeId> {
    let mut seen = false;
    let mut out = Vec::new();
    for node in tree.descendants(tree.root()) {
        if node == element {
            seen = true;
            continue;
        }
        if seen && !tree.contains(element, node) && tree.matches(node, selector) {
            out.push(node);
        }
    }
    out
}

/// Matches before `element` in document order, excluding its ancestors
fn preceding(tree: &DomTree, element: NodeId, selector: &str) -> Vec<NodeId> {
    let mut out = Vec::new();
    for node in tree.descendants(tree.root()) {
        if node == element {
            break;
        }
        if !tree.contains(node, element) && tree.matches(node, selector) {
            out.push(node);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (DomTree, NodeId) {
        let doc = hx_html::parse_document(
            r#"<body>
                <p class="note" id="n1">one</p>
                <form id="f"><div id="d"><button id="b">go</button><span id="s"></span></div></form>
                <p class="note" id="n2">two</p>
            </body>"#,
            "http://localhost/",
        )
        .unwrap();
        let tree = doc.tree;
        let button = tree.query_selector(tree.root(), "#b").unwrap();
        (tree, button)
    }

    fn id(tree: &DomTree, node: Option<NodeId>) -> Option<&str> {
        node.and_then(|n| tree.get_attribute(n, "id"))
    }

    #[test]
    fn test_relative_forms() {
        let (tree, b) = setup();
        assert_eq!(id(&tree, resolve(&tree, "this", b, b)), Some("b"));
        assert_eq!(id(&tree, resolve(&tree, "closest form", b, b)), Some("f"));
        assert_eq!(id(&tree, resolve(&tree, "next", b, b)), Some("s"));
        assert_eq!(id(&tree, resolve(&tree, "next .note", b, b)), Some("n2"));
        assert_eq!(id(&tree, resolve(&tree, "previous .note", b, b)), Some("n1"));
        assert_eq!(resolve(&tree, "previous", b, b), None);
        assert_eq!(resolve(&tree, "document", b, b), Some(tree.root()));
    }

    #[test]
    fn test_find_and_css() {
        let (tree, b) = setup();
        let form = tree.query_selector(tree.root(), "#f").unwrap();
        assert_eq!(id(&tree, resolve(&tree, "find span", form, form)), Some("s"));
        assert_eq!(id(&tree, resolve(&tree, "#n2", b, b)), Some("n2"));
        assert_eq!(resolve(&tree, "#missing", b, b), None);
    }

    #[test]
    fn test_this_uses_source() {
        let (tree, b) = setup();
        let form = tree.query_selector(tree.root(), "#f").unwrap();
        assert_eq!(resolve(&tree, "this", b, form), Some(form));
    }

    #[test]
    fn test_resolve_all_and_list() {
        let (tree, b) = setup();
        assert_eq!(resolve_all(&tree, ".note", b, b).len(), 2);
        assert_eq!(resolve_all(&tree, "closest div", b, b).len(), 1);
        assert_eq!(resolve_list(&tree, "#n1, #s", b, b).len(), 2);
    }
}
