//! Attribute Resolver
//!
//! Computes the effective `hx-*` configuration of an element from the element
//! and its ancestors. Scalar options are nearest-wins, `hx-ext` is a union
//! with `ignore:` negation, and `hx-vals` merges objects key by key.

use crate::config::Config;
use hx_dom::{DomTree, NodeId};
use hx_net::Method;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Options resolved through the ancestor chain
pub const INHERITED: &[&str] = &[
    "hx-target",
    "hx-swap",
    "hx-sync",
    "hx-include",
    "hx-params",
    "hx-headers",
    "hx-indicator",
    "hx-disabled-elt",
    "hx-push-url",
    "hx-replace-url",
    "hx-select",
    "hx-select-oob",
    "hx-confirm",
    "hx-prompt",
    "hx-boost",
    "hx-encoding",
];

/// Request verbs, never inherited
pub const VERBS: &[(&str, Method)] = &[
    ("hx-get", Method::Get),
    ("hx-post", Method::Post),
    ("hx-put", Method::Put),
    ("hx-patch", Method::Patch),
    ("hx-delete", Method::Delete),
];

/// Immutable configuration snapshot for one element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAttributes {
    /// The element's own verb and URL
    pub verb: Option<(Method, String)>,
    /// option name -> (value, element that declared it)
    options: HashMap<&'static str, (String, NodeId)>,
    /// Enabled extension names, nearest first
    pub extensions: Vec<String>,
    /// Merged `hx-vals`
    pub vals: Map<String, Value>,
}

impl ResolvedAttributes {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(|(v, _)| v.as_str())
    }

    /// Element that declared `name`
    pub fn source(&self, name: &str) -> Option<NodeId> {
        self.options.get(name).map(|(_, n)| *n)
    }

    /// `hx-boost="true"` in effect
    pub fn boosted(&self) -> bool {
        self.get("hx-boost") == Some("true")
    }

    /// Parsed `hx-headers` (invalid JSON yields nothing)
    pub fn headers(&self) -> Vec<(String, String)> {
        let Some(raw) = self.get("hx-headers") else {
            return Vec::new();
        };
        match serde_json::from_str::<Map<String, Value>>(raw) {
            Ok(map) => map.into_iter().map(|(k, v)| (k, value_to_string(&v))).collect(),
            Err(e) => {
                tracing::warn!("Ignoring invalid hx-headers {:?}: {}", raw, e);
                Vec::new()
            }
        }
    }
}

/// Render a JSON value as a form value
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Names an ancestor withholds from its descendants
#[derive(Default)]
struct Blocked {
    all: bool,
    names: HashSet<String>,
}

impl Blocked {
    fn blocks(&self, name: &str) -> bool {
        self.all || self.names.contains(name)
    }

    fn add(&mut self, directive: &str) {
        for token in directive.split_whitespace() {
            if token == "*" {
                self.all = true;
            } else {
                self.names.insert(token.to_string());
            }
        }
    }
}

/// Whether an ancestor lets `name` through under `disable_inheritance`
fn explicitly_inherited(tree: &DomTree, ancestor: NodeId, name: &str) -> bool {
    tree.get_attribute(ancestor, "hx-inherit")
        .is_some_and(|v| v.split_whitespace().any(|t| t == "*" || t == name))
}

/// Resolve `node` without caching
pub fn resolve(tree: &DomTree, node: NodeId, config: &Config) -> ResolvedAttributes {
    let mut resolved = ResolvedAttributes {
        verb: VERBS.iter().find_map(|(attr, method)| {
            tree.get_attribute(node, attr).map(|url| (*method, url.to_string()))
        }),
        ..Default::default()
    };

    let mut blocked = Blocked::default();
    let mut ignored_ext: HashSet<String> = HashSet::new();

    let chain = std::iter::once(node).chain(tree.ancestors(node));
    for (depth, elem) in chain.enumerate() {
        if !tree.is_element(elem) {
            continue;
        }
        let inherited = depth > 0;
        if inherited {
            // hx-disinherit applies to this ancestor and everything above it
            if let Some(directive) = tree.get_attribute(elem, "hx-disinherit") {
                blocked.add(directive);
            }
        }
        let allowed = |name: &str| {
            !inherited
                || (!blocked.blocks(name)
                    && (!config.disable_inheritance || explicitly_inherited(tree, elem, name)))
        };

        for &name in INHERITED {
            if resolved.options.contains_key(name) || !allowed(name) {
                continue;
            }
            if let Some(value) = tree.get_attribute(elem, name) {
                resolved.options.insert(name, (value.to_string(), elem));
            }
        }

        if allowed("hx-ext") {
            if let Some(exts) = tree.get_attribute(elem, "hx-ext") {
                for token in exts.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    if let Some(name) = token.strip_prefix("ignore:") {
                        ignored_ext.insert(name.trim().to_string());
                    } else if !ignored_ext.contains(token) && !resolved.extensions.iter().any(|e| e == token) {
                        resolved.extensions.push(token.to_string());
                    }
                }
            }
        }

        if allowed("hx-vals") {
            if let Some(raw) = tree.get_attribute(elem, "hx-vals") {
                match serde_json::from_str::<Map<String, Value>>(raw) {
                    Ok(map) => {
                        for (k, v) in map {
                            resolved.vals.entry(k).or_insert(v);
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring invalid hx-vals {:?}: {}", raw, e),
                }
            }
        }
    }
    resolved
}

/// Per-node cache of resolved snapshots, valid for one DOM generation
#[derive(Debug, Default)]
pub struct AttributeResolver {
    generation: u64,
    cache: HashMap<NodeId, Rc<ResolvedAttributes>>,
}

impl AttributeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `node`, reusing the cached snapshot while the DOM is unchanged
    pub fn resolve(&mut self, tree: &DomTree, node: NodeId, config: &Config) -> Rc<ResolvedAttributes> {
        if self.generation != tree.generation() {
            self.cache.clear();
            self.generation = tree.generation();
        }
        self.cache
            .entry(node)
            .or_insert_with(|| Rc::new(resolve(tree, node, config)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hx_dom::ElementQuery;

    fn tree_from(html: &str) -> DomTree {
        hx_html::parse_document(html, "http://localhost/").unwrap().tree
    }

    fn find(tree: &DomTree, sel: &str) -> NodeId {
        tree.query_selector(tree.root(), sel).unwrap()
    }

    #[test]
    fn test_nearest_wins() {
        let tree = tree_from(
            r##"<div hx-target="#outer" hx-swap="outerHTML"><p hx-target="#inner"><button id="b" hx-post="/x"></button></p></div>"##,
        );
        let b = find(&tree, "#b");
        let r = resolve(&tree, b, &Config::default());

        assert_eq!(r.verb, Some((Method::Post, "/x".to_string())));
        assert_eq!(r.get("hx-target"), Some("#inner"));
        assert_eq!(r.get("hx-swap"), Some("outerHTML"));
        assert_eq!(r.source("hx-swap"), Some(find(&tree, "div")));
    }

    #[test]
    fn test_verbs_not_inherited() {
        let tree = tree_from(r#"<div hx-get="/a"><span id="s"></span></div>"#);
        let r = resolve(&tree, find(&tree, "#s"), &Config::default());
        assert!(r.verb.is_none());
    }

    #[test]
    fn test_disinherit_blocks_ancestor_and_above() {
        let tree = tree_from(
            r#"<section hx-swap="delete" hx-target="body"><div hx-disinherit="hx-target" hx-swap="none"><a id="a"></a></div></section>"#,
        );
        let r = resolve(&tree, find(&tree, "#a"), &Config::default());
        assert_eq!(r.get("hx-target"), None);
        assert_eq!(r.get("hx-swap"), Some("none"));
    }

    #[test]
    fn test_disinherit_all() {
        let tree = tree_from(r#"<div hx-disinherit="*" hx-swap="none" hx-ext="a"><a id="a"></a></div>"#);
        let r = resolve(&tree, find(&tree, "#a"), &Config::default());
        assert_eq!(r.get("hx-swap"), None);
        assert!(r.extensions.is_empty());
    }

    #[test]
    fn test_disable_inheritance_with_hx_inherit() {
        let tree = tree_from(
            r##"<div hx-inherit="hx-select" hx-select="#x" hx-swap="none"><a id="a"></a></div>"##,
        );
        let config = Config {
            disable_inheritance: true,
            ..Config::default()
        };
        let r = resolve(&tree, find(&tree, "#a"), &config);
        assert_eq!(r.get("hx-select"), Some("#x"));
        assert_eq!(r.get("hx-swap"), None);
    }

    #[test]
    fn test_extension_union_and_ignore() {
        let tree = tree_from(
            r#"<body hx-ext="json-enc, debug"><div hx-ext="ignore:debug, morph"><a id="a" hx-ext="json-enc"></a></div></body>"#,
        );
        let r = resolve(&tree, find(&tree, "#a"), &Config::default());
        assert_eq!(r.extensions, vec!["json-enc".to_string(), "morph".to_string()]);
    }

    #[test]
    fn test_vals_merge_nearest_key_wins() {
        let tree = tree_from(
            r#"<div hx-vals='{"a": 1, "b": "outer"}'><a id="a" hx-vals='{"b": "inner"}'></a></div>"#,
        );
        let r = resolve(&tree, find(&tree, "#a"), &Config::default());
        assert_eq!(r.vals["a"], 1);
        assert_eq!(r.vals["b"], "inner");
    }

    #[test]
    fn test_cache_invalidated_by_generation() {
        let mut tree = tree_from(r#"<div hx-swap="none"><a id="a"></a></div>"#);
        let a = find(&tree, "#a");
        let div = find(&tree, "div");
        let config = Config::default();
        let mut resolver = AttributeResolver::new();

        let first = resolver.resolve(&tree, a, &config);
        let again = resolver.resolve(&tree, a, &config);
        assert!(Rc::ptr_eq(&first, &again));

        tree.set_attribute(div, "hx-swap", "delete").unwrap();
        let after = resolver.resolve(&tree, a, &config);
        assert_eq!(after.get("hx-swap"), Some("delete"));
    }

    #[test]
    fn test_headers_json() {
        let tree = tree_from(r#"<a id="a" hx-headers='{"X-Token": "t", "X-Num": 3}'></a>"#);
        let r = resolve(&tree, find(&tree, "#a"), &Config::default());
        let mut headers = r.headers();
        headers.sort();
        assert_eq!(headers, vec![("X-Num".into(), "3".into()), ("X-Token".into(), "t".into())]);
    }
}
