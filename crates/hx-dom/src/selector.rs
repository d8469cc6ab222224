//! Element Query and Selectors
//!
//! querySelector, querySelectorAll, closest, matches over a CSS subset:
//! type, universal, `#id`, `.class`, attribute selectors (`[a]`, `[a=v]`,
//! `[a~=v]`, `[a^=v]`, `[a$=v]`, `[a*=v]`), descendant and child combinators,
//! and comma separated selector lists.

use crate::{DomTree, ElementData, NodeId};

/// Element query trait
pub trait ElementQuery {
    /// First descendant of `root` matching the selector
    fn query_selector(&self, root: NodeId, selector: &str) -> Option<NodeId>;

    /// All descendants of `root` matching the selector, in document order
    fn query_selector_all(&self, root: NodeId, selector: &str) -> Vec<NodeId>;

    /// Closest inclusive ancestor matching selector
    fn closest(&self, element: NodeId, selector: &str) -> Option<NodeId>;

    /// Check if element matches selector
    fn matches(&self, element: NodeId, selector: &str) -> bool;
}

/// Selector parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character '{0}' in selector")]
    Unexpected(char),
    #[error("unterminated attribute selector")]
    UnterminatedAttribute,
}

/// Parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<ComplexSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
    /// Compounds left to right; the combinator relates a compound to the one before it
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: Option<(AttrOp, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Includes,
    Prefix,
    Suffix,
    Substring,
}

impl Selector {
    /// Parse a selector list
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let alternatives = split_top_level(input)
            .into_iter()
            .map(ComplexSelector::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if alternatives.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { alternatives })
    }

    /// Does `node` match any alternative
    pub fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        self.alternatives.iter().any(|c| c.matches(tree, node))
    }
}

fn split_top_level(input: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                out.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(input[start..].trim());
    out.retain(|s| !s.is_empty());
    out
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

impl ComplexSelector {
    fn parse(input: &str) -> Result<Self, SelectorError> {
        let chars: Vec<char> = input.chars().collect();
        let mut pos = 0;
        let mut parts = Vec::new();
        let mut pending = Combinator::Descendant;

        loop {
            while pos < chars.len() && chars[pos].is_whitespace() {
                pos += 1;
            }
            let Some(&c) = chars.get(pos) else { break };
            if c == '>' {
                if parts.is_empty() {
                    return Err(SelectorError::Unexpected('>'));
                }
                pending = Combinator::Child;
                pos += 1;
                continue;
            }
            let compound = parse_compound(&chars, &mut pos)?;
            parts.push((pending, compound));
            pending = Combinator::Descendant;
        }

        if parts.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { parts })
    }

    fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        self.matches_at(tree, node, self.parts.len() - 1)
    }

    fn matches_at(&self, tree: &DomTree, node: NodeId, idx: usize) -> bool {
        let (combinator, compound) = &self.parts[idx];
        let Some(elem) = tree.element(node) else {
            return false;
        };
        if !compound.matches(elem) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => tree
                .parent(node)
                .is_some_and(|p| self.matches_at(tree, p, idx - 1)),
            Combinator::Descendant => tree
                .ancestors(node)
                .any(|a| self.matches_at(tree, a, idx - 1)),
        }
    }
}

fn read_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(chars: &[char], pos: &mut usize) -> Result<Compound, SelectorError> {
    let mut compound = Compound::default();
    let mut consumed = false;

    while let Some(&c) = chars.get(*pos) {
        if c.is_whitespace() || c == '>' {
            break;
        }
        match c {
            '*' => {
                *pos += 1;
            }
            '#' => {
                *pos += 1;
                let id = read_ident(chars, pos);
                if id.is_empty() {
                    return Err(SelectorError::Unexpected('#'));
                }
                compound.id = Some(id);
            }
            '.' => {
                *pos += 1;
                let class = read_ident(chars, pos);
                if class.is_empty() {
                    return Err(SelectorError::Unexpected('.'));
                }
                compound.classes.push(class);
            }
            '[' => {
                *pos += 1;
                compound.attrs.push(parse_attr(chars, pos)?);
            }
            c if is_ident_char(c) => {
                compound.tag = Some(read_ident(chars, pos).to_ascii_lowercase());
            }
            other => return Err(SelectorError::Unexpected(other)),
        }
        consumed = true;
    }

    if !consumed {
        return Err(SelectorError::Empty);
    }
    Ok(compound)
}

fn parse_attr(chars: &[char], pos: &mut usize) -> Result<AttrSelector, SelectorError> {
    let end = chars[*pos..]
        .iter()
        .position(|&c| c == ']')
        .ok_or(SelectorError::UnterminatedAttribute)?;
    let body: String = chars[*pos..*pos + end].iter().collect();
    *pos += end + 1;

    let ops = [
        ("~=", AttrOp::Includes),
        ("^=", AttrOp::Prefix),
        ("$=", AttrOp::Suffix),
        ("*=", AttrOp::Substring),
        ("=", AttrOp::Equals),
    ];
    for (token, op) in ops {
        if let Some((name, value)) = body.split_once(token) {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            return Ok(AttrSelector {
                name: name.trim().to_ascii_lowercase(),
                op: Some((op, value.to_string())),
            });
        }
    }
    let name = body.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(SelectorError::Empty);
    }
    Ok(AttrSelector { name, op: None })
}

impl Compound {
    fn matches(&self, elem: &ElementData) -> bool {
        if let Some(tag) = &self.tag {
            if &elem.tag != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if elem.id() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| elem.has_class(c)) {
            return false;
        }
        self.attrs.iter().all(|a| a.matches(elem))
    }
}

impl AttrSelector {
    fn matches(&self, elem: &ElementData) -> bool {
        let Some(actual) = elem.get_attr(&self.name) else {
            return false;
        };
        match &self.op {
            None => true,
            Some((AttrOp::Equals, v)) => actual == v,
            Some((AttrOp::Includes, v)) => actual.split_whitespace().any(|w| w == v),
            Some((AttrOp::Prefix, v)) => actual.starts_with(v.as_str()),
            Some((AttrOp::Suffix, v)) => actual.ends_with(v.as_str()),
            Some((AttrOp::Substring, v)) => actual.contains(v.as_str()),
        }
    }
}

fn parse_or_warn(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("invalid selector {:?}: {}", selector, e);
            None
        }
    }
}

impl ElementQuery for DomTree {
    fn query_selector(&self, root: NodeId, selector: &str) -> Option<NodeId> {
        let sel = parse_or_warn(selector)?;
        self.descendants(root).find(|&d| sel.matches(self, d))
    }

    fn query_selector_all(&self, root: NodeId, selector: &str) -> Vec<NodeId> {
        let Some(sel) = parse_or_warn(selector) else {
            return Vec::new();
        };
        self.descendants(root).filter(|&d| sel.matches(self, d)).collect()
    }

    fn closest(&self, element: NodeId, selector: &str) -> Option<NodeId> {
        let sel = parse_or_warn(selector)?;
        std::iter::once(element)
            .chain(self.ancestors(element))
            .find(|&n| sel.matches(self, n))
    }

    fn matches(&self, element: NodeId, selector: &str) -> bool {
        parse_or_warn(selector).is_some_and(|s| s.matches(self, element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (DomTree, NodeId, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let form = tree.create_element_with_attrs("form", &[("id", "f"), ("class", "box wide")]);
        let div = tree.create_element_with_attrs("div", &[("data-role", "row")]);
        let input = tree.create_element_with_attrs("input", &[("name", "q"), ("type", "text")]);
        tree.append_child(NodeId::ROOT, form).unwrap();
        tree.append_child(form, div).unwrap();
        tree.append_child(div, input).unwrap();
        (tree, form, div, input)
    }

    #[test]
    fn test_simple_selectors() {
        let (tree, form, div, input) = tree();
        assert!(tree.matches(form, "form"));
        assert!(tree.matches(form, "#f"));
        assert!(tree.matches(form, ".box.wide"));
        assert!(tree.matches(div, "[data-role]"));
        assert!(tree.matches(div, "[data-role=row]"));
        assert!(tree.matches(input, "input[name='q']"));
        assert!(tree.matches(input, "*"));
        assert!(!tree.matches(input, "[name^=x]"));
    }

    #[test]
    fn test_combinators() {
        let (tree, _, _, input) = tree();
        assert!(tree.matches(input, "form input"));
        assert!(tree.matches(input, "div > input"));
        assert!(!tree.matches(input, "form > input"));
        assert!(tree.matches(input, "#f > div > input"));
    }

    #[test]
    fn test_selector_list() {
        let (tree, form, div, _) = tree();
        let all = tree.query_selector_all(NodeId::ROOT, "div, form");
        assert_eq!(all, vec![form, div]);
    }

    #[test]
    fn test_closest_is_inclusive() {
        let (tree, form, div, input) = tree();
        assert_eq!(tree.closest(input, "form"), Some(form));
        assert_eq!(tree.closest(div, "div"), Some(div));
        assert_eq!(tree.closest(input, "table"), None);
    }

    #[test]
    fn test_invalid_selector() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("> a").is_err());
        assert!(Selector::parse("[name").is_err());
        let (tree, ..) = tree();
        assert_eq!(tree.query_selector(NodeId::ROOT, "a:hover"), None);
    }
}
