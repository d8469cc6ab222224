//! Swap strategies and `hx-swap` parsing
//!
//! Applying a swap is a synchronous splice of detached fragment nodes into
//! the live tree. Timing (swap/settle delays) is handled by the exchange.

use crate::time::parse_interval;
use hx_dom::{DomResult, DomTree, NodeId};
use std::time::Duration;

/// How response content is placed relative to the target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SwapStyle {
    /// Replace the target's children
    #[default]
    InnerHtml,
    /// Replace the target itself
    OuterHtml,
    /// Insert before the target
    BeforeBegin,
    /// Insert before the target's first child
    AfterBegin,
    /// Append inside the target
    BeforeEnd,
    /// Insert after the target
    AfterEnd,
    /// Remove the target
    Delete,
    /// Change nothing
    None,
    /// Provided by an extension
    Custom(String),
}

impl SwapStyle {
    /// Parse a style name; unknown names become [`SwapStyle::Custom`]
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "innerhtml" => SwapStyle::InnerHtml,
            "outerhtml" => SwapStyle::OuterHtml,
            "beforebegin" => SwapStyle::BeforeBegin,
            "afterbegin" => SwapStyle::AfterBegin,
            "beforeend" => SwapStyle::BeforeEnd,
            "afterend" => SwapStyle::AfterEnd,
            "delete" => SwapStyle::Delete,
            "none" => SwapStyle::None,
            _ => SwapStyle::Custom(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SwapStyle::InnerHtml => "innerHTML",
            SwapStyle::OuterHtml => "outerHTML",
            SwapStyle::BeforeBegin => "beforebegin",
            SwapStyle::AfterBegin => "afterbegin",
            SwapStyle::BeforeEnd => "beforeend",
            SwapStyle::AfterEnd => "afterend",
            SwapStyle::Delete => "delete",
            SwapStyle::None => "none",
            SwapStyle::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for SwapStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPosition {
    Top,
    Bottom,
}

/// `scroll:` / `show:` modifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollSpec {
    /// Selector, `window`, or `None` for the swap target
    pub selector: Option<String>,
    pub position: ScrollPosition,
}

impl ScrollSpec {
    fn parse(value: &str) -> Option<Self> {
        let (selector, position) = match value.rsplit_once(':') {
            Some((sel, pos)) => (Some(sel.to_string()), pos),
            None => (None, value),
        };
        let position = match position {
            "top" => ScrollPosition::Top,
            "bottom" => ScrollPosition::Bottom,
            _ => return None,
        };
        Some(Self { selector, position })
    }
}

/// Parsed `hx-swap`
#[derive(Debug, Clone, PartialEq)]
pub struct SwapSpec {
    pub style: SwapStyle,
    pub swap_delay: Duration,
    pub settle_delay: Duration,
    pub scroll: Option<ScrollSpec>,
    pub show: Option<ScrollSpec>,
    pub focus_scroll: Option<bool>,
    pub ignore_title: bool,
}

impl SwapSpec {
    /// Spec with the given style and default timings
    pub fn with_defaults(style: SwapStyle, swap_delay: Duration, settle_delay: Duration) -> Self {
        Self {
            style,
            swap_delay,
            settle_delay,
            scroll: None,
            show: None,
            focus_scroll: None,
            ignore_title: false,
        }
    }

    /// Parse `<style> [swap:T] [settle:T] [scroll:..] [show:..] [focus-scroll:bool] [ignoreTitle:bool]`
    /// on top of `defaults`. Invalid modifiers are ignored with a warning.
    pub fn parse(input: &str, defaults: &SwapSpec) -> Self {
        let mut spec = defaults.clone();
        let mut tokens = input.split_whitespace().peekable();

        if let Some(first) = tokens.peek() {
            if !first.contains(':') {
                spec.style = SwapStyle::parse(first);
                tokens.next();
            }
        }

        for token in tokens {
            let (key, value) = token.split_once(':').unwrap_or((token, ""));
            let ok = match key {
                "swap" => parse_interval(value).map(|d| spec.swap_delay = d).is_some(),
                "settle" => parse_interval(value).map(|d| spec.settle_delay = d).is_some(),
                "scroll" => ScrollSpec::parse(value).map(|s| spec.scroll = Some(s)).is_some(),
                "show" => ScrollSpec::parse(value).map(|s| spec.show = Some(s)).is_some(),
                "focus-scroll" => value.parse().map(|b| spec.focus_scroll = Some(b)).is_ok(),
                "ignoreTitle" => value.parse().map(|b| spec.ignore_title = b).is_ok(),
                // Transitions need a renderer
                "transition" => true,
                _ => false,
            };
            if !ok {
                tracing::warn!("Ignoring swap modifier {:?}", token);
            }
        }
        spec
    }
}

/// Result of a built-in swap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Inserted top-level nodes
    pub added: Vec<NodeId>,
    /// Detached top-level nodes
    pub removed: Vec<NodeId>,
}

/// Apply a built-in strategy. `Custom` styles are not handled here and
/// leave the DOM unchanged.
pub fn apply(tree: &mut DomTree, style: &SwapStyle, target: NodeId, fragment: &[NodeId]) -> DomResult<SwapOutcome> {
    let mut outcome = SwapOutcome::default();
    match style {
        SwapStyle::InnerHtml => {
            outcome.removed = tree.remove_children(target)?;
            for &node in fragment {
                tree.append_child(target, node)?;
            }
            outcome.added = fragment.to_vec();
        }
        SwapStyle::OuterHtml => match tree.parent(target) {
            Some(parent) if parent != tree.root() => {
                for &node in fragment {
                    tree.insert_before(parent, node, Some(target))?;
                }
                tree.remove(target)?;
                outcome.removed.push(target);
                outcome.added = fragment.to_vec();
            }
            // The root element cannot be replaced; fall back to inner
            _ => return apply(tree, &SwapStyle::InnerHtml, target, fragment),
        },
        SwapStyle::BeforeBegin | SwapStyle::AfterEnd => {
            let Some(parent) = tree.parent(target) else {
                return Ok(outcome);
            };
            let reference = if *style == SwapStyle::BeforeBegin {
                Some(target)
            } else {
                tree.get(target).and_then(|n| n.next_sibling())
            };
            for &node in fragment {
                tree.insert_before(parent, node, reference)?;
            }
            outcome.added = fragment.to_vec();
        }
        SwapStyle::AfterBegin => {
            let first = tree.get(target).and_then(|n| n.first_child());
            for &node in fragment {
                tree.insert_before(target, node, first)?;
            }
            outcome.added = fragment.to_vec();
        }
        SwapStyle::BeforeEnd => {
            for &node in fragment {
                tree.append_child(target, node)?;
            }
            outcome.added = fragment.to_vec();
        }
        SwapStyle::Delete => {
            tree.remove(target)?;
            outcome.removed.push(target);
        }
        SwapStyle::None | SwapStyle::Custom(_) => {}
    }
    Ok(outcome)
}
