//! Engine Configuration
//!
//! Global options, fixed at engine creation. Can be read from JSON or from a
//! `<meta name="hx-config" content="{...}">` element in the page.

use crate::error::EngineError;
use crate::swap::SwapStyle;
use crate::sync::SyncStrategy;
use hx_dom::{Document, ElementQuery};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Record history snapshots on push/replace
    pub history_enabled: bool,
    /// Maximum cached snapshots (0 disables the cache)
    pub history_cache_size: usize,
    /// On a cache miss, ask the host for a full reload instead of fetching
    pub refresh_on_history_miss: bool,
    pub default_swap_style: String,
    #[serde(deserialize_with = "interval")]
    pub default_swap_delay: Duration,
    #[serde(deserialize_with = "interval")]
    pub default_settle_delay: Duration,
    /// Request timeout, zero for none
    #[serde(deserialize_with = "interval")]
    pub timeout: Duration,
    /// Refuse requests to other origins
    pub self_requests_only: bool,
    /// Swap 4xx/5xx bodies (flagged as errors)
    pub swap_error_responses: bool,
    /// Coordination used when no `hx-sync` applies
    pub default_sync: String,
    /// Only inherit attributes an ancestor lists in `hx-inherit`
    pub disable_inheritance: bool,
    pub request_class: String,
    pub added_class: String,
    pub settling_class: String,
    pub swapping_class: String,
    /// Honour `hx-swap-oob` below the top level of a response
    pub allow_nested_oob_swaps: bool,
    pub scroll_into_view_on_boost: bool,
    /// Methods whose parameters go in the query string
    pub methods_that_use_url_params: Vec<String>,
    /// Finished requests kept for inspection; unfinished ones are always kept
    pub request_log_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_enabled: true,
            history_cache_size: 10,
            refresh_on_history_miss: false,
            default_swap_style: "innerHTML".into(),
            default_swap_delay: Duration::ZERO,
            default_settle_delay: Duration::from_millis(20),
            timeout: Duration::ZERO,
            self_requests_only: true,
            swap_error_responses: true,
            default_sync: "queue last".into(),
            disable_inheritance: false,
            request_class: "hx-request".into(),
            added_class: "hx-added".into(),
            settling_class: "hx-settling".into(),
            swapping_class: "hx-swapping".into(),
            allow_nested_oob_swaps: true,
            scroll_into_view_on_boost: true,
            methods_that_use_url_params: vec!["get".into(), "delete".into()],
            request_log_size: 64,
        }
    }
}

impl Config {
    /// Parse a JSON object; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read `<meta name="hx-config">` from a page, falling back to defaults
    pub fn from_document(doc: &Document) -> Result<Self, EngineError> {
        let tree = doc.tree();
        match tree
            .query_selector(tree.root(), "meta[name=hx-config]")
            .and_then(|meta| tree.get_attribute(meta, "content"))
        {
            Some(content) => Self::from_json(content),
            None => Ok(Self::default()),
        }
    }

    /// Default swap style, parsed
    pub fn swap_style(&self) -> SwapStyle {
        SwapStyle::parse(&self.default_swap_style)
    }

    /// Default sync strategy, parsed (invalid values fall back to `queue last`)
    pub fn sync_strategy(&self) -> SyncStrategy {
        SyncStrategy::parse(&self.default_sync).unwrap_or_else(|| {
            tracing::warn!("Invalid defaultSync {:?}, using queue last", self.default_sync);
            SyncStrategy::default()
        })
    }

    /// Whether `method` sends its parameters in the URL
    pub fn uses_url_params(&self, method: hx_net::Method) -> bool {
        self.methods_that_use_url_params
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }
}

/// Accept either a millisecond count or an interval string such as `"1s"`
fn interval<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        Raw::Text(s) => crate::time::parse_interval(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid interval: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.history_cache_size, 10);
        assert_eq!(config.request_log_size, 64);
        assert_eq!(config.default_settle_delay, Duration::from_millis(20));
        assert_eq!(config.swap_style(), SwapStyle::InnerHtml);
        assert!(config.uses_url_params(hx_net::Method::Delete));
        assert!(!config.uses_url_params(hx_net::Method::Post));
    }

    #[test]
    fn test_from_json_partial() {
        let config = Config::from_json(r#"{"historyCacheSize": 3, "timeout": "2s", "defaultSwapDelay": 15}"#).unwrap();
        assert_eq!(config.history_cache_size, 3);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.default_swap_delay, Duration::from_millis(15));
        assert!(config.self_requests_only);
    }

    #[test]
    fn test_from_json_rejects_bad_interval() {
        assert!(Config::from_json(r#"{"timeout": "later"}"#).is_err());
    }

    #[test]
    fn test_from_document_meta() {
        let doc = hx_html::parse_document(
            r#"<head><meta name="hx-config" content='{"defaultSwapStyle": "outerHTML"}'></head>"#,
            "http://localhost/",
        )
        .unwrap();
        let config = Config::from_document(&doc).unwrap();
        assert_eq!(config.swap_style(), SwapStyle::OuterHtml);
    }

    #[test]
    fn test_from_document_without_meta() {
        let doc = hx_dom::Document::new("http://localhost/");
        assert_eq!(Config::from_document(&doc).unwrap().history_cache_size, 10);
    }
}
