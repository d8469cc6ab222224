//! Response header directives
//!
//! `HX-Trigger*` values are either a comma list of event names or a JSON
//! object of name to detail. `HX-Location` is a path or a JSON object.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Events to fire from an `HX-Trigger`, `HX-Trigger-After-Swap` or
/// `HX-Trigger-After-Settle` value
pub fn parse_trigger_header(value: &str) -> Vec<(String, Value)> {
    let value = value.trim();
    if value.starts_with('{') {
        match serde_json::from_str::<Map<String, Value>>(value) {
            Ok(map) => return map.into_iter().collect(),
            Err(e) => tracing::warn!("Invalid JSON trigger header {:?}: {}", value, e),
        }
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('{'))
        .map(|name| (name.to_string(), Value::Object(Map::new())))
        .collect()
}

/// Parsed `HX-Location`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocationDirective {
    pub path: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub swap: Option<String>,
    #[serde(default)]
    pub select: Option<String>,
}

impl LocationDirective {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.starts_with('{') {
            return serde_json::from_str(value)
                .map_err(|e| tracing::warn!("Invalid HX-Location {:?}: {}", value, e))
                .ok();
        }
        (!value.is_empty()).then(|| Self {
            path: value.to_string(),
            target: None,
            swap: None,
            select: None,
        })
    }
}

/// `HX-Push-Url` / `hx-push-url` style value: `false` disables, `true`
/// means the request URL, anything else is a URL
pub fn history_directive(value: &str, request_url: &str) -> Option<String> {
    match value.trim() {
        "false" | "" => None,
        "true" => Some(request_url.to_string()),
        url => Some(url.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trigger_list() {
        let events = parse_trigger_header("saved, refresh");
        let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["saved", "refresh"]);
    }

    #[test]
    fn test_trigger_json() {
        let events = parse_trigger_header(r#"{"showMessage": {"level": "info"}}"#);
        assert_eq!(events, vec![("showMessage".to_string(), json!({"level": "info"}))]);
    }

    #[test]
    fn test_location() {
        assert_eq!(LocationDirective::parse("/next").unwrap().path, "/next");
        let loc = LocationDirective::parse(r##"{"path": "/p", "target": "#main"}"##).unwrap();
        assert_eq!(loc.target.as_deref(), Some("#main"));
        assert!(LocationDirective::parse("{bad").is_none());
    }

    #[test]
    fn test_history_directive() {
        assert_eq!(history_directive("false", "/a"), None);
        assert_eq!(history_directive("true", "/a").as_deref(), Some("/a"));
        assert_eq!(history_directive("/b", "/a").as_deref(), Some("/b"));
    }
}
