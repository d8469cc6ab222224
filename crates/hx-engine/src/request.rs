//! Request model
//!
//! [`RequestConfig`] is the fully resolved description of one exchange;
//! [`ActiveRequest`] tracks its lifecycle. Parameter collection and body
//! encoding live here too.

use crate::attributes::{value_to_string, ResolvedAttributes};
use crate::error::{FailureKind, TransitionError};
use crate::swap::SwapSpec;
use hx_dom::{DomTree, ElementQuery, NodeId};
use hx_net::Method;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Identifier of one exchange, unique per engine
pub type RequestId = u64;

/// Exchange lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Sending,
    AwaitingResponse,
    Swapping,
    Settling,
    Completed,
    Aborted,
    Failed(FailureKind),
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Aborted | RequestState::Failed(_))
    }

    /// Whether `self -> to` is a legal step
    pub fn can_transition(&self, to: &RequestState) -> bool {
        use RequestState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, to),
            (Queued, Sending)
                | (Sending, AwaitingResponse)
                | (AwaitingResponse, Swapping)
                | (AwaitingResponse, Completed)
                | (Swapping, Settling)
                | (Swapping, Completed)
                | (Settling, Completed)
                | (_, Aborted)
                | (_, Failed(_))
        )
    }
}

/// Lifecycle record of one exchange
#[derive(Debug, Clone)]
pub struct ActiveRequest {
    pub id: RequestId,
    pub element: NodeId,
    pub method: Method,
    pub url: String,
    /// Coordination scope (`None` when uncoordinated)
    pub scope: Option<NodeId>,
    state: RequestState,
    /// Non-fatal problems reported along the way
    pub failures: Vec<FailureKind>,
    /// Elements given the request class / `disabled` while in flight
    pub indicators: Vec<NodeId>,
    pub disabled: Vec<NodeId>,
}

impl ActiveRequest {
    pub fn new(id: RequestId, config: &RequestConfig, scope: Option<NodeId>) -> Self {
        Self {
            id,
            element: config.element,
            method: config.method,
            url: config.url.clone(),
            scope,
            state: RequestState::Queued,
            failures: Vec::new(),
            indicators: Vec::new(),
            disabled: Vec::new(),
        }
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Move to `to`, rejecting illegal transitions
    pub fn transition(&mut self, to: RequestState) -> Result<(), TransitionError> {
        if !self.state.can_transition(&to) {
            return Err(TransitionError {
                from: self.state.clone(),
                to,
            });
        }
        tracing::debug!("request {} {:?} -> {:?}", self.id, self.state, to);
        self.state = to;
        Ok(())
    }
}

/// Requests still running plus a bounded tail of finished ones
#[derive(Debug)]
pub(crate) struct RequestLog {
    records: BTreeMap<RequestId, ActiveRequest>,
    finished: VecDeque<RequestId>,
    capacity: usize,
}

impl RequestLog {
    /// Keep at most `capacity` finished records
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            finished: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn insert(&mut self, record: ActiveRequest) {
        self.records.insert(record.id, record);
    }

    pub(crate) fn get(&self, id: RequestId) -> Option<&ActiveRequest> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: RequestId) -> Option<&mut ActiveRequest> {
        self.records.get_mut(&id)
    }

    /// Every retained record, oldest first
    pub(crate) fn values(&self) -> impl Iterator<Item = &ActiveRequest> {
        self.records.values()
    }

    /// Transition `id`; `None` when the record is unknown or evicted
    pub(crate) fn transition(&mut self, id: RequestId, to: RequestState) -> Option<Result<(), TransitionError>> {
        self.records.get_mut(&id).map(|request| request.transition(to))
    }

    /// Count a terminal record towards the finished tail, evicting the
    /// oldest finished records past capacity
    pub(crate) fn retire(&mut self, id: RequestId) {
        let terminal = self.records.get(&id).is_some_and(|r| r.state().is_terminal());
        if !terminal || self.finished.contains(&id) {
            return;
        }
        self.finished.push_back(id);
        while self.finished.len() > self.capacity {
            if let Some(old) = self.finished.pop_front() {
                self.records.remove(&old);
            }
        }
    }

    /// Abort and retire every unfinished request
    pub(crate) fn abort_all(&mut self) -> Vec<RequestId> {
        let live: Vec<RequestId> = self
            .records
            .values()
            .filter(|r| !r.state().is_terminal())
            .map(|r| r.id)
            .collect();
        for &id in &live {
            let _ = self.transition(id, RequestState::Aborted);
            self.retire(id);
        }
        live
    }
}

/// Body encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    UrlEncoded,
    Multipart,
}

/// Everything needed to perform one exchange
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    /// Absolute URL, without parameters
    pub url: String,
    /// Element the exchange belongs to
    pub element: NodeId,
    /// Event that fired the trigger, if any
    pub trigger_event: Option<String>,
    pub parameters: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub encoding: Encoding,
    /// Target expression re-resolved at swap time; `None` targets `element`
    pub target: Option<String>,
    /// Element `this` refers to in `target`
    pub target_source: NodeId,
    pub swap: SwapSpec,
    pub select: Option<String>,
    pub select_oob: Option<String>,
    /// `hx-sync` value, `None` for the configured default
    pub sync: Option<String>,
    /// `hx-push-url` / `hx-replace-url` value (`true`, `false` or a URL)
    pub push_url: Option<String>,
    pub replace_url: Option<String>,
    pub boosted: bool,
    pub history_restore: bool,
    pub prompt: Option<String>,
    pub extensions: Vec<String>,
    pub indicators: Vec<NodeId>,
    pub disabled_elts: Vec<NodeId>,
}

impl RequestConfig {
    /// Minimal config for `method url` on `element`
    pub fn new(method: Method, url: &str, element: NodeId, swap: SwapSpec) -> Self {
        Self {
            method,
            url: url.to_string(),
            element,
            trigger_event: None,
            parameters: Vec::new(),
            headers: Vec::new(),
            encoding: Encoding::default(),
            target: None,
            target_source: element,
            swap,
            select: None,
            select_oob: None,
            sync: None,
            push_url: None,
            replace_url: None,
            boosted: false,
            history_restore: false,
            prompt: None,
            extensions: Vec::new(),
            indicators: Vec::new(),
            disabled_elts: Vec::new(),
        }
    }
}

const CONTROLS: &str = "input, select, textarea, button";

fn is_disabled(tree: &DomTree, node: NodeId) -> bool {
    tree.has_attribute(node, "disabled")
        || tree
            .ancestors(node)
            .any(|a| tree.tag_name(a) == Some("fieldset") && tree.has_attribute(a, "disabled"))
}

/// Current value of a form control
pub fn control_value(tree: &DomTree, node: NodeId) -> Option<String> {
    match tree.tag_name(node)? {
        "textarea" => Some(tree.text_content(node)),
        "select" => {
            let options = tree.query_selector_all(node, "option");
            let chosen = options
                .iter()
                .copied()
                .find(|&o| tree.has_attribute(o, "selected"))
                .or_else(|| options.first().copied())?;
            Some(
                tree.get_attribute(chosen, "value")
                    .map(str::to_string)
                    .unwrap_or_else(|| tree.text_content(chosen).trim().to_string()),
            )
        }
        _ => Some(tree.get_attribute(node, "value").unwrap_or("").to_string()),
    }
}

/// Name/value of one control, honouring checkbox/radio state and buttons
fn control_pair(tree: &DomTree, node: NodeId, trigger: NodeId) -> Option<(String, String)> {
    let name = tree.get_attribute(node, "name")?;
    if name.is_empty() || is_disabled(tree, node) {
        return None;
    }
    let kind = tree.get_attribute(node, "type").unwrap_or("").to_ascii_lowercase();
    let tag = tree.tag_name(node)?;
    if matches!(kind.as_str(), "checkbox" | "radio") && !tree.has_attribute(node, "checked") {
        return None;
    }
    // Submit buttons only count when they fired the request
    let is_button = tag == "button" || matches!(kind.as_str(), "submit" | "button" | "reset" | "image");
    if is_button && node != trigger {
        return None;
    }
    if kind == "file" {
        return None;
    }
    let value = match (tag, kind.as_str()) {
        ("input", "checkbox" | "radio") => tree.get_attribute(node, "value").unwrap_or("on").to_string(),
        _ => control_value(tree, node)?,
    };
    Some((name.to_string(), value))
}

/// Values of every named control inside `root` (inclusive)
fn values_within(tree: &DomTree, root: NodeId, trigger: NodeId, out: &mut Vec<(String, String)>) {
    if tree.matches(root, CONTROLS) {
        out.extend(control_pair(tree, root, trigger));
        return;
    }
    for control in tree.query_selector_all(root, CONTROLS) {
        out.extend(control_pair(tree, control, trigger));
    }
}

/// Collect request parameters for `element`.
///
/// Order: enclosing form (or the form itself), the element's own value,
/// `hx-include` elements, then `hx-vals`. Later values with the same name
/// replace earlier ones, except for repeated form fields.
pub fn collect_parameters(
    tree: &DomTree,
    element: NodeId,
    method: Method,
    resolved: &ResolvedAttributes,
    includes: &[NodeId],
) -> Vec<(String, String)> {
    let mut params = Vec::new();

    if tree.tag_name(element) == Some("form") {
        values_within(tree, element, element, &mut params);
    } else {
        if method != Method::Get {
            if let Some(form) = tree.closest(element, "form") {
                values_within(tree, form, element, &mut params);
            }
        }
        if !params.iter().any(|(n, _)| Some(n.as_str()) == tree.get_attribute(element, "name")) {
            params.extend(control_pair(tree, element, element));
        }
    }

    for &node in includes {
        let mut found = Vec::new();
        values_within(tree, node, element, &mut found);
        for pair in found {
            if !params.contains(&pair) {
                params.push(pair);
            }
        }
    }

    for (key, value) in &resolved.vals {
        params.retain(|(n, _)| n != key);
        params.push((key.clone(), value_to_string(value)));
    }

    filter_parameters(params, resolved.get("hx-params"))
}

/// Apply an `hx-params` filter: `*`, `none`, `not a,b` or `a,b`
pub fn filter_parameters(params: Vec<(String, String)>, filter: Option<&str>) -> Vec<(String, String)> {
    let Some(filter) = filter.map(str::trim) else {
        return params;
    };
    let names = |list: &str| -> Vec<String> { list.split(',').map(|s| s.trim().to_string()).collect() };
    match filter {
        "*" => params,
        "none" => Vec::new(),
        f if f.starts_with("not ") => {
            let excluded = names(&f[4..]);
            params.into_iter().filter(|(n, _)| !excluded.contains(n)).collect()
        }
        f => {
            let included = names(f);
            params.into_iter().filter(|(n, _)| included.contains(n)).collect()
        }
    }
}

/// `application/x-www-form-urlencoded` body
pub fn encode_urlencoded(params: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// `multipart/form-data` body and its content type
pub fn encode_multipart(params: &[(String, String)]) -> (Vec<u8>, String) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    let boundary = format!("----hxFormBoundary{:x}", nanos);
    let mut body = Vec::new();
    for (name, value) in params {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name.replace('"', "%22")).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    (body, format!("multipart/form-data; boundary={}", boundary))
}

/// Append parameters to a URL's query string
pub fn append_query(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().extend_pairs(params);
            parsed.to_string()
        }
        Err(_) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{}{}{}", url, sep, encode_urlencoded(params))
        }
    }
}
