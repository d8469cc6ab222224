//! Exchange pipeline
//!
//! One exchange from `Sending` to a terminal state: lifecycle events, the
//! transport call, response header directives, the swap (out-of-band
//! first, then primary) and the settle phase. The DOM is only touched in
//! synchronous sections; awaits happen with no engine state borrowed.

use crate::attributes::value_to_string;
use crate::engine::{Engine, Navigation, ScrollRequest};
use crate::error::{ExtensionError, FailureKind};
use crate::headers::{history_directive, parse_trigger_header, LocationDirective};
use crate::oob::{self, OobInstruction};
use crate::request::{append_query, encode_multipart, encode_urlencoded, Encoding, RequestConfig, RequestId, RequestState};
use crate::swap::{self, ScrollPosition, ScrollSpec, SwapSpec, SwapStyle};
use crate::sync::SyncStrategy;
use crate::target;
use hx_dom::{ElementQuery, NodeId};
use hx_net::{Method, Request, Response};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Planned history change for a completed swap
#[derive(Debug, Clone, PartialEq, Eq)]
struct HistoryUpdate {
    url: String,
    push: bool,
}

/// Result of the synchronous swap step
#[derive(Debug, Default)]
struct Swapped {
    target: Option<NodeId>,
    added: Vec<NodeId>,
}

impl Engine {
    /// Run one admitted exchange, then hand its slot to the next queued one
    pub(crate) async fn exchange(&self, id: RequestId, scope: Option<NodeId>, config: RequestConfig) {
        self.perform(id, config).await;
        self.release_indicators(id);
        self.state_mut().requests.retire(id);
        self.finish(id, scope);
    }

    async fn perform(&self, id: RequestId, mut config: RequestConfig) {
        let element = config.element;
        if !self.set_state(id, RequestState::Sending) {
            return;
        }

        // configRequest: listeners may rewrite parameters, headers and path
        let mut headers = self.request_headers(&config);
        let original_params = params_to_json(&config.parameters);
        let evt = self.fire(
            element,
            "hx:configRequest",
            json!({
                "requestId": id,
                "verb": config.method.as_str(),
                "path": config.url,
                "parameters": original_params,
                "headers": pairs_to_json(&headers),
                "triggeringEvent": config.trigger_event,
            }),
            true,
        );
        if self.is_aborted(id) {
            return;
        }
        if evt.is_default_prevented() {
            tracing::debug!("Request {} vetoed in configRequest", id);
            self.fail(id, FailureKind::ConfigVetoed);
            return;
        }
        if let Some(params) = evt.detail_field("parameters").filter(|p| **p != original_params) {
            config.parameters = json_to_pairs(params);
        }
        if let Some(h) = evt.detail_field("headers") {
            headers = json_to_pairs(h);
        }
        if let Some(path) = evt.detail_field("path").and_then(Value::as_str) {
            if path != config.url {
                match self.resolve_url(path) {
                    Ok(url) => config.url = url,
                    Err(e) => tracing::warn!("Ignoring rewritten path: {}", e),
                }
            }
        }

        let mut request = Request::new(config.method, &config.url);
        for (name, value) in &headers {
            request.set_header(name, value);
        }
        self.encode_body(id, &config, &mut request);

        if self.config().self_requests_only && !self.same_origin(&request.url) {
            tracing::warn!("Refusing cross-origin request to {}", request.url);
            self.fire(element, "hx:invalidUrl", json!({ "requestId": id, "path": request.url }), false);
            self.fail(id, FailureKind::ConfigVetoed);
            return;
        }

        let evt = self.fire(
            element,
            "hx:beforeRequest",
            json!({ "requestId": id, "verb": config.method.as_str(), "path": request.url }),
            true,
        );
        if self.is_aborted(id) {
            return;
        }
        if evt.is_default_prevented() {
            self.fail(id, FailureKind::ConfigVetoed);
            return;
        }

        self.add_indicators(id, &config);
        self.fire(element, "hx:beforeSend", json!({ "requestId": id, "path": request.url }), false);
        if self.is_aborted(id) || !self.set_state(id, RequestState::AwaitingResponse) {
            return;
        }

        tracing::info!("{} {}", request.method, request.url);
        let sent_url = request.url.clone();
        let result = self.send(request).await;
        if self.is_aborted(id) {
            return;
        }
        self.release_indicators(id);

        let response = match result {
            Ok(response) => response,
            Err(kind) => {
                let name = if kind == FailureKind::Timeout { "hx:timeout" } else { "hx:sendError" };
                tracing::warn!("Request {} to {} failed: {}", id, sent_url, kind);
                self.fire(element, name, json!({ "requestId": id, "path": sent_url, "error": kind.to_string() }), false);
                self.fire(
                    element,
                    "hx:afterRequest",
                    json!({ "requestId": id, "path": sent_url, "successful": false, "failed": true }),
                    false,
                );
                self.fail(id, kind);
                return;
            }
        };

        self.handle_response(id, config, response, sent_url).await;
    }

    async fn handle_response(&self, id: RequestId, config: RequestConfig, response: Response, sent_url: String) {
        let element = config.element;
        let status = response.status;
        let detail = json!({
            "requestId": id,
            "path": sent_url,
            "status": status,
            "headers": pairs_to_json(&response.headers),
            "successful": response.ok(),
            "failed": !response.ok(),
        });

        if let Some(value) = response.header("HX-Trigger") {
            self.fire_header_events(element, value);
        }

        if let Some(location) = response.header("HX-Location").and_then(LocationDirective::parse) {
            self.fire(element, "hx:afterRequest", detail, false);
            self.follow_location(element, location);
            self.set_state(id, RequestState::Completed);
            return;
        }
        if let Some(url) = response.header("HX-Redirect") {
            self.state_mut().navigations.push(Navigation::Redirect(url.to_string()));
            self.fire(element, "hx:afterRequest", detail, false);
            self.set_state(id, RequestState::Completed);
            return;
        }
        if response.header("HX-Refresh") == Some("true") {
            self.state_mut().navigations.push(Navigation::Refresh);
            self.fire(element, "hx:afterRequest", detail, false);
            self.set_state(id, RequestState::Completed);
            return;
        }

        self.fire(element, "hx:afterRequest", detail.clone(), false);
        let is_error = status >= 400;
        if is_error {
            tracing::warn!("Request {} returned {}", id, status);
            self.fire(element, "hx:responseError", detail, false);
            self.record_failure(id, FailureKind::HttpError(status));
        }
        if self.is_aborted(id) {
            return;
        }

        let default_swap =
            status != 204 && (response.ok() || (is_error && self.config().swap_error_responses));
        let mut text = response.text();
        let evt = self.fire(
            element,
            "hx:beforeSwap",
            json!({
                "requestId": id,
                "status": status,
                "shouldSwap": default_swap,
                "isError": is_error,
                "serverResponse": text,
            }),
            true,
        );
        if self.is_aborted(id) {
            return;
        }
        let should_swap = !evt.is_default_prevented()
            && evt
                .detail_field("shouldSwap")
                .and_then(Value::as_bool)
                .unwrap_or(default_swap);
        if let Some(body) = evt.detail_field("serverResponse").and_then(Value::as_str) {
            text = body.to_string();
        }

        if !should_swap {
            self.fire(element, "hx:afterOnLoad", json!({ "requestId": id, "status": status }), false);
            if is_error {
                self.fail(id, FailureKind::HttpError(status));
            } else {
                self.set_state(id, RequestState::Completed);
            }
            return;
        }

        for (name, extension) in self.extensions_for(&config.extensions) {
            match extension.transform_response(&text, element) {
                Ok(Some(rewritten)) => text = rewritten,
                Ok(None) => {}
                Err(e) => self.extension_failed(id, &name, &e),
            }
        }

        let history = self.history_update(&config, &response, &sent_url);
        if history.is_some() {
            self.save_history();
        }

        if !self.set_state(id, RequestState::Swapping) {
            return;
        }

        let mut spec = config.swap.clone();
        if let Some(reswap) = response.header("HX-Reswap") {
            spec = SwapSpec::parse(reswap, &spec);
        }
        let (target_expr, target_source) = match response.header("HX-Retarget") {
            Some(retarget) => (Some(retarget.to_string()), element),
            None => (config.target.clone(), config.target_source),
        };
        let select = response
            .header("HX-Reselect")
            .map(str::to_string)
            .or_else(|| config.select.clone());

        if !spec.swap_delay.is_zero() {
            let pending = self.swap_target(element, target_expr.as_deref(), target_source);
            let class = self.config().swapping_class.clone();
            if let Some(target) = pending {
                let _ = self.state_mut().document.tree.add_class(target, &class);
            }
            smol::Timer::after(spec.swap_delay).await;
            if self.is_aborted(id) {
                return;
            }
            if let Some(target) = pending {
                let _ = self.state_mut().document.tree.remove_class(target, &class);
            }
        }

        let swapped = self.swap_response(id, &config, &text, &spec, target_expr.as_deref(), target_source, select.as_deref());

        self.prune_bindings();
        let added: Vec<NodeId> = {
            let state = self.state();
            let tree = &state.document.tree;
            swapped
                .added
                .iter()
                .copied()
                .filter(|&n| tree.is_element(n) && tree.is_connected(n))
                .collect()
        };
        for &node in &added {
            self.process(node);
        }
        for &node in &added {
            self.fire(node, "hx:load", json!({}), false);
        }

        let after_target = swapped
            .target
            .filter(|&t| self.state().document.tree.is_connected(t))
            .unwrap_or(element);
        self.fire(after_target, "hx:afterSwap", json!({ "requestId": id, "status": status }), false);
        if let Some(value) = response.header("HX-Trigger-After-Swap") {
            self.fire_header_events(element, value);
        }
        if self.is_aborted(id) {
            return;
        }
        if let Some(update) = history {
            self.apply_history(update);
        }
        self.fire(element, "hx:afterOnLoad", json!({ "requestId": id, "status": status }), false);
        if self.is_aborted(id) || !self.set_state(id, RequestState::Settling) {
            return;
        }

        if !spec.settle_delay.is_zero() {
            smol::Timer::after(spec.settle_delay).await;
            if self.is_aborted(id) {
                return;
            }
        }
        self.settle(swapped.target, &added);
        self.fire(after_target, "hx:afterSettle", json!({ "requestId": id, "status": status }), false);
        if let Some(value) = response.header("HX-Trigger-After-Settle") {
            self.fire_header_events(element, value);
        }
        self.set_state(id, RequestState::Completed);
    }

    async fn send(&self, request: Request) -> Result<Response, FailureKind> {
        let exchange = self.transport().send(request);
        let exchange = async { exchange.await.map_err(|e| FailureKind::NetworkFailure(e.to_string())) };
        let timeout = self.config().timeout;
        if timeout.is_zero() {
            return exchange.await;
        }
        smol::future::or(exchange, async {
            smol::Timer::after(timeout).await;
            Err(FailureKind::Timeout)
        })
        .await
    }

    fn encode_body(&self, id: RequestId, config: &RequestConfig, request: &mut Request) {
        if self.config().uses_url_params(config.method) {
            request.url = append_query(&config.url, &config.parameters);
            return;
        }
        for (name, extension) in self.extensions_for(&config.extensions) {
            match extension.encode_parameters(request, &config.parameters, config.element) {
                Ok(Some(body)) => {
                    request.body = Some(body);
                    return;
                }
                Ok(None) => {}
                Err(e) => self.extension_failed(id, &name, &e),
            }
        }
        let body = match config.encoding {
            Encoding::Multipart => {
                let (body, content_type) = encode_multipart(&config.parameters);
                request.set_header("Content-Type", &content_type);
                body
            }
            Encoding::UrlEncoded => {
                request.set_header("Content-Type", "application/x-www-form-urlencoded");
                encode_urlencoded(&config.parameters).into_bytes()
            }
        };
        request.body = Some(body);
    }

    fn request_headers(&self, config: &RequestConfig) -> Vec<(String, String)> {
        let state = self.state();
        let tree = &state.document.tree;
        let mut headers = vec![
            ("HX-Request".to_string(), "true".to_string()),
            ("HX-Current-URL".to_string(), state.document.url().to_string()),
        ];
        if let Some(id) = tree.element(config.element).and_then(|e| e.id()) {
            headers.push(("HX-Trigger".into(), id.to_string()));
        }
        if let Some(name) = tree.get_attribute(config.element, "name") {
            headers.push(("HX-Trigger-Name".into(), name.to_string()));
        }
        let target = match &config.target {
            Some(expr) => target::resolve(tree, expr, config.element, config.target_source),
            None => Some(config.element),
        };
        if let Some(id) = target.and_then(|t| tree.element(t)).and_then(|e| e.id()) {
            headers.push(("HX-Target".into(), id.to_string()));
        }
        if config.boosted {
            headers.push(("HX-Boosted".into(), "true".into()));
        }
        if config.history_restore {
            headers.push(("HX-History-Restore-Request".into(), "true".into()));
        }
        if let Some(answer) = &config.prompt {
            headers.push(("HX-Prompt".into(), answer.clone()));
        }
        for (name, value) in &config.headers {
            headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }
        headers
    }

    fn same_origin(&self, url: &str) -> bool {
        let location = self.location();
        match (url::Url::parse(&location), url::Url::parse(url)) {
            (Ok(base), Ok(target)) => {
                let base = base.origin();
                // Opaque origins (about:blank) impose no restriction
                !base.is_tuple() || base == target.origin()
            }
            _ => false,
        }
    }

    // === Swap ===

    /// Live swap target, `None` when it does not resolve to a connected element
    fn swap_target(&self, element: NodeId, expr: Option<&str>, source: NodeId) -> Option<NodeId> {
        let state = self.state();
        let tree = &state.document.tree;
        let target = match expr {
            Some(expr) => target::resolve(tree, expr, element, source)?,
            None => element,
        };
        (tree.is_connected(target) && tree.is_element(target)).then_some(target)
    }

    #[allow(clippy::too_many_arguments)]
    fn swap_response(
        &self,
        id: RequestId,
        config: &RequestConfig,
        text: &str,
        spec: &SwapSpec,
        target_expr: Option<&str>,
        target_source: NodeId,
        select: Option<&str>,
    ) -> Swapped {
        let element = config.element;
        let mut swapped = Swapped::default();

        let parsed = hx_html::parse_fragment(text, &mut self.state_mut().document.tree);
        let mut fragment = match parsed {
            Ok(fragment) => fragment,
            Err(e) => {
                tracing::warn!("Could not parse response for request {}: {}", id, e);
                return swapped;
            }
        };
        if !spec.ignore_title {
            if let Some(title) = fragment.title.take() {
                self.state_mut().document.set_title(&title);
            }
        }

        let instructions = {
            let mut guard = self.state_mut();
            oob::extract(
                &mut guard.document.tree,
                &mut fragment.nodes,
                config.select_oob.as_deref(),
                self.config().allow_nested_oob_swaps,
            )
        };
        for instruction in &instructions {
            let added = self.swap_oob(id, config, instruction);
            swapped.added.extend(added);
        }

        let mut nodes = fragment.nodes;
        if let Some(selector) = select {
            let mut guard = self.state_mut();
            let tree = &mut guard.document.tree;
            nodes = oob::select_in(tree, &nodes, selector);
            for &node in &nodes {
                let _ = tree.remove(node);
            }
        }

        let Some(target) = self.swap_target(element, target_expr, target_source) else {
            let expr = target_expr.unwrap_or("this").to_string();
            tracing::warn!("Swap target {:?} not found for request {}", expr, id);
            self.fire(element, "hx:targetError", json!({ "requestId": id, "target": expr }), false);
            self.record_failure(id, FailureKind::SwapTargetMissing(expr));
            return swapped;
        };
        swapped.target = Some(target);

        let refocus = {
            let state = self.state();
            let tree = &state.document.tree;
            state
                .focus
                .filter(|&f| tree.contains(target, f))
                .and_then(|f| tree.element(f).and_then(|e| e.id()).map(str::to_string))
        };

        let added = self.apply_swap(id, &spec.style, target, &nodes, &config.extensions);
        swapped.added.extend(added);

        let mut guard = self.state_mut();
        let state = &mut *guard;
        if let Some(focus_id) = refocus {
            state.focus = state.document.get_element_by_id(&focus_id);
            if let (Some(node), Some(true)) = (state.focus, spec.focus_scroll) {
                state.scrolls.push(ScrollRequest {
                    node,
                    position: ScrollPosition::Top,
                    show: true,
                });
            }
        }
        let settling = &self.config().settling_class;
        let added_class = &self.config().added_class;
        if state.document.tree.is_connected(target) {
            let _ = state.document.tree.add_class(target, settling);
        }
        for &node in &swapped.added {
            if state.document.tree.is_element(node) {
                let _ = state.document.tree.add_class(node, added_class);
            }
        }
        for (scroll, show) in [(&spec.scroll, false), (&spec.show, true)] {
            if let Some(request) = scroll_request(&state.document.tree, scroll.as_ref(), target, show) {
                state.scrolls.push(request);
            }
        }
        swapped
    }

    /// Swap one out-of-band instruction into every live match
    fn swap_oob(&self, id: RequestId, config: &RequestConfig, instruction: &OobInstruction) -> Vec<NodeId> {
        let targets = self.query_all(&instruction.selector);
        if targets.is_empty() {
            tracing::warn!("No out-of-band target for {:?}", instruction.selector);
            let body = self.document().body().unwrap_or(NodeId::ROOT);
            self.fire(
                body,
                "hx:oobErrorNoTarget",
                json!({ "requestId": id, "selector": instruction.selector }),
                false,
            );
            self.record_failure(id, FailureKind::OobTargetMissing(instruction.selector.clone()));
            return Vec::new();
        }

        let mut added = Vec::new();
        let last = targets.len() - 1;
        for (i, target) in targets.into_iter().enumerate() {
            let content = instruction.content(&mut self.state_mut().document.tree, i != last);
            let detail = json!({
                "requestId": id,
                "selector": instruction.selector,
                "style": instruction.style.name(),
            });
            let evt = self.fire(target, "hx:oobBeforeSwap", detail.clone(), true);
            if evt.is_default_prevented() {
                continue;
            }
            added.extend(self.apply_swap(id, &instruction.style, target, &content, &config.extensions));
            self.fire(target, "hx:oobAfterSwap", detail, false);
        }
        added
    }

    /// Apply a built-in or extension swap style, returning inserted nodes
    fn apply_swap(
        &self,
        id: RequestId,
        style: &SwapStyle,
        target: NodeId,
        nodes: &[NodeId],
        extensions: &[String],
    ) -> Vec<NodeId> {
        if let SwapStyle::Custom(name) = style {
            for (ext_name, extension) in self.extensions_for(extensions) {
                if !extension.is_custom_swap_style(name) {
                    continue;
                }
                let result = extension.handle_swap(name, &mut self.state_mut().document.tree, target, nodes);
                match result {
                    Ok(Some(added)) => return added,
                    Ok(None) => {}
                    Err(e) => self.extension_failed(id, &ext_name, &e),
                }
            }
            tracing::warn!("No extension handles swap style {:?}", name);
            return Vec::new();
        }
        match swap::apply(&mut self.state_mut().document.tree, style, target, nodes) {
            Ok(outcome) => outcome.added,
            Err(e) => {
                tracing::warn!("{} swap into {} failed: {}", style, target, e);
                Vec::new()
            }
        }
    }

    /// Remove the settling and added classes
    fn settle(&self, target: Option<NodeId>, added: &[NodeId]) {
        let settling = &self.config().settling_class;
        let added_class = &self.config().added_class;
        let mut state = self.state_mut();
        let tree = &mut state.document.tree;
        if let Some(target) = target {
            let _ = tree.remove_class(target, settling);
        }
        for &node in added {
            let _ = tree.remove_class(node, added_class);
        }
    }

    // === Response directives ===

    fn fire_header_events(&self, element: NodeId, value: &str) {
        for (name, detail) in parse_trigger_header(value) {
            let node = if self.state().document.tree.is_connected(element) {
                element
            } else {
                self.document().body().unwrap_or(NodeId::ROOT)
            };
            self.fire(node, &name, detail, true);
        }
    }

    /// `HX-Location`: a fresh GET into the named target, pushed into history
    fn follow_location(&self, element: NodeId, location: LocationDirective) {
        let url = match self.resolve_url(&location.path) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Ignoring HX-Location: {}", e);
                return;
            }
        };
        let config = self.config();
        let defaults = SwapSpec::with_defaults(config.swap_style(), config.default_swap_delay, config.default_settle_delay);
        let swap = match &location.swap {
            Some(value) => SwapSpec::parse(value, &defaults),
            None => defaults,
        };
        let source = if self.state().document.tree.is_connected(element) {
            element
        } else {
            self.document().body().unwrap_or(NodeId::ROOT)
        };
        let mut request = RequestConfig::new(Method::Get, &url, source, swap);
        request.target = Some(location.target.unwrap_or_else(|| "body".into()));
        request.select = location.select;
        request.push_url = Some("true".into());
        request.extensions = self.resolved(source).extensions.clone();
        self.submit(request, None, SyncStrategy::None);
    }

    fn history_update(&self, config: &RequestConfig, response: &Response, url: &str) -> Option<HistoryUpdate> {
        if !self.config().history_enabled || config.history_restore {
            return None;
        }
        let directive = |value: &str, push: bool| history_directive(value, url).map(|url| HistoryUpdate { url, push });
        if let Some(value) = response.header("HX-Push-Url") {
            return directive(value, true);
        }
        if let Some(value) = response.header("HX-Replace-Url") {
            return directive(value, false);
        }
        if let Some(value) = &config.push_url {
            return directive(value, true);
        }
        if let Some(value) = &config.replace_url {
            return directive(value, false);
        }
        None
    }

    fn apply_history(&self, update: HistoryUpdate) {
        let url = match self.resolve_url(&update.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Ignoring history update: {}", e);
                return;
            }
        };
        {
            let mut state = self.state_mut();
            if update.push {
                state.navigation.push(&url);
            } else {
                state.navigation.replace(&url);
            }
            state.document.set_url(&url);
        }
        let name = if update.push { "hx:pushedIntoHistory" } else { "hx:replacedInHistory" };
        self.fire(self.history_element(), name, json!({ "path": url }), false);
    }

    // === History ===

    /// Element whose content is snapshotted: `[hx-history-elt]` or `body`
    pub(crate) fn history_element(&self) -> NodeId {
        let document = self.document();
        let tree = &document.tree;
        tree.query_selector(tree.root(), "[hx-history-elt]")
            .or_else(|| document.body())
            .unwrap_or(NodeId::ROOT)
    }

    /// Snapshot the current page into the history cache
    pub(crate) fn save_history(&self) {
        if !self.config().history_enabled {
            return;
        }
        let element = self.history_element();
        let url = self.location();
        self.fire(element, "hx:beforeHistorySave", json!({ "path": url }), false);
        let mut guard = self.state_mut();
        let state = &mut *guard;
        let snapshot = hx_html::inner_html(&state.document.tree, element);
        let title = state.document.title().to_string();
        state.history.record_entry(&url, snapshot, &title, state.scroll_y);
        tracing::debug!("Saved history for {}", url);
    }

    /// Show `url`: from the cache when possible, otherwise from the server
    pub(crate) fn restore(&self, url: &str) {
        let element = self.history_element();
        let entry = self.state().history.get(url).cloned();
        let Some(entry) = entry else {
            tracing::debug!("History cache miss for {}", url);
            self.state_mut().document.set_url(url);
            self.fire(element, "hx:historyCacheMiss", json!({ "path": url }), false);
            if self.config().refresh_on_history_miss {
                self.state_mut().navigations.push(Navigation::Reload(url.to_string()));
                return;
            }
            let config = self.config();
            let mut request = RequestConfig::new(
                Method::Get,
                url,
                element,
                SwapSpec::with_defaults(SwapStyle::InnerHtml, Duration::ZERO, config.default_settle_delay),
            );
            request.history_restore = true;
            self.submit(request, None, SyncStrategy::None);
            return;
        };

        {
            let mut guard = self.state_mut();
            let state = &mut *guard;
            let tree = &mut state.document.tree;
            match hx_html::parse_fragment(&entry.snapshot, tree) {
                Ok(fragment) => {
                    let _ = tree.remove_children(element);
                    for node in fragment.nodes {
                        let _ = tree.append_child(element, node);
                    }
                }
                Err(e) => tracing::warn!("Could not restore snapshot of {}: {}", url, e),
            }
            state.document.set_url(url);
            state.document.set_title(&entry.title);
            state.scroll_y = entry.scroll_y;
        }
        self.prune_bindings();
        self.process(element);
        self.fire(element, "hx:historyRestore", json!({ "path": url }), false);
    }

    // === Request bookkeeping ===

    /// Transition `id`, returning `false` if it is gone or the step is illegal
    pub(crate) fn set_state(&self, id: RequestId, to: RequestState) -> bool {
        let mut state = self.state_mut();
        let Some(request) = state.requests.get_mut(id) else {
            return false;
        };
        match request.transition(to) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("{}", e);
                false
            }
        }
    }

    pub(crate) fn is_aborted(&self, id: RequestId) -> bool {
        self.state()
            .requests
            .get(id)
            .is_none_or(|r| *r.state() == RequestState::Aborted)
    }

    pub(crate) fn record_failure(&self, id: RequestId, kind: FailureKind) {
        if let Some(request) = self.state_mut().requests.get_mut(id) {
            request.failures.push(kind);
        }
    }

    fn fail(&self, id: RequestId, kind: FailureKind) {
        let mut state = self.state_mut();
        if let Some(request) = state.requests.get_mut(id) {
            if request.failures.last() != Some(&kind) {
                request.failures.push(kind.clone());
            }
            let _ = request.transition(RequestState::Failed(kind));
        }
    }

    fn extension_failed(&self, id: RequestId, name: &str, error: &ExtensionError) {
        tracing::warn!("Extension {} failed: {}", name, error);
        self.record_failure(id, FailureKind::ExtensionError(name.to_string()));
    }

    /// Give indicators the request class and disable `hx-disabled-elt`s
    fn add_indicators(&self, id: RequestId, config: &RequestConfig) {
        let class = self.config().request_class.clone();
        let indicators = if config.indicators.is_empty() {
            vec![config.element]
        } else {
            config.indicators.clone()
        };
        let mut guard = self.state_mut();
        let state = &mut *guard;
        let tree = &mut state.document.tree;
        for &node in &indicators {
            let _ = tree.add_class(node, &class);
        }
        let mut disabled = Vec::new();
        for &node in &config.disabled_elts {
            if !tree.has_attribute(node, "disabled") && tree.set_attribute(node, "disabled", "").is_ok() {
                disabled.push(node);
            }
        }
        if let Some(request) = state.requests.get_mut(id) {
            request.indicators = indicators;
            request.disabled = disabled;
        }
    }

    /// Undo [`Engine::add_indicators`], keeping classes other requests still need
    pub(crate) fn release_indicators(&self, id: RequestId) {
        let class = self.config().request_class.clone();
        let mut guard = self.state_mut();
        let state = &mut *guard;
        let Some(request) = state.requests.get_mut(id) else {
            return;
        };
        let indicators = std::mem::take(&mut request.indicators);
        let disabled = std::mem::take(&mut request.disabled);
        let tree = &mut state.document.tree;
        for node in indicators {
            let shared = state.requests.values().any(|r| r.indicators.contains(&node));
            if !shared {
                let _ = tree.remove_class(node, &class);
            }
        }
        for node in disabled {
            let shared = state.requests.values().any(|r| r.disabled.contains(&node));
            if !shared {
                let _ = tree.remove_attribute(node, "disabled");
            }
        }
    }
}

/// Scroll target for a `scroll:` / `show:` modifier
fn scroll_request(tree: &hx_dom::DomTree, spec: Option<&ScrollSpec>, target: NodeId, show: bool) -> Option<ScrollRequest> {
    let spec = spec?;
    let node = match spec.selector.as_deref() {
        None => target,
        Some("window") => tree.root(),
        Some(selector) => tree.query_selector(tree.root(), selector)?,
    };
    Some(ScrollRequest {
        node,
        position: spec.position,
        show,
    })
}

/// Parameters as a JSON object; repeated names become arrays
fn params_to_json(params: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (name, value) in params {
        match map.get_mut(name) {
            Some(Value::Array(values)) => values.push(Value::String(value.clone())),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value.clone())]);
            }
            None => {
                map.insert(name.clone(), Value::String(value.clone()));
            }
        }
    }
    Value::Object(map)
}

fn pairs_to_json(pairs: &[(String, String)]) -> Value {
    Value::Object(
        pairs
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// Inverse of [`params_to_json`]
fn json_to_pairs(value: &Value) -> Vec<(String, String)> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    let mut pairs = Vec::new();
    for (name, value) in map {
        match value {
            Value::Array(values) => pairs.extend(values.iter().map(|v| (name.clone(), value_to_string(v)))),
            other => pairs.push((name.clone(), value_to_string(other))),
        }
    }
    pairs
}
