//! Engine facade
//!
//! Owns the document, the bindings created by processing it, the request
//! coordinator and the history. Everything runs on one `LocalExecutor`; the
//! host drives it with [`Engine::run`].

use crate::attributes::{AttributeResolver, ResolvedAttributes};
use crate::binding::{ElementBinding, Gate, TriggerState};
use crate::config::Config;
use crate::error::EngineError;
use crate::events::{propagation_path, Listener, ListenerId, ListenerTable};
use crate::extension::{EventVerdict, ExtensionHandle, ExtensionRegistry};
use crate::history::{HistoryCache, NavigationStack};
use crate::observer::{IntersectionObserver, Rect};
use crate::request::{collect_parameters, control_value, ActiveRequest, Encoding, RequestConfig, RequestId, RequestLog, RequestState};
use crate::swap::{ScrollPosition, ScrollSpec, SwapSpec};
use crate::sync::{Admission, Coordinator, SyncSpec, SyncStrategy};
use crate::target;
use crate::trigger::{default_trigger, parse_triggers, TriggerEvent, TriggerQueue};
use hx_dom::{Document, ElementQuery, Event, NodeId};
use hx_net::{Method, Transport};
use serde_json::Value;
use smol::LocalExecutor;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::rc::Rc;
use std::time::Instant;

/// Full-page navigation the engine hands to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// `HX-Redirect`
    Redirect(String),
    /// `HX-Refresh: true`
    Refresh,
    /// History cache miss with `refreshOnHistoryMiss`
    Reload(String),
}

/// Scroll the host should apply after a swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollRequest {
    pub node: NodeId,
    pub position: ScrollPosition,
    /// `show:` (scroll the element into view) rather than `scroll:`
    pub show: bool,
}

/// Answers `hx-confirm`; `false` cancels the request
pub type ConfirmHandler = Rc<dyn Fn(&str, NodeId) -> bool>;
/// Answers `hx-prompt`; `None` cancels the request
pub type PromptHandler = Rc<dyn Fn(&str, NodeId) -> Option<String>>;

pub(crate) struct State {
    pub(crate) document: Document,
    pub(crate) resolver: AttributeResolver,
    pub(crate) listeners: ListenerTable,
    pub(crate) bindings: HashMap<NodeId, ElementBinding>,
    pub(crate) coordinator: Coordinator<RequestConfig>,
    pub(crate) requests: RequestLog,
    next_request: RequestId,
    pub(crate) history: HistoryCache,
    pub(crate) navigation: NavigationStack,
    pub(crate) navigations: Vec<Navigation>,
    pub(crate) scrolls: Vec<ScrollRequest>,
    pub(crate) observer: IntersectionObserver,
    pub(crate) focus: Option<NodeId>,
    pub(crate) scroll_y: f64,
    confirm: Option<ConfirmHandler>,
    prompt: Option<PromptHandler>,
    initialized: HashSet<String>,
}

impl State {
    fn new(config: &Config) -> Self {
        let document = Document::default();
        let navigation = NavigationStack::new(document.url());
        Self {
            document,
            resolver: AttributeResolver::new(),
            listeners: ListenerTable::new(),
            bindings: HashMap::new(),
            coordinator: Coordinator::new(),
            requests: RequestLog::new(config.request_log_size),
            next_request: 0,
            history: HistoryCache::new(config.history_cache_size),
            navigation,
            navigations: Vec::new(),
            scrolls: Vec::new(),
            observer: IntersectionObserver::new(),
            focus: None,
            scroll_y: 0.0,
            confirm: None,
            prompt: None,
            initialized: HashSet::new(),
        }
    }

    /// Remove the binding of `node` with its listeners, observers and tasks
    fn unbind(&mut self, node: NodeId) {
        if let Some(binding) = self.bindings.remove(&node) {
            for id in binding.listener_ids() {
                self.listeners.remove(id);
            }
            self.observer.unobserve(node);
            tracing::debug!("Unbound {}", node);
        }
    }

    /// Mark every unfinished request aborted and cancel all tasks
    fn cancel_all(&mut self) {
        self.coordinator.clear();
        self.requests.abort_all();
        self.bindings.clear();
        self.listeners.clear();
        self.observer.clear();
    }
}

struct Inner {
    executor: LocalExecutor<'static>,
    config: Config,
    transport: Rc<dyn Transport>,
    registry: ExtensionRegistry,
    state: RefCell<State>,
}

/// Hypermedia exchange engine.
///
/// Cloning is cheap and yields another handle to the same engine. Spawned
/// work holds handles too, so call [`Engine::dispose`] when done with a page.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<Inner>,
}

impl Engine {
    /// Create an engine over an empty `about:blank` document
    pub fn new(config: Config, transport: impl Transport + 'static, registry: ExtensionRegistry) -> Self {
        let engine = Self {
            inner: Rc::new(Inner {
                executor: LocalExecutor::new(),
                state: RefCell::new(State::new(&config)),
                config,
                transport: Rc::new(transport),
                registry,
            }),
        };
        engine.extensions_for(&engine.inner.registry.names());
        engine
    }

    /// Replace the document with `html` loaded from `url` and process it
    pub fn load_html(&self, html: &str, url: &str) -> Result<(), EngineError> {
        url::Url::parse(url).map_err(|e| EngineError::InvalidUrl(format!("{}: {}", url, e)))?;
        let mut document = hx_html::parse_document(html, url)?;
        document.tree.take_records();
        {
            let mut state = self.state_mut();
            state.cancel_all();
            state.document = document;
            state.navigation = NavigationStack::new(url);
            state.focus = None;
            state.scroll_y = 0.0;
        }
        // Dropped tasks are released on the next tick
        self.run_until_idle();
        tracing::info!("Loaded {}", url);
        self.process(NodeId::ROOT);
        Ok(())
    }

    /// Bind `node` and every element below it. Re-processing recomputes
    /// existing bindings.
    pub fn process(&self, node: NodeId) {
        let elements: Vec<NodeId> = {
            let state = self.state();
            let tree = &state.document.tree;
            std::iter::once(node)
                .chain(tree.descendants(node))
                .filter(|&n| tree.is_element(n))
                .collect()
        };
        for element in elements {
            self.bind(element);
        }
    }

    fn bind(&self, node: NodeId) {
        let mut guard = self.state_mut();
        let state = &mut *guard;
        state.unbind(node);

        let attributes = state.resolver.resolve(&state.document.tree, node, &self.inner.config);
        let tree = &state.document.tree;
        let boosted = attributes.verb.is_none() && attributes.boosted() && is_boostable(tree, node);
        if attributes.verb.is_none() && !boosted {
            return;
        }

        let specs = match tree.get_attribute(node, "hx-trigger") {
            Some(value) => parse_triggers(value),
            None => {
                let tag = tree.tag_name(node).unwrap_or("");
                vec![default_trigger(tag, tree.get_attribute(node, "type"))]
            }
        };

        let mut binding = ElementBinding::new(node, boosted);
        for (idx, spec) in specs.into_iter().enumerate() {
            let mut trigger = TriggerState::new(spec);
            let spec = &trigger.spec;
            match &spec.event {
                TriggerEvent::Event(name) => {
                    let sources = match &spec.from {
                        Some(from) => target::resolve_all(tree, from, node, node),
                        None => vec![node],
                    };
                    if spec.changed {
                        trigger.last_value = sources.first().and_then(|&s| control_value(tree, s));
                    }
                    for source in sources {
                        let listener: Listener = Rc::new(move |engine: &Engine, evt: &mut Event| {
                            engine.on_trigger_event(node, idx, evt);
                        });
                        trigger.listeners.push(state.listeners.add(source, name, listener));
                    }
                }
                TriggerEvent::Load => {
                    let engine = self.clone();
                    let delay = spec.delay;
                    trigger.task = Some(self.inner.executor.spawn(async move {
                        if let Some(delay) = delay {
                            smol::Timer::after(delay).await;
                        }
                        engine.issue(node, Some("load".into()), None);
                    }));
                }
                TriggerEvent::Revealed => state.observer.observe(node, 0.0),
                TriggerEvent::Intersect => state.observer.observe(node, spec.threshold),
                TriggerEvent::Every(interval) => {
                    let engine = self.clone();
                    let interval = *interval;
                    trigger.task = Some(self.inner.executor.spawn(async move {
                        loop {
                            smol::Timer::after(interval).await;
                            if !engine.is_bound(node) {
                                break;
                            }
                            engine.fire_trigger(node, idx, None, "every");
                        }
                    }));
                }
            }
            binding.triggers.push(trigger);
        }
        tracing::debug!("Bound {} with {} trigger(s)", node, binding.triggers.len());
        state.bindings.insert(node, binding);
    }

    /// Listener body for event-backed triggers
    fn on_trigger_event(&self, node: NodeId, idx: usize, evt: &mut Event) {
        let (target_filter, consume, cancel) = {
            let state = self.state();
            let Some(trigger) = state.bindings.get(&node).and_then(|b| b.triggers.get(idx)) else {
                return;
            };
            let tree = &state.document.tree;
            (
                trigger.spec.target.as_ref().map(|sel| tree.matches(evt.target, sel)),
                trigger.spec.consume,
                should_cancel(tree, node, &evt.name),
            )
        };
        if cancel {
            evt.prevent_default();
        }
        if target_filter == Some(false) {
            return;
        }
        if consume {
            evt.stop_propagation();
        }
        let source = evt.current_target.unwrap_or(node);
        let name = evt.name.clone();
        self.fire_trigger(node, idx, Some(source), &name);
    }

    /// Apply modifiers to one firing of trigger `idx` on `node`
    fn fire_trigger(&self, node: NodeId, idx: usize, source: Option<NodeId>, event_name: &str) {
        let (gate, queue) = {
            let mut guard = self.state_mut();
            let state = &mut *guard;
            let tree = &state.document.tree;
            let Some(trigger) = state.bindings.get_mut(&node).and_then(|b| b.triggers.get_mut(idx)) else {
                return;
            };
            let value = trigger
                .spec
                .changed
                .then(|| control_value(tree, source.unwrap_or(node)))
                .flatten();
            let gate = trigger.admit(Instant::now(), value);
            if trigger.consumed {
                for id in trigger.listeners.drain(..) {
                    state.listeners.remove(id);
                }
            }
            (gate, trigger.spec.queue)
        };

        match gate {
            Gate::Skip => {}
            Gate::Fire => {
                self.issue(node, Some(event_name.to_string()), queue);
            }
            Gate::Debounce(delay) => {
                let engine = self.clone();
                let event_name = event_name.to_string();
                let task = self.inner.executor.spawn(async move {
                    smol::Timer::after(delay).await;
                    engine.issue(node, Some(event_name), queue);
                });
                // Replacing the pending task cancels it
                if let Some(trigger) = self
                    .state_mut()
                    .bindings
                    .get_mut(&node)
                    .and_then(|b| b.triggers.get_mut(idx))
                {
                    trigger.debounce = Some(task);
                }
            }
        }
    }

    /// Resolve attributes of `node` (cached per DOM generation)
    pub(crate) fn resolved(&self, node: NodeId) -> Rc<ResolvedAttributes> {
        let mut guard = self.state_mut();
        let state = &mut *guard;
        state.resolver.resolve(&state.document.tree, node, &self.inner.config)
    }

    /// Build and submit the request `node` declares
    pub(crate) fn issue(&self, node: NodeId, trigger_event: Option<String>, queue: Option<TriggerQueue>) -> Option<RequestId> {
        let attributes = self.resolved(node);
        let mut config = self.build_request(node, &attributes, trigger_event)?;

        if let Some(question) = attributes.get("hx-confirm") {
            let handler = self.state().confirm.clone();
            if let Some(handler) = handler {
                if !handler(question, node) {
                    tracing::debug!("Request from {} not confirmed", node);
                    return None;
                }
            }
        }
        if let Some(question) = attributes.get("hx-prompt") {
            let handler = self.state().prompt.clone();
            if let Some(handler) = handler {
                match handler(question, node) {
                    Some(answer) => config.prompt = Some(answer),
                    None => {
                        tracing::debug!("Prompt for {} canceled", node);
                        return None;
                    }
                }
            }
        }

        let (scope, strategy) = self.sync_scope(&config, queue);
        self.submit(config, scope, strategy)
    }

    /// Coordination scope and strategy for `config`
    fn sync_scope(&self, config: &RequestConfig, queue: Option<TriggerQueue>) -> (Option<NodeId>, SyncStrategy) {
        let spec = config.sync.as_deref().and_then(|raw| {
            let spec = SyncSpec::parse(raw);
            if spec.is_none() {
                tracing::warn!("Ignoring invalid hx-sync {:?}", raw);
            }
            spec
        });
        let element = config.element;
        let mut strategy = spec
            .as_ref()
            .map(|s| s.strategy)
            .unwrap_or_else(|| self.inner.config.sync_strategy());
        if matches!(strategy, SyncStrategy::Queue(_)) {
            match queue {
                Some(TriggerQueue::Mode(mode)) => strategy = SyncStrategy::Queue(mode),
                Some(TriggerQueue::None) => strategy = SyncStrategy::Drop,
                None => {}
            }
        }
        let scope = match spec.and_then(|s| s.scope) {
            Some(selector) => {
                let source = self.resolved(element).source("hx-sync").unwrap_or(element);
                let state = self.state();
                target::resolve(&state.document.tree, &selector, element, source).unwrap_or(element)
            }
            None => element,
        };
        (Some(scope), strategy)
    }

    /// Offer a request to the coordinator and start it if admitted
    pub(crate) fn submit(&self, config: RequestConfig, scope: Option<NodeId>, strategy: SyncStrategy) -> Option<RequestId> {
        let id = {
            let mut state = self.state_mut();
            state.next_request += 1;
            state.next_request
        };
        let record = ActiveRequest::new(id, &config, scope);
        let admission = self.state_mut().coordinator.admit(scope, strategy, id, config);

        match admission {
            Admission::Start(config) => {
                self.state_mut().requests.insert(record);
                self.start(id, scope, config);
            }
            Admission::Queued { discarded } => {
                let mut state = self.state_mut();
                state.requests.insert(record);
                for old in discarded {
                    let _ = state.requests.transition(old, RequestState::Aborted);
                    state.requests.retire(old);
                }
                tracing::debug!("Request {} queued", id);
            }
            Admission::Dropped => {
                tracing::debug!("Request {} dropped, scope busy", id);
                return None;
            }
            Admission::Replace { aborted, payload } => {
                self.abort_request(aborted);
                self.state_mut().requests.insert(record);
                self.start(id, scope, payload);
            }
        }
        Some(id)
    }

    fn start(&self, id: RequestId, scope: Option<NodeId>, config: RequestConfig) {
        let engine = self.clone();
        let task = self
            .inner
            .executor
            .spawn(async move { engine.exchange(id, scope, config).await });
        self.state_mut().coordinator.attach_task(scope, id, task);
    }

    /// Release the coordination slot of `id` and start whatever was queued
    pub(crate) fn finish(&self, id: RequestId, scope: Option<NodeId>) {
        let next = self.state_mut().coordinator.finish(scope, id);
        if let Some((next_id, config)) = next {
            tracing::debug!("Promoting queued request {}", next_id);
            self.start(next_id, scope, config);
        }
    }

    /// Mark `id` aborted, release its indicators and fire `hx:abort`
    fn abort_request(&self, id: RequestId) {
        let element = {
            let mut state = self.state_mut();
            let Some(request) = state.requests.get_mut(id) else {
                return;
            };
            if request.transition(RequestState::Aborted).is_err() {
                return;
            }
            request.element
        };
        self.release_indicators(id);
        self.state_mut().requests.retire(id);
        self.fire(element, "hx:abort", serde_json::json!({ "requestId": id }), false);
    }

    /// Cancel the in-flight and queued requests of scope `node`, plus any
    /// uncoordinated request issued by it. Returns how many were aborted.
    pub fn abort(&self, node: NodeId) -> usize {
        let ids = {
            let mut guard = self.state_mut();
            let state = &mut *guard;
            let mut ids = state.coordinator.abort_scope(node);
            let free: Vec<RequestId> = state
                .requests
                .values()
                .filter(|r| r.element == node && r.scope.is_none() && !r.state().is_terminal())
                .map(|r| r.id)
                .collect();
            for id in free {
                if state.coordinator.abort_free(id) {
                    ids.push(id);
                }
            }
            ids
        };
        let count = ids.len();
        for id in ids {
            self.abort_request(id);
        }
        count
    }

    /// Issue a request from the host, uncoordinated
    pub fn ajax(&self, method: Method, url: &str, element: NodeId, target: Option<&str>) -> Result<RequestId, EngineError> {
        let url = self.resolve_url(url)?;
        let config = &self.inner.config;
        let mut request = RequestConfig::new(
            method,
            &url,
            element,
            SwapSpec::with_defaults(config.swap_style(), config.default_swap_delay, config.default_settle_delay),
        );
        request.target = target.map(str::to_string);
        request.extensions = self.resolved(element).extensions.clone();
        self.submit(request, None, SyncStrategy::None)
            .ok_or(EngineError::NodeNotFound(element))
    }

    fn build_request(&self, node: NodeId, attributes: &ResolvedAttributes, trigger_event: Option<String>) -> Option<RequestConfig> {
        let config = &self.inner.config;
        let state = self.state();
        let tree = &state.document.tree;

        let (method, raw_url, boosted) = match &attributes.verb {
            Some((method, url)) => (*method, url.clone(), false),
            None if attributes.boosted() => {
                let (method, url) = boosted_request(tree, node, state.document.url())?;
                (method, url, true)
            }
            None => return None,
        };
        let url = match join_url(state.document.url(), &raw_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("{}", e);
                return None;
            }
        };

        let defaults = SwapSpec::with_defaults(config.swap_style(), config.default_swap_delay, config.default_settle_delay);
        let mut swap = match attributes.get("hx-swap") {
            Some(value) => SwapSpec::parse(value, &defaults),
            None => defaults,
        };
        if boosted && config.scroll_into_view_on_boost && swap.show.is_none() {
            swap.show = Some(ScrollSpec {
                selector: Some("body".into()),
                position: ScrollPosition::Top,
            });
        }

        let mut request = RequestConfig::new(method, &url, node, swap);
        request.trigger_event = trigger_event;
        request.boosted = boosted;
        request.target = attributes.get("hx-target").map(str::to_string);
        request.target_source = attributes.source("hx-target").unwrap_or(node);
        if boosted && request.target.is_none() {
            request.target = Some("body".into());
        }

        let list = |name: &str| -> Vec<NodeId> {
            match attributes.get(name) {
                Some(expr) => {
                    let source = attributes.source(name).unwrap_or(node);
                    target::resolve_list(tree, expr, node, source)
                }
                None => Vec::new(),
            }
        };
        let includes = list("hx-include");
        request.indicators = list("hx-indicator");
        request.disabled_elts = list("hx-disabled-elt");

        request.parameters = collect_parameters(tree, node, method, attributes, &includes);
        request.headers = attributes.headers();
        let multipart = attributes.get("hx-encoding") == Some("multipart/form-data")
            || tree.get_attribute(node, "enctype") == Some("multipart/form-data");
        request.encoding = if multipart { Encoding::Multipart } else { Encoding::UrlEncoded };

        request.select = attributes.get("hx-select").map(str::to_string);
        request.select_oob = attributes.get("hx-select-oob").map(str::to_string);
        request.sync = attributes.get("hx-sync").map(str::to_string);
        request.push_url = attributes.get("hx-push-url").map(str::to_string);
        request.replace_url = attributes.get("hx-replace-url").map(str::to_string);
        if boosted && request.push_url.is_none() {
            request.push_url = Some("true".into());
        }
        request.extensions = attributes.extensions.clone();
        Some(request)
    }

    // === Events ===

    /// Dispatch `event`: enabled extensions see it first (and may veto it),
    /// then listeners from the target up to the document. Returns `false`
    /// when the default was prevented.
    pub fn dispatch_event(&self, event: &mut Event) -> bool {
        let (path, extensions) = {
            let mut guard = self.state_mut();
            let state = &mut *guard;
            let tree = &state.document.tree;
            let path = propagation_path(tree, event);
            let extensions = if tree.is_element(event.target) {
                state
                    .resolver
                    .resolve(tree, event.target, &self.inner.config)
                    .extensions
                    .clone()
            } else {
                Vec::new()
            };
            (path, extensions)
        };

        for (name, extension) in self.extensions_for(&extensions) {
            match extension.on_event(event) {
                Ok(EventVerdict::Veto) => event.prevent_default(),
                Ok(EventVerdict::Continue) => {}
                Err(e) => tracing::warn!("Extension {} failed on {}: {}", name, event.name, e),
            }
        }

        for node in path {
            let listeners = self.state().listeners.collect(node, &event.name);
            if listeners.is_empty() {
                continue;
            }
            event.current_target = Some(node);
            for listener in listeners {
                listener(self, event);
            }
            if event.is_propagation_stopped() {
                break;
            }
        }
        event.current_target = None;
        !event.is_default_prevented()
    }

    /// Create and dispatch a lifecycle event, returning it for inspection
    pub(crate) fn fire(&self, node: NodeId, name: &str, detail: Value, cancelable: bool) -> Event {
        let mut event = Event::new(name, node).with_detail(detail);
        if !cancelable {
            event = event.non_cancelable();
        }
        tracing::debug!("{} on {}", name, node);
        self.dispatch_event(&mut event);
        event
    }

    /// Dispatch a plain bubbling event named `name` on `node`
    pub fn trigger(&self, node: NodeId, name: &str) -> bool {
        let mut event = Event::new(name, node);
        self.dispatch_event(&mut event)
    }

    pub fn add_event_listener(&self, node: NodeId, name: &str, listener: impl Fn(&Engine, &mut Event) + 'static) -> ListenerId {
        self.state_mut().listeners.add(node, name, Rc::new(listener))
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.state_mut().listeners.remove(id)
    }

    /// Enabled extensions among `names`, running `init` for any not yet
    /// initialized on this engine
    pub(crate) fn extensions_for(&self, names: &[String]) -> Vec<(String, ExtensionHandle)> {
        let extensions = self.inner.registry.enabled(names);
        for (name, extension) in &extensions {
            let fresh = self.state_mut().initialized.insert(name.clone());
            if fresh {
                if let Err(e) = extension.init(self) {
                    tracing::warn!("Extension {} failed to initialize: {}", name, e);
                }
            }
        }
        extensions
    }

    // === Host input ===

    /// Feed element geometry; fires `revealed` and `intersect` triggers
    pub fn update_intersections(&self, viewport: Rect, rects: &HashMap<NodeId, Rect>) {
        let entries = self.state_mut().observer.update(viewport, rects);
        for entry in entries.into_iter().filter(|e| e.is_intersecting) {
            let fired: Vec<(usize, &'static str)> = {
                let mut state = self.state_mut();
                let Some(binding) = state.bindings.get_mut(&entry.target) else {
                    continue;
                };
                let mut fired = Vec::new();
                for (idx, trigger) in binding.triggers.iter_mut().enumerate() {
                    match trigger.spec.event {
                        TriggerEvent::Revealed if entry.threshold == 0.0 && !trigger.revealed => {
                            trigger.revealed = true;
                            fired.push((idx, "revealed"));
                        }
                        TriggerEvent::Intersect if trigger.spec.threshold.clamp(0.0, 1.0) == entry.threshold => {
                            fired.push((idx, "intersect"));
                        }
                        _ => {}
                    }
                }
                fired
            };
            for (idx, name) in fired {
                self.fire_trigger(entry.target, idx, None, name);
            }
        }
    }

    /// Record which element has focus
    pub fn set_focus(&self, node: Option<NodeId>) {
        self.state_mut().focus = node;
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.state().focus
    }

    pub fn set_scroll_y(&self, scroll_y: f64) {
        self.state_mut().scroll_y = scroll_y;
    }

    pub fn scroll_y(&self) -> f64 {
        self.state().scroll_y
    }

    pub fn set_confirm_handler(&self, handler: impl Fn(&str, NodeId) -> bool + 'static) {
        self.state_mut().confirm = Some(Rc::new(handler));
    }

    pub fn set_prompt_handler(&self, handler: impl Fn(&str, NodeId) -> Option<String> + 'static) {
        self.state_mut().prompt = Some(Rc::new(handler));
    }

    /// Set a control's value as user input would
    pub fn set_value(&self, node: NodeId, value: &str) -> Result<(), EngineError> {
        let mut state = self.state_mut();
        let tree = &mut state.document.tree;
        if !tree.is_element(node) {
            return Err(EngineError::NodeNotFound(node));
        }
        if tree.tag_name(node) == Some("textarea") {
            tree.remove_children(node)?;
            let text = tree.create_text(value);
            tree.append_child(node, text)?;
        } else {
            tree.set_attribute(node, "value", value)?;
        }
        Ok(())
    }

    // === History ===

    /// Go back one entry, restoring it from the cache or the server
    pub fn back(&self) -> bool {
        let url = self.state_mut().navigation.back().map(str::to_string);
        self.navigate_to(url)
    }

    pub fn forward(&self) -> bool {
        let url = self.state_mut().navigation.forward().map(str::to_string);
        self.navigate_to(url)
    }

    fn navigate_to(&self, url: Option<String>) -> bool {
        let Some(url) = url else {
            return false;
        };
        self.save_history();
        self.restore(&url);
        true
    }

    // === Execution ===

    /// Drive the engine until `future` completes
    pub fn run<T>(&self, future: impl Future<Output = T>) -> T {
        smol::block_on(self.inner.executor.run(future))
    }

    /// Run every task that is ready without waiting on timers or I/O
    pub fn run_until_idle(&self) {
        while self.inner.executor.try_tick() {}
    }

    /// Cancel all work and drop every binding and listener. The engine
    /// handle stays usable; `load_html` starts over.
    pub fn dispose(&self) {
        self.state_mut().cancel_all();
        self.run_until_idle();
    }

    // === Accessors ===

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.inner.registry
    }

    pub(crate) fn transport(&self) -> &Rc<dyn Transport> {
        &self.inner.transport
    }

    /// Borrow the document. Release it before calling back into the engine.
    pub fn document(&self) -> Ref<'_, Document> {
        Ref::map(self.state(), |s| &s.document)
    }

    /// Current URL
    pub fn location(&self) -> String {
        self.state().document.url().to_string()
    }

    pub fn title(&self) -> String {
        self.state().document.title().to_string()
    }

    pub fn query(&self, selector: &str) -> Option<NodeId> {
        let state = self.state();
        let tree = &state.document.tree;
        tree.query_selector(tree.root(), selector)
    }

    pub fn query_all(&self, selector: &str) -> Vec<NodeId> {
        let state = self.state();
        let tree = &state.document.tree;
        tree.query_selector_all(tree.root(), selector)
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        hx_html::inner_html(&self.state().document.tree, node)
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        hx_html::outer_html(&self.state().document.tree, node)
    }

    pub fn text(&self, node: NodeId) -> String {
        self.state().document.tree.text_content(node)
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state().document.tree.get_attribute(node, name).map(str::to_string)
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.state().document.tree.has_class(node, class)
    }

    /// Snapshot cache, newest first
    pub fn history(&self) -> Ref<'_, HistoryCache> {
        Ref::map(self.state(), |s| &s.history)
    }

    /// Cached URLs, newest first
    pub fn history_urls(&self) -> Vec<String> {
        self.state().history.iter().map(|e| e.url.clone()).collect()
    }

    pub fn navigation(&self) -> Ref<'_, NavigationStack> {
        Ref::map(self.state(), |s| &s.navigation)
    }

    /// Full-page navigations requested so far
    pub fn take_navigations(&self) -> Vec<Navigation> {
        std::mem::take(&mut self.state_mut().navigations)
    }

    /// Scrolls requested by swaps since the last call
    pub fn take_scroll_requests(&self) -> Vec<ScrollRequest> {
        std::mem::take(&mut self.state_mut().scrolls)
    }

    /// Unfinished requests plus the most recent finished ones, by id
    pub fn requests(&self) -> Vec<ActiveRequest> {
        self.state().requests.values().cloned().collect()
    }

    /// `None` once a finished request has aged out of the log
    pub fn request(&self, id: RequestId) -> Option<ActiveRequest> {
        self.state().requests.get(id).cloned()
    }

    pub fn is_bound(&self, node: NodeId) -> bool {
        self.state().bindings.contains_key(&node)
    }

    pub fn binding_count(&self) -> usize {
        self.state().bindings.len()
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    pub(crate) fn state(&self) -> Ref<'_, State> {
        self.inner.state.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, State> {
        self.inner.state.borrow_mut()
    }

    /// Resolve `url` against the current location
    pub(crate) fn resolve_url(&self, url: &str) -> Result<String, EngineError> {
        join_url(self.state().document.url(), url)
    }

    /// Drop bindings and listeners of nodes that left the document, then
    /// release every detached node back to the arena
    pub(crate) fn prune_bindings(&self) {
        let mut guard = self.state_mut();
        let state = &mut *guard;
        let records = state.document.tree.take_records();
        if records.iter().any(|r| !r.removed_nodes.is_empty()) {
            let tree = &state.document.tree;
            let dead: Vec<NodeId> = state
                .bindings
                .keys()
                .copied()
                .filter(|&n| !tree.is_connected(n))
                .collect();
            let detached: Vec<NodeId> = state
                .listeners
                .nodes()
                .into_iter()
                .filter(|&n| !tree.is_connected(n))
                .collect();
            for node in dead {
                state.unbind(node);
            }
            for node in detached {
                state.listeners.remove_node(node);
            }
            if state.focus.is_some_and(|n| !state.document.tree.is_connected(n)) {
                state.focus = None;
            }
        }
        let freed = state.document.tree.free_detached();
        if freed > 0 {
            tracing::trace!("Released {} detached nodes", freed);
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("location", &self.location())
            .field("bindings", &self.binding_count())
            .finish()
    }
}

fn join_url(base: &str, url: &str) -> Result<String, EngineError> {
    url::Url::parse(base)
        .and_then(|b| b.join(url))
        .or_else(|_| url::Url::parse(url))
        .map(|u| u.to_string())
        .map_err(|e| EngineError::InvalidUrl(format!("{}: {}", url, e)))
}

/// Anchors with a real `href`, and forms
fn is_boostable(tree: &hx_dom::DomTree, node: NodeId) -> bool {
    match tree.tag_name(node) {
        Some("a") => tree
            .get_attribute(node, "href")
            .is_some_and(|href| !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript:")),
        Some("form") => true,
        _ => false,
    }
}

/// Method and URL for a boosted anchor or form
fn boosted_request(tree: &hx_dom::DomTree, node: NodeId, location: &str) -> Option<(Method, String)> {
    match tree.tag_name(node)? {
        "a" => Some((Method::Get, tree.get_attribute(node, "href")?.to_string())),
        "form" => {
            let method = tree
                .get_attribute(node, "method")
                .and_then(Method::parse)
                .unwrap_or(Method::Get);
            let action = tree
                .get_attribute(node, "action")
                .filter(|a| !a.is_empty())
                .unwrap_or(location);
            Some((method, action.to_string()))
        }
        _ => None,
    }
}

/// Native default actions the engine replaces with an exchange
fn should_cancel(tree: &hx_dom::DomTree, node: NodeId, event: &str) -> bool {
    match (tree.tag_name(node), event) {
        (Some("form"), "submit") | (Some("a"), "click") => true,
        (Some("button" | "input"), "click") => {
            let kind = tree.get_attribute(node, "type").unwrap_or("submit");
            kind.eq_ignore_ascii_case("submit") && tree.closest(node, "form").is_some()
        }
        _ => false,
    }
}
