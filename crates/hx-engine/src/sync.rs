//! Request Coordinator (`hx-sync`)
//!
//! Each coordination scope admits at most one in-flight exchange. New
//! requests against a busy scope are dropped, replace the in-flight one, or
//! wait in the scope's queue. Scopes are independent: a descendant scope and
//! an ancestor scope never interact.

use crate::request::RequestId;
use hx_dom::NodeId;
use smol::Task;
use std::collections::{HashMap, VecDeque};

/// Queue sub-strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    /// Keep only the earliest queued request
    First,
    /// Keep only the most recent queued request
    #[default]
    Last,
    /// Keep every queued request, in order
    All,
}

impl QueueMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "first" => Some(QueueMode::First),
            "last" => Some(QueueMode::Last),
            "all" => Some(QueueMode::All),
            _ => None,
        }
    }
}

/// Coordination policy for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    Drop,
    Abort,
    Replace,
    Queue(QueueMode),
    /// No coordination, unbounded concurrency
    None,
}

impl Default for SyncStrategy {
    fn default() -> Self {
        SyncStrategy::Queue(QueueMode::Last)
    }
}

impl SyncStrategy {
    /// Parse `drop`, `abort`, `replace`, `none`, `queue`, `queue first|last|all`
    pub fn parse(s: &str) -> Option<Self> {
        let mut words = s.split_whitespace();
        let strategy = match words.next()? {
            "drop" => SyncStrategy::Drop,
            "abort" => SyncStrategy::Abort,
            "replace" => SyncStrategy::Replace,
            "none" => SyncStrategy::None,
            "queue" => match words.next() {
                Some(mode) => SyncStrategy::Queue(QueueMode::parse(mode)?),
                None => SyncStrategy::Queue(QueueMode::Last),
            },
            _ => return None,
        };
        words.next().is_none().then_some(strategy)
    }
}

/// Parsed `hx-sync` value: `[<selector>:]<strategy>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSpec {
    /// Scope selector, `None` meaning the declaring element itself
    pub scope: Option<String>,
    pub strategy: SyncStrategy,
}

impl SyncSpec {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some(strategy) = SyncStrategy::parse(input) {
            return Some(Self { scope: None, strategy });
        }
        // The selector itself may contain ':' (e.g. `closest form:abort`)
        let (selector, strategy) = input.rsplit_once(':')?;
        let selector = selector.trim();
        Some(Self {
            scope: (!selector.is_empty() && selector != "this").then(|| selector.to_string()),
            strategy: SyncStrategy::parse(strategy)?,
        })
    }
}

/// Outcome of asking a scope to take a new request
#[derive(Debug)]
pub enum Admission<P> {
    /// Scope was idle; start now
    Start(P),
    /// Held in the queue; `discarded` were queued earlier and have been dropped
    Queued { discarded: Vec<RequestId> },
    /// Ignored because the scope is busy
    Dropped,
    /// The in-flight request was canceled; start this one
    Replace { aborted: RequestId, payload: P },
}

struct Inflight {
    id: RequestId,
    task: Option<Task<()>>,
}

struct Scope<P> {
    active: Option<Inflight>,
    queue: VecDeque<(RequestId, P)>,
}

impl<P> Default for Scope<P> {
    fn default() -> Self {
        Self {
            active: None,
            queue: VecDeque::new(),
        }
    }
}

/// Per-scope concurrency control. `P` is the payload held for queued requests.
pub struct Coordinator<P> {
    scopes: HashMap<NodeId, Scope<P>>,
    /// Uncoordinated requests (`hx-sync` none)
    free: HashMap<RequestId, Option<Task<()>>>,
}

impl<P> Default for Coordinator<P> {
    fn default() -> Self {
        Self {
            scopes: HashMap::new(),
            free: HashMap::new(),
        }
    }
}

impl<P> Coordinator<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer request `id` to `scope` (`None` = uncoordinated)
    pub fn admit(
        &mut self,
        scope: Option<NodeId>,
        strategy: SyncStrategy,
        id: RequestId,
        payload: P,
    ) -> Admission<P> {
        let Some(scope_id) = scope.filter(|_| strategy != SyncStrategy::None) else {
            self.free.insert(id, None);
            return Admission::Start(payload);
        };
        let scope = self.scopes.entry(scope_id).or_default();

        let Some(active) = scope.active.as_mut() else {
            scope.active = Some(Inflight { id, task: None });
            return Admission::Start(payload);
        };

        match strategy {
            SyncStrategy::Drop | SyncStrategy::None => Admission::Dropped,
            SyncStrategy::Abort | SyncStrategy::Replace => {
                let aborted = active.id;
                // Dropping the task cancels the in-flight exchange
                drop(active.task.take());
                scope.active = Some(Inflight { id, task: None });
                Admission::Replace { aborted, payload }
            }
            SyncStrategy::Queue(QueueMode::First) => {
                if scope.queue.is_empty() {
                    scope.queue.push_back((id, payload));
                    Admission::Queued { discarded: Vec::new() }
                } else {
                    Admission::Dropped
                }
            }
            SyncStrategy::Queue(QueueMode::Last) => {
                let discarded = scope.queue.drain(..).map(|(id, _)| id).collect();
                scope.queue.push_back((id, payload));
                Admission::Queued { discarded }
            }
            SyncStrategy::Queue(QueueMode::All) => {
                scope.queue.push_back((id, payload));
                Admission::Queued { discarded: Vec::new() }
            }
        }
    }

    /// Hand the spawned task for a started request to its scope
    pub fn attach_task(&mut self, scope: Option<NodeId>, id: RequestId, task: Task<()>) {
        if let Some(slot) = self.free.get_mut(&id) {
            *slot = Some(task);
            return;
        }
        match scope
            .and_then(|s| self.scopes.get_mut(&s))
            .and_then(|s| s.active.as_mut())
            .filter(|a| a.id == id)
        {
            Some(active) => active.task = Some(task),
            // Canceled before it was attached
            None => drop(task),
        }
    }

    /// Mark `id` finished and promote the next queued request, if any
    pub fn finish(&mut self, scope: Option<NodeId>, id: RequestId) -> Option<(RequestId, P)> {
        if let Some(task) = self.free.remove(&id) {
            if let Some(task) = task {
                task.detach();
            }
            return None;
        }
        let scope_id = scope?;
        let state = self.scopes.get_mut(&scope_id)?;
        if state.active.as_ref().map(|a| a.id) != Some(id) {
            return None;
        }
        if let Some(task) = state.active.take().and_then(|a| a.task) {
            task.detach();
        }
        let next = state.queue.pop_front();
        match &next {
            Some((next_id, _)) => state.active = Some(Inflight { id: *next_id, task: None }),
            None => {
                self.scopes.remove(&scope_id);
            }
        }
        next
    }

    /// Cancel the in-flight request of `scope` and discard its queue
    pub fn abort_scope(&mut self, scope: NodeId) -> Vec<RequestId> {
        let Some(state) = self.scopes.remove(&scope) else {
            return Vec::new();
        };
        let mut ids: Vec<RequestId> = state.active.into_iter().map(|a| a.id).collect();
        ids.extend(state.queue.into_iter().map(|(id, _)| id));
        ids
    }

    /// Cancel one uncoordinated request
    pub fn abort_free(&mut self, id: RequestId) -> bool {
        self.free.remove(&id).is_some()
    }

    /// In-flight request of a scope
    pub fn active(&self, scope: NodeId) -> Option<RequestId> {
        self.scopes.get(&scope).and_then(|s| s.active.as_ref()).map(|a| a.id)
    }

    /// Number of requests waiting in a scope
    pub fn queued(&self, scope: NodeId) -> usize {
        self.scopes.get(&scope).map_or(0, |s| s.queue.len())
    }

    /// Cancel everything
    pub fn clear(&mut self) {
        self.scopes.clear();
        self.free.clear();
    }
}
