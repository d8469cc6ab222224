//! Element bindings
//!
//! Per-element runtime state created when a node is processed: whether it
//! was boosted and one [`TriggerState`] per parsed trigger.

use crate::events::ListenerId;
use crate::trigger::TriggerSpec;
use hx_dom::NodeId;
use smol::Task;
use std::time::{Duration, Instant};

/// What to do with one firing of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Filtered out by a modifier
    Skip,
    /// Issue the request now
    Fire,
    /// Issue after the debounce delay, replacing any pending one
    Debounce(Duration),
}

/// Runtime state of one trigger
pub struct TriggerState {
    pub spec: TriggerSpec,
    /// Listeners attached for this trigger (possibly on other nodes via `from:`)
    pub listeners: Vec<ListenerId>,
    /// Pending debounced firing
    pub debounce: Option<Task<()>>,
    /// `every` poll loop or `load` firing
    pub task: Option<Task<()>>,
    pub last_fired: Option<Instant>,
    /// Observed value for `changed`
    pub last_value: Option<String>,
    /// Set once a `once` trigger has fired
    pub consumed: bool,
    /// `revealed` already fired
    pub revealed: bool,
}

impl TriggerState {
    pub fn new(spec: TriggerSpec) -> Self {
        Self {
            spec,
            listeners: Vec::new(),
            debounce: None,
            task: None,
            last_fired: None,
            last_value: None,
            consumed: false,
            revealed: false,
        }
    }

    /// Run the `once`, `changed`, `throttle` and `delay` modifiers for a
    /// firing at `now`. `value` is the current value of the element the
    /// event was observed on.
    pub fn admit(&mut self, now: Instant, value: Option<String>) -> Gate {
        if self.consumed {
            return Gate::Skip;
        }
        if self.spec.changed {
            if value == self.last_value {
                return Gate::Skip;
            }
            self.last_value = value;
        }
        if let (Some(window), Some(last)) = (self.spec.throttle, self.last_fired) {
            if now.duration_since(last) < window {
                return Gate::Skip;
            }
        }
        self.last_fired = Some(now);
        if self.spec.once {
            self.consumed = true;
        }
        match self.spec.delay {
            Some(delay) if !delay.is_zero() => Gate::Debounce(delay),
            _ => Gate::Fire,
        }
    }
}

/// Everything the engine keeps for one processed element
pub struct ElementBinding {
    pub node: NodeId,
    pub triggers: Vec<TriggerState>,
    /// Bound through `hx-boost` rather than a verb
    pub boosted: bool,
}

impl ElementBinding {
    pub fn new(node: NodeId, boosted: bool) -> Self {
        Self {
            node,
            triggers: Vec::new(),
            boosted,
        }
    }

    /// Every listener attached on behalf of this binding
    pub fn listener_ids(&self) -> impl Iterator<Item = ListenerId> + '_ {
        self.triggers.iter().flat_map(|t| t.listeners.iter().copied())
    }
}

impl std::fmt::Debug for ElementBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementBinding")
            .field("node", &self.node)
            .field("triggers", &self.triggers.iter().map(|t| &t.spec).collect::<Vec<_>>())
            .field("boosted", &self.boosted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::parse_triggers;

    fn state(input: &str) -> TriggerState {
        TriggerState::new(parse_triggers(input).remove(0))
    }

    #[test]
    fn test_once() {
        let mut t = state("click once");
        let now = Instant::now();
        assert_eq!(t.admit(now, None), Gate::Fire);
        assert_eq!(t.admit(now, None), Gate::Skip);
        assert!(t.consumed);
    }

    #[test]
    fn test_changed() {
        let mut t = state("keyup changed");
        t.last_value = Some("a".into());
        let now = Instant::now();
        assert_eq!(t.admit(now, Some("a".into())), Gate::Skip);
        assert_eq!(t.admit(now, Some("ab".into())), Gate::Fire);
        assert_eq!(t.admit(now, Some("ab".into())), Gate::Skip);
    }

    #[test]
    fn test_throttle() {
        let mut t = state("click throttle:1s");
        let start = Instant::now();
        assert_eq!(t.admit(start, None), Gate::Fire);
        assert_eq!(t.admit(start + Duration::from_millis(500), None), Gate::Skip);
        assert_eq!(t.admit(start + Duration::from_millis(1500), None), Gate::Fire);
    }

    #[test]
    fn test_delay() {
        let mut t = state("keyup delay:300ms");
        assert_eq!(t.admit(Instant::now(), None), Gate::Debounce(Duration::from_millis(300)));
    }
}
