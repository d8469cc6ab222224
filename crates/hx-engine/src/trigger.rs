//! Trigger specifications (`hx-trigger`)
//!
//! `click once, keyup changed delay:300ms from:closest form, every 2s, revealed`

use crate::sync::QueueMode;
use crate::time::parse_interval;
use std::time::Duration;

/// What a trigger listens for
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    /// A DOM event by name
    Event(String),
    /// Fires once after the element is processed
    Load,
    /// Fires the first time the element becomes visible
    Revealed,
    /// Fires each time the element starts intersecting the viewport
    Intersect,
    /// Polling interval
    Every(Duration),
}

/// Queue override from the `queue:` modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerQueue {
    Mode(QueueMode),
    None,
}

/// One parsed trigger
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSpec {
    pub event: TriggerEvent,
    pub once: bool,
    pub changed: bool,
    pub delay: Option<Duration>,
    pub throttle: Option<Duration>,
    /// Listen on other element(s): `document`, `window`, `closest X`, CSS ...
    pub from: Option<String>,
    /// Only fire when the event originated on an element matching this
    pub target: Option<String>,
    pub consume: bool,
    pub queue: Option<TriggerQueue>,
    /// Intersection ratio for `intersect`
    pub threshold: f64,
}

impl TriggerSpec {
    pub fn new(event: TriggerEvent) -> Self {
        Self {
            event,
            once: false,
            changed: false,
            delay: None,
            throttle: None,
            from: None,
            target: None,
            consume: false,
            queue: None,
            threshold: 0.0,
        }
    }

    pub fn event(name: &str) -> Self {
        Self::new(TriggerEvent::Event(name.to_string()))
    }

    /// DOM event name, for listener-backed triggers
    pub fn event_name(&self) -> Option<&str> {
        match &self.event {
            TriggerEvent::Event(name) => Some(name),
            _ => None,
        }
    }
}

/// Default trigger for an element with no `hx-trigger`
pub fn default_trigger(tag: &str, input_type: Option<&str>) -> TriggerSpec {
    match tag {
        "form" => TriggerSpec::event("submit"),
        "input" if matches!(input_type, Some("submit") | Some("button")) => TriggerSpec::event("click"),
        "input" | "select" | "textarea" => TriggerSpec::event("change"),
        _ => TriggerSpec::event("click"),
    }
}

/// Split on commas that are outside `[...]` filters
fn split_list(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Drop a `[...]` event filter; filters need a script evaluator
fn strip_filter(entry: &str) -> String {
    match (entry.find('['), entry.rfind(']')) {
        (Some(open), Some(close)) if close > open => {
            tracing::warn!("Trigger filter {:?} is not evaluated", &entry[open..=close]);
            format!("{}{}", &entry[..open], &entry[close + 1..])
        }
        _ => entry.to_string(),
    }
}

/// Parse an `hx-trigger` value. Unparseable entries are skipped with a warning.
pub fn parse_triggers(input: &str) -> Vec<TriggerSpec> {
    split_list(input)
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            let spec = parse_one(entry);
            if spec.is_none() {
                tracing::warn!("Ignoring invalid trigger {:?}", entry);
            }
            spec
        })
        .collect()
}

fn parse_one(entry: &str) -> Option<TriggerSpec> {
    let entry = strip_filter(entry);
    let mut tokens = entry.split_whitespace().peekable();
    let first = tokens.next()?;

    let mut spec = if first == "every" {
        TriggerSpec::new(TriggerEvent::Every(parse_interval(tokens.next()?)?))
    } else {
        match first {
            "load" => TriggerSpec::new(TriggerEvent::Load),
            "revealed" => TriggerSpec::new(TriggerEvent::Revealed),
            "intersect" => TriggerSpec::new(TriggerEvent::Intersect),
            other => TriggerSpec::event(other),
        }
    };

    while let Some(token) = tokens.next() {
        let (key, value) = token.split_once(':').unwrap_or((token, ""));
        match key {
            "once" => spec.once = true,
            "changed" => spec.changed = true,
            "consume" => spec.consume = true,
            "delay" => spec.delay = Some(parse_interval(value)?),
            "throttle" => spec.throttle = Some(parse_interval(value)?),
            "threshold" => spec.threshold = value.parse().ok()?,
            "queue" => {
                spec.queue = Some(match value {
                    "none" => TriggerQueue::None,
                    mode => TriggerQueue::Mode(QueueMode::parse(mode)?),
                })
            }
            "from" | "target" => {
                let mut selector = value.to_string();
                // `from:closest form`, `from:next .x` take the following token
                if matches!(value, "closest" | "find" | "next" | "previous") {
                    if let Some(next) = tokens.next_if(|t| !t.contains(':') && !matches!(*t, "once" | "changed" | "consume")) {
                        selector = format!("{} {}", value, next);
                    }
                }
                if selector.is_empty() {
                    return None;
                }
                if key == "from" {
                    spec.from = Some(selector);
                } else {
                    spec.target = Some(selector);
                }
            }
            "root" => tracing::debug!("Ignoring intersect root {:?}", value),
            _ => {
                tracing::warn!("Unknown trigger modifier {:?}", token);
            }
        }
    }
    Some(spec)
}
