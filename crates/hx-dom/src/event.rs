//! DOM Events
//!
//! Event objects dispatched through the tree. Dispatch itself (listener
//! lookup and bubbling) lives with whoever owns the listeners.

use crate::NodeId;
use serde_json::{Map, Value};

/// DOM event
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub target: NodeId,
    pub current_target: Option<NodeId>,
    /// Structured payload; an object for engine lifecycle events
    pub detail: Value,
    pub bubbles: bool,
    pub cancelable: bool,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl Event {
    /// Create a bubbling, cancelable event with an empty detail object
    pub fn new(name: &str, target: NodeId) -> Self {
        Self {
            name: name.to_string(),
            target,
            current_target: None,
            detail: Value::Object(Map::new()),
            bubbles: true,
            cancelable: true,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    /// Replace the detail payload
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn non_bubbling(mut self) -> Self {
        self.bubbles = false;
        self
    }

    pub fn non_cancelable(mut self) -> Self {
        self.cancelable = false;
        self
    }

    /// Read a detail field
    pub fn detail_field(&self, key: &str) -> Option<&Value> {
        self.detail.get(key)
    }

    /// Set a detail field, turning the detail into an object if needed
    pub fn set_detail_field(&mut self, key: &str, value: Value) {
        if !self.detail.is_object() {
            self.detail = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.detail {
            map.insert(key.to_string(), value);
        }
    }

    /// Prevent default action
    pub fn prevent_default(&mut self) {
        if self.cancelable {
            self.default_prevented = true;
        }
    }

    /// Stop propagation
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Check if default was prevented
    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}
