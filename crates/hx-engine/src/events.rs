//! Event listeners
//!
//! Listener storage keyed by node. Dispatch (extension hooks, bubbling)
//! is done by the engine: listeners are collected first and invoked with no
//! engine state borrowed, so a listener may call back into the engine.

use crate::engine::Engine;
use hx_dom::{DomTree, Event, NodeId};
use std::collections::HashMap;
use std::rc::Rc;

/// Event callback. Receives the engine so it can query or mutate the page.
pub type Listener = Rc<dyn Fn(&Engine, &mut Event)>;

/// Handle returned by [`Engine::add_event_listener`](crate::Engine::add_event_listener)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    name: String,
    listener: Listener,
}

/// Listeners by node, in registration order
#[derive(Default)]
pub struct ListenerTable {
    next_id: u64,
    by_node: HashMap<NodeId, Vec<Entry>>,
    owner: HashMap<ListenerId, NodeId>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: NodeId, name: &str, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.by_node.entry(node).or_default().push(Entry {
            id,
            name: name.to_string(),
            listener,
        });
        self.owner.insert(id, node);
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let Some(node) = self.owner.remove(&id) else {
            return false;
        };
        if let Some(entries) = self.by_node.get_mut(&node) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                self.by_node.remove(&node);
            }
        }
        true
    }

    /// Drop every listener on `node`
    pub fn remove_node(&mut self, node: NodeId) -> usize {
        let Some(entries) = self.by_node.remove(&node) else {
            return 0;
        };
        for e in &entries {
            self.owner.remove(&e.id);
        }
        entries.len()
    }

    /// Listeners for `name` on `node`, cloned out of the table
    pub fn collect(&self, node: NodeId, name: &str) -> Vec<Listener> {
        self.by_node
            .get(&node)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.name == name)
                    .map(|e| e.listener.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nodes that currently have listeners
    pub fn nodes(&self) -> Vec<NodeId> {
        self.by_node.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.owner.len()
    }

    pub fn clear(&mut self) {
        self.by_node.clear();
        self.owner.clear();
    }
}

impl std::fmt::Debug for ListenerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerTable").field("len", &self.len()).finish()
    }
}

/// Nodes an event visits: the target, then its ancestors when it bubbles
pub fn propagation_path(tree: &DomTree, event: &Event) -> Vec<NodeId> {
    let mut path = vec![event.target];
    if event.bubbles {
        path.extend(tree.ancestors(event.target));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Listener {
        Rc::new(|_, _| {})
    }

    #[test]
    fn test_add_collect_remove() {
        let mut table = ListenerTable::new();
        let a = table.add(NodeId::ROOT, "click", noop());
        table.add(NodeId::ROOT, "click", noop());
        table.add(NodeId::ROOT, "submit", noop());

        assert_eq!(table.collect(NodeId::ROOT, "click").len(), 2);
        assert!(table.remove(a));
        assert!(!table.remove(a));
        assert_eq!(table.collect(NodeId::ROOT, "click").len(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_remove_node() {
        let mut table = ListenerTable::new();
        let id = table.add(NodeId::ROOT, "click", noop());
        assert_eq!(table.remove_node(NodeId::ROOT), 1);
        assert_eq!(table.len(), 0);
        assert!(!table.remove(id));
    }

    #[test]
    fn test_propagation_path() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        let button = tree.create_element("button");
        tree.append_child(tree.root(), div).unwrap();
        tree.append_child(div, button).unwrap();

        let evt = Event::new("click", button);
        assert_eq!(propagation_path(&tree, &evt), vec![button, div, tree.root()]);

        let evt = Event::new("hx:load", button).non_bubbling();
        assert_eq!(propagation_path(&tree, &evt), vec![button]);
    }
}
