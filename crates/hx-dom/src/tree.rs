//! DOM Tree (arena-based allocation)
//!
//! All structural and attribute mutation goes through [`DomTree`] so that the
//! tree can bump its generation counter and append [`MutationRecord`]s.

use crate::{DomError, DomResult, ElementData, MutationRecord, Node, NodeData, NodeId};

/// Arena slot; `node` is `None` while the slot sits on the free list
#[derive(Debug, Clone)]
struct Slot {
    node: Option<Node>,
    generation: u32,
}

/// Arena-based DOM tree
#[derive(Debug, Clone)]
pub struct DomTree {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
    /// Bumped on every mutation; used to validate derived caches
    generation: u64,
    records: Vec<MutationRecord>,
}

impl DomTree {
    /// Create a tree holding only the document node
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                node: Some(Node::new(NodeData::Document)),
                generation: 0,
            }],
            free_list: Vec::new(),
            live: 1,
            generation: 0,
            records: Vec::new(),
        }
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Get a node by ID; stale ids of freed nodes resolve to `None`
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.get(id).ok_or(DomError::NotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(DomError::NotFound(id))
    }

    /// Number of live nodes (attached or not)
    pub fn len(&self) -> usize {
        self.live
    }

    /// A tree always holds its document node
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of arena slots, including recycled ones
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Mutation generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drain pending mutation records
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(Node::new(data));
            return NodeId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            node: Some(Node::new(data)),
            generation: 0,
        });
        NodeId::new(index, 0)
    }

    /// Release a detached node and its subtree back to the arena.
    ///
    /// Ids of the released nodes stop resolving. Fails with
    /// [`DomError::HierarchyRequest`] when `id` still has a parent or is the
    /// document node.
    pub fn free(&mut self, id: NodeId) -> DomResult<usize> {
        if id == NodeId::ROOT || self.node(id)?.parent.is_valid() {
            return Err(DomError::HierarchyRequest);
        }
        let mut doomed = vec![id];
        doomed.extend(self.descendants(id));
        for &node in &doomed {
            self.release(node);
        }
        Ok(doomed.len())
    }

    /// Release every node not reachable from the document node
    pub fn free_detached(&mut self) -> usize {
        let mut reachable = vec![false; self.slots.len()];
        reachable[NodeId::ROOT.index as usize] = true;
        for id in self.descendants(NodeId::ROOT) {
            reachable[id.index as usize] = true;
        }
        let stale: Vec<NodeId> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(index, slot)| slot.node.is_some() && !reachable[*index])
            .map(|(index, slot)| NodeId::new(index as u32, slot.generation))
            .collect();
        for &id in &stale {
            self.release(id);
        }
        stale.len()
    }

    fn release(&mut self, id: NodeId) {
        let Some(slot) = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
        else {
            return;
        };
        if slot.node.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(id.index);
            self.live -= 1;
        }
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData::new(tag)))
    }

    /// Create a detached element with attributes
    pub fn create_element_with_attrs(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut data = ElementData::new(tag);
        for (name, value) in attrs {
            data.attrs.set(name, value);
        }
        self.push(NodeData::Element(data))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    /// Create a detached comment node
    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Comment(text.to_string()))
    }

    /// Create a detached doctype node
    pub fn create_doctype(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Doctype { name: name.to_string() })
    }

    /// Deep-copy `id` and its subtree into fresh detached nodes
    pub fn clone_subtree(&mut self, id: NodeId) -> DomResult<NodeId> {
        let data = self.node(id)?.data.clone();
        let copy = self.push(data);
        let children: Vec<NodeId> = self.children(id).collect();
        for child in children {
            let child_copy = self.clone_subtree(child)?;
            self.append_child(copy, child_copy)?;
        }
        Ok(copy)
    }

    // === Navigation ===

    /// Element data, if `id` is an element
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(Node::as_element)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    /// Lower-case tag name
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }

    /// Child nodes in order
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.get(id).map_or(NodeId::NONE, |n| n.first_child),
        }
    }

    /// Element children in order
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).filter(|&c| self.is_element(c))
    }

    /// Ancestors from the parent up to the document node
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).map_or(NodeId::NONE, |n| n.parent),
        }
    }

    /// Descendants in document order, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            root: id,
            next: self.get(id).map_or(NodeId::NONE, |n| n.first_child),
        }
    }

    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.get(id)?.next_sibling;
        while cur.is_valid() {
            if self.is_element(cur) {
                return Some(cur);
            }
            cur = self.get(cur)?.next_sibling;
        }
        None
    }

    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.get(id)?.prev_sibling;
        while cur.is_valid() {
            if self.is_element(cur) {
                return Some(cur);
            }
            cur = self.get(cur)?.prev_sibling;
        }
        None
    }

    /// Whether `id` is reachable from the document node
    pub fn is_connected(&self, id: NodeId) -> bool {
        id == NodeId::ROOT || self.ancestors(id).any(|a| a == NodeId::ROOT)
    }

    /// Inclusive containment check
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    // === Structure mutation ===

    /// Append `child` as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference` (or at the end when `None`)
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        let parent_node = self.node(parent)?;
        if !matches!(parent_node.data, NodeData::Document | NodeData::Element(_)) {
            return Err(DomError::HierarchyRequest);
        }
        self.node(child)?;
        if self.contains(child, parent) {
            return Err(DomError::HierarchyRequest);
        }
        if let Some(reference) = reference {
            if reference == child {
                return Ok(());
            }
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild { parent, child: reference });
            }
        }

        self.detach(child)?;

        let (prev, next) = match reference {
            Some(reference) => (self.node(reference)?.prev_sibling, reference),
            None => (self.node(parent)?.last_child, NodeId::NONE),
        };
        {
            let node = self.node_mut(child)?;
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = next;
        }
        if prev.is_valid() {
            self.node_mut(prev)?.next_sibling = child;
        } else {
            self.node_mut(parent)?.first_child = child;
        }
        if next.is_valid() {
            self.node_mut(next)?.prev_sibling = child;
        } else {
            self.node_mut(parent)?.last_child = child;
        }

        self.generation += 1;
        self.records.push(MutationRecord::child_added(parent, child));
        Ok(())
    }

    /// Detach a node (and its subtree) from its parent. No-op when detached.
    pub fn remove(&mut self, node: NodeId) -> DomResult<()> {
        self.detach(node)
    }

    fn detach(&mut self, id: NodeId) -> DomResult<()> {
        let (parent, prev, next) = {
            let node = self.node(id)?;
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        if !parent.is_valid() {
            return Ok(());
        }
        if prev.is_valid() {
            self.node_mut(prev)?.next_sibling = next;
        } else {
            self.node_mut(parent)?.first_child = next;
        }
        if next.is_valid() {
            self.node_mut(next)?.prev_sibling = prev;
        } else {
            self.node_mut(parent)?.last_child = prev;
        }
        let node = self.node_mut(id)?;
        node.parent = NodeId::NONE;
        node.prev_sibling = NodeId::NONE;
        node.next_sibling = NodeId::NONE;

        self.generation += 1;
        self.records.push(MutationRecord::child_removed(parent, id));
        Ok(())
    }

    /// Detach every child of `parent`, returning them in order
    pub fn remove_children(&mut self, parent: NodeId) -> DomResult<Vec<NodeId>> {
        let children: Vec<NodeId> = self.children(parent).collect();
        for &child in &children {
            self.detach(child)?;
        }
        Ok(children)
    }

    // === Attributes ===

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.get_attr(name))
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|e| e.attrs.contains(name))
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<()> {
        let elem = self
            .node_mut(id)?
            .as_element_mut()
            .ok_or(DomError::NotAnElement(id))?;
        let old = elem.attrs.set(name, value);
        if old.as_deref() == Some(value) {
            return Ok(());
        }
        self.generation += 1;
        self.records.push(MutationRecord::attribute(id, name, old));
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> DomResult<()> {
        let elem = self
            .node_mut(id)?
            .as_element_mut()
            .ok_or(DomError::NotAnElement(id))?;
        if let Some(old) = elem.attrs.remove(name) {
            self.generation += 1;
            self.records.push(MutationRecord::attribute(id, name, Some(old)));
        }
        Ok(())
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|e| e.has_class(class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> DomResult<()> {
        let elem = self.element(id).ok_or(DomError::NotAnElement(id))?;
        if elem.has_class(class) {
            return Ok(());
        }
        let mut classes: Vec<&str> = elem.classes().collect();
        classes.push(class);
        let value = classes.join(" ");
        self.set_attribute(id, "class", &value)
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> DomResult<()> {
        let elem = self.element(id).ok_or(DomError::NotAnElement(id))?;
        if !elem.has_class(class) {
            return Ok(());
        }
        let value = elem
            .classes()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        if value.is_empty() {
            self.remove_attribute(id, "class")
        } else {
            self.set_attribute(id, "class", &value)
        }
    }

    // === Text ===

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.get(id).and_then(Node::as_text) {
            return text.to_string();
        }
        self.descendants(id)
            .filter_map(|d| self.get(d).and_then(Node::as_text))
            .collect()
    }

    /// Replace the content of a text node
    pub fn set_text(&mut self, id: NodeId, text: &str) -> DomResult<()> {
        let node = self.node_mut(id)?;
        let NodeData::Text(content) = &mut node.data else {
            return Err(DomError::HierarchyRequest);
        };
        let old = std::mem::replace(content, text.to_string());
        self.generation += 1;
        self.records.push(MutationRecord::character_data(id, old));
        Ok(())
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over child ids
pub struct Children<'a> {
    tree: &'a DomTree,
    next: NodeId,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next.some()?;
        self.next = self.tree.get(current).map_or(NodeId::NONE, |n| n.next_sibling);
        Some(current)
    }
}

/// Iterator over ancestor ids
pub struct Ancestors<'a> {
    tree: &'a DomTree,
    next: NodeId,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next.some()?;
        self.next = self.tree.get(current).map_or(NodeId::NONE, |n| n.parent);
        Some(current)
    }
}

/// Pre-order iterator over a subtree
pub struct Descendants<'a> {
    tree: &'a DomTree,
    root: NodeId,
    next: NodeId,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next.some()?;
        let node = self.tree.get(current)?;
        self.next = if node.first_child.is_valid() {
            node.first_child
        } else {
            let mut cursor = current;
            loop {
                if cursor == self.root {
                    break NodeId::NONE;
                }
                let Some(n) = self.tree.get(cursor) else {
                    break NodeId::NONE;
                };
                if n.next_sibling.is_valid() {
                    break n.next_sibling;
                }
                cursor = n.parent;
                if !cursor.is_valid() || cursor == self.root {
                    break NodeId::NONE;
                }
            }
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DomTree, NodeId, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        let a = tree.create_element("a");
        let b = tree.create_element("b");
        tree.append_child(NodeId::ROOT, div).unwrap();
        tree.append_child(div, a).unwrap();
        tree.append_child(div, b).unwrap();
        (tree, div, a, b)
    }

    #[test]
    fn test_append_and_children() {
        let (tree, div, a, b) = sample();
        let children: Vec<_> = tree.children(div).collect();
        assert_eq!(children, vec![a, b]);
        assert_eq!(tree.parent(a), Some(div));
        assert!(tree.is_connected(b));
    }

    #[test]
    fn test_insert_before() {
        let (mut tree, div, a, b) = sample();
        let c = tree.create_element("c");
        tree.insert_before(div, c, Some(b)).unwrap();
        let children: Vec<_> = tree.children(div).collect();
        assert_eq!(children, vec![a, c, b]);
    }

    #[test]
    fn test_insert_moves_node() {
        let (mut tree, div, a, b) = sample();
        tree.append_child(div, a).unwrap();
        let children: Vec<_> = tree.children(div).collect();
        assert_eq!(children, vec![b, a]);
    }

    #[test]
    fn test_remove_detaches_subtree() {
        let (mut tree, div, a, _) = sample();
        let text = tree.create_text("x");
        tree.append_child(a, text).unwrap();
        tree.remove(div).unwrap();

        assert!(!tree.is_connected(div));
        assert!(!tree.is_connected(text));
        assert_eq!(tree.parent(text), Some(a));
    }

    #[test]
    fn test_hierarchy_error() {
        let (mut tree, div, a, _) = sample();
        assert_eq!(tree.append_child(a, div), Err(DomError::HierarchyRequest));
        assert_eq!(tree.append_child(div, div), Err(DomError::HierarchyRequest));
    }

    #[test]
    fn test_descendants_order() {
        let (mut tree, div, a, b) = sample();
        let t = tree.create_text("t");
        tree.append_child(a, t).unwrap();
        let order: Vec<_> = tree.descendants(div).collect();
        assert_eq!(order, vec![a, t, b]);
    }

    #[test]
    fn test_descendants_stays_in_subtree() {
        let (mut tree, _, a, _) = sample();
        let t = tree.create_text("t");
        tree.append_child(a, t).unwrap();
        let order: Vec<_> = tree.descendants(a).collect();
        assert_eq!(order, vec![t]);
    }

    #[test]
    fn test_records_and_generation() {
        let (mut tree, div, _, _) = sample();
        tree.take_records();
        let gen0 = tree.generation();
        tree.set_attribute(div, "id", "main").unwrap();
        tree.set_attribute(div, "id", "main").unwrap();
        let records = tree.take_records();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attribute_name.as_deref(), Some("id"));
        assert_eq!(tree.generation(), gen0 + 1);
    }

    #[test]
    fn test_class_helpers() {
        let (mut tree, div, _, _) = sample();
        tree.add_class(div, "one").unwrap();
        tree.add_class(div, "two").unwrap();
        tree.add_class(div, "one").unwrap();
        assert_eq!(tree.get_attribute(div, "class"), Some("one two"));

        tree.remove_class(div, "one").unwrap();
        tree.remove_class(div, "two").unwrap();
        assert!(!tree.has_attribute(div, "class"));
    }

    #[test]
    fn test_element_siblings() {
        let (mut tree, div, a, b) = sample();
        let t = tree.create_text(" ");
        tree.insert_before(div, t, Some(b)).unwrap();
        assert_eq!(tree.next_element_sibling(a), Some(b));
        assert_eq!(tree.previous_element_sibling(b), Some(a));
        assert_eq!(tree.next_element_sibling(b), None);
    }

    #[test]
    fn test_clone_subtree() {
        let (mut tree, div, a, _) = sample();
        tree.set_attribute(a, "href", "/x").unwrap();
        let copy = tree.clone_subtree(div).unwrap();

        assert_ne!(copy, div);
        assert!(!tree.is_connected(copy));
        let kids: Vec<_> = tree.children(copy).collect();
        assert_eq!(kids.len(), 2);
        assert_eq!(tree.get_attribute(kids[0], "href"), Some("/x"));
        assert_eq!(tree.children(div).count(), 2);
    }

    #[test]
    fn test_free_recycles_slot_with_new_generation() {
        let (mut tree, div, a, b) = sample();
        let before = tree.len();
        tree.remove(a).unwrap();
        assert_eq!(tree.free(a).unwrap(), 1);

        assert_eq!(tree.len(), before - 1);
        assert!(tree.get(a).is_none());
        assert_eq!(tree.children(div).collect::<Vec<_>>(), vec![b]);

        let fresh = tree.create_element("p");
        assert_eq!(fresh.index(), a.index());
        assert_ne!(fresh, a);
        assert!(tree.get(a).is_none());
        assert_eq!(tree.tag_name(fresh), Some("p"));
        assert_eq!(tree.capacity(), before);
    }

    #[test]
    fn test_free_rejects_attached_node() {
        let (mut tree, _, a, _) = sample();
        assert_eq!(tree.free(a), Err(DomError::HierarchyRequest));
        assert_eq!(tree.free(NodeId::ROOT), Err(DomError::HierarchyRequest));
        assert!(tree.get(a).is_some());
    }

    #[test]
    fn test_free_detached_keeps_document() {
        let (mut tree, div, a, b) = sample();
        let orphan = tree.create_element("span");
        let orphan_text = tree.create_text("t");
        tree.append_child(orphan, orphan_text).unwrap();
        tree.remove(b).unwrap();

        assert_eq!(tree.free_detached(), 3);
        assert!(tree.get(orphan).is_none());
        assert!(tree.get(orphan_text).is_none());
        assert!(tree.get(b).is_none());
        assert!(tree.is_connected(div));
        assert!(tree.is_connected(a));
        assert_eq!(tree.free_detached(), 0);
    }

    #[test]
    fn test_stale_id_mutation_is_not_found() {
        let (mut tree, _, a, _) = sample();
        tree.remove(a).unwrap();
        tree.free(a).unwrap();
        assert_eq!(tree.set_attribute(a, "id", "x"), Err(DomError::NotFound(a)));
        assert!(!tree.is_connected(a));
    }
}
