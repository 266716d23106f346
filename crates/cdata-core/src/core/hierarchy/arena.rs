use super::ids::NodeId;
use super::path::parse_segment;
use crate::core::signal::Signal;
use slotmap::SlotMap;
use tracing::{debug, trace, warn};

/// Lifecycle of a hierarchy node. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Created,
    Initialized,
    Active,
    Destroying,
    Destroyed,
}

/// Structural notifications emitted by a [`Hierarchy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyEvent {
    Created {
        node: NodeId,
    },
    ParentChanged {
        node: NodeId,
        old: Option<NodeId>,
        new: Option<NodeId>,
    },
    ChildAdded {
        parent: NodeId,
        child: NodeId,
    },
    ChildRemoved {
        parent: NodeId,
        child: NodeId,
    },
    Renamed {
        node: NodeId,
        old: String,
        new: String,
    },
    Destroyed {
        node: NodeId,
    },
}

/// Payloads that keep an ordered sequence of children addressable by index.
///
/// Used by [`Hierarchy::find_by_path`] to resolve `name[index]` segments.
pub trait IndexedChildren {
    fn indexed_child(&self, index: usize) -> Option<NodeId>;
}

/// A single arena entry: identity, lifecycle and parent edge plus the payload.
#[derive(Debug, Clone)]
pub struct HierarchyNode<T> {
    name: String,
    state: LifecycleState,
    parent: Option<NodeId>,
    attach_seq: u64,
    payload: T,
}

impl<T> HierarchyNode<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }
}

/// An arena of parent/child nodes.
///
/// The arena is the only owner of nodes. Parent edges are handles; child
/// lists are answered by scanning for nodes whose parent is the queried node,
/// ordered by the time they were attached.
#[derive(Debug)]
pub struct Hierarchy<T> {
    nodes: SlotMap<NodeId, HierarchyNode<T>>,
    events: Signal<HierarchyEvent>,
    next_seq: u64,
}

impl<T> Default for Hierarchy<T> {
    fn default() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            events: Signal::new(),
            next_seq: 0,
        }
    }
}

impl<T> Hierarchy<T> {
    /// Creates an empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// The notification channel for structural changes.
    pub fn events(&self) -> &Signal<HierarchyEvent> {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut Signal<HierarchyEvent> {
        &mut self.events
    }

    /// Inserts a detached node in the `Created` state.
    ///
    /// # Arguments
    ///
    /// * `name` - The identity name of the node.
    /// * `payload` - The data carried by the node.
    ///
    /// # Return
    ///
    /// The handle of the new node.
    pub fn insert(&mut self, name: impl Into<String>, payload: T) -> NodeId {
        let seq = self.bump_seq();
        let id = self.nodes.insert(HierarchyNode {
            name: name.into(),
            state: LifecycleState::Created,
            parent: None,
            attach_seq: seq,
            payload,
        });
        trace!(node = ?id, "Created hierarchy node");
        self.events.emit(&HierarchyEvent::Created { node: id });
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&HierarchyNode<T>> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut HierarchyNode<T>> {
        self.nodes.get_mut(id)
    }

    pub fn payload(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(id).map(|n| &n.payload)
    }

    pub fn payload_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.nodes.get_mut(id).map(|n| &mut n.payload)
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id).map(|n| n.name.as_str())
    }

    /// Renames a live node. Returns `false` for destroyed nodes.
    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> bool {
        let name = name.into();
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if node.state >= LifecycleState::Destroying {
            return false;
        }
        if node.name == name {
            return true;
        }
        let old = std::mem::replace(&mut node.name, name.clone());
        trace!(node = ?id, %old, new = %name, "Renamed hierarchy node");
        self.events.emit(&HierarchyEvent::Renamed {
            node: id,
            old,
            new: name,
        });
        true
    }

    /// The lifecycle state of a node. Handles of removed nodes report
    /// `Destroyed`.
    pub fn state(&self, id: NodeId) -> LifecycleState {
        self.nodes
            .get(id)
            .map(|n| n.state)
            .unwrap_or(LifecycleState::Destroyed)
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.state(id) < LifecycleState::Destroying
    }

    /// Moves a node forward in its lifecycle.
    ///
    /// Backward moves and moves into the teardown states are refused; teardown
    /// only happens through [`Hierarchy::destroy`].
    pub fn advance(&mut self, id: NodeId, to: LifecycleState) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if to >= LifecycleState::Destroying || to <= node.state {
            return to == node.state;
        }
        node.state = to;
        true
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Detaches `child` from its current parent and attaches it to `parent`.
    ///
    /// # Arguments
    ///
    /// * `child` - The node to move.
    /// * `parent` - The new parent, or `None` to detach.
    ///
    /// # Return
    ///
    /// `false` when either node is destroyed or tearing down, or when the new
    /// parent lies inside the child's own subtree.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> bool {
        if !self.is_alive(child) {
            warn!(node = ?child, "Refusing to reparent a destroyed node");
            return false;
        }
        if let Some(p) = parent {
            if !self.is_alive(p) {
                warn!(node = ?child, parent = ?p, "Refusing to attach to a destroyed parent");
                return false;
            }
            if p == child || self.ancestors(p).contains(&child) {
                warn!(node = ?child, parent = ?p, "Refusing to create a hierarchy cycle");
                return false;
            }
        }

        let old = self.parent(child);
        if old == parent {
            return true;
        }

        let seq = self.bump_seq();
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = parent;
            node.attach_seq = seq;
            if parent.is_some() && node.state < LifecycleState::Active {
                node.state = LifecycleState::Active;
            }
        }

        debug!(node = ?child, ?old, new = ?parent, "Reparented hierarchy node");
        if let Some(old) = old {
            self.events.emit(&HierarchyEvent::ChildRemoved {
                parent: old,
                child,
            });
        }
        if let Some(new) = parent {
            self.events.emit(&HierarchyEvent::ChildAdded { parent: new, child });
        }
        self.events.emit(&HierarchyEvent::ParentChanged {
            node: child,
            old,
            new: parent,
        });
        true
    }

    /// The live children of a node, in attachment order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut found: Vec<(u64, NodeId)> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == Some(id) && n.state < LifecycleState::Destroying)
            .map(|(cid, n)| (n.attach_seq, cid))
            .collect();
        found.sort_unstable_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, cid)| cid).collect()
    }

    /// Finds a child by name, searching depth-first when `recursive` is set.
    ///
    /// Direct children are checked before any grandchild.
    pub fn find_child(&self, id: NodeId, name: &str, recursive: bool) -> Option<NodeId> {
        let children = self.children(id);
        if let Some(hit) = children
            .iter()
            .copied()
            .find(|c| self.name(*c) == Some(name))
        {
            return Some(hit);
        }
        if recursive {
            for child in children {
                if let Some(hit) = self.find_child(child, name, true) {
                    return Some(hit);
                }
            }
        }
        None
    }

    /// Collects children whose payload satisfies `predicate`, depth-first.
    pub fn find_children<F>(&self, id: NodeId, predicate: F, recursive: bool) -> Vec<NodeId>
    where
        F: Fn(&T) -> bool,
    {
        let mut out = Vec::new();
        self.collect_children(id, &predicate, recursive, &mut out);
        out
    }

    fn collect_children<F>(&self, id: NodeId, predicate: &F, recursive: bool, out: &mut Vec<NodeId>)
    where
        F: Fn(&T) -> bool,
    {
        for child in self.children(id) {
            if self.payload(child).is_some_and(predicate) {
                out.push(child);
            }
            if recursive {
                self.collect_children(child, predicate, true, out);
            }
        }
    }

    /// Ancestors from the direct parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.parent(id);
        while let Some(p) = cursor {
            if out.contains(&p) {
                break;
            }
            out.push(p);
            cursor = self.parent(p);
        }
        out
    }

    pub fn root(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// Names from the root down to and including `id`.
    pub fn path_from_root(&self, id: NodeId) -> Vec<String> {
        let mut chain = self.ancestors(id);
        chain.reverse();
        chain.push(id);
        chain
            .into_iter()
            .filter_map(|n| self.name(n).map(str::to_string))
            .collect()
    }

    pub fn descendant_count(&self, id: NodeId) -> usize {
        self.children(id)
            .into_iter()
            .map(|c| 1 + self.descendant_count(c))
            .sum()
    }

    /// Destroys a node and its whole subtree, children first.
    ///
    /// Destroyed nodes are removed from the arena. Calling this on a node
    /// that is already gone, or already tearing down, does nothing.
    ///
    /// # Return
    ///
    /// The number of nodes removed.
    pub fn destroy(&mut self, id: NodeId) -> usize {
        match self.nodes.get_mut(id) {
            Some(node) if node.state < LifecycleState::Destroying => {
                node.state = LifecycleState::Destroying;
            }
            _ => return 0,
        }

        let mut removed = 0;
        for child in self.children_including_teardown(id) {
            removed += self.destroy(child);
        }

        if let Some(parent) = self.parent(id) {
            self.events.emit(&HierarchyEvent::ChildRemoved { parent, child: id });
        }
        if let Some(node) = self.nodes.remove(id) {
            trace!(node = ?id, name = %node.name, "Destroyed hierarchy node");
            removed += 1;
        }
        self.events.emit(&HierarchyEvent::Destroyed { node: id });
        removed
    }

    fn children_including_teardown(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.parent == Some(id))
            .map(|(cid, _)| cid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &HierarchyNode<T>)> {
        self.nodes.iter()
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

impl<T: IndexedChildren> Hierarchy<T> {
    /// Resolves a dotted path relative to `id`.
    ///
    /// Each segment is either a child name, `name[index]` (the indexed item of
    /// child `name`) or `[index]` (an indexed item of the current node). A
    /// child literally named `name[index]` takes precedence, since list items
    /// carry such names. Unresolvable paths yield `None`.
    pub fn find_by_path(&self, id: NodeId, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return self.contains(id).then_some(id);
        }
        let mut cursor = id;
        for raw in path.split('.') {
            let seg = parse_segment(raw)?;
            if let Some(hit) = self.find_child(cursor, seg.raw, false) {
                cursor = hit;
                continue;
            }
            let holder = if seg.name.is_empty() {
                cursor
            } else {
                self.find_child(cursor, seg.name, false)?
            };
            cursor = match seg.index {
                Some(index) => self.payload(holder)?.indexed_child(index)?,
                None => holder,
            };
        }
        Some(cursor)
    }
}
