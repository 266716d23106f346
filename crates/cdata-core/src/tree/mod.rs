//! # Tree Module
//!
//! The typed data-object engine.
//!
//! A [`DataTree`] owns an arena of [`node::DataNode`]s and a shared handle to
//! the [`MetadataRegistry`] that declares their types. Every operation on
//! typed data (lazy field materialisation, smart assignment, value-state
//! queries, list and container manipulation and validity checks) is a method
//! on the tree taking the [`NodeId`] of the node to act on.
//!
//! ## Key Components
//!
//! - [`node`] - Per-node storage: kind, qualifiers, state ledger and slots
//! - [`assign`] - Smart assignment and the `get`/`set`/`update` accessors
//! - [`merge`] - Structural merge and deep copy of subtrees
//! - [`state_ops`] - `is_set`, `unset`, `set_to_default` and friends
//! - [`scalar`], [`list`], [`container`], [`file_ref`] - Kind-specific operations
//! - [`validity`] - Non-raising qualifier checks producing an `ErrorReport`

pub mod assign;
pub mod container;
pub mod file_ref;
pub mod list;
pub mod merge;
pub mod node;
pub mod scalar;
pub mod state_ops;
pub mod validity;

use crate::core::error::{DataError, ErrorCode};
use crate::core::hierarchy::arena::{Hierarchy, HierarchyEvent, LifecycleState};
use crate::core::hierarchy::ids::NodeId;
use crate::core::hierarchy::path::indexed_name;
use crate::core::metadata::builtins::CONTAINER_TYPE;
use crate::core::metadata::kind::NodeKind;
use crate::core::metadata::literal::Literal;
use crate::core::metadata::qualifier::Qualifiers;
use crate::core::metadata::registry::{FieldDecl, MetadataRegistry, ROOT_TYPE, global};
use crate::core::signal::Signal;
use crate::core::state::ValueState;
use crate::core::value::Value;
use indexmap::IndexMap;
use node::{DataNode, NodeBody, VALUE_FIELD};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// An arena of typed data nodes bound to a type registry.
#[derive(Debug)]
pub struct DataTree {
    hierarchy: Hierarchy<DataNode>,
    registry: Arc<MetadataRegistry>,
    unnamed: u64,
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DataTree {
    /// A tree using the process-wide registry.
    pub fn new() -> Self {
        Self::with_registry(global())
    }

    pub fn with_registry(registry: Arc<MetadataRegistry>) -> Self {
        Self {
            hierarchy: Hierarchy::new(),
            registry,
            unnamed: 0,
        }
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn hierarchy(&self) -> &Hierarchy<DataNode> {
        &self.hierarchy
    }

    /// Structural notifications for every node of this tree.
    pub fn events_mut(&mut self) -> &mut Signal<HierarchyEvent> {
        self.hierarchy.events_mut()
    }

    pub fn node(&self, id: NodeId) -> Result<&DataNode, DataError> {
        match self.hierarchy.get(id) {
            Some(entry) if entry.state() < LifecycleState::Destroying => Ok(entry.payload()),
            _ => Err(DataError::Lifecycle { node: id }),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut DataNode, DataError> {
        match self.hierarchy.get_mut(id) {
            Some(entry) if entry.state() < LifecycleState::Destroying => Ok(entry.payload_mut()),
            _ => Err(DataError::Lifecycle { node: id }),
        }
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.hierarchy.is_alive(id)
    }

    pub fn lifecycle(&self, id: NodeId) -> LifecycleState {
        self.hierarchy.state(id)
    }

    pub fn name(&self, id: NodeId) -> Result<&str, DataError> {
        self.hierarchy.name(id).ok_or(DataError::Lifecycle { node: id })
    }

    pub fn type_name(&self, id: NodeId) -> Result<&str, DataError> {
        Ok(self.node(id)?.type_name())
    }

    pub fn kind(&self, id: NodeId) -> Result<NodeKind, DataError> {
        Ok(self.node(id)?.kind())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.hierarchy.parent(id)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.hierarchy.children(id)
    }

    pub fn find_child(&self, id: NodeId, name: &str, recursive: bool) -> Option<NodeId> {
        self.hierarchy.find_child(id, name, recursive)
    }

    /// Resolves a dotted `a.b[2].c` path relative to `id`.
    pub fn find_by_path(&self, id: NodeId, path: &str) -> Option<NodeId> {
        self.hierarchy.find_by_path(id, path)
    }

    /// Resolves a full object path as produced by [`DataTree::object_path`].
    pub fn resolve(&self, object_path: &str) -> Option<NodeId> {
        let (root_name, rest) = match object_path.split_once('.') {
            Some((head, tail)) => (head, tail),
            None => (object_path, ""),
        };
        self.hierarchy
            .iter()
            .filter(|(id, entry)| entry.parent().is_none() && self.is_alive(*id))
            .filter(|(_, entry)| entry.name() == root_name)
            .find_map(|(id, _)| self.find_by_path(id, rest))
    }

    /// Dot-joined names from the root to `id`.
    ///
    /// List items are named `{list}[{index}]`, so a list's own name is only
    /// written when the list itself is the addressed node.
    pub fn object_path(&self, id: NodeId) -> Result<String, DataError> {
        self.node(id)?;
        let mut chain = self.hierarchy.ancestors(id);
        chain.reverse();
        let mut parts: Vec<&str> = Vec::with_capacity(chain.len() + 1);
        for node in chain {
            if self.kind(node)? == NodeKind::List {
                continue;
            }
            parts.push(self.name(node)?);
        }
        parts.push(self.name(id)?);
        Ok(parts.join("."))
    }

    /// Creates a detached node of a declared type.
    pub fn create(&mut self, type_name: &str, name: &str) -> Result<NodeId, DataError> {
        self.instantiate(type_name, name, None)
    }

    /// Creates a detached node named `{type_name}_{n}`, with `n` counting the
    /// unnamed nodes this tree has created.
    pub fn create_unnamed(&mut self, type_name: &str) -> Result<NodeId, DataError> {
        self.unnamed += 1;
        let name = format!("{type_name}_{}", self.unnamed);
        self.instantiate(type_name, &name, None)
    }

    /// Creates a node and applies `values` with [`DataTree::update`].
    pub fn create_with(
        &mut self,
        type_name: &str,
        name: &str,
        values: impl Into<Value>,
    ) -> Result<NodeId, DataError> {
        let id = self.instantiate(type_name, name, None)?;
        let values = values.into();
        if !values.is_null() {
            self.update(id, values)?;
        }
        Ok(id)
    }

    /// Destroys a node and its subtree, detaching it from its owner first.
    pub fn destroy(&mut self, id: NodeId) -> usize {
        if !self.is_alive(id) {
            return 0;
        }
        self.detach_from_owner(id);
        let removed = self.hierarchy.destroy(id);
        debug!(node = ?id, removed, "Destroyed data node");
        removed
    }

    pub(crate) fn code(&self, id: NodeId, code: u32) -> ErrorCode {
        let type_name = self
            .node(id)
            .map(|n| n.type_name.clone())
            .unwrap_or_else(|_| ROOT_TYPE.to_string());
        self.registry.error_code(&type_name, code)
    }

    pub(crate) fn path_or_name(&self, id: NodeId) -> String {
        self.object_path(id)
            .unwrap_or_else(|_| format!("{id:?}"))
    }

    pub(crate) fn not_found(&self, id: NodeId, name: &str, code: u32) -> DataError {
        DataError::NotFound {
            path: self.path_or_name(id),
            name: name.to_string(),
            code: self.code(id, code),
        }
    }

    pub(crate) fn type_mismatch(&self, id: NodeId, value: String, code: u32) -> DataError {
        DataError::TypeMismatch {
            path: self.path_or_name(id),
            value,
            code: self.code(id, code),
        }
    }

    pub(crate) fn structural(&self, id: NodeId, details: String, code: u32) -> DataError {
        DataError::Structural {
            path: self.path_or_name(id),
            details,
            code: self.code(id, code),
        }
    }

    pub(crate) fn violation(&self, id: NodeId, details: String, code: u32) -> DataError {
        DataError::ConstraintViolation {
            path: self.path_or_name(id),
            details,
            code: self.code(id, code),
        }
    }

    /// Builds a detached node of `type_name`, applying the field-level
    /// qualifier overrides and default of `field` when given.
    pub(crate) fn instantiate(
        &mut self,
        type_name: &str,
        name: &str,
        field: Option<&FieldDecl>,
    ) -> Result<NodeId, DataError> {
        let Some(kind) = self.registry.kind(type_name) else {
            return Err(DataError::NotFound {
                path: name.to_string(),
                name: type_name.to_string(),
                code: self.registry.error_code(CONTAINER_TYPE, 103),
            });
        };
        let mut qualifiers: Qualifiers = self.registry.qualifiers(type_name);
        if let Some(decl) = field {
            for (key, value) in &decl.qualifiers {
                qualifiers.insert(key.clone(), value.clone());
            }
        }
        let mut node = DataNode::new(type_name, kind, self.registry.is_open(type_name), qualifiers);
        if kind == NodeKind::List {
            node.item_type = self.registry.item_type(type_name);
        }
        let default: Option<Literal> = field
            .and_then(|f| f.default.clone())
            .or_else(|| node.qualifiers.get("default").cloned());
        if let (Some(default), false) = (default, kind.has_slots()) {
            node.defaults.insert(VALUE_FIELD.to_string(), default);
        }

        let id = self.hierarchy.insert(name, node);
        self.hierarchy.advance(id, LifecycleState::Initialized);
        trace!(node = ?id, type_name, name, "Instantiated data node");
        Ok(id)
    }

    /// Declared fields of the node's type.
    pub(crate) fn declared_fields(&self, id: NodeId) -> Result<IndexMap<String, FieldDecl>, DataError> {
        Ok(self.registry.fields(self.type_name(id)?))
    }

    /// Makes `child` the occupant of slot `name` on `parent`.
    ///
    /// The child is first detached from any previous owner, renamed to the
    /// slot name, and any different node already in the slot is destroyed.
    pub(crate) fn attach(&mut self, parent: NodeId, name: &str, child: NodeId) -> Result<(), DataError> {
        self.node(parent)?;
        self.node(child)?;
        if self.node(parent)?.slot(name) == Some(child) {
            return Ok(());
        }
        self.detach_from_owner(child);
        if !self.hierarchy.set_parent(child, Some(parent)) {
            return Err(self.structural(
                parent,
                format!("cannot attach '{name}' here"),
                119,
            ));
        }
        let previous = self.node(parent)?.slot(name);
        if let Some(previous) = previous {
            self.hierarchy.set_parent(previous, None);
            self.hierarchy.destroy(previous);
        }
        self.hierarchy.rename(child, name);
        let parent_node = self.node_mut(parent)?;
        parent_node.slots.insert(name.to_string(), child);
        if let NodeBody::Container(order) = &mut parent_node.body {
            if !order.iter().any(|n| n == name) {
                order.push(name.to_string());
            }
        }
        if self.kind(child)? == NodeKind::List {
            self.relabel_list(child)?;
        }
        Ok(())
    }

    /// Removes `child` from whatever slot, list or content order holds it
    /// and clears its parent edge. The node itself stays alive.
    pub(crate) fn detach_from_owner(&mut self, child: NodeId) {
        let Some(owner) = self.parent(child) else {
            return;
        };
        let mut relabel = false;
        if let Ok(node) = self.node_mut(owner) {
            let names: Vec<String> = node
                .slots
                .iter()
                .filter(|(_, id)| **id == child)
                .map(|(name, _)| name.clone())
                .collect();
            for name in &names {
                node.slots.shift_remove(name);
            }
            match &mut node.body {
                NodeBody::Container(order) => order.retain(|n| !names.contains(n)),
                NodeBody::List(items) => {
                    let before = items.len();
                    items.retain(|id| *id != child);
                    relabel = items.len() != before;
                }
                _ => {}
            }
        }
        self.hierarchy.set_parent(child, None);
        if relabel {
            if let Err(e) = self.relabel_list(owner) {
                warn!(list = ?owner, error = %e, "Failed to relabel list items");
            }
        }
    }

    /// Marks a node's own value state and mirrors it into the owner's ledger
    /// under the node's slot name.
    pub(crate) fn mark_self(&mut self, id: NodeId, state: ValueState) -> Result<(), DataError> {
        let node = self.node_mut(id)?;
        match state {
            ValueState::ExplicitlySet => node.states.mark_explicit(VALUE_FIELD),
            ValueState::Default => node.states.mark_default(VALUE_FIELD),
            ValueState::NotSet => node.states.reset(VALUE_FIELD),
        }
        if state != ValueState::NotSet {
            self.hierarchy.advance(id, LifecycleState::Active);
        }
        if let Some(owner) = self.parent(id) {
            let owner_node = self.node_mut(owner)?;
            if let Some(field) = owner_node.slot_name_of(id).map(str::to_string) {
                match state {
                    ValueState::ExplicitlySet => owner_node.states.mark_explicit(&field),
                    ValueState::Default => owner_node.states.mark_default(&field),
                    ValueState::NotSet => owner_node.states.reset(&field),
                }
            }
        }
        Ok(())
    }

    /// Re-derives `{list}[{index}]` names for every item of a list.
    pub(crate) fn relabel_list(&mut self, list: NodeId) -> Result<(), DataError> {
        let base = self.name(list)?.to_string();
        let items = self.node(list)?.list_items().to_vec();
        for (index, item) in items.into_iter().enumerate() {
            self.hierarchy.rename(item, indexed_name(&base, index));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::core::metadata::builder::TypeMetadataBuilder;

    /// A registry with a small job-like schema used across the tree tests.
    pub fn registry() -> Arc<MetadataRegistry> {
        let mut registry = MetadataRegistry::with_builtins();
        let types = [
            TypeMetadataBuilder::new("CCycles")
                .parent("CInt")
                .qualifier("min", 0)
                .qualifier("max", 10)
                .build(),
            TypeMetadataBuilder::new("CMode")
                .parent("CString")
                .qualifier("enumerators", vec!["fast", "slow"])
                .qualifier("onlyEnumerators", true)
                .build(),
            TypeMetadataBuilder::new("CCell")
                .parent("CData")
                .open(false)
                .field("a", "CFloat")
                .field("b", "CFloat")
                .build(),
            TypeMetadataBuilder::new("CCellList")
                .parent("CList")
                .item_type("CCell")
                .build(),
            TypeMetadataBuilder::new("CNumberList")
                .parent("CList")
                .item_type("CInt")
                .qualifier("listMaxLength", 3)
                .build(),
            TypeMetadataBuilder::new("CControl")
                .parent("CContainer")
                .field_with_default("NCYCLES", "CCycles", 5)
                .field("MODE", "CMode")
                .field("TITLE", "CString")
                .field("WEIGHT", "CFloat")
                .field("USE_TLS", "CBoolean")
                .field("CELLS", "CCellList")
                .field("XYZIN", "CDataFile")
                .build(),
            TypeMetadataBuilder::new("CJob")
                .parent("CContainer")
                .field("controlParameters", "CControl")
                .build(),
        ];
        for meta in types {
            registry.register(meta.expect("test type declarations are complete")).expect("test types register");
        }
        Arc::new(registry)
    }

    pub fn tree() -> DataTree {
        DataTree::with_registry(registry())
    }
}
