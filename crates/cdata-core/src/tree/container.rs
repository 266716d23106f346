use super::DataTree;
use super::node::NodeBody;
use crate::core::error::DataError;
use crate::core::hierarchy::ids::NodeId;
use crate::core::metadata::kind::NodeKind;
use crate::core::state::ValueState;
use tracing::{debug, warn};

impl DataTree {
    fn ensure_container(&self, id: NodeId) -> Result<(), DataError> {
        match self.kind(id)? {
            NodeKind::Container => Ok(()),
            other => Err(self.type_mismatch(id, format!("container operation on {other} node"), 5)),
        }
    }

    fn check_new_name(&self, container: NodeId, name: &str) -> Result<(), DataError> {
        if name.is_empty() {
            return Err(self.structural(container, "empty item name".to_string(), 114));
        }
        if self.node(container)?.slot(name).is_some() {
            return Err(self.structural(container, format!("'{name}' is already present"), 115));
        }
        Ok(())
    }

    /// Creates an item of `type_name` called `name` and appends it to the
    /// content order.
    ///
    /// # Errors
    ///
    /// Code 114 for an empty name, 115 for a duplicate and 120 for a type the
    /// registry does not know.
    pub fn add_content(&mut self, container: NodeId, type_name: &str, name: &str) -> Result<NodeId, DataError> {
        self.ensure_container(container)?;
        self.check_new_name(container, name)?;
        if !self.registry.contains(type_name) {
            return Err(self.not_found(container, type_name, 120));
        }
        let decl = self
            .registry
            .field(self.type_name(container)?, name)
            .filter(|decl| self.registry.is_subtype(type_name, &decl.type_name));
        let child = self.instantiate(type_name, name, decl.as_ref())?;
        self.attach(container, name, child)?;
        debug!(container = ?container, type_name, name, "Added container content");
        Ok(child)
    }

    /// Adopts an existing node as item `name`, or under its own name.
    pub fn add_object(&mut self, container: NodeId, node: NodeId, name: Option<&str>) -> Result<NodeId, DataError> {
        self.ensure_container(container)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => self.name(node)?.to_string(),
        };
        if self.attribute(container, &name) == Some(node) {
            return Ok(node);
        }
        self.check_new_name(container, &name)?;
        self.node(node)?;
        self.attach(container, &name, node)?;
        debug!(container = ?container, name, "Added object to container");
        Ok(node)
    }

    /// Destroys item `name` and drops it from the content order.
    pub fn delete_object(&mut self, container: NodeId, name: &str) -> Result<(), DataError> {
        self.ensure_container(container)?;
        let Some(child) = self.attribute(container, name) else {
            return Err(self.not_found(container, name, 117));
        };
        self.destroy(child);
        self.node_mut(container)?.states.reset(name);
        debug!(container = ?container, name, "Deleted container content");
        Ok(())
    }

    /// The declared fixed order if the type has one, else insertion order.
    pub fn data_order(&self, container: NodeId) -> Result<Vec<String>, DataError> {
        let node = self.node(container)?;
        Ok(self
            .registry
            .content_order(&node.type_name)
            .unwrap_or_else(|| node.item_order().to_vec()))
    }

    /// Realised items in data order.
    pub fn items(&self, container: NodeId) -> Result<Vec<(String, NodeId)>, DataError> {
        self.ensure_container(container)?;
        let node = self.node(container)?;
        let mut out: Vec<(String, NodeId)> = Vec::new();
        let order = self.data_order(container)?;
        for name in order.iter().chain(node.item_order()) {
            if out.iter().any(|(n, _)| n == name) {
                continue;
            }
            if let Some(child) = node.slot(name) {
                out.push((name.clone(), child));
            }
        }
        Ok(out)
    }

    pub fn item(&self, container: NodeId, index: usize) -> Result<Option<NodeId>, DataError> {
        Ok(self.items(container)?.get(index).map(|(_, id)| *id))
    }

    pub fn item_count(&self, container: NodeId) -> Result<usize, DataError> {
        Ok(self.items(container)?.len())
    }

    /// Deletes every item, logging and skipping any that cannot be removed.
    pub fn clear(&mut self, container: NodeId) -> Result<(), DataError> {
        self.ensure_container(container)?;
        let names = self.node(container)?.item_order().to_vec();
        for name in names {
            if let Err(e) = self.delete_object(container, &name) {
                warn!(container = ?container, name, error = %e, "Failed to delete container item");
            }
        }
        Ok(())
    }

    /// Renames item `old` to `new` in place, keeping its position and state.
    pub fn rename_object(&mut self, container: NodeId, old: &str, new: &str) -> Result<(), DataError> {
        self.ensure_container(container)?;
        if new.is_empty() {
            return Err(self.structural(container, "no new name given".to_string(), 132));
        }
        if self.attribute(container, new).is_some() {
            return Err(self.structural(container, format!("'{new}' already exists"), 133));
        }
        let Some(child) = self.attribute(container, old) else {
            return Err(self.structural(container, format!("no item called '{old}'"), 134));
        };

        let node = self.node_mut(container)?;
        if let Some(index) = node.slots.get_index_of(old) {
            node.slots.shift_remove(old);
            node.slots.shift_insert(index, new.to_string(), child);
        }
        if let NodeBody::Container(order) = &mut node.body {
            for entry in order.iter_mut() {
                if entry.as_str() == old {
                    *entry = new.to_string();
                }
            }
        }
        let state = node.states.get(old);
        node.states.reset(old);
        match state {
            ValueState::ExplicitlySet => node.states.mark_explicit(new),
            ValueState::Default => node.states.mark_default(new),
            ValueState::NotSet => {}
        }
        self.hierarchy.rename(child, new);
        if self.kind(child)? == NodeKind::List {
            self.relabel_list(child)?;
        }
        Ok(())
    }

    /// Copies items of `other` into this container through an XML round
    /// trip. Existing items are decoded in place; missing ones are created
    /// with the source item's type. `None` copies every item of `other`.
    pub fn copy_data(&mut self, container: NodeId, other: NodeId, names: Option<&[&str]>) -> Result<(), DataError> {
        self.ensure_container(container)?;
        if self.kind(other)? != NodeKind::Container {
            let details = format!("cannot copy from {}", self.type_name(other)?);
            return Err(self.structural(container, details, 138));
        }
        let names: Vec<String> = match names {
            Some(names) => names.iter().map(|n| n.to_string()).collect(),
            None => self.items(other)?.into_iter().map(|(n, _)| n).collect(),
        };
        for name in names {
            let Some(source) = self.attribute(other, &name) else {
                let code = self.code(other, 140);
                warn!(container = ?container, name, %code, "Skipping item missing from source container");
                continue;
            };
            let element = self.encode(source, Some(&name), false)?;
            let target = match self.attribute(container, &name) {
                Some(target) => target,
                None => {
                    let type_name = self.type_name(source)?.to_string();
                    self.add_content(container, &type_name, &name)?
                }
            };
            self.decode(target, &element, true)?;
        }
        Ok(())
    }
}
