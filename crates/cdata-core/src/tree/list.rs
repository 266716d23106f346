use super::DataTree;
use super::node::NodeBody;
use crate::core::error::DataError;
use crate::core::hierarchy::ids::NodeId;
use crate::core::hierarchy::path::indexed_name;
use crate::core::metadata::builtins::STRING_TYPE;
use crate::core::metadata::kind::NodeKind;
use crate::core::metadata::literal::Literal;
use crate::core::state::ValueState;
use crate::core::value::Value;
use tracing::trace;

impl DataTree {
    fn ensure_list(&self, id: NodeId) -> Result<(), DataError> {
        match self.kind(id)? {
            NodeKind::List => Ok(()),
            other => Err(self.type_mismatch(id, format!("list operation on {other} node"), 5)),
        }
    }

    fn list_bound(&self, id: NodeId, key: &str) -> Result<Option<usize>, DataError> {
        let node = self.node(id)?;
        if node.skip_validation {
            return Ok(None);
        }
        Ok(node
            .qualifiers
            .get(key)
            .and_then(Literal::as_i64)
            .map(|n| n.max(0) as usize))
    }

    fn check_growth(&self, list: NodeId, new_len: usize) -> Result<(), DataError> {
        match self.list_bound(list, "listMaxLength")? {
            Some(max) if new_len > max => Err(self.violation(
                list,
                format!("{new_len} items exceeds maximum length {max}"),
                108,
            )),
            _ => Ok(()),
        }
    }

    fn check_shrink(&self, list: NodeId, new_len: usize) -> Result<(), DataError> {
        match self.list_bound(list, "listMinLength")? {
            Some(min) if new_len < min => Err(self.violation(
                list,
                format!("{new_len} items is below minimum length {min}"),
                107,
            )),
            _ => Ok(()),
        }
    }

    /// Turns `value` into a detached item node of the list's item type.
    fn make_item(&mut self, list: NodeId, value: Value) -> Result<NodeId, DataError> {
        let item_type = self
            .node(list)?
            .item_type
            .clone()
            .unwrap_or_else(|| STRING_TYPE.to_string());
        if let Value::Node(node) = value {
            let node_type = self.type_name(node)?;
            if !self.registry.is_subtype(node_type, &item_type) {
                return Err(self.type_mismatch(list, format!("{node_type} item, expected {item_type}"), 104));
            }
            return Ok(node);
        }
        let len = self.node(list)?.list_items().len();
        let name = indexed_name(self.name(list)?, len);
        let item = self.instantiate(&item_type, &name, None)?;
        let filled = if self.kind(item)?.has_slots() {
            self.update(item, value)
        } else {
            self.set_value(item, value)
        };
        if let Err(e) = filled {
            self.destroy(item);
            return Err(e);
        }
        Ok(item)
    }

    /// Places an existing node into the list at `index` (clamped to the
    /// length) without bound checks, then re-derives item names.
    pub(crate) fn attach_item(&mut self, list: NodeId, index: usize, item: NodeId) -> Result<(), DataError> {
        self.detach_from_owner(item);
        if !self.hierarchy.set_parent(item, Some(list)) {
            return Err(self.structural(list, "cannot adopt list item".to_string(), 119));
        }
        if let NodeBody::List(items) = &mut self.node_mut(list)?.body {
            let at = index.min(items.len());
            items.insert(at, item);
        }
        self.relabel_list(list)
    }

    /// Items of a list in order.
    pub fn list_items(&self, list: NodeId) -> Result<&[NodeId], DataError> {
        self.ensure_list(list)?;
        Ok(self.node(list)?.list_items())
    }

    pub fn list_len(&self, list: NodeId) -> Result<usize, DataError> {
        Ok(self.list_items(list)?.len())
    }

    /// Appends a new item built from `value`, or adopts `value` when it is a
    /// node of the item type.
    pub fn append(&mut self, list: NodeId, value: impl Into<Value>) -> Result<NodeId, DataError> {
        let len = self.list_len(list)?;
        self.insert(list, len, value)
    }

    /// Inserts an item before position `index`; indices past the end append.
    ///
    /// # Errors
    ///
    /// Fails with code 108 when the list would exceed `listMaxLength` and
    /// with code 104 when a node of the wrong type is offered.
    pub fn insert(&mut self, list: NodeId, index: usize, value: impl Into<Value>) -> Result<NodeId, DataError> {
        let len = self.list_len(list)?;
        self.check_growth(list, len + 1)?;
        let item = self.make_item(list, value.into())?;
        self.attach_item(list, index, item)?;
        self.mark_self(list, ValueState::ExplicitlySet)?;
        trace!(list = ?list, index, "Inserted list item");
        Ok(item)
    }

    /// Detaches the item at `index` and returns it. The item stays alive
    /// until the caller destroys it.
    pub fn remove(&mut self, list: NodeId, index: usize) -> Result<NodeId, DataError> {
        let items = self.list_items(list)?;
        let Some(item) = items.get(index).copied() else {
            return Err(self.not_found(list, &indexed_name(self.name(list)?, index), 8));
        };
        self.check_shrink(list, items.len() - 1)?;
        self.detach_from_owner(item);
        self.mark_self(list, ValueState::ExplicitlySet)?;
        trace!(list = ?list, index, "Removed list item");
        Ok(item)
    }

    /// Detaches `item` from the list and returns it.
    pub fn remove_node(&mut self, list: NodeId, item: NodeId) -> Result<NodeId, DataError> {
        let Some(index) = self.list_items(list)?.iter().position(|i| *i == item) else {
            return Err(self.not_found(list, &format!("{item:?}"), 8));
        };
        self.remove(list, index)
    }

    /// Detaches and returns the last item, if any.
    pub fn pop(&mut self, list: NodeId) -> Result<Option<NodeId>, DataError> {
        match self.list_len(list)? {
            0 => Ok(None),
            len => self.remove(list, len - 1).map(Some),
        }
    }

    /// Replaces the item at `index`.
    ///
    /// Nodes take the place of the old item, which is destroyed; any other
    /// value is written into the existing item.
    pub fn set_item(&mut self, list: NodeId, index: usize, value: impl Into<Value>) -> Result<NodeId, DataError> {
        let value = value.into();
        let Some(current) = self.list_items(list)?.get(index).copied() else {
            return Err(self.not_found(list, &indexed_name(self.name(list)?, index), 8));
        };
        let item = match value {
            Value::Node(_) => {
                let item = self.make_item(list, value)?;
                if item != current {
                    self.attach_item(list, index, item)?;
                    self.destroy(current);
                }
                item
            }
            other => {
                self.set(current, other)?;
                current
            }
        };
        self.mark_self(list, ValueState::ExplicitlySet)?;
        Ok(item)
    }

    /// Destroys every item. Length bounds are not checked.
    pub fn clear_list(&mut self, list: NodeId) -> Result<(), DataError> {
        self.clear_list_keeping(list, &[])
    }

    /// Empties the list, detaching the items in `keep` and destroying the rest.
    fn clear_list_keeping(&mut self, list: NodeId, keep: &[NodeId]) -> Result<(), DataError> {
        self.ensure_list(list)?;
        let items = match &mut self.node_mut(list)?.body {
            NodeBody::List(items) => std::mem::take(items),
            _ => Vec::new(),
        };
        for item in items {
            self.hierarchy.set_parent(item, None);
            if !keep.contains(&item) {
                self.hierarchy.destroy(item);
            }
        }
        Ok(())
    }

    /// Replaces the whole content of the list with items built from `values`.
    /// Node values are adopted as they are, even when already in this list.
    /// Nothing changes if any value is rejected.
    pub fn fill_list(&mut self, list: NodeId, values: Vec<Value>) -> Result<(), DataError> {
        self.ensure_list(list)?;
        self.check_growth(list, values.len())?;
        self.check_shrink(list, values.len())?;
        let mut built: Vec<(NodeId, bool)> = Vec::with_capacity(values.len());
        for value in values {
            let created = !matches!(value, Value::Node(_));
            match self.make_item(list, value) {
                Ok(item) => built.push((item, created)),
                Err(e) => {
                    for (item, created) in built {
                        if created {
                            self.destroy(item);
                        }
                    }
                    return Err(e);
                }
            }
        }
        let adopted: Vec<NodeId> = built
            .iter()
            .filter(|(_, created)| !created)
            .map(|(item, _)| *item)
            .collect();
        self.clear_list_keeping(list, &adopted)?;
        for (item, _) in built {
            self.attach_item(list, usize::MAX, item)?;
        }
        self.mark_self(list, ValueState::ExplicitlySet)
    }
}
