use super::DataTree;
use super::node::NodeBody;
use crate::core::error::DataError;
use crate::core::hierarchy::arena::LifecycleState;
use crate::core::hierarchy::ids::NodeId;
use crate::core::metadata::builtins::is_reserved_name;
use crate::core::metadata::kind::NodeKind;
use crate::core::state::ValueState;
use crate::core::value::Value;
use tracing::trace;

impl DataTree {
    /// Copies the content of `source` into `target`, leaving `source` intact.
    ///
    /// Scalars copy their payload, lists are rebuilt from copies of the
    /// source items, and structured nodes merge field by field: matching
    /// structured fields recurse, matching leaves copy their payload, and
    /// fields of a different kind or missing from `target` receive a copy of
    /// the source field. An unset `source` leaves `target` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::TypeMismatch`] (code 5) when the two nodes have
    /// incompatible kinds, and [`DataError::NotFound`] when a closed target
    /// lacks a field the source sets.
    pub fn merge_into(&mut self, target: NodeId, source: NodeId) -> Result<(), DataError> {
        if target == source || !self.is_set(source, None, false, true, true)? {
            return Ok(());
        }
        let (target_kind, source_kind) = (self.kind(target)?, self.kind(source)?);
        trace!(target = ?target, source = ?source, "Merging node");
        match (target_kind, source_kind) {
            (NodeKind::Scalar(_), NodeKind::Scalar(_)) => {
                let Some(payload) = self.value(source)?.cloned() else {
                    return Ok(());
                };
                self.set_value(target, Value::from(payload))?;
            }
            (NodeKind::List, NodeKind::List) => {
                let items = self.node(source)?.list_items().to_vec();
                self.clear_list(target)?;
                for item in items {
                    let copy = self.deep_clone(item)?;
                    if let Err(e) = self.append(target, copy) {
                        self.destroy(copy);
                        return Err(e);
                    }
                }
            }
            (t, s) if t.has_slots() && s.has_slots() => self.merge_fields(target, source)?,
            _ => {
                let details = format!("{} into {}", self.type_name(source)?, self.type_name(target)?);
                return Err(self.type_mismatch(target, details, 5));
            }
        }
        self.mark_self(target, ValueState::ExplicitlySet)
    }

    fn merge_fields(&mut self, target: NodeId, source: NodeId) -> Result<(), DataError> {
        let mut fields = Vec::new();
        for (name, child) in &self.node(source)?.slots {
            if !is_reserved_name(name) && self.is_set(*child, None, false, true, true)? {
                fields.push((name.clone(), *child));
            }
        }
        for (name, incoming) in fields {
            let existing = match self.attribute(target, &name) {
                Some(existing) => Some(existing),
                None if self.registry.field(self.type_name(target)?, &name).is_some() => {
                    Some(self.get_attribute(target, &name)?)
                }
                None => None,
            };
            match existing {
                Some(existing) if Self::mergeable(self.kind(existing)?, self.kind(incoming)?) => {
                    self.merge_into(existing, incoming)?;
                }
                Some(_) => {
                    let copy = self.deep_clone(incoming)?;
                    self.attach(target, &name, copy)?;
                    self.mark_self(copy, ValueState::ExplicitlySet)?;
                }
                None => {
                    let (kind, open) = {
                        let node = self.node(target)?;
                        (node.kind, node.open)
                    };
                    let copy = match kind {
                        NodeKind::Container => {
                            let copy = self.deep_clone(incoming)?;
                            self.add_object(target, copy, Some(&name))?
                        }
                        _ if open => {
                            let copy = self.deep_clone(incoming)?;
                            self.attach(target, &name, copy)?;
                            copy
                        }
                        _ => return Err(self.not_found(target, &name, 8)),
                    };
                    self.mark_self(copy, ValueState::ExplicitlySet)?;
                }
            }
        }
        Ok(())
    }

    fn mergeable(existing: NodeKind, incoming: NodeKind) -> bool {
        match (existing, incoming) {
            (NodeKind::Scalar(_), NodeKind::Scalar(_)) | (NodeKind::List, NodeKind::List) => true,
            (a, b) => a.has_slots() && b.has_slots(),
        }
    }

    /// A detached copy of `id` and its whole subtree, carrying payloads,
    /// qualifiers and value states.
    pub fn deep_clone(&mut self, id: NodeId) -> Result<NodeId, DataError> {
        let mut payload = self.node(id)?.clone();
        let name = self.name(id)?.to_string();
        let slots: Vec<(String, NodeId)> = payload.slots.drain(..).collect();
        let items = match &mut payload.body {
            NodeBody::List(items) => std::mem::take(items),
            _ => Vec::new(),
        };
        let active = self.lifecycle(id) == LifecycleState::Active;

        let copy = self.hierarchy.insert(name, payload);
        self.hierarchy.advance(copy, LifecycleState::Initialized);
        if active {
            self.hierarchy.advance(copy, LifecycleState::Active);
        }
        for (slot, child) in slots {
            let child_copy = self.deep_clone(child)?;
            self.attach(copy, &slot, child_copy)?;
        }
        for item in items {
            let item_copy = self.deep_clone(item)?;
            self.attach_item(copy, usize::MAX, item_copy)?;
        }
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::tree;
    use super::*;
    use crate::core::value::Scalar;

    #[test]
    fn merging_an_unset_node_changes_nothing() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "NCYCLES", 3).unwrap();
        let blank = tree.create("CCycles", "blank").unwrap();

        tree.assign(control, "NCYCLES", blank).unwrap();
        let cycles = tree.attribute(control, "NCYCLES").unwrap();
        assert_eq!(tree.value(cycles).unwrap(), Some(&Scalar::Int(3)));
        assert_eq!(tree.get_value_state(control, Some("NCYCLES")).unwrap(), ValueState::ExplicitlySet);
        assert!(tree.is_alive(blank));
    }

    #[test]
    fn merging_a_set_scalar_copies_the_payload() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        let cycles = tree.get_attribute(control, "NCYCLES").unwrap();
        let incoming = tree.create("CInt", "n").unwrap();
        tree.set_value(incoming, 9).unwrap();

        tree.assign(control, "NCYCLES", incoming).unwrap();
        assert_eq!(tree.attribute(control, "NCYCLES"), Some(cycles));
        assert_eq!(tree.value(cycles).unwrap(), Some(&Scalar::Int(9)));
        assert_eq!(tree.parent(incoming), None);
    }

    #[test]
    fn containers_merge_field_by_field() {
        let mut tree = tree();
        let target = tree.create("CControl", "target").unwrap();
        tree.update(target, Value::map([("TITLE", Value::from("keep")), ("NCYCLES", Value::from(2))]))
            .unwrap();
        let source = tree.create("CControl", "source").unwrap();
        tree.update(source, Value::map([("NCYCLES", Value::from(8)), ("WEIGHT", Value::from(0.1))]))
            .unwrap();

        tree.merge_into(target, source).unwrap();
        assert_eq!(
            tree.get(target).unwrap(),
            Value::map([
                ("TITLE", Value::from("keep")),
                ("NCYCLES", Value::from(8)),
                ("WEIGHT", Value::from(0.1)),
            ])
        );
        let source_weight = tree.attribute(source, "WEIGHT").unwrap();
        assert_eq!(tree.parent(source_weight), Some(source));
    }

    #[test]
    fn lists_are_rebuilt_from_copies() {
        let mut tree = tree();
        let a = tree.create("CNumberList", "a").unwrap();
        let b = tree.create("CNumberList", "b").unwrap();
        tree.fill_list(a, vec![1.into(), 2.into()]).unwrap();
        tree.fill_list(b, vec![7.into()]).unwrap();

        tree.merge_into(a, b).unwrap();
        assert_eq!(tree.get(a).unwrap(), Value::List(vec![7.into()]));
        let copied = tree.node(a).unwrap().list_items()[0];
        assert_ne!(copied, tree.node(b).unwrap().list_items()[0]);
        assert_eq!(tree.name(copied).unwrap(), "a[0]");
    }

    #[test]
    fn incompatible_kinds_are_rejected() {
        let mut tree = tree();
        let n = tree.create("CInt", "n").unwrap();
        let control = tree.create("CControl", "c").unwrap();
        tree.assign(control, "TITLE", "x").unwrap();
        let err = tree.merge_into(n, control).unwrap_err();
        assert_eq!(err.code().map(|c| c.code), Some(5));
    }

    #[test]
    fn deep_clone_copies_subtree_and_states() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "TITLE", "t").unwrap();
        let copy = tree.deep_clone(control).unwrap();

        assert_ne!(copy, control);
        assert_eq!(tree.parent(copy), None);
        assert_eq!(tree.get(copy).unwrap(), tree.get(control).unwrap());
        assert_eq!(tree.get_value_state(copy, Some("TITLE")).unwrap(), ValueState::ExplicitlySet);
        assert_eq!(tree.data_order(copy).unwrap(), vec!["TITLE".to_string()]);
    }
}
