use super::DataTree;
use super::node::{NodeBody, VALUE_FIELD};
use crate::core::error::DataError;
use crate::core::hierarchy::ids::NodeId;
use crate::core::metadata::builtins::{is_reserved_name, scalar_type_name};
use crate::core::metadata::kind::NodeKind;
use crate::core::metadata::literal::Literal;
use crate::core::state::ValueState;
use crate::core::value::{Scalar, Value};
use tracing::trace;

impl DataTree {
    fn is_leaf_field(field: Option<&str>) -> bool {
        matches!(field, None | Some(VALUE_FIELD))
    }

    fn allows_undefined(&self, id: NodeId) -> Result<bool, DataError> {
        Ok(self
            .node(id)?
            .qualifiers
            .get("allowUndefined")
            .and_then(Literal::as_bool)
            .unwrap_or(false))
    }

    /// Whether a field, or the node itself when `field` is `None`, holds a
    /// value.
    ///
    /// Leaves are set when explicitly assigned, or holding a default with
    /// `allow_default`, or undefined with `allow_undefined` and the node's
    /// `allowUndefined` qualifier both true. Slot-bearing nodes are set when
    /// any tracked field or any descendant is set. `all_set` is accepted for
    /// compatibility and currently has no effect.
    pub fn is_set(
        &self,
        id: NodeId,
        field: Option<&str>,
        allow_undefined: bool,
        allow_default: bool,
        all_set: bool,
    ) -> Result<bool, DataError> {
        let _ = all_set;
        let node = self.node(id)?;
        match (node.kind, field) {
            (NodeKind::Scalar(_), f) if Self::is_leaf_field(f) => {
                Ok(match node.states.get(VALUE_FIELD) {
                    ValueState::ExplicitlySet => true,
                    ValueState::Default => allow_default,
                    ValueState::NotSet => {
                        node.scalar().is_none() && allow_undefined && self.allows_undefined(id)?
                    }
                })
            }
            (NodeKind::List, f) if Self::is_leaf_field(f) => {
                if node.states.any_set(allow_default) {
                    return Ok(true);
                }
                for item in node.list_items() {
                    if self.is_set(*item, None, false, allow_default, all_set)? {
                        return Ok(true);
                    }
                }
                Ok(allow_undefined && node.list_items().is_empty() && self.allows_undefined(id)?)
            }
            (NodeKind::Scalar(_) | NodeKind::List, Some(other)) => Err(self.not_found(id, other, 8)),
            (_, Some(f)) => match node.slot(f) {
                Some(child) => {
                    let tracked = node.states.get(f);
                    Ok(tracked == ValueState::ExplicitlySet
                        || (tracked == ValueState::Default && allow_default)
                        || self.is_set(child, None, allow_undefined, allow_default, all_set)?)
                }
                None => Ok(match node.states.get(f) {
                    ValueState::ExplicitlySet => true,
                    ValueState::Default => allow_default,
                    ValueState::NotSet => allow_undefined && self.field_allows_undefined(id, f)?,
                }),
            },
            (_, None) => {
                if node.states.any_set(allow_default) {
                    return Ok(true);
                }
                for (name, child) in &node.slots {
                    if is_reserved_name(name) {
                        continue;
                    }
                    if self.is_set(*child, None, false, allow_default, all_set)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn field_allows_undefined(&self, id: NodeId, field: &str) -> Result<bool, DataError> {
        let Some(decl) = self.registry.field(self.type_name(id)?, field) else {
            return Ok(false);
        };
        let mut qualifiers = self.registry.qualifiers(&decl.type_name);
        qualifiers.extend(decl.qualifiers);
        Ok(qualifiers
            .get("allowUndefined")
            .and_then(Literal::as_bool)
            .unwrap_or(false))
    }

    /// The provenance of a field, or of the node's own value.
    pub fn get_value_state(&self, id: NodeId, field: Option<&str>) -> Result<ValueState, DataError> {
        let node = self.node(id)?;
        if !node.kind.has_slots() {
            return match field {
                f if Self::is_leaf_field(f) => Ok(node.states.get(VALUE_FIELD)),
                Some(other) => Err(self.not_found(id, other, 8)),
                None => Ok(ValueState::NotSet),
            };
        }
        let (tracked, child) = match field {
            Some(f) => (node.states.get(f), node.slot(f)),
            None => (node.states.get(VALUE_FIELD), None),
        };
        if let Some(child) = child {
            if !self.node(child)?.kind.has_slots() {
                return self.get_value_state(child, None);
            }
        }
        if tracked != ValueState::NotSet {
            return Ok(tracked);
        }
        let subject = child.unwrap_or(id);
        if field.is_some() && child.is_none() {
            return Ok(ValueState::NotSet);
        }
        Ok(if self.is_set(subject, None, false, false, true)? {
            ValueState::ExplicitlySet
        } else if self.is_set(subject, None, false, true, true)? {
            ValueState::Default
        } else {
            ValueState::NotSet
        })
    }

    /// Returns a field, or the node itself, to `NotSet`.
    ///
    /// A field holding a child node has that node destroyed. Unsetting a
    /// slot-bearing node itself resets every child in place, keeping the
    /// structure.
    pub fn unset(&mut self, id: NodeId, field: Option<&str>) -> Result<(), DataError> {
        let kind = self.kind(id)?;
        match (kind, field) {
            (NodeKind::Scalar(_), f) if Self::is_leaf_field(f) => {
                if let NodeBody::Scalar(slot) = &mut self.node_mut(id)?.body {
                    *slot = None;
                }
                self.mark_self(id, ValueState::NotSet)
            }
            (NodeKind::List, f) if Self::is_leaf_field(f) => {
                self.clear_list(id)?;
                self.node_mut(id)?.states.clear();
                self.mark_self(id, ValueState::NotSet)
            }
            (NodeKind::Scalar(_) | NodeKind::List, Some(other)) => Err(self.not_found(id, other, 8)),
            (_, Some(f)) => {
                let existing = self.node(id)?.slot(f);
                if let Some(child) = existing {
                    self.destroy(child);
                }
                let node = self.node_mut(id)?;
                node.reserved.shift_remove(f);
                node.states.reset(f);
                trace!(node = ?id, field = f, "Unset field");
                Ok(())
            }
            (_, None) => {
                let children: Vec<NodeId> = self
                    .node(id)?
                    .slots
                    .iter()
                    .filter(|(name, _)| !is_reserved_name(name))
                    .map(|(_, child)| *child)
                    .collect();
                for child in children {
                    self.unset(child, None)?;
                }
                self.node_mut(id)?.states.clear();
                self.mark_self(id, ValueState::NotSet)
            }
        }
    }

    /// The default recorded for a field, or for the node's own value.
    pub fn default_value(&self, id: NodeId, field: Option<&str>) -> Result<Option<Literal>, DataError> {
        let node = self.node(id)?;
        let key = field.unwrap_or(VALUE_FIELD);
        if let Some(default) = node.defaults.get(key) {
            return Ok(Some(default.clone()));
        }
        if !node.kind.has_slots() {
            return Ok(None);
        }
        if let Some(child) = node.slot(key) {
            if let Some(default) = self.node(child)?.defaults.get(VALUE_FIELD) {
                return Ok(Some(default.clone()));
            }
        }
        Ok(self
            .registry
            .field(&node.type_name, key)
            .and_then(|decl| decl.default))
    }

    /// Records an instance-level default for a leaf node and applies it.
    pub fn set_default(&mut self, id: NodeId, value: impl Into<Literal>) -> Result<(), DataError> {
        if self.kind(id)?.has_slots() {
            return Err(self.type_mismatch(id, "default for a structured node".to_string(), 5));
        }
        let value = value.into();
        self.node_mut(id)?
            .defaults
            .insert(VALUE_FIELD.to_string(), value.clone());
        self.apply_default(id, &value)
    }

    /// Records an instance-level default for a field of a structured node
    /// without applying it.
    pub fn set_field_default(&mut self, id: NodeId, field: &str, value: impl Into<Literal>) -> Result<(), DataError> {
        if !self.kind(id)?.has_slots() {
            return Err(self.not_found(id, field, 8));
        }
        self.node_mut(id)?
            .defaults
            .insert(field.to_string(), value.into());
        Ok(())
    }

    /// Applies the default of a field, or of the node itself, marking it
    /// `Default`. Without a default this behaves like [`DataTree::unset`].
    pub fn set_to_default(&mut self, id: NodeId, field: Option<&str>) -> Result<(), DataError> {
        let kind = self.kind(id)?;
        if !kind.has_slots() {
            if !Self::is_leaf_field(field) {
                return Err(self.not_found(id, field.unwrap_or_default(), 8));
            }
            return match self.default_value(id, None)? {
                Some(default) => self.apply_default(id, &default),
                None => self.unset(id, None),
            };
        }
        let Some(f) = field else {
            return self.apply_defaults(id);
        };
        let Some(default) = self.default_value(id, Some(f))? else {
            return self.unset(id, Some(f));
        };
        let existing = self.node(id)?.slot(f);
        let child = match existing {
            Some(child) => child,
            None if self.registry.field(self.type_name(id)?, f).is_some() => self.get_attribute(id, f)?,
            None => {
                let Some(kind) = Value::from(default.clone()).scalar_kind() else {
                    return Err(self.type_mismatch(id, default.to_string(), 6));
                };
                let child = self.instantiate(scalar_type_name(kind), f, None)?;
                self.attach(id, f, child)?;
                child
            }
        };
        self.apply_default(child, &default)
    }

    /// Applies every declared or recorded default whose field is still
    /// `NotSet`, descending into realised structured children.
    pub fn apply_defaults(&mut self, id: NodeId) -> Result<(), DataError> {
        if !self.kind(id)?.has_slots() {
            if self.get_value_state(id, None)? == ValueState::NotSet
                && self.default_value(id, None)?.is_some()
            {
                return self.set_to_default(id, None);
            }
            return Ok(());
        }
        let mut names: Vec<String> = self.declared_fields(id)?.into_keys().collect();
        for name in self.node(id)?.defaults.keys().chain(self.node(id)?.slots.keys()) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        for name in names {
            if is_reserved_name(&name) {
                continue;
            }
            let has_default = self.default_value(id, Some(&name))?.is_some();
            let existing = self.node(id)?.slot(&name);
            if has_default && self.get_value_state(id, Some(&name))? == ValueState::NotSet {
                self.set_to_default(id, Some(&name))?;
            } else if let Some(child) = existing {
                if self.kind(child)?.has_slots() {
                    self.apply_defaults(child)?;
                }
            }
        }
        Ok(())
    }

    fn apply_default(&mut self, id: NodeId, default: &Literal) -> Result<(), DataError> {
        match self.kind(id)? {
            NodeKind::Scalar(kind) => {
                let scalar = Scalar::from_literal(kind, default)
                    .ok_or_else(|| self.type_mismatch(id, default.to_string(), 6))?;
                self.store_scalar(id, scalar)?;
            }
            NodeKind::List => {
                let Value::List(items) = Value::from(default.clone()) else {
                    return Err(self.type_mismatch(id, default.to_string(), 6));
                };
                self.with_validation_suspended(id, |tree| tree.fill_list(id, items))?;
            }
            _ => return Err(self.type_mismatch(id, default.to_string(), 6)),
        }
        self.mark_self(id, ValueState::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::tree;
    use super::*;

    #[test]
    fn unset_always_returns_to_not_set() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "TITLE", "Refine").unwrap();
        assert_eq!(
            tree.get_value_state(control, Some("TITLE")).unwrap(),
            ValueState::ExplicitlySet
        );

        tree.unset(control, Some("TITLE")).unwrap();
        assert_eq!(tree.get_value_state(control, Some("TITLE")).unwrap(), ValueState::NotSet);
        assert!(!tree.is_set(control, Some("TITLE"), false, false, true).unwrap());
        assert_eq!(tree.attribute(control, "TITLE"), None);
    }

    #[test]
    fn set_to_default_uses_declared_default() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.set_to_default(control, Some("NCYCLES")).unwrap();

        let cycles = tree.attribute(control, "NCYCLES").unwrap();
        assert_eq!(tree.value(cycles).unwrap(), Some(&Scalar::Int(5)));
        assert_eq!(tree.get_value_state(control, Some("NCYCLES")).unwrap(), ValueState::Default);
        assert!(!tree.is_set(control, Some("NCYCLES"), false, false, true).unwrap());
        assert!(tree.is_set(control, Some("NCYCLES"), false, true, true).unwrap());
    }

    #[test]
    fn set_to_default_without_default_behaves_like_unset() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "WEIGHT", 0.5).unwrap();
        tree.set_to_default(control, Some("WEIGHT")).unwrap();
        assert_eq!(tree.get_value_state(control, Some("WEIGHT")).unwrap(), ValueState::NotSet);
    }

    #[test]
    fn set_default_marks_leaf_as_default() {
        let mut tree = tree();
        let weight = tree.create("CFloat", "WEIGHT").unwrap();
        tree.set_default(weight, 1.5).unwrap();
        assert_eq!(tree.get_value_state(weight, None).unwrap(), ValueState::Default);
        assert_eq!(tree.default_value(weight, None).unwrap(), Some(Literal::Float(1.5)));

        tree.set_value(weight, 2.0).unwrap();
        assert_eq!(tree.get_value_state(weight, None).unwrap(), ValueState::ExplicitlySet);
        tree.set_to_default(weight, None).unwrap();
        assert_eq!(tree.value(weight).unwrap(), Some(&Scalar::Float(1.5)));
    }

    #[test]
    fn field_level_default_override_applies_to_open_nodes() {
        let mut tree = tree();
        let generic = tree.create("CData", "extra").unwrap();
        tree.set_field_default(generic, "threshold", 0.75).unwrap();
        tree.set_to_default(generic, Some("threshold")).unwrap();

        let child = tree.attribute(generic, "threshold").unwrap();
        assert_eq!(tree.value(child).unwrap(), Some(&Scalar::Float(0.75)));
        assert_eq!(tree.type_name(child).unwrap(), "CFloat");
    }

    #[test]
    fn apply_defaults_only_fills_unset_fields() {
        let mut tree = tree();
        let job = tree.create("CJob", "job").unwrap();
        let control = tree.get_attribute(job, "controlParameters").unwrap();
        tree.apply_defaults(job).unwrap();
        let cycles = tree.attribute(control, "NCYCLES").unwrap();
        assert_eq!(tree.value(cycles).unwrap(), Some(&Scalar::Int(5)));

        tree.set_value(cycles, 7).unwrap();
        tree.apply_defaults(job).unwrap();
        assert_eq!(tree.value(cycles).unwrap(), Some(&Scalar::Int(7)));
    }

    #[test]
    fn composite_is_set_when_any_descendant_is_set() {
        let mut tree = tree();
        let job = tree.create("CJob", "job").unwrap();
        let control = tree.get_attribute(job, "controlParameters").unwrap();
        assert!(!tree.is_set(job, None, false, false, true).unwrap());

        let title = tree.get_attribute(control, "TITLE").unwrap();
        tree.set_value(title, "x").unwrap();
        assert!(tree.is_set(job, None, false, false, true).unwrap());
        assert!(tree.is_set(job, None, false, false, false).unwrap());
    }

    #[test]
    fn allow_undefined_honours_qualifier() {
        let mut tree = tree();
        let file = tree.create("CDataFile", "XYZIN").unwrap();
        assert!(tree.is_set(file, Some("baseName"), true, false, true).is_ok());
        let name = tree.create("CString", "name").unwrap();
        tree.set_qualifier(name, "allowUndefined", Some(Literal::Bool(false))).unwrap();
        assert!(!tree.is_set(name, None, true, false, true).unwrap());
        tree.set_qualifier(name, "allowUndefined", Some(Literal::Bool(true))).unwrap();
        assert!(tree.is_set(name, None, true, false, true).unwrap());
        assert!(!tree.is_set(name, None, false, false, true).unwrap());
    }

    #[test]
    fn unsetting_a_structured_node_keeps_its_children() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "TITLE", "t").unwrap();
        tree.assign(control, "NCYCLES", 3).unwrap();
        tree.unset(control, None).unwrap();

        let title = tree.attribute(control, "TITLE").unwrap();
        assert_eq!(tree.value(title).unwrap(), None);
        assert!(!tree.is_set(control, None, false, true, true).unwrap());
    }

    #[test]
    fn leaf_nodes_reject_named_fields() {
        let mut tree = tree();
        let n = tree.create("CInt", "n").unwrap();
        assert!(matches!(
            tree.is_set(n, Some("other"), false, false, true),
            Err(DataError::NotFound { .. })
        ));
        assert!(tree.unset(n, Some("value")).is_ok());
    }
}
