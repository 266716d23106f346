use super::DataTree;
use super::node::VALUE_FIELD;
use crate::core::error::DataError;
use crate::core::hierarchy::ids::NodeId;
use crate::core::metadata::builtins::{LIST_TYPE, STRING_TYPE, is_reserved_name, scalar_type_name};
use crate::core::metadata::kind::NodeKind;
use crate::core::metadata::literal::Literal;
use crate::core::metadata::qualifier::{Qualifiers, conform_to_type};
use crate::core::metadata::registry::{FieldDecl, ROOT_TYPE};
use crate::core::state::ValueState;
use crate::core::value::{Scalar, Value};
use indexmap::IndexMap;
use tracing::trace;

/// How an assignment is carried out, decided from the kind of node already
/// in the slot and the shape of the incoming value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignCase {
    /// `Null` clears the field.
    Unset,
    /// Empty slot, mapping value: build a generic node from the mapping.
    NewFromMapping,
    /// Structured node in the slot, mapping value: update it in place.
    UpdateFromMapping,
    /// The incoming node holds nothing worth copying.
    SkipUnsetNode,
    /// Node in the slot, node value: merge the incoming node into it.
    MergeNode,
    /// File reference in the slot, string value: treat it as a path.
    SetFullPath,
    /// Scalar node in the slot, primitive value: coerce into its payload.
    CoerceScalar,
    /// List node in the slot, list value: rebuild the items.
    FillList,
    /// Anything else: store the value as a fresh attribute.
    Replace,
}

/// Picks the assignment case. `incoming_set` only matters when `value` is a
/// node and tells whether that node holds anything.
pub fn classify(slot_kind: Option<NodeKind>, value: &Value, incoming_set: bool) -> AssignCase {
    match (slot_kind, value) {
        (_, Value::Null) => AssignCase::Unset,
        (None, Value::Map(_)) => AssignCase::NewFromMapping,
        (Some(kind), Value::Map(_)) if kind.has_slots() => AssignCase::UpdateFromMapping,
        (Some(_), Value::Node(_)) if !incoming_set => AssignCase::SkipUnsetNode,
        (Some(_), Value::Node(_)) => AssignCase::MergeNode,
        (Some(NodeKind::FileRef), Value::Str(_)) => AssignCase::SetFullPath,
        (Some(NodeKind::Scalar(_)), v) if v.scalar_kind().is_some() => AssignCase::CoerceScalar,
        (Some(NodeKind::List), Value::List(_)) => AssignCase::FillList,
        _ => AssignCase::Replace,
    }
}

impl DataTree {
    /// The node held in slot `name`, without materialising declared fields.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.node(id).ok()?.slot(name)
    }

    /// The node held in slot `name`, materialising it on first access when
    /// `name` is a declared field of the node's type.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] when the field is neither realised nor
    /// declared.
    pub fn get_attribute(&mut self, id: NodeId, name: &str) -> Result<NodeId, DataError> {
        let node = self.node(id)?;
        if let Some(child) = node.slot(name) {
            return Ok(child);
        }
        if !node.kind.has_slots() {
            return Err(self.not_found(id, name, 8));
        }
        let Some(decl) = self.registry.field(&node.type_name, name) else {
            return Err(self.not_found(id, name, 8));
        };
        let child = self.instantiate(&decl.type_name, name, Some(&decl))?;
        self.attach(id, name, child)?;
        trace!(node = ?id, field = name, "Materialised declared field");
        Ok(child)
    }

    /// Materialises every declared field, recursively, including the fields
    /// of list items.
    pub fn realize_all(&mut self, id: NodeId) -> Result<(), DataError> {
        let kind = self.kind(id)?;
        if kind == NodeKind::List {
            let items = self.node(id)?.list_items().to_vec();
            for item in items {
                self.realize_all(item)?;
            }
            return Ok(());
        }
        if !kind.has_slots() {
            return Ok(());
        }
        for name in self.declared_fields(id)?.into_keys() {
            self.get_attribute(id, &name)?;
        }
        let children: Vec<NodeId> = self.node(id)?.slots.values().copied().collect();
        for child in children {
            self.realize_all(child)?;
        }
        Ok(())
    }

    /// An internal attribute stored outside state tracking.
    pub fn reserved(&self, id: NodeId, name: &str) -> Result<Option<&Value>, DataError> {
        Ok(self.node(id)?.reserved(name))
    }

    /// Assigns `value` to field `name` of `id` using smart assignment.
    ///
    /// # Arguments
    ///
    /// * `id` - The node owning the field.
    /// * `name` - The field name. `"value"` addresses a leaf node's payload.
    /// * `value` - A primitive, list, mapping, node handle or `Null`.
    ///
    /// # Errors
    ///
    /// Fails with [`DataError::NotFound`] for undeclared fields of closed
    /// types, [`DataError::TypeMismatch`] when the value cannot be coerced to a
    /// declared field, and [`DataError::ConstraintViolation`] when it breaks a
    /// qualifier. The field keeps its previous value on failure.
    pub fn assign(&mut self, id: NodeId, name: &str, value: impl Into<Value>) -> Result<(), DataError> {
        let value = value.into();
        if is_reserved_name(name) {
            self.node_mut(id)?.reserved.insert(name.to_string(), value);
            return Ok(());
        }
        let node = self.node(id)?;
        if !node.kind.has_slots() {
            if name == VALUE_FIELD {
                return self.set_value(id, value);
            }
            return Err(self.not_found(id, name, 8));
        }
        let declared = self.registry.field(&node.type_name, name);
        let mut slot = node.slot(name);
        if slot.is_none() && declared.is_none() && !node.open {
            return Err(self.not_found(id, name, 8));
        }
        if value.is_null() {
            return self.unset(id, Some(name));
        }
        if slot.is_none() && declared.is_some() {
            slot = Some(self.get_attribute(id, name)?);
        }

        let incoming_set = match value.as_node() {
            Some(source) if Some(source) == slot => return Ok(()),
            Some(source) => self.is_set(source, None, false, false, true)?,
            None => true,
        };
        let slot_kind = slot.map(|s| self.kind(s)).transpose()?;
        let case = classify(slot_kind, &value, incoming_set);
        trace!(node = ?id, field = name, ?case, "Assigning field");

        match (case, slot) {
            (AssignCase::NewFromMapping, _) => self.assign_new_mapping(id, name, value),
            (AssignCase::UpdateFromMapping, Some(target)) => {
                self.update(target, value)?;
                self.mark_self(target, ValueState::ExplicitlySet)
            }
            (AssignCase::SkipUnsetNode, _) => Ok(()),
            (AssignCase::MergeNode, Some(target)) => match value {
                Value::Node(source) => self.merge_into(target, source),
                _ => Ok(()),
            },
            (AssignCase::SetFullPath, Some(target)) => {
                if let Value::Str(path) = &value {
                    self.set_full_path(target, path)?;
                }
                self.mark_self(target, ValueState::ExplicitlySet)
            }
            (AssignCase::CoerceScalar, Some(target)) => {
                let kind = self.kind(target)?.scalar_kind();
                let coercible = kind.is_some_and(|k| Scalar::coerce(k, &value).is_some());
                if coercible || declared.is_some() {
                    self.set_value(target, value)
                } else {
                    self.replace_slot(id, name, value, None)
                }
            }
            (AssignCase::FillList, Some(target)) => match value {
                Value::List(items) => self.fill_list(target, items),
                _ => Ok(()),
            },
            (AssignCase::Unset, _) => self.unset(id, Some(name)),
            _ => self.replace_slot(id, name, value, declared.as_ref()),
        }
    }

    fn assign_new_mapping(&mut self, id: NodeId, name: &str, value: Value) -> Result<(), DataError> {
        let child = self.instantiate(ROOT_TYPE, name, None)?;
        if let Err(e) = self.update(child, value) {
            self.destroy(child);
            return Err(e);
        }
        self.attach(id, name, child)?;
        self.mark_self(child, ValueState::ExplicitlySet)
    }

    /// Stores `value` as a fresh attribute, replacing whatever the slot held.
    fn replace_slot(
        &mut self,
        id: NodeId,
        name: &str,
        value: Value,
        declared: Option<&FieldDecl>,
    ) -> Result<(), DataError> {
        if let Value::Node(incoming) = value {
            let incoming_type = self.type_name(incoming)?;
            if let Some(decl) = declared {
                if !self.registry.is_subtype(incoming_type, &decl.type_name) {
                    return Err(self.type_mismatch(id, format!("{incoming_type} for field '{name}'"), 5));
                }
            }
            self.attach(id, name, incoming)?;
            return self.mark_self(incoming, ValueState::ExplicitlySet);
        }
        if declared.is_some() {
            return Err(self.type_mismatch(id, value.describe(), 5));
        }
        if matches!(value, Value::Map(_)) {
            return self.assign_new_mapping(id, name, value);
        }
        let child = match &value {
            Value::List(items) => {
                let item_type = match items.first() {
                    Some(Value::Node(first)) => self.type_name(*first)?.to_string(),
                    Some(first) => first
                        .scalar_kind()
                        .map(scalar_type_name)
                        .unwrap_or(STRING_TYPE)
                        .to_string(),
                    None => STRING_TYPE.to_string(),
                };
                let list = self.instantiate(LIST_TYPE, name, None)?;
                self.node_mut(list)?.item_type = Some(item_type);
                list
            }
            primitive => {
                let Some(kind) = primitive.scalar_kind() else {
                    return Err(self.type_mismatch(id, primitive.describe(), 5));
                };
                self.instantiate(scalar_type_name(kind), name, None)?
            }
        };
        self.attach(id, name, child)?;
        self.set_value(child, value)
    }

    /// The node's content as a plain value: the payload of a scalar, the
    /// items of a list, or a mapping of every set field.
    pub fn get(&self, id: NodeId) -> Result<Value, DataError> {
        let node = self.node(id)?;
        match node.kind {
            NodeKind::Scalar(_) => Ok(node.scalar().cloned().map(Value::from).unwrap_or_default()),
            NodeKind::List => node
                .list_items()
                .iter()
                .map(|item| self.get(*item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            _ => {
                let mut out = IndexMap::new();
                for (name, child) in &node.slots {
                    if is_reserved_name(name) || !self.is_set(*child, None, false, true, true)? {
                        continue;
                    }
                    out.insert(name.clone(), self.get(*child)?);
                }
                Ok(Value::Map(out))
            }
        }
    }

    /// Replaces the node's content with `value`.
    ///
    /// A mapping assigns its entries and unsets every other field; a node is
    /// merged after fields it does not set are unset.
    pub fn set(&mut self, id: NodeId, value: impl Into<Value>) -> Result<(), DataError> {
        let value = value.into();
        let kind = self.kind(id)?;
        if !kind.has_slots() {
            return self.set_value(id, value);
        }
        match value {
            Value::Null => self.unset(id, None),
            Value::Map(entries) => {
                for name in self.field_names(id)? {
                    if !entries.contains_key(&name) {
                        self.unset(id, Some(&name))?;
                    }
                }
                let any = !entries.is_empty();
                for (name, v) in entries {
                    self.assign(id, &name, v)?;
                }
                if any {
                    self.mark_self(id, ValueState::ExplicitlySet)?;
                }
                Ok(())
            }
            Value::Node(source) if source == id => Ok(()),
            Value::Node(source) => {
                for name in self.field_names(id)? {
                    let provided = match self.attribute(source, &name) {
                        Some(child) => self.is_set(child, None, false, true, true)?,
                        None => false,
                    };
                    if !provided {
                        self.unset(id, Some(&name))?;
                    }
                }
                self.merge_into(id, source)
            }
            other => self.update(id, other),
        }
    }

    /// Applies the given fields only, leaving every other field untouched.
    pub fn update(&mut self, id: NodeId, value: impl Into<Value>) -> Result<(), DataError> {
        let value = value.into();
        let kind = self.kind(id)?;
        if !kind.has_slots() {
            return self.set_value(id, value);
        }
        match value {
            Value::Null => Ok(()),
            Value::Map(entries) => {
                for (name, v) in entries {
                    self.assign(id, &name, v)?;
                }
                Ok(())
            }
            Value::Node(source) => self.merge_into(id, source),
            Value::Str(path) if kind == NodeKind::FileRef => {
                self.set_full_path(id, &path)?;
                self.mark_self(id, ValueState::ExplicitlySet)
            }
            other => Err(self.type_mismatch(id, other.describe(), 5)),
        }
    }

    /// Declared and realised field names, reserved names excluded.
    fn field_names(&self, id: NodeId) -> Result<Vec<String>, DataError> {
        let mut names: Vec<String> = self.declared_fields(id)?.into_keys().collect();
        for name in self.node(id)?.slots.keys() {
            if !is_reserved_name(name) && !names.contains(name) {
                names.push(name.clone());
            }
        }
        Ok(names)
    }

    pub fn qualifiers(&self, id: NodeId) -> Result<&Qualifiers, DataError> {
        Ok(&self.node(id)?.qualifiers)
    }

    pub fn qualifier(&self, id: NodeId, key: &str) -> Result<Option<&Literal>, DataError> {
        Ok(self.node(id)?.qualifiers.get(key))
    }

    /// Overrides one qualifier on this instance, or removes it with `None`.
    ///
    /// Values are conformed to the declared qualifier type first; a value
    /// that still does not fit fails with code 18.
    pub fn set_qualifier(&mut self, id: NodeId, key: &str, value: Option<Literal>) -> Result<(), DataError> {
        let declared = self.registry.qualifier_type(self.type_name(id)?, key);
        let Some(value) = value else {
            self.node_mut(id)?.qualifiers.shift_remove(key);
            return Ok(());
        };
        let value = conform_to_type(value, declared);
        if let Some(ty) = declared {
            if !ty.accepts(&value) {
                return Err(self.type_mismatch(id, format!("qualifier {key}={value}"), 18));
            }
        }
        self.node_mut(id)?.qualifiers.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::tree;
    use super::*;
    use crate::core::metadata::kind::ScalarKind;

    #[test]
    fn classify_follows_case_priority() {
        let int = Some(NodeKind::Scalar(ScalarKind::Int));
        let map = Value::map([("a", 1)]);
        assert_eq!(classify(int, &Value::Null, true), AssignCase::Unset);
        assert_eq!(classify(None, &map, true), AssignCase::NewFromMapping);
        assert_eq!(classify(Some(NodeKind::Composite), &map, true), AssignCase::UpdateFromMapping);
        assert_eq!(classify(int, &map, true), AssignCase::Replace);
        assert_eq!(classify(Some(NodeKind::FileRef), &Value::from("/tmp/x.pdb"), true), AssignCase::SetFullPath);
        assert_eq!(classify(int, &Value::from("5"), true), AssignCase::CoerceScalar);
        assert_eq!(classify(Some(NodeKind::List), &Value::List(vec![]), true), AssignCase::FillList);
        assert_eq!(classify(None, &Value::from(3), true), AssignCase::Replace);
    }

    #[test]
    fn classify_skips_unset_incoming_nodes() {
        let mut tree = tree();
        let n = tree.create("CInt", "n").unwrap();
        let value = Value::Node(n);
        let slot = Some(NodeKind::Scalar(ScalarKind::Int));
        assert_eq!(classify(slot, &value, false), AssignCase::SkipUnsetNode);
        assert_eq!(classify(slot, &value, true), AssignCase::MergeNode);
        assert_eq!(classify(None, &value, false), AssignCase::Replace);
    }

    #[test]
    fn mapping_into_empty_slot_builds_child_with_set_fields() {
        let mut tree = tree();
        let root = tree.create("CData", "root").unwrap();
        tree.assign(root, "cell", Value::map([("a", 1), ("b", 2)])).unwrap();

        let cell = tree.attribute(root, "cell").unwrap();
        for field in ["a", "b"] {
            let child = tree.attribute(cell, field).unwrap();
            assert_eq!(tree.parent(child), Some(cell));
            assert_eq!(tree.get_value_state(cell, Some(field)).unwrap(), ValueState::ExplicitlySet);
        }
        assert_eq!(tree.get_value_state(root, Some("cell")).unwrap(), ValueState::ExplicitlySet);
        assert_eq!(tree.get(cell).unwrap(), Value::map([("a", 1), ("b", 2)]));
    }

    #[test]
    fn mapping_into_existing_node_updates_in_place() {
        let mut tree = tree();
        let root = tree.create("CData", "root").unwrap();
        tree.assign(root, "cell", Value::map([("a", 1)])).unwrap();
        let cell = tree.attribute(root, "cell").unwrap();

        tree.assign(root, "cell", Value::map([("b", 2)])).unwrap();
        assert_eq!(tree.attribute(root, "cell"), Some(cell));
        assert_eq!(tree.get(cell).unwrap(), Value::map([("a", 1), ("b", 2)]));
    }

    #[test]
    fn scalar_assignment_keeps_node_identity() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        let cycles = tree.get_attribute(control, "NCYCLES").unwrap();
        tree.assign(control, "NCYCLES", "7").unwrap();
        assert_eq!(tree.attribute(control, "NCYCLES"), Some(cycles));
        assert_eq!(tree.value(cycles).unwrap(), Some(&Scalar::Int(7)));
        assert_eq!(tree.get_value_state(control, Some("NCYCLES")).unwrap(), ValueState::ExplicitlySet);
    }

    #[test]
    fn declared_fields_reject_uncoercible_values() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "NCYCLES", 4).unwrap();
        let err = tree.assign(control, "NCYCLES", "many").unwrap_err();
        assert_eq!(err.code().map(|c| c.code), Some(5));
        let err = tree.assign(control, "NCYCLES", 11).unwrap_err();
        assert!(matches!(err, DataError::ConstraintViolation { .. }));
        assert_eq!(tree.get(tree.attribute(control, "NCYCLES").unwrap()).unwrap(), Value::Int(4));
    }

    #[test]
    fn closed_types_reject_unknown_fields() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        let err = tree.assign(control, "NOPE", 1).unwrap_err();
        assert!(matches!(err, DataError::NotFound { .. }));
        assert_eq!(err.code().map(|c| c.code), Some(8));
        assert!(tree.get_attribute(control, "NOPE").is_err());
    }

    #[test]
    fn open_fields_are_replaced_when_kind_changes() {
        let mut tree = tree();
        let root = tree.create("CData", "root").unwrap();
        tree.assign(root, "x", 3).unwrap();
        tree.assign(root, "x", "three").unwrap();
        let x = tree.attribute(root, "x").unwrap();
        assert_eq!(tree.type_name(x).unwrap(), "CString");

        tree.assign(root, "tags", Value::List(vec!["a".into(), "b".into()])).unwrap();
        let tags = tree.attribute(root, "tags").unwrap();
        assert_eq!(tree.kind(tags).unwrap(), NodeKind::List);
        assert_eq!(tree.get(tags).unwrap(), Value::List(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn file_reference_accepts_a_path_string() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "XYZIN", "/data/model.pdb").unwrap();
        let file = tree.attribute(control, "XYZIN").unwrap();
        assert_eq!(tree.full_path(file).unwrap().as_deref(), Some("/data/model.pdb"));
        assert!(tree.is_set(control, Some("XYZIN"), false, false, true).unwrap());
    }

    #[test]
    fn reserved_names_are_stored_but_not_tracked() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "_note", "scratch").unwrap();
        assert_eq!(tree.reserved(control, "_note").unwrap(), Some(&Value::from("scratch")));
        assert!(!tree.is_set(control, None, false, true, true).unwrap());
    }

    #[test]
    fn null_assignment_unsets_the_field() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "TITLE", "x").unwrap();
        tree.assign(control, "TITLE", Value::Null).unwrap();
        assert_eq!(tree.get_value_state(control, Some("TITLE")).unwrap(), ValueState::NotSet);
    }

    #[test]
    fn set_with_mapping_unsets_missing_fields() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.update(control, Value::map([("TITLE", Value::from("a")), ("WEIGHT", Value::from(0.5))]))
            .unwrap();
        tree.set(control, Value::map([("TITLE", "b")])).unwrap();

        assert_eq!(tree.get(control).unwrap(), Value::map([("TITLE", "b")]));
        assert_eq!(tree.get_value_state(control, Some("WEIGHT")).unwrap(), ValueState::NotSet);
    }

    #[test]
    fn set_qualifier_checks_declared_types() {
        let mut tree = tree();
        let cycles = tree.create("CCycles", "n").unwrap();
        tree.set_qualifier(cycles, "max", Some(Literal::Int(20))).unwrap();
        tree.set_value(cycles, 15).unwrap();

        let err = tree
            .set_qualifier(cycles, "max", Some(Literal::Str("lots".into())))
            .unwrap_err();
        assert_eq!(err.code().map(|c| c.code), Some(18));
        tree.set_qualifier(cycles, "max", None).unwrap();
        assert_eq!(tree.qualifier(cycles, "max").unwrap(), None);
    }

    #[test]
    fn realize_all_materialises_nested_fields() {
        let mut tree = tree();
        let job = tree.create("CJob", "job").unwrap();
        tree.realize_all(job).unwrap();
        let control = tree.attribute(job, "controlParameters").unwrap();
        assert!(tree.attribute(control, "XYZIN").is_some());
        let file = tree.attribute(control, "XYZIN").unwrap();
        assert!(tree.attribute(file, "baseName").is_some());
    }

    #[test]
    fn realize_all_reaches_into_list_items() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        let cells = tree.get_attribute(control, "CELLS").unwrap();
        let cell = tree.append(cells, Value::map([("a", 1.0)])).unwrap();
        assert_eq!(tree.attribute(cell, "b"), None);

        tree.realize_all(control).unwrap();
        let b = tree.attribute(cell, "b").unwrap();
        assert_eq!(tree.value(b).unwrap(), None);
        assert!(!tree.is_set(cell, Some("b"), false, false, true).unwrap());
    }
}
