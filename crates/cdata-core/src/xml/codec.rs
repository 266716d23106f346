use super::element::Element;
use crate::core::error::DataError;
use crate::core::hierarchy::ids::NodeId;
use crate::core::metadata::builtins::{STRING_TYPE, is_reserved_name};
use crate::core::metadata::kind::{NodeKind, ScalarKind};
use crate::core::metadata::literal::Literal;
use crate::core::metadata::qualifier::{QualifierType, parse_qualifier_text};
use crate::core::metadata::registry::ROOT_TYPE;
use crate::core::state::ValueState;
use crate::core::value::{Scalar, Value};
use crate::tree::DataTree;
use tracing::{debug, trace};

/// Tag of the element carrying qualifier overrides.
pub const QUALIFIERS_TAG: &str = "qualifiers";
/// Attribute holding a container item's name.
pub const ID_ATTRIBUTE: &str = "id";

/// What [`DataTree::encode_with`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Omit fields that are not explicitly set, and fields that encode empty.
    pub exclude_unset: bool,
    /// Write scalar payloads as element text.
    pub include_values: bool,
    /// Write a `<qualifiers>` element wherever qualifiers were overridden.
    pub include_qualifiers: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            exclude_unset: false,
            include_values: true,
            include_qualifiers: true,
        }
    }
}

impl DataTree {
    /// Encodes `id` with values and qualifier overrides.
    pub fn encode(&self, id: NodeId, name: Option<&str>, exclude_unset: bool) -> Result<Element, DataError> {
        let options = EncodeOptions {
            exclude_unset,
            ..EncodeOptions::default()
        };
        self.encode_with(id, name, &options)
    }

    /// Encodes `id` and its subtree as an element named `name`, or the node's
    /// own name.
    ///
    /// # Arguments
    ///
    /// * `id` - The node to encode.
    /// * `name` - The element tag; defaults to the node's name.
    /// * `options` - Which parts of the subtree to write.
    ///
    /// # Return
    ///
    /// Returns the element tree. Scalars carry their canonical text, list
    /// items are tagged with their type name, container items with their type
    /// name plus an `id` attribute, and other fields with the field name.
    pub fn encode_with(&self, id: NodeId, name: Option<&str>, options: &EncodeOptions) -> Result<Element, DataError> {
        let node = self.node(id)?;
        let mut element = Element::new(match name {
            Some(name) => name,
            None => self.name(id)?,
        });
        if options.include_qualifiers {
            if let Some(qualifiers) = self.encode_qualifiers(id)? {
                element.children.push(qualifiers);
            }
        }
        match node.kind {
            NodeKind::Scalar(_) => {
                if options.include_values {
                    element.text = node.scalar().map(Scalar::to_text);
                }
            }
            NodeKind::List => {
                for item in node.list_items() {
                    let child = self.encode_with(*item, Some(self.type_name(*item)?), options)?;
                    element.children.push(child);
                }
            }
            NodeKind::Container => {
                for (item_name, item) in self.items(id)? {
                    if let Some(child) = self.encode_child(item, self.type_name(item)?, options)? {
                        element.children.push(child.with_attribute(ID_ATTRIBUTE, item_name));
                    }
                }
            }
            NodeKind::Composite | NodeKind::FileRef => {
                for (field, child) in self.ordered_fields(id)? {
                    if let Some(child) = self.encode_child(child, &field, options)? {
                        element.children.push(child);
                    }
                }
            }
        }
        Ok(element)
    }

    fn encode_child(&self, child: NodeId, tag: &str, options: &EncodeOptions) -> Result<Option<Element>, DataError> {
        if options.exclude_unset && !self.is_set(child, None, false, false, true)? {
            return Ok(None);
        }
        let element = self.encode_with(child, Some(tag), options)?;
        if options.exclude_unset && element.is_empty() {
            return Ok(None);
        }
        Ok(Some(element))
    }

    /// Realised fields with declared fields first, in declaration order.
    fn ordered_fields(&self, id: NodeId) -> Result<Vec<(String, NodeId)>, DataError> {
        let node = self.node(id)?;
        let mut out: Vec<(String, NodeId)> = Vec::new();
        for name in self.declared_fields(id)?.into_keys() {
            if let Some(child) = node.slot(&name) {
                out.push((name, child));
            }
        }
        for (name, child) in &node.slots {
            if !is_reserved_name(name) && !out.iter().any(|(n, _)| n == name) {
                out.push((name.clone(), *child));
            }
        }
        Ok(out)
    }

    /// Qualifiers that differ from those the node was created with. Removed
    /// qualifiers are written as empty elements.
    fn encode_qualifiers(&self, id: NodeId) -> Result<Option<Element>, DataError> {
        let node = self.node(id)?;
        let mut element = Element::new(QUALIFIERS_TAG);
        for (key, value) in &node.qualifiers {
            if node.declared_qualifiers.get(key) != Some(value) {
                element.children.push(Element::new(key.as_str()).with_text(value.to_text()));
            }
        }
        for key in node.declared_qualifiers.keys() {
            if !node.qualifiers.contains_key(key) {
                element.children.push(Element::new(key.as_str()));
            }
        }
        Ok((!element.children.is_empty()).then_some(element))
    }

    /// Loads `element` into `id`.
    ///
    /// Scalars parse their text with validation suspended, lists are rebuilt
    /// from their items, and structured nodes match child tags against their
    /// fields. Unmatched tags fail with code 16 unless `ignore_missing`.
    pub fn decode(&mut self, id: NodeId, element: &Element, ignore_missing: bool) -> Result<(), DataError> {
        if let Some(qualifiers) = element.child(QUALIFIERS_TAG) {
            self.decode_qualifiers(id, qualifiers)?;
        }
        match self.kind(id)? {
            NodeKind::Scalar(kind) => {
                let Some(text) = &element.text else {
                    return Ok(());
                };
                if kind != ScalarKind::String && text.trim().is_empty() {
                    return Ok(());
                }
                let Some(scalar) = Scalar::parse(kind, text) else {
                    return Err(self.type_mismatch(id, format!("'{text}' from XML"), 12));
                };
                self.with_validation_suspended(id, |tree| tree.set_value(id, Value::from(scalar)))
            }
            NodeKind::List => self.decode_list(id, element, ignore_missing),
            NodeKind::Container => {
                for child in content_children(element) {
                    match child.attribute(ID_ATTRIBUTE) {
                        Some(item_name) => self.decode_item(id, item_name, child, ignore_missing)?,
                        None => self.decode_field(id, child, ignore_missing)?,
                    }
                }
                Ok(())
            }
            NodeKind::Composite | NodeKind::FileRef => {
                for child in content_children(element) {
                    self.decode_field(id, child, ignore_missing)?;
                }
                Ok(())
            }
        }
    }

    fn decode_qualifiers(&mut self, id: NodeId, element: &Element) -> Result<(), DataError> {
        for entry in &element.children {
            let declared = self.registry().qualifier_type(self.type_name(id)?, &entry.name);
            let value = match (declared, entry.text.as_deref()) {
                (Some(QualifierType::Str), Some(text)) => Some(Literal::Str(text.to_string())),
                (_, text) => text.and_then(parse_qualifier_text),
            };
            self.set_qualifier(id, &entry.name, value)?;
        }
        Ok(())
    }

    fn decode_list(&mut self, id: NodeId, element: &Element, ignore_missing: bool) -> Result<(), DataError> {
        let children: Vec<&Element> = content_children(element).collect();
        let fallback = self
            .node(id)?
            .item_type()
            .unwrap_or(STRING_TYPE)
            .to_string();
        let list_name = self.name(id)?.to_string();
        self.with_validation_suspended(id, |tree| {
            tree.clear_list(id)?;
            let mut any_set = false;
            for child in &children {
                let item_type = if tree.registry().contains(&child.name) {
                    if !tree.registry().is_subtype(&child.name, &fallback) {
                        let details = format!("<{}> in list of {fallback}", child.name);
                        return Err(tree.type_mismatch(id, details, 110));
                    }
                    child.name.clone()
                } else {
                    fallback.clone()
                };
                let item = tree.instantiate(&item_type, &list_name, None)?;
                tree.attach_item(id, usize::MAX, item)?;
                tree.decode(item, child, ignore_missing)?;
                any_set |= tree.is_set(item, None, false, true, true)?;
            }
            if any_set {
                tree.mark_self(id, ValueState::ExplicitlySet)?;
            }
            Ok(())
        })
    }

    fn decode_item(&mut self, id: NodeId, item_name: &str, element: &Element, ignore_missing: bool) -> Result<(), DataError> {
        let target = match self.attribute(id, item_name) {
            Some(target) => target,
            None if self.registry().field(self.type_name(id)?, item_name).is_some() => {
                self.get_attribute(id, item_name)?
            }
            None if self.registry().contains(&element.name) => self.add_content(id, &element.name, item_name)?,
            None if ignore_missing => {
                debug!(node = ?id, item = item_name, tag = %element.name, "Skipping unknown container item");
                return Ok(());
            }
            None => {
                let details = format!("unknown class <{}> for item '{item_name}'", element.name);
                return Err(self.structural(id, details, 142));
            }
        };
        self.decode_child(target, element, ignore_missing)
    }

    fn decode_field(&mut self, id: NodeId, element: &Element, ignore_missing: bool) -> Result<(), DataError> {
        let name = element.name.as_str();
        let target = match self.attribute(id, name) {
            Some(target) => target,
            None if self.registry().field(self.type_name(id)?, name).is_some() => self.get_attribute(id, name)?,
            None if self.node(id)?.is_open() => {
                let has_fields = content_children(element).next().is_some();
                let type_name = if has_fields { ROOT_TYPE } else { STRING_TYPE };
                let child = self.instantiate(type_name, name, None)?;
                self.attach(id, name, child)?;
                trace!(node = ?id, field = name, type_name, "Materialised field from XML");
                child
            }
            None if ignore_missing => {
                debug!(node = ?id, tag = name, "Skipping unrecognised element");
                return Ok(());
            }
            None => {
                return Err(self.structural(id, format!("unrecognised element <{name}>"), 16));
            }
        };
        self.decode_child(target, element, ignore_missing)
    }

    fn decode_child(&mut self, target: NodeId, element: &Element, ignore_missing: bool) -> Result<(), DataError> {
        self.decode(target, element, ignore_missing)?;
        let carries_data = element.text.is_some() || content_children(element).next().is_some();
        if carries_data && self.is_set(target, None, false, true, true)? {
            self.mark_self(target, ValueState::ExplicitlySet)?;
        }
        Ok(())
    }
}

fn content_children(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter(|c| c.name != QUALIFIERS_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::test_support::tree;

    fn populated(tree: &mut DataTree) -> NodeId {
        let job = tree.create("CJob", "job").unwrap();
        let control = tree.get_attribute(job, "controlParameters").unwrap();
        tree.update(
            control,
            Value::map([
                ("NCYCLES", Value::from(7)),
                ("MODE", Value::from("slow")),
                ("WEIGHT", Value::from(0.25)),
                ("USE_TLS", Value::from(true)),
                ("XYZIN", Value::from("/data/in.pdb")),
            ]),
        )
        .unwrap();
        let cells = tree.get_attribute(control, "CELLS").unwrap();
        tree.append(cells, Value::map([("a", 1.0), ("b", 2.0)])).unwrap();
        tree.append(cells, Value::map([("a", 3.0)])).unwrap();
        let title = tree.get_attribute(control, "TITLE").unwrap();
        tree.set_qualifier(title, "maxLength", Some(Literal::Int(40))).unwrap();
        job
    }

    #[test]
    fn scalar_encodes_its_text() {
        let mut tree = tree();
        let cycles = tree.create("CCycles", "value").unwrap();
        tree.set_value(cycles, 5).unwrap();
        let element = tree.encode(cycles, None, false).unwrap();
        assert_eq!(element, Element::new("value").with_text("5"));
    }

    #[test]
    fn container_items_carry_type_tag_and_id() {
        let mut tree = tree();
        let job = populated(&mut tree);
        let element = tree.encode(job, None, true).unwrap();
        let control = &element.children[0];
        assert_eq!(control.name, "CControl");
        assert_eq!(control.attribute("id"), Some("controlParameters"));

        let cycles = control.children.iter().find(|c| c.attribute("id") == Some("NCYCLES")).unwrap();
        assert_eq!(cycles.name, "CCycles");
        assert_eq!(cycles.text.as_deref(), Some("7"));
        let cells = control.children.iter().find(|c| c.attribute("id") == Some("CELLS")).unwrap();
        assert_eq!(cells.children.len(), 2);
        assert!(cells.children.iter().all(|c| c.name == "CCell"));
    }

    #[test]
    fn round_trip_reproduces_the_same_document() {
        let mut tree = tree();
        let job = populated(&mut tree);
        let first = tree.encode(job, None, false).unwrap().to_xml_string().unwrap();

        let copy = tree.create("CJob", "job").unwrap();
        tree.decode(copy, &Element::parse(&first).unwrap(), false).unwrap();
        let second = tree.encode(copy, None, false).unwrap().to_xml_string().unwrap();
        assert_eq!(first, second);
        assert_eq!(tree.get(copy).unwrap(), tree.get(job).unwrap());
    }

    #[test]
    fn excluded_fields_stay_unset_after_decode() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.realize_all(control).unwrap();
        tree.assign(control, "TITLE", "only this").unwrap();

        let element = tree.encode(control, None, true).unwrap();
        let ids: Vec<&str> = element.children.iter().filter_map(|c| c.attribute("id")).collect();
        assert_eq!(ids, vec!["TITLE"]);

        let fresh = tree.create("CControl", "control").unwrap();
        tree.decode(fresh, &element, false).unwrap();
        for field in ["NCYCLES", "MODE", "WEIGHT", "USE_TLS", "CELLS", "XYZIN"] {
            assert!(!tree.is_set(fresh, Some(field), false, false, true).unwrap(), "{field}");
        }
        assert!(tree.is_set(fresh, Some("TITLE"), false, false, true).unwrap());
    }

    #[test]
    fn decoding_suspends_validation_for_legacy_values() {
        let mut tree = tree();
        let cycles = tree.create("CCycles", "NCYCLES").unwrap();
        tree.decode(cycles, &Element::new("NCYCLES").with_text("50"), false).unwrap();
        assert_eq!(tree.value(cycles).unwrap(), Some(&Scalar::Int(50)));
        assert!(tree.set_value(cycles, 60).is_err());

        let err = tree
            .decode(cycles, &Element::new("NCYCLES").with_text("lots"), false)
            .unwrap_err();
        assert_eq!(err.code().map(|c| c.code), Some(12));
    }

    #[test]
    fn closed_composites_reject_unknown_tags_unless_lenient() {
        let mut tree = tree();
        let cell = tree.create("CCell", "cell").unwrap();
        let element = Element::new("cell")
            .with_child(Element::new("a").with_text("1.5"))
            .with_child(Element::new("zz").with_text("?"));
        let err = tree.decode(cell, &element, false).unwrap_err();
        assert_eq!(err.code().map(|c| c.code), Some(16));

        tree.decode(cell, &element, true).unwrap();
        let a = tree.attribute(cell, "a").unwrap();
        assert_eq!(tree.value(a).unwrap(), Some(&Scalar::Float(1.5)));
    }

    #[test]
    fn open_composites_materialise_unknown_tags() {
        let mut tree = tree();
        let data = tree.create("CData", "extra").unwrap();
        let element = Element::new("extra")
            .with_child(Element::new("label").with_text("hello"))
            .with_child(Element::new("nested").with_child(Element::new("inner").with_text("x")));
        tree.decode(data, &element, false).unwrap();

        let label = tree.attribute(data, "label").unwrap();
        assert_eq!(tree.type_name(label).unwrap(), "CString");
        let nested = tree.attribute(data, "nested").unwrap();
        assert_eq!(tree.type_name(nested).unwrap(), "CData");
        assert_eq!(tree.get_value_state(data, Some("nested")).unwrap(), ValueState::ExplicitlySet);
    }

    #[test]
    fn qualifier_overrides_round_trip() {
        let mut tree = tree();
        let name = tree.create("CString", "name").unwrap();
        tree.set_qualifier(name, "maxLength", Some(Literal::Int(8))).unwrap();
        tree.set_qualifier(name, "charWidth", None).unwrap();
        let element = tree.encode(name, None, false).unwrap();
        let qualifiers = element.child(QUALIFIERS_TAG).unwrap();
        assert_eq!(qualifiers.children.len(), 2);

        let fresh = tree.create("CString", "name").unwrap();
        tree.decode(fresh, &element, false).unwrap();
        assert_eq!(tree.qualifier(fresh, "maxLength").unwrap(), Some(&Literal::Int(8)));
        assert_eq!(tree.qualifier(fresh, "charWidth").unwrap(), None);
    }

    #[test]
    fn string_qualifiers_keep_their_text_verbatim() {
        let mut tree = tree();
        let name = tree.create("CString", "name").unwrap();
        for (key, text) in [("toolTip", "Name, in full"), ("guiLabel", "true"), ("helpFile", "2.5")] {
            tree.set_qualifier(name, key, Some(Literal::Str(text.to_string()))).unwrap();
        }
        let xml = tree.encode(name, None, false).unwrap().to_xml_string().unwrap();

        let fresh = tree.create("CString", "name").unwrap();
        tree.decode(fresh, &Element::parse(&xml).unwrap(), false).unwrap();
        assert_eq!(
            tree.qualifier(fresh, "toolTip").unwrap(),
            Some(&Literal::Str("Name, in full".to_string()))
        );
        assert_eq!(tree.qualifier(fresh, "guiLabel").unwrap(), Some(&Literal::Str("true".to_string())));
        assert_eq!(tree.qualifier(fresh, "helpFile").unwrap(), Some(&Literal::Str("2.5".to_string())));
    }

    #[test]
    fn empty_and_blank_strings_survive_a_round_trip() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "TITLE", "").unwrap();
        let first = tree.encode(control, None, true).unwrap().to_xml_string().unwrap();

        let copy = tree.create("CControl", "control").unwrap();
        tree.decode(copy, &Element::parse(&first).unwrap(), false).unwrap();
        let second = tree.encode(copy, None, true).unwrap().to_xml_string().unwrap();
        assert_eq!(first, second);
        let title = tree.attribute(copy, "TITLE").unwrap();
        assert_eq!(tree.value(title).unwrap(), Some(&Scalar::Str(String::new())));
        assert!(tree.is_set(copy, Some("TITLE"), false, false, true).unwrap());

        let padded = tree.create("CString", "pad").unwrap();
        tree.set_value(padded, "  ").unwrap();
        let xml = tree.encode(padded, None, false).unwrap().to_xml_string().unwrap();
        let fresh = tree.create("CString", "pad").unwrap();
        tree.decode(fresh, &Element::parse(&xml).unwrap(), false).unwrap();
        assert_eq!(tree.value(fresh).unwrap(), Some(&Scalar::Str("  ".to_string())));
    }

    #[test]
    fn blank_text_leaves_numeric_fields_unset() {
        let mut tree = tree();
        let cycles = tree.create("CCycles", "NCYCLES").unwrap();
        tree.decode(cycles, &Element::new("NCYCLES").with_text(" "), false).unwrap();
        assert_eq!(tree.value(cycles).unwrap(), None);
    }

    #[test]
    fn unknown_container_classes_fail_with_142() {
        let mut tree = tree();
        let container = tree.create("CContainer", "c").unwrap();
        let element = Element::new("c").with_child(Element::new("CMystery").with_attribute("id", "X"));
        let err = tree.decode(container, &element, false).unwrap_err();
        assert_eq!(err.code().map(|c| c.code), Some(142));
        tree.decode(container, &element, true).unwrap();
        assert_eq!(tree.attribute(container, "X"), None);
    }
}
