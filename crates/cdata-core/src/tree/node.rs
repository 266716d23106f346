use crate::core::hierarchy::arena::IndexedChildren;
use crate::core::hierarchy::ids::NodeId;
use crate::core::metadata::kind::NodeKind;
use crate::core::metadata::literal::Literal;
use crate::core::metadata::qualifier::Qualifiers;
use crate::core::state::ValueStateTracker;
use crate::core::value::{Scalar, Value};
use indexmap::IndexMap;

/// Field name under which leaf nodes track their own payload.
pub const VALUE_FIELD: &str = "value";

/// Kind-specific storage of a typed node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeBody {
    Scalar(Option<Scalar>),
    List(Vec<NodeId>),
    /// Item names in insertion order.
    Container(Vec<String>),
    Composite,
}

impl NodeBody {
    fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Scalar(_) => NodeBody::Scalar(None),
            NodeKind::List => NodeBody::List(Vec::new()),
            NodeKind::Container => NodeBody::Container(Vec::new()),
            NodeKind::Composite | NodeKind::FileRef => NodeBody::Composite,
        }
    }
}

/// The payload stored in the arena for every typed node.
#[derive(Debug, Clone, PartialEq)]
pub struct DataNode {
    pub(crate) type_name: String,
    pub(crate) kind: NodeKind,
    pub(crate) open: bool,
    pub(crate) states: ValueStateTracker,
    pub(crate) qualifiers: Qualifiers,
    /// The qualifiers the node was created with; encoding writes only the
    /// differences.
    pub(crate) declared_qualifiers: Qualifiers,
    pub(crate) defaults: IndexMap<String, Literal>,
    pub(crate) slots: IndexMap<String, NodeId>,
    pub(crate) reserved: IndexMap<String, Value>,
    pub(crate) item_type: Option<String>,
    pub(crate) body: NodeBody,
    pub(crate) skip_validation: bool,
}

impl DataNode {
    pub(crate) fn new(type_name: &str, kind: NodeKind, open: bool, qualifiers: Qualifiers) -> Self {
        Self {
            type_name: type_name.to_string(),
            kind,
            open,
            states: ValueStateTracker::new(),
            declared_qualifiers: qualifiers.clone(),
            qualifiers,
            defaults: IndexMap::new(),
            slots: IndexMap::new(),
            reserved: IndexMap::new(),
            item_type: None,
            body: NodeBody::for_kind(kind),
            skip_validation: false,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn states(&self) -> &ValueStateTracker {
        &self.states
    }

    pub fn qualifiers(&self) -> &Qualifiers {
        &self.qualifiers
    }

    pub fn slots(&self) -> &IndexMap<String, NodeId> {
        &self.slots
    }

    pub fn slot(&self, name: &str) -> Option<NodeId> {
        self.slots.get(name).copied()
    }

    pub fn reserved(&self, name: &str) -> Option<&Value> {
        self.reserved.get(name)
    }

    pub fn scalar(&self) -> Option<&Scalar> {
        match &self.body {
            NodeBody::Scalar(value) => value.as_ref(),
            _ => None,
        }
    }

    /// Items of a list node; empty for every other kind.
    pub fn list_items(&self) -> &[NodeId] {
        match &self.body {
            NodeBody::List(items) => items,
            _ => &[],
        }
    }

    /// Dynamic item order of a container; empty for every other kind.
    pub fn item_order(&self) -> &[String] {
        match &self.body {
            NodeBody::Container(order) => order,
            _ => &[],
        }
    }

    pub fn item_type(&self) -> Option<&str> {
        self.item_type.as_deref()
    }

    pub fn skips_validation(&self) -> bool {
        self.skip_validation
    }

    /// The slot name under which `child` is held, if any.
    pub(crate) fn slot_name_of(&self, child: NodeId) -> Option<&str> {
        self.slots
            .iter()
            .find(|(_, id)| **id == child)
            .map(|(name, _)| name.as_str())
    }
}

impl IndexedChildren for DataNode {
    fn indexed_child(&self, index: usize) -> Option<NodeId> {
        match &self.body {
            NodeBody::List(items) => items.get(index).copied(),
            NodeBody::Container(order) => order.get(index).and_then(|name| self.slot(name)),
            _ => None,
        }
    }
}
