use super::hierarchy::ids::NodeId;
use super::metadata::kind::ScalarKind;
use super::metadata::literal::Literal;
use indexmap::IndexMap;
use phf::{Map, phf_map};
use std::cmp::Ordering;
use std::fmt;

static BOOL_TOKENS: Map<&'static str, bool> = phf_map! {
    "true" => true, "t" => true, "yes" => true, "y" => true, "on" => true, "1" => true,
    "false" => false, "f" => false, "no" => false, "n" => false, "off" => false, "0" => false,
};

/// Interprets a truthy/falsy token, ignoring case and surrounding space.
pub fn parse_bool_token(text: &str) -> Option<bool> {
    BOOL_TOKENS
        .get(text.trim().to_ascii_lowercase().as_str())
        .copied()
}

/// The payload of a scalar-carrying node.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Int(_) => ScalarKind::Int,
            Scalar::Float(_) => ScalarKind::Float,
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Str(_) => ScalarKind::String,
        }
    }

    /// The canonical text used for XML element text.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => format!("{f:?}"),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Str(s) => s.clone(),
        }
    }

    /// Parses element text into a payload of `kind`.
    pub fn parse(kind: ScalarKind, text: &str) -> Option<Scalar> {
        match kind {
            ScalarKind::Int => text.trim().parse().ok().map(Scalar::Int),
            ScalarKind::Float => text.trim().parse().ok().map(Scalar::Float),
            ScalarKind::Bool => parse_bool_token(text).map(Scalar::Bool),
            ScalarKind::String => Some(Scalar::Str(text.to_string())),
        }
    }

    /// Converts a primitive value into a payload of `kind`.
    ///
    /// Strings are parsed for numeric and boolean kinds, integers widen to
    /// floats, and anything else must already match.
    pub fn coerce(kind: ScalarKind, value: &Value) -> Option<Scalar> {
        match (kind, value) {
            (ScalarKind::Int, Value::Int(i)) => Some(Scalar::Int(*i)),
            (ScalarKind::Float, Value::Float(f)) => Some(Scalar::Float(*f)),
            (ScalarKind::Float, Value::Int(i)) => Some(Scalar::Float(*i as f64)),
            (ScalarKind::Bool, Value::Bool(b)) => Some(Scalar::Bool(*b)),
            (ScalarKind::String, Value::Str(s)) => Some(Scalar::Str(s.clone())),
            (ScalarKind::Int | ScalarKind::Float | ScalarKind::Bool, Value::Str(s)) => {
                Scalar::parse(kind, s)
            }
            _ => None,
        }
    }

    pub fn from_literal(kind: ScalarKind, literal: &Literal) -> Option<Scalar> {
        Scalar::coerce(kind, &Value::from(literal.clone()))
    }

    pub fn to_literal(&self) -> Literal {
        match self {
            Scalar::Int(i) => Literal::Int(*i),
            Scalar::Float(f) => Literal::Float(*f),
            Scalar::Bool(b) => Literal::Bool(*b),
            Scalar::Str(s) => Literal::Str(s.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numbers compare across Int/Float, strings lexicographically and
    /// booleans with `false < true`. Other pairings are unordered.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
            (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }

    fn numeric_op(
        &self,
        other: &Scalar,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Option<Scalar> {
        match (self, other) {
            (Scalar::Int(a), Scalar::Int(b)) => int_op(*a, *b).map(Scalar::Int),
            (a, b) => {
                let result = float_op(a.as_f64()?, b.as_f64()?);
                result.is_finite().then_some(Scalar::Float(result))
            }
        }
    }

    /// Adds numbers or concatenates strings.
    pub fn add(&self, other: &Scalar) -> Option<Scalar> {
        if let (Scalar::Str(a), Scalar::Str(b)) = (self, other) {
            return Some(Scalar::Str(format!("{a}{b}")));
        }
        self.numeric_op(other, i64::checked_add, |a, b| a + b)
    }

    pub fn sub(&self, other: &Scalar) -> Option<Scalar> {
        self.numeric_op(other, i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(&self, other: &Scalar) -> Option<Scalar> {
        self.numeric_op(other, i64::checked_mul, |a, b| a * b)
    }

    /// True division; always yields a float. Division by zero yields `None`.
    pub fn div(&self, other: &Scalar) -> Option<Scalar> {
        let (a, b) = (self.as_f64()?, other.as_f64()?);
        if b == 0.0 {
            return None;
        }
        Some(Scalar::Float(a / b))
    }

    pub fn rem(&self, other: &Scalar) -> Option<Scalar> {
        self.numeric_op(other, i64::checked_rem, |a, b| a % b)
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Anything that can be assigned to a field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Node(NodeId),
}

impl Value {
    /// Builds a mapping value from `(key, value)` pairs.
    pub fn map<I, K, V>(entries: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The scalar kind a primitive value naturally has.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Value::Bool(_) => Some(ScalarKind::Bool),
            Value::Int(_) => Some(ScalarKind::Int),
            Value::Float(_) => Some(ScalarKind::Float),
            Value::Str(_) => Some(ScalarKind::String),
            _ => None,
        }
    }

    /// The value as a payload of its own natural kind.
    pub fn to_scalar(&self) -> Option<Scalar> {
        Scalar::coerce(self.scalar_kind()?, self)
    }

    /// A short human description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => format!("bool {b}"),
            Value::Int(i) => format!("int {i}"),
            Value::Float(f) => format!("float {f:?}"),
            Value::Str(s) => format!("string '{s}'"),
            Value::List(items) => format!("list of {} items", items.len()),
            Value::Map(m) => format!("mapping of {} entries", m.len()),
            Value::Node(id) => format!("node {id:?}"),
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Int(i) => Value::Int(i),
            Scalar::Float(f) => Value::Float(f),
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Str(s) => Value::Str(s),
        }
    }
}

impl From<Literal> for Value {
    fn from(l: Literal) -> Self {
        match l {
            Literal::Bool(b) => Value::Bool(b),
            Literal::Int(i) => Value::Int(i),
            Literal::Float(f) => Value::Float(f),
            Literal::Str(s) => Value::Str(s),
            Literal::List(items) => Value::List(items.into_iter().map(Value::from).collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NodeId> for Value {
    fn from(v: NodeId) -> Self {
        Value::Node(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
