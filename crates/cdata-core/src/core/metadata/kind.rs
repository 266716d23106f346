use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// The payload kind of a scalar-carrying node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int,
    Float,
    Bool,
    String,
}

/// The closed set of node shapes a declared type can take.
///
/// Smart assignment and the XML codec dispatch exhaustively on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum NodeKind {
    Scalar(ScalarKind),
    Composite,
    Container,
    List,
    FileRef,
}

impl NodeKind {
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            NodeKind::Scalar(k) => Some(*k),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, NodeKind::Scalar(_))
    }

    /// Kinds whose value lives in named child slots.
    pub fn has_slots(&self) -> bool {
        matches!(
            self,
            NodeKind::Composite | NodeKind::Container | NodeKind::FileRef
        )
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Bool => "bool",
            ScalarKind::String => "string",
        })
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Scalar(k) => write!(f, "{k}"),
            NodeKind::Composite => f.write_str("composite"),
            NodeKind::Container => f.write_str("container"),
            NodeKind::List => f.write_str("list"),
            NodeKind::FileRef => f.write_str("file"),
        }
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(NodeKind::Scalar(ScalarKind::Int)),
            "float" => Ok(NodeKind::Scalar(ScalarKind::Float)),
            "bool" | "boolean" => Ok(NodeKind::Scalar(ScalarKind::Bool)),
            "string" | "str" => Ok(NodeKind::Scalar(ScalarKind::String)),
            "composite" => Ok(NodeKind::Composite),
            "container" => Ok(NodeKind::Container),
            "list" => Ok(NodeKind::List),
            "file" | "fileref" => Ok(NodeKind::FileRef),
            other => Err(format!("unknown node kind '{other}'")),
        }
    }
}

impl TryFrom<String> for NodeKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
