use super::hierarchy::ids::NodeId;
use crate::xml::element::XmlError;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Severity of a catalogued error, ordered from harmless to fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(try_from = "u8")]
pub enum Severity {
    Ok = 0,
    Undefined = 1,
    Warning = 2,
    UndefinedError = 3,
    #[default]
    Error = 4,
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(Severity::Ok),
            1 => Ok(Severity::Undefined),
            2 => Ok(Severity::Warning),
            3 => Ok(Severity::UndefinedError),
            4 => Ok(Severity::Error),
            other => Err(format!("severity must be in 0..=4, got {other}")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Ok => "OK",
            Severity::Undefined => "UNDEFINED",
            Severity::Warning => "WARNING",
            Severity::UndefinedError => "UNDEFINED_ERROR",
            Severity::Error => "ERROR",
        })
    }
}

/// A numeric error code resolved against the catalog of a declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode {
    pub type_name: String,
    pub code: u32,
    pub description: String,
    pub severity: Severity,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} code {}: {}", self.type_name, self.code, self.description)
    }
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("'{path}' has no attribute, child or path segment '{name}' ({code})")]
    NotFound {
        path: String,
        name: String,
        code: ErrorCode,
    },

    #[error("Cannot assign {value} to '{path}' ({code})")]
    TypeMismatch {
        path: String,
        value: String,
        code: ErrorCode,
    },

    #[error("Constraint violated on '{path}': {details} ({code})")]
    ConstraintViolation {
        path: String,
        details: String,
        code: ErrorCode,
    },

    #[error("Structural error at '{path}': {details} ({code})")]
    Structural {
        path: String,
        details: String,
        code: ErrorCode,
    },

    #[error("Node {node:?} has been destroyed")]
    Lifecycle { node: NodeId },

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl DataError {
    /// The catalogued code carried by categorised errors.
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            DataError::NotFound { code, .. }
            | DataError::TypeMismatch { code, .. }
            | DataError::ConstraintViolation { code, .. }
            | DataError::Structural { code, .. } => Some(code),
            DataError::Lifecycle { .. } | DataError::Xml(_) | DataError::Io { .. } => None,
        }
    }
}

/// A single finding of a validity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub code: ErrorCode,
    pub details: String,
    pub name: String,
}

/// Accumulates non-fatal findings; produced by `DataTree::validity`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorReport {
    entries: Vec<ReportEntry>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, code: ErrorCode, details: impl Into<String>, name: impl Into<String>) {
        self.entries.push(ReportEntry {
            code,
            details: details.into(),
            name: name.into(),
        });
    }

    pub fn extend(&mut self, other: ErrorReport) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn max_severity(&self) -> Severity {
        self.entries
            .iter()
            .map(|e| e.code.severity)
            .max()
            .unwrap_or(Severity::Ok)
    }

    /// True when anything at WARNING or above was recorded.
    pub fn has_problems(&self) -> bool {
        self.max_severity() >= Severity::Warning
    }

    pub fn report(&self, threshold: Severity) -> String {
        if self.entries.is_empty() {
            return "No errors".to_string();
        }
        let lines: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.code.severity >= threshold)
            .map(|e| {
                let name_part = if e.name.is_empty() {
                    String::new()
                } else {
                    format!(" '{}'", e.name)
                };
                format!(
                    "{} in {}{}: {} (code {})",
                    e.code.severity, e.code.type_name, name_part, e.details, e.code.code
                )
            })
            .collect();
        if lines.is_empty() {
            format!("No errors at or above severity {threshold}")
        } else {
            lines.join("\n")
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.report(Severity::Warning))
    }
}
