use super::builtins;
use super::kind::NodeKind;
use super::literal::Literal;
use super::qualifier::{QualifierType, Qualifiers};
use crate::core::error::{ErrorCode, Severity};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, info};

/// Name of the root of every declared type.
pub const ROOT_TYPE: &str = "CData";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorDecl {
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
}

/// A declared field of a composite type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub default: Option<Literal>,
    /// Overrides applied on top of the field type's own qualifiers.
    #[serde(default)]
    pub qualifiers: Qualifiers,
}

impl FieldDecl {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            default: None,
            qualifiers: Qualifiers::new(),
        }
    }
}

/// The metadata registered for one type name.
///
/// Optional attributes are inherited from the parent chain when absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeMetadata {
    pub name: String,
    pub parent: Option<String>,
    pub kind: Option<NodeKind>,
    pub open: Option<bool>,
    pub fields: IndexMap<String, FieldDecl>,
    pub qualifiers: Qualifiers,
    pub qualifier_types: IndexMap<String, QualifierType>,
    pub error_codes: BTreeMap<u32, ErrorDecl>,
    pub content_order: Option<Vec<String>>,
    pub item_type: Option<String>,
}

/// On-disk shape of a type declaration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeDecl {
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    kind: Option<NodeKind>,
    #[serde(default)]
    open: Option<bool>,
    #[serde(default)]
    fields: IndexMap<String, FieldDecl>,
    #[serde(default)]
    qualifiers: Qualifiers,
    #[serde(default)]
    qualifier_types: IndexMap<String, QualifierType>,
    #[serde(default)]
    error_codes: IndexMap<String, ErrorDecl>,
    #[serde(default)]
    content_order: Option<Vec<String>>,
    #[serde(default)]
    item_type: Option<String>,
}

impl TypeDecl {
    fn into_metadata(self, name: String) -> Result<TypeMetadata, RegistryLoadError> {
        let mut error_codes = BTreeMap::new();
        for (key, decl) in self.error_codes {
            let code = key
                .trim()
                .parse::<u32>()
                .map_err(|_| RegistryLoadError::InvalidErrorCode {
                    type_name: name.clone(),
                    key: key.clone(),
                })?;
            error_codes.insert(code, decl);
        }
        Ok(TypeMetadata {
            name,
            parent: self.parent,
            kind: self.kind,
            open: self.open,
            fields: self.fields,
            qualifiers: self.qualifiers,
            qualifier_types: self.qualifier_types,
            error_codes,
            content_order: self.content_order,
            item_type: self.item_type,
        })
    }
}

#[derive(Debug, Error)]
pub enum RegistryLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Type '{type_name}' names unknown parent type '{parent}'")]
    UnknownParent { type_name: String, parent: String },
    #[error("Type '{type_name}' declares field '{field}' of unknown type '{field_type}'")]
    UnknownFieldType {
        type_name: String,
        field: String,
        field_type: String,
    },
    #[error("Type '{type_name}' inherits from itself")]
    Cycle { type_name: String },
    #[error("Type '{type_name}' has no parent and no kind")]
    MissingKind { type_name: String },
    #[error("Type '{type_name}' has non-numeric error code key '{key}'")]
    InvalidErrorCode { type_name: String, key: String },
}

/// The table of declared types. Read-only once populated.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    types: HashMap<String, TypeMetadata>,
}

impl MetadataRegistry {
    /// A registry without any types, not even the built-ins.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding the fundamental types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for meta in builtins::builtin_types() {
            registry.types.insert(meta.name.clone(), meta);
        }
        registry
    }

    /// Loads the built-ins plus every type declared in a TOML file.
    pub fn load(path: &Path) -> Result<Self, RegistryLoadError> {
        let mut registry = Self::with_builtins();
        registry.extend_from_path(path)?;
        Ok(registry)
    }

    pub fn extend_from_path(&mut self, path: &Path) -> Result<(), RegistryLoadError> {
        let origin = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| RegistryLoadError::Io {
            path: origin.clone(),
            source: e,
        })?;
        self.extend_from_str(&content, &origin)
    }

    /// Adds every table of `content` as a type declaration.
    ///
    /// The batch is validated as a whole, so types may refer to types declared
    /// later in the same document. On failure the registry is left unchanged.
    pub fn extend_from_str(&mut self, content: &str, origin: &str) -> Result<(), RegistryLoadError> {
        let decls: IndexMap<String, TypeDecl> =
            toml::from_str(content).map_err(|e| RegistryLoadError::Toml {
                path: origin.to_string(),
                source: e,
            })?;
        let batch = decls
            .into_iter()
            .map(|(name, decl)| decl.into_metadata(name))
            .collect::<Result<Vec<_>, _>>()?;
        let count = batch.len();
        self.register_all(batch)?;
        info!(origin, count, "Loaded type declarations");
        Ok(())
    }

    pub fn register(&mut self, meta: TypeMetadata) -> Result<(), RegistryLoadError> {
        self.register_all(vec![meta])
    }

    fn register_all(&mut self, batch: Vec<TypeMetadata>) -> Result<(), RegistryLoadError> {
        let mut staged = self.types.clone();
        let names: Vec<String> = batch.iter().map(|m| m.name.clone()).collect();
        for meta in batch {
            staged.insert(meta.name.clone(), meta);
        }
        for name in &names {
            Self::validate(&staged, name)?;
        }
        for name in &names {
            debug!(type_name = %name, "Registered type");
        }
        self.types = staged;
        Ok(())
    }

    fn validate(types: &HashMap<String, TypeMetadata>, name: &str) -> Result<(), RegistryLoadError> {
        let Some(meta) = types.get(name) else {
            return Ok(());
        };
        let mut seen = HashSet::new();
        let mut cursor = Some(meta);
        let mut has_kind = false;
        while let Some(m) = cursor {
            if !seen.insert(m.name.as_str()) {
                return Err(RegistryLoadError::Cycle {
                    type_name: name.to_string(),
                });
            }
            has_kind |= m.kind.is_some();
            cursor = match &m.parent {
                Some(parent) => Some(types.get(parent).ok_or_else(|| {
                    RegistryLoadError::UnknownParent {
                        type_name: m.name.clone(),
                        parent: parent.clone(),
                    }
                })?),
                None => None,
            };
        }
        if !has_kind {
            return Err(RegistryLoadError::MissingKind {
                type_name: name.to_string(),
            });
        }
        for (field, decl) in &meta.fields {
            if !types.contains_key(&decl.type_name) {
                return Err(RegistryLoadError::UnknownFieldType {
                    type_name: name.to_string(),
                    field: field.clone(),
                    field_type: decl.type_name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TypeMetadata> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The type itself followed by its ancestors, nearest first.
    pub fn lineage(&self, name: &str) -> Vec<&TypeMetadata> {
        let mut out: Vec<&TypeMetadata> = Vec::new();
        let mut cursor = self.types.get(name);
        while let Some(meta) = cursor {
            if out.iter().any(|m| m.name == meta.name) {
                break;
            }
            out.push(meta);
            cursor = meta.parent.as_deref().and_then(|p| self.types.get(p));
        }
        out
    }

    pub fn is_subtype(&self, name: &str, ancestor: &str) -> bool {
        self.lineage(name).iter().any(|m| m.name == ancestor)
    }

    pub fn kind(&self, name: &str) -> Option<NodeKind> {
        self.lineage(name).iter().find_map(|m| m.kind)
    }

    /// Whether the type accepts fields it does not declare.
    pub fn is_open(&self, name: &str) -> bool {
        self.lineage(name)
            .iter()
            .find_map(|m| m.open)
            .unwrap_or(false)
    }

    /// Declared fields, ancestors' first, overridden in place by descendants.
    pub fn fields(&self, name: &str) -> IndexMap<String, FieldDecl> {
        let mut out = IndexMap::new();
        for meta in self.lineage(name).into_iter().rev() {
            for (field, decl) in &meta.fields {
                out.insert(field.clone(), decl.clone());
            }
        }
        out
    }

    pub fn field(&self, name: &str, field: &str) -> Option<FieldDecl> {
        self.lineage(name)
            .iter()
            .find_map(|m| m.fields.get(field).cloned())
    }

    pub fn qualifiers(&self, name: &str) -> Qualifiers {
        let mut out = Qualifiers::new();
        for meta in self.lineage(name).into_iter().rev() {
            for (key, value) in &meta.qualifiers {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    }

    pub fn qualifier_type(&self, name: &str, qualifier: &str) -> Option<QualifierType> {
        self.lineage(name)
            .iter()
            .find_map(|m| m.qualifier_types.get(qualifier).copied())
    }

    /// Every qualifier name the type knows, declared or typed, in lineage order.
    pub fn qualifier_names(&self, name: &str) -> Vec<String> {
        let mut out: IndexMap<String, ()> = IndexMap::new();
        for meta in self.lineage(name).into_iter().rev() {
            for key in meta.qualifiers.keys().chain(meta.qualifier_types.keys()) {
                out.insert(key.clone(), ());
            }
        }
        out.into_keys().collect()
    }

    /// Resolves `code` through the type's lineage.
    pub fn error_code(&self, name: &str, code: u32) -> ErrorCode {
        let hit = self
            .lineage(name)
            .into_iter()
            .find_map(|m| m.error_codes.get(&code));
        match hit {
            Some(decl) => ErrorCode {
                type_name: name.to_string(),
                code,
                description: decl.description.clone(),
                severity: decl.severity,
            },
            None => ErrorCode {
                type_name: name.to_string(),
                code,
                description: "Unknown error".to_string(),
                severity: Severity::Error,
            },
        }
    }

    pub fn content_order(&self, name: &str) -> Option<Vec<String>> {
        self.lineage(name)
            .iter()
            .find_map(|m| m.content_order.clone())
    }

    pub fn item_type(&self, name: &str) -> Option<String> {
        self.lineage(name).iter().find_map(|m| m.item_type.clone())
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<MetadataRegistry>> = OnceLock::new();

/// Installs the process-wide registry. Fails, returning the rejected registry,
/// if one was already installed or read.
pub fn install_global(registry: MetadataRegistry) -> Result<(), MetadataRegistry> {
    GLOBAL_REGISTRY
        .set(Arc::new(registry))
        .map_err(|rejected| Arc::try_unwrap(rejected).unwrap_or_else(|arc| (*arc).clone()))
}

/// The process-wide registry; the built-ins unless another was installed first.
pub fn global() -> Arc<MetadataRegistry> {
    Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(MetadataRegistry::with_builtins())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::kind::ScalarKind;
    use std::io::Write;
    use tempfile::tempdir;

    const PROGRAM_TYPES: &str = r#"
[CRefinementParams]
parent = "CContainer"
content_order = ["NCYCLES", "WEIGHT"]

[CRefinementParams.fields.NCYCLES]
type = "CCycleCount"
default = 10

[CRefinementParams.fields.WEIGHT]
type = "CFloat"
qualifiers = { min = 0.0 }

[CRefinementParams.error_codes.201]
description = "Refinement did not converge"
severity = 2

[CCycleCount]
parent = "CInt"
qualifiers = { min = 1, max = 100 }
"#;

    #[test]
    fn builtins_resolve_through_inheritance() {
        let registry = MetadataRegistry::with_builtins();
        assert_eq!(registry.kind("CInt"), Some(NodeKind::Scalar(ScalarKind::Int)));
        assert!(registry.is_subtype("CContainer", ROOT_TYPE));
        assert!(registry.is_open(ROOT_TYPE));
        assert!(!registry.is_open("CInt"));

        let code = registry.error_code("CInt", 5);
        assert_eq!(code.description, "Attempting to set data of wrong type");
        assert_eq!(code.type_name, "CInt");
        assert_eq!(registry.error_code("CInt", 101).description, "below minimum");
    }

    #[test]
    fn unknown_error_code_gets_generic_description() {
        let registry = MetadataRegistry::with_builtins();
        let code = registry.error_code("CString", 999);
        assert_eq!(code.description, "Unknown error");
        assert_eq!(code.severity, Severity::Error);
    }

    #[test]
    fn extend_from_str_accepts_forward_references() {
        let mut registry = MetadataRegistry::with_builtins();
        registry
            .extend_from_str(PROGRAM_TYPES, "inline")
            .expect("types should load");

        assert_eq!(registry.kind("CRefinementParams"), Some(NodeKind::Container));
        let fields = registry.fields("CRefinementParams");
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["NCYCLES", "WEIGHT"]);
        assert_eq!(fields["NCYCLES"].default, Some(Literal::Int(10)));
        assert_eq!(
            registry.content_order("CRefinementParams"),
            Some(vec!["NCYCLES".to_string(), "WEIGHT".to_string()])
        );

        let quals = registry.qualifiers("CCycleCount");
        assert_eq!(quals.get("min"), Some(&Literal::Int(1)));
        assert_eq!(quals.get("onlyEnumerators"), Some(&Literal::Bool(false)));

        let code = registry.error_code("CRefinementParams", 201);
        assert_eq!(code.severity, Severity::Warning);
        assert_eq!(
            registry.error_code("CRefinementParams", 115).description,
            "Attempting to add object with name that is already in container"
        );
    }

    #[test]
    fn unknown_parent_is_rejected_and_registry_unchanged() {
        let mut registry = MetadataRegistry::with_builtins();
        let before = registry.len();
        let err = registry
            .extend_from_str("[CThing]\nparent = \"CMissing\"\n", "inline")
            .unwrap_err();
        assert!(matches!(err, RegistryLoadError::UnknownParent { ref parent, .. } if parent == "CMissing"));
        assert_eq!(registry.len(), before);
        assert!(!registry.contains("CThing"));
    }

    #[test]
    fn inheritance_cycles_are_rejected() {
        let mut registry = MetadataRegistry::with_builtins();
        let err = registry
            .extend_from_str("[CA]\nparent = \"CB\"\n[CB]\nparent = \"CA\"\n", "inline")
            .unwrap_err();
        assert!(matches!(err, RegistryLoadError::Cycle { .. }));
    }

    #[test]
    fn unknown_field_type_and_bad_code_are_rejected() {
        let mut registry = MetadataRegistry::with_builtins();
        let err = registry
            .extend_from_str(
                "[CA]\nparent = \"CContainer\"\n[CA.fields.X]\ntype = \"CNope\"\n",
                "inline",
            )
            .unwrap_err();
        assert!(matches!(err, RegistryLoadError::UnknownFieldType { .. }));

        let err = registry
            .extend_from_str(
                "[CB]\nparent = \"CData\"\n[CB.error_codes.abc]\ndescription = \"x\"\n",
                "inline",
            )
            .unwrap_err();
        assert!(matches!(err, RegistryLoadError::InvalidErrorCode { ref key, .. } if key == "abc"));
    }

    #[test]
    fn root_types_need_a_kind() {
        let mut registry = MetadataRegistry::empty();
        let err = registry
            .extend_from_str("[Orphan]\nopen = true\n", "inline")
            .unwrap_err();
        assert!(matches!(err, RegistryLoadError::MissingKind { .. }));
    }

    #[test]
    fn load_reads_types_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("types.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(PROGRAM_TYPES.as_bytes()).unwrap();

        let registry = MetadataRegistry::load(&path).unwrap();
        assert!(registry.contains("CRefinementParams"));
        assert!(registry.contains("CInt"));
    }

    #[test]
    fn load_reports_missing_file_and_bad_toml() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            MetadataRegistry::load(&missing),
            Err(RegistryLoadError::Io { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[CType\nparent = ").unwrap();
        assert!(matches!(
            MetadataRegistry::load(&bad),
            Err(RegistryLoadError::Toml { .. })
        ));
    }

    #[test]
    fn global_registry_defaults_to_builtins() {
        let registry = global();
        assert!(registry.contains("CContainer"));
        assert!(Arc::ptr_eq(&registry, &global()));
    }
}
