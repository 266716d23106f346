use super::kind::NodeKind;
use super::literal::Literal;
use super::qualifier::QualifierType;
use super::registry::{ErrorDecl, FieldDecl, RegistryLoadError, TypeMetadata};
use crate::core::error::Severity;

/// Fluent declaration of a type in code.
#[derive(Debug, Clone, Default)]
pub struct TypeMetadataBuilder {
    meta: TypeMetadata,
}

impl TypeMetadataBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: TypeMetadata {
                name: name.into(),
                ..TypeMetadata::default()
            },
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.meta.parent = Some(parent.into());
        self
    }

    pub fn kind(mut self, kind: NodeKind) -> Self {
        self.meta.kind = Some(kind);
        self
    }

    pub fn open(mut self, open: bool) -> Self {
        self.meta.open = Some(open);
        self
    }

    pub fn field(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.meta.fields.insert(name.into(), FieldDecl::new(type_name));
        self
    }

    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        default: impl Into<Literal>,
    ) -> Self {
        let mut decl = FieldDecl::new(type_name);
        decl.default = Some(default.into());
        self.meta.fields.insert(name.into(), decl);
        self
    }

    pub fn field_decl(mut self, name: impl Into<String>, decl: FieldDecl) -> Self {
        self.meta.fields.insert(name.into(), decl);
        self
    }

    pub fn qualifier(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.meta.qualifiers.insert(key.into(), value.into());
        self
    }

    pub fn qualifier_type(mut self, key: impl Into<String>, ty: QualifierType) -> Self {
        self.meta.qualifier_types.insert(key.into(), ty);
        self
    }

    pub fn error_code(mut self, code: u32, description: impl Into<String>, severity: Severity) -> Self {
        self.meta.error_codes.insert(
            code,
            ErrorDecl {
                description: description.into(),
                severity,
            },
        );
        self
    }

    pub fn content_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.content_order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    pub fn item_type(mut self, type_name: impl Into<String>) -> Self {
        self.meta.item_type = Some(type_name.into());
        self
    }

    /// Finishes the declaration. A type must name a parent or a kind; whether
    /// the parent exists is checked when the type is registered.
    pub fn build(self) -> Result<TypeMetadata, RegistryLoadError> {
        if self.meta.parent.is_none() && self.meta.kind.is_none() {
            return Err(RegistryLoadError::MissingKind {
                type_name: self.meta.name,
            });
        }
        Ok(self.meta)
    }

    /// For the built-in table, whose declarations are known to be complete.
    pub(crate) fn finish(self) -> TypeMetadata {
        self.meta
    }
}
