use super::builder::TypeMetadataBuilder;
use super::kind::{NodeKind, ScalarKind};
use super::literal::Literal;
use super::qualifier::QualifierType;
use super::registry::{FieldDecl, ROOT_TYPE, TypeMetadata};
use crate::core::error::Severity;
use phf::{Set, phf_set};

pub const INT_TYPE: &str = "CInt";
pub const FLOAT_TYPE: &str = "CFloat";
pub const BOOL_TYPE: &str = "CBoolean";
pub const STRING_TYPE: &str = "CString";
pub const LIST_TYPE: &str = "CList";
pub const CONTAINER_TYPE: &str = "CContainer";
pub const FILE_TYPE: &str = "CDataFile";

/// Slot names that are stored on a node but neither state-tracked nor
/// serialized.
static RESERVED_NAMES: Set<&'static str> = phf_set! {
    "parent", "name", "children", "signals", "qualifiers",
};

pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('_') || RESERVED_NAMES.contains(name)
}

/// The built-in type name used for values of a given scalar kind.
pub fn scalar_type_name(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Int => INT_TYPE,
        ScalarKind::Float => FLOAT_TYPE,
        ScalarKind::Bool => BOOL_TYPE,
        ScalarKind::String => STRING_TYPE,
    }
}

const BASE_ERRORS: &[(u32, &str, Severity)] = &[
    (0, "OK", Severity::Ok),
    (1, "Data has undefined value", Severity::Undefined),
    (2, "Data has undefined value", Severity::UndefinedError),
    (3, "Missing data", Severity::Warning),
    (4, "Missing data", Severity::Error),
    (5, "Attempting to set data of wrong type", Severity::Error),
    (6, "Default value does not satisfy validity check", Severity::Error),
    (7, "Unrecognised qualifier in data input", Severity::Warning),
    (8, "Attempting to get inaccessible attribute:", Severity::Warning),
    (9, "Failed to get property", Severity::Error),
    (10, "Attempting to set inaccessible attribute:", Severity::Warning),
    (11, "Failed to set property:", Severity::Error),
    (12, "Undetermined error setting value from XML", Severity::Error),
    (13, "Unrecognised class name in qualifier", Severity::Error),
    (14, "No object name when saving qualifiers to XML", Severity::Warning),
    (15, "Error saving qualifier to XML", Severity::Error),
    (16, "Unrecognised item in XML data file", Severity::Warning),
    (17, "Attempting to set unrecognised qualifier", Severity::Error),
    (18, "Attempting to set qualifier with wrong type", Severity::Error),
    (19, "Attempting to set qualifier with wrong list item type", Severity::Error),
    (20, "Error creating a list/dict item object", Severity::Error),
    (21, "Unknown error setting qualifiers from Xml file", Severity::Error),
    (22, "Unknown error testing validity", Severity::Error),
    (23, "Error saving data object to XML", Severity::Error),
    (24, "Unable to test validity of default", Severity::Warning),
];

const CONTAINER_ERRORS: &[(u32, &str, Severity)] = &[
    (101, "Error parsing XML", Severity::Error),
    (102, "Missing information", Severity::Error),
    (103, "Unknown data class", Severity::Error),
    (104, "Error creating data object", Severity::Error),
    (105, "Error setting data object qualifiers", Severity::Error),
    (106, "Error loading container definition", Severity::Error),
    (107, "XML file does not have correct function defined in the header", Severity::Error),
    (109, "Error attempting to access unknown attribute", Severity::Warning),
    (113, "Attempting to add object that is not a CData", Severity::Error),
    (114, "Attempting to add object without valid name", Severity::Error),
    (115, "Attempting to add object with name that is already in container", Severity::Error),
    (116, "Error while attempting to add object", Severity::Error),
    (117, "Attempting to delete object with unrecognised name", Severity::Error),
    (118, "Error while attempting to delete object", Severity::Error),
    (119, "Error while attempting to set this container as object parent", Severity::Error),
    (120, "Attempting to add object of unrecognised class to container contents", Severity::Error),
    (126, "No id for sub-container in XML file", Severity::Error),
    (127, "Attempting to load container data from file that does not exist", Severity::Error),
    (132, "Error changing object name - no name given", Severity::Error),
    (133, "Error changing object name - object with new name already exists", Severity::Error),
    (134, "Error changing object name - no object with old name", Severity::Error),
    (138, "Attempting to copy from otherContainer which is not a CContainer", Severity::Error),
    (139, "Attempting to copy data which is not in this container", Severity::Warning),
    (140, "Attempting to copy data which is not in the other container", Severity::Warning),
    (142, "Unrecognised class name in file", Severity::Error),
    (143, "Item in file does not have an id", Severity::Error),
];

const LIST_ERRORS: &[(u32, &str, Severity)] = &[
    (101, "List shorter than required minimum length", Severity::Error),
    (102, "List longer than required maximum length", Severity::Error),
    (103, "Consecutive values in list fail comparison test", Severity::Error),
    (104, "Attempting to add object of wrong type", Severity::Error),
    (105, "Attempting to add object of correct type but wrong qualifiers", Severity::Error),
    (106, "Attempting to add data which does not satisfy the qualifiers for a list item", Severity::Error),
    (107, "Deleting item will reduce list below minimum length", Severity::Error),
    (108, "Adding item will extend list beyond maximum length", Severity::Error),
    (109, "Invalid item class", Severity::Error),
    (110, "etree (XML) list item of wrong type", Severity::Error),
    (112, "No list item object set for list", Severity::Error),
];

fn with_errors(mut builder: TypeMetadataBuilder, errors: &[(u32, &str, Severity)]) -> TypeMetadataBuilder {
    for (code, description, severity) in errors {
        builder = builder.error_code(*code, *description, *severity);
    }
    builder
}

fn numeric(name: &str, kind: ScalarKind, bound: QualifierType) -> TypeMetadata {
    let builder = TypeMetadataBuilder::new(name)
        .parent(ROOT_TYPE)
        .kind(NodeKind::Scalar(kind))
        .open(false)
        .qualifier("onlyEnumerators", false)
        .qualifier("enumerators", Literal::List(vec![]))
        .qualifier("menuText", Literal::List(vec![]))
        .qualifier_type("min", bound)
        .qualifier_type("max", bound)
        .qualifier_type("onlyEnumerators", QualifierType::Bool)
        .qualifier_type("enumerators", QualifierType::List)
        .qualifier_type("menuText", QualifierType::List)
        .qualifier_type("default", bound);
    with_errors(
        builder,
        &[
            (101, "below minimum", Severity::Error),
            (102, "above maximum", Severity::Error),
            (103, "not one of limited allowed values", Severity::Error),
        ],
    )
    .finish()
}

fn file_field(type_name: &str) -> FieldDecl {
    FieldDecl::new(type_name)
}

/// The fundamental types every registry starts with.
pub fn builtin_types() -> Vec<TypeMetadata> {
    let base = TypeMetadataBuilder::new(ROOT_TYPE)
        .kind(NodeKind::Composite)
        .open(true)
        .qualifier("allowUndefined", true)
        .qualifier("saveToDb", false)
        .qualifier_type("allowUndefined", QualifierType::Bool)
        .qualifier_type("toolTip", QualifierType::Str)
        .qualifier_type("guiLabel", QualifierType::Str)
        .qualifier_type("helpFile", QualifierType::Str)
        .qualifier_type("saveToDb", QualifierType::Bool);
    let base = with_errors(base, BASE_ERRORS).finish();

    let string = TypeMetadataBuilder::new(STRING_TYPE)
        .parent(ROOT_TYPE)
        .kind(NodeKind::Scalar(ScalarKind::String))
        .open(false)
        .qualifier("onlyEnumerators", false)
        .qualifier("enumerators", Literal::List(vec![]))
        .qualifier("menuText", Literal::List(vec![]))
        .qualifier("charWidth", -1)
        .qualifier("allowedCharsCode", 0)
        .qualifier_type("minLength", QualifierType::Int)
        .qualifier_type("maxLength", QualifierType::Int)
        .qualifier_type("onlyEnumerators", QualifierType::Bool)
        .qualifier_type("enumerators", QualifierType::List)
        .qualifier_type("menuText", QualifierType::List)
        .qualifier_type("charWidth", QualifierType::Int)
        .qualifier_type("allowedCharsCode", QualifierType::Int)
        .qualifier_type("default", QualifierType::Str);
    let string = with_errors(
        string,
        &[
            (101, "String too short", Severity::Error),
            (102, "String too long", Severity::Error),
            (103, "not one of limited allowed values", Severity::Error),
            (104, "Contains disallowed characters", Severity::Error),
        ],
    )
    .finish();

    let boolean = TypeMetadataBuilder::new(BOOL_TYPE)
        .parent(ROOT_TYPE)
        .kind(NodeKind::Scalar(ScalarKind::Bool))
        .open(false)
        .qualifier_type("menuText", QualifierType::List)
        .qualifier_type("default", QualifierType::Bool)
        .error_code(101, "not allowed value", Severity::Error)
        .finish();

    let list = TypeMetadataBuilder::new(LIST_TYPE)
        .parent(ROOT_TYPE)
        .kind(NodeKind::List)
        .open(false)
        .item_type(STRING_TYPE)
        .qualifier("listMinLength", 0)
        .qualifier_type("listMinLength", QualifierType::Int)
        .qualifier_type("listMaxLength", QualifierType::Int)
        .qualifier_type("listCompare", QualifierType::Int);
    let list = with_errors(list, LIST_ERRORS).finish();

    let container = TypeMetadataBuilder::new(CONTAINER_TYPE)
        .parent(ROOT_TYPE)
        .kind(NodeKind::Container)
        .open(false)
        .qualifier("allowUndefined", true)
        .qualifier("saveToDb", false);
    let container = with_errors(container, CONTAINER_ERRORS).finish();

    let file = TypeMetadataBuilder::new(FILE_TYPE)
        .parent(ROOT_TYPE)
        .kind(NodeKind::FileRef)
        .open(false)
        .field_decl("project", file_field(STRING_TYPE))
        .field_decl("baseName", file_field(STRING_TYPE))
        .field_decl("relPath", file_field(STRING_TYPE))
        .field_decl("annotation", file_field(STRING_TYPE))
        .field_decl("dbFileId", file_field(STRING_TYPE))
        .field_decl("subType", file_field(INT_TYPE))
        .field_decl("contentFlag", {
            let mut decl = file_field(INT_TYPE);
            decl.qualifiers.insert("min".to_string(), Literal::Int(0));
            decl
        })
        .qualifier("allowUndefined", true)
        .qualifier("mustExist", false)
        .qualifier("fromPreviousJob", false)
        .qualifier("isDirectory", false)
        .qualifier("saveToDb", true)
        .qualifier("fileExtensions", Literal::List(vec![]))
        .qualifier_type("mustExist", QualifierType::Bool)
        .qualifier_type("fromPreviousJob", QualifierType::Bool)
        .qualifier_type("isDirectory", QualifierType::Bool)
        .qualifier_type("fileExtensions", QualifierType::List)
        .qualifier_type("mimeTypeName", QualifierType::Str)
        .qualifier_type("fileLabel", QualifierType::Str)
        .finish();

    vec![
        base,
        numeric(INT_TYPE, ScalarKind::Int, QualifierType::Int),
        numeric(FLOAT_TYPE, ScalarKind::Float, QualifierType::Float),
        string,
        boolean,
        list,
        container,
        file,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::registry::MetadataRegistry;

    #[test]
    fn reserved_names_include_underscore_prefix() {
        assert!(is_reserved_name("_cache"));
        assert!(is_reserved_name("qualifiers"));
        assert!(!is_reserved_name("value"));
        assert!(!is_reserved_name("baseName"));
    }

    #[test]
    fn every_builtin_passes_registration() {
        let mut registry = MetadataRegistry::empty();
        for meta in builtin_types() {
            registry.register(meta).unwrap();
        }
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn file_reference_declares_path_fields() {
        let registry = MetadataRegistry::with_builtins();
        let fields = registry.fields(FILE_TYPE);
        assert!(fields.contains_key("baseName"));
        assert_eq!(fields["contentFlag"].qualifiers.get("min"), Some(&Literal::Int(0)));
        assert_eq!(registry.kind(FILE_TYPE), Some(NodeKind::FileRef));
    }

    #[test]
    fn scalar_type_names_are_registered() {
        let registry = MetadataRegistry::with_builtins();
        for kind in [ScalarKind::Int, ScalarKind::Float, ScalarKind::Bool, ScalarKind::String] {
            assert_eq!(
                registry.kind(scalar_type_name(kind)),
                Some(NodeKind::Scalar(kind))
            );
        }
    }
}
