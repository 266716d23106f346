//! # Metadata Module
//!
//! The registry of declared types: their kind, fields, defaults, qualifiers
//! and error-code catalogs.
//!
//! Built-in fundamental types are declared in code; further types are loaded
//! from TOML documents or declared with [`builder::TypeMetadataBuilder`]. All
//! lookups resolve through a type's parent chain. Instances only ever read the
//! registry.

pub mod builder;
pub mod builtins;
pub mod kind;
pub mod literal;
pub mod qualifier;
pub mod registry;
