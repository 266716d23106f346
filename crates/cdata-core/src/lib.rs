//! # CData Core Library
//!
//! A typed, hierarchical data-object engine. Nodes are declared by a registry
//! of types carrying validation qualifiers, remember whether each field was
//! explicitly assigned, defaulted or left unset, and round-trip through an
//! XML document format.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless building blocks: the generational
//!   node arena, the `MetadataRegistry` of declared types, primitive values,
//!   value-state ledgers and the error taxonomy.
//!
//! - **[`tree`]: The Engine.** The stateful `DataTree`, which owns every typed
//!   node and implements lazy field materialisation, smart assignment,
//!   structural merge, list and container editing and validity checks.
//!
//! - **[`xml`]: The Document Layer.** Encodes and decodes node trees as XML
//!   elements and reads and writes whole definition and parameter documents.

pub mod core;
pub mod tree;
pub mod xml;
