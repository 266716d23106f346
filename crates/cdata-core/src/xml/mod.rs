//! # XML Module
//!
//! Serialisation of node trees to and from the XML document format.
//!
//! ## Key Components
//!
//! - [`element`] - An owned element model read and written with `quick-xml`
//! - [`codec`] - `DataTree::encode`/`decode` between nodes and elements
//! - [`document`] - Definition and parameter documents, with file-path entry points

pub mod codec;
pub mod document;
pub mod element;
