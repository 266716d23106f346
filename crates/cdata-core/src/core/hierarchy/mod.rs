//! # Hierarchy Module
//!
//! A generic parent/child object graph stored in an arena.
//!
//! Nodes are owned exclusively by the [`arena::Hierarchy`]; edges are plain
//! [`ids::NodeId`] handles. A node's children are not stored on the node but
//! answered by querying the arena for nodes whose parent is that node, so the
//! child list can never go stale. Handles are generational: once a node is
//! destroyed its handle stays invalid forever, which is how the
//! `DESTROYED` lifecycle state is observed.
//!
//! ## Key Components
//!
//! - [`arena`] - The `Hierarchy<T>` arena, lifecycle states and events
//! - [`ids`] - The `NodeId` handle type
//! - [`path`] - Dotted path segments with `name[index]` addressing

pub mod arena;
pub mod ids;
pub mod path;
