//! # Core Module
//!
//! The stateless foundation of the engine: the node arena, the type registry,
//! primitive values and the error taxonomy.
//!
//! ## Architecture
//!
//! - **Hierarchy** ([`hierarchy`]) - Arena-backed parent/child graph with lifecycle states and events
//! - **Type Declarations** ([`metadata`]) - The registry of declared types, qualifiers and error catalogs
//! - **Values** ([`value`]) - Scalar payloads and the assignable `Value` union
//! - **Value States** ([`state`]) - Per-field explicit/default/unset ledger
//! - **Errors** ([`error`]) - `DataError`, catalogued error codes and validity reports
//! - **Notifications** ([`signal`]) - Typed publish/subscribe channel

pub mod error;
pub mod hierarchy;
pub mod metadata;
pub mod signal;
pub mod state;
pub mod value;
