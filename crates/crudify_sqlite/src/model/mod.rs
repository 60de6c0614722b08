//! Entity mapping contracts consumed by the session and repository layers.
//!
//! # Responsibility
//! - Define the capability an entity type must expose to be persisted.
//! - Keep SQL column mapping declarative and per-type.
//!
//! # Invariants
//! - Entity identity is by value of the identifier field, nothing else.
//! - `DATA_COLUMNS` order must match `data_values()` order.

pub mod entity;
