//! Persistable entity capability.
//!
//! # Responsibility
//! - Declare the table/column mapping for one concrete entity type.
//! - Convert between entity values and SQLite bind values/rows.
//!
//! # Invariants
//! - One `CrudEntity` impl maps to exactly one table.
//! - `id_value` must be stable for equal identifiers (it is the identity-map
//!   key inside the session tracker).

use rusqlite::types::Value;
use rusqlite::Row;
use std::fmt::Debug;

/// How the primary key of an entity comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// The caller assigns the key before insert (e.g. a UUID).
    ClientAssigned,
    /// The store assigns a rowid key during insert; the entity learns it
    /// through `adopt_rowid` after the insert is flushed.
    StoreGenerated,
}

/// Capability every persistable entity type must expose.
///
/// This is the compile-time rendition of a runtime-generic "table accessor":
/// one repository instance exists per concrete entity/identifier pair, and
/// all SQL is derived from the consts declared here.
pub trait CrudEntity: Clone + Send + 'static {
    /// Identifier type. Compared by value.
    type Id: Clone + PartialEq + Send + Sync + Debug + 'static;

    /// Table this entity persists into.
    const TABLE: &'static str;

    /// Primary key column name.
    const ID_COLUMN: &'static str;

    /// Non-key data columns, in the order produced by `data_values`.
    const DATA_COLUMNS: &'static [&'static str];

    /// Key provenance for inserts.
    const KEY_POLICY: KeyPolicy;

    /// Current identifier value of this entity.
    fn id(&self) -> Self::Id;

    /// Bind value for an identifier.
    fn id_value(id: &Self::Id) -> Value;

    /// Bind values for `DATA_COLUMNS`, in declaration order.
    fn data_values(&self) -> Vec<Value>;

    /// Materializes an entity from a row shaped as
    /// `SELECT {ID_COLUMN}, {DATA_COLUMNS..}`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Adopts a store-generated rowid after insert.
    ///
    /// Only called when `KEY_POLICY` is `StoreGenerated`; the default is a
    /// no-op for client-assigned keys.
    fn adopt_rowid(&mut self, _rowid: i64) {}
}
