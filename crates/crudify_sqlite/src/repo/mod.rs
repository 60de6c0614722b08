//! Repository layer: generic CRUD over the tracking session.
//!
//! # Responsibility
//! - Expose Create/Read/Update/Delete per concrete entity type.
//! - Guarantee that no mutating operation leaves its entity tracked.
//!
//! # Invariants
//! - Every mutating operation is save-then-detach; the session tracks
//!   nothing owned by a repository call after that call returns.
//! - Absence on read is a normal result, never an error.

pub mod crud_repo;
