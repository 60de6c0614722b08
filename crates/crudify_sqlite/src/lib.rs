//! Generic CRUD repository over a tracking SQLite session.
//! This crate is the single source of truth for the repository contract:
//! every mutating operation saves, then detaches, before returning.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod session;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{CrudEntity, KeyPolicy};
pub use repo::crud_repo::{CrudRepository, RepoError, RepoResult, RepositoryOptions};
pub use session::{SaveReport, Session, SessionError, SessionResult};
