//! Generic CRUD repository and its construction options.
//!
//! # Responsibility
//! - Forward CRUD calls to the session and manage detach-after-save.
//! - Own (conditionally) session teardown via the keep-open flag.
//!
//! # Invariants
//! - After `create`/`update`/`delete`, the touched entity is no longer
//!   tracked by the session.
//! - Store errors propagate unchanged; this layer retries nothing.
//!
//! # Concurrency
//! A repository instance is meant for one logical flow of control at a time.
//! The async variants suspend only at the blocking-task handoff and run to
//! completion once issued; no cancellation is modeled.

use crate::model::entity::{CrudEntity, KeyPolicy};
use crate::session::{Session, SessionError};
use log::Log;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::task;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for construction and CRUD operations.
#[derive(Debug)]
pub enum RepoError {
    /// The options bundle carried no session handle.
    MissingSession,
    /// No record matched the identifier during update or delete.
    NotFound { table: &'static str, key: String },
    Session(SessionError),
    /// The background task running an async variant failed to complete.
    Background(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSession => write!(f, "repository options carry no session handle"),
            Self::NotFound { table, key } => {
                write!(f, "no record {key} in table `{table}`")
            }
            Self::Session(err) => write!(f, "{err}"),
            Self::Background(message) => write!(f, "background task failed: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SessionError> for RepoError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

/// Construction parameters as a named bundle.
///
/// Plain data holder; validation happens in `CrudRepository::from_options`.
/// The keep-open flag defaults to `true`: the session is treated as
/// externally owned unless the caller says otherwise.
pub struct RepositoryOptions {
    pub session: Option<Arc<Session>>,
    pub logger: Option<Arc<dyn Log>>,
    pub keep_session_open: bool,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            session: None,
            logger: None,
            keep_session_open: true,
        }
    }
}

/// Generic CRUD repository over one concrete entity type.
///
/// Holds a shared session handle, an optional borrowed logger handle
/// (retained for diagnostics, never invoked by CRUD paths), and the
/// keep-open flag deciding whether dropping the repository tears the
/// session down.
pub struct CrudRepository<E: CrudEntity> {
    session: Arc<Session>,
    logger: Option<Arc<dyn Log>>,
    keep_session_open: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: CrudEntity> std::fmt::Debug for CrudRepository<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudRepository")
            .field("table", &E::TABLE)
            .field("has_logger", &self.logger.is_some())
            .field("keep_session_open", &self.keep_session_open)
            .finish_non_exhaustive()
    }
}

impl<E: CrudEntity> CrudRepository<E> {
    /// Builds a repository over a borrowed session, no logger.
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            logger: None,
            keep_session_open: true,
            _entity: PhantomData,
        }
    }

    /// Builds a repository over a borrowed session with a logger handle.
    pub fn with_logger(session: Arc<Session>, logger: Arc<dyn Log>) -> Self {
        Self {
            session,
            logger: Some(logger),
            keep_session_open: true,
            _entity: PhantomData,
        }
    }

    /// Builds a repository with explicit session ownership.
    ///
    /// With `keep_session_open = false`, dropping the repository closes the
    /// session for every holder of the handle.
    pub fn with_ownership(
        session: Arc<Session>,
        logger: Arc<dyn Log>,
        keep_session_open: bool,
    ) -> Self {
        Self {
            session,
            logger: Some(logger),
            keep_session_open,
            _entity: PhantomData,
        }
    }

    /// Builds a repository from an options bundle.
    ///
    /// # Errors
    /// - `MissingSession` when the bundle carries no session handle. No
    ///   partial repository is produced.
    pub fn from_options(options: RepositoryOptions) -> RepoResult<Self> {
        let session = options.session.ok_or(RepoError::MissingSession)?;
        Ok(Self {
            session,
            logger: options.logger,
            keep_session_open: options.keep_session_open,
            _entity: PhantomData,
        })
    }

    /// Shared session handle.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Retained logger handle, if one was supplied.
    pub fn logger(&self) -> Option<&Arc<dyn Log>> {
        self.logger.as_ref()
    }

    /// Whether dropping this repository leaves the session open.
    pub fn keep_session_open(&self) -> bool {
        self.keep_session_open
    }

    /// Inserts `entity`, flushes, detaches it, and returns its identifier.
    ///
    /// For `StoreGenerated` keys the entity's identifier field is populated
    /// from the store before this returns; the returned id is immediately
    /// valid for `read`.
    pub fn create(&self, entity: &mut E) -> RepoResult<E::Id> {
        Self::create_on(&self.session, entity)
    }

    /// Untracked lookup by identifier. Absence is `Ok(None)`.
    pub fn read(&self, id: &E::Id) -> RepoResult<Option<E>> {
        Self::read_on(&self.session, id)
    }

    /// Applies the full entity state to its record, flushes, detaches.
    ///
    /// # Errors
    /// - `NotFound` when no record matches the entity's identifier.
    pub fn update(&self, entity: &E) -> RepoResult<()> {
        Self::update_on(&self.session, entity)
    }

    /// Resolves `id`, removes the record, flushes, detaches.
    ///
    /// # Errors
    /// - `NotFound` when `id` resolves to nothing; the removal is never
    ///   attempted on an absent record.
    pub fn delete(&self, id: &E::Id) -> RepoResult<()> {
        Self::delete_on(&self.session, id)
    }

    /// Async form of `create`; identical semantics.
    pub async fn create_async(&self, entity: &mut E) -> RepoResult<E::Id> {
        let session = Arc::clone(&self.session);
        let mut moved = entity.clone();
        let (id, written) = task::spawn_blocking(move || {
            let id = Self::create_on(&session, &mut moved)?;
            Ok::<_, RepoError>((id, moved))
        })
        .await
        .map_err(|err| RepoError::Background(err.to_string()))??;
        *entity = written;
        Ok(id)
    }

    /// Async form of `read`; identical semantics.
    pub async fn read_async(&self, id: &E::Id) -> RepoResult<Option<E>> {
        let session = Arc::clone(&self.session);
        let id = id.clone();
        task::spawn_blocking(move || Self::read_on(&session, &id))
            .await
            .map_err(|err| RepoError::Background(err.to_string()))?
    }

    /// Async form of `update`; identical semantics.
    pub async fn update_async(&self, entity: &E) -> RepoResult<()> {
        let session = Arc::clone(&self.session);
        let moved = entity.clone();
        task::spawn_blocking(move || Self::update_on(&session, &moved))
            .await
            .map_err(|err| RepoError::Background(err.to_string()))?
    }

    /// Async form of `delete`; identical semantics.
    pub async fn delete_async(&self, id: &E::Id) -> RepoResult<()> {
        let session = Arc::clone(&self.session);
        let id = id.clone();
        task::spawn_blocking(move || Self::delete_on(&session, &id))
            .await
            .map_err(|err| RepoError::Background(err.to_string()))?
    }

    fn create_on(session: &Session, entity: &mut E) -> RepoResult<E::Id> {
        session.add(entity)?;
        let report = session.save_changes()?;
        if matches!(E::KEY_POLICY, KeyPolicy::StoreGenerated) {
            if let Some(rowid) = report.last_insert_rowid {
                entity.adopt_rowid(rowid);
            }
        }
        let id = entity.id();
        session.detach::<E>(&id);
        Ok(id)
    }

    fn read_on(session: &Session, id: &E::Id) -> RepoResult<Option<E>> {
        session.find::<E>(id).map_err(Into::into)
    }

    fn update_on(session: &Session, entity: &E) -> RepoResult<()> {
        session.update(entity)?;
        let saved = session.save_changes();
        let id = entity.id();
        // Detach on the stale path too, so a failed update does not leave a
        // poisoned pending entry behind in the session.
        match saved {
            Ok(_) => {
                session.detach::<E>(&id);
                Ok(())
            }
            Err(SessionError::StaleUpdate { table, key }) => {
                session.detach::<E>(&id);
                Err(RepoError::NotFound { table, key })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete_on(session: &Session, id: &E::Id) -> RepoResult<()> {
        let Some(entity) = session.find::<E>(id)? else {
            return Err(RepoError::NotFound {
                table: E::TABLE,
                key: format!("{id:?}"),
            });
        };
        session.remove(&entity)?;
        session.save_changes()?;
        session.detach::<E>(id);
        Ok(())
    }
}

impl<E: CrudEntity> Drop for CrudRepository<E> {
    fn drop(&mut self) {
        if !self.keep_session_open {
            self.session.close();
        }
    }
}
