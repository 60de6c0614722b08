//! Tracking session (unit of work + identity map) over a SQLite connection.
//!
//! # Responsibility
//! - Queue entity inserts/updates/deletes and flush them with `save_changes`.
//! - Track flushed entities by `(table, key)` until explicitly detached.
//! - Serve untracked point reads.
//!
//! # Invariants
//! - A `(table, key)` pair is tracked at most once; queuing a duplicate fails
//!   with `AlreadyTracked` instead of silently shadowing the older entry.
//! - `find` never touches the tracker.
//! - After `close`, every operation fails with `SessionError::Closed`.
//!
//! # Concurrency
//! The internal mutexes exist for memory safety only. A session is meant to
//! be driven by one logical flow of control at a time; interleaving
//! operations from several tasks over one session is unsupported.

use crate::db::{self, DbResult};
use crate::model::entity::{CrudEntity, KeyPolicy};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub type SessionResult<T> = Result<T, SessionError>;

/// Session-level error for tracking and flush operations.
#[derive(Debug)]
pub enum SessionError {
    /// The session was closed; the connection is gone.
    Closed,
    /// The `(table, key)` pair is already present in the identity map.
    AlreadyTracked { table: &'static str, key: String },
    /// A queued UPDATE affected zero rows during `save_changes`.
    StaleUpdate { table: &'static str, key: String },
    Sqlite(rusqlite::Error),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "session is closed"),
            Self::AlreadyTracked { table, key } => {
                write!(f, "entity {key} in table `{table}` is already tracked")
            }
            Self::StaleUpdate { table, key } => {
                write!(f, "update of {key} in table `{table}` affected no rows")
            }
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Outcome of one `save_changes` flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Number of pending operations executed.
    pub applied: usize,
    /// Rowid of the last INSERT in this flush, if any.
    pub last_insert_rowid: Option<i64>,
}

enum PendingState {
    Insert {
        sql: String,
        params: Vec<Value>,
        generated_key: bool,
    },
    Update {
        sql: String,
        params: Vec<Value>,
    },
    Delete {
        sql: String,
        params: Vec<Value>,
    },
    /// Flushed and still occupying the identity map.
    Clean,
}

struct Entry {
    table: &'static str,
    /// `None` until a store-generated key is known (pending insert).
    key: Option<Value>,
    state: PendingState,
}

/// Unit-of-work session over a SQLite connection.
///
/// The connection lives behind `Option` so teardown can drop it while other
/// handles to the session remain; every later use observes `Closed`.
pub struct Session {
    conn: Mutex<Option<Connection>>,
    tracker: Mutex<Vec<Entry>>,
}

impl Session {
    /// Wraps an already-bootstrapped connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            tracker: Mutex::new(Vec::new()),
        }
    }

    /// Opens a file-backed session through `db::open_db`.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(db::open_db(path)?))
    }

    /// Opens an in-memory session through `db::open_db_in_memory`.
    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::new(db::open_db_in_memory()?))
    }

    /// Queues an INSERT for `entity` and tracks it.
    ///
    /// For `StoreGenerated` keys the identity-map key stays pending until the
    /// insert is flushed and the rowid is known.
    pub fn add<E: CrudEntity>(&self, entity: &E) -> SessionResult<()> {
        let generated_key = matches!(E::KEY_POLICY, KeyPolicy::StoreGenerated);
        let (key, params) = match E::KEY_POLICY {
            KeyPolicy::ClientAssigned => {
                let key = E::id_value(&entity.id());
                let mut params = vec![key.clone()];
                params.extend(entity.data_values());
                (Some(key), params)
            }
            KeyPolicy::StoreGenerated => (None, entity.data_values()),
        };

        self.track(Entry {
            table: E::TABLE,
            key,
            state: PendingState::Insert {
                sql: insert_sql::<E>(),
                params,
                generated_key,
            },
        })
    }

    /// Queues a full-state UPDATE for `entity` and tracks it.
    pub fn update<E: CrudEntity>(&self, entity: &E) -> SessionResult<()> {
        let key = E::id_value(&entity.id());
        let mut params = entity.data_values();
        params.push(key.clone());

        self.track(Entry {
            table: E::TABLE,
            key: Some(key),
            state: PendingState::Update {
                sql: update_sql::<E>(),
                params,
            },
        })
    }

    /// Queues a DELETE for `entity` and tracks it until flushed.
    pub fn remove<E: CrudEntity>(&self, entity: &E) -> SessionResult<()> {
        let key = E::id_value(&entity.id());

        self.track(Entry {
            table: E::TABLE,
            key: Some(key.clone()),
            state: PendingState::Delete {
                sql: delete_sql::<E>(),
                params: vec![key],
            },
        })
    }

    /// Untracked point read by identifier.
    pub fn find<E: CrudEntity>(&self, id: &E::Id) -> SessionResult<Option<E>> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(SessionError::Closed)?;

        let mut stmt = conn.prepare(&select_sql::<E>())?;
        let mut rows = stmt.query([E::id_value(id)])?;
        match rows.next()? {
            Some(row) => Ok(Some(E::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Flushes all pending operations in queue order inside one transaction.
    ///
    /// On success, inserted/updated entries stay tracked in clean state and
    /// deleted entries leave the identity map. On failure the transaction is
    /// rolled back and the queue is left untouched.
    ///
    /// # Errors
    /// - `StaleUpdate` when a queued UPDATE matches no row.
    /// - `Closed` after teardown.
    pub fn save_changes(&self) -> SessionResult<SaveReport> {
        let mut conn_guard = self.conn.lock();
        let conn = conn_guard.as_mut().ok_or(SessionError::Closed)?;
        let mut tracker = self.tracker.lock();

        let mut report = SaveReport::default();
        let mut adopted_keys: Vec<(usize, i64)> = Vec::new();

        let tx = conn.transaction()?;
        for (index, entry) in tracker.iter().enumerate() {
            match &entry.state {
                PendingState::Insert {
                    sql,
                    params,
                    generated_key,
                } => {
                    tx.execute(sql, params_from_iter(params.iter().cloned()))?;
                    let rowid = tx.last_insert_rowid();
                    if *generated_key {
                        adopted_keys.push((index, rowid));
                    }
                    report.last_insert_rowid = Some(rowid);
                    report.applied += 1;
                }
                PendingState::Update { sql, params } => {
                    let changed = tx.execute(sql, params_from_iter(params.iter().cloned()))?;
                    if changed == 0 {
                        return Err(SessionError::StaleUpdate {
                            table: entry.table,
                            key: describe_key(entry.key.as_ref()),
                        });
                    }
                    report.applied += 1;
                }
                PendingState::Delete { sql, params } => {
                    tx.execute(sql, params_from_iter(params.iter().cloned()))?;
                    report.applied += 1;
                }
                PendingState::Clean => {}
            }
        }
        tx.commit()?;

        for (index, rowid) in adopted_keys {
            tracker[index].key = Some(Value::Integer(rowid));
        }
        for entry in tracker.iter_mut() {
            if !matches!(entry.state, PendingState::Delete { .. }) {
                entry.state = PendingState::Clean;
            }
        }
        tracker.retain(|entry| !matches!(entry.state, PendingState::Delete { .. }));

        Ok(report)
    }

    /// Removes the entity with this identifier from the identity map.
    ///
    /// Returns whether an entry was actually detached. Pending work attached
    /// to the entry is discarded with it.
    pub fn detach<E: CrudEntity>(&self, id: &E::Id) -> bool {
        let key = E::id_value(id);
        let mut tracker = self.tracker.lock();
        let before = tracker.len();
        tracker.retain(|entry| !(entry.table == E::TABLE && entry.key.as_ref() == Some(&key)));
        tracker.len() != before
    }

    /// Whether the entity with this identifier occupies the identity map.
    pub fn is_tracked<E: CrudEntity>(&self, id: &E::Id) -> bool {
        let key = E::id_value(id);
        self.tracker
            .lock()
            .iter()
            .any(|entry| entry.table == E::TABLE && entry.key.as_ref() == Some(&key))
    }

    /// Number of tracked entries, pending keys included.
    pub fn tracked_len(&self) -> usize {
        self.tracker.lock().len()
    }

    /// Tears the session down: drops the connection and clears the tracker.
    ///
    /// Idempotent; returns whether this call performed the teardown.
    pub fn close(&self) -> bool {
        self.tracker.lock().clear();
        self.conn.lock().take().is_some()
    }

    /// Whether `close` already ran.
    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }

    fn track(&self, entry: Entry) -> SessionResult<()> {
        self.ensure_open()?;
        let mut tracker = self.tracker.lock();
        if let Some(key) = entry.key.as_ref() {
            if tracker
                .iter()
                .any(|existing| existing.table == entry.table && existing.key.as_ref() == Some(key))
            {
                return Err(SessionError::AlreadyTracked {
                    table: entry.table,
                    key: format!("{key:?}"),
                });
            }
        }
        tracker.push(entry);
        Ok(())
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.conn.lock().is_some() {
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }
}

fn insert_sql<E: CrudEntity>() -> String {
    let mut columns: Vec<&str> = Vec::new();
    if matches!(E::KEY_POLICY, KeyPolicy::ClientAssigned) {
        columns.push(E::ID_COLUMN);
    }
    columns.extend_from_slice(E::DATA_COLUMNS);

    let placeholders = (1..=columns.len())
        .map(|position| format!("?{position}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        E::TABLE,
        columns.join(", "),
        placeholders
    )
}

fn update_sql<E: CrudEntity>() -> String {
    let assignments = E::DATA_COLUMNS
        .iter()
        .enumerate()
        .map(|(index, column)| format!("{column} = ?{}", index + 1))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "UPDATE {} SET {} WHERE {} = ?{};",
        E::TABLE,
        assignments,
        E::ID_COLUMN,
        E::DATA_COLUMNS.len() + 1
    )
}

fn delete_sql<E: CrudEntity>() -> String {
    format!("DELETE FROM {} WHERE {} = ?1;", E::TABLE, E::ID_COLUMN)
}

fn select_sql<E: CrudEntity>() -> String {
    let mut columns: Vec<&str> = vec![E::ID_COLUMN];
    columns.extend_from_slice(E::DATA_COLUMNS);

    format!(
        "SELECT {} FROM {} WHERE {} = ?1;",
        columns.join(", "),
        E::TABLE,
        E::ID_COLUMN
    )
}

fn describe_key(key: Option<&Value>) -> String {
    match key {
        Some(value) => format!("{value:?}"),
        None => "<pending key>".to_string(),
    }
}
