//! Shared fixtures: two entity mappings and an in-memory session factory.
#![allow(dead_code)]

use crudify_sqlite::db::open_db_in_memory;
use crudify_sqlite::{CrudEntity, KeyPolicy, Session};
use log::{Log, Metadata, Record};
use rusqlite::types::{Type, Value};
use rusqlite::Row;
use std::sync::Arc;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE bars (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stool TEXT NOT NULL
);
CREATE TABLE tags (
    uuid TEXT PRIMARY KEY,
    label TEXT NOT NULL
);
";

/// Rowid-keyed entity; the store assigns the id on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub id: i64,
    pub stool: String,
}

impl Bar {
    pub fn new(stool: impl Into<String>) -> Self {
        Self {
            id: 0,
            stool: stool.into(),
        }
    }
}

impl CrudEntity for Bar {
    type Id = i64;
    const TABLE: &'static str = "bars";
    const ID_COLUMN: &'static str = "id";
    const DATA_COLUMNS: &'static [&'static str] = &["stool"];
    const KEY_POLICY: KeyPolicy = KeyPolicy::StoreGenerated;

    fn id(&self) -> i64 {
        self.id
    }

    fn id_value(id: &i64) -> Value {
        Value::Integer(*id)
    }

    fn data_values(&self) -> Vec<Value> {
        vec![Value::Text(self.stool.clone())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            stool: row.get("stool")?,
        })
    }

    fn adopt_rowid(&mut self, rowid: i64) {
        self.id = rowid;
    }
}

/// UUID-keyed entity; the caller assigns the id before insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub uuid: Uuid,
    pub label: String,
}

impl Tag {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            label: label.into(),
        }
    }
}

impl CrudEntity for Tag {
    type Id = Uuid;
    const TABLE: &'static str = "tags";
    const ID_COLUMN: &'static str = "uuid";
    const DATA_COLUMNS: &'static [&'static str] = &["label"];
    const KEY_POLICY: KeyPolicy = KeyPolicy::ClientAssigned;

    fn id(&self) -> Uuid {
        self.uuid
    }

    fn id_value(id: &Uuid) -> Value {
        Value::Text(id.to_string())
    }

    fn data_values(&self) -> Vec<Value> {
        vec![Value::Text(self.label.clone())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let uuid_text: String = row.get("uuid")?;
        let uuid = Uuid::parse_str(&uuid_text)
            .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err)))?;
        Ok(Self {
            uuid,
            label: row.get("label")?,
        })
    }
}

/// Logger test double; accepted by the repository, never invoked.
pub struct NullLogger;

impl Log for NullLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        false
    }

    fn log(&self, _record: &Record) {}

    fn flush(&self) {}
}

pub fn null_logger() -> Arc<dyn Log> {
    Arc::new(NullLogger)
}

/// Fresh in-memory session with the test schema applied.
pub fn open_test_session() -> Arc<Session> {
    let conn = open_db_in_memory().expect("in-memory database should open");
    conn.execute_batch(SCHEMA).expect("schema should apply");
    Arc::new(Session::new(conn))
}
