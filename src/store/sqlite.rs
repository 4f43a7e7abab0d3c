use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::Connection;
use tracing::debug;

use super::{GraphStore, Params, Row, Transaction, Value};
use crate::error::{StoreError, StoreResult};

/// Property-graph layout: one table per node label, one per edge type.
/// Timestamps are stored as Unix seconds.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    price REAL NOT NULL CHECK (price >= 0),
    category TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY,
    created_at INTEGER NOT NULL,
    total_amount REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS has_made (
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    order_id INTEGER NOT NULL UNIQUE REFERENCES orders (id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, order_id)
);

CREATE TABLE IF NOT EXISTS has_item (
    order_id INTEGER NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
    item_id INTEGER NOT NULL REFERENCES items (id) ON DELETE CASCADE,
    quantity INTEGER NOT NULL CHECK (quantity >= 1),
    PRIMARY KEY (order_id, item_id)
);

CREATE TABLE IF NOT EXISTS has_ordered (
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    item_id INTEGER NOT NULL REFERENCES items (id) ON DELETE CASCADE,
    times INTEGER NOT NULL,
    PRIMARY KEY (user_id, item_id)
);

CREATE TABLE IF NOT EXISTS ordered_along_with (
    from_item INTEGER NOT NULL REFERENCES items (id) ON DELETE CASCADE,
    to_item INTEGER NOT NULL REFERENCES items (id) ON DELETE CASCADE,
    times INTEGER NOT NULL,
    PRIMARY KEY (from_item, to_item),
    CHECK (from_item <> to_item)
);

CREATE TABLE IF NOT EXISTS processed_orders (
    order_id INTEGER PRIMARY KEY REFERENCES orders (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_has_item_item ON has_item (item_id);
CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders (created_at);
CREATE INDEX IF NOT EXISTS idx_items_category ON items (category);
";

/// Embedded [`GraphStore`] on SQLite. All access goes through one connection
/// guarded by a mutex, so writes are serialized with each other and with reads.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Opens (or creates) a database file and applies the graph schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(path = %path.display(), "opened sqlite graph store");
        Self::with_connection(conn)
    }

    /// Private in-memory database, mainly for tests and demos.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteGraphStore {
    fn execute_read(&self, query: &str, params: &Params) -> StoreResult<Vec<Row>> {
        let conn = self.conn.lock();
        run_query(&conn, query, params)
    }

    fn execute_write(&self, query: &str, params: &Params) -> StoreResult<u64> {
        let conn = self.conn.lock();
        run_execute(&conn, query, params)
    }

    fn write_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn Transaction) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        work(&mut SqliteTransaction { conn: &tx })?;
        tx.commit()?;
        Ok(())
    }
}

struct SqliteTransaction<'a> {
    conn: &'a Connection,
}

impl Transaction for SqliteTransaction<'_> {
    fn query(&mut self, query: &str, params: &Params) -> StoreResult<Vec<Row>> {
        run_query(self.conn, query, params)
    }

    fn execute(&mut self, query: &str, params: &Params) -> StoreResult<u64> {
        run_execute(self.conn, query, params)
    }
}

fn run_query(conn: &Connection, query: &str, params: &Params) -> StoreResult<Vec<Row>> {
    let mut stmt = conn.prepare_cached(query)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    with_bound(params, |bound| {
        let mut rows = stmt.query(bound)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                values.push((name.clone(), from_sql(name, row.get_ref(idx)?)?));
            }
            out.push(Row::new(values));
        }
        Ok(out)
    })
}

fn run_execute(conn: &Connection, query: &str, params: &Params) -> StoreResult<u64> {
    let mut stmt = conn.prepare_cached(query)?;
    with_bound(params, |bound| Ok(stmt.execute(bound)? as u64))
}

fn with_bound<T>(
    params: &Params,
    f: impl FnOnce(&[(&str, &dyn ToSql)]) -> StoreResult<T>,
) -> StoreResult<T> {
    let names: Vec<String> = params.iter().map(|(name, _)| format!(":{name}")).collect();
    let bound: Vec<(&str, &dyn ToSql)> = names
        .iter()
        .zip(params.iter())
        .map(|(name, (_, value))| (name.as_str(), value as &dyn ToSql))
        .collect();
    f(&bound)
}

fn from_sql(column: &str, value: ValueRef<'_>) -> StoreResult<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => {
            return Err(StoreError::UnsupportedType {
                column: column.to_owned(),
            })
        }
    })
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Int(v) => ToSqlOutput::from(*v),
            Value::Float(v) => ToSqlOutput::from(*v),
            Value::Text(v) => ToSqlOutput::from(v.as_str()),
            Value::Timestamp(ts) => ToSqlOutput::from(ts.unix_timestamp()),
        })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::backend(err)
    }
}
