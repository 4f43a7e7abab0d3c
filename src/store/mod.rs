//! Graph store boundary.
//!
//! The recommendation core never talks to a storage engine directly. It issues
//! parameterized queries through [`GraphStore`], in read or write mode, either
//! one statement at a time or inside a [`Transaction`]. Rows come back as
//! column-to-scalar mappings and are decoded into typed records with
//! [`FromRow`] before they leave the query that produced them.

mod sqlite;
mod value;

pub use sqlite::SqliteGraphStore;
pub use value::{FromRow, Params, Row, Value};

use crate::error::StoreResult;

/// Statement execution inside an open write transaction.
pub trait Transaction {
    /// Runs a read within the transaction, observing its uncommitted writes.
    fn query(&mut self, query: &str, params: &Params) -> StoreResult<Vec<Row>>;

    /// Runs a write, returning the number of affected rows.
    fn execute(&mut self, query: &str, params: &Params) -> StoreResult<u64>;
}

/// Read/write query executor over the property graph.
pub trait GraphStore: Send + Sync {
    /// Executes a read-only query and returns its rows in order.
    fn execute_read(&self, query: &str, params: &Params) -> StoreResult<Vec<Row>>;

    /// Executes a single write statement, returning the number of affected rows.
    fn execute_write(&self, query: &str, params: &Params) -> StoreResult<u64>;

    /// Runs `work` inside one write transaction. The transaction commits only
    /// if `work` returns `Ok`; any error rolls every statement back.
    fn write_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn Transaction) -> StoreResult<()>,
    ) -> StoreResult<()>;
}

/// Executes a read and decodes every row as `T`.
pub fn query_as<T: FromRow>(
    store: &dyn GraphStore,
    query: &str,
    params: &Params,
) -> StoreResult<Vec<T>> {
    store
        .execute_read(query, params)?
        .iter()
        .map(T::from_row)
        .collect()
}

/// Transactional counterpart of [`query_as`].
pub fn tx_query_as<T: FromRow>(
    tx: &mut dyn Transaction,
    query: &str,
    params: &Params,
) -> StoreResult<Vec<T>> {
    tx.query(query, params)?.iter().map(T::from_row).collect()
}

/// Single `count` column projected by counting queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Count(pub i64);

impl FromRow for Count {
    fn from_row(row: &Row) -> StoreResult<Self> {
        row.int("count").map(Count)
    }
}

/// Runs a query projecting one `count` column; an empty result counts as zero.
pub fn count(store: &dyn GraphStore, query: &str, params: &Params) -> StoreResult<i64> {
    Ok(query_as::<Count>(store, query, params)?
        .first()
        .map_or(0, |count| count.0))
}

/// Transactional counterpart of [`count`].
pub fn tx_count(tx: &mut dyn Transaction, query: &str, params: &Params) -> StoreResult<i64> {
    Ok(tx_query_as::<Count>(tx, query, params)?
        .first()
        .map_or(0, |count| count.0))
}
