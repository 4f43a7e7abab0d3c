//! Error types for the store boundary and the recommendation core.

use std::error::Error as StdError;

use thiserror::Error;

/// Result alias for graph store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result alias for recommendation and aggregation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by a [`GraphStore`](crate::store::GraphStore) or while
/// decoding the rows it returns.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing engine rejected the query or the connection failed.
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
    /// A typed record asked for a column the query did not project.
    #[error("column '{0}' missing from result row")]
    MissingColumn(String),
    /// A column held a value of the wrong scalar type.
    #[error("column '{column}' expected {expected}, found {found}")]
    TypeMismatch {
        /// Column name as projected by the query.
        column: String,
        /// Scalar type the record expected.
        expected: &'static str,
        /// Scalar type the row actually carried.
        found: &'static str,
    },
    /// The engine produced a value with no scalar representation.
    #[error("column '{column}' holds an unsupported value type")]
    UnsupportedType {
        /// Column name as projected by the query.
        column: String,
    },
}

impl StoreError {
    /// Wraps an arbitrary engine error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        StoreError::Backend(err.into())
    }
}

/// Errors surfaced by the recommendation core.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// `apply_new_order` was called for an order the graph does not hold.
    #[error("order {0} not found")]
    UnknownOrder(i64),
}
