//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The driver error (when there is one)
//! is kept as the child frame, the [`ErrorKind`] says what happened from the
//! caller's point of view.

use crate::models::Table;
use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// Absent rows are never an error: lookups return `None` or an empty `Vec`.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The connection string could not be used to build a pool.
    #[display("invalid connection string: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// The backing store could not be reached (I/O, TLS, pool exhausted or closed).
    #[display("database unavailable")]
    Unavailable,
    #[display("database error")]
    Database,
    #[display("could not create database schema")]
    Schema,
    /// A row with the same primary key already exists.
    #[display("record already exists in table {_0}")]
    Conflict(#[error(not(source))] Table),
    /// Input was rejected before it reached the database.
    #[display("invalid {_0}")]
    Validation(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// Classify a driver error into the category the caller can act on.
    pub(crate) fn from_sqlx(err: &sqlx::Error, table: Option<Table>) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => match table {
                Some(table) => Self::Conflict(table),
                None => Self::Database,
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Unavailable,
            _ => Self::Database,
        }
    }
}

/// Raise a driver error as a store error, keeping the driver error as the
/// child frame.
pub(crate) trait SqlxResultExt<T> {
    fn or_classify(self, table: Option<Table>) -> Result<T>;
}
impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    #[track_caller]
    fn or_classify(self, table: Option<Table>) -> Result<T> {
        use exn::ResultExt;
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = ErrorKind::from_sqlx(&err, table);
                Err(err).or_raise(|| kind)
            },
        }
    }
}
