//! Record store abstraction.
//!
//! The execution tool only needs one capability from the store: run a
//! read-only statement and hand back every row. Backends decode cells into
//! [`FieldValue`](crate::records::FieldValue)s keyed by result-column name;
//! checking those columns against the schema contract is the caller's job.

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::records::ResultSet;

#[cfg(feature = "postgres")]
pub use postgres::PgStore;

/// Read access to the record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Execute `sql` in a read-only transaction and collect the full result.
    ///
    /// All rows are in memory before the connection goes back to the pool.
    async fn fetch_all(&self, sql: &str) -> Result<ResultSet, DatabaseError>;
}
