//! Row sinks
//!
//! The engine persists rows through the [`Sink`] trait and never buffers a
//! whole tree in memory. A sink must accept concurrent inserts and answer
//! the reconciler's "rows not written since" query consistently with writes
//! made earlier in the same pass.
//!
//! - [`memory`] - In-memory row store with JSON snapshots on disk

pub mod memory;

pub use memory::MemorySink;

use crate::row::{PassId, Row, RowId, Scope};
use thiserror::Error;

/// Sink failures (retried by the engine, then reported per row or batch)
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("table {table} rejected write: {message}")]
    Rejected { table: String, message: String },

    #[error("sink state lock poisoned")]
    Poisoned,

    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink snapshot error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Relational writer used by the sync engine
pub trait Sink: Send + Sync {
    /// Allocate the id of a new pass, greater than any id handed out before
    fn begin_pass(&self) -> Result<PassId, SinkError>;

    /// Insert the row, or replace the row with the same id
    fn upsert_row(&self, row: &Row) -> Result<(), SinkError>;

    /// Ids of rows in `table` and `scope` last written before `pass`
    fn rows_not_written_since(
        &self,
        table: &str,
        scope: &Scope,
        pass: PassId,
    ) -> Result<Vec<RowId>, SinkError>;

    /// Delete rows by id, returning how many existed
    fn delete_rows(&self, table: &str, ids: &[RowId]) -> Result<usize, SinkError>;
}
