//! Scan/append contracts every storage backend implements.
//!
//! The scheduler never knows which technology sits behind a table. It asks a
//! [`Tablespace`] for the table's [`Fragment`]s, hands each fragment to a
//! worker, and the worker drives a [`Scanner`] through the same lifecycle
//! regardless of backend:
//!
//! ```text
//! new ──> init ──> next* ──> close
//! ```
//!
//! [`Appender`]s mirror this on the write side. Both are `async` because
//! `next`/`append` may wait on disk or network; neither imposes a timeout.
//!
//! Resources acquired in `init` are owned by the instance, so they are
//! released by `close` on the success path and by `Drop` on every other path.

mod fragment;
pub mod memory;
#[cfg(feature = "tokio")]
pub mod rowfile;
mod tablespace;

use std::sync::Arc;

use async_trait::async_trait;
pub use fragment::{Fragment, FragmentRange};
pub use tablespace::{Tablespace, TablespaceManager};
use thiserror::Error;

use crate::{
    logging::LogContext,
    option::StorageOptions,
    record::{Schema, SchemaError, Tuple},
};

/// Errors surfaced by tablespaces, scanners and appenders.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying read, write or connect failure.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    /// Stored data is truncated or damaged.
    #[error("storage data is corrupt: {0}")]
    Corrupt(&'static str),
    /// A tuple or schema could not be encoded or decoded.
    #[error("tuple codec error: {0}")]
    Codec(String),
    /// A tuple does not fit the target schema, or a projection does not
    /// resolve.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    /// The backing source cannot be contacted.
    #[error("source unreachable: {0}")]
    SourceUnreachable(String),
    /// No such table.
    #[error("unknown table: {0}")]
    UnknownTable(String),
    /// `create_table` on an existing table.
    #[error("table already exists: {0}")]
    TableExists(String),
    /// A table name the backend cannot store.
    #[error("invalid table name: {0:?}")]
    InvalidName(String),
    /// An appender or merge input disagrees with the schema already in place.
    #[error("schema of table {table} does not match: {detail}")]
    SchemaMismatch {
        /// Table (or merge input) concerned.
        table: String,
        /// Both schemas, for the log.
        detail: String,
    },
    /// A fragment of a shape this backend cannot scan.
    #[error("invalid fragment {fragment}: {reason}")]
    InvalidFragment {
        /// The fragment, rendered.
        fragment: String,
        /// Why it was refused.
        reason: String,
    },
    /// A scanner or appender method called out of order.
    #[error("lifecycle violation: {0}")]
    Lifecycle(&'static str),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Codec(err.to_string())
    }
}

/// Reads the tuples of exactly one fragment, projected onto [`Scanner::schema`].
///
/// A scanner is single use: once exhausted or closed it yields nothing more,
/// and rescanning requires a new instance bound to the same fragment.
#[async_trait]
pub trait Scanner: Send {
    /// The schema tuples are produced against. Available before `init`.
    fn schema(&self) -> &Schema;

    /// Acquire what the scan needs: open the file or connection and position
    /// it at the fragment start. After a failed `init` only `close` is
    /// accepted.
    async fn init(&mut self) -> Result<(), StorageError>;

    /// The next tuple, or `None` at end of stream.
    async fn next(&mut self) -> Result<Option<Tuple>, StorageError>;

    /// Release everything the scanner holds. Idempotent, and safe to call
    /// after a failed `init` or `next`.
    async fn close(&mut self) -> Result<(), StorageError>;
}

/// Writes one ordered stream of tuples into one output unit.
#[async_trait]
pub trait Appender: Send {
    /// Schema every appended tuple must satisfy.
    fn schema(&self) -> &Schema;

    /// Open the output unit, creating the table when needed. After a failed
    /// `init` only `close` is accepted.
    async fn init(&mut self) -> Result<(), StorageError>;

    /// Write one tuple. A tuple that does not satisfy [`Appender::schema`] is
    /// rejected without being written.
    async fn append(&mut self, tuple: &Tuple) -> Result<(), StorageError>;

    /// Push buffered tuples down to the medium without closing.
    async fn flush(&mut self) -> Result<(), StorageError>;

    /// Logical write position. Never decreases; grows with every appended
    /// tuple whose encoding is non-empty.
    fn offset(&self) -> u64;

    /// Flush and release. Resources are released even when the final flush
    /// fails or an earlier `append` failed.
    async fn close(&mut self) -> Result<(), StorageError>;
}

/// What a backend needs to build a [`Scanner`].
#[derive(Debug, Clone)]
pub struct ScanContext {
    /// Options of the owning tablespace.
    pub options: Arc<StorageOptions>,
    /// Output schema, possibly a projection of the table's.
    pub schema: Schema,
    /// The fragment to read.
    pub fragment: Fragment,
    /// Key/values attached to every event of the scanner.
    pub log: LogContext,
}

/// What a backend needs to build an [`Appender`].
#[derive(Debug, Clone)]
pub struct AppendContext {
    /// Options of the owning tablespace.
    pub options: Arc<StorageOptions>,
    /// Schema of the written tuples.
    pub schema: Schema,
    /// Target table.
    pub table: String,
    /// Output partition within the table.
    pub partition: u32,
    /// Key/values attached to every event of the appender.
    pub log: LogContext,
}

/// Lifecycle position shared by the bundled backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Created,
    Open,
    Exhausted,
    /// `init` returned an error; only `close` is accepted.
    Failed,
    Closed,
}

impl Phase {
    /// Checks that `init` may run. The phase only moves once the acquisition
    /// outcome is handed to [`Phase::settle`].
    pub(crate) fn begin(&self) -> Result<(), StorageError> {
        match self {
            Phase::Created => Ok(()),
            Phase::Open | Phase::Exhausted | Phase::Failed => {
                Err(StorageError::Lifecycle("init called twice"))
            }
            Phase::Closed => Err(StorageError::Lifecycle("init called after close")),
        }
    }

    /// Records the outcome of `init` and passes it through.
    pub(crate) fn settle<T>(&mut self, opened: Result<T, StorageError>) -> Result<T, StorageError> {
        *self = if opened.is_ok() {
            Phase::Open
        } else {
            Phase::Failed
        };
        opened
    }

    pub(crate) fn ensure_open(&self) -> Result<(), StorageError> {
        match self {
            Phase::Open | Phase::Exhausted => Ok(()),
            Phase::Created => Err(StorageError::Lifecycle("used before init")),
            Phase::Failed => Err(StorageError::Lifecycle("used after failed init")),
            Phase::Closed => Err(StorageError::Lifecycle("used after close")),
        }
    }

    /// Marks the instance closed, returning whether it was already closed.
    pub(crate) fn finish(&mut self) -> bool {
        std::mem::replace(self, Phase::Closed) == Phase::Closed
    }
}
