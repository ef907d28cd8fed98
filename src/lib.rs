#![deny(missing_docs)]
//! Ordering and storage building blocks for a distributed SQL engine.
//!
//! Two pieces live here. [`sort::TupleComparator`] orders tuples by a list of
//! keys, each with its own direction and null placement, and travels between
//! planner and workers in a small serialized form. The [`storage`] module
//! defines the fragment/scanner/appender contract every backend implements,
//! with an in-memory backend and a local row-file backend behind it.
//!
//! ```
//! use tessera::{
//!     record::{Column, DataType, Schema},
//!     sort::{SortSpec, TupleComparator},
//!     tuple,
//! };
//!
//! let schema = Schema::new(vec![
//!     Column::new("name", DataType::Text, false),
//!     Column::new("score", DataType::Int32, true),
//! ]);
//! let comparator =
//!     TupleComparator::new(schema, vec![SortSpec::column("score").desc()]).unwrap();
//!
//! let mut rows = vec![tuple!["a", 1_i32], tuple!["b", 7_i32], tuple!["c", None::<i32>]];
//! comparator.sort(&mut rows);
//! assert_eq!(rows[0], tuple!["b", 7_i32]);
//! assert_eq!(rows[2], tuple!["c", None::<i32>]);
//! ```

pub mod error;

/// Structured logging context injected into every backend.
pub mod logging;

/// Storage tuning knobs and connection parameters.
pub mod option;

pub mod record;

/// Multi-key tuple comparison and its wire form.
pub mod sort;

pub mod storage;

/// Lifecycle drivers and the k-way merge over sorted scanners.
pub mod stream;

pub use crate::{
    error::ErrorKind,
    logging::LogContext,
    option::{ConnectionInfo, StorageOptions},
    record::{Schema, Tuple},
    sort::{SortSpec, TupleComparator},
    storage::{Appender, Fragment, Scanner, StorageError, Tablespace, TablespaceManager},
};
