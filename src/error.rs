//! Coarse error classification shared by every module.
//!
//! Each module keeps its own error enum; [`ErrorKind`] folds them into the
//! handful of categories a scheduler acts on (abort the plan, retry the task,
//! reassign the fragment).

use crate::{record::SchemaError, sort::ComparatorError, storage::StorageError};

/// Category of a failure, independent of which module raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input when building an operator or calling an API.
    InvalidArgument,
    /// A column reference did not resolve to exactly one column.
    AmbiguousOrUnknownColumn,
    /// Read, write or connect failure during a scan or append.
    IoFailure,
    /// Metadata discovery could not reach the backing source.
    SourceUnreachable,
    /// Metadata discovery found no such table.
    UnknownTable,
    /// Corrupt or incompatible wire payload.
    SerializationFailure,
}

impl SchemaError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchemaError::AmbiguousOrUnknownColumn { .. } => ErrorKind::AmbiguousOrUnknownColumn,
            SchemaError::UnsupportedType(_) => ErrorKind::InvalidArgument,
            // A value the target cannot hold is a write failure.
            SchemaError::ArityMismatch { .. }
            | SchemaError::TypeMismatch { .. }
            | SchemaError::NullNotAllowed(_) => ErrorKind::IoFailure,
        }
    }
}

impl ComparatorError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ComparatorError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ComparatorError::AmbiguousOrUnknownColumn { .. } => {
                ErrorKind::AmbiguousOrUnknownColumn
            }
            ComparatorError::Serialization(_) => ErrorKind::SerializationFailure,
        }
    }
}

impl StorageError {
    /// Category of this error. A schema violation during append keeps the
    /// category of the underlying [`SchemaError`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Io(_) | StorageError::Corrupt(_) | StorageError::Codec(_) => {
                ErrorKind::IoFailure
            }
            StorageError::Schema(err) => err.kind(),
            StorageError::SourceUnreachable(_) => ErrorKind::SourceUnreachable,
            StorageError::UnknownTable(_) => ErrorKind::UnknownTable,
            StorageError::TableExists(_)
            | StorageError::InvalidName(_)
            | StorageError::SchemaMismatch { .. }
            | StorageError::InvalidFragment { .. }
            | StorageError::Lifecycle(_) => ErrorKind::InvalidArgument,
        }
    }
}
