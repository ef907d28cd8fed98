use std::fmt;

use serde::{Deserialize, Serialize};

/// The part of a table's data a fragment covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentRange {
    /// `[start, start + length)` bytes of the file at the fragment's location.
    Bytes {
        /// First byte, always on a record boundary.
        start: u64,
        /// Bytes covered.
        length: u64,
    },
    /// Rows `[start, start + count)` in the backend's native row order.
    Rows {
        /// First row.
        start: u64,
        /// Rows covered.
        count: u64,
    },
    /// A backend-specific query selecting a slice of a remote source.
    Query {
        /// Backend query text.
        predicate: String,
    },
}

impl FragmentRange {
    /// Whether the range provably selects nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            FragmentRange::Bytes { length, .. } => *length == 0,
            FragmentRange::Rows { count, .. } => *count == 0,
            FragmentRange::Query { .. } => false,
        }
    }
}

/// One unit of scan work: a disjoint slice of a table handed to one scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fragment {
    /// Logical table the fragment belongs to.
    pub table: String,
    /// Backend address of the data: a file path, a collection, a URI.
    pub location: String,
    /// Slice of the data at `location`.
    pub range: FragmentRange,
}

impl Fragment {
    /// Fragment over `range` of `location`.
    pub fn new(table: impl Into<String>, location: impl Into<String>, range: FragmentRange) -> Self {
        Self {
            table: table.into(),
            location: location.into(),
            range,
        }
    }

    /// Byte-range fragment.
    pub fn bytes(
        table: impl Into<String>,
        location: impl Into<String>,
        start: u64,
        length: u64,
    ) -> Self {
        Self::new(table, location, FragmentRange::Bytes { start, length })
    }

    /// Row-range fragment.
    pub fn rows(table: impl Into<String>, location: impl Into<String>, start: u64, count: u64) -> Self {
        Self::new(table, location, FragmentRange::Rows { start, count })
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.table, self.location)?;
        match &self.range {
            FragmentRange::Bytes { start, length } => write!(f, "[bytes {start}+{length}]"),
            FragmentRange::Rows { start, count } => write!(f, "[rows {start}+{count}]"),
            FragmentRange::Query { predicate } => write!(f, "[query {predicate}]"),
        }
    }
}
