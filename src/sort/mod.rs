//! Multi-key tuple ordering.
//!
//! A planner describes an ordering as a list of [`SortSpec`]s. Building a
//! [`TupleComparator`] resolves those names against a [`Schema`] once; every
//! comparison afterwards works on column ids only and cannot fail.
//!
//! [`Schema`]: crate::record::Schema

mod comparator;
mod wire;

use std::fmt;

pub use comparator::{CompiledKey, ComparatorError, TupleComparator};
use serde::{Deserialize, Serialize};
pub use wire::{ComparatorWire, WIRE_VERSION};

use crate::record::ColumnRef;

/// One sort key as produced by ORDER BY or join-key analysis.
///
/// Defaults follow SQL: ascending, nulls last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    /// Column to order by.
    pub key: ColumnRef,
    /// Direction for non-null values.
    pub ascending: bool,
    /// Whether nulls precede every value. Independent of direction.
    pub nulls_first: bool,
}

impl SortSpec {
    /// Ascending, nulls last.
    pub fn new(key: ColumnRef) -> Self {
        Self {
            key,
            ascending: true,
            nulls_first: false,
        }
    }

    /// Shorthand for `SortSpec::new(ColumnRef::parse(reference))`.
    pub fn column(reference: &str) -> Self {
        Self::new(ColumnRef::parse(reference))
    }

    /// Sort values ascending.
    pub fn asc(self) -> Self {
        Self {
            ascending: true,
            ..self
        }
    }

    /// Sort values descending. Null placement is unchanged.
    pub fn desc(self) -> Self {
        Self {
            ascending: false,
            ..self
        }
    }

    /// Place nulls before every value.
    pub fn nulls_first(self) -> Self {
        Self {
            nulls_first: true,
            ..self
        }
    }

    /// Place nulls after every value.
    pub fn nulls_last(self) -> Self {
        Self {
            nulls_first: false,
            ..self
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} nulls {}",
            self.key,
            if self.ascending { "asc" } else { "desc" },
            if self.nulls_first { "first" } else { "last" }
        )
    }
}
