use std::{fmt, ops::Index};

use serde::{Deserialize, Serialize};

use super::Datum;

/// One row: a fixed-arity sequence of [`Datum`] slots positioned by column id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tuple {
    values: Vec<Datum>,
}

impl Tuple {
    /// Tuple over `values`; slot ids follow their order.
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    /// A tuple of `arity` blank slots.
    pub fn blank(arity: usize) -> Self {
        Self {
            values: vec![Datum::Null; arity],
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the tuple has no slots.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether slot `id` is null or was never filled. Out-of-range slots count
    /// as blank.
    pub fn is_blank_or_null(&self, id: usize) -> bool {
        self.values.get(id).map_or(true, Datum::is_null)
    }

    /// The value at slot `id`.
    ///
    /// # Panics
    ///
    /// If `id` is out of range for this tuple.
    pub fn value_at(&self, id: usize) -> &Datum {
        &self.values[id]
    }

    /// The value at slot `id`, if in range.
    pub fn get(&self, id: usize) -> Option<&Datum> {
        self.values.get(id)
    }

    /// Overwrite slot `id`.
    ///
    /// # Panics
    ///
    /// If `id` is out of range for this tuple.
    pub fn set(&mut self, id: usize, value: impl Into<Datum>) {
        self.values[id] = value.into();
    }

    /// All slots in id order.
    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    /// Consume the tuple, returning its slots.
    pub fn into_values(self) -> Vec<Datum> {
        self.values
    }

    /// A new tuple holding the slots listed in `ids`, in that order.
    ///
    /// # Panics
    ///
    /// If any id is out of range for this tuple.
    pub fn project(&self, ids: &[usize]) -> Tuple {
        Tuple::new(ids.iter().map(|&id| self.values[id].clone()).collect())
    }
}

impl Index<usize> for Tuple {
    type Output = Datum;

    fn index(&self, id: usize) -> &Self::Output {
        self.value_at(id)
    }
}

impl From<Vec<Datum>> for Tuple {
    fn from(values: Vec<Datum>) -> Self {
        Tuple::new(values)
    }
}

impl FromIterator<Datum> for Tuple {
    fn from_iter<T: IntoIterator<Item = Datum>>(iter: T) -> Self {
        Tuple::new(iter.into_iter().collect())
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (id, value) in self.values.iter().enumerate() {
            if id > 0 {
                f.write_str(",")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

/// Build a [`Tuple`] from values convertible into [`Datum`].
///
/// ```
/// use tessera::{record::Datum, tuple};
///
/// let row = tuple![1_i32, "x", None::<f64>];
/// assert!(row.is_blank_or_null(2));
/// assert_eq!(row[1], Datum::from("x"));
/// ```
#[macro_export]
macro_rules! tuple {
    ($($value:expr),* $(,)?) => {
        $crate::record::Tuple::new(vec![$($crate::record::Datum::from($value)),*])
    };
}
