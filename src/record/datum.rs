//! Typed column values.
//!
//! [`Datum`] carries a single slot of a [`Tuple`](crate::record::Tuple). Its
//! ordering is total across every variant so a comparator can never observe an
//! "incomparable" pair at runtime:
//!
//! - integers of any width compare numerically with each other;
//! - floats of any width compare with IEEE-754 `totalOrder` (so `NaN` sorts
//!   after `+inf` and `-0.0` before `+0.0`);
//! - values of unrelated families order by a fixed family rank.
//!
//! `Null` participates in the ordering only for completeness; comparators
//! check for null first and apply their own placement policy.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use arrow::datatypes::DataType as ArrowDataType;
use serde::{Deserialize, Serialize};

use crate::record::SchemaError;

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Boolean.
    Boolean,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
    /// UTF-8 string.
    Text,
    /// Opaque bytes.
    Binary,
}

impl DataType {
    /// The equivalent Arrow type, used when handing schemas to columnar code.
    pub fn to_arrow(self) -> ArrowDataType {
        match self {
            DataType::Boolean => ArrowDataType::Boolean,
            DataType::Int32 => ArrowDataType::Int32,
            DataType::Int64 => ArrowDataType::Int64,
            DataType::Float32 => ArrowDataType::Float32,
            DataType::Float64 => ArrowDataType::Float64,
            DataType::Text => ArrowDataType::Utf8,
            DataType::Binary => ArrowDataType::Binary,
        }
    }
}

impl TryFrom<&ArrowDataType> for DataType {
    type Error = SchemaError;

    fn try_from(value: &ArrowDataType) -> Result<Self, Self::Error> {
        Ok(match value {
            ArrowDataType::Boolean => DataType::Boolean,
            ArrowDataType::Int8 | ArrowDataType::Int16 | ArrowDataType::Int32 => DataType::Int32,
            ArrowDataType::Int64 => DataType::Int64,
            ArrowDataType::Float16 | ArrowDataType::Float32 => DataType::Float32,
            ArrowDataType::Float64 => DataType::Float64,
            ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 => DataType::Text,
            ArrowDataType::Binary | ArrowDataType::LargeBinary => DataType::Binary,
            other => return Err(SchemaError::UnsupportedType(other.to_string())),
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "boolean",
            DataType::Int32 => "int4",
            DataType::Int64 => "int8",
            DataType::Float32 => "float4",
            DataType::Float64 => "float8",
            DataType::Text => "text",
            DataType::Binary => "blob",
        };
        f.write_str(name)
    }
}

/// A single typed value, or SQL `NULL`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Datum {
    /// Null / blank slot.
    #[default]
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
}

/// Family rank used to order values of unrelated types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Family {
    Null,
    Boolean,
    Integer,
    Float,
    Text,
    Binary,
}

impl Datum {
    /// Whether this slot is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// The logical type of the value, `None` for null.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Datum::Null => return None,
            Datum::Boolean(_) => DataType::Boolean,
            Datum::Int32(_) => DataType::Int32,
            Datum::Int64(_) => DataType::Int64,
            Datum::Float32(_) => DataType::Float32,
            Datum::Float64(_) => DataType::Float64,
            Datum::Text(_) => DataType::Text,
            Datum::Binary(_) => DataType::Binary,
        })
    }

    fn family(&self) -> Family {
        match self {
            Datum::Null => Family::Null,
            Datum::Boolean(_) => Family::Boolean,
            Datum::Int32(_) | Datum::Int64(_) => Family::Integer,
            Datum::Float32(_) | Datum::Float64(_) => Family::Float,
            Datum::Text(_) => Family::Text,
            Datum::Binary(_) => Family::Binary,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int32(v) => Some(i64::from(*v)),
            Datum::Int64(v) => Some(*v),
            _ => None,
        }
    }

    // f32 -> f64 widening is exact, so equality stays transitive.
    fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Float32(v) => Some(f64::from(*v)),
            Datum::Float64(v) => Some(*v),
            _ => None,
        }
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Datum::Null, Datum::Null) => Ordering::Equal,
            (Datum::Boolean(a), Datum::Boolean(b)) => a.cmp(b),
            (Datum::Text(a), Datum::Text(b)) => a.cmp(b),
            (Datum::Binary(a), Datum::Binary(b)) => a.cmp(b),
            _ => {
                if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
                    return a.cmp(&b);
                }
                if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
                    return a.total_cmp(&b);
                }
                self.family().cmp(&other.family())
            }
        }
    }
}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.family().hash(state);
        match self {
            Datum::Null => {}
            Datum::Boolean(v) => v.hash(state),
            Datum::Int32(_) | Datum::Int64(_) => self.as_i64().hash(state),
            Datum::Float32(_) | Datum::Float64(_) => {
                self.as_f64().map(f64::to_bits).hash(state)
            }
            Datum::Text(v) => v.hash(state),
            Datum::Binary(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("NULL"),
            Datum::Boolean(v) => write!(f, "{v}"),
            Datum::Int32(v) => write!(f, "{v}"),
            Datum::Int64(v) => write!(f, "{v}"),
            Datum::Float32(v) => write!(f, "{v}"),
            Datum::Float64(v) => write!(f, "{v}"),
            Datum::Text(v) => write!(f, "'{v}'"),
            Datum::Binary(v) => {
                f.write_str("\\x")?;
                for byte in v {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! datum_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Datum {
                fn from(value: $ty) -> Self {
                    Datum::$variant(value.into())
                }
            }
        )*
    };
}

datum_from!(
    bool => Boolean,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    &str => Text,
    Vec<u8> => Binary,
);

impl<T> From<Option<T>> for Datum
where
    T: Into<Datum>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Datum::Null, Into::into)
    }
}
