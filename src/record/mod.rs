//! Row-level building blocks: typed values, schemas and tuples.

mod datum;
mod schema;
mod tuple;

pub use datum::{DataType, Datum};
pub use schema::{Column, ColumnRef, Schema, SchemaError};
pub use tuple::Tuple;
