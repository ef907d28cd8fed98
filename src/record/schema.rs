use std::{collections::HashMap, fmt, sync::Arc};

use arrow::datatypes::{Field, Schema as ArrowSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DataType, Datum, Tuple};

/// Arrow field metadata key carrying a column's qualifier.
const QUALIFIER_METADATA_KEY: &str = "tessera.qualifier";

/// Errors raised while resolving columns or validating tuples.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A reference matched zero or several columns.
    #[error("column \"{column}\" is ambiguous or unknown ({matches} matches)")]
    AmbiguousOrUnknownColumn {
        /// The reference as written.
        column: String,
        /// How many columns it matched.
        matches: usize,
    },
    /// Tuple width differs from the schema.
    #[error("tuple arity {actual} does not match schema arity {expected}")]
    ArityMismatch {
        /// Columns in the schema.
        expected: usize,
        /// Values in the tuple.
        actual: usize,
    },
    /// A value cannot be stored in its column.
    #[error("column \"{column}\" expects {expected}, got {actual}")]
    TypeMismatch {
        /// Column name.
        column: String,
        /// Declared column type.
        expected: DataType,
        /// Type of the offending value.
        actual: DataType,
    },
    /// Null written to a non-nullable column.
    #[error("null value not allowed in column \"{0}\"")]
    NullNotAllowed(String),
    /// An Arrow type with no tessera counterpart.
    #[error("unsupported column type: {0}")]
    UnsupportedType(String),
}

/// A reference to a column, optionally qualified by its table/alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Table name or alias, if written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    /// Simple column name.
    pub name: String,
}

impl ColumnRef {
    /// Unqualified reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    /// Reference restricted to columns carrying `qualifier`.
    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    /// Parse `name` or `qualifier.name`. The qualifier is everything before the
    /// last dot so `db.table.col` keeps `db.table` as qualifier.
    pub fn parse(reference: &str) -> Self {
        match reference.rsplit_once('.') {
            Some((qualifier, name)) if !qualifier.is_empty() => Self::qualified(qualifier, name),
            _ => Self::new(reference),
        }
    }

    /// Whether the reference names a qualifier.
    pub fn has_qualifier(&self) -> bool {
        self.qualifier.is_some()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{qualifier}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// One column of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Simple name.
    pub name: String,
    /// Owning table or alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    /// Value type.
    pub data_type: DataType,
    /// Whether the column accepts [`Datum::Null`].
    pub nullable: bool,
}

impl Column {
    /// Unqualified column.
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
            data_type,
            nullable,
        }
    }

    /// Attach a qualifier.
    pub fn with_qualifier(self, qualifier: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            ..self
        }
    }

    /// Fully qualified reference to this column.
    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef {
            qualifier: self.qualifier.clone(),
            name: self.name.clone(),
        }
    }

    fn arrow_field(&self) -> Field {
        let field = Field::new(&self.name, self.data_type.to_arrow(), self.nullable);
        match &self.qualifier {
            Some(qualifier) => field.with_metadata(HashMap::from([(
                QUALIFIER_METADATA_KEY.to_string(),
                qualifier.clone(),
            )])),
            None => field,
        }
    }
}

/// Ordered column definitions. A column's id is its 0-based position and never
/// changes for the lifetime of the schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Schema over `columns`; ids follow their order.
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns in id order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column with the given id.
    pub fn column(&self, id: usize) -> Option<&Column> {
        self.columns.get(id)
    }

    /// Resolve a reference to a column id.
    ///
    /// Qualified references must match both qualifier and name. Unqualified
    /// references match on the simple name alone, so two qualified columns
    /// sharing a name make the unqualified form ambiguous.
    pub fn column_id(&self, reference: &ColumnRef) -> Result<usize, SchemaError> {
        let mut matched = None;
        let mut matches = 0;
        for (id, column) in self.columns.iter().enumerate() {
            let hit = column.name == reference.name
                && match &reference.qualifier {
                    Some(qualifier) => column.qualifier.as_deref() == Some(qualifier.as_str()),
                    None => true,
                };
            if hit {
                matched.get_or_insert(id);
                matches += 1;
            }
        }
        match (matched, matches) {
            (Some(id), 1) => Ok(id),
            _ => Err(SchemaError::AmbiguousOrUnknownColumn {
                column: reference.to_string(),
                matches,
            }),
        }
    }

    /// Resolve a column by simple name, ignoring qualifiers.
    pub fn column_id_by_name(&self, name: &str) -> Result<usize, SchemaError> {
        self.column_id(&ColumnRef::new(name))
    }

    /// A schema holding the named columns in the given order.
    pub fn project(&self, references: &[ColumnRef]) -> Result<Schema, SchemaError> {
        references
            .iter()
            .map(|reference| Ok(self.columns[self.column_id(reference)?].clone()))
            .collect::<Result<Vec<_>, _>>()
            .map(Schema::new)
    }

    /// For each column of `target`, the id of the same column in `self`.
    ///
    /// Used by scanners to honor a pruned or reordered view of a table.
    pub fn projection_of(&self, target: &Schema) -> Result<Vec<usize>, SchemaError> {
        target
            .columns
            .iter()
            .map(|column| self.column_id(&column.column_ref()))
            .collect()
    }

    /// Check that `tuple` can be stored under this schema.
    pub fn validate(&self, tuple: &Tuple) -> Result<(), SchemaError> {
        if tuple.len() != self.columns.len() {
            return Err(SchemaError::ArityMismatch {
                expected: self.columns.len(),
                actual: tuple.len(),
            });
        }
        for (column, datum) in self.columns.iter().zip(tuple.values()) {
            match datum.data_type() {
                None if !column.nullable => {
                    return Err(SchemaError::NullNotAllowed(column.name.clone()))
                }
                None => {}
                Some(actual) if !accepts(column.data_type, datum) => {
                    return Err(SchemaError::TypeMismatch {
                        column: column.name.clone(),
                        expected: column.data_type,
                        actual,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Arrow view of this schema. Qualifiers travel in field metadata.
    pub fn to_arrow_schema(&self) -> Arc<ArrowSchema> {
        Arc::new(ArrowSchema::new(
            self.columns
                .iter()
                .map(Column::arrow_field)
                .collect::<Vec<_>>(),
        ))
    }

    /// Inverse of [`Schema::to_arrow_schema`].
    pub fn from_arrow_schema(schema: &ArrowSchema) -> Result<Self, SchemaError> {
        schema
            .fields()
            .iter()
            .map(|field| {
                let column = Column::new(
                    field.name().clone(),
                    DataType::try_from(field.data_type())?,
                    field.is_nullable(),
                );
                Ok(match field.metadata().get(QUALIFIER_METADATA_KEY) {
                    Some(qualifier) => column.with_qualifier(qualifier.clone()),
                    None => column,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Schema::new)
    }
}

// Narrower values widen into wider columns of the same family.
fn accepts(column: DataType, datum: &Datum) -> bool {
    matches!(
        (column, datum),
        (DataType::Boolean, Datum::Boolean(_))
            | (DataType::Int32, Datum::Int32(_))
            | (DataType::Int64, Datum::Int32(_) | Datum::Int64(_))
            | (DataType::Float32, Datum::Float32(_))
            | (DataType::Float64, Datum::Float32(_) | Datum::Float64(_))
            | (DataType::Text, Datum::Text(_))
            | (DataType::Binary, Datum::Binary(_))
    )
}

impl FromIterator<Column> for Schema {
    fn from_iter<T: IntoIterator<Item = Column>>(iter: T) -> Self {
        Schema::new(iter.into_iter().collect())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (id, column) in self.columns.iter().enumerate() {
            if id > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", column.column_ref(), column.data_type)?;
            if !column.nullable {
                f.write_str(" not null")?;
            }
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Int32, false).with_qualifier("orders"),
            Column::new("id", DataType::Int32, false).with_qualifier("lineitem"),
            Column::new("price", DataType::Float64, true).with_qualifier("lineitem"),
            Column::new("comment", DataType::Text, true),
        ])
    }

    #[test]
    fn qualified_reference_resolves_exactly() {
        let schema = join_schema();
        assert_eq!(
            schema.column_id(&ColumnRef::qualified("lineitem", "id")),
            Ok(1)
        );
        assert_eq!(schema.column_id(&ColumnRef::parse("orders.id")), Ok(0));
    }

    #[test]
    fn unqualified_reference_resolves_by_simple_name() {
        let schema = join_schema();
        assert_eq!(schema.column_id(&ColumnRef::new("price")), Ok(2));
        assert_eq!(schema.column_id_by_name("comment"), Ok(3));
    }

    #[test]
    fn ambiguous_and_unknown_references_fail() {
        let schema = join_schema();
        assert_eq!(
            schema.column_id(&ColumnRef::new("id")),
            Err(SchemaError::AmbiguousOrUnknownColumn {
                column: "id".into(),
                matches: 2,
            })
        );
        assert_eq!(
            schema.column_id(&ColumnRef::qualified("orders", "price")),
            Err(SchemaError::AmbiguousOrUnknownColumn {
                column: "orders.price".into(),
                matches: 0,
            })
        );
    }

    #[test]
    fn projection_maps_target_columns() {
        let schema = join_schema();
        let pruned = schema
            .project(&[ColumnRef::new("comment"), ColumnRef::parse("orders.id")])
            .unwrap();
        assert_eq!(pruned.len(), 2);
        assert_eq!(schema.projection_of(&pruned).unwrap(), vec![3, 0]);
    }

    #[test]
    fn validate_checks_arity_types_and_nulls() {
        let schema = Schema::new(vec![
            Column::new("id", DataType::Int64, false),
            Column::new("score", DataType::Float64, true),
        ]);
        assert!(schema
            .validate(&Tuple::new(vec![Datum::Int32(1), Datum::Null]))
            .is_ok());
        assert!(matches!(
            schema.validate(&Tuple::new(vec![Datum::Int64(1)])),
            Err(SchemaError::ArityMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            schema.validate(&Tuple::new(vec![Datum::Null, Datum::Null])),
            Err(SchemaError::NullNotAllowed(_))
        ));
        assert!(matches!(
            schema.validate(&Tuple::new(vec![Datum::Int64(1), Datum::from("x")])),
            Err(SchemaError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn arrow_schema_keeps_qualifiers() {
        let schema = join_schema();
        let arrow = schema.to_arrow_schema();
        assert_eq!(arrow.fields().len(), 4);
        assert_eq!(Schema::from_arrow_schema(&arrow).unwrap(), schema);
    }

    #[test]
    fn display_lists_columns() {
        let schema = Schema::new(vec![
            Column::new("id", DataType::Int32, false),
            Column::new("name", DataType::Text, true).with_qualifier("t"),
        ]);
        assert_eq!(schema.to_string(), "(id int4 not null, t.name text)");
    }
}
