use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::SortSpec;
use crate::record::{Schema, SchemaError, Tuple};

/// Errors raised while building or decoding a [`TupleComparator`].
#[derive(Debug, Error)]
pub enum ComparatorError {
    /// Malformed construction input, such as an empty key list.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A sort key did not resolve to exactly one column.
    #[error("sort key #{key} ({spec}) cannot be resolved: {source}")]
    AmbiguousOrUnknownColumn {
        /// Position of the offending key in the spec list.
        key: usize,
        /// The key as written.
        spec: String,
        /// Resolution failure reported by the schema.
        #[source]
        source: SchemaError,
    },
    /// The wire form could not be produced or parsed.
    #[error("comparator serialization failure: {0}")]
    Serialization(String),
}

/// A [`SortSpec`] resolved against a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompiledKey {
    /// Position of the key column in the comparator's schema.
    pub column_id: usize,
    /// Direction for non-null values.
    pub ascending: bool,
    /// Whether nulls sort before values.
    #[serde(rename = "null_first")]
    pub nulls_first: bool,
}

/// Orders tuples by a list of keys, evaluated left to right.
///
/// Immutable once built, so one instance can be shared behind an `Arc` by any
/// number of workers; all of them then agree on tie-breaks and null placement.
///
/// Equality and hashing look only at the compiled keys: two comparators built
/// from different schema objects that resolve to the same ids and flags are
/// equal.
#[derive(Debug, Clone)]
pub struct TupleComparator {
    pub(super) schema: Schema,
    pub(super) sort_specs: Vec<SortSpec>,
    pub(super) keys: Vec<CompiledKey>,
}

impl TupleComparator {
    /// Resolve `sort_specs` against `schema`.
    ///
    /// Qualified keys must match qualifier and name; unqualified keys match
    /// on the simple name. Fails with [`ComparatorError::InvalidArgument`]
    /// when no key is given and with
    /// [`ComparatorError::AmbiguousOrUnknownColumn`] naming the first key that
    /// does not resolve to exactly one column.
    pub fn new(schema: Schema, sort_specs: Vec<SortSpec>) -> Result<Self, ComparatorError> {
        if sort_specs.is_empty() {
            return Err(ComparatorError::InvalidArgument(
                "at least one sort key must be specified",
            ));
        }

        let keys = sort_specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let resolved = if spec.key.has_qualifier() {
                    schema.column_id(&spec.key)
                } else {
                    schema.column_id_by_name(&spec.key.name)
                };
                resolved
                    .map(|column_id| CompiledKey {
                        column_id,
                        ascending: spec.ascending,
                        nulls_first: spec.nulls_first,
                    })
                    .map_err(|source| ComparatorError::AmbiguousOrUnknownColumn {
                        key: index,
                        spec: spec.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            schema,
            sort_specs,
            keys,
        })
    }

    /// Schema the keys were resolved against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Keys as the planner wrote them.
    pub fn sort_specs(&self) -> &[SortSpec] {
        &self.sort_specs
    }

    /// Resolved keys, in precedence order.
    pub fn keys(&self) -> &[CompiledKey] {
        &self.keys
    }

    /// Column ids of the keys, in precedence order.
    pub fn sort_key_ids(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.keys.iter().map(|key| key.column_id)
    }

    /// Direction hint of the first key only.
    pub fn is_ascending_first_key(&self) -> bool {
        self.keys[0].ascending
    }

    /// Compare two tuples key by key.
    ///
    /// For each key: two nulls tie, a single null goes first or last as the
    /// key says regardless of direction, and two values compare in the key's
    /// direction. The first non-equal key decides. Never fails; slots beyond a
    /// tuple's arity read as null.
    pub fn compare(&self, left: &Tuple, right: &Tuple) -> Ordering {
        for key in &self.keys {
            let id = key.column_id;
            match (left.is_blank_or_null(id), right.is_blank_or_null(id)) {
                (true, true) => continue,
                (true, false) => {
                    return if key.nulls_first {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    };
                }
                (false, true) => {
                    return if key.nulls_first {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    };
                }
                (false, false) => {}
            }

            let ordering = left.value_at(id).cmp(right.value_at(id));
            let ordering = if key.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable in-place sort.
    pub fn sort(&self, tuples: &mut [Tuple]) {
        tuples.sort_by(|left, right| self.compare(left, right));
    }

    /// Whether `tuples` is in non-decreasing order.
    pub fn is_sorted(&self, tuples: &[Tuple]) -> bool {
        tuples
            .windows(2)
            .all(|pair| self.compare(&pair[0], &pair[1]) != Ordering::Greater)
    }
}

impl PartialEq for TupleComparator {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl Eq for TupleComparator {}

impl Hash for TupleComparator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.keys.hash(state);
    }
}

impl fmt::Display for TupleComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, key) in self.keys.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(
                f,
                "SortKeyId={},Asc={},NullFirst={}",
                key.column_id, key.ascending, key.nulls_first
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::hash_map::DefaultHasher,
        sync::Arc,
        thread,
    };

    use super::*;
    use crate::{
        record::{Column, DataType},
        tuple,
    };

    fn scores_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Int32, false),
            Column::new("name", DataType::Text, true),
            Column::new("score", DataType::Float64, true),
        ])
    }

    fn hash_of(comparator: &TupleComparator) -> u64 {
        let mut hasher = DefaultHasher::new();
        comparator.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn empty_sort_specs_are_rejected() {
        let err = TupleComparator::new(scores_schema(), vec![]).unwrap_err();
        assert!(matches!(err, ComparatorError::InvalidArgument(_)));
    }

    #[test]
    fn unresolvable_key_names_the_offending_index() {
        let err = TupleComparator::new(
            scores_schema(),
            vec![SortSpec::column("id"), SortSpec::column("missing")],
        )
        .unwrap_err();
        match err {
            ComparatorError::AmbiguousOrUnknownColumn { key, spec, .. } => {
                assert_eq!(key, 1);
                assert_eq!(spec, "missing asc nulls last");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn qualified_keys_resolve_exactly() {
        let schema = Schema::new(vec![
            Column::new("id", DataType::Int32, false).with_qualifier("a"),
            Column::new("id", DataType::Int32, false).with_qualifier("b"),
        ]);
        let comparator =
            TupleComparator::new(schema.clone(), vec![SortSpec::column("b.id")]).unwrap();
        assert_eq!(comparator.sort_key_ids().collect::<Vec<_>>(), vec![1]);
        assert!(TupleComparator::new(schema, vec![SortSpec::column("id")]).is_err());
    }

    #[test]
    fn descending_score_then_ascending_id() {
        let comparator = TupleComparator::new(
            scores_schema(),
            vec![
                SortSpec::column("score").desc().nulls_last(),
                SortSpec::column("id").asc().nulls_first(),
            ],
        )
        .unwrap();

        let a = tuple![1_i32, "x", 90.0_f64];
        let b = tuple![2_i32, "y", None::<f64>];
        let c = tuple![3_i32, "z", 90.0_f64];
        let mut rows = vec![b.clone(), c.clone(), a.clone()];
        comparator.sort(&mut rows);

        assert_eq!(rows, vec![a, c, b]);
        assert!(comparator.is_sorted(&rows));
        assert!(!comparator.is_ascending_first_key());
    }

    #[test]
    fn null_placement_ignores_values() {
        let first = TupleComparator::new(
            scores_schema(),
            vec![SortSpec::column("score").nulls_first()],
        )
        .unwrap();
        let last = TupleComparator::new(scores_schema(), vec![SortSpec::column("score")]).unwrap();

        let null = tuple![1_i32, "n", None::<f64>];
        for value in [f64::NEG_INFINITY, -1.0, 0.0, f64::MAX, f64::NAN] {
            let other = tuple![2_i32, "v", value];
            assert_eq!(first.compare(&null, &other), Ordering::Less);
            assert_eq!(first.compare(&other, &null), Ordering::Greater);
            assert_eq!(last.compare(&null, &other), Ordering::Greater);
            assert_eq!(last.compare(&other, &null), Ordering::Less);
        }
        assert_eq!(first.compare(&null, &null), Ordering::Equal);
    }

    #[test]
    fn later_keys_only_break_ties() {
        let comparator = TupleComparator::new(
            scores_schema(),
            vec![SortSpec::column("name").desc(), SortSpec::column("id")],
        )
        .unwrap();
        let left = tuple![1_i32, "same", 1.0_f64];
        let right = tuple![2_i32, "same", 1.0_f64];
        assert_eq!(comparator.compare(&left, &right), Ordering::Less);

        let equal_keys = tuple![1_i32, "same", 7.0_f64];
        assert_eq!(comparator.compare(&left, &equal_keys), Ordering::Equal);
    }

    #[test]
    fn structural_equality_ignores_schema_identity() {
        let renamed = Schema::new(vec![
            Column::new("pk", DataType::Int64, false),
            Column::new("label", DataType::Text, true),
            Column::new("rank", DataType::Float32, true),
        ]);
        let a = TupleComparator::new(scores_schema(), vec![SortSpec::column("score").desc()])
            .unwrap();
        let b = TupleComparator::new(renamed, vec![SortSpec::column("rank").desc()]).unwrap();
        let c = TupleComparator::new(scores_schema(), vec![SortSpec::column("score")]).unwrap();

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
    }

    #[test]
    fn display_lists_keys_in_order() {
        let comparator = TupleComparator::new(
            scores_schema(),
            vec![
                SortSpec::column("score").desc(),
                SortSpec::column("id").nulls_first(),
            ],
        )
        .unwrap();
        assert_eq!(
            comparator.to_string(),
            "SortKeyId=2,Asc=false,NullFirst=false, SortKeyId=0,Asc=true,NullFirst=true"
        );
    }

    #[test]
    fn shared_across_threads() {
        let comparator = Arc::new(
            TupleComparator::new(scores_schema(), vec![SortSpec::column("id")]).unwrap(),
        );
        let handles = (0..4_i32)
            .map(|worker| {
                let comparator = comparator.clone();
                thread::spawn(move || {
                    let mut rows = (0..100_i32)
                        .rev()
                        .map(|i| tuple![i * 4 + worker, "w", 0.0_f64])
                        .collect::<Vec<_>>();
                    comparator.sort(&mut rows);
                    comparator.is_sorted(&rows)
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
