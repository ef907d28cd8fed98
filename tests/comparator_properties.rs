use std::cmp::Ordering;

use tessera::{
    record::{Column, DataType, Datum, Schema, Tuple},
    sort::{SortSpec, TupleComparator},
};

const COLUMNS: [&str; 3] = ["a", "b", "c"];

fn schema() -> Schema {
    Schema::new(vec![
        Column::new("a", DataType::Int32, true),
        Column::new("b", DataType::Text, true),
        Column::new("c", DataType::Float64, true),
    ])
}

fn gen_datum(rng: &mut fastrand::Rng, column: usize) -> Datum {
    if rng.u8(..5) == 0 {
        return Datum::Null;
    }
    match column {
        0 => Datum::Int32(rng.i32(-3..3)),
        1 => Datum::Text(["x", "y", "z"][rng.usize(..3)].to_string()),
        _ => Datum::Float64([-1.5, 0.0, 2.25][rng.usize(..3)]),
    }
}

fn gen_tuples(rng: &mut fastrand::Rng, n: usize) -> Vec<Tuple> {
    (0..n)
        .map(|_| Tuple::new((0..COLUMNS.len()).map(|c| gen_datum(rng, c)).collect()))
        .collect()
}

fn gen_comparator(rng: &mut fastrand::Rng) -> TupleComparator {
    let mut columns = COLUMNS.to_vec();
    rng.shuffle(&mut columns);
    let keys = rng.usize(1..=COLUMNS.len());
    let specs = columns[..keys]
        .iter()
        .map(|name| {
            let spec = SortSpec::column(name);
            let spec = if rng.bool() { spec.asc() } else { spec.desc() };
            if rng.bool() {
                spec.nulls_first()
            } else {
                spec.nulls_last()
            }
        })
        .collect();
    TupleComparator::new(schema(), specs).unwrap()
}

#[test]
fn comparison_is_a_total_preorder() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..50 {
        let comparator = gen_comparator(&mut rng);
        let tuples = gen_tuples(&mut rng, 30);

        for x in &tuples {
            assert_eq!(comparator.compare(x, x), Ordering::Equal);
            for y in &tuples {
                assert_eq!(
                    comparator.compare(x, y),
                    comparator.compare(y, x).reverse(),
                    "{comparator}: {x} vs {y}"
                );
            }
        }

        let mut sorted = tuples.clone();
        comparator.sort(&mut sorted);
        assert!(comparator.is_sorted(&sorted));
        for i in 0..sorted.len() {
            for j in i + 1..sorted.len() {
                assert_ne!(
                    comparator.compare(&sorted[i], &sorted[j]),
                    Ordering::Greater,
                    "{comparator}: {} after {}",
                    sorted[i],
                    sorted[j]
                );
            }
        }
    }
}

#[test]
fn flipping_direction_reverses_non_null_order() {
    let mut rng = fastrand::Rng::with_seed(11);
    for name in COLUMNS {
        let asc = TupleComparator::new(schema(), vec![SortSpec::column(name).asc()]).unwrap();
        let desc = TupleComparator::new(schema(), vec![SortSpec::column(name).desc()]).unwrap();
        let id = schema().column_id_by_name(name).unwrap();

        let tuples = gen_tuples(&mut rng, 40);
        for x in tuples.iter().filter(|t| !t.is_blank_or_null(id)) {
            for y in tuples.iter().filter(|t| !t.is_blank_or_null(id)) {
                assert_eq!(asc.compare(x, y), desc.compare(x, y).reverse());
            }
        }
    }
}

#[test]
fn earlier_keys_take_precedence() {
    let mut rng = fastrand::Rng::with_seed(23);
    for _ in 0..50 {
        let comparator = gen_comparator(&mut rng);
        let first = comparator.sort_specs()[0].clone();
        let leading = TupleComparator::new(schema(), vec![first]).unwrap();

        let tuples = gen_tuples(&mut rng, 25);
        for x in &tuples {
            for y in &tuples {
                let by_first = leading.compare(x, y);
                if by_first != Ordering::Equal {
                    assert_eq!(comparator.compare(x, y), by_first);
                }
            }
        }
    }
}

#[test]
fn ties_on_the_first_key_defer_to_the_second() {
    let mut rng = fastrand::Rng::with_seed(29);
    for _ in 0..30 {
        let mut columns = COLUMNS.to_vec();
        rng.shuffle(&mut columns);
        let second = SortSpec::column(columns[1]);
        let second = if rng.bool() { second.desc() } else { second.asc() };
        let second = if rng.bool() {
            second.nulls_first()
        } else {
            second.nulls_last()
        };
        let second_only = TupleComparator::new(schema(), vec![second.clone()]).unwrap();
        let tuples = gen_tuples(&mut rng, 40);

        for (ascending, nulls_first) in [(true, true), (true, false), (false, true), (false, false)] {
            let first = SortSpec::column(columns[0]);
            let first = if ascending { first.asc() } else { first.desc() };
            let first = if nulls_first {
                first.nulls_first()
            } else {
                first.nulls_last()
            };
            let first_only = TupleComparator::new(schema(), vec![first.clone()]).unwrap();
            let comparator = TupleComparator::new(schema(), vec![first, second.clone()]).unwrap();

            for x in &tuples {
                for y in &tuples {
                    if first_only.compare(x, y) == Ordering::Equal {
                        assert_eq!(
                            comparator.compare(x, y),
                            second_only.compare(x, y),
                            "{comparator}: {x} vs {y}"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn null_placement_follows_each_key() {
    let mut rng = fastrand::Rng::with_seed(31);
    let tuples = gen_tuples(&mut rng, 60);
    let id = 1;
    for nulls_first in [true, false] {
        let spec = SortSpec::column("b").desc();
        let spec = if nulls_first {
            spec.nulls_first()
        } else {
            spec.nulls_last()
        };
        let comparator = TupleComparator::new(schema(), vec![spec]).unwrap();
        let mut sorted = tuples.clone();
        comparator.sort(&mut sorted);

        let nulls = sorted.iter().filter(|t| t.is_blank_or_null(id)).count();
        let (head, tail) = if nulls_first {
            sorted.split_at(nulls)
        } else {
            let (values, nulls) = sorted.split_at(sorted.len() - nulls);
            (nulls, values)
        };
        assert!(head.iter().all(|t| t.is_blank_or_null(id)));
        assert!(tail.iter().all(|t| !t.is_blank_or_null(id)));
    }
}

#[test]
fn decoded_comparator_orders_identically() {
    let mut rng = fastrand::Rng::with_seed(43);
    for _ in 0..20 {
        let comparator = gen_comparator(&mut rng);
        let decoded = TupleComparator::decode(&comparator.encode().unwrap()).unwrap();
        assert_eq!(decoded, comparator);
        assert_eq!(decoded.to_string(), comparator.to_string());

        let tuples = gen_tuples(&mut rng, 20);
        for x in &tuples {
            for y in &tuples {
                assert_eq!(decoded.compare(x, y), comparator.compare(x, y));
            }
        }
    }
}
