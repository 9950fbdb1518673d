use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use bson::Bson;

/// Position of a BSON type in the canonical sort order:
///
/// `MinKey < Null < Numbers < String < Document < Array < Binary < ObjectId < Boolean`
/// `< DateTime < Timestamp < RegularExpression < MaxKey`
///
/// Deprecated variants (`Undefined`, `Symbol`, `DbPointer`...), JavaScript code and decimals have
/// no defined position.
fn type_rank(value: &Bson) -> Option<u8> {
    let rank = match value {
        Bson::MinKey => 0,
        Bson::Null => 1,
        Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) => 2,
        Bson::String(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 12,
        _ => return None,
    };
    Some(rank)
}

#[derive(Copy, Clone)]
enum Number {
    Int(i64),
    Float(f64),
}

fn as_number(value: &Bson) -> Option<Number> {
    match value {
        Bson::Int32(x) => Some(Number::Int(*x as i64)),
        Bson::Int64(x) => Some(Number::Int(*x)),
        Bson::Double(x) => Some(Number::Float(*x)),
        _ => None,
    }
}

/// NaN sorts before every other number and equals itself.
fn cmp_floats(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

fn cmp_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.cmp(&y),
        (Number::Int(x), Number::Float(y)) => cmp_floats(x as f64, y),
        (Number::Float(x), Number::Int(y)) => cmp_floats(x, y as f64),
        (Number::Float(x), Number::Float(y)) => cmp_floats(x, y),
    }
}

/// First non equal ordering of the element-wise comparisons, the shortest sequence first.
fn lexicographic<I>(orderings: I, len_a: usize, len_b: usize) -> Option<Ordering>
where
    I: IntoIterator<Item = Option<Ordering>>,
{
    for ordering in orderings {
        match ordering? {
            Ordering::Equal => {}
            other => return Some(other),
        }
    }
    Some(len_a.cmp(&len_b))
}

/// Compares two values in the canonical BSON order: first by type rank, then by a type
/// specific rule (numbers across their representations, arrays element by element, documents
/// key then value).
///
/// Returns `None` when a value, or one nested in it, has no defined order.
pub fn try_cmp_bson(a: &Bson, b: &Bson) -> Option<Ordering> {
    let (rank_a, rank_b) = (type_rank(a)?, type_rank(b)?);
    if rank_a != rank_b {
        return Some(rank_a.cmp(&rank_b));
    }

    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return Some(cmp_numbers(x, y));
    }

    let ordering = match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        (Bson::Binary(x), Bson::Binary(y)) => {
            (u8::from(x.subtype), &x.bytes).cmp(&(u8::from(y.subtype), &y.bytes))
        }
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => {
            (&x.pattern, &x.options).cmp(&(&y.pattern, &y.options))
        }
        (Bson::Array(x), Bson::Array(y)) => {
            return lexicographic(x.iter().zip(y).map(|(a, b)| try_cmp_bson(a, b)), x.len(), y.len());
        }
        (Bson::Document(x), Bson::Document(y)) => {
            let entries = x.iter().zip(y).map(|((key_a, a), (key_b, b))| match key_a.cmp(key_b) {
                Ordering::Equal => try_cmp_bson(a, b),
                other => Some(other),
            });
            return lexicographic(entries, x.len(), y.len());
        }
        // MinKey, MaxKey and Null
        _ => Ordering::Equal,
    };
    Some(ordering)
}

/// Returns `true` if the value, including every value nested in it, has a defined order.
pub fn is_comparable(value: &Bson) -> bool {
    try_cmp_bson(value, value).is_some()
}

/// Equality consistent with [`try_cmp_bson`]: `5 == 5.0` and `NaN == NaN`. Values without a
/// defined order are compared structurally.
pub fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match try_cmp_bson(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Hashes a value consistently with [`bson_eq`].
pub fn bson_hash<H: Hasher>(value: &Bson, state: &mut H) {
    type_rank(value).hash(state);
    if let Some(number) = as_number(value) {
        let x = match number {
            Number::Int(x) => x as f64,
            Number::Float(x) => x,
        };
        // -0.0 == 0.0
        let canonical = if x.is_nan() { f64::NAN } else if x == 0.0 { 0.0 } else { x };
        canonical.to_bits().hash(state);
        return;
    }

    match value {
        Bson::String(s) => s.hash(state),
        Bson::Boolean(b) => b.hash(state),
        Bson::DateTime(d) => d.timestamp_millis().hash(state),
        Bson::ObjectId(id) => id.bytes().hash(state),
        Bson::Timestamp(t) => (t.time, t.increment).hash(state),
        Bson::Binary(b) => b.bytes.hash(state),
        Bson::RegularExpression(r) => (&r.pattern, &r.options).hash(state),
        Bson::Array(values) => {
            values.len().hash(state);
            values.iter().for_each(|v| bson_hash(v, state));
        }
        Bson::Document(doc) => {
            for (key, v) in doc {
                key.hash(state);
                bson_hash(v, state);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId, spec::BinarySubtype, Binary, DateTime};
    use std::collections::hash_map::DefaultHasher;
    use std::cmp::Ordering::*;

    fn hash_of(value: &Bson) -> u64 {
        let mut hasher = DefaultHasher::new();
        bson_hash(value, &mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_ascending_sequence() {
        let binary = |subtype, bytes: &[u8]| Bson::Binary(Binary { subtype, bytes: bytes.to_vec() });
        let sorted = vec![
            Bson::MinKey,
            Bson::Null,
            Bson::Double(f64::NAN),
            Bson::Int64(-3),
            Bson::Double(2.5),
            Bson::Int32(3),
            Bson::String("apple".into()),
            Bson::String("banana".into()),
            Bson::Document(doc! { "a": 1 }),
            Bson::Document(doc! { "a": 2 }),
            Bson::Document(doc! { "b": 1 }),
            Bson::Array(vec![Bson::Int32(1)]),
            Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]),
            binary(BinarySubtype::Generic, &[1, 2]),
            binary(BinarySubtype::Generic, &[1, 3]),
            binary(BinarySubtype::Uuid, &[0]),
            Bson::ObjectId(ObjectId::parse_str("000000000000000000000000").unwrap()),
            Bson::ObjectId(ObjectId::parse_str("ffffffffffffffffffffffff").unwrap()),
            Bson::Boolean(false),
            Bson::Boolean(true),
            Bson::DateTime(DateTime::from_millis(1_000)),
            Bson::DateTime(DateTime::from_millis(2_000)),
            Bson::MaxKey,
        ];

        for (i, a) in sorted.iter().enumerate() {
            assert_eq!(try_cmp_bson(a, a), Some(Equal), "{:?}", a);
            for b in &sorted[i + 1..] {
                assert_eq!(try_cmp_bson(a, b), Some(Less), "{:?} < {:?}", a, b);
                assert_eq!(try_cmp_bson(b, a), Some(Greater), "{:?} > {:?}", b, a);
            }
        }
    }

    #[test]
    fn test_numbers_across_representations() {
        assert_eq!(try_cmp_bson(&Bson::Int32(5), &Bson::Int64(5)), Some(Equal));
        assert_eq!(try_cmp_bson(&Bson::Int32(5), &Bson::Double(5.0)), Some(Equal));
        assert_eq!(try_cmp_bson(&Bson::Double(3.1), &Bson::Int32(4)), Some(Less));
        assert_eq!(try_cmp_bson(&Bson::Double(f64::NAN), &Bson::Int32(-100)), Some(Less));
    }

    #[test]
    fn test_values_without_order() {
        let code = Bson::JavaScriptCode("x".to_string());
        assert_eq!(try_cmp_bson(&code, &Bson::Int32(1)), None);
        assert!(!is_comparable(&Bson::Array(vec![Bson::Int32(1), code.clone()])));
        assert!(is_comparable(&Bson::Array(vec![Bson::Int32(1), Bson::Null])));
        assert!(bson_eq(&code, &code));
    }

    #[test]
    fn test_equality_and_hash() {
        let equal_pairs = [
            (Bson::Int32(5), Bson::Double(5.0)),
            (Bson::Int64(5), Bson::Int32(5)),
            (Bson::Double(f64::NAN), Bson::Double(f64::NAN)),
            (Bson::Double(-0.0), Bson::Int32(0)),
            (
                Bson::Array(vec![Bson::Int32(1), Bson::Double(2.0)]),
                Bson::Array(vec![Bson::Int64(1), Bson::Int32(2)]),
            ),
        ];
        for (a, b) in &equal_pairs {
            assert!(bson_eq(a, b), "{:?} == {:?}", a, b);
            assert_eq!(hash_of(a), hash_of(b), "{:?} and {:?}", a, b);
        }

        assert!(!bson_eq(&Bson::Int32(5), &Bson::Double(5.5)));
        assert!(!bson_eq(&Bson::Int32(1), &Bson::String("1".into())));
    }
}
