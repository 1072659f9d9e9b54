//! # Encoded Sort Keys
//!
//! Comparing one packed byte string is cheaper at execution than comparing
//! several typed columns. When every sort key has a type with an
//! order-preserving byte encoding, the sort operator can replace the trailing
//! keys with a single synthetic `ENCODE_SORTKEY(k1, d1, k2, d2, ...)` expression.
//!
//! ## Encoding
//!
//! Each key contributes a NULL marker byte followed by its value bytes:
//!
//! - signed integers and dates: big-endian with the sign bit flipped;
//! - unsigned integers: big-endian;
//! - floats: IEEE-754 bits, all bits flipped for negatives and only the sign bit
//!   for positives (NaN sorts last, `-0.0` equals `0.0`);
//! - strings and binaries: bytes with `0x00` escaped as `0x00 0xFF`, closed by
//!   `0x00 0x00`.
//!
//! Every value encoding is prefix-free, so a descending key is encoded by
//! complementing its value bytes. The NULL marker is written after the
//! complement so that NULL placement follows the key's direction as declared.
//! Unsigned comparison of two encoded rows then reproduces the requested order.

use optx_plan::config::SessionContext;
use optx_plan::expr::{ExprArena, ItemType};
use optx_plan::order::{Direction, OrderKey};
use optx_plan::recursion::RecursionGuard;
use optx_plan::types::{ScalarValue, TypeClass};
use optx_plan::Result;
use tracing::trace;

/// Whether values of this type class have an order-preserving byte encoding.
pub fn is_encodable_type(class: TypeClass) -> bool {
    matches!(
        class,
        TypeClass::Null
            | TypeClass::Int
            | TypeClass::UInt
            | TypeClass::Float
            | TypeClass::Decimal
            | TypeClass::DateTime
            | TypeClass::String
    )
}

/// Whether every key can take part in an encoded sort key.
pub fn can_encode_sort_keys(arena: &ExprArena, keys: &[OrderKey]) -> Result<bool> {
    for key in keys {
        if !is_encodable_type(arena.node(key.expr)?.type_class()) {
            return Ok(false);
        }
    }
    Ok(!keys.is_empty())
}

fn direction_code(direction: Direction) -> i64 {
    match direction {
        Direction::AscNullsFirst => 0,
        Direction::AscNullsLast => 1,
        Direction::DescNullsFirst => 2,
        Direction::DescNullsLast => 3,
    }
}

/// Build and formalize `ENCODE_SORTKEY` over `keys[start..]`.
///
/// The arguments are pairs of key expression and direction code. The result is
/// an ascending key.
pub fn create_encode_sortkey_expr(
    arena: &mut ExprArena,
    keys: &[OrderKey],
    start: usize,
    session: &SessionContext,
    guard: &RecursionGuard,
) -> Result<OrderKey> {
    let encode = arena.create(ItemType::FunSysEncodeSortKey)?;
    for key in keys.iter().skip(start) {
        let code = arena.add_const(ScalarValue::Int64(direction_code(key.direction)))?;
        arena.add_param_expr(encode, key.expr)?;
        arena.add_param_expr(encode, code)?;
    }
    arena.formalize(encode, session, guard)?;
    trace!(
        "Created encoded sort key {} over {} key(s)",
        encode,
        keys.len().saturating_sub(start)
    );
    Ok(OrderKey::asc(encode))
}

const NULL_LOW: u8 = 0x00;
const NULL_HIGH: u8 = 0x01;

fn encode_value_bytes(value: &ScalarValue, out: &mut Vec<u8>) {
    match value {
        ScalarValue::Null => {}
        ScalarValue::Bool(v) => out.push(u8::from(*v)),
        ScalarValue::Int64(v) => out.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes()),
        ScalarValue::UInt64(v) => out.extend_from_slice(&v.to_be_bytes()),
        ScalarValue::Float64(v) => {
            let f = if v.0.is_nan() {
                f64::NAN
            } else if v.0 == 0.0 {
                0.0
            } else {
                v.0
            };
            let bits = f.to_bits();
            let bits = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
            out.extend_from_slice(&bits.to_be_bytes());
        }
        ScalarValue::Date(v) => out.extend_from_slice(&((*v as u32) ^ (1 << 31)).to_be_bytes()),
        ScalarValue::Utf8(s) => encode_bytes(s.as_bytes(), out),
        ScalarValue::Binary(b) => encode_bytes(b, out),
    }
}

fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == 0x00 {
            out.push(0xFF);
        }
    }
    out.extend_from_slice(&[0x00, 0x00]);
}

/// Append the encoding of one key value to `out`.
pub fn encode_key(value: &ScalarValue, direction: Direction, out: &mut Vec<u8>) {
    let null_marker = if direction.nulls_first() {
        NULL_LOW
    } else {
        NULL_HIGH
    };
    if value.is_null() {
        out.push(null_marker);
        return;
    }
    out.push(if direction.nulls_first() {
        NULL_HIGH
    } else {
        NULL_LOW
    });
    let start = out.len();
    encode_value_bytes(value, out);
    if !direction.is_ascending() {
        for b in &mut out[start..] {
            *b = !*b;
        }
    }
}

/// Encode a whole row of key values.
pub fn encode_row(values: &[(ScalarValue, Direction)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (value, direction) in values {
        encode_key(value, *direction, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use optx_plan::expr::ColumnRef;
    use optx_plan::types::{CollationType, DataType, ResultType};
    use proptest::prelude::*;
    use std::cmp::Ordering;

    fn compare_key(a: &ScalarValue, b: &ScalarValue, direction: Direction) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if direction.nulls_first() => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if direction.nulls_first() => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = match (a, b) {
                    (ScalarValue::Int64(x), ScalarValue::Int64(y)) => x.cmp(y),
                    (ScalarValue::Float64(x), ScalarValue::Float64(y)) => x.cmp(y),
                    (ScalarValue::Utf8(x), ScalarValue::Utf8(y)) => x.cmp(y),
                    _ => unreachable!(),
                };
                if direction.is_ascending() {
                    ord
                } else {
                    ord.reverse()
                }
            }
        }
    }

    fn direction() -> impl Strategy<Value = Direction> {
        prop_oneof![
            Just(Direction::AscNullsFirst),
            Just(Direction::AscNullsLast),
            Just(Direction::DescNullsFirst),
            Just(Direction::DescNullsLast),
        ]
    }

    fn int_value() -> impl Strategy<Value = ScalarValue> {
        prop_oneof![
            1 => Just(ScalarValue::Null),
            6 => any::<i64>().prop_map(ScalarValue::Int64),
        ]
    }

    fn str_value() -> impl Strategy<Value = ScalarValue> {
        prop_oneof![
            1 => Just(ScalarValue::Null),
            6 => "[a-c\\x00]{0,4}".prop_map(ScalarValue::Utf8),
        ]
    }

    fn float_value() -> impl Strategy<Value = ScalarValue> {
        prop_oneof![
            1 => Just(ScalarValue::Null),
            6 => any::<f64>().prop_map(|f| ScalarValue::Float64(f.into())),
        ]
    }

    proptest! {
        #[test]
        fn prop_encoding_preserves_order(
            a in (int_value(), str_value(), float_value()),
            b in (int_value(), str_value(), float_value()),
            dirs in (direction(), direction(), direction()),
        ) {
            let row_a = [(a.0.clone(), dirs.0), (a.1.clone(), dirs.1), (a.2.clone(), dirs.2)];
            let row_b = [(b.0.clone(), dirs.0), (b.1.clone(), dirs.1), (b.2.clone(), dirs.2)];
            let expected = compare_key(&a.0, &b.0, dirs.0)
                .then_with(|| compare_key(&a.1, &b.1, dirs.1))
                .then_with(|| compare_key(&a.2, &b.2, dirs.2));
            prop_assert_eq!(encode_row(&row_a).cmp(&encode_row(&row_b)), expected);
        }
    }

    #[test]
    fn test_descending_nulls_placement() {
        let null = encode_row(&[(ScalarValue::Null, Direction::DescNullsFirst)]);
        let one = encode_row(&[(ScalarValue::Int64(1), Direction::DescNullsFirst)]);
        let two = encode_row(&[(ScalarValue::Int64(2), Direction::DescNullsFirst)]);
        assert!(null < two && two < one);
    }

    #[test]
    fn test_eligibility() {
        let mut arena = ExprArena::new();
        let mut col = |name: &str, rt: ResultType| {
            arena
                .add_column(
                    ColumnRef {
                        table_id: 1,
                        column_id: 0,
                        table_name: "t".into(),
                        column_name: name.into(),
                    },
                    rt,
                )
                .unwrap()
        };
        let a = col("a", ResultType::new(DataType::BigInt));
        let s = col(
            "s",
            ResultType::string(DataType::Varchar, 8, CollationType::Utf8mb4Bin),
        );
        let doc = col("doc", ResultType::new(DataType::Json));
        let keys = [OrderKey::asc(a), OrderKey::desc(s)];
        assert!(can_encode_sort_keys(&arena, &keys).unwrap());
        assert!(!can_encode_sort_keys(&arena, &[OrderKey::asc(a), OrderKey::asc(doc)]).unwrap());
        assert!(!can_encode_sort_keys(&arena, &[]).unwrap());

        let enc = create_encode_sortkey_expr(
            &mut arena,
            &keys,
            1,
            &SessionContext::default(),
            &RecursionGuard::default(),
        )
        .unwrap();
        let node = arena.node(enc.expr).unwrap();
        assert_eq!(node.item_type(), ItemType::FunSysEncodeSortKey);
        assert!(node.is_formalized());
        // One (key, direction) pair for the single key after position 1.
        assert_eq!(arena.children(enc.expr).unwrap().len(), 2);
        assert_eq!(arena.children(enc.expr).unwrap()[0], s);
    }
}
