//! Order-preserving index key encoding.
//!
//! Index keys are byte strings whose lexicographic order matches the query
//! engine's value ordering: missing < null < false < true < numbers <
//! strings < everything else. Numbers are encoded as sign-flipped IEEE-754
//! big-endian doubles so byte order equals numeric order.

use crate::value::Value;

const TAG_MISSING: u8 = 0x00;
const TAG_NULL: u8 = 0x01;
const TAG_FALSE: u8 = 0x02;
const TAG_TRUE: u8 = 0x03;
const TAG_NUMBER: u8 = 0x04;
const TAG_STRING: u8 = 0x05;
const TAG_OTHER: u8 = 0x06;

/// Encodes a value (or its absence) as a sortable key component.
#[must_use]
pub(crate) fn encode_component(value: Option<&Value>) -> Vec<u8> {
    let Some(value) = value else {
        return vec![TAG_MISSING];
    };
    match value {
        Value::Null => vec![TAG_NULL],
        Value::Bool(false) => vec![TAG_FALSE],
        Value::Bool(true) => vec![TAG_TRUE],
        Value::Int(n) => {
            #[allow(clippy::cast_precision_loss)]
            encode_number(*n as f64)
        }
        Value::Float(f) => encode_number(*f),
        Value::String(s) => {
            let mut buf = Vec::with_capacity(1 + s.len());
            buf.push(TAG_STRING);
            buf.extend_from_slice(s.as_bytes());
            buf
        }
        other => {
            // Arrays, objects, and blobs sort after scalars; their CBOR
            // encoding gives a stable (if arbitrary) order among themselves.
            let mut buf = vec![TAG_OTHER];
            let _ = ciborium::into_writer(other, &mut buf);
            buf
        }
    }
}

fn encode_number(f: f64) -> Vec<u8> {
    let bits = f.to_bits();
    // Flip all bits for negatives, just the sign bit for positives: total
    // order by unsigned byte comparison.
    let sortable = if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits ^ (1 << 63)
    };
    let mut buf = Vec::with_capacity(9);
    buf.push(TAG_NUMBER);
    buf.extend_from_slice(&sortable.to_be_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: &Value) -> Vec<u8> {
        encode_component(Some(v))
    }

    #[test]
    fn type_ordering() {
        let missing = encode_component(None);
        let null = key(&Value::Null);
        let fals = key(&Value::Bool(false));
        let tru = key(&Value::Bool(true));
        let num = key(&Value::Int(0));
        let string = key(&Value::String("a".into()));

        assert!(missing < null);
        assert!(null < fals);
        assert!(fals < tru);
        assert!(tru < num);
        assert!(num < string);
    }

    #[test]
    fn numeric_ordering() {
        let values = [-1000.5, -1.0, -0.5, 0.0, 0.25, 1.0, 7.0, 1e9];
        let keys: Vec<Vec<u8>> = values.iter().map(|f| key(&Value::Float(*f))).collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn int_and_float_encode_identically() {
        assert_eq!(key(&Value::Int(42)), key(&Value::Float(42.0)));
    }

    #[test]
    fn string_ordering_is_bytewise() {
        assert!(key(&Value::String("apple".into())) < key(&Value::String("banana".into())));
        assert!(key(&Value::String("a".into())) < key(&Value::String("aa".into())));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn finite_f64() -> impl Strategy<Value = f64> {
        (-1e12f64..1e12).prop_map(|f| if f == 0.0 { 0.0 } else { f })
    }

    proptest! {
        #[test]
        fn number_encoding_preserves_order(a in finite_f64(), b in finite_f64()) {
            let ka = encode_component(Some(&Value::Float(a)));
            let kb = encode_component(Some(&Value::Float(b)));
            prop_assert_eq!(a.partial_cmp(&b), Some(ka.cmp(&kb)));
        }

        #[test]
        fn string_encoding_preserves_order(a in "[a-z]{0,12}", b in "[a-z]{0,12}") {
            let ka = encode_component(Some(&Value::String(a.clone())));
            let kb = encode_component(Some(&Value::String(b.clone())));
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }
    }
}
