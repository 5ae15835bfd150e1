//! Integration tests: build tables from schema source, encode/decode, error reporting.

use std::collections::HashMap;
use ubxschema::{
    decode, encode, Codec, CodecError, Direction, Fields, MessageKey, SchemaTable, Value,
};

const SIMPLE: &str = r#"
get message TEST-AB { a: U4; b: U4; }

get message TEST-COUNTED {
  n: U1;
  group[n] { x: U1; }
}

get message TEST-TAIL {
  version: U1;
  group[*] { key: U4; }
}

set message TEST-SCALED {
  value: I4 * 2^-8;
  cents: U2 * 1/100;
}

set message TEST-BITS {
  flags: X2 { lo: 2; mid: 1; hi: 13; }
}
"#;

fn table() -> SchemaTable {
    SchemaTable::builder()
        .load_str(SIMPLE)
        .and_then(|b| b.build())
        .expect("build table")
}

fn element(name: &str, v: Value) -> Value {
    Value::Struct(HashMap::from([(name.to_string(), v)]))
}

#[test]
fn test_decode_two_scalars() {
    let table = table();
    let codec = Codec::new(&table);
    let fields = codec
        .decode(Direction::Get, "TEST-AB", &[0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00])
        .expect("decode");
    assert_eq!(fields.len(), 2);
    assert_eq!(fields.get("a"), Some(&Value::U32(1)));
    assert_eq!(fields.get("b"), Some(&Value::U32(2)));
}

#[test]
fn test_decode_bitfield_members_flattened() {
    let table = table();
    let codec = Codec::new(&table);
    let fields = codec.decode(Direction::Set, "TEST-BITS", &[0b101, 0x00]).expect("decode");
    assert_eq!(fields.get("lo").and_then(Value::as_u64), Some(1));
    assert_eq!(fields.get("mid").and_then(Value::as_u64), Some(1));
    assert_eq!(fields.get("hi").and_then(Value::as_u64), Some(0));
    assert!(fields.get("flags").is_none());
}

#[test]
fn test_decode_counted_group() {
    let table = table();
    let codec = Codec::new(&table);
    let fields = codec
        .decode(Direction::Get, "TEST-COUNTED", &[0x03, 0x0a, 0x14, 0x1e])
        .expect("decode");
    assert_eq!(fields.get("n"), Some(&Value::U8(3)));
    assert_eq!(
        fields.get("group"),
        Some(&Value::List(vec![
            element("x", Value::U8(10)),
            element("x", Value::U8(20)),
            element("x", Value::U8(30)),
        ]))
    );
}

#[test]
fn test_unknown_message_type() {
    let table = table();
    let codec = Codec::new(&table);
    let err = codec.decode(Direction::Get, "ZZZ-ZZZ", &[]).expect_err("unknown");
    assert_eq!(err, CodecError::UnknownMessageType { key: "get ZZZ-ZZZ".to_string() });
    let err = codec.encode(Direction::Poll, "TEST-AB", &Fields::new()).expect_err("wrong direction");
    assert!(matches!(err, CodecError::UnknownMessageType { .. }));
}

#[test]
fn test_round_trip_values() {
    let table = table();
    let codec = Codec::new(&table);
    let mut values = Fields::new();
    values.insert("version".to_string(), Value::U8(1));
    values.insert(
        "group".to_string(),
        Value::List(vec![element("key", Value::U32(0x1065_0001)), element("key", Value::U32(0x2091_0007))]),
    );
    let bytes = codec.encode(Direction::Get, "TEST-TAIL", &values).expect("encode");
    assert_eq!(bytes.len(), 9);
    let decoded = codec.decode(Direction::Get, "TEST-TAIL", &bytes).expect("decode");
    assert_eq!(decoded, values);
}

#[test]
fn test_round_trip_bytes() {
    let table = table();
    let codec = Codec::new(&table);
    let bytes = [0x02, 0xff, 0x00, 0x7f];
    let decoded = codec.decode(Direction::Get, "TEST-COUNTED", &bytes[..3]).expect("decode");
    assert_eq!(codec.encode(Direction::Get, "TEST-COUNTED", &decoded).expect("encode"), bytes[..3].to_vec());
    // one more byte than the count covers
    let err = codec.decode(Direction::Get, "TEST-COUNTED", &bytes).expect_err("leftover");
    assert_eq!(
        err,
        CodecError::SchemaMismatch { message: "TEST-COUNTED".to_string(), offset: 3, leftover: 1 }
    );
}

#[test]
fn test_fixed_point_within_half_scale() {
    let table = table();
    let codec = Codec::new(&table);
    for x in [0.0, 1.0, -1.5, 12.3456, -1000.001, 8_000_000.2] {
        let mut values = Fields::new();
        values.insert("value".to_string(), Value::Double(x));
        values.insert("cents".to_string(), Value::Double(12.34));
        let bytes = codec.encode(Direction::Set, "TEST-SCALED", &values).expect("encode");
        let decoded = codec.decode(Direction::Set, "TEST-SCALED", &bytes).expect("decode");
        let back = decoded.get("value").and_then(Value::as_f64).expect("value");
        assert!((back - x).abs() <= 1.0 / 512.0, "{x} came back as {back}");
        let cents = decoded.get("cents").and_then(Value::as_f64).expect("cents");
        assert!((cents - 12.34).abs() <= 0.005);
    }
}

#[test]
fn test_fixed_point_out_of_range() {
    let table = table();
    let codec = Codec::new(&table);
    let mut values = Fields::new();
    values.insert("cents".to_string(), Value::Double(-1.0));
    let err = codec.encode(Direction::Set, "TEST-SCALED", &values).expect_err("negative unsigned");
    assert!(matches!(err, CodecError::InvalidValue { field, .. } if field == "cents"));
}

#[test]
fn test_integer_out_of_range_is_not_truncated() {
    let table = table();
    let codec = Codec::new(&table);
    let mut values = Fields::new();
    values.insert("a".to_string(), Value::U64(1 << 32));
    let err = codec.encode(Direction::Get, "TEST-AB", &values).expect_err("too wide");
    assert!(matches!(err, CodecError::InvalidValue { field, .. } if field == "a"));
}

#[test]
fn test_bitfield_overflowing_member_truncated() {
    let table = table();
    let codec = Codec::new(&table);
    let mut values = Fields::new();
    values.insert("lo".to_string(), Value::U8(6));
    values.insert("hi".to_string(), Value::U16(1));
    let bytes = codec.encode(Direction::Set, "TEST-BITS", &values).expect("encode");
    assert_eq!(bytes, vec![0b0000_1010, 0x00]);
}

#[test]
fn test_truncated_buffer_reports_context() {
    let table = table();
    let codec = Codec::new(&table);
    let err = codec.decode(Direction::Get, "TEST-AB", &[0x01, 0x00, 0x00, 0x00, 0x02]).expect_err("short");
    assert_eq!(
        err,
        CodecError::TruncatedBuffer {
            message: "TEST-AB".to_string(),
            field: "b".to_string(),
            offset: 4,
            needed: 4,
            available: 1,
        }
    );
}

#[test]
fn test_misaligned_remainder_group() {
    let table = table();
    let codec = Codec::new(&table);
    let err = codec.decode(Direction::Get, "TEST-TAIL", &[0x00, 1, 2, 3, 4, 5]).expect_err("partial element");
    assert_eq!(
        err,
        CodecError::MisalignedGroup {
            message: "TEST-TAIL".to_string(),
            field: "group".to_string(),
            offset: 1,
            remaining: 5,
            element_size: 4,
        }
    );
}

#[test]
fn test_nested_element_type_error_path() {
    let table = table();
    let codec = Codec::new(&table);
    let mut values = Fields::new();
    values.insert(
        "group".to_string(),
        Value::List(vec![element("x", Value::U8(1)), element("x", Value::Bytes(vec![1]))]),
    );
    let err = codec.encode(Direction::Get, "TEST-COUNTED", &values).expect_err("bad element");
    assert!(matches!(err, CodecError::InvalidValue { field, .. } if field == "group[1].x"));
}

#[test]
fn test_free_functions_match_codec() {
    let table = table();
    let schema = table.get(Direction::Get, "TEST-AB").expect("schema");
    let bytes = [9, 0, 0, 0, 8, 0, 0, 0];
    let fields = decode(schema, &bytes).expect("decode");
    assert_eq!(encode(schema, &fields).expect("encode"), bytes);
    let key = MessageKey::new(Direction::Get, "TEST-AB");
    assert_eq!(
        ubxschema::format_message(&key, schema, &fields),
        "<UBX(get TEST-AB, a=9, b=8)>"
    );
}

#[test]
fn test_concurrent_decode() {
    let table = table();
    std::thread::scope(|s| {
        for i in 0..4u8 {
            let codec = Codec::new(&table);
            s.spawn(move || {
                for _ in 0..100 {
                    let fields = codec.decode(Direction::Get, "TEST-COUNTED", &[1, i]).expect("decode");
                    assert_eq!(fields.get("group"), Some(&Value::List(vec![element("x", Value::U8(i))])));
                }
            });
        }
    });
}
