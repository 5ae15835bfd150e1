//! Encode/decode UBX payloads from message schemas.
//!
//! Fields are processed strictly in schema order with a running byte offset.
//! Scalars and fixed-point fields go straight through the [type registry](crate::types);
//! bitfields read one storage word and fan out into their members; repeating groups
//! resolve their element count and recurse into the element layout.
//!
//! Encoding is the exact inverse. Fields missing from the value map are written as
//! zero, and a group counted by a sibling field writes its own length into that field.

use crate::bitfield::Bitfield;
use crate::group::{self, CountRule, GroupError, RepeatingGroup};
use crate::schema::{FieldDescriptor, FieldKind, MessageSchema, SchemaError};
use crate::table::{Direction, SchemaTable};
use crate::types::{self, ScalarError};
use crate::value::{Fields, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("unknown message type: {key}")]
    UnknownMessageType { key: String },
    #[error("{message}.{field}: truncated at offset {offset}: need {needed} byte(s), {available} available")]
    TruncatedBuffer {
        message: String,
        field: String,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("{message}: {leftover} unconsumed byte(s) at offset {offset}")]
    SchemaMismatch {
        message: String,
        offset: usize,
        leftover: usize,
    },
    #[error("{message}.{field}: count field {count_field} missing")]
    MissingCountField {
        message: String,
        field: String,
        count_field: String,
    },
    #[error("{message}.{field}: {remaining} byte(s) at offset {offset} is not a multiple of element size {element_size}")]
    MisalignedGroup {
        message: String,
        field: String,
        offset: usize,
        remaining: usize,
        element_size: usize,
    },
    #[error("{message}.{field}: {reason}")]
    InvalidValue {
        message: String,
        field: String,
        reason: String,
    },
}

/// Schema lookup plus encode/decode over one [`SchemaTable`].
#[derive(Debug, Clone, Copy)]
pub struct Codec<'t> {
    table: &'t SchemaTable,
}

impl<'t> Codec<'t> {
    pub fn new(table: &'t SchemaTable) -> Self {
        Codec { table }
    }

    pub fn table(&self) -> &'t SchemaTable {
        self.table
    }

    /// Decode one payload of message `name` travelling in `direction`.
    pub fn decode(&self, direction: Direction, name: &str, bytes: &[u8]) -> Result<Fields, CodecError> {
        let schema = self.table.lookup(direction, name)?;
        decode(schema, bytes)
    }

    /// Encode one payload of message `name` travelling in `direction`.
    pub fn encode(&self, direction: Direction, name: &str, values: &Fields) -> Result<Vec<u8>, CodecError> {
        let schema = self.table.lookup(direction, name)?;
        encode(schema, values)
    }
}

impl Codec<'static> {
    /// Codec over the process-wide builtin table.
    pub fn builtin() -> Result<Self, SchemaError> {
        Ok(Codec::new(SchemaTable::builtin()?))
    }
}

/// Decode `bytes` with `schema`. The whole buffer must be consumed.
pub fn decode(schema: &MessageSchema, bytes: &[u8]) -> Result<Fields, CodecError> {
    tracing::trace!(message = schema.name(), len = bytes.len(), "decode");
    let mut decoder = Decoder {
        message: schema.name(),
        bytes,
        pos: 0,
    };
    let result = decoder.fields(schema.fields(), "").and_then(|values| {
        if decoder.pos == bytes.len() {
            Ok(values)
        } else {
            Err(CodecError::SchemaMismatch {
                message: schema.name().to_string(),
                offset: decoder.pos,
                leftover: bytes.len() - decoder.pos,
            })
        }
    });
    if let Err(e) = &result {
        tracing::debug!(error = %e, "decode failed");
    }
    result
}

/// Encode `values` with `schema`.
pub fn encode(schema: &MessageSchema, values: &Fields) -> Result<Vec<u8>, CodecError> {
    tracing::trace!(message = schema.name(), "encode");
    let mut encoder = Encoder {
        message: schema.name(),
        out: Vec::with_capacity(schema.min_size()),
    };
    match encoder.fields(schema.fields(), values, "") {
        Ok(()) => Ok(encoder.out),
        Err(e) => {
            tracing::debug!(error = %e, "encode failed");
            Err(e)
        }
    }
}

fn scalar_error(message: &str, field: String, e: ScalarError) -> CodecError {
    match e {
        ScalarError::Truncated { offset, needed, available } => CodecError::TruncatedBuffer {
            message: message.to_string(),
            field,
            offset,
            needed,
            available,
        },
        other => CodecError::InvalidValue {
            message: message.to_string(),
            field,
            reason: other.to_string(),
        },
    }
}

fn invalid(message: &str, field: String, reason: String) -> CodecError {
    CodecError::InvalidValue {
        message: message.to_string(),
        field,
        reason,
    }
}

struct Decoder<'a> {
    message: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn fields(&mut self, fields: &[FieldDescriptor], prefix: &str) -> Result<Fields, CodecError> {
        let mut out = Fields::with_capacity(fields.len());
        for f in fields {
            match &f.kind {
                FieldKind::Scalar(ty) => {
                    let (v, n) = types::read(ty, self.bytes, self.pos)
                        .map_err(|e| scalar_error(self.message, format!("{prefix}{}", f.name), e))?;
                    self.pos += n;
                    out.insert(f.name.clone(), v);
                }
                FieldKind::FixedPoint(fp) => {
                    let (v, n) = types::read_fixed(fp, self.bytes, self.pos)
                        .map_err(|e| scalar_error(self.message, format!("{prefix}{}", f.name), e))?;
                    self.pos += n;
                    out.insert(f.name.clone(), v);
                }
                FieldKind::Bitfield(bf) => self.bitfield(bf, &f.name, prefix, &mut out)?,
                FieldKind::Group(g) => {
                    let items = self.group(g, &f.name, prefix, &out)?;
                    out.insert(f.name.clone(), Value::List(items));
                }
            }
        }
        Ok(out)
    }

    fn bitfield(&mut self, bf: &Bitfield, name: &str, prefix: &str, out: &mut Fields) -> Result<(), CodecError> {
        let storage = bf.storage();
        let raw = types::read_raw(&storage, self.bytes, self.pos)
            .map_err(|e| scalar_error(self.message, format!("{prefix}{name}"), e))?;
        self.pos += storage.width();
        for (member, v) in bf.unpack(raw as u64) {
            out.insert(member.name.clone(), Value::unsigned_for_bits(member.bits, v));
        }
        Ok(())
    }

    fn group(
        &mut self,
        g: &RepeatingGroup,
        name: &str,
        prefix: &str,
        siblings: &Fields,
    ) -> Result<Vec<Value>, CodecError> {
        let remaining = self.bytes.len() - self.pos;
        let count = group::resolve_count(g.count(), siblings, remaining, g.element_size()).map_err(|e| match e {
            GroupError::MissingCountField(count_field) => CodecError::MissingCountField {
                message: self.message.to_string(),
                field: format!("{prefix}{name}"),
                count_field,
            },
            GroupError::Misaligned { remaining, element_size } => CodecError::MisalignedGroup {
                message: self.message.to_string(),
                field: format!("{prefix}{name}"),
                offset: self.pos,
                remaining,
                element_size,
            },
        })?;
        // A corrupt count must not drive a huge allocation before the reads fail.
        let mut items = Vec::with_capacity(count.min(remaining));
        for i in 0..count {
            let element = self.fields(g.elements(), &format!("{prefix}{name}[{i}]."))?;
            items.push(Value::Struct(element));
        }
        Ok(items)
    }
}

struct Encoder<'a> {
    message: &'a str,
    out: Vec<u8>,
}

impl Encoder<'_> {
    fn fields(&mut self, fields: &[FieldDescriptor], values: &Fields, prefix: &str) -> Result<(), CodecError> {
        let counts = derived_counts(fields, values);
        for f in fields {
            let path = || format!("{prefix}{}", f.name);
            match &f.kind {
                FieldKind::Scalar(ty) => {
                    let written = match (counts.get(f.name.as_str()), values.get(&f.name)) {
                        (Some(n), _) => types::write(ty, &Value::U64(*n), &mut self.out),
                        (None, Some(v)) => types::write(ty, v, &mut self.out),
                        (None, None) => Ok(types::write_zero(ty, &mut self.out)),
                    };
                    written.map_err(|e| scalar_error(self.message, path(), e))?;
                }
                FieldKind::FixedPoint(fp) => {
                    let written = match values.get(&f.name) {
                        Some(v) => types::write_fixed(fp, v, &mut self.out),
                        None => Ok(types::write_zero(&fp.raw(), &mut self.out)),
                    };
                    written.map_err(|e| scalar_error(self.message, path(), e))?;
                }
                FieldKind::Bitfield(bf) => self.bitfield(bf, &f.name, values, &counts, prefix)?,
                FieldKind::Group(g) => self.group(g, &f.name, values.get(&f.name), prefix)?,
            }
        }
        Ok(())
    }

    fn bitfield(
        &mut self,
        bf: &Bitfield,
        name: &str,
        values: &Fields,
        counts: &HashMap<&str, u64>,
        prefix: &str,
    ) -> Result<(), CodecError> {
        let mut members: HashMap<&str, u64> = HashMap::with_capacity(bf.members().len());
        for m in bf.members() {
            let v = match (counts.get(m.name.as_str()), values.get(&m.name)) {
                (Some(&n), _) => {
                    // Derived counts are not caller input: refuse to truncate them.
                    if m.bits < 64 && n >> m.bits != 0 {
                        return Err(invalid(
                            self.message,
                            format!("{prefix}{}", m.name),
                            format!("group length {n} does not fit in {} bit(s)", m.bits),
                        ));
                    }
                    n
                }
                (None, Some(v)) => v.as_u64().or_else(|| v.as_i64().map(|i| i as u64)).ok_or_else(|| {
                    invalid(
                        self.message,
                        format!("{prefix}{}", m.name),
                        format!("expected integer, got {}", v.kind()),
                    )
                })?,
                (None, None) => 0,
            };
            members.insert(m.name.as_str(), v);
        }
        let raw = bf.pack(|name| members.get(name).copied().unwrap_or(0));
        types::write_raw(&bf.storage(), raw as i128, &mut self.out)
            .map_err(|e| scalar_error(self.message, format!("{prefix}{name}"), e))?;
        Ok(())
    }

    fn group(&mut self, g: &RepeatingGroup, name: &str, value: Option<&Value>, prefix: &str) -> Result<(), CodecError> {
        let items = match value {
            Some(v) => v.as_list().ok_or_else(|| {
                invalid(self.message, format!("{prefix}{name}"), format!("expected list, got {}", v.kind()))
            })?,
            None => &[],
        };
        if let CountRule::Fixed(n) = g.count() {
            if value.is_none() {
                let empty = Fields::new();
                for i in 0..*n {
                    self.fields(g.elements(), &empty, &format!("{prefix}{name}[{i}]."))?;
                }
                return Ok(());
            }
            if items.len() != *n {
                return Err(invalid(
                    self.message,
                    format!("{prefix}{name}"),
                    format!("expected {n} element(s), got {}", items.len()),
                ));
            }
        }
        for (i, item) in items.iter().enumerate() {
            let element_prefix = format!("{prefix}{name}[{i}].");
            let element = item.as_struct().ok_or_else(|| {
                invalid(
                    self.message,
                    element_prefix.trim_end_matches('.').to_string(),
                    format!("expected struct, got {}", item.kind()),
                )
            })?;
            self.fields(g.elements(), element, &element_prefix)?;
        }
        Ok(())
    }
}

/// Count fields whose value comes from the length of a group in the same scope.
fn derived_counts<'f>(fields: &'f [FieldDescriptor], values: &Fields) -> HashMap<&'f str, u64> {
    fields
        .iter()
        .filter_map(|f| match &f.kind {
            FieldKind::Group(g) => match g.count() {
                CountRule::Field(count_field) => {
                    let len = values.get(&f.name).and_then(Value::as_list).map_or(0, <[Value]>::len);
                    Some((count_field.as_str(), len as u64))
                }
                _ => None,
            },
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FixedPoint, Scale, ScalarType};

    fn u1(name: &str) -> FieldDescriptor {
        FieldDescriptor::scalar(name, ScalarType::U1)
    }

    fn counted() -> MessageSchema {
        MessageSchema::new(
            "TEST-COUNTED",
            vec![u1("n"), FieldDescriptor::group("group", CountRule::Field("n".to_string()), vec![u1("x")])],
        )
    }

    #[test]
    fn decode_two_u4() {
        let schema = MessageSchema::new(
            "TEST-AB",
            vec![FieldDescriptor::scalar("a", ScalarType::U4), FieldDescriptor::scalar("b", ScalarType::U4)],
        );
        let values = decode(&schema, &[1, 0, 0, 0, 2, 0, 0, 0]).expect("decode");
        assert_eq!(values.get("a"), Some(&Value::U32(1)));
        assert_eq!(values.get("b"), Some(&Value::U32(2)));
    }

    #[test]
    fn decode_counted_group() {
        let values = decode(&counted(), &[3, 10, 20, 30]).expect("decode");
        assert_eq!(values.get("n").and_then(Value::as_u64), Some(3));
        let items = values.get("group").and_then(Value::as_list).expect("list");
        let xs: Vec<u64> = items
            .iter()
            .map(|i| i.as_struct().and_then(|m| m.get("x")).and_then(Value::as_u64).expect("x"))
            .collect();
        assert_eq!(xs, vec![10, 20, 30]);
    }

    #[test]
    fn encode_writes_group_length_into_count_field() {
        let mut values = Fields::new();
        values.insert("n".to_string(), Value::U8(99));
        let items = (1u8..=4)
            .map(|x| Value::Struct(Fields::from([("x".to_string(), Value::U8(x))])))
            .collect();
        values.insert("group".to_string(), Value::List(items));
        assert_eq!(encode(&counted(), &values).expect("encode"), vec![4, 1, 2, 3, 4]);
    }

    #[test]
    fn leftover_bytes_are_a_schema_mismatch() {
        let schema = MessageSchema::new("TEST", vec![u1("a")]);
        assert_eq!(
            decode(&schema, &[1, 2]),
            Err(CodecError::SchemaMismatch { message: "TEST".to_string(), offset: 1, leftover: 1 })
        );
    }

    #[test]
    fn truncation_reports_field_path_and_offset() {
        let err = decode(&counted(), &[3, 10, 20]).expect_err("short");
        assert_eq!(
            err,
            CodecError::TruncatedBuffer {
                message: "TEST-COUNTED".to_string(),
                field: "group[2].x".to_string(),
                offset: 3,
                needed: 1,
                available: 0,
            }
        );
    }

    #[test]
    fn remainder_group_rejects_partial_element() {
        let schema = MessageSchema::new(
            "TEST",
            vec![FieldDescriptor::group("group", CountRule::Remainder, vec![FieldDescriptor::scalar("k", ScalarType::U4)])],
        );
        assert!(matches!(
            decode(&schema, &[0; 9]),
            Err(CodecError::MisalignedGroup { remaining: 9, element_size: 4, offset: 0, .. })
        ));
        let values = decode(&schema, &[0; 8]).expect("decode");
        assert_eq!(values.get("group").and_then(Value::as_list).map(<[Value]>::len), Some(2));
    }

    #[test]
    fn missing_values_encode_as_zero() {
        let schema = MessageSchema::new(
            "TEST",
            vec![
                FieldDescriptor::scalar("a", ScalarType::U2),
                FieldDescriptor::scalar("r", ScalarType::bytes(3).expect("u3")),
                FieldDescriptor::fixed_point(
                    "v",
                    FixedPoint::new(ScalarType::I2, Scale::new(1, 10).expect("scale")).expect("fp"),
                ),
                FieldDescriptor::bitfield("flags", Bitfield::new(ScalarType::U1, [("f", 3)])),
                FieldDescriptor::group("h", CountRule::Fixed(2), vec![u1("c")]),
            ],
        );
        assert_eq!(encode(&schema, &Fields::new()).expect("encode"), vec![0; 10]);
    }

    #[test]
    fn fixed_group_length_must_match() {
        let schema = MessageSchema::new("TEST", vec![FieldDescriptor::group("h", CountRule::Fixed(2), vec![u1("c")])]);
        let values = Fields::from([("h".to_string(), Value::List(vec![Value::Struct(Fields::new())]))]);
        assert!(matches!(encode(&schema, &values), Err(CodecError::InvalidValue { field, .. }) if field == "h"));
    }

    #[test]
    fn wrong_value_type_is_rejected() {
        let schema = MessageSchema::new("TEST", vec![u1("a")]);
        let values = Fields::from([("a".to_string(), Value::Bytes(vec![1]))]);
        assert!(matches!(encode(&schema, &values), Err(CodecError::InvalidValue { .. })));
    }

    #[test]
    fn bit_member_count_is_written_from_group_length() {
        let schema = MessageSchema::new(
            "TEST",
            vec![
                FieldDescriptor::bitfield("flags", Bitfield::new(ScalarType::U1, [("valid", 1), ("num", 3)])),
                FieldDescriptor::group("group", CountRule::Field("num".to_string()), vec![u1("x")]),
            ],
        );
        let items = vec![Value::Struct(Fields::from([("x".to_string(), Value::U8(7))])); 2];
        let values = Fields::from([
            ("valid".to_string(), Value::U8(1)),
            ("group".to_string(), Value::List(items.clone())),
        ]);
        let bytes = encode(&schema, &values).expect("encode");
        assert_eq!(bytes, vec![0b0101, 7, 7]);
        let decoded = decode(&schema, &bytes).expect("decode");
        assert_eq!(decoded.get("num"), Some(&Value::U8(2)));

        let too_many = Fields::from([("group".to_string(), Value::List(vec![items[0].clone(); 8]))]);
        assert!(matches!(encode(&schema, &too_many), Err(CodecError::InvalidValue { field, .. }) if field == "num"));
    }
}
