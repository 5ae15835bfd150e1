//! Format decoded values for display, in schema order.
//!
//! ```text
//! <UBX(set CFG-RATE, measRate=1000, navRate=1, timeRef=0)>
//! ```

use crate::schema::{FieldDescriptor, FieldKind, MessageSchema};
use crate::table::MessageKey;
use crate::value::{Fields, Value};

/// One-line summary of a decoded message. Fields absent from `values` are skipped.
pub fn format_message(key: &MessageKey, schema: &MessageSchema, values: &Fields) -> String {
    let body = format_fields(schema.fields(), values);
    if body.is_empty() {
        format!("<UBX({key})>")
    } else {
        format!("<UBX({key}, {body})>")
    }
}

fn format_fields(fields: &[FieldDescriptor], values: &Fields) -> String {
    let mut parts = Vec::new();
    for f in fields {
        match &f.kind {
            // bit members live in the enclosing map
            FieldKind::Bitfield(bf) => {
                for m in bf.members() {
                    if let Some(v) = values.get(&m.name) {
                        parts.push(format!("{}={}", m.name, format_value(v)));
                    }
                }
            }
            FieldKind::Group(g) => {
                if let Some(items) = values.get(&f.name).and_then(Value::as_list) {
                    let rendered: Vec<String> = items
                        .iter()
                        .map(|item| match item.as_struct() {
                            Some(element) => format!("{{{}}}", format_fields(g.elements(), element)),
                            None => format_value(item),
                        })
                        .collect();
                    parts.push(format!("{}=[{}]", f.name, rendered.join(", ")));
                }
            }
            FieldKind::Scalar(_) | FieldKind::FixedPoint(_) => {
                if let Some(v) = values.get(&f.name) {
                    parts.push(format!("{}={}", f.name, format_value(v)));
                }
            }
        }
    }
    parts.join(", ")
}

/// Scalar as a plain number, blobs as `0x`-prefixed hex.
pub fn format_value(v: &Value) -> String {
    match v {
        Value::U8(x) => x.to_string(),
        Value::U16(x) => x.to_string(),
        Value::U32(x) => x.to_string(),
        Value::U64(x) => x.to_string(),
        Value::I8(x) => x.to_string(),
        Value::I16(x) => x.to_string(),
        Value::I32(x) => x.to_string(),
        Value::I64(x) => x.to_string(),
        Value::Float(x) => x.to_string(),
        Value::Double(x) => x.to_string(),
        Value::Bytes(b) => format!("0x{}", hex_string(b)),
        Value::Struct(m) => {
            let mut keys: Vec<&String> = m.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .filter_map(|k| m.get(k).map(|v| format!("{k}={}", format_value(v))))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect()
}
