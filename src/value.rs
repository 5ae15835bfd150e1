//! Runtime values for encoding/decoding (codec representation).

use std::collections::HashMap;

/// Field name to value map for one payload (or one repeating-group element).
pub type Fields = HashMap<String, Value>;

/// A single decoded value (field, bitfield member or group).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Float(f32),
    Double(f64),
    /// Raw fixed-length blob (reserved words, character arrays, opaque data).
    Bytes(Vec<u8>),
    Struct(Fields),
    List(Vec<Value>),
}

impl Value {
    /// Smallest unsigned variant able to hold `bits` bits.
    pub fn unsigned_for_bits(bits: u32, raw: u64) -> Value {
        match bits {
            0..=8 => Value::U8(raw as u8),
            9..=16 => Value::U16(raw as u16),
            17..=32 => Value::U32(raw as u32),
            _ => Value::U64(raw),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(x) => Some(*x as u64),
            Value::U16(x) => Some(*x as u64),
            Value::U32(x) => Some(*x as u64),
            Value::U64(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I8(x) => Some(*x as i64),
            Value::I16(x) => Some(*x as i64),
            Value::I32(x) => Some(*x as i64),
            Value::I64(x) => Some(*x),
            Value::U8(x) => Some(*x as i64),
            Value::U16(x) => Some(*x as i64),
            Value::U32(x) => Some(*x as i64),
            Value::U64(x) => i64::try_from(*x).ok(),
            _ => None,
        }
    }

    /// Any numeric value widened to `f64` (integers included).
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x as f64),
            Value::Double(x) => Some(*x),
            Value::U64(x) => Some(*x as f64),
            other => other.as_i64().map(|i| i as f64),
        }
    }

    pub fn as_struct(&self) -> Option<&Fields> {
        match self {
            Value::Struct(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }

    /// Short variant name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::Float(_) => "f32",
            Value::Double(_) => "f64",
            Value::Bytes(_) => "bytes",
            Value::Struct(_) => "struct",
            Value::List(_) => "list",
        }
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => Float,
    f64 => Double,
    Vec<u8> => Bytes,
    Fields => Struct,
    Vec<Value> => List,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_values_widen_to_i64_and_not_u64() {
        assert_eq!(Value::I16(-3).as_i64(), Some(-3));
        assert_eq!(Value::I16(3).as_u64(), None);
        assert_eq!(Value::U64(u64::MAX).as_i64(), None);
    }

    #[test]
    fn as_real_accepts_integers_and_floats() {
        assert_eq!(Value::U16(7).as_real(), Some(7.0));
        assert_eq!(Value::I8(-2).as_real(), Some(-2.0));
        assert_eq!(Value::Float(0.5).as_real(), Some(0.5));
        assert_eq!(Value::Bytes(vec![1]).as_real(), None);
    }

    #[test]
    fn unsigned_for_bits_picks_narrowest_variant() {
        assert_eq!(Value::unsigned_for_bits(1, 1), Value::U8(1));
        assert_eq!(Value::unsigned_for_bits(13, 4000), Value::U16(4000));
        assert_eq!(Value::unsigned_for_bits(24, 0x00ab_cdef), Value::U32(0x00ab_cdef));
        assert_eq!(Value::unsigned_for_bits(40, 1 << 36), Value::U64(1 << 36));
    }
}
