//! Type registry: UBX scalar types, rational scale factors and their
//! little-endian wire encoding.
//!
//! Every UBX payload scalar is one of:
//!
//! - an unsigned or signed integer of 1..=8 bytes (`U1`, `I4`, `X2`, ...),
//! - an IEEE-754 float (`R4`, `R8`),
//! - a raw byte blob of any non-zero length (`U3`, `U40`, `C30`, ...), never
//!   interpreted numerically.
//!
//! A [`FixedPoint`] pairs an integer type of at most [`MAX_FIXED_WIDTH`] bytes
//! with a [`Scale`]; the application value is `raw × scale`.

use crate::value::Value;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Unsigned,
    Signed,
    Float,
    Bytes,
}

/// A scalar storage type: kind plus width in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalarType {
    kind: ScalarKind,
    width: usize,
}

impl ScalarType {
    pub const U1: ScalarType = ScalarType { kind: ScalarKind::Unsigned, width: 1 };
    pub const U2: ScalarType = ScalarType { kind: ScalarKind::Unsigned, width: 2 };
    pub const U4: ScalarType = ScalarType { kind: ScalarKind::Unsigned, width: 4 };
    pub const U8: ScalarType = ScalarType { kind: ScalarKind::Unsigned, width: 8 };
    pub const I1: ScalarType = ScalarType { kind: ScalarKind::Signed, width: 1 };
    pub const I2: ScalarType = ScalarType { kind: ScalarKind::Signed, width: 2 };
    pub const I4: ScalarType = ScalarType { kind: ScalarKind::Signed, width: 4 };
    pub const I8: ScalarType = ScalarType { kind: ScalarKind::Signed, width: 8 };
    pub const R4: ScalarType = ScalarType { kind: ScalarKind::Float, width: 4 };
    pub const R8: ScalarType = ScalarType { kind: ScalarKind::Float, width: 8 };

    /// Returns `None` when `width` is not legal for `kind`.
    pub fn new(kind: ScalarKind, width: usize) -> Option<Self> {
        let legal = match kind {
            ScalarKind::Unsigned | ScalarKind::Signed => (1..=8).contains(&width),
            ScalarKind::Float => width == 4 || width == 8,
            ScalarKind::Bytes => width >= 1,
        };
        legal.then_some(ScalarType { kind, width })
    }

    pub fn unsigned(width: usize) -> Option<Self> {
        Self::new(ScalarKind::Unsigned, width)
    }

    pub fn signed(width: usize) -> Option<Self> {
        Self::new(ScalarKind::Signed, width)
    }

    pub fn float(width: usize) -> Option<Self> {
        Self::new(ScalarKind::Float, width)
    }

    pub fn bytes(width: usize) -> Option<Self> {
        Self::new(ScalarKind::Bytes, width)
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind, ScalarKind::Unsigned | ScalarKind::Signed)
    }

    /// Storage capacity in bits.
    pub fn bits(&self) -> u32 {
        (self.width * 8) as u32
    }

    /// Inclusive raw range of an integer type.
    fn range(&self) -> (i128, i128) {
        let bits = self.bits();
        match self.kind {
            ScalarKind::Signed => (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1),
            _ => (0, (1i128 << bits) - 1),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScalarKind::Unsigned => write!(f, "U{}", self.width),
            ScalarKind::Signed => write!(f, "I{}", self.width),
            ScalarKind::Float => write!(f, "R{}", self.width),
            ScalarKind::Bytes => write!(f, "bytes[{}]", self.width),
        }
    }
}

/// Rational scale factor `num / den`, kept in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scale {
    num: i64,
    den: u64,
}

impl Scale {
    pub fn new(num: i64, den: u64) -> Option<Self> {
        if num == 0 || num == i64::MIN || den == 0 {
            return None;
        }
        let g = gcd(num.unsigned_abs(), den);
        Some(Scale {
            num: num / g as i64,
            den: den / g,
        })
    }

    /// `2^exp`, e.g. `Scale::pow2(-8)` for 1/256.
    pub fn pow2(exp: i32) -> Option<Self> {
        match exp {
            0..=62 => Scale::new(1i64 << exp, 1),
            -63..=-1 => Scale::new(1, 1u64 << (-exp)),
            _ => None,
        }
    }

    /// Parse `2^-8`, `1/100`, `0.01` or `1e-7`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(exp) = s.strip_prefix("2^") {
            let exp = exp.trim_matches(|c| c == '(' || c == ')');
            return Scale::pow2(exp.parse().ok()?);
        }
        if let Some((num, den)) = s.split_once('/') {
            return Scale::new(num.trim().parse().ok()?, den.trim().parse().ok()?);
        }
        parse_decimal(s)
    }

    pub fn num(&self) -> i64 {
        self.num
    }

    pub fn den(&self) -> u64 {
        self.den
    }

    pub fn factor(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Raw stored integer to application value.
    pub fn apply(&self, raw: i128) -> f64 {
        raw as f64 * self.num as f64 / self.den as f64
    }

    /// Application value to raw integer, rounding half away from zero.
    pub fn unapply(&self, value: f64) -> f64 {
        (value * self.den as f64 / self.num as f64).round()
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn parse_decimal(s: &str) -> Option<Scale> {
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (mantissa, exp) = match s.find(['e', 'E']) {
        Some(i) => (&s[..i], s[i + 1..].parse::<i32>().ok()?),
        None => (s, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() || !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = format!("{int_part}{frac_part}");
    let mut num: i64 = digits.parse().ok()?;
    let mut den: u64 = 10u64.checked_pow(frac_part.len() as u32)?;
    if exp >= 0 {
        num = num.checked_mul(10i64.checked_pow(exp as u32)?)?;
    } else {
        den = den.checked_mul(10u64.checked_pow(exp.unsigned_abs())?)?;
    }
    Scale::new(if negative { -num } else { num }, den)
}

/// Widest raw integer behind a fixed-point field. Any 48-bit raw value comes
/// back unchanged from `f64` through `raw × scale` and `value / scale`.
pub const MAX_FIXED_WIDTH: usize = 6;

/// Integer type with a scale factor applied on read and removed on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedPoint {
    raw: ScalarType,
    scale: Scale,
}

impl FixedPoint {
    /// Returns `None` unless `raw` is an integer type no wider than
    /// [`MAX_FIXED_WIDTH`] bytes.
    pub fn new(raw: ScalarType, scale: Scale) -> Option<Self> {
        (raw.is_integer() && raw.width <= MAX_FIXED_WIDTH).then_some(FixedPoint { raw, scale })
    }

    pub fn raw(&self) -> ScalarType {
        self.raw
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} * {}", self.raw, self.scale)
    }
}

/// Leaf read/write failure; the codec adds message, field and offset context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScalarError {
    #[error("need {needed} byte(s) at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("expected {expected}, got {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("value {value} out of range for {ty}")]
    OutOfRange { value: String, ty: ScalarType },
    #[error("blob of {found} byte(s) for a {expected}-byte field")]
    BlobLength { expected: usize, found: usize },
    #[error("{0} is not an integer type")]
    NotInteger(ScalarType),
}

fn take<'b>(ty: &ScalarType, buf: &'b [u8], offset: usize) -> Result<&'b [u8], ScalarError> {
    let available = buf.len().saturating_sub(offset);
    if available < ty.width {
        return Err(ScalarError::Truncated {
            offset,
            needed: ty.width,
            available,
        });
    }
    Ok(&buf[offset..offset + ty.width])
}

fn integer_of(ty: &ScalarType, bytes: &[u8]) -> Result<i128, ScalarError> {
    match ty.kind {
        ScalarKind::Unsigned => Ok(LittleEndian::read_uint(bytes, ty.width) as i128),
        ScalarKind::Signed => Ok(LittleEndian::read_int(bytes, ty.width) as i128),
        _ => Err(ScalarError::NotInteger(*ty)),
    }
}

/// Read one scalar at `offset`. Returns the value and the bytes consumed.
pub fn read(ty: &ScalarType, buf: &[u8], offset: usize) -> Result<(Value, usize), ScalarError> {
    let bytes = take(ty, buf, offset)?;
    let value = match ty.kind {
        ScalarKind::Unsigned => {
            let raw = LittleEndian::read_uint(bytes, ty.width);
            match ty.width {
                1 => Value::U8(raw as u8),
                2 => Value::U16(raw as u16),
                4 => Value::U32(raw as u32),
                _ => Value::U64(raw),
            }
        }
        ScalarKind::Signed => {
            let raw = LittleEndian::read_int(bytes, ty.width);
            match ty.width {
                1 => Value::I8(raw as i8),
                2 => Value::I16(raw as i16),
                4 => Value::I32(raw as i32),
                _ => Value::I64(raw),
            }
        }
        ScalarKind::Float if ty.width == 4 => Value::Float(LittleEndian::read_f32(bytes)),
        ScalarKind::Float => Value::Double(LittleEndian::read_f64(bytes)),
        ScalarKind::Bytes => Value::Bytes(bytes.to_vec()),
    };
    Ok((value, ty.width))
}

/// Read the raw integer behind an integer type (bitfield storage, fixed-point).
pub fn read_raw(ty: &ScalarType, buf: &[u8], offset: usize) -> Result<i128, ScalarError> {
    integer_of(ty, take(ty, buf, offset)?)
}

/// Read a fixed-point field as `Value::Double(raw × scale)`.
pub fn read_fixed(fp: &FixedPoint, buf: &[u8], offset: usize) -> Result<(Value, usize), ScalarError> {
    let raw = read_raw(&fp.raw, buf, offset)?;
    Ok((Value::Double(fp.scale.apply(raw)), fp.raw.width))
}

/// Append one scalar. Returns the bytes appended.
pub fn write(ty: &ScalarType, value: &Value, out: &mut Vec<u8>) -> Result<usize, ScalarError> {
    match ty.kind {
        ScalarKind::Unsigned | ScalarKind::Signed => {
            let raw = match (value.as_u64(), value.as_i64()) {
                (Some(u), _) => u as i128,
                (None, Some(i)) => i as i128,
                (None, None) => {
                    return Err(ScalarError::WrongType {
                        expected: "integer",
                        found: value.kind(),
                    })
                }
            };
            write_raw(ty, raw, out)?;
        }
        ScalarKind::Float => {
            let x = match value {
                Value::Float(x) => *x as f64,
                Value::Double(x) => *x,
                other => {
                    return Err(ScalarError::WrongType {
                        expected: "float",
                        found: other.kind(),
                    })
                }
            };
            if ty.width == 4 {
                let mut buf = [0u8; 4];
                LittleEndian::write_f32(&mut buf, x as f32);
                out.extend_from_slice(&buf);
            } else {
                let mut buf = [0u8; 8];
                LittleEndian::write_f64(&mut buf, x);
                out.extend_from_slice(&buf);
            }
        }
        ScalarKind::Bytes => {
            let b = value.as_bytes().ok_or(ScalarError::WrongType {
                expected: "bytes",
                found: value.kind(),
            })?;
            if b.len() != ty.width {
                return Err(ScalarError::BlobLength {
                    expected: ty.width,
                    found: b.len(),
                });
            }
            out.extend_from_slice(b);
        }
    }
    Ok(ty.width)
}

/// Append a raw integer after checking it fits the type.
pub fn write_raw(ty: &ScalarType, raw: i128, out: &mut Vec<u8>) -> Result<usize, ScalarError> {
    if !ty.is_integer() {
        return Err(ScalarError::NotInteger(*ty));
    }
    let (min, max) = ty.range();
    if raw < min || raw > max {
        return Err(ScalarError::OutOfRange {
            value: raw.to_string(),
            ty: *ty,
        });
    }
    let mut buf = [0u8; 8];
    match ty.kind {
        ScalarKind::Signed => LittleEndian::write_int(&mut buf, raw as i64, ty.width),
        _ => LittleEndian::write_uint(&mut buf, raw as u64, ty.width),
    }
    out.extend_from_slice(&buf[..ty.width]);
    Ok(ty.width)
}

/// Append a fixed-point value: `round(value / scale)`, ties away from zero.
pub fn write_fixed(fp: &FixedPoint, value: &Value, out: &mut Vec<u8>) -> Result<usize, ScalarError> {
    let x = value.as_real().ok_or(ScalarError::WrongType {
        expected: "number",
        found: value.kind(),
    })?;
    if !x.is_finite() {
        return Err(ScalarError::OutOfRange {
            value: x.to_string(),
            ty: fp.raw,
        });
    }
    let raw = fp.scale.unapply(x);
    write_raw(&fp.raw, raw as i128, out).map_err(|e| match e {
        ScalarError::OutOfRange { ty, .. } => ScalarError::OutOfRange {
            value: x.to_string(),
            ty,
        },
        other => other,
    })
}

/// Append `width` zero bytes (a field the caller left out).
pub fn write_zero(ty: &ScalarType, out: &mut Vec<u8>) -> usize {
    out.resize(out.len() + ty.width, 0);
    ty.width
}
