//! Message schemas: ordered, tagged field descriptors describing one payload layout.

use crate::bitfield::{Bitfield, BitfieldError};
use crate::group::{CountRule, RepeatingGroup};
use crate::types::{FixedPoint, ScalarKind, ScalarType};
use std::collections::HashSet;

/// Largest payload a UBX frame can carry (two-byte length field).
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Field layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarType),
    FixedPoint(FixedPoint),
    /// Members are flattened into the enclosing field map; the field name
    /// itself only appears in diagnostics.
    Bitfield(Bitfield),
    Group(RepeatingGroup),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        FieldDescriptor { name: name.into(), kind: FieldKind::Scalar(ty) }
    }

    pub fn fixed_point(name: impl Into<String>, fp: FixedPoint) -> Self {
        FieldDescriptor { name: name.into(), kind: FieldKind::FixedPoint(fp) }
    }

    pub fn bitfield(name: impl Into<String>, bf: Bitfield) -> Self {
        FieldDescriptor { name: name.into(), kind: FieldKind::Bitfield(bf) }
    }

    pub fn group(name: impl Into<String>, count: CountRule, elements: Vec<FieldDescriptor>) -> Self {
        FieldDescriptor {
            name: name.into(),
            kind: FieldKind::Group(RepeatingGroup::new(count, elements)),
        }
    }

    /// Wire size, or `None` for a variable-length group.
    pub fn fixed_size(&self) -> Option<usize> {
        match &self.kind {
            FieldKind::Scalar(ty) => Some(ty.width()),
            FieldKind::FixedPoint(fp) => Some(fp.raw().width()),
            FieldKind::Bitfield(bf) => Some(bf.storage().width()),
            FieldKind::Group(g) => g.fixed_size(),
        }
    }

    /// Fewest bytes this field can occupy; saturates instead of overflowing.
    pub fn min_size(&self) -> usize {
        match &self.kind {
            FieldKind::Group(g) => match g.count() {
                CountRule::Fixed(n) => min_size(g.elements()).saturating_mul(*n),
                _ => 0,
            },
            _ => self.fixed_size().unwrap_or(0),
        }
    }
}

/// Total wire size of `fields`, or `None` if any of them is variable or the
/// sum does not fit in `usize`.
pub fn fixed_size(fields: &[FieldDescriptor]) -> Option<usize> {
    fields.iter().try_fold(0usize, |acc, f| acc.checked_add(f.fixed_size()?))
}

/// Smallest total wire size of `fields`, saturating at `usize::MAX`.
pub fn min_size(fields: &[FieldDescriptor]) -> usize {
    fields.iter().map(FieldDescriptor::min_size).fold(0, usize::saturating_add)
}

/// Schema-authoring defects, reported once while a schema table is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{message}.{field}: invalid type {ty}")]
    InvalidType { message: String, field: String, ty: String },
    #[error("{message}.{field}: bitfield declares {declared} bits but its storage holds {capacity}")]
    BitWidthOverflow {
        message: String,
        field: String,
        declared: u32,
        capacity: u32,
    },
    #[error("{message}.{field}: bit member {member} has zero width")]
    ZeroWidthMember { message: String, field: String, member: String },
    #[error("{message}.{field}: bitfield storage {ty} is not an unsigned integer")]
    InvalidBitfieldStorage { message: String, field: String, ty: String },
    #[error("{message}: duplicate field name {field}")]
    DuplicateField { message: String, field: String },
    #[error("{message}.{field}: count field {count_field} is not an earlier unsigned field")]
    UnknownCountField {
        message: String,
        field: String,
        count_field: String,
    },
    #[error("{message}.{field}: variable-length group must be the last field")]
    GroupNotLast { message: String, field: String },
    #[error("{message}.{field}: group element must occupy at least one byte (and a fixed size under [*])")]
    UnsizedElement { message: String, field: String },
    #[error("{message}.{field}: fixed part exceeds the {MAX_PAYLOAD}-byte payload limit")]
    SizeOverflow { message: String, field: String },
    #[error("duplicate message key {key}")]
    DuplicateKey { key: String },
    #[error("alias {key} refers to unknown message {target}")]
    UnknownAliasTarget { key: String, target: String },
    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },
}

/// One message type's payload layout; field order is wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSchema {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        MessageSchema { name: name.into(), fields }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fixed_size(&self) -> Option<usize> {
        fixed_size(&self.fields)
    }

    /// Smallest valid payload: payload-counted groups contribute nothing.
    pub fn min_size(&self) -> usize {
        min_size(&self.fields)
    }

    /// Static checks: bitfield widths, unique names, count references, group
    /// placement and element sizes, payload size limit. Run once per schema
    /// when it enters a table.
    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_scope(&self.name, "", &self.fields)
    }
}

fn validate_scope(message: &str, prefix: &str, fields: &[FieldDescriptor]) -> Result<(), SchemaError> {
    let mut seen: HashSet<&str> = HashSet::new();
    // Names usable as a group count: unsigned scalars and bitfield members.
    let mut counters: HashSet<&str> = HashSet::new();
    let mut size = 0usize;

    for (i, f) in fields.iter().enumerate() {
        let path = format!("{prefix}{}", f.name);
        size = size.saturating_add(f.min_size());
        if size > MAX_PAYLOAD {
            return Err(SchemaError::SizeOverflow {
                message: message.to_string(),
                field: path,
            });
        }
        match &f.kind {
            FieldKind::Scalar(ty) => {
                claim_name(&mut seen, &f.name, message, prefix)?;
                if ty.kind() == ScalarKind::Unsigned {
                    counters.insert(&f.name);
                }
            }
            FieldKind::FixedPoint(_) => claim_name(&mut seen, &f.name, message, prefix)?,
            FieldKind::Bitfield(bf) => {
                bf.validate().map_err(|e| match e {
                    BitfieldError::Overflow { declared, capacity, .. } => SchemaError::BitWidthOverflow {
                        message: message.to_string(),
                        field: path.clone(),
                        declared,
                        capacity,
                    },
                    BitfieldError::ZeroWidth(member) => SchemaError::ZeroWidthMember {
                        message: message.to_string(),
                        field: path.clone(),
                        member,
                    },
                    BitfieldError::InvalidStorage(ty) => SchemaError::InvalidBitfieldStorage {
                        message: message.to_string(),
                        field: path.clone(),
                        ty: ty.to_string(),
                    },
                })?;
                for m in bf.members() {
                    claim_name(&mut seen, &m.name, message, prefix)?;
                    counters.insert(&m.name);
                }
            }
            FieldKind::Group(g) => {
                claim_name(&mut seen, &f.name, message, prefix)?;
                validate_scope(message, &format!("{path}[]."), g.elements())?;
                // Every element consumes input, so a decoded count is bounded by the payload.
                let unsized_element = min_size(g.elements()) == 0
                    || (*g.count() == CountRule::Remainder && g.element_size().is_none());
                if unsized_element {
                    return Err(SchemaError::UnsizedElement {
                        message: message.to_string(),
                        field: path,
                    });
                }
                if let CountRule::Field(count_field) = g.count() {
                    if !counters.contains(count_field.as_str()) {
                        return Err(SchemaError::UnknownCountField {
                            message: message.to_string(),
                            field: path,
                            count_field: count_field.clone(),
                        });
                    }
                }
                if g.is_variable() && i + 1 != fields.len() {
                    return Err(SchemaError::GroupNotLast {
                        message: message.to_string(),
                        field: path,
                    });
                }
            }
        }
    }
    Ok(())
}

fn claim_name<'a>(seen: &mut HashSet<&'a str>, name: &'a str, message: &str, prefix: &str) -> Result<(), SchemaError> {
    if seen.insert(name) {
        Ok(())
    } else {
        Err(SchemaError::DuplicateField {
            message: message.to_string(),
            field: format!("{prefix}{name}"),
        })
    }
}
