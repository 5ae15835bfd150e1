//! Bitfield descriptor: one unsigned storage word split into named members.
//!
//! Members are laid out least-significant bit first, in declaration order.
//! High bits past the last member are reserved: dropped on unpack, zero on pack.
//!
//! Packing masks every member value to its declared width. A value that does
//! not fit is silently truncated, the same way receiver firmware treats it; the
//! only width check is the static one in [`Bitfield::validate`].

use crate::types::{ScalarKind, ScalarType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMember {
    pub name: String,
    pub bits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    storage: ScalarType,
    members: Vec<BitMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitfieldError {
    #[error("members declare {declared} bits but {storage} holds {capacity}")]
    Overflow {
        declared: u32,
        capacity: u32,
        storage: ScalarType,
    },
    #[error("member {0} has zero width")]
    ZeroWidth(String),
    #[error("storage {0} is not an unsigned integer type")]
    InvalidStorage(ScalarType),
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

impl Bitfield {
    pub fn new<N: Into<String>>(storage: ScalarType, members: impl IntoIterator<Item = (N, u32)>) -> Self {
        Bitfield {
            storage,
            members: members
                .into_iter()
                .map(|(name, bits)| BitMember { name: name.into(), bits })
                .collect(),
        }
    }

    pub fn storage(&self) -> ScalarType {
        self.storage
    }

    pub fn members(&self) -> &[BitMember] {
        &self.members
    }

    pub fn total_bits(&self) -> u32 {
        self.members.iter().fold(0u32, |acc, m| acc.saturating_add(m.bits))
    }

    /// Mask covering every declared member bit.
    pub fn declared_mask(&self) -> u64 {
        mask(self.total_bits())
    }

    /// Static layout check, run once when a schema table is built.
    pub fn validate(&self) -> Result<(), BitfieldError> {
        if self.storage.kind() != ScalarKind::Unsigned {
            return Err(BitfieldError::InvalidStorage(self.storage));
        }
        if let Some(m) = self.members.iter().find(|m| m.bits == 0) {
            return Err(BitfieldError::ZeroWidth(m.name.clone()));
        }
        let declared = self.total_bits();
        let capacity = self.storage.bits();
        if declared > capacity {
            return Err(BitfieldError::Overflow {
                declared,
                capacity,
                storage: self.storage,
            });
        }
        Ok(())
    }

    /// Split a storage word into member values, in declaration order.
    pub fn unpack(&self, raw: u64) -> Vec<(&BitMember, u64)> {
        let mut offset = 0u32;
        self.members
            .iter()
            .map(|m| {
                let v = if offset >= 64 { 0 } else { (raw >> offset) & mask(m.bits) };
                offset = offset.saturating_add(m.bits);
                (m, v)
            })
            .collect()
    }

    /// Build a storage word from member values; absent members are zero.
    pub fn pack(&self, mut value_of: impl FnMut(&str) -> u64) -> u64 {
        let mut offset = 0u32;
        let mut acc = 0u64;
        for m in &self.members {
            if offset < 64 {
                acc |= (value_of(&m.name) & mask(m.bits)) << offset;
            }
            offset = offset.saturating_add(m.bits);
        }
        acc
    }
}
