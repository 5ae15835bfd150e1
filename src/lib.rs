//! # ubxschema: UBX payload schemas and codec
//!
//! Declarative payload layouts for u-blox UBX messages, plus a codec that turns
//! payload bytes into named field values and back. Framing (sync chars, class/id,
//! length, checksum) is out of scope: the codec sees payloads only.
//!
//! ## Schema language
//!
//! Layouts are written in a small text language (PEST grammar in `grammar.pest`):
//!
//! ```text
//! get message CFG-RATE { measRate: U2; navRate: U2; timeRef: U2; }
//! set alias CFG-RATE = get CFG-RATE;
//! set message TIM-HOC { version: U1; oscId: U1; flags: U1; reserved1: U1; value: I4 * 2^-8; }
//! set message ESF-MEAS {
//!     timeTag: U4;
//!     flags: X2 { timeMarkSent: 2; timeMarkEdge: 1; calibTtagValid: 1; reserved0: 7; numMeas: 5; }
//!     id: U2;
//!     group[*] { data: X4 { dataField: 24; dataType: 6; } }
//! }
//! ```
//!
//! - Integers: `U1 U2 U4 U8`, `X1 X2 X4 X8`, `I1`..`I8`; floats `R4 R8`
//! - Blobs: `U<n>`/`X<n>` of any other width, `C<n>`
//! - Fixed point: `<integer type> * <scale>` (`2^-8`, `1/100`, `1e-7`)
//! - Bitfields: `X2 { name: bits; ... }`, least-significant bit first
//! - Groups: `name[*]` (rest of payload), `name[30]`, `name[countField]`
//!
//! ## Usage
//!
//! ```no_run
//! use ubxschema::{Codec, Direction};
//!
//! let codec = Codec::builtin()?;
//! let fields = codec.decode(Direction::Get, "CFG-RATE", &[0xe8, 0x03, 0x01, 0x00, 0x00, 0x00])?;
//! let bytes = codec.encode(Direction::Set, "CFG-RATE", &fields)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bitfield;
pub mod codec;
pub mod dump;
pub mod group;
pub mod parser;
pub mod schema;
pub mod table;
pub mod types;
pub mod value;

pub use bitfield::{BitMember, Bitfield};
pub use codec::{decode, encode, Codec, CodecError};
pub use dump::format_message;
pub use group::{CountRule, RepeatingGroup};
pub use parser::{parse, Statement};
pub use schema::{FieldDescriptor, FieldKind, MessageSchema, SchemaError};
pub use table::{Direction, MessageKey, SchemaTable, SchemaTableBuilder};
pub use types::{FixedPoint, Scale, ScalarError, ScalarKind, ScalarType};
pub use value::{Fields, Value};
