//! Schema table: message schemas keyed by direction and name.
//!
//! Built once through [`SchemaTableBuilder`] and read-only afterwards. Aliases
//! share the target's `Arc<MessageSchema>`, so a SET message declared as "same
//! layout as the GET one" is literally the same schema object.

use crate::codec::CodecError;
use crate::parser::{self, Statement};
use crate::schema::{MessageSchema, SchemaError};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Which way a payload travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// Receiver output.
    Get = 0,
    /// Command or configuration sent to the receiver.
    Set = 1,
    /// Request for a Get message.
    Poll = 2,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Get, Direction::Set, Direction::Poll];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Get => "get",
            Direction::Set => "set",
            Direction::Poll => "poll",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageKey {
    pub direction: Direction,
    pub name: String,
}

impl MessageKey {
    pub fn new(direction: Direction, name: impl Into<String>) -> Self {
        MessageKey { direction, name: name.into() }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.direction, self.name)
    }
}

#[derive(Debug, Default)]
pub struct SchemaTable {
    by_direction: [HashMap<String, Arc<MessageSchema>>; 3],
}

static BUILTIN: OnceLock<Result<SchemaTable, SchemaError>> = OnceLock::new();

const BUILTIN_SOURCES: [(&str, &str); 3] = [
    ("schemas/get.ubx", include_str!("../schemas/get.ubx")),
    ("schemas/set.ubx", include_str!("../schemas/set.ubx")),
    ("schemas/poll.ubx", include_str!("../schemas/poll.ubx")),
];

impl SchemaTable {
    pub fn builder() -> SchemaTableBuilder {
        SchemaTableBuilder::default()
    }

    /// The table of every message this crate ships a layout for. Built on first
    /// use; a construction error is returned to every caller.
    pub fn builtin() -> Result<&'static SchemaTable, SchemaError> {
        BUILTIN
            .get_or_init(|| SchemaTable::builder().load_builtin().and_then(SchemaTableBuilder::build))
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn get(&self, direction: Direction, name: &str) -> Option<&Arc<MessageSchema>> {
        self.by_direction[direction.index()].get(name)
    }

    /// Like [`get`](Self::get), failing with `UnknownMessageType` on a miss.
    pub fn lookup(&self, direction: Direction, name: &str) -> Result<&Arc<MessageSchema>, CodecError> {
        self.get(direction, name).ok_or_else(|| {
            tracing::debug!(%direction, name, "unknown message type");
            CodecError::UnknownMessageType {
                key: MessageKey::new(direction, name).to_string(),
            }
        })
    }

    pub fn contains(&self, direction: Direction, name: &str) -> bool {
        self.get(direction, name).is_some()
    }

    /// True when both keys resolve to the same schema object.
    pub fn is_alias(&self, a: &MessageKey, b: &MessageKey) -> bool {
        match (self.get(a.direction, &a.name), self.get(b.direction, &b.name)) {
            (Some(x), Some(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// All keys, sorted by direction then name.
    pub fn keys(&self) -> Vec<MessageKey> {
        let mut keys: Vec<MessageKey> = self.iter().map(|(k, _)| k).collect();
        keys.sort();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (MessageKey, &Arc<MessageSchema>)> + '_ {
        Direction::ALL.into_iter().flat_map(move |d| {
            self.by_direction[d.index()]
                .iter()
                .map(move |(name, schema)| (MessageKey::new(d, name.as_str()), schema))
        })
    }

    pub fn len(&self) -> usize {
        self.by_direction.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects schemas and aliases; validation of each schema happens on insert,
/// alias resolution in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct SchemaTableBuilder {
    table: SchemaTable,
    aliases: Vec<(MessageKey, MessageKey)>,
}

impl SchemaTableBuilder {
    pub fn insert(mut self, direction: Direction, schema: MessageSchema) -> Result<Self, SchemaError> {
        schema.validate()?;
        let key = MessageKey::new(direction, schema.name());
        if self.claimed(&key) {
            return Err(SchemaError::DuplicateKey { key: key.to_string() });
        }
        self.table.by_direction[direction.index()].insert(key.name, Arc::new(schema));
        Ok(self)
    }

    /// Register `key` as another name for `target`. The target may be added later.
    pub fn alias(mut self, key: MessageKey, target: MessageKey) -> Result<Self, SchemaError> {
        if self.claimed(&key) {
            return Err(SchemaError::DuplicateKey { key: key.to_string() });
        }
        self.aliases.push((key, target));
        Ok(self)
    }

    /// Add every statement of a schema source.
    pub fn load_str(self, source: &str) -> Result<Self, SchemaError> {
        parser::parse(source)?
            .into_iter()
            .try_fold(self, |b, statement| match statement {
                Statement::Message { direction, schema } => b.insert(direction, schema),
                Statement::Alias { key, target } => b.alias(key, target),
            })
    }

    /// Add the shipped GET, SET and POLL sources, e.g. before extending them
    /// with [`load_file`](Self::load_file).
    pub fn load_builtin(self) -> Result<Self, SchemaError> {
        BUILTIN_SOURCES.iter().try_fold(self, |b, (origin, src)| {
            b.load_str(src).map_err(|e| match e {
                SchemaError::Parse(msg) => SchemaError::Parse(format!("{origin}: {msg}")),
                other => other,
            })
        })
    }

    pub fn load_file(self, path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| SchemaError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loading schema file");
        self.load_str(&source)
    }

    /// Resolve aliases (chains allowed, in any order) and freeze the table.
    pub fn build(self) -> Result<SchemaTable, SchemaError> {
        let SchemaTableBuilder { mut table, mut aliases } = self;
        while !aliases.is_empty() {
            let before = aliases.len();
            let mut pending = Vec::with_capacity(before);
            for (key, target) in aliases {
                match table.get(target.direction, &target.name).cloned() {
                    Some(schema) => {
                        table.by_direction[key.direction.index()].insert(key.name, schema);
                    }
                    None => pending.push((key, target)),
                }
            }
            if pending.len() == before {
                // Nothing resolved this pass: the first target is missing or part of a cycle.
                let (key, target) = &pending[0];
                return Err(SchemaError::UnknownAliasTarget {
                    key: key.to_string(),
                    target: target.to_string(),
                });
            }
            aliases = pending;
        }
        tracing::debug!(
            get = table.by_direction[Direction::Get.index()].len(),
            set = table.by_direction[Direction::Set.index()].len(),
            poll = table.by_direction[Direction::Poll.index()].len(),
            "schema table built"
        );
        Ok(table)
    }

    fn claimed(&self, key: &MessageKey) -> bool {
        self.table.contains(key.direction, &key.name) || self.aliases.iter().any(|(k, _)| k == key)
    }
}
