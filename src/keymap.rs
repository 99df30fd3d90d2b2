//! Key Map
//!
//! Bijection between external `(space, key)` pairs and internal integer ids.
//!
//! Ids come from a monotonic generator owned by each map and are never
//! reused, even after a key is deleted. The whole state can be rebuilt by
//! replaying MapKey/DelKey records in order from an empty map.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::codec::{put_string, put_varint, CodecError, Decoder};
use crate::wal::{DelKey, MapKey};

/// Internal document id
pub type Id = i32;

/// External document address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub space: String,
    pub key: String,
}

impl Key {
    pub fn new(space: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.space, self.key)
    }
}

/// Key ↔ id bijection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMap {
    forward: HashMap<Key, Id>,
    /// Ordered so snapshots come out in id order
    reverse: BTreeMap<Id, Key>,
    /// Last id handed out; the next invention uses `last_id + 1`
    last_id: Id,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Key) -> Option<Id> {
        self.forward.get(key).copied()
    }

    pub fn key_of(&self, id: Id) -> Option<&Key> {
        self.reverse.get(&id)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Last id the generator produced (0 before the first invention)
    pub fn last_id(&self) -> Id {
        self.last_id
    }

    /// Live mappings in id order
    pub fn iter(&self) -> impl Iterator<Item = (Id, &Key)> {
        self.reverse.iter().map(|(&id, key)| (id, key))
    }

    /// Assign the next id to an unmapped key
    ///
    /// Returns `None` when the key is already mapped. The returned record
    /// must be made durable before the caller relies on the mapping.
    pub fn invent_and_apply(&mut self, key: &Key) -> Option<MapKey> {
        if self.forward.contains_key(key) {
            return None;
        }
        let record = MapKey {
            key: key.clone(),
            id: self.last_id + 1,
        };
        self.apply_map(&record);
        Some(record)
    }

    /// Install a mapping; re-applying an existing mapping changes nothing
    pub fn apply_map(&mut self, record: &MapKey) {
        if let Some(previous) = self.forward.get(&record.key).copied() {
            if previous == record.id {
                self.last_id = self.last_id.max(record.id);
                return;
            }
            self.reverse.remove(&previous);
        }
        if let Some(previous_key) = self.reverse.remove(&record.id) {
            self.forward.remove(&previous_key);
        }
        self.forward.insert(record.key.clone(), record.id);
        self.reverse.insert(record.id, record.key.clone());
        self.last_id = self.last_id.max(record.id);
    }

    /// Remove a mapping; the id generator is never rewound
    pub fn apply_del(&mut self, record: &DelKey) {
        if let Some(id) = self.forward.remove(&record.key) {
            self.reverse.remove(&id);
        }
    }

    /// Append the map to `buf`
    ///
    /// ```text
    /// last_id (varint) | count (varint) | (id varint, space, key)*
    /// ```
    pub fn snapshot(&self, buf: &mut Vec<u8>) {
        put_varint(buf, i64::from(self.last_id));
        put_varint(buf, self.reverse.len() as i64);
        for (&id, key) in &self.reverse {
            put_varint(buf, i64::from(id));
            put_string(buf, Some(&key.space));
            put_string(buf, Some(&key.key));
        }
    }

    /// Replace the map with one written by `snapshot`
    pub fn load(&mut self, decoder: &mut Decoder<'_>) -> Result<(), CodecError> {
        let last_id = read_id(decoder)?;
        let count = decoder.get_unsigned_varint("key count")?;

        let mut map = KeyMap::new();
        for _ in 0..count {
            let id = read_id(decoder)?;
            let space = decoder.get_required_string("key space")?;
            let key = decoder.get_required_string("key key")?;
            map.apply_map(&MapKey {
                key: Key::new(space, key),
                id,
            });
        }
        if map.last_id > last_id {
            return Err(CodecError::Invalid(format!(
                "key map holds id {} beyond generator value {}",
                map.last_id, last_id
            )));
        }
        map.last_id = last_id;

        *self = map;
        Ok(())
    }
}

fn read_id(decoder: &mut Decoder<'_>) -> Result<Id, CodecError> {
    let raw = decoder.get_varint()?;
    Id::try_from(raw).map_err(|_| CodecError::Invalid(format!("id {} out of range", raw)))
}
