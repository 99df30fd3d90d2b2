//! WAL records
//!
//! Every record is a one-byte tag followed by a record-specific payload
//! built from the primitives in `codec`.

use bytes::Bytes;

use crate::codec::{put_bytes, put_i32, put_i64, put_string, CodecError, Decoder};
use crate::keymap::{Id, Key};
use crate::region::{AnnotatedRegion, Region};

/// Record tags
pub const APPEND_TAG: u8 = 0x42;
pub const MAP_KEY_TAG: u8 = 0x30;
pub const DEL_KEY_TAG: u8 = 0x31;
pub const SNAPSHOT_TAG: u8 = 0x57;

// =============================================================================
// Append
// =============================================================================

/// A payload written at an explicit position for an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Append {
    pub id: Id,
    /// Position in the logical address space; always fits `int32`
    pub position: u64,
    pub payload: Bytes,
    pub seq: i32,
    pub asset_bytes: i64,
}

impl Append {
    /// Region the payload occupies
    pub fn region(&self) -> Region {
        Region::new(self.position, self.payload.len() as u64)
    }

    pub fn annotated_region(&self) -> AnnotatedRegion {
        AnnotatedRegion::new(self.region(), self.seq, self.asset_bytes)
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.push(APPEND_TAG);
        put_i64(buf, i64::from(self.id));
        put_i32(buf, self.position as i32);
        put_bytes(buf, Some(&self.payload));
        put_i32(buf, self.seq);
        put_i64(buf, self.asset_bytes);
    }

    /// Decode the payload of a record whose tag was already consumed
    pub fn read_after_tag(decoder: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let raw_id = decoder.get_i64()?;
        let position = decoder.get_i32()?;
        let payload = decoder.get_required_bytes("append payload")?;
        let seq = decoder.get_i32()?;
        let asset_bytes = decoder.get_i64()?;

        let id = Id::try_from(raw_id)
            .map_err(|_| CodecError::Invalid(format!("append id {} out of range", raw_id)))?;
        let position = u64::try_from(position).map_err(|_| {
            CodecError::Invalid(format!("append position {} is negative", position))
        })?;

        Ok(Self {
            id,
            position,
            payload,
            seq,
            asset_bytes,
        })
    }
}

// =============================================================================
// MapKey / DelKey
// =============================================================================

/// Installs a key → id mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapKey {
    pub key: Key,
    pub id: Id,
}

impl MapKey {
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.push(MAP_KEY_TAG);
        put_string(buf, Some(&self.key.space));
        put_string(buf, Some(&self.key.key));
        put_i32(buf, self.id);
    }

    pub fn read_after_tag(decoder: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let space = decoder.get_required_string("map key space")?;
        let key = decoder.get_required_string("map key key")?;
        let id = decoder.get_i32()?;
        Ok(Self {
            key: Key::new(space, key),
            id,
        })
    }
}

/// Removes a key's mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelKey {
    pub key: Key,
}

impl DelKey {
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.push(DEL_KEY_TAG);
        put_string(buf, Some(&self.key.space));
        put_string(buf, Some(&self.key.key));
    }

    pub fn read_after_tag(decoder: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let space = decoder.get_required_string("del key space")?;
        let key = decoder.get_required_string("del key key")?;
        Ok(Self {
            key: Key::new(space, key),
        })
    }
}

// =============================================================================
// OrganizationSnapshot
// =============================================================================

/// Full heap, index, and key map state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationSnapshot {
    pub heap: Bytes,
    pub index: Bytes,
    pub keymap: Bytes,
}

impl OrganizationSnapshot {
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.push(SNAPSHOT_TAG);
        put_bytes(buf, Some(&self.heap));
        put_bytes(buf, Some(&self.index));
        put_bytes(buf, Some(&self.keymap));
    }

    pub fn read_after_tag(decoder: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let heap = decoder.get_required_bytes("snapshot heap")?;
        let index = decoder.get_required_bytes("snapshot index")?;
        let keymap = decoder.get_required_bytes("snapshot keymap")?;
        Ok(Self { heap, index, keymap })
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Any record that can appear in a WAL or snapshot file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Append(Append),
    MapKey(MapKey),
    DelKey(DelKey),
    Snapshot(OrganizationSnapshot),
}

impl LogRecord {
    pub fn tag(&self) -> u8 {
        match self {
            LogRecord::Append(_) => APPEND_TAG,
            LogRecord::MapKey(_) => MAP_KEY_TAG,
            LogRecord::DelKey(_) => DEL_KEY_TAG,
            LogRecord::Snapshot(_) => SNAPSHOT_TAG,
        }
    }

    /// Short name for logs and tooling
    pub fn kind(&self) -> &'static str {
        match self {
            LogRecord::Append(_) => "append",
            LogRecord::MapKey(_) => "map_key",
            LogRecord::DelKey(_) => "del_key",
            LogRecord::Snapshot(_) => "snapshot",
        }
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        match self {
            LogRecord::Append(record) => record.write(buf),
            LogRecord::MapKey(record) => record.write(buf),
            LogRecord::DelKey(record) => record.write(buf),
            LogRecord::Snapshot(record) => record.write(buf),
        }
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf);
        buf
    }

    /// Read one tagged record
    pub fn read(decoder: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let tag = decoder.get_u8()?;
        match tag {
            APPEND_TAG => Append::read_after_tag(decoder).map(LogRecord::Append),
            MAP_KEY_TAG => MapKey::read_after_tag(decoder).map(LogRecord::MapKey),
            DEL_KEY_TAG => DelKey::read_after_tag(decoder).map(LogRecord::DelKey),
            SNAPSHOT_TAG => OrganizationSnapshot::read_after_tag(decoder).map(LogRecord::Snapshot),
            _ => Err(CodecError::Invalid(format!("unknown record tag 0x{:02x}", tag))),
        }
    }
}
