//! Write-Ahead Log (WAL) Module
//!
//! Provides durability through an ordered stream of tagged records.
//!
//! ## Responsibilities
//! - Append records before in-memory state changes become visible
//! - Replace the log with a snapshot to bound replay cost
//! - Read records back for recovery, discarding a torn tail
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Record 1                                                    │
//! │ ┌─────────┬───────────────────────────────────────────────┐ │
//! │ │ Tag (1) │ Payload (record specific)                     │ │
//! │ └─────────┴───────────────────────────────────────────────┘ │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Record 2 ...                                                │
//! └─────────────────────────────────────────────────────────────┘
//!
//! 0x42 Append    id:i64 position:i32 payload:bytes seq:i32 asset_bytes:i64
//! 0x30 MapKey    space:string key:string id:i32
//! 0x31 DelKey    space:string key:string
//! 0x57 Snapshot  heap:bytes index:bytes keymap:bytes
//! ```
//! Records carry no checksum; only a record cut short by the end of the file
//! is tolerated.

mod reader;
mod record;
mod recovery;
mod writer;

pub use reader::{WalIterator, WalReader};
pub use record::{
    Append, DelKey, LogRecord, MapKey, OrganizationSnapshot, APPEND_TAG, DEL_KEY_TAG,
    MAP_KEY_TAG, SNAPSHOT_TAG,
};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
