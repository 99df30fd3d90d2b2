//! # Caravan
//!
//! A durable, per-key append-only storage engine with:
//! - A best-fit region heap with coalescing, size limits and chaining
//! - Memory-mapped data files that grow by appending files
//! - A tagged binary write-ahead log (WAL) carrying every payload
//! - Snapshot-based compaction and crash recovery with torn-tail handling
//! - A single-threaded service façade with periodic flushing and backups
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CaravanService                           │
//! │        (job channel → one worker thread, flusher)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  DurableListStore                           │
//! └───────┬──────────────────┬───────────────────────┬──────────┘
//!         │                  │                       │
//!         ▼                  ▼                       ▼
//!   ┌───────────┐   ┌──────────────────┐     ┌─────────────┐
//!   │    WAL    │   │   Organization   │     │   Storage   │
//!   │ (records) │   │ Heap·Index·KeyMap│     │   (mmap)    │
//!   └───────────┘   └──────────────────┘     └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod metrics;

pub mod codec;
pub mod region;
pub mod storage;
pub mod heap;
pub mod keymap;
pub mod index;
pub mod wal;
pub mod organization;
pub mod engine;

pub mod archive;
pub mod cloud;
pub mod service;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CaravanError, Callback, Result};
pub use config::Config;
pub use engine::{Appended, DurableListStore, Entry, KeyState, StoreStats};
pub use keymap::{Id, Key};
pub use region::{AnnotatedRegion, Region};
pub use service::CaravanService;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Caravan
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
