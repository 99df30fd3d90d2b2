//! Error types for Caravan
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::codec::CodecError;

/// Result type alias using CaravanError
pub type Result<T> = std::result::Result<T, CaravanError>;

/// Outcome reporting for durable mutations that complete on another thread
pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// Unified error type for Caravan operations
#[derive(Debug, Error)]
pub enum CaravanError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    #[error("Store full: no free region for {requested} bytes")]
    StoreFull { requested: u64 },

    #[error("Region too large: {requested} bytes exceeds limit of {limit}")]
    RegionTooLarge { requested: u64, limit: u64 },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected at offset {offset}: {reason}")]
    WalCorruption { offset: u64, reason: String },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Backup Errors
    // -------------------------------------------------------------------------
    #[error("Cloud error: {0}")]
    Cloud(String),

    #[error("Archive error: {0}")]
    Archive(String),

    // -------------------------------------------------------------------------
    // Service Errors
    // -------------------------------------------------------------------------
    #[error("Service stopped")]
    ServiceStopped,

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl CaravanError {
    /// Stable numeric code surfaced to collaborators alongside the message
    pub fn code(&self) -> u32 {
        match self {
            CaravanError::Io(_) => 100,
            CaravanError::StoreFull { .. } => 200,
            CaravanError::RegionTooLarge { .. } => 201,
            CaravanError::Storage(_) => 300,
            CaravanError::WalCorruption { .. } => 400,
            CaravanError::Codec(_) => 401,
            CaravanError::Config(_) => 500,
            CaravanError::Cloud(_) => 600,
            CaravanError::Archive(_) => 601,
            CaravanError::ServiceStopped => 700,
            CaravanError::Timeout(_) => 701,
        }
    }
}
