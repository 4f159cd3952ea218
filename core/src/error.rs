//! Error taxonomy shared by the item store, the remote client, and the sync
//! coordinator.
//!
//! # Design
//! Store errors (`DuplicateId`, `NotFound`, `InvalidFormat`,
//! `StorageUnavailable`) are fatal to the call that produced them. Any error
//! from the remote leg of a mutation is absorbed by the coordinator into the
//! Dirty transition; a server 404 shares `NotFound` with the store, so the
//! coordinator classifies by which leg failed, not by variant. No raw HTTP
//! status escapes this module except through `UnexpectedStatus`.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// An item with this id is already in the store.
    #[error("item {0} already exists")]
    DuplicateId(String),

    /// No item with this id is in the store, or the server returned 404.
    #[error("item not found: {0}")]
    NotFound(String),

    /// Stored JSON/CSV or config could not be parsed.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The durable medium could not be read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] io::Error),

    #[error("bad request")]
    BadRequest,

    #[error("unauthorized")]
    Unauthorized,

    #[error("server error (HTTP {0})")]
    ServerError(u16),

    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// No response at all: refused, DNS, TLS, or timeout.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// A 2xx body did not match the expected envelope.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// `load` found no usable cache and the server could not be reached.
    #[error("nothing to show: {0}")]
    LoadFailed(#[source] Box<SyncError>),

    /// The sync worker thread has stopped.
    #[error("sync worker is not running")]
    WorkerGone,
}

impl SyncError {
    /// Stable identifier for the variant, safe to show in logs or match on
    /// across versions.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::DuplicateId(_) => "DUPLICATE_ID",
            SyncError::NotFound(_) => "NOT_FOUND",
            SyncError::InvalidFormat(_) => "INVALID_FORMAT",
            SyncError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            SyncError::BadRequest => "BAD_REQUEST",
            SyncError::Unauthorized => "UNAUTHORIZED",
            SyncError::ServerError(_) => "SERVER_ERROR",
            SyncError::UnexpectedStatus(_) => "UNEXPECTED_STATUS",
            SyncError::ConnectionError(_) => "CONNECTION_ERROR",
            SyncError::DecodeError(_) => "DECODE_ERROR",
            SyncError::LoadFailed(_) => "LOAD_FAILED",
            SyncError::WorkerGone => "WORKER_GONE",
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::InvalidFormat(e.to_string())
    }
}
