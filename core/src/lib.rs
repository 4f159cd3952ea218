//! Local-first todo list with a REST-backed sync layer.
//!
//! # Overview
//! Items live in a local `ItemStore` and are pushed to the backend on a best
//! effort basis. The `SyncCoordinator` owns the server revision and a dirty
//! flag: a failed push marks local state as diverged, and the next mutation
//! reconciles by sending the whole list.
//!
//! # Design
//! - `TodoClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network; a `Transport` does the I/O.
//! - Local cache and wire format are different schemas (`types` vs `wire`).
//! - `SyncWorker` serializes coordinator operations on one thread and
//!   replies to mutations after their local leg.

pub mod client;
pub mod config;
pub mod csv;
pub mod error;
pub mod http;
pub mod remote;
pub mod store;
pub mod sync;
pub mod transport;
pub mod types;
pub mod wire;
pub mod worker;

pub use client::TodoClient;
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use remote::RemoteClient;
pub use store::{FileItemStore, ItemStore, MemoryItemStore, PersistedSyncState};
pub use sync::{Mutation, RemoteOutcome, SyncCoordinator, SyncEvent, SyncState, SyncStatus};
pub use transport::{Transport, UreqTransport};
pub use types::{Importance, TodoItem};
pub use worker::{Pending, SyncHandle, SyncWorker};
