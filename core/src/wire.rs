//! Wire DTOs for the remote todo API.
//!
//! # Design
//! The server speaks a different schema from the local cache (`done`,
//! `created_at`, `changed_at`, `last_updated_by`) so the two are separate
//! types with explicit conversions. `changed_at` is mandatory on the wire:
//! an unedited item sends `created_at` there, and receiving
//! `changed_at == created_at` decodes back to "never edited".

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::types::{from_unix, Importance, TodoItem};

/// A todo item as the server sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<i64>,
    pub done: bool,
    pub created_at: i64,
    pub changed_at: i64,
    pub last_updated_by: String,
}

impl WireItem {
    pub fn from_item(item: &TodoItem, device_id: &str) -> Self {
        let created_at = item.date_created.timestamp();
        WireItem {
            id: item.id.clone(),
            text: item.text.clone(),
            importance: item.importance,
            deadline: item.deadline.map(|d| d.timestamp()),
            done: item.is_done,
            created_at,
            changed_at: item.date_edited.map_or(created_at, |d| d.timestamp()),
            last_updated_by: device_id.to_string(),
        }
    }

    pub fn into_item(self) -> Result<TodoItem> {
        let date_created = from_unix(self.created_at).map_err(decode)?;
        let date_edited = if self.changed_at == self.created_at {
            None
        } else {
            Some(from_unix(self.changed_at).map_err(decode)?)
        };
        let deadline = self.deadline.map(from_unix).transpose().map_err(decode)?;
        Ok(TodoItem {
            id: self.id,
            text: self.text,
            importance: self.importance,
            deadline,
            is_done: self.done,
            date_created,
            date_edited,
        })
    }
}

fn decode(e: SyncError) -> SyncError {
    SyncError::DecodeError(e.to_string())
}

/// Body for `POST /list` and `PUT /list/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementRequest {
    pub element: WireItem,
}

/// Body for `PATCH /list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRequest {
    pub list: Vec<WireItem>,
}

/// Response to any single-element operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementResponse {
    pub status: String,
    pub element: WireItem,
    pub revision: i64,
}

/// Response to `GET /list` and `PATCH /list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub status: String,
    pub list: Vec<WireItem>,
    pub revision: i64,
}
