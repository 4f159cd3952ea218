//! Stateless HTTP request builder and response parser for the todo backend.
//!
//! # Design
//! `TodoClient` holds the base URL and the credentials that go into every
//! request, but no sync state: the known revision is passed in to each
//! `build_*` call and handed back by each `parse_*` call. The caller owns the
//! revision and decides whether to keep it.

use crate::error::{Result, SyncError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::TodoItem;
use crate::wire::{ElementRequest, ElementResponse, ListRequest, ListResponse, WireItem};

pub const REVISION_HEADER: &str = "X-Last-Known-Revision";
pub const GENERATE_FAILS_HEADER: &str = "X-Generate-Fails";

#[derive(Debug, Clone)]
pub struct TodoClient {
    base_url: String,
    token: String,
    device_id: String,
    generate_fails: Option<u8>,
}

impl TodoClient {
    pub fn new(base_url: &str, token: &str, device_id: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            device_id: device_id.to_string(),
            generate_fails: None,
        }
    }

    /// Ask the backend to fail `percent` of requests. Test backends only.
    pub fn with_generate_fails(mut self, percent: Option<u8>) -> Self {
        self.generate_fails = percent;
        self
    }

    pub fn build_list(&self, revision: i64) -> HttpRequest {
        self.request(HttpMethod::Get, "/list".to_string(), revision, None)
    }

    pub fn build_get(&self, id: &str, revision: i64) -> HttpRequest {
        self.request(HttpMethod::Get, format!("/list/{id}"), revision, None)
    }

    pub fn build_create(&self, item: &TodoItem, revision: i64) -> Result<HttpRequest> {
        let body = self.element_body(item)?;
        Ok(self.request(HttpMethod::Post, "/list".to_string(), revision, Some(body)))
    }

    pub fn build_update(&self, item: &TodoItem, revision: i64) -> Result<HttpRequest> {
        let body = self.element_body(item)?;
        Ok(self.request(HttpMethod::Put, format!("/list/{}", item.id), revision, Some(body)))
    }

    pub fn build_delete(&self, id: &str, revision: i64) -> HttpRequest {
        self.request(HttpMethod::Delete, format!("/list/{id}"), revision, None)
    }

    pub fn build_replace_all(&self, items: &[TodoItem], revision: i64) -> Result<HttpRequest> {
        let payload = ListRequest {
            list: items
                .iter()
                .map(|item| WireItem::from_item(item, &self.device_id))
                .collect(),
        };
        let body = serde_json::to_string(&payload).map_err(|e| SyncError::DecodeError(e.to_string()))?;
        Ok(self.request(HttpMethod::Patch, "/list".to_string(), revision, Some(body)))
    }

    /// Parse `GET /list` or `PATCH /list`.
    pub fn parse_list(&self, response: HttpResponse) -> Result<(Vec<TodoItem>, i64)> {
        check_status(&response)?;
        let parsed: ListResponse =
            serde_json::from_str(&response.body).map_err(|e| SyncError::DecodeError(e.to_string()))?;
        let items = parsed
            .list
            .into_iter()
            .map(WireItem::into_item)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, parsed.revision))
    }

    /// Parse `GET`, `POST`, `PUT` or `DELETE` on a single element.
    pub fn parse_element(&self, response: HttpResponse) -> Result<(TodoItem, i64)> {
        check_status(&response)?;
        let parsed: ElementResponse =
            serde_json::from_str(&response.body).map_err(|e| SyncError::DecodeError(e.to_string()))?;
        Ok((parsed.element.into_item()?, parsed.revision))
    }

    fn element_body(&self, item: &TodoItem) -> Result<String> {
        let payload = ElementRequest {
            element: WireItem::from_item(item, &self.device_id),
        };
        serde_json::to_string(&payload).map_err(|e| SyncError::DecodeError(e.to_string()))
    }

    fn request(&self, method: HttpMethod, path: String, revision: i64, body: Option<String>) -> HttpRequest {
        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {}", self.token)),
            (REVISION_HEADER.to_string(), revision.to_string()),
        ];
        if let Some(percent) = self.generate_fails {
            headers.push((GENERATE_FAILS_HEADER.to_string(), percent.to_string()));
        }
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers,
            body,
        }
    }
}

/// Map a status code to the error taxonomy.
pub fn check_status(response: &HttpResponse) -> Result<()> {
    match response.status {
        200..=299 => Ok(()),
        400 => Err(SyncError::BadRequest),
        401 => Err(SyncError::Unauthorized),
        404 => Err(SyncError::NotFound(response.body.clone())),
        500..=599 => Err(SyncError::ServerError(response.status)),
        other => Err(SyncError::UnexpectedStatus(other)),
    }
}

/// Redact a bearer token for logging, keeping a short prefix and suffix.
pub(crate) fn mask_bearer(v: &str) -> String {
    let Some(token) = v.strip_prefix("Bearer ") else {
        return "*****".to_string();
    };
    let head = token.get(..4);
    let tail = token.get(token.len().saturating_sub(2)..);
    match (head, tail) {
        (Some(head), Some(tail)) if token.len() > 10 => format!("Bearer {head}…{tail}"),
        _ => "Bearer ****".to_string(),
    }
}
