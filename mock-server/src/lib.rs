//! In-memory implementation of the todo backend.
//!
//! Mirrors the production API closely enough to exercise the sync client:
//! bearer auth, a list-wide revision that every mutation must quote and
//! bumps by one, and optional failure injection via `X-Generate-Fails`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

pub const REVISION_HEADER: &str = "x-last-known-revision";
pub const GENERATE_FAILS_HEADER: &str = "x-generate-fails";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub text: String,
    #[serde(default = "basic")]
    pub importance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<i64>,
    pub done: bool,
    pub created_at: i64,
    pub changed_at: i64,
    pub last_updated_by: String,
}

fn basic() -> String {
    "basic".to_string()
}

#[derive(Deserialize)]
pub struct ElementBody {
    pub element: Item,
}

#[derive(Deserialize)]
pub struct ListBody {
    pub list: Vec<Item>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ElementResponse {
    pub status: String,
    pub element: Item,
    pub revision: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub status: String,
    pub list: Vec<Item>,
    pub revision: i64,
}

/// Server-side state. Public so tests can seed and inspect it.
#[derive(Debug, Default)]
pub struct Backend {
    pub items: Vec<Item>,
    pub revision: i64,
    pub token: String,
    requests: u64,
}

impl Backend {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            ..Self::default()
        }
    }

    /// Decide whether this request is one of the `percent` that fail.
    /// Deterministic: exactly `percent` of every 100 consecutive requests.
    fn should_fail(&mut self, percent: u64) -> bool {
        self.requests += 1;
        let percent = percent.min(100);
        (self.requests * percent) / 100 != ((self.requests - 1) * percent) / 100
    }

    fn bump(&mut self) -> i64 {
        self.revision += 1;
        self.revision
    }
}

pub type Db = Arc<RwLock<Backend>>;

pub fn db(token: &str) -> Db {
    Arc::new(RwLock::new(Backend::new(token)))
}

pub fn app(token: &str) -> Router {
    app_with_db(db(token))
}

pub fn app_with_db(db: Db) -> Router {
    Router::new()
        .route("/list", get(list_items).post(create_item).patch(replace_all))
        .route("/list/{id}", get(get_item).put(update_item).delete(delete_item))
        .with_state(db)
}

pub async fn run(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_db(db)).await
}

/// Rejection with a short plain-text reason.
pub struct Rejection(StatusCode, &'static str);

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

/// Auth, then failure injection, then (for mutations) the revision check.
fn guard(backend: &mut Backend, headers: &HeaderMap, mutating: bool) -> Result<(), Rejection> {
    let expected = format!("Bearer {}", backend.token);
    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return Err(Rejection(StatusCode::UNAUTHORIZED, "unauthorized"));
    }

    let fails = header_number(headers, GENERATE_FAILS_HEADER).unwrap_or(0);
    if fails > 0 && backend.should_fail(fails as u64) {
        debug!("injected failure");
        return Err(Rejection(StatusCode::INTERNAL_SERVER_ERROR, "generated failure"));
    }

    if mutating && header_number(headers, REVISION_HEADER) != Some(backend.revision) {
        return Err(Rejection(StatusCode::BAD_REQUEST, "unsynchronized data"));
    }
    Ok(())
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn ok_list(backend: &Backend) -> Json<ListResponse> {
    Json(ListResponse {
        status: "ok".to_string(),
        list: backend.items.clone(),
        revision: backend.revision,
    })
}

fn ok_element(element: Item, revision: i64) -> Json<ElementResponse> {
    Json(ElementResponse {
        status: "ok".to_string(),
        element,
        revision,
    })
}

async fn list_items(State(db): State<Db>, headers: HeaderMap) -> Result<Json<ListResponse>, Rejection> {
    let mut backend = db.write().await;
    guard(&mut backend, &headers, false)?;
    Ok(ok_list(&backend))
}

async fn get_item(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ElementResponse>, Rejection> {
    let mut backend = db.write().await;
    guard(&mut backend, &headers, false)?;
    let item = backend
        .items
        .iter()
        .find(|i| i.id == id)
        .cloned()
        .ok_or(Rejection(StatusCode::NOT_FOUND, "no such item"))?;
    Ok(ok_element(item, backend.revision))
}

async fn create_item(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<ElementBody>,
) -> Result<Json<ElementResponse>, Rejection> {
    let mut backend = db.write().await;
    guard(&mut backend, &headers, true)?;
    if backend.items.iter().any(|i| i.id == body.element.id) {
        return Err(Rejection(StatusCode::BAD_REQUEST, "duplicate id"));
    }
    backend.items.push(body.element.clone());
    let revision = backend.bump();
    info!(id = %body.element.id, revision, "created");
    Ok(ok_element(body.element, revision))
}

async fn update_item(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ElementBody>,
) -> Result<Json<ElementResponse>, Rejection> {
    let mut backend = db.write().await;
    guard(&mut backend, &headers, true)?;
    let slot = backend
        .items
        .iter_mut()
        .find(|i| i.id == id)
        .ok_or(Rejection(StatusCode::NOT_FOUND, "no such item"))?;
    *slot = body.element.clone();
    let revision = backend.bump();
    info!(%id, revision, "updated");
    Ok(ok_element(body.element, revision))
}

async fn delete_item(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ElementResponse>, Rejection> {
    let mut backend = db.write().await;
    guard(&mut backend, &headers, true)?;
    let index = backend
        .items
        .iter()
        .position(|i| i.id == id)
        .ok_or(Rejection(StatusCode::NOT_FOUND, "no such item"))?;
    let removed = backend.items.remove(index);
    let revision = backend.bump();
    info!(%id, revision, "deleted");
    Ok(ok_element(removed, revision))
}

async fn replace_all(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<ListBody>,
) -> Result<Json<ListResponse>, Rejection> {
    let mut backend = db.write().await;
    guard(&mut backend, &headers, true)?;
    let mut seen = std::collections::HashSet::new();
    if !body.list.iter().all(|i| seen.insert(i.id.clone())) {
        return Err(Rejection(StatusCode::BAD_REQUEST, "duplicate id"));
    }
    backend.items = body.list;
    let revision = backend.bump();
    info!(count = backend.items.len(), revision, "replaced list");
    Ok(ok_list(&backend))
}
