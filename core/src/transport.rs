//! Executes `HttpRequest` values against the network.
//!
//! # Design
//! `Transport` is the only seam where I/O happens. Any failure to obtain a
//! response at all (refused connection, DNS, TLS, timeout) is reported as
//! `ConnectionError`; HTTP status interpretation is left to the client.

use std::time::Duration;

use tracing::debug;

use crate::client::mask_bearer;
use crate::error::{Result, SyncError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

pub trait Transport: Send {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

impl<T: Transport + Sync> Transport for std::sync::Arc<T> {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by `ureq`.
///
/// 4xx/5xx responses are returned as data rather than `Err`, so the client
/// sees every status code.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (key, value) in headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, req: HttpRequest) -> Result<HttpResponse> {
        log_request(&req);

        let body = req.body.as_deref().unwrap_or("").as_bytes();
        let result = match req.method {
            HttpMethod::Get => with_headers(self.agent.get(&req.path), &req.headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(&req.path), &req.headers).call(),
            HttpMethod::Post => with_headers(self.agent.post(&req.path), &req.headers).send(body),
            HttpMethod::Put => with_headers(self.agent.put(&req.path), &req.headers).send(body),
            HttpMethod::Patch => with_headers(self.agent.patch(&req.path), &req.headers).send(body),
        };
        let mut response = result.map_err(|e| SyncError::ConnectionError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| SyncError::ConnectionError(e.to_string()))?;

        debug!(status, body = %truncate(&body, 2000), "http response");
        Ok(HttpResponse { status, headers, body })
    }
}

fn log_request(req: &HttpRequest) {
    let headers: Vec<String> = req
        .headers
        .iter()
        .map(|(k, v)| {
            if k.eq_ignore_ascii_case("authorization") {
                format!("{k}: {}", mask_bearer(v))
            } else {
                format!("{k}: {v}")
            }
        })
        .collect();
    debug!(
        method = req.method.as_str(),
        url = %req.path,
        headers = ?headers,
        body = %truncate(req.body.as_deref().unwrap_or(""), 2000),
        "http request"
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}
