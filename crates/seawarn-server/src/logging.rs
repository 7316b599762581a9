//! Request tracing for the HTTP surface.
//!
//! Every request gets a random trace ID that rides in the request
//! extensions, appears in the request's log line, and is echoed back in
//! the `X-Trace-Id` response header so an operator can quote it when
//! reporting a problem.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use rand::Rng;
use std::time::Instant;

/// Trace ID carried in request extensions. A dedicated type keeps it
/// from colliding with other `String` extensions.
#[derive(Clone)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

fn new_trace_id() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}

const MAX_SNIPPET_CHARS: usize = 200;

/// Body excerpt for logging, bounded and lossy on invalid UTF-8.
fn snippet(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() <= MAX_SNIPPET_CHARS {
        return text.into_owned();
    }
    let mut out: String = text.chars().take(MAX_SNIPPET_CHARS).collect();
    out.push_str("...");
    out
}

fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Logs one line per request: method, path, status, elapsed time, and
/// bounded body excerpts. The OTP endpoints carry codes and addresses,
/// so their bodies are never captured; Swagger asset requests are not
/// logged at all.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = new_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    if path.starts_with("/docs") {
        return next.run(req).await;
    }
    let query = req.uri().query().map(str::to_string);
    let sensitive = path.starts_with("/v1/auth/");

    let (req, request_body) = if !sensitive && carries_body(&method) {
        let (parts, body) = req.into_parts();
        let bytes = axum::body::to_bytes(body, 1024 * 1024)
            .await
            .unwrap_or_default();
        let excerpt = snippet(&bytes);
        (Request::from_parts(parts, Body::from(bytes)), excerpt)
    } else {
        (req, String::new())
    };

    let started = Instant::now();
    let response = next.run(req).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let status = response.status();

    // Response bodies are only copied out when something went wrong;
    // the error envelope is what an operator needs to see.
    let (mut response, response_body) = if status.is_client_error() || status.is_server_error() {
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .unwrap_or_default();
        let excerpt = if sensitive {
            String::new()
        } else {
            snippet(&bytes)
        };
        (Response::from_parts(parts, Body::from(bytes)), excerpt)
    } else {
        (response, String::new())
    };

    let target = match &query {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };
    if status.is_server_error() {
        tracing::error!(
            trace_id = %trace_id,
            method = %method,
            path = %target,
            status = status.as_u16(),
            elapsed_ms,
            request = %request_body,
            response = %response_body,
            "Request failed"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            trace_id = %trace_id,
            method = %method,
            path = %target,
            status = status.as_u16(),
            elapsed_ms,
            request = %request_body,
            response = %response_body,
            "Request rejected"
        );
    } else {
        tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %target,
            status = status.as_u16(),
            elapsed_ms,
            request = %request_body,
            "Request served"
        );
    }

    if let Ok(val) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("X-Trace-Id", val);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_are_sixteen_hex_chars() {
        let id = new_trace_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn snippet_bounds_long_bodies() {
        let long = "x".repeat(400);
        let out = snippet(long.as_bytes());
        assert_eq!(out.chars().count(), MAX_SNIPPET_CHARS + 3);
        assert!(out.ends_with("..."));
        assert_eq!(snippet(b"short"), "short");
    }

    #[test]
    fn snippet_survives_invalid_utf8() {
        assert!(snippet(&[0xff, b'A']).contains('A'));
    }
}
