//!
//! HTTP server for the OpenAI-compatible gateway.
//!
//! Route handlers parse the OpenAI request bodies, hand them to the
//! [`Gateway`] and turn results and errors into HTTP responses. Streaming
//! answers are served as `text/event-stream` bodies fed from a channel.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::gateway::{ChatReply, Gateway};
use crate::store::CredentialStore;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application state shared by all handlers.
pub struct AppState {
    /** application configuration */
    pub config: Config,
    /** translation, key selection and upstream calls */
    pub gateway: Gateway,
    /** metrics for monitoring */
    pub metrics: AppMetrics,
}

///
/// Application metrics for monitoring and observability.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /** total number of requests processed */
    pub total_requests: AtomicU64,
    /** total number of successful requests */
    pub successful_requests: AtomicU64,
    /** total number of failed requests */
    pub failed_requests: AtomicU64,
    /** requests answered with a stream */
    pub streamed_requests: AtomicU64,
    /** requests refused because no pool key was usable */
    pub pool_exhausted: AtomicU64,
}

/* --- constants ------------------------------------------------------------------------------ */

/** Content type of streamed answers */
const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";

/** Content type header for JSON bodies */
const CONTENT_TYPE_JSON: &str = "application/json";

/* --- start of code -------------------------------------------------------------------------- */

impl AppState {
    ///
    /// Create new application state with all dependencies.
    ///
    /// # Arguments
    ///  * `config` - application configuration
    ///  * `store` - shared key store
    ///
    /// # Returns
    ///  * Application state with initialized dependencies
    ///  * `ProxyError` if initialization fails
    pub fn new(config: Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let gateway = Gateway::new(&config, store)?;
        Ok(Self { config, gateway, metrics: AppMetrics::default() })
    }

    fn record<T>(&self, result: &Result<T>) {
        match result {
            Ok(_) => self.metrics.successful_requests.fetch_add(1, Ordering::Relaxed),
            Err(e) => {
                if e.is_pool_exhaustion() {
                    self.metrics.pool_exhausted.fetch_add(1, Ordering::Relaxed);
                }
                self.metrics.failed_requests.fetch_add(1, Ordering::Relaxed)
            }
        };
    }
}

///
/// Handle OpenAI-compatible chat completions endpoint.
///
/// # Arguments
///  * `state` - shared application state
///  * `headers` - request headers, checked for a caller key
///  * `body` - raw OpenAI request body
///
/// # Returns
///  * JSON completion, SSE stream, or OpenAI-shaped error
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

    let result = match parse_request(&body) {
        Ok(request) => state.gateway.chat(&headers, request).await,
        Err(e) => Err(e),
    };
    state.record(&result);

    match result {
        Ok(ChatReply::Complete(completion)) => Json(completion).into_response(),
        Ok(ChatReply::Stream(lines)) => {
            state.metrics.streamed_requests.fetch_add(1, Ordering::Relaxed);
            stream_response(Body::from_stream(lines))
        }
        Err(e) => create_error_response(&e),
    }
}

///
/// Handle OpenAI-compatible embeddings endpoint.
pub async fn embeddings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

    let result = match parse_request(&body) {
        Ok(request) => state.gateway.embeddings(&headers, request).await,
        Err(e) => Err(e),
    };
    state.record(&result);

    match result {
        Ok(response) => Json(response).into_response(),
        Err(e) => create_error_response(&e),
    }
}

///
/// Handle models listing endpoint.
pub async fn models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

    let result = state.gateway.models(&headers).await;
    state.record(&result);

    match result {
        Ok(list) => Json(list).into_response(),
        Err(e) => create_error_response(&e),
    }
}

///
/// Handle health check endpoint.
///
/// Reports the pool headcount and request counters. Answers 503 when the
/// key store cannot be read.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let metrics = &state.metrics;
    let counters = json!({
        "total_requests": metrics.total_requests.load(Ordering::Relaxed),
        "successful_requests": metrics.successful_requests.load(Ordering::Relaxed),
        "failed_requests": metrics.failed_requests.load(Ordering::Relaxed),
        "streamed_requests": metrics.streamed_requests.load(Ordering::Relaxed),
        "pool_exhausted": metrics.pool_exhausted.load(Ordering::Relaxed),
    });

    match state.gateway.scheduler().store().pool_summary().await {
        Ok(pool) => Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "pool": pool,
            "metrics": counters,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Health check could not read the key store: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "version": env!("CARGO_PKG_VERSION"),
                    "error": e.to_string(),
                    "metrics": counters,
                })),
            )
                .into_response()
        }
    }
}

///
/// Map an error onto its HTTP response.
///
/// Upstream errors keep their original status and body. Everything else uses
/// the OpenAI error shape.
///
/// # Arguments
///  * `error` - error to convert to HTTP response
///
/// # Returns
///  * HTTP error response
pub fn create_error_response(error: &ProxyError) -> Response {
    if let ProxyError::Upstream { status, body } = error {
        let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = if serde_json::from_str::<Value>(body).is_ok() {
            CONTENT_TYPE_JSON
        } else {
            "text/plain; charset=utf-8"
        };
        return (status, [(header::CONTENT_TYPE, content_type)], body.clone()).into_response();
    }

    let (status_code, error_type) = match error {
        ProxyError::InvalidRequest(_) | ProxyError::UnsupportedFeature(_) => {
            (StatusCode::BAD_REQUEST, "invalid_request_error")
        }
        ProxyError::PoolExhausted | ProxyError::AllKeysExhausted => {
            (StatusCode::SERVICE_UNAVAILABLE, "pool_exhausted")
        }
        ProxyError::Transport(e) if e.is_timeout() => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
        ProxyError::Transport(_) => (StatusCode::BAD_GATEWAY, "upstream_unreachable"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };

    let error_response = json!({
      "error": {
        "message": error.to_string(),
        "type": error_type,
        "code": status_code.as_u16()
      }
    });

    (status_code, Json(error_response)).into_response()
}

/* --- utility functions ---------------------------------------------------------------------- */

fn parse_request<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("Malformed request body: {}", e)))
}

fn stream_response(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_EVENT_STREAM));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_request_maps_to_400() {
        let response = create_error_response(&ProxyError::InvalidRequest("bad role".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], 400);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_maps_to_503() {
        for error in [ProxyError::PoolExhausted, ProxyError::AllKeysExhausted] {
            let response = create_error_response(&error);
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body_json(response).await["error"]["type"], "pool_exhausted");
        }
    }

    #[tokio::test]
    async fn test_upstream_error_passes_through() {
        let upstream = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#;
        let response =
            create_error_response(&ProxyError::Upstream { status: 429, body: upstream.into() });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::CONTENT_TYPE], CONTENT_TYPE_JSON);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes, upstream.as_bytes());
    }

    #[tokio::test]
    async fn test_internal_errors_map_to_500() {
        let response = create_error_response(&ProxyError::Storage("locked".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_parse_request_reports_malformed_body() {
        let err = parse_request::<Value>(b"{not json").unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest(_)));
    }

    #[test]
    fn test_stream_response_headers() {
        let response = stream_response(Body::empty());
        assert_eq!(response.headers()[header::CONTENT_TYPE], CONTENT_TYPE_EVENT_STREAM);
    }
}
