//! HTTP API Server
//!
//! JSON produce/consume endpoints over a shared [`Log`], plus health and
//! status queries.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::log::{Log, Record, SegmentInfo};

/// Shared application state
pub struct AppState {
    /// The log served by this API
    pub log: Arc<Log>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, log: Arc<Log>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { log }),
        }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/", get(handle_consume).post(handle_produce))
            .route("/records/:offset", get(handle_record))
            .route("/status", get(handle_status))
            .route("/health", get(handle_health))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            shutdown.await;
            return Ok(());
        }

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Record as it travels over JSON; the payload is base64
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordBody {
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    #[serde(default)]
    pub offset: u64,
}

impl From<Record> for RecordBody {
    fn from(record: Record) -> Self {
        Self {
            value: record.value,
            offset: record.offset,
        }
    }
}

/// Produce request
#[derive(Debug, Deserialize, Serialize)]
pub struct ProduceRequest {
    pub record: RecordBody,
}

/// Produce response
#[derive(Debug, Deserialize, Serialize)]
pub struct ProduceResponse {
    pub offset: u64,
}

/// Consume request
#[derive(Debug, Deserialize, Serialize)]
pub struct ConsumeRequest {
    pub offset: u64,
}

/// Consume response
#[derive(Debug, Deserialize, Serialize)]
pub struct ConsumeResponse {
    pub record: RecordBody,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub data_dir: String,
    pub lowest_offset: u64,
    pub highest_offset: Option<u64>,
    pub next_offset: u64,
    pub segments: Vec<SegmentInfo>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============ Handlers ============

async fn handle_produce(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProduceRequest>,
) -> Response {
    let log = Arc::clone(&state.log);
    let mut record = Record::new(req.record.value);

    match run_blocking(move || log.append(&mut record)).await {
        Ok(offset) => Json(ProduceResponse { offset }).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_consume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConsumeRequest>,
) -> Response {
    consume(&state, req.offset).await
}

async fn handle_record(
    State(state): State<Arc<AppState>>,
    Path(offset): Path<u64>,
) -> Response {
    consume(&state, offset).await
}

async fn consume(state: &AppState, offset: u64) -> Response {
    let log = Arc::clone(&state.log);

    match run_blocking(move || log.read(offset)).await {
        Ok(record) => Json(ConsumeResponse {
            record: record.into(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let log = &state.log;
    Json(StatusResponse {
        data_dir: log.dir().display().to_string(),
        lowest_offset: log.lowest_offset(),
        highest_offset: log.highest_offset(),
        next_offset: log.next_offset(),
        segments: log.segments(),
    })
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse { healthy: true })
}

/// Run a blocking log call off the async workers
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("log task failed: {}", e)))?
}

fn error_response(e: Error) -> Response {
    let (status, code) = if e.is_not_found() {
        (StatusCode::NOT_FOUND, "NOT_FOUND")
    } else if e.is_capacity() {
        (StatusCode::INSUFFICIENT_STORAGE, "SEGMENT_FULL")
    } else {
        tracing::error!("Log operation failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
    };

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
