//! HTTP surface: `POST /analyze` and `GET /v1/healthz`.
//!
//! The handler is thin. It reads the multipart body, hands the bytes to
//! [`Analyzer::analyze_upload`] and maps [`AnalyzerError`] onto status codes:
//!
//! | Error                                   | Status |
//! |-----------------------------------------|--------|
//! | missing `file`, bad multipart, not a PDF | 400    |
//! | text extraction failed or found nothing | 422    |
//! | anything else                           | 500    |
//!
//! Errors are returned as `{"error": {"code": …, "message": …}}`.

use crate::config::ServerConfig;
use crate::error::AnalyzerError;
use crate::orchestrator::Analyzer;
use crate::output::Analysis;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const HEALTHZ_PATH: &str = "/v1/healthz";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    /// Parent directory for staged uploads.
    pub data_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(analyzer: Arc<Analyzer>, config: &ServerConfig) -> Self {
        Self {
            analyzer,
            data_dir: config.data_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Body of a successful `POST /analyze`.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub status: &'static str,
    pub user_name: String,
    pub query: String,
    pub analysis: Analysis,
    /// Store-assigned record id; `null` when persisting failed.
    pub report_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Request-level failures with their HTTP mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Extraction failed: {0}")]
    Unprocessable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AnalyzerError> for ApiError {
    fn from(e: AnalyzerError) -> Self {
        if e.is_client_error() {
            ApiError::BadRequest(e.to_string())
        } else if e.is_extraction_error() {
            ApiError::Unprocessable(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::Unprocessable(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EXTRACTION_FAILED",
                detail,
            ),
            ApiError::Internal(detail) => {
                error!(detail = %detail, "analysis request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

/// Build the application router. Exposed for in-process tests.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/analyze", post(analyze))
        .route(HEALTHZ_PATH, get(healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `config.listen_addr` and serve until Ctrl-C / SIGTERM.
///
/// In-flight requests get [`DRAIN_TIMEOUT`] to finish after the signal.
pub async fn serve(config: ServerConfig, analyzer: Arc<Analyzer>) -> Result<(), ServerError> {
    let listen_addr = parse_listen_addr(&config.listen_addr)?;
    let bind_error = |source| ServerError::Bind {
        address: listen_addr.to_string(),
        source,
    };
    let listener = TcpListener::bind(listen_addr).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;
    info!(
        %local_addr,
        data_dir = %config.data_dir.display(),
        store = ?config.store_path,
        "bloodtest server listening"
    );

    let app = build_router(AppState::new(analyzer, &config));

    let draining = Arc::new(Notify::new());
    let signalled = Arc::clone(&draining);
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let signal = shutdown_signal().await;
                info!(signal, "shutdown signal received; draining connections");
                signalled.notify_one();
            })
            .await
    };
    let drain_deadline = async move {
        draining.notified().await;
        tokio::time::sleep(DRAIN_TIMEOUT).await;
    };

    tokio::select! {
        result = server => result.map_err(|source| ServerError::Serve { source })?,
        _ = drain_deadline => warn!(
            seconds = DRAIN_TIMEOUT.as_secs(),
            "graceful shutdown timed out; dropping open connections"
        ),
    }

    info!("server shutdown complete");
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(HealthzResponse { status: "ok" })
}

fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    let trimmed = addr.trim();
    trimmed
        .parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: trimmed.to_string(),
            source,
        })
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "ctrl-c",
        _ = sigterm => "sigterm",
    }
}
