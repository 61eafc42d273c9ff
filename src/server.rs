//! JSON HTTP tool API.
//!
//! Serves the same [`ToolRegistry`] as the MCP bridge over plain HTTP, for
//! clients that prefer REST.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_initialized", "message": "search index not initialized: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `not_initialized`
//! (409), `timeout` (408), `tool_error` (500).

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::error::IndexError;
use crate::tools::{ToolContext, ToolRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
    timeout: Duration,
}

/// Builds the router. Split from [`run_server`] so tests can bind their own
/// listener.
pub fn router(ctx: ToolContext, tools: Arc<ToolRegistry>, timeout: Duration) -> Router {
    let state = AppState {
        ctx,
        tools,
        timeout,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Binds `[server].bind` and serves until the process is terminated.
pub async fn run_server(ctx: ToolContext, tools: Arc<ToolRegistry>) -> anyhow::Result<()> {
    let bind_addr = ctx.index.config().server.bind.clone();
    let timeout = Duration::from_secs(ctx.index.config().server.tool_timeout_secs);

    let app = router(ctx, tools.clone(), timeout);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!(bind = %bind_addr, tools = tools.len(), "HTTP tool API listening");
    for t in tools.tools() {
        info!("  POST /tools/{} ({})", t.name(), t.description());
    }

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Maps a tool failure to a status code using the engine error inside it.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let message = format!("{}: {:#}", tool_name, err);
    match err.downcast_ref::<IndexError>() {
        Some(IndexError::InvalidQuery(_)) => {
            AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
        }
        Some(IndexError::NotFound { .. }) => {
            AppError::new(StatusCode::NOT_FOUND, "not_found", message)
        }
        Some(IndexError::NotInitialized) | Some(IndexError::FuzzyUnavailable) => {
            AppError::new(StatusCode::CONFLICT, "not_initialized", message)
        }
        _ => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "tool_error", message),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    read_only: bool,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            read_only: t.read_only(),
            parameters: t.parameters_schema(),
        })
        .collect();

    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Unified tool dispatch with a per-call timeout.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state.tools.find(&name).ok_or_else(|| {
        AppError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no tool registered with name: {}", name),
        )
    })?;

    if !params.is_object() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "request body must be a JSON object",
        ));
    }

    let result = tokio::time::timeout(state.timeout, tool.execute(params, &state.ctx))
        .await
        .map_err(|_| {
            warn!(tool = %name, "tool call timed out");
            AppError::new(
                StatusCode::REQUEST_TIMEOUT,
                "timeout",
                format!("{}: timed out after {}s", name, state.timeout.as_secs()),
            )
        })?
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_status_codes() {
        let cases = [
            (
                IndexError::InvalidQuery("bad".into()),
                StatusCode::BAD_REQUEST,
                "bad_request",
            ),
            (
                IndexError::not_found("conversation", "x"),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                IndexError::NotInitialized,
                StatusCode::CONFLICT,
                "not_initialized",
            ),
        ];
        for (err, status, code) in cases {
            let mapped = classify_tool_error("t", err.into());
            assert_eq!(mapped.status, status);
            assert_eq!(mapped.code, code);
        }

        let other = classify_tool_error("t", anyhow::anyhow!("boom"));
        assert_eq!(other.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(other.message, "t: boom");
    }
}
