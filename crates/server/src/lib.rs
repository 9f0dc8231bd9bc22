//! Thin HTTP/SSE veneer over the agentic RAG pipeline
//!
//! Everything that matters lives in `sme-rag-router`; this crate only
//! translates HTTP requests into `Router::process`/`Router::stream` calls
//! and maps their output onto the wire shapes in §6.

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use thiserror::Error;

/// Errors surfaced at the HTTP boundary, distinct from `sme_rag_core::Error`
/// since a malformed request never reaches the pipeline at all.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
