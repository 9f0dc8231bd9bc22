//! Shared axum application state
//!
//! One `Router` per process, built once at startup from a `PipelineContext`
//! and cloned (cheap: an `Arc` wrapper) into each request handler.

use std::sync::Arc;

use sme_rag_router::{PipelineContext, Router as PipelineRouter};

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<PipelineRouter>,
    pub ctx: Arc<PipelineContext>,
}

impl AppState {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let router = Arc::new(PipelineRouter::new(Arc::clone(&ctx)));
        Self { router, ctx }
    }
}
