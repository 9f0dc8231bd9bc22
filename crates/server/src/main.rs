//! Agentic RAG server entry point

use std::net::SocketAddr;
use std::sync::Arc;

use sme_rag_config::load_settings;
use sme_rag_router::PipelineContext;
use sme_rag_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings from environment, using defaults");
            sme_rag_config::Settings::default()
        }
    };

    tracing::info!(
        classifier_mode = ?settings.classifier_mode,
        retrieval_k = settings.retrieval.retrieval_k,
        "starting agentic RAG server"
    );

    let host = settings.server.host.clone();
    let port = settings.server.port;

    let ctx = Arc::new(PipelineContext::startup(settings)?);
    let state = AppState::new(Arc::clone(&ctx));
    let app = create_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    ctx.shutdown();
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sme_rag_server=info,sme_rag_router=info,tower_http=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
