//! HTTP surface of the relay.
//!
//! | Route | Response |
//! |---|---|
//! | `GET /` | `OK` |
//! | `POST /v1/threads` | `{"id": ..., "messages": [], "topic": null}` |
//! | `POST /v1/threads/{thread_id}/chat` | `text/event-stream` of the assistant's reply |

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerSettings;
use crate::error::{RelayError, Result};
use crate::service::RelayService;

pub mod handlers;
pub mod sse;

pub use handlers::{ChatRequest, ThreadResponse};
pub use sse::{SseOptions, to_sse_response};

/// State shared with every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub relay: Arc<RelayService>,
    pub sse: SseOptions,
}

impl AppState {
    pub fn new(relay: RelayService) -> Self {
        Self {
            relay: Arc::new(relay),
            sse: SseOptions::default(),
        }
    }

    pub fn with_sse_options(mut self, sse: SseOptions) -> Self {
        self.sse = sse;
        self
    }
}

/// Create the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::status))
        .route("/v1/threads", post(handlers::create_thread))
        .route("/v1/threads/{thread_id}/chat", post(handlers::chat))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(settings: &ServerSettings, state: AppState) -> Result<()> {
    let addr = settings.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::ConfigurationError(format!("Failed to bind {addr}: {e}")))?;
    info!(%addr, "relay listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RelayError::InternalError(format!("server error: {e}")))?;

    info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
