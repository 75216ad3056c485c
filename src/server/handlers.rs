//! Route handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use validator::Validate;

use super::AppState;
use crate::error::RelayError;
use super::sse::{GENERIC_ERROR_MESSAGE, to_sse_response};

/// Body of `POST /v1/threads/{thread_id}/chat`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
    /// Required by the wire contract; not used.
    pub just_one_more_field: String,
}

/// Body of `POST /v1/threads`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadResponse {
    pub id: String,
    pub messages: Vec<Value>,
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorBody { error: message })).into_response()
}

/// Status for a request the relay could not start: a gateway failure when
/// the remote is at fault, an internal error otherwise.
fn failure_status(err: &RelayError) -> StatusCode {
    if err.is_upstream() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// `GET /`
pub async fn status() -> &'static str {
    "OK"
}

/// `POST /v1/threads`
pub async fn create_thread(State(state): State<AppState>) -> Response {
    match state.relay.create_thread().await {
        Ok(thread) => Json(ThreadResponse {
            id: thread.id,
            messages: Vec::new(),
            topic: None,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "failed to create thread");
            error_response(failure_status(&e), GENERIC_ERROR_MESSAGE)
        }
    }
}

/// `POST /v1/threads/{thread_id}/chat`
pub async fn chat(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(%thread_id, reason = %rejection.body_text(), "rejected chat body");
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, &rejection.body_text());
        }
    };
    if let Err(e) = request.validate() {
        warn!(%thread_id, reason = %e, "invalid chat request");
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string());
    }

    info!(%thread_id, "chat request received");
    match state.relay.start_turn(&thread_id, &request.message).await {
        Ok(stream) => to_sse_response(stream, state.sse.clone()),
        Err(e) => {
            error!(%thread_id, error = %e, "failed to start chat turn");
            error_response(failure_status(&e), GENERIC_ERROR_MESSAGE)
        }
    }
}
