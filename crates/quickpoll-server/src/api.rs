//! REST handlers for polls.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use quickpoll_core::PollError;
use quickpoll_protocol::{PollId, PollSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;

/// Body of `POST /api/polls`.
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub choices: Vec<String>,
}

/// Response of `POST /api/polls`.
#[derive(Debug, Serialize)]
pub struct CreatePollResponse {
    pub id: PollId,
    pub poll: PollSnapshot,
}

/// Label recorded for votes submitted without a voter name.
pub const ANONYMOUS_VOTER: &str = "Anonymous";

/// Body of `POST /api/polls/:id/vote`.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub choice: i64,
    #[serde(default)]
    pub voter: String,
}

impl VoteRequest {
    /// The voter name, or [`ANONYMOUS_VOTER`] if none was given.
    pub fn voter_label(&self) -> &str {
        if self.voter.trim().is_empty() {
            ANONYMOUS_VOTER
        } else {
            &self.voter
        }
    }
}

/// Response of `POST /api/polls/:id/vote`.
#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub ok: bool,
    pub poll: PollSnapshot,
}

/// Create a poll.
pub async fn create_poll(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreatePollRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let poll = state
        .service
        .create_poll(&request.question, &request.choices)
        .await?;
    metrics::record_poll_created();

    Ok((
        StatusCode::CREATED,
        Json(CreatePollResponse { id: poll.id, poll }),
    ))
}

/// List all polls, newest first.
pub async fn list_polls(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PollSnapshot>>, ApiError> {
    Ok(Json(state.service.list_polls().await?))
}

/// Fetch one poll.
pub async fn get_poll(
    State(state): State<Arc<AppState>>,
    Path(id): Path<PollId>,
) -> Result<Json<PollSnapshot>, ApiError> {
    Ok(Json(state.service.get_poll(id).await?))
}

/// Cast a vote. Subscribers see the update before this returns.
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<PollId>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<VoteResponse>, ApiError> {
    let Json(request) = payload?;
    let start = Instant::now();

    match state
        .service
        .cast_vote(id, request.choice, request.voter_label())
        .await
    {
        Ok(poll) => {
            metrics::record_vote(start.elapsed().as_secs_f64());
            Ok(Json(VoteResponse { ok: true, poll }))
        }
        Err(err) => {
            if !matches!(err, PollError::Storage(_)) {
                metrics::record_vote_rejected(err.kind());
            }
            debug!(poll = id, error = %err, "Vote rejected");
            Err(err.into())
        }
    }
}

/// Health check handler.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
