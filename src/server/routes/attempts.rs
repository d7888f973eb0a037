use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::ListQuery;
use crate::attempts::{AttemptStats, NewAttempt, RecordedAttempt};
use crate::error::Result;
use crate::server::auth::CurrentUser;
use crate::state::State as AppState;
use crate::storage::entities::{Program, ProgramAttempt};

pub async fn list_attempts(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(feed_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ProgramAttempt>>> {
    let attempts = state
        .attempts
        .list(&user_id, feed_id, query.limit())
        .await?;

    Ok(Json(attempts))
}

pub async fn record_attempt(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(feed_id): Path<i64>,
    Json(body): Json<NewAttempt>,
) -> Result<(StatusCode, Json<RecordedAttempt>)> {
    let recorded = state.attempts.record(&user_id, feed_id, body).await?;

    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn attempt_stats(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(feed_id): Path<i64>,
) -> Result<Json<AttemptStats>> {
    Ok(Json(state.attempts.stats(&user_id, feed_id).await?))
}

pub async fn list_programs(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Program>>> {
    Ok(Json(state.attempts.programs(&user_id, query.limit()).await?))
}
