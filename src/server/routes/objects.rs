use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use crate::error::{Error, Result};
use crate::publish::RSS_CONTENT_TYPE;
use crate::state::State as AppState;

/// Serves published RSS files when the local object store is in use.
///
/// Needs no user header: the token in the path is the only credential.
pub async fn get_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse> {
    let objects = state.local_objects.as_ref().ok_or(Error::NotFound("object"))?;
    let contents = objects
        .read(&state.cfg.rss.bucket, &path)
        .await?
        .ok_or(Error::NotFound("object"))?;

    Ok(([(header::CONTENT_TYPE, RSS_CONTENT_TYPE)], contents))
}
