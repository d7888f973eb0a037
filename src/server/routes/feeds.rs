use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::Result;
use crate::feeds::{
    FeedDetails, FeedPatch, FeedWithFilterGroup, FilterGroupPatch, FilterGroupSpec, NewFeed,
};
use crate::qiita::{FindPosts, PostsPage};
use crate::server::auth::CurrentUser;
use crate::state::State as AppState;

const MAX_PER_PAGE: u32 = 100;

#[derive(Deserialize, Debug, Clone)]
pub struct CreateFeed {
    #[serde(flatten)]
    pub feed: NewFeed,
    pub filter_group: FilterGroupSpec,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UpdateFeed {
    #[serde(flatten)]
    pub feed: FeedPatch,

    #[serde(default)]
    pub filter_group: Option<FilterGroupPatch>,
}

pub async fn list_feeds(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<FeedDetails>>> {
    Ok(Json(state.feeds.list_feeds(&user_id).await?))
}

pub async fn create_feed(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<CreateFeed>,
) -> Result<(StatusCode, Json<FeedWithFilterGroup>)> {
    let created = state
        .feeds
        .create_feed_with_filter_group(&user_id, body.feed, body.filter_group)
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_feed(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(feed_id): Path<i64>,
) -> Result<Json<FeedDetails>> {
    Ok(Json(state.feeds.get_feed(&user_id, feed_id).await?))
}

pub async fn update_feed(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(feed_id): Path<i64>,
    Json(body): Json<UpdateFeed>,
) -> Result<Json<FeedWithFilterGroup>> {
    let updated = state
        .feeds
        .update_feed_with_filter_group(&user_id, feed_id, body.feed, body.filter_group)
        .await?;

    Ok(Json(updated))
}

pub async fn delete_feed(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(feed_id): Path<i64>,
) -> Result<StatusCode> {
    state.feeds.soft_delete(&user_id, feed_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Runs the feed's filters against Qiita.
pub async fn preview_posts(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(feed_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostsPage>> {
    let details = state.feeds.get_feed(&user_id, feed_id).await?;

    let mut find = FindPosts::from_feed(&details, OffsetDateTime::now_utc());
    find.page = query.page.unwrap_or(find.page).max(1);
    find.per_page = query
        .per_page
        .unwrap_or(find.per_page)
        .clamp(1, MAX_PER_PAGE);

    Ok(Json(state.qiita.find_posts(&find).await?))
}
