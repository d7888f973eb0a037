use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::publish::RssSettings;
use crate::server::auth::CurrentUser;
use crate::state::State as AppState;
use crate::storage::entities::{Plan, User};
use crate::subscription::{self, EffectivePlan};

#[derive(Deserialize, Debug, Clone)]
pub struct PutMe {
    pub display_name: String,

    #[serde(default)]
    pub email: Option<String>,
}

pub async fn put_me(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<PutMe>,
) -> Result<Json<User>> {
    let display_name = body.display_name.trim();

    if display_name.is_empty() {
        return Err(Error::validation("the display name must not be empty"));
    }

    let mut tx = state.storage.begin().await?;
    let user = tx
        .upsert_user(&user_id, display_name, body.email.as_deref())
        .await?;
    tx.commit().await?;

    Ok(Json(user))
}

#[derive(Serialize, Debug, Clone)]
pub struct Settings {
    pub user: User,
    pub rss: RssSettings,
}

pub async fn get_settings(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Settings>> {
    let user = {
        let mut tx = state.storage.begin().await?;
        tx.find_user(&user_id)
            .await?
            .ok_or(Error::NotFound("user"))?
    };
    let rss = state.publisher.settings(&user_id).await?;

    Ok(Json(Settings { user, rss }))
}

pub async fn enable_rss(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<RssSettings>> {
    Ok(Json(state.publisher.enable(&user_id).await?))
}

pub async fn rotate_rss(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<RssSettings>> {
    Ok(Json(state.publisher.rotate(&user_id).await?))
}

pub async fn disable_rss(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<RssSettings>> {
    Ok(Json(state.publisher.disable(&user_id).await?))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<EffectivePlan>> {
    let plan =
        subscription::get_effective_plan(&state.storage, &state.cfg.free_plan_id, &user_id).await?;

    Ok(Json(plan))
}

pub async fn get_plans(State(state): State<AppState>) -> Result<Json<Vec<Plan>>> {
    Ok(Json(subscription::list_plans(&state.storage).await?))
}
