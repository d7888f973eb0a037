use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::responses::Unauthenticated;
use crate::state::State;

/// The id of the calling user, taken from the header set by the authenticating proxy.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

#[axum::async_trait]
impl FromRequestParts<State> for CurrentUser {
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, state: &State) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(state.cfg.user_id_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user_id| !user_id.is_empty())
            .map(|user_id| Self(user_id.to_owned()))
            .ok_or(Unauthenticated)
    }
}
