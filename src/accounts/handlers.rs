use axum::{
    extract::{rejection::JsonRejection, State},
    routing::get,
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    accounts::{
        dto::{ProfileUpdate, ProfileView},
        services::update_profile,
    },
    auth::AuthUser,
    error::ApiError,
    links::services::resolve_caller,
    state::AppState,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile/", get(get_profile).patch(patch_profile))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileView>, ApiError> {
    let snapshot = resolve_caller(state.store.as_ref(), user_id).await?;
    Ok(Json(snapshot.into()))
}

#[instrument(skip(state, body))]
pub async fn patch_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<ProfileView>, ApiError> {
    let Json(update) = body.map_err(|e| {
        warn!(error = %e, %user_id, "invalid profile update body");
        ApiError::BadRequest(e.body_text())
    })?;
    let snapshot = update_profile(state.store.as_ref(), user_id, update).await?;
    Ok(Json(snapshot.into()))
}
