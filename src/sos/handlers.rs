use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{instrument, warn};

use crate::{
    auth::AuthUser,
    error::ApiMessage,
    sos::{dto::parse_is_active, error::SosError, services::toggle_alert},
    state::AppState,
};

pub fn sos_routes() -> Router<AppState> {
    Router::new()
        .route("/sos/", post(post_sos))
        .route("/sos", post(post_sos))
}

/// POST /sos/ `{ "is_active": bool }`
#[instrument(skip(state, body))]
pub async fn post_sos(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ApiMessage>, SosError> {
    let Json(body) = body.map_err(|e| {
        warn!(error = %e, %user_id, "unreadable sos body");
        SosError::InvalidInput
    })?;
    let desired = parse_is_active(&body)?;

    let outcome = toggle_alert(
        state.store.as_ref(),
        user_id,
        desired,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(Json(ApiMessage::ok(outcome.message())))
}
