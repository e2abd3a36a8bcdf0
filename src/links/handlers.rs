use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiMessage},
    links::{
        dto::{AttachCompanionRequest, LinkPatientRequest, LinkedResponse, LinksResponse},
        services::{
            attach_companion, detach_companion, link_patient, resolve_caller, unlink_patient,
        },
    },
    state::AppState,
};

pub fn links_routes() -> Router<AppState> {
    Router::new()
        .route("/links/", get(list_links))
        .route("/links/patient/", put(put_patient).delete(delete_patient))
        .route("/links/companions/", post(post_companion))
        .route("/links/companions/:username", delete(delete_companion))
}

fn bad_body(e: JsonRejection) -> ApiError {
    ApiError::BadRequest(e.body_text())
}

#[instrument(skip(state))]
pub async fn list_links(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<LinksResponse>, ApiError> {
    let snapshot = resolve_caller(state.store.as_ref(), user_id).await?;
    Ok(Json(LinksResponse {
        role: snapshot.user.role,
        linked: snapshot.counterparts,
    }))
}

#[instrument(skip(state, body))]
pub async fn put_patient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<LinkPatientRequest>, JsonRejection>,
) -> Result<Json<LinkedResponse>, ApiError> {
    let Json(req) = body.map_err(bad_body)?;
    let linked = link_patient(state.store.as_ref(), user_id, req.patient_username.trim()).await?;
    Ok(Json(LinkedResponse {
        success: true,
        linked,
    }))
}

#[instrument(skip(state))]
pub async fn delete_patient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiMessage>, ApiError> {
    unlink_patient(state.store.as_ref(), user_id).await?;
    Ok(Json(ApiMessage::ok("Patient unlinked")))
}

/// Adds a companion to the calling patient. Companions already linked stay
/// linked; older clients that expect the patient's previous companion to be
/// dropped must call `DELETE /links/companions/:username` themselves.
#[instrument(skip(state, body))]
pub async fn post_companion(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<AttachCompanionRequest>, JsonRejection>,
) -> Result<Json<LinkedResponse>, ApiError> {
    let Json(req) = body.map_err(bad_body)?;
    let linked =
        attach_companion(state.store.as_ref(), user_id, req.companion_username.trim()).await?;
    Ok(Json(LinkedResponse {
        success: true,
        linked,
    }))
}

#[instrument(skip(state))]
pub async fn delete_companion(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(username): Path<String>,
) -> Result<Json<ApiMessage>, ApiError> {
    detach_companion(state.store.as_ref(), user_id, &username).await?;
    Ok(Json(ApiMessage::ok("Companion unlinked")))
}
