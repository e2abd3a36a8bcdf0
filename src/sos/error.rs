use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::accounts::model::Role;
use crate::error::{ApiMessage, INTERNAL_MESSAGE};
use crate::store::StoreError;

pub const INVALID_IS_ACTIVE: &str = "is_active must be true or false";

#[derive(Debug, thiserror::Error)]
pub enum SosError {
    #[error("is_active must be true or false")]
    InvalidInput,
    #[error("{}", no_counterpart_message(.0))]
    NoCounterpart(Role),
    #[error("Unknown account role: {0}")]
    UnknownRole(String),
    /// The token names a user that no longer exists.
    #[error("User not found")]
    UnknownActor,
    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

pub fn no_counterpart_message(role: &Role) -> &'static str {
    match role {
        Role::Companion => "لا يوجد مريض مرتبط بهذا الحساب",
        Role::Patient => "لا يوجد مرافقون مرتبطون بهذا الحساب",
    }
}

impl SosError {
    pub fn status(&self) -> StatusCode {
        match self {
            SosError::InvalidInput | SosError::NoCounterpart(_) | SosError::UnknownRole(_) => {
                StatusCode::BAD_REQUEST
            }
            SosError::UnknownActor => StatusCode::UNAUTHORIZED,
            SosError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for SosError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => SosError::UnknownActor,
            StoreError::UnknownRole(role) => SosError::UnknownRole(role),
            StoreError::Database(e) => SosError::Internal(e.into()),
            StoreError::Other(e) => SosError::Internal(e),
            other @ StoreError::Conflict(_) => SosError::Internal(other.into()),
        }
    }
}

impl IntoResponse for SosError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            SosError::Internal(cause) => {
                error!(error = %cause, "sos request failed");
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ApiMessage::failure(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_counterpart_text_depends_on_role() {
        assert_eq!(
            SosError::NoCounterpart(Role::Companion).to_string(),
            "لا يوجد مريض مرتبط بهذا الحساب"
        );
        assert_eq!(
            SosError::NoCounterpart(Role::Patient).to_string(),
            "لا يوجد مرافقون مرتبطون بهذا الحساب"
        );
    }

    #[test]
    fn statuses() {
        assert_eq!(SosError::InvalidInput.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            SosError::from(StoreError::UnknownRole("admin".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SosError::from(StoreError::Other(anyhow::anyhow!("boom"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(SosError::InvalidInput.to_string(), INVALID_IS_ACTIVE);
    }
}
