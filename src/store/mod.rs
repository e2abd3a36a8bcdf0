//! Persistence collaborator.
//!
//! Everything above this module talks to a `CareStore` trait object; the
//! Postgres implementation backs the running service and the in-memory one
//! backs `AppState::fake()` and the tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::accounts::model::{ActorProfile, ActorSnapshot, Companion, Patient, ProfileKey, User};
use crate::notifications::{NewNotification, Notification};
use crate::sos::alert::AlertFields;

pub mod memory;
pub mod pg;
mod repo_types;

pub use memory::InMemoryCareStore;
pub use pg::PgCareStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("unknown account role {0:?}")]
    UnknownRole(String),
    #[error("{0} already taken")]
    Conflict(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait CareStore: Send + Sync {
    /// Writes a user and its sub-profile as one unit of work.
    async fn insert_account(&self, user: &User, profile: &ActorProfile) -> Result<(), StoreError>;

    /// Removes a user, its sub-profile and its notifications. Companions
    /// linked to a removed patient become unlinked.
    async fn delete_account(&self, user_id: Uuid) -> Result<(), StoreError>;

    /// Reads the user, its sub-profile and its counterpart set from a single
    /// snapshot of the link state.
    async fn load_actor(&self, user_id: Uuid) -> Result<ActorSnapshot, StoreError>;

    async fn find_patient_by_username(
        &self,
        username: &str,
    ) -> Result<Option<(User, Patient)>, StoreError>;

    async fn find_companion_by_username(
        &self,
        username: &str,
    ) -> Result<Option<(User, Companion)>, StoreError>;

    /// Persists the user's name, phone number and location and the
    /// descriptive sub-profile columns as one unit of work. Either side may be
    /// skipped; alert fields and the link edge are left untouched.
    async fn save_details(
        &self,
        user: Option<&User>,
        profile: Option<&ActorProfile>,
    ) -> Result<(), StoreError>;

    /// Single-row write of `sos_alert` / `last_sos_time`.
    async fn update_alert(&self, key: ProfileKey, alert: AlertFields) -> Result<(), StoreError>;

    /// Single-row write of the link edge. A `patient_id` that does not exist
    /// yields `NotFound`.
    async fn set_companion_patient(
        &self,
        companion_id: Uuid,
        patient_id: Option<Uuid>,
    ) -> Result<(), StoreError>;

    async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, StoreError>;

    /// Newest first.
    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError>;
}
