//! Patient ↔ companion link management.
//!
//! The edge lives on the companion (`companions.patient_id`). A patient's
//! companions are the companions pointing at it. Every write here touches
//! exactly one companion row.

use tracing::{debug, info};
use uuid::Uuid;

use crate::accounts::model::{ActorProfile, ActorSnapshot, Counterpart, Role};
use crate::error::ApiError;
use crate::store::{CareStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("User not found")]
    UnknownActor,
    #[error("only a {0} can do this")]
    WrongRole(Role),
    #[error("Patient not found")]
    PatientNotFound,
    #[error("Companion not found")]
    CompanionNotFound,
    #[error("Companion is not linked to you")]
    NotLinked,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LinkError> for ApiError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::UnknownActor => ApiError::Unauthorized(e.to_string()),
            LinkError::WrongRole(_) => ApiError::Forbidden(e.to_string()),
            LinkError::PatientNotFound | LinkError::CompanionNotFound | LinkError::NotLinked => {
                ApiError::NotFound(e.to_string())
            }
            LinkError::Store(e) => e.into(),
        }
    }
}

/// Reads the actor and its counterpart set in one snapshot. A companion's
/// set is its linked patient, a patient's set is every companion linked to it.
pub async fn resolve_actor(
    store: &dyn CareStore,
    user_id: Uuid,
) -> Result<ActorSnapshot, StoreError> {
    let snapshot = store.load_actor(user_id).await?;
    debug!(
        %user_id,
        role = %snapshot.user.role,
        counterparts = snapshot.counterparts.len(),
        "actor resolved"
    );
    Ok(snapshot)
}

/// `resolve_actor` for the authenticated caller: a token whose user is gone
/// is an authentication failure, not a missing resource.
pub async fn resolve_caller(
    store: &dyn CareStore,
    user_id: Uuid,
) -> Result<ActorSnapshot, LinkError> {
    resolve_actor(store, user_id).await.map_err(|e| match e {
        StoreError::NotFound => LinkError::UnknownActor,
        other => LinkError::Store(other),
    })
}

pub async fn counterparts(
    store: &dyn CareStore,
    user_id: Uuid,
) -> Result<Vec<Counterpart>, LinkError> {
    Ok(resolve_caller(store, user_id).await?.counterparts)
}

/// Companion side: point the caller at `patient_username`, replacing any
/// previous link.
pub async fn link_patient(
    store: &dyn CareStore,
    user_id: Uuid,
    patient_username: &str,
) -> Result<Counterpart, LinkError> {
    let snapshot = resolve_caller(store, user_id).await?;
    let ActorProfile::Companion(companion) = snapshot.profile else {
        return Err(LinkError::WrongRole(Role::Companion));
    };
    let (patient_user, patient) = store
        .find_patient_by_username(patient_username)
        .await?
        .ok_or(LinkError::PatientNotFound)?;

    store
        .set_companion_patient(companion.id, Some(patient.id))
        .await
        .map_err(|e| match e {
            StoreError::NotFound => LinkError::PatientNotFound,
            other => LinkError::Store(other),
        })?;
    info!(companion_user = %user_id, patient_user = %patient_user.id, "companion linked to patient");

    Ok(Counterpart {
        user_id: patient_user.id,
        username: patient_user.username,
        name: patient_user.name,
        relationship: None,
    })
}

/// Companion side: drop the link. Unlinking an unlinked companion is fine.
pub async fn unlink_patient(store: &dyn CareStore, user_id: Uuid) -> Result<(), LinkError> {
    let snapshot = resolve_caller(store, user_id).await?;
    let ActorProfile::Companion(companion) = snapshot.profile else {
        return Err(LinkError::WrongRole(Role::Companion));
    };
    if companion.patient_id.is_some() {
        store.set_companion_patient(companion.id, None).await?;
        info!(companion_user = %user_id, "companion unlinked from patient");
    }
    Ok(())
}

/// Patient side: link `companion_username` to the caller. The companion's
/// previous patient, if any, loses it.
pub async fn attach_companion(
    store: &dyn CareStore,
    user_id: Uuid,
    companion_username: &str,
) -> Result<Counterpart, LinkError> {
    let snapshot = resolve_caller(store, user_id).await?;
    let ActorProfile::Patient(patient) = snapshot.profile else {
        return Err(LinkError::WrongRole(Role::Patient));
    };
    let (companion_user, companion) = store
        .find_companion_by_username(companion_username)
        .await?
        .ok_or(LinkError::CompanionNotFound)?;

    store
        .set_companion_patient(companion.id, Some(patient.id))
        .await?;
    info!(patient_user = %user_id, companion_user = %companion_user.id, "companion attached");

    Ok(Counterpart {
        user_id: companion_user.id,
        username: companion_user.username,
        name: companion_user.name,
        relationship: companion.relationship,
    })
}

/// Patient side: unlink one of the caller's companions.
pub async fn detach_companion(
    store: &dyn CareStore,
    user_id: Uuid,
    companion_username: &str,
) -> Result<(), LinkError> {
    let snapshot = resolve_caller(store, user_id).await?;
    let ActorProfile::Patient(patient) = snapshot.profile else {
        return Err(LinkError::WrongRole(Role::Patient));
    };
    let (_, companion) = store
        .find_companion_by_username(companion_username)
        .await?
        .ok_or(LinkError::CompanionNotFound)?;
    if companion.patient_id != Some(patient.id) {
        return Err(LinkError::NotLinked);
    }

    store.set_companion_patient(companion.id, None).await?;
    info!(patient_user = %user_id, companion = %companion_username, "companion detached");
    Ok(())
}
