use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts::dto::{NewAccount, ProfileUpdate};
use crate::accounts::model::{ActorProfile, ActorSnapshot, Role, User};
use crate::error::ApiError;
use crate::links::services::{attach_companion, link_patient, LinkError};
use crate::store::{CareStore, StoreError};

const MAX_NAME_LEN: usize = 100;
/// Width of `users.phone_number`.
const MAX_PHONE_LEN: usize = 15;
const MAX_LOCATION_LEN: usize = 255;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9]{7,15}$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.@+-]{1,150}$").unwrap();
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Invalid(String),
    #[error("Patient not found")]
    PatientNotFound,
    #[error("User not found")]
    UnknownActor,
    #[error("{0} already taken")]
    Conflict(&'static str),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(field) => AccountError::Conflict(field),
            other => AccountError::Store(other),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Invalid(msg) => ApiError::BadRequest(msg),
            AccountError::PatientNotFound => ApiError::NotFound("Patient not found".into()),
            AccountError::UnknownActor => ApiError::Unauthorized("User not found".into()),
            AccountError::Conflict(field) => ApiError::Conflict(field),
            AccountError::Link(e) => e.into(),
            AccountError::Store(e) => e.into(),
        }
    }
}

/// A freshly created user together with the sub-profile made for it.
#[derive(Debug, Clone)]
pub struct Account {
    pub user: User,
    pub profile: ActorProfile,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    phone.len() <= MAX_PHONE_LEN && PHONE_RE.is_match(phone)
}

fn check_name(name: &str) -> Result<(), AccountError> {
    let len = name.trim().chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(AccountError::Invalid(format!(
            "name must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn check_location(location: &Option<String>) -> Result<(), AccountError> {
    match location {
        Some(l) if l.chars().count() > MAX_LOCATION_LEN => Err(AccountError::Invalid(format!(
            "location must be at most {MAX_LOCATION_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

/// Creates a user and exactly one sub-profile matching its role, written
/// together. A companion may be linked to an existing patient right away.
pub async fn create_account(
    store: &dyn CareStore,
    mut new: NewAccount,
    now: OffsetDateTime,
) -> Result<Account, AccountError> {
    new.email = new.email.trim().to_lowercase();
    new.username = new.username.trim().to_string();
    new.phone_number = new.phone_number.trim().to_string();

    if !is_valid_email(&new.email) {
        return Err(AccountError::Invalid("Invalid email".into()));
    }
    if !USERNAME_RE.is_match(&new.username) {
        return Err(AccountError::Invalid("Invalid username".into()));
    }
    if !is_valid_phone(&new.phone_number) {
        return Err(AccountError::Invalid("Invalid phone number".into()));
    }
    check_name(&new.name)?;
    check_location(&new.location)?;
    if new.role == Role::Patient && (new.relationship.is_some() || new.patient_username.is_some())
    {
        return Err(AccountError::Invalid(
            "relationship and patient_username apply to companions only".into(),
        ));
    }

    let user = User {
        id: Uuid::new_v4(),
        email: new.email,
        username: new.username,
        phone_number: new.phone_number,
        role: new.role,
        name: new.name.trim().to_string(),
        location: new.location,
        created_at: now,
    };

    let mut profile = ActorProfile::for_new_user(user.role, user.id);
    if let ActorProfile::Companion(companion) = &mut profile {
        companion.relationship = new.relationship;
        if let Some(username) = new.patient_username.as_deref() {
            let (_, patient) = store
                .find_patient_by_username(username)
                .await?
                .ok_or_else(|| {
                    warn!(patient_username = %username, "companion signup names unknown patient");
                    AccountError::PatientNotFound
                })?;
            companion.patient_id = Some(patient.id);
        }
    }

    store.insert_account(&user, &profile).await?;
    info!(user_id = %user.id, role = %user.role, "account created");
    Ok(Account { user, profile })
}

/// Applies a partial profile update and returns the fresh profile.
///
/// `patient_username` / `companion_username` go through the link operations.
/// On the patient side that adds a companion; existing companions stay linked.
pub async fn update_profile(
    store: &dyn CareStore,
    user_id: Uuid,
    update: ProfileUpdate,
) -> Result<ActorSnapshot, AccountError> {
    let ActorSnapshot {
        mut user,
        mut profile,
        ..
    } = store.load_actor(user_id).await.map_err(|e| match e {
        StoreError::NotFound => AccountError::UnknownActor,
        other => other.into(),
    })?;

    match user.role {
        Role::Patient if update.has_companion_fields() => {
            return Err(AccountError::Invalid(
                "relationship, alert_settings and patient_username apply to companions only"
                    .into(),
            ));
        }
        Role::Companion if update.has_patient_fields() => {
            return Err(AccountError::Invalid(
                "medical_condition, current_gps_location, additional_notes and companion_username \
                 apply to patients only"
                    .into(),
            ));
        }
        _ => {}
    }

    let mut user_changed = false;
    if let Some(name) = update.name {
        check_name(&name)?;
        user.name = name.trim().to_string();
        user_changed = true;
    }
    if let Some(phone) = update.phone_number {
        let phone = phone.trim().to_string();
        if !is_valid_phone(&phone) {
            return Err(AccountError::Invalid("Invalid phone number".into()));
        }
        user.phone_number = phone;
        user_changed = true;
    }
    if let Some(location) = update.location {
        let location = Some(location);
        check_location(&location)?;
        user.location = location;
        user_changed = true;
    }

    let mut profile_changed = false;
    match &mut profile {
        ActorProfile::Patient(p) => {
            if let Some(v) = update.medical_condition {
                p.medical_condition = v;
                profile_changed = true;
            }
            if let Some(v) = update.current_gps_location {
                p.current_gps_location = Some(v);
                profile_changed = true;
            }
            if let Some(v) = update.additional_notes {
                p.additional_notes = Some(v);
                profile_changed = true;
            }
        }
        ActorProfile::Companion(c) => {
            if let Some(v) = update.relationship {
                c.relationship = Some(v);
                profile_changed = true;
            }
            if let Some(v) = update.alert_settings {
                c.alert_settings = Some(v);
                profile_changed = true;
            }
        }
    }

    // every field is validated by now; the link write goes first so a
    // missing counterpart fails the request before any detail is saved
    if let Some(username) = update.patient_username.as_deref() {
        link_patient(store, user_id, username.trim()).await?;
    }
    if let Some(username) = update.companion_username.as_deref() {
        attach_companion(store, user_id, username.trim()).await?;
    }

    if user_changed || profile_changed {
        store
            .save_details(
                user_changed.then_some(&user),
                profile_changed.then_some(&profile),
            )
            .await?;
    }
    info!(%user_id, user_changed, profile_changed, "profile updated");

    Ok(store.load_actor(user_id).await?)
}
