use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CareStore, StoreError};
use crate::accounts::model::{
    ActorProfile, ActorSnapshot, Companion, Counterpart, Patient, ProfileKey, Role, User,
};
use crate::notifications::{NewNotification, Notification};
use crate::sos::alert::AlertFields;

/// User as stored: the role stays raw text, like the `account_type` column.
#[derive(Debug, Clone)]
struct UserRecord {
    id: Uuid,
    email: String,
    username: String,
    phone_number: String,
    account_type: String,
    name: String,
    location: Option<String>,
    created_at: OffsetDateTime,
}

impl UserRecord {
    fn from_user(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            username: u.username.clone(),
            phone_number: u.phone_number.clone(),
            account_type: u.role.as_str().to_string(),
            name: u.name.clone(),
            location: u.location.clone(),
            created_at: u.created_at,
        }
    }

    fn to_user(&self) -> Result<User, StoreError> {
        let role: Role = self
            .account_type
            .parse()
            .map_err(|_| StoreError::UnknownRole(self.account_type.clone()))?;
        Ok(User {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            phone_number: self.phone_number.clone(),
            role,
            name: self.name.clone(),
            location: self.location.clone(),
            created_at: self.created_at,
        })
    }
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, UserRecord>,
    patients: HashMap<Uuid, Patient>,
    companions: HashMap<Uuid, Companion>,
    notifications: Vec<Notification>,
    rejected_recipients: HashSet<Uuid>,
}

impl Inner {
    fn patient_of_user(&self, user_id: Uuid) -> Option<&Patient> {
        self.patients.values().find(|p| p.user_id == user_id)
    }

    fn companion_of_user(&self, user_id: Uuid) -> Option<&Companion> {
        self.companions.values().find(|c| c.user_id == user_id)
    }

    fn user_by_username(&self, username: &str) -> Option<&UserRecord> {
        self.users.values().find(|u| u.username == username)
    }

    fn counterpart(&self, user_id: Uuid, companion: Option<&Companion>) -> Option<Counterpart> {
        self.users.get(&user_id).map(|u| Counterpart {
            user_id: u.id,
            username: u.username.clone(),
            name: u.name.clone(),
            relationship: companion.and_then(|c| c.relationship),
        })
    }
}

/// Map-backed `CareStore` with the same constraints as the SQL schema:
/// unique email/username/phone, one sub-profile per user, cascading deletes
/// and link nulling when a patient goes away. Every method holds the lock
/// for its whole body, so each call is atomic.
#[derive(Default)]
pub struct InMemoryCareStore {
    inner: RwLock<Inner>,
}

impl InMemoryCareStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a user row with an arbitrary `account_type`, bypassing the
    /// account factory. Used to reproduce rows written by older clients.
    pub async fn insert_raw_user(&self, user: &User, account_type: &str) {
        let mut record = UserRecord::from_user(user);
        record.account_type = account_type.to_string();
        self.inner.write().await.users.insert(user.id, record);
    }

    /// Makes every later notification write for `user_id` fail, to observe
    /// partial fan-out delivery.
    pub async fn reject_notifications_for(&self, user_id: Uuid) {
        self.inner.write().await.rejected_recipients.insert(user_id);
    }
}

#[async_trait]
impl CareStore for InMemoryCareStore {
    async fn insert_account(&self, user: &User, profile: &ActorProfile) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for existing in inner.users.values() {
            if existing.email == user.email {
                return Err(StoreError::Conflict("email"));
            }
            if existing.username == user.username {
                return Err(StoreError::Conflict("username"));
            }
            if existing.phone_number == user.phone_number {
                return Err(StoreError::Conflict("phone_number"));
            }
        }
        if inner.users.contains_key(&user.id) {
            return Err(StoreError::Conflict("record"));
        }
        if let ActorProfile::Companion(Companion {
            patient_id: Some(pid),
            ..
        }) = profile
        {
            if !inner.patients.contains_key(pid) {
                return Err(StoreError::NotFound);
            }
        }

        inner.users.insert(user.id, UserRecord::from_user(user));
        match profile {
            ActorProfile::Patient(p) => {
                inner.patients.insert(p.id, p.clone());
            }
            ActorProfile::Companion(c) => {
                inner.companions.insert(c.id, c.clone());
            }
        }
        Ok(())
    }

    async fn delete_account(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.users.remove(&user_id).is_none() {
            return Err(StoreError::NotFound);
        }
        let removed_patients: Vec<Uuid> = inner
            .patients
            .values()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.id)
            .collect();
        for pid in &removed_patients {
            inner.patients.remove(pid);
        }
        inner.companions.retain(|_, c| c.user_id != user_id);
        for c in inner.companions.values_mut() {
            if c.patient_id.is_some_and(|pid| removed_patients.contains(&pid)) {
                c.patient_id = None;
            }
        }
        inner.notifications.retain(|n| n.user_id != user_id);
        Ok(())
    }

    async fn load_actor(&self, user_id: Uuid) -> Result<ActorSnapshot, StoreError> {
        let inner = self.inner.read().await;
        let user = inner
            .users
            .get(&user_id)
            .ok_or(StoreError::NotFound)?
            .to_user()?;

        let (profile, mut counterparts) = match user.role {
            Role::Patient => {
                let patient = inner
                    .patient_of_user(user_id)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("patient profile missing for user {user_id}"))?;
                let counterparts: Vec<Counterpart> = inner
                    .companions
                    .values()
                    .filter(|c| c.patient_id == Some(patient.id))
                    .filter_map(|c| inner.counterpart(c.user_id, Some(c)))
                    .collect();
                (ActorProfile::Patient(patient), counterparts)
            }
            Role::Companion => {
                let companion = inner
                    .companion_of_user(user_id)
                    .cloned()
                    .ok_or_else(|| {
                        anyhow::anyhow!("companion profile missing for user {user_id}")
                    })?;
                let counterparts: Vec<Counterpart> = companion
                    .patient_id
                    .and_then(|pid| inner.patients.get(&pid))
                    .and_then(|p| inner.counterpart(p.user_id, None))
                    .into_iter()
                    .collect();
                (ActorProfile::Companion(companion), counterparts)
            }
        };
        counterparts.sort_by(|a, b| a.username.cmp(&b.username));

        Ok(ActorSnapshot {
            user,
            profile,
            counterparts,
        })
    }

    async fn find_patient_by_username(
        &self,
        username: &str,
    ) -> Result<Option<(User, Patient)>, StoreError> {
        let inner = self.inner.read().await;
        let Some(record) = inner.user_by_username(username) else {
            return Ok(None);
        };
        let user = record.to_user()?;
        if user.role != Role::Patient {
            return Ok(None);
        }
        Ok(inner.patient_of_user(user.id).cloned().map(|p| (user, p)))
    }

    async fn find_companion_by_username(
        &self,
        username: &str,
    ) -> Result<Option<(User, Companion)>, StoreError> {
        let inner = self.inner.read().await;
        let Some(record) = inner.user_by_username(username) else {
            return Ok(None);
        };
        let user = record.to_user()?;
        if user.role != Role::Companion {
            return Ok(None);
        }
        Ok(inner.companion_of_user(user.id).cloned().map(|c| (user, c)))
    }

    async fn save_details(
        &self,
        user: Option<&User>,
        profile: Option<&ActorProfile>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        // check everything before the first write
        if let Some(user) = user {
            if inner
                .users
                .values()
                .any(|u| u.id != user.id && u.phone_number == user.phone_number)
            {
                return Err(StoreError::Conflict("phone_number"));
            }
            if !inner.users.contains_key(&user.id) {
                return Err(StoreError::NotFound);
            }
        }
        let profile_exists = match profile {
            Some(ActorProfile::Patient(p)) => inner.patients.contains_key(&p.id),
            Some(ActorProfile::Companion(c)) => inner.companions.contains_key(&c.id),
            None => true,
        };
        if !profile_exists {
            return Err(StoreError::NotFound);
        }

        if let Some(user) = user {
            if let Some(record) = inner.users.get_mut(&user.id) {
                record.name = user.name.clone();
                record.phone_number = user.phone_number.clone();
                record.location = user.location.clone();
            }
        }
        match profile {
            Some(ActorProfile::Patient(p)) => {
                if let Some(stored) = inner.patients.get_mut(&p.id) {
                    stored.medical_condition = p.medical_condition.clone();
                    stored.current_gps_location = p.current_gps_location.clone();
                    stored.additional_notes = p.additional_notes.clone();
                }
            }
            Some(ActorProfile::Companion(c)) => {
                if let Some(stored) = inner.companions.get_mut(&c.id) {
                    stored.relationship = c.relationship;
                    stored.alert_settings = c.alert_settings.clone();
                }
            }
            None => {}
        }
        Ok(())
    }

    async fn update_alert(&self, key: ProfileKey, alert: AlertFields) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let slot = match key {
            ProfileKey::Patient(id) => inner.patients.get_mut(&id).map(|p| &mut p.alert),
            ProfileKey::Companion(id) => inner.companions.get_mut(&id).map(|c| &mut c.alert),
        };
        *slot.ok_or(StoreError::NotFound)? = alert;
        Ok(())
    }

    async fn set_companion_patient(
        &self,
        companion_id: Uuid,
        patient_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(pid) = patient_id {
            if !inner.patients.contains_key(&pid) {
                return Err(StoreError::NotFound);
            }
        }
        let companion = inner
            .companions
            .get_mut(&companion_id)
            .ok_or(StoreError::NotFound)?;
        companion.patient_id = patient_id;
        Ok(())
    }

    async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.rejected_recipients.contains(&notification.user_id) {
            return Err(StoreError::Other(anyhow::anyhow!(
                "notification write rejected for {}",
                notification.user_id
            )));
        }
        if !inner.users.contains_key(&notification.user_id) {
            return Err(StoreError::NotFound);
        }
        let stored = notification.clone().into_notification(Uuid::new_v4());
        inner.notifications.push(stored.clone());
        Ok(stored)
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<Notification> = inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.transmission_time.cmp(&a.transmission_time));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn user(username: &str, role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: format!("{username}@example.com"),
            username: username.to_string(),
            phone_number: format!("+1555{:07}", username.len() * 7919 % 10_000_000),
            role,
            name: username.to_uppercase(),
            location: None,
            created_at: datetime!(2025-01-01 0:00 UTC),
        }
    }

    async fn add(store: &InMemoryCareStore, u: &User) -> ActorProfile {
        let profile = ActorProfile::for_new_user(u.role, u.id);
        store.insert_account(u, &profile).await.unwrap();
        profile
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let store = InMemoryCareStore::new();
        let a = user("amal", Role::Patient);
        add(&store, &a).await;
        let mut b = user("amal", Role::Companion);
        b.email = "other@example.com".into();
        b.phone_number = "+15559999999".into();
        let err = store
            .insert_account(&b, &ActorProfile::for_new_user(b.role, b.id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict("username")));
    }

    #[tokio::test]
    async fn deleting_patient_unlinks_companions() {
        let store = InMemoryCareStore::new();
        let p = user("pat", Role::Patient);
        let c = user("companion", Role::Companion);
        let ActorProfile::Patient(patient) = add(&store, &p).await else {
            unreachable!()
        };
        let ActorProfile::Companion(companion) = add(&store, &c).await else {
            unreachable!()
        };
        store
            .set_companion_patient(companion.id, Some(patient.id))
            .await
            .unwrap();
        assert_eq!(store.load_actor(c.id).await.unwrap().counterparts.len(), 1);

        store.delete_account(p.id).await.unwrap();

        let snap = store.load_actor(c.id).await.unwrap();
        assert!(snap.counterparts.is_empty());
        assert!(matches!(
            snap.profile,
            ActorProfile::Companion(Companion { patient_id: None, .. })
        ));
    }

    #[tokio::test]
    async fn linking_to_missing_patient_is_not_found() {
        let store = InMemoryCareStore::new();
        let c = user("companion", Role::Companion);
        let ActorProfile::Companion(companion) = add(&store, &c).await else {
            unreachable!()
        };
        let err = store
            .set_companion_patient(companion.id, Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn unknown_role_surfaces_on_load() {
        let store = InMemoryCareStore::new();
        let u = user("ghost", Role::Patient);
        store.insert_raw_user(&u, "caretaker").await;
        let err = store.load_actor(u.id).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownRole(r) if r == "caretaker"));
    }

    #[tokio::test]
    async fn rejected_details_leave_both_records_untouched() {
        let store = InMemoryCareStore::new();
        let a = user("amal", Role::Companion);
        let b = user("badria", Role::Companion);
        add(&store, &a).await;
        let ActorProfile::Companion(mut companion) = add(&store, &b).await else {
            unreachable!()
        };

        let mut changed = b.clone();
        changed.name = "Badria B.".into();
        changed.phone_number = a.phone_number.clone();
        companion.alert_settings = Some("loud".into());
        let profile = ActorProfile::Companion(companion);

        let err = store
            .save_details(Some(&changed), Some(&profile))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict("phone_number")));

        let snap = store.load_actor(b.id).await.unwrap();
        assert_eq!(snap.user.name, b.name);
        let ActorProfile::Companion(stored) = snap.profile else {
            unreachable!()
        };
        assert_eq!(stored.alert_settings, None);
    }

    #[tokio::test]
    async fn update_alert_touches_only_alert_fields() {
        let store = InMemoryCareStore::new();
        let p = user("pat", Role::Patient);
        let profile = add(&store, &p).await;
        let at = datetime!(2025-02-02 12:00 UTC);
        store
            .update_alert(
                profile.key(),
                AlertFields {
                    sos_alert: true,
                    last_sos_time: Some(at),
                },
            )
            .await
            .unwrap();
        let snap = store.load_actor(p.id).await.unwrap();
        assert!(snap.profile.alert().sos_alert);
        assert_eq!(snap.profile.alert().last_sos_time, Some(at));
    }
}
