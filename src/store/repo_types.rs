use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::StoreError;
use crate::accounts::model::{Companion, Counterpart, Patient, Relationship, Role, User};
use crate::notifications::{Notification, NotificationKind};
use crate::sos::alert::AlertFields;

/// Row of `users`. `account_type` is kept raw so an unexpected value
/// surfaces as `StoreError::UnknownRole` instead of a decode failure.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub phone_number: String,
    pub account_type: String,
    pub name: String,
    pub location: Option<String>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let role: Role = r
            .account_type
            .parse()
            .map_err(|_| StoreError::UnknownRole(r.account_type.clone()))?;
        Ok(User {
            id: r.id,
            email: r.email,
            username: r.username,
            phone_number: r.phone_number,
            role,
            name: r.name,
            location: r.location,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PatientRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub medical_condition: String,
    pub current_gps_location: Option<String>,
    pub additional_notes: Option<String>,
    pub sos_alert: bool,
    pub last_sos_time: Option<OffsetDateTime>,
}

impl From<PatientRow> for Patient {
    fn from(r: PatientRow) -> Self {
        Patient {
            id: r.id,
            user_id: r.user_id,
            medical_condition: r.medical_condition,
            current_gps_location: r.current_gps_location,
            additional_notes: r.additional_notes,
            alert: AlertFields {
                sos_alert: r.sos_alert,
                last_sos_time: r.last_sos_time,
            },
        }
    }
}

#[derive(Debug, FromRow)]
pub struct CompanionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub relationship: Option<String>,
    pub alert_settings: Option<String>,
    pub sos_alert: bool,
    pub last_sos_time: Option<OffsetDateTime>,
}

impl TryFrom<CompanionRow> for Companion {
    type Error = StoreError;

    fn try_from(r: CompanionRow) -> Result<Self, Self::Error> {
        Ok(Companion {
            id: r.id,
            user_id: r.user_id,
            patient_id: r.patient_id,
            relationship: parse_relationship(r.relationship)?,
            alert_settings: r.alert_settings,
            alert: AlertFields {
                sos_alert: r.sos_alert,
                last_sos_time: r.last_sos_time,
            },
        })
    }
}

#[derive(Debug, FromRow)]
pub struct CounterpartRow {
    pub user_id: Uuid,
    pub username: String,
    pub name: String,
    pub relationship: Option<String>,
}

impl TryFrom<CounterpartRow> for Counterpart {
    type Error = StoreError;

    fn try_from(r: CounterpartRow) -> Result<Self, Self::Error> {
        Ok(Counterpart {
            user_id: r.user_id,
            username: r.username,
            name: r.name,
            relationship: parse_relationship(r.relationship)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transmission_time: OffsetDateTime,
    pub notification_type: String,
    pub message: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(r: NotificationRow) -> Result<Self, Self::Error> {
        let kind: NotificationKind = r
            .notification_type
            .parse()
            .map_err(|e: String| StoreError::Other(anyhow::anyhow!(e)))?;
        Ok(Notification {
            id: r.id,
            user_id: r.user_id,
            transmission_time: r.transmission_time,
            kind,
            message: r.message,
        })
    }
}

fn parse_relationship(raw: Option<String>) -> Result<Option<Relationship>, StoreError> {
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e: String| StoreError::Other(anyhow::anyhow!(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn user_row(account_type: &str) -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            email: "a@b.io".into(),
            username: "a".into(),
            phone_number: "+15550001".into(),
            account_type: account_type.into(),
            name: "A".into(),
            location: None,
            created_at: datetime!(2025-01-01 0:00 UTC),
        }
    }

    #[test]
    fn user_row_with_legacy_role_converts() {
        let user = User::try_from(user_row("companions")).unwrap();
        assert_eq!(user.role, Role::Companion);
    }

    #[test]
    fn user_row_with_unknown_role_is_rejected() {
        let err = User::try_from(user_row("admin")).unwrap_err();
        assert!(matches!(err, StoreError::UnknownRole(r) if r == "admin"));
    }

    #[test]
    fn blank_relationship_reads_as_none() {
        let row = CompanionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            patient_id: None,
            relationship: Some(String::new()),
            alert_settings: None,
            sos_alert: false,
            last_sos_time: None,
        };
        assert_eq!(Companion::try_from(row).unwrap().relationship, None);
    }

    #[test]
    fn notification_row_converts_kind() {
        let row = NotificationRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            transmission_time: datetime!(2025-01-01 0:00 UTC),
            notification_type: "security".into(),
            message: "m".into(),
        };
        assert_eq!(
            Notification::try_from(row).unwrap().kind,
            NotificationKind::Security
        );
    }
}
