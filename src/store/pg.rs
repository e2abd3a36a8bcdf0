use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::repo_types::{CompanionRow, CounterpartRow, NotificationRow, PatientRow, UserRow};
use super::{CareStore, StoreError};
use crate::accounts::model::{
    ActorProfile, ActorSnapshot, Companion, Counterpart, Patient, ProfileKey, Role, User,
};
use crate::config::AppConfig;
use crate::notifications::{NewNotification, Notification};
use crate::sos::alert::AlertFields;

const USER_COLUMNS: &str =
    "id, email, username, phone_number, account_type, name, location, created_at";
const PATIENT_COLUMNS: &str = "id, user_id, medical_condition, current_gps_location, \
     additional_notes, sos_alert, last_sos_time";
const COMPANION_COLUMNS: &str =
    "id, user_id, patient_id, relationship, alert_settings, sos_alert, last_sos_time";

#[derive(Clone)]
pub struct PgCareStore {
    db: PgPool,
}

impl PgCareStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

/// Maps constraint violations onto the store's error vocabulary.
fn classify(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("users_email_key") => "email",
                Some("users_username_key") => "username",
                Some("users_phone_number_key") => "phone_number",
                _ => "record",
            };
            return StoreError::Conflict(field);
        }
        if db.is_foreign_key_violation() {
            return StoreError::NotFound;
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl CareStore for PgCareStore {
    async fn insert_account(&self, user: &User, profile: &ActorProfile) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, username, phone_number, account_type, name, location, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.phone_number)
        .bind(user.role.as_str())
        .bind(&user.name)
        .bind(&user.location)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        match profile {
            ActorProfile::Patient(p) => {
                sqlx::query(
                    r#"
                    INSERT INTO patients (id, user_id, medical_condition, current_gps_location,
                                          additional_notes, sos_alert, last_sos_time)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(p.id)
                .bind(p.user_id)
                .bind(&p.medical_condition)
                .bind(&p.current_gps_location)
                .bind(&p.additional_notes)
                .bind(p.alert.sos_alert)
                .bind(p.alert.last_sos_time)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
            }
            ActorProfile::Companion(c) => {
                sqlx::query(
                    r#"
                    INSERT INTO companions (id, user_id, patient_id, relationship, alert_settings,
                                            sos_alert, last_sos_time)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(c.id)
                .bind(c.user_id)
                .bind(c.patient_id)
                .bind(c.relationship.map(|r| r.as_str()))
                .bind(&c.alert_settings)
                .bind(c.alert.sos_alert)
                .bind(c.alert.last_sos_time)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
            }
        }

        tx.commit().await?;
        debug!(user_id = %user.id, role = %user.role, "account inserted");
        Ok(())
    }

    async fn delete_account(&self, user_id: Uuid) -> Result<(), StoreError> {
        // patients/companions/notifications cascade; companions.patient_id is SET NULL
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn load_actor(&self, user_id: Uuid) -> Result<ActorSnapshot, StoreError> {
        let mut tx = self.db.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        let user = User::try_from(row)?;

        let (profile, counterpart_rows) = match user.role {
            Role::Patient => {
                let patient: Patient = sqlx::query_as::<_, PatientRow>(&format!(
                    "SELECT {PATIENT_COLUMNS} FROM patients WHERE user_id = $1"
                ))
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| anyhow::anyhow!("patient profile missing for user {user_id}"))?
                .into();

                let rows = sqlx::query_as::<_, CounterpartRow>(
                    r#"
                    SELECT u.id AS user_id, u.username, u.name, c.relationship
                      FROM companions c
                      JOIN users u ON u.id = c.user_id
                     WHERE c.patient_id = $1
                     ORDER BY u.username
                    "#,
                )
                .bind(patient.id)
                .fetch_all(&mut *tx)
                .await?;
                (ActorProfile::Patient(patient), rows)
            }
            Role::Companion => {
                let companion: Companion = sqlx::query_as::<_, CompanionRow>(&format!(
                    "SELECT {COMPANION_COLUMNS} FROM companions WHERE user_id = $1"
                ))
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| anyhow::anyhow!("companion profile missing for user {user_id}"))?
                .try_into()?;

                let rows = match companion.patient_id {
                    Some(patient_id) => {
                        sqlx::query_as::<_, CounterpartRow>(
                            r#"
                            SELECT u.id AS user_id, u.username, u.name, NULL::text AS relationship
                              FROM patients p
                              JOIN users u ON u.id = p.user_id
                             WHERE p.id = $1
                            "#,
                        )
                        .bind(patient_id)
                        .fetch_all(&mut *tx)
                        .await?
                    }
                    None => Vec::new(),
                };
                (ActorProfile::Companion(companion), rows)
            }
        };

        tx.commit().await?;

        let counterparts = counterpart_rows
            .into_iter()
            .map(Counterpart::try_from)
            .collect::<Result<Vec<_>, _>>()?;

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
        let Some(row) = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?
        else {
            return Ok(None);
        };
        let user = User::try_from(row)?;
        if user.role != Role::Patient {
            return Ok(None);
        }

        let patient = sqlx::query_as::<_, PatientRow>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE user_id = $1"
        ))
        .bind(user.id)
        .fetch_optional(&self.db)
        .await?;
        Ok(patient.map(|p| (user, p.into())))
    }

    async fn find_companion_by_username(
        &self,
        username: &str,
    ) -> Result<Option<(User, Companion)>, StoreError> {
        let Some(row) = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?
        else {
            return Ok(None);
        };
        let user = User::try_from(row)?;
        if user.role != Role::Companion {
            return Ok(None);
        }

        let companion = sqlx::query_as::<_, CompanionRow>(&format!(
            "SELECT {COMPANION_COLUMNS} FROM companions WHERE user_id = $1"
        ))
        .bind(user.id)
        .fetch_optional(&self.db)
        .await?;
        match companion {
            Some(c) => Ok(Some((user, c.try_into()?))),
            None => Ok(None),
        }
    }

    async fn save_details(
        &self,
        user: Option<&User>,
        profile: Option<&ActorProfile>,
    ) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;

        if let Some(user) = user {
            let res = sqlx::query(
                r#"
                UPDATE users
                   SET name = $2, phone_number = $3, location = $4
                 WHERE id = $1
                "#,
            )
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.phone_number)
            .bind(&user.location)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
            if res.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
        }

        let res = match profile {
            Some(ActorProfile::Patient(p)) => Some(
                sqlx::query(
                    r#"
                    UPDATE patients
                       SET medical_condition = $2, current_gps_location = $3, additional_notes = $4
                     WHERE id = $1
                    "#,
                )
                .bind(p.id)
                .bind(&p.medical_condition)
                .bind(&p.current_gps_location)
                .bind(&p.additional_notes)
                .execute(&mut *tx)
                .await?,
            ),
            Some(ActorProfile::Companion(c)) => Some(
                sqlx::query(
                    r#"
                    UPDATE companions
                       SET relationship = $2, alert_settings = $3
                     WHERE id = $1
                    "#,
                )
                .bind(c.id)
                .bind(c.relationship.map(|r| r.as_str()))
                .bind(&c.alert_settings)
                .execute(&mut *tx)
                .await?,
            ),
            None => None,
        };
        if res.is_some_and(|r| r.rows_affected() == 0) {
            return Err(StoreError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_alert(&self, key: ProfileKey, alert: AlertFields) -> Result<(), StoreError> {
        let (sql, id) = match key {
            ProfileKey::Patient(id) => (
                "UPDATE patients SET sos_alert = $2, last_sos_time = $3 WHERE id = $1",
                id,
            ),
            ProfileKey::Companion(id) => (
                "UPDATE companions SET sos_alert = $2, last_sos_time = $3 WHERE id = $1",
                id,
            ),
        };
        let res = sqlx::query(sql)
            .bind(id)
            .bind(alert.sos_alert)
            .bind(alert.last_sos_time)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_companion_patient(
        &self,
        companion_id: Uuid,
        patient_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE companions SET patient_id = $2 WHERE id = $1")
            .bind(companion_id)
            .bind(patient_id)
            .execute(&self.db)
            .await
            .map_err(classify)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, StoreError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (id, user_id, transmission_time, notification_type, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, transmission_time, notification_type, message
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification.transmission_time)
        .bind(notification.kind.as_str())
        .bind(&notification.message)
        .fetch_one(&self.db)
        .await
        .map_err(classify)?;
        row.try_into()
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, transmission_time, notification_type, message
              FROM notifications
             WHERE user_id = $1
             ORDER BY transmission_time DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }
}
