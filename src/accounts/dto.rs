use serde::{Deserialize, Serialize};

use crate::accounts::model::{ActorProfile, ActorSnapshot, Counterpart, Relationship, Role, User};
use crate::sos::alert::AlertFields;

/// Input of the account factory.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub phone_number: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    pub role: Role,
    /// Companions only.
    #[serde(default)]
    pub relationship: Option<Relationship>,
    /// Companions only: link to this patient on creation.
    #[serde(default)]
    pub patient_username: Option<String>,
}

/// Body of `PATCH /profile/`. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub location: Option<String>,
    // patient
    pub medical_condition: Option<String>,
    pub current_gps_location: Option<String>,
    pub additional_notes: Option<String>,
    /// Adds this companion to the caller, same as `POST /links/companions/`.
    pub companion_username: Option<String>,
    // companion
    pub relationship: Option<Relationship>,
    pub alert_settings: Option<String>,
    /// Links the caller to this patient, same as `PUT /links/patient/`.
    pub patient_username: Option<String>,
}

impl ProfileUpdate {
    pub fn has_patient_fields(&self) -> bool {
        self.medical_condition.is_some()
            || self.current_gps_location.is_some()
            || self.additional_notes.is_some()
            || self.companion_username.is_some()
    }

    pub fn has_companion_fields(&self) -> bool {
        self.relationship.is_some()
            || self.alert_settings.is_some()
            || self.patient_username.is_some()
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProfileDetails {
    Patient {
        medical_condition: String,
        current_gps_location: Option<String>,
        additional_notes: Option<String>,
        linked_companions: Vec<Counterpart>,
    },
    Companion {
        relationship: Option<Relationship>,
        alert_settings: Option<String>,
        linked_patient: Option<Counterpart>,
    },
}

/// Response of `GET /profile/` and `PATCH /profile/`.
#[derive(Debug, Serialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub user: User,
    #[serde(flatten)]
    pub alert: AlertFields,
    #[serde(flatten)]
    pub details: ProfileDetails,
}

impl From<ActorSnapshot> for ProfileView {
    fn from(s: ActorSnapshot) -> Self {
        let alert = s.profile.alert();
        let details = match s.profile {
            ActorProfile::Patient(p) => ProfileDetails::Patient {
                medical_condition: p.medical_condition,
                current_gps_location: p.current_gps_location,
                additional_notes: p.additional_notes,
                linked_companions: s.counterparts,
            },
            ActorProfile::Companion(c) => ProfileDetails::Companion {
                relationship: c.relationship,
                alert_settings: c.alert_settings,
                linked_patient: s.counterparts.into_iter().next(),
            },
        };
        Self {
            user: s.user,
            alert,
            details,
        }
    }
}
