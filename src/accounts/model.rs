use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::sos::alert::AlertFields;

/// Account role. Fixed at creation; decides which sub-profile the user owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "patients")]
    Patient,
    #[serde(alias = "companions")]
    Companion,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Companion => "companion",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Accepts the plural spellings older rows were written with.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" | "patients" => Ok(Role::Patient),
            "companion" | "companions" => Ok(Role::Companion),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Parent,
    Sibling,
    Spouse,
    Child,
    Friend,
    Other,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Parent => "parent",
            Relationship::Sibling => "sibling",
            Relationship::Spouse => "spouse",
            Relationship::Child => "child",
            Relationship::Friend => "friend",
            Relationship::Other => "other",
        }
    }
}

impl FromStr for Relationship {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent" => Ok(Relationship::Parent),
            "sibling" => Ok(Relationship::Sibling),
            "spouse" => Ok(Relationship::Spouse),
            "child" => Ok(Relationship::Child),
            "friend" => Ok(Relationship::Friend),
            "other" => Ok(Relationship::Other),
            other => Err(format!("unknown relationship {other:?}")),
        }
    }
}

/// Identity record. Name, phone and location live here only; profiles read through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub phone_number: String,
    pub role: Role,
    pub name: String,
    pub location: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub medical_condition: String,
    pub current_gps_location: Option<String>,
    pub additional_notes: Option<String>,
    pub alert: AlertFields,
}

impl Patient {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            medical_condition: String::new(),
            current_gps_location: None,
            additional_notes: None,
            alert: AlertFields::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Companion {
    pub id: Uuid,
    pub user_id: Uuid,
    /// The link edge. `None` means unlinked.
    pub patient_id: Option<Uuid>,
    pub relationship: Option<Relationship>,
    pub alert_settings: Option<String>,
    pub alert: AlertFields,
}

impl Companion {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            patient_id: None,
            relationship: None,
            alert_settings: None,
            alert: AlertFields::default(),
        }
    }
}

/// Identifies the row holding an actor's alert fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKey {
    Patient(Uuid),
    Companion(Uuid),
}

/// The role-specific half of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorProfile {
    Patient(Patient),
    Companion(Companion),
}

impl ActorProfile {
    /// Fresh sub-profile for a newly created user of `role`.
    pub fn for_new_user(role: Role, user_id: Uuid) -> Self {
        match role {
            Role::Patient => ActorProfile::Patient(Patient::new(user_id)),
            Role::Companion => ActorProfile::Companion(Companion::new(user_id)),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            ActorProfile::Patient(_) => Role::Patient,
            ActorProfile::Companion(_) => Role::Companion,
        }
    }

    pub fn key(&self) -> ProfileKey {
        match self {
            ActorProfile::Patient(p) => ProfileKey::Patient(p.id),
            ActorProfile::Companion(c) => ProfileKey::Companion(c.id),
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            ActorProfile::Patient(p) => p.user_id,
            ActorProfile::Companion(c) => c.user_id,
        }
    }

    pub fn alert(&self) -> AlertFields {
        match self {
            ActorProfile::Patient(p) => p.alert,
            ActorProfile::Companion(c) => c.alert,
        }
    }
}

/// Somebody who must hear about an actor's alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counterpart {
    pub user_id: Uuid,
    pub username: String,
    pub name: String,
    /// Set when the counterpart is a companion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
}

/// One consistent read of an actor: the user, its sub-profile and the
/// counterpart set derived from the link state at that moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorSnapshot {
    pub user: User,
    pub profile: ActorProfile,
    pub counterparts: Vec<Counterpart>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_both_spellings() {
        assert_eq!("patient".parse::<Role>(), Ok(Role::Patient));
        assert_eq!("patients".parse::<Role>(), Ok(Role::Patient));
        assert_eq!("companions".parse::<Role>(), Ok(Role::Companion));
        assert_eq!(
            "doctor".parse::<Role>(),
            Err(UnknownRole("doctor".to_string()))
        );
    }

    #[test]
    fn role_serializes_lowercase_singular() {
        assert_eq!(serde_json::to_string(&Role::Companion).unwrap(), "\"companion\"");
        let r: Role = serde_json::from_str("\"patients\"").unwrap();
        assert_eq!(r, Role::Patient);
    }

    #[test]
    fn relationship_round_trips_through_str() {
        for r in [
            Relationship::Parent,
            Relationship::Sibling,
            Relationship::Spouse,
            Relationship::Child,
            Relationship::Friend,
            Relationship::Other,
        ] {
            assert_eq!(r.as_str().parse::<Relationship>(), Ok(r));
        }
        assert!("cousin".parse::<Relationship>().is_err());
    }

    #[test]
    fn new_profile_matches_role() {
        let uid = Uuid::new_v4();
        let p = ActorProfile::for_new_user(Role::Patient, uid);
        assert_eq!(p.role(), Role::Patient);
        assert_eq!(p.user_id(), uid);
        assert!(!p.alert().sos_alert);

        let c = ActorProfile::for_new_user(Role::Companion, uid);
        assert!(matches!(c, ActorProfile::Companion(Companion { patient_id: None, .. })));
    }
}
