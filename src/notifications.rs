use std::str::FromStr;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Security,
    Update,
    Reminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Security => "security",
            NotificationKind::Update => "update",
            NotificationKind::Reminder => "reminder",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "security" => Ok(NotificationKind::Security),
            "update" => Ok(NotificationKind::Update),
            "reminder" => Ok(NotificationKind::Reminder),
            other => Err(format!("unknown notification type {other:?}")),
        }
    }
}

/// Stored notification. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub transmission_time: OffsetDateTime,
    pub kind: NotificationKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub transmission_time: OffsetDateTime,
    pub kind: NotificationKind,
    pub message: String,
}

impl NewNotification {
    pub fn security(user_id: Uuid, at: OffsetDateTime, message: impl Into<String>) -> Self {
        Self {
            user_id,
            transmission_time: at,
            kind: NotificationKind::Security,
            message: message.into(),
        }
    }

    pub fn into_notification(self, id: Uuid) -> Notification {
        Notification {
            id,
            user_id: self.user_id,
            transmission_time: self.transmission_time,
            kind: self.kind,
            message: self.message,
        }
    }
}
