//! Per-actor SOS alert state machine.
//!
//! The machine is pure: it takes the current alert fields, the requested
//! state, whether the actor currently has anyone to notify, and the clock
//! reading for this request, and answers with the next fields plus the
//! effect the caller has to carry out.

use serde::Serialize;
use time::OffsetDateTime;

/// Alert columns shared by patients and companions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AlertFields {
    pub sos_alert: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sos_time: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Inactive,
    Active,
}

impl AlertFields {
    pub fn status(&self) -> AlertStatus {
        if self.sos_alert {
            AlertStatus::Active
        } else {
            AlertStatus::Inactive
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertRequest {
    Activate,
    Deactivate,
}

impl From<bool> for AlertRequest {
    fn from(active: bool) -> Self {
        if active {
            AlertRequest::Activate
        } else {
            AlertRequest::Deactivate
        }
    }
}

/// What the caller must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEffect {
    /// Nothing changed, nothing to write.
    None,
    /// Write the new fields, notify nobody.
    Persist,
    /// Write the new fields, then notify every counterpart.
    PersistAndFanOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: AlertStatus,
    pub next: AlertFields,
    pub effect: AlertEffect,
}

/// Activation was requested but the actor has no counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no counterpart to notify")]
pub struct NoCounterpart;

pub fn transition(
    current: AlertFields,
    request: AlertRequest,
    has_counterparts: bool,
    now: OffsetDateTime,
) -> Result<Transition, NoCounterpart> {
    let from = current.status();
    match request {
        AlertRequest::Activate => {
            if !has_counterparts {
                return Err(NoCounterpart);
            }
            // last_sos_time never moves backwards, even if the clock does
            let stamp = match current.last_sos_time {
                Some(prev) if prev > now => prev,
                _ => now,
            };
            Ok(Transition {
                from,
                next: AlertFields {
                    sos_alert: true,
                    last_sos_time: Some(stamp),
                },
                effect: AlertEffect::PersistAndFanOut,
            })
        }
        AlertRequest::Deactivate => match from {
            AlertStatus::Active => Ok(Transition {
                from,
                next: AlertFields {
                    sos_alert: false,
                    last_sos_time: current.last_sos_time,
                },
                effect: AlertEffect::Persist,
            }),
            AlertStatus::Inactive => Ok(Transition {
                from,
                next: current,
                effect: AlertEffect::None,
            }),
        },
    }
}
