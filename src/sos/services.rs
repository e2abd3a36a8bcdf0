use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::links::services::resolve_actor;
use crate::sos::alert::{transition, AlertEffect, AlertRequest, NoCounterpart};
use crate::sos::error::SosError;
use crate::sos::fanout::fan_out;
use crate::store::CareStore;

/// Result of one toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SosOutcome {
    pub activated: bool,
    /// False when deactivating an alert that was not active.
    pub changed: bool,
    pub notified: usize,
    pub failed: usize,
    pub last_sos_time: Option<OffsetDateTime>,
}

impl SosOutcome {
    pub fn message(&self) -> &'static str {
        match (self.activated, self.changed) {
            (true, _) => "SOS alert activated",
            (false, true) => "SOS alert deactivated",
            (false, false) => "SOS alert is already inactive",
        }
    }
}

/// Toggles the caller's alert. The counterpart set is read once and that
/// single read gates activation and addresses the fan-out. Notifications are
/// written after the alert fields, so a failed notification never leaves
/// the alert unrecorded.
#[instrument(skip(store))]
pub async fn toggle_alert(
    store: &dyn CareStore,
    actor_id: Uuid,
    desired_active: bool,
    now: OffsetDateTime,
) -> Result<SosOutcome, SosError> {
    let snapshot = resolve_actor(store, actor_id).await?;
    let role = snapshot.user.role;
    let current = snapshot.profile.alert();

    let step = transition(
        current,
        AlertRequest::from(desired_active),
        !snapshot.counterparts.is_empty(),
        now,
    )
    .map_err(|NoCounterpart| {
        info!(%actor_id, %role, "sos activation without counterpart");
        SosError::NoCounterpart(role)
    })?;

    let mut outcome = SosOutcome {
        activated: desired_active,
        changed: step.effect != AlertEffect::None,
        notified: 0,
        failed: 0,
        last_sos_time: step.next.last_sos_time,
    };

    match step.effect {
        AlertEffect::None => {}
        AlertEffect::Persist => {
            store.update_alert(snapshot.profile.key(), step.next).await?;
            info!(%actor_id, %role, "sos alert deactivated");
        }
        AlertEffect::PersistAndFanOut => {
            store.update_alert(snapshot.profile.key(), step.next).await?;
            let at = step.next.last_sos_time.unwrap_or(now);
            let report = fan_out(store, &snapshot.user, &snapshot.counterparts, at).await;
            outcome.notified = report.delivered;
            outcome.failed = report.failed;
            info!(
                %actor_id,
                %role,
                notified = report.delivered,
                failed = report.failed,
                "sos alert activated"
            );
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::dto::NewAccount;
    use crate::accounts::model::{Role, User};
    use crate::accounts::services::{create_account, Account};
    use crate::links::services::{attach_companion, detach_companion, link_patient};
    use crate::store::InMemoryCareStore;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2025-03-01 10:00 UTC);
    const T1: OffsetDateTime = datetime!(2025-03-01 10:07 UTC);

    async fn account(store: &InMemoryCareStore, username: &str, role: Role, n: u8) -> Account {
        let input = NewAccount {
            email: format!("{username}@example.com"),
            username: username.into(),
            phone_number: format!("+2012000000{n:02}"),
            name: username.to_uppercase(),
            location: None,
            role,
            relationship: None,
            patient_username: None,
        };
        create_account(store, input, T0).await.unwrap()
    }

    async fn alert_of(store: &InMemoryCareStore, user_id: Uuid) -> crate::sos::alert::AlertFields {
        store.load_actor(user_id).await.unwrap().profile.alert()
    }

    #[tokio::test]
    async fn companion_without_patient_cannot_activate() {
        let store = InMemoryCareStore::new();
        let c = account(&store, "omar", Role::Companion, 1).await;

        let err = toggle_alert(&store, c.user.id, true, T0).await.unwrap_err();
        assert!(matches!(err, SosError::NoCounterpart(Role::Companion)));
        assert!(!alert_of(&store, c.user.id).await.sos_alert);
    }

    #[tokio::test]
    async fn patient_without_companions_cannot_activate() {
        let store = InMemoryCareStore::new();
        let p = account(&store, "huda", Role::Patient, 1).await;

        let err = toggle_alert(&store, p.user.id, true, T0).await.unwrap_err();
        assert!(matches!(err, SosError::NoCounterpart(Role::Patient)));
        assert_eq!(alert_of(&store, p.user.id).await.last_sos_time, None);
    }

    #[tokio::test]
    async fn patient_with_two_companions_notifies_both() {
        let store = InMemoryCareStore::new();
        let p = account(&store, "huda", Role::Patient, 1).await;
        let c1 = account(&store, "omar", Role::Companion, 2).await;
        let c2 = account(&store, "sara", Role::Companion, 3).await;
        let outsider = account(&store, "zaid", Role::Companion, 4).await;
        attach_companion(&store, p.user.id, "omar").await.unwrap();
        attach_companion(&store, p.user.id, "sara").await.unwrap();

        let out = toggle_alert(&store, p.user.id, true, T0).await.unwrap();
        assert_eq!(out.notified, 2);
        assert_eq!(out.failed, 0);
        assert_eq!(out.message(), "SOS alert activated");

        for c in [&c1, &c2] {
            let got = store.list_notifications(c.user.id).await.unwrap();
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].transmission_time, T0);
        }
        assert!(store
            .list_notifications(outsider.user.id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            alert_of(&store, p.user.id).await,
            crate::sos::alert::AlertFields {
                sos_alert: true,
                last_sos_time: Some(T0)
            }
        );
    }

    #[tokio::test]
    async fn companion_activate_then_deactivate() {
        let store = InMemoryCareStore::new();
        let p = account(&store, "huda", Role::Patient, 1).await;
        let c = account(&store, "omar", Role::Companion, 2).await;
        link_patient(&store, c.user.id, "huda").await.unwrap();

        toggle_alert(&store, c.user.id, true, T0).await.unwrap();
        let out = toggle_alert(&store, c.user.id, false, T1).await.unwrap();
        assert_eq!(out.message(), "SOS alert deactivated");
        assert_eq!(out.notified, 0);

        let alert = alert_of(&store, c.user.id).await;
        assert!(!alert.sos_alert);
        assert_eq!(alert.last_sos_time, Some(T0));
        assert_eq!(store.list_notifications(p.user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deactivation_is_not_gated_on_counterparts() {
        let store = InMemoryCareStore::new();
        let p = account(&store, "huda", Role::Patient, 1).await;
        account(&store, "omar", Role::Companion, 2).await;
        attach_companion(&store, p.user.id, "omar").await.unwrap();
        toggle_alert(&store, p.user.id, true, T0).await.unwrap();
        detach_companion(&store, p.user.id, "omar").await.unwrap();

        let out = toggle_alert(&store, p.user.id, false, T1).await.unwrap();
        assert!(out.changed);
        assert!(!alert_of(&store, p.user.id).await.sos_alert);

        // and deactivating again is a harmless no-op
        let out = toggle_alert(&store, p.user.id, false, T1).await.unwrap();
        assert_eq!(out.message(), "SOS alert is already inactive");
    }

    #[tokio::test]
    async fn reactivation_fans_out_again_with_fresh_time() {
        let store = InMemoryCareStore::new();
        let p = account(&store, "huda", Role::Patient, 1).await;
        let c = account(&store, "omar", Role::Companion, 2).await;
        attach_companion(&store, p.user.id, "omar").await.unwrap();

        toggle_alert(&store, p.user.id, true, T0).await.unwrap();
        let out = toggle_alert(&store, p.user.id, true, T1).await.unwrap();
        assert_eq!(out.last_sos_time, Some(T1));

        let got = store.list_notifications(c.user.id).await.unwrap();
        let times: Vec<_> = got.iter().map(|n| n.transmission_time).collect();
        assert_eq!(times, vec![T1, T0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_toggles_end_in_one_whole_state() {
        use crate::sos::alert::AlertFields;

        let activated_at_t1 = AlertFields {
            sos_alert: true,
            last_sos_time: Some(T1),
        };
        // deactivation read either the T0 activation or the T1 one
        let deactivated = [
            AlertFields {
                sos_alert: false,
                last_sos_time: Some(T0),
            },
            AlertFields {
                sos_alert: false,
                last_sos_time: Some(T1),
            },
        ];

        for _ in 0..20 {
            let store = InMemoryCareStore::new();
            let p = account(&store, "huda", Role::Patient, 1).await;
            account(&store, "omar", Role::Companion, 2).await;
            attach_companion(&store, p.user.id, "omar").await.unwrap();
            toggle_alert(&store, p.user.id, true, T0).await.unwrap();

            let (on, off) = tokio::join!(
                toggle_alert(&store, p.user.id, true, T1),
                toggle_alert(&store, p.user.id, false, T1),
            );
            let on = on.unwrap();
            let off = off.unwrap();
            assert!(on.activated && on.changed);
            assert!(!off.activated && off.changed);

            let last = alert_of(&store, p.user.id).await;
            assert!(
                last == activated_at_t1 || deactivated.contains(&last),
                "torn alert state {last:?}"
            );
            assert!(!(last.sos_alert && last.last_sos_time.is_none()));
        }
    }

    #[tokio::test]
    async fn partial_fan_out_still_activates() {
        let store = InMemoryCareStore::new();
        let p = account(&store, "huda", Role::Patient, 1).await;
        let c1 = account(&store, "omar", Role::Companion, 2).await;
        account(&store, "sara", Role::Companion, 3).await;
        attach_companion(&store, p.user.id, "omar").await.unwrap();
        attach_companion(&store, p.user.id, "sara").await.unwrap();
        store.reject_notifications_for(c1.user.id).await;

        let out = toggle_alert(&store, p.user.id, true, T0).await.unwrap();
        assert_eq!((out.notified, out.failed), (1, 1));
        assert!(alert_of(&store, p.user.id).await.sos_alert);
    }

    #[tokio::test]
    async fn unknown_role_and_unknown_actor() {
        let store = InMemoryCareStore::new();
        let odd = User {
            id: Uuid::new_v4(),
            email: "admin@example.com".into(),
            username: "admin".into(),
            phone_number: "+201200000099".into(),
            role: Role::Patient,
            name: "Admin".into(),
            location: None,
            created_at: T0,
        };
        store.insert_raw_user(&odd, "admins").await;

        let err = toggle_alert(&store, odd.id, true, T0).await.unwrap_err();
        assert!(matches!(err, SosError::UnknownRole(ref r) if r == "admins"));

        let err = toggle_alert(&store, Uuid::new_v4(), false, T0)
            .await
            .unwrap_err();
        assert!(matches!(err, SosError::UnknownActor));
    }
}
