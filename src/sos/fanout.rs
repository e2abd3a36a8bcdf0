//! One `security` notification per counterpart, written one after another.
//! Writes are independent: a failed one is logged and counted, the rest
//! still go out and nothing is rolled back.

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::accounts::model::{Counterpart, User};
use crate::notifications::NewNotification;
use crate::store::CareStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanOutReport {
    pub delivered: usize,
    pub failed: usize,
}

pub fn alert_message(actor: &User) -> String {
    format!("SOS alert from {}", actor.name)
}

pub async fn fan_out(
    store: &dyn CareStore,
    actor: &User,
    counterparts: &[Counterpart],
    at: OffsetDateTime,
) -> FanOutReport {
    let message = alert_message(actor);
    let mut report = FanOutReport::default();
    for target in counterparts {
        let notification = NewNotification::security(target.user_id, at, message.as_str());
        match store.insert_notification(&notification).await {
            Ok(stored) => {
                debug!(notification_id = %stored.id, target = %target.user_id, "sos notification stored");
                report.delivered += 1;
            }
            Err(e) => {
                warn!(error = %e, actor = %actor.id, target = %target.user_id, "sos notification failed");
                report.failed += 1;
            }
        }
    }
    report
}
