use std::time::Duration;

use atlas_core::{NotificationScheduler, ReminderId};
use chrono::{DateTime, Utc};

/// Logs notification requests instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationScheduler for TracingNotifier {
    fn schedule(
        &self,
        id: ReminderId,
        fire_date: DateTime<Utc>,
        delay: Duration,
        title: &str,
        _body: &str,
    ) {
        tracing::info!(%id, %fire_date, ?delay, title, "notification scheduled");
    }

    fn cancel(&self, id: ReminderId) {
        tracing::info!(%id, "notification cancelled");
    }
}
