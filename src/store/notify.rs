use sqlx::MySqlPool;

use crate::core::store::NotificationSink;

/// Writes notifications to the `notifications` table for the in-app
/// inbox. Delivery is fire-and-forget: a failed insert is logged and
/// swallowed so it can never fail the operation that produced it.
#[derive(Clone)]
pub struct DbNotificationSink {
    pool: MySqlPool,
}

impl DbNotificationSink {
    pub fn new(pool: MySqlPool) -> Self {
        DbNotificationSink { pool }
    }
}

impl NotificationSink for DbNotificationSink {
    async fn notify(&self, user_id: u64, leave_application_id: Option<u64>, message: &str) {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, leave_application_id, message)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(leave_application_id)
        .bind(message)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, user_id, "Failed to store notification");
        }
    }
}
