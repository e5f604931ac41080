use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExtensionStatus {
    Pending,
    Approved,
    Rejected,
}

/// Guardian-requested extension of an already approved leave. Approval
/// advances the parent application's `to_date` in the same transaction;
/// this is the only post-approval mutation of a leave's date range.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmergencyExtension {
    pub id: u64,
    pub leave_application_id: u64,
    pub guardian_id: u64,
    pub new_to_date: NaiveDate,
    pub reason: String,
    pub status: ExtensionStatus,
    pub approver_id: Option<u64>,
    pub remarks: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
