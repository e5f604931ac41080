use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum GateAction {
    Exit,
    Entry,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ScanStatus {
    Valid,
    Invalid,
    Expired,
    Unauthorized,
    Manual,
}

/// One gate scan, append-only. This log is the single source of truth
/// for presence; there is no separate "currently outside" table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GateLogEntry {
    pub id: u64,
    /// Null when the presented credential could not be resolved to a
    /// student (unparseable or tampered token).
    pub student_id: Option<u64>,
    /// Null for manual overrides.
    pub leave_application_id: Option<u64>,
    pub action: GateAction,
    pub scanned_by: u64,
    /// Authoritative ordering key (ties broken by `id`).
    pub scanned_at: DateTime<Utc>,
    pub raw_payload: Option<String>,
    pub status: ScanStatus,
    pub message: String,
    pub location: Option<String>,
}
