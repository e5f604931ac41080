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
pub enum LeaveKind {
    Regular,
    Emergency,
    Medical,
}

/// `Expired` is never written to storage; it is computed on read once
/// the current date passes `to_date` (see [`LeaveStatus::effective`]).
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    ApprovedDw,
    ApprovedPrincipal,
    Rejected,
    Expired,
}

impl LeaveStatus {
    /// Status as seen by readers: an approved leave past its end date
    /// reports `Expired` without a storage write-back.
    pub fn effective(self, to_date: NaiveDate, today: NaiveDate) -> LeaveStatus {
        let approved = matches!(
            self,
            LeaveStatus::ApprovedDw | LeaveStatus::ApprovedPrincipal
        );
        if approved && today > to_date {
            LeaveStatus::Expired
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaveApplication {
    pub id: u64,
    pub student_id: u64,
    pub kind: LeaveKind,
    /// Inclusive range, `to_date >= from_date`.
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub reason: String,
    pub destination: Option<String>,
    pub contact_phone: Option<String>,
    pub status: LeaveStatus,
    pub dw_approver_id: Option<u64>,
    pub dw_remarks: Option<String>,
    pub dw_decided_at: Option<DateTime<Utc>>,
    pub principal_approver_id: Option<u64>,
    pub principal_remarks: Option<String>,
    pub principal_decided_at: Option<DateTime<Utc>>,
    pub qr_issued: bool,
    /// Cached credential token; set exactly once at first issuance.
    pub qr_payload: Option<String>,
    pub valid_not_before: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LeaveApplication {
    pub fn is_approved(&self) -> bool {
        matches!(
            self.status,
            LeaveStatus::ApprovedDw | LeaveStatus::ApprovedPrincipal
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn approved_leave_expires_after_its_end_date() {
        let end = d("2026-03-06");
        assert_eq!(
            LeaveStatus::ApprovedDw.effective(end, d("2026-03-06")),
            LeaveStatus::ApprovedDw
        );
        assert_eq!(
            LeaveStatus::ApprovedDw.effective(end, d("2026-03-07")),
            LeaveStatus::Expired
        );
        assert_eq!(
            LeaveStatus::ApprovedPrincipal.effective(end, d("2026-03-07")),
            LeaveStatus::Expired
        );
    }

    #[test]
    fn non_approved_statuses_never_expire() {
        let end = d("2026-03-06");
        let late = d("2026-04-01");
        assert_eq!(LeaveStatus::Pending.effective(end, late), LeaveStatus::Pending);
        assert_eq!(LeaveStatus::Rejected.effective(end, late), LeaveStatus::Rejected);
    }
}
