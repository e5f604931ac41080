//! Collaborator interfaces consumed by the lifecycle and gate cores.
//! The MySQL implementations live in `crate::store`; tests use the
//! in-memory versions from `crate::core::memory`.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::core::error::StoreError;
use crate::core::routing::ApprovalTier;
use crate::model::{
    extension::EmergencyExtension,
    gate_log::{GateAction, GateLogEntry, ScanStatus},
    leave_application::{LeaveApplication, LeaveKind, LeaveStatus},
    student::Student,
};

#[derive(Debug, Clone)]
pub struct NewLeaveApplication {
    pub student_id: u64,
    pub kind: LeaveKind,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub reason: String,
    pub destination: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Debug)]
pub enum InsertOutcome {
    Created(u64),
    /// An active application for the same student intersects the range.
    Overlapping,
}

#[derive(Debug, Clone)]
pub struct ApprovalRecord {
    pub approver_id: u64,
    pub tier: ApprovalTier,
    pub remarks: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Optimistic precondition failed: the row was no longer pending.
    NotPending,
}

#[derive(Debug, Clone)]
pub struct NewExtension {
    pub leave_application_id: u64,
    pub guardian_id: u64,
    pub new_to_date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct NewGateLogEntry {
    pub student_id: Option<u64>,
    pub leave_application_id: Option<u64>,
    pub action: GateAction,
    pub scanned_by: u64,
    pub scanned_at: DateTime<Utc>,
    pub raw_payload: Option<String>,
    pub status: ScanStatus,
    pub message: String,
    pub location: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait LeaveStore: Send + Sync {
    async fn application(&self, id: u64) -> Result<Option<LeaveApplication>, StoreError>;

    /// Lookup by the credential's (application, student) binding pair.
    async fn application_for_claims(
        &self,
        id: u64,
        student_id: u64,
    ) -> Result<Option<LeaveApplication>, StoreError>;

    /// Overlap check plus insert, evaluated inside one per-student
    /// critical section so two racing submits cannot both pass the
    /// check.
    async fn insert_application_if_free(
        &self,
        new: NewLeaveApplication,
    ) -> Result<InsertOutcome, StoreError>;

    /// Single-statement optimistic transition out of `Pending`.
    async fn transition_if_pending(
        &self,
        id: u64,
        to: LeaveStatus,
        record: ApprovalRecord,
    ) -> Result<TransitionOutcome, StoreError>;

    async fn insert_extension(&self, new: NewExtension) -> Result<u64, StoreError>;

    async fn extension(&self, id: u64) -> Result<Option<EmergencyExtension>, StoreError>;

    /// Flips the extension out of `Pending` and, on approval, advances
    /// the parent application's `to_date` in the same atomic unit.
    async fn resolve_extension_if_pending(
        &self,
        id: u64,
        approve: bool,
        record: ApprovalRecord,
    ) -> Result<TransitionOutcome, StoreError>;

    /// Stores the credential payload only if none exists yet and
    /// returns whatever payload won, so concurrent issuance converges
    /// on one token.
    async fn cache_credential_if_absent(
        &self,
        id: u64,
        payload: &str,
        valid_not_before: DateTime<Utc>,
    ) -> Result<String, StoreError>;

    async fn student(&self, id: u64) -> Result<Option<Student>, StoreError>;

    async fn student_by_college_id(&self, college_id: &str) -> Result<Option<Student>, StoreError>;

    /// Login accounts of active deputy-tier staff, for notifications.
    async fn deputy_warden_user_ids(&self) -> Result<Vec<u64>, StoreError>;

    async fn end_dates_for_applications(
        &self,
        ids: &[u64],
    ) -> Result<HashMap<u64, NaiveDate>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait GateLogStore: Send + Sync {
    async fn append(&self, new: NewGateLogEntry) -> Result<u64, StoreError>;

    /// Most recent VALID-status entry for the (student, application)
    /// pair; drives the entry-after-exit sequencing rule.
    async fn last_valid_entry(
        &self,
        student_id: u64,
        application_id: u64,
    ) -> Result<Option<GateLogEntry>, StoreError>;

    /// All entries scanned at or after `since`, ascending by
    /// `(scanned_at, id)`.
    async fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<GateLogEntry>, StoreError>;
}

/// Fire-and-forget notification delivery. Implementations log failures
/// instead of propagating them; a lost notification never fails the
/// operation that produced it.
#[allow(async_fn_in_trait)]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: u64, leave_application_id: Option<u64>, message: &str);
}
