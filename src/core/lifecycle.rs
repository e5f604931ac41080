//! Leave application state machine.
//!
//! ```text
//! PENDING --deputy approves (duration <= threshold)--> APPROVED_DW
//! PENDING --principal approves (duration > threshold)--> APPROVED_PRINCIPAL
//! PENDING --either tier rejects--> REJECTED
//! APPROVED_* --today > to_date--> EXPIRED (computed on read)
//! ```
//!
//! All terminal states are final; the only post-approval mutation is an
//! approved emergency extension advancing `to_date`.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::core::clock::Clock;
use crate::core::credential::CredentialCodec;
use crate::core::error::CoreError;
use crate::core::routing::{self, ApprovalTier};
use crate::core::store::{
    ApprovalRecord, InsertOutcome, LeaveStore, NewExtension, NewLeaveApplication, NotificationSink,
    TransitionOutcome,
};
use crate::model::leave_application::{LeaveApplication, LeaveKind, LeaveStatus};

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Durations longer than this many days route to the principal.
    pub approval_threshold_days: i64,
    /// Minimum days between submission and `from_date`.
    pub min_advance_days: i64,
    /// Credential becomes valid this many hours before `from_date`.
    pub credential_lead_hours: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            approval_threshold_days: 15,
            min_advance_days: 2,
            credential_lead_hours: 2,
        }
    }
}

/// Authenticated staff member acting on an application.
#[derive(Debug, Clone, Copy)]
pub struct StaffActor {
    pub user_id: u64,
    pub tier: ApprovalTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Reject,
}

#[derive(Debug, Clone)]
pub struct SubmitLeave {
    pub student_id: u64,
    pub kind: LeaveKind,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub reason: String,
    pub destination: Option<String>,
    pub contact_phone: Option<String>,
}

pub struct LeaveLifecycle<S, N, C> {
    store: S,
    notifier: N,
    clock: C,
    codec: CredentialCodec,
    cfg: LifecycleConfig,
}

impl<S: LeaveStore, N: NotificationSink, C: Clock> LeaveLifecycle<S, N, C> {
    pub fn new(store: S, notifier: N, clock: C, codec: CredentialCodec, cfg: LifecycleConfig) -> Self {
        LeaveLifecycle {
            store,
            notifier,
            clock,
            codec,
            cfg,
        }
    }

    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.cfg
    }

    /// Creates a PENDING application after range, lead-time and overlap
    /// validation. The overlap check and the insert run inside the
    /// store's per-student critical section.
    pub async fn submit(&self, req: SubmitLeave) -> Result<u64, CoreError> {
        if req.to_date < req.from_date {
            return Err(CoreError::InvalidRange);
        }
        let today = self.clock.today();
        let advance = req.from_date.signed_duration_since(today).num_days();
        if advance < self.cfg.min_advance_days {
            return Err(CoreError::InsufficientLeadTime(self.cfg.min_advance_days));
        }

        let new = NewLeaveApplication {
            student_id: req.student_id,
            kind: req.kind,
            from_date: req.from_date,
            to_date: req.to_date,
            reason: req.reason,
            destination: req.destination,
            contact_phone: req.contact_phone,
        };
        let id = match self.store.insert_application_if_free(new).await? {
            InsertOutcome::Created(id) => id,
            InsertOutcome::Overlapping => return Err(CoreError::OverlappingApplication),
        };

        let message = format!(
            "New leave request #{id}: {} to {} ({})",
            req.from_date, req.to_date, req.kind
        );
        if let Some(student) = self.store.student(req.student_id).await? {
            if let Some(guardian) = student.guardian_user_id {
                self.notifier.notify(guardian, Some(id), &message).await;
            }
        }
        for warden in self.store.deputy_warden_user_ids().await? {
            self.notifier.notify(warden, Some(id), &message).await;
        }
        Ok(id)
    }

    /// Approves or rejects a pending application. The acting tier must
    /// match the duration-based routing rule; a stale decide on an
    /// already-processed row fails with `AlreadyProcessed`.
    pub async fn decide(
        &self,
        application_id: u64,
        acting: StaffActor,
        verdict: Verdict,
        remarks: Option<String>,
    ) -> Result<LeaveStatus, CoreError> {
        let app = self
            .store
            .application(application_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        if app.status != LeaveStatus::Pending {
            return Err(CoreError::AlreadyProcessed);
        }
        let tier = routing::required_tier(app.from_date, app.to_date, self.cfg.approval_threshold_days);
        if acting.tier != tier {
            return Err(CoreError::WrongTier);
        }

        let target = match (verdict, tier) {
            (Verdict::Approve, ApprovalTier::DeputyWarden) => LeaveStatus::ApprovedDw,
            (Verdict::Approve, ApprovalTier::Principal) => LeaveStatus::ApprovedPrincipal,
            (Verdict::Reject, _) => LeaveStatus::Rejected,
        };
        let record = ApprovalRecord {
            approver_id: acting.user_id,
            tier,
            remarks: remarks.clone(),
            decided_at: self.clock.now(),
        };
        match self.store.transition_if_pending(application_id, target, record).await? {
            TransitionOutcome::Applied => {}
            TransitionOutcome::NotPending => return Err(CoreError::AlreadyProcessed),
        }

        let message = match target {
            LeaveStatus::Rejected => format!(
                "Leave request #{application_id} was rejected{}",
                remarks.map(|r| format!(": {r}")).unwrap_or_default()
            ),
            _ => format!("Leave request #{application_id} was approved"),
        };
        self.notify_student(app.student_id, application_id, &message).await?;
        Ok(target)
    }

    /// Guardian asks for more days on an approved leave.
    pub async fn request_extension(
        &self,
        guardian_id: u64,
        application_id: u64,
        new_to_date: NaiveDate,
        reason: String,
    ) -> Result<u64, CoreError> {
        let app = self
            .store
            .application(application_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        let student = self
            .store
            .student(app.student_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        if student.guardian_user_id != Some(guardian_id) {
            return Err(CoreError::NotFound);
        }
        if !app.is_approved() {
            return Err(CoreError::NotApproved);
        }
        if new_to_date <= app.to_date {
            return Err(CoreError::NonAdvancingDate);
        }

        let id = self
            .store
            .insert_extension(NewExtension {
                leave_application_id: application_id,
                guardian_id,
                new_to_date,
                reason,
            })
            .await?;
        let message = format!(
            "Emergency extension requested for leave #{application_id}, new end date {new_to_date}"
        );
        for warden in self.store.deputy_warden_user_ids().await? {
            self.notifier.notify(warden, Some(application_id), &message).await;
        }
        Ok(id)
    }

    /// Approves or rejects a pending extension. Approval advances the
    /// parent application's `to_date` atomically with the status flip.
    pub async fn decide_extension(
        &self,
        extension_id: u64,
        acting: StaffActor,
        verdict: Verdict,
        remarks: Option<String>,
    ) -> Result<(), CoreError> {
        let ext = self
            .store
            .extension(extension_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        if ext.status != crate::model::extension::ExtensionStatus::Pending {
            return Err(CoreError::AlreadyProcessed);
        }

        let approve = verdict == Verdict::Approve;
        let record = ApprovalRecord {
            approver_id: acting.user_id,
            tier: acting.tier,
            remarks,
            decided_at: self.clock.now(),
        };
        match self
            .store
            .resolve_extension_if_pending(extension_id, approve, record)
            .await?
        {
            TransitionOutcome::Applied => {}
            TransitionOutcome::NotPending => return Err(CoreError::AlreadyProcessed),
        }

        let message = if approve {
            format!(
                "Extension for leave #{} approved, new end date {}",
                ext.leave_application_id, ext.new_to_date
            )
        } else {
            format!("Extension for leave #{} rejected", ext.leave_application_id)
        };
        self.notifier
            .notify(ext.guardian_id, Some(ext.leave_application_id), &message)
            .await;
        if let Some(app) = self.store.application(ext.leave_application_id).await? {
            self.notify_student(app.student_id, app.id, &message).await?;
        }
        Ok(())
    }

    /// Returns the credential token for an approved application,
    /// issuing it on first request. Repeat calls return the cached
    /// token byte for byte; `valid_not_before` is computed exactly
    /// once.
    pub async fn issue_or_fetch_credential(
        &self,
        application_id: u64,
        requesting_student_id: u64,
    ) -> Result<String, CoreError> {
        let app = self
            .store
            .application_for_claims(application_id, requesting_student_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        if !app.is_approved() {
            return Err(CoreError::NotApproved);
        }
        if let Some(payload) = app.qr_payload.clone() {
            return Ok(payload);
        }

        let student = self
            .store
            .student(app.student_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        let valid_not_before = credential_window_start(&app, self.cfg.credential_lead_hours);
        let token = self.codec.encode(&app, &student, valid_not_before);
        let stored = self
            .store
            .cache_credential_if_absent(application_id, &token, valid_not_before)
            .await?;
        Ok(stored)
    }

    async fn notify_student(
        &self,
        student_id: u64,
        application_id: u64,
        message: &str,
    ) -> Result<(), CoreError> {
        if let Some(student) = self.store.student(student_id).await? {
            if let Some(user_id) = student.user_id {
                self.notifier.notify(user_id, Some(application_id), message).await;
            }
        }
        Ok(())
    }
}

/// First instant the credential may be used: midnight of `from_date`
/// minus the configured lead time.
pub fn credential_window_start(app: &LeaveApplication, lead_hours: i64) -> DateTime<Utc> {
    let midnight = app
        .from_date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    midnight - Duration::hours(lead_hours)
}
