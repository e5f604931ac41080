//! Gate scan decision procedure.
//!
//! Every scan, allowed or not, appends exactly one gate-log entry; a
//! denied credential is an auditable outcome, not an error. The one
//! fatal case is a log append failure after the decision is made: the
//! decision is withheld rather than returned unaudited.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use moka::sync::Cache;
use tokio::sync::Mutex;

use crate::core::clock::Clock;
use crate::core::credential::CredentialCodec;
use crate::core::error::CoreError;
use crate::core::store::{GateLogStore, LeaveStore, NewGateLogEntry};
use crate::model::gate_log::{GateAction, ScanStatus};

/// Outcome of one scan, mirrored into the log entry it produced.
#[derive(Debug, Clone)]
pub struct ScanDecision {
    pub allowed: bool,
    pub status: ScanStatus,
    pub message: String,
    pub log_id: u64,
}

/// Last instant of the leave's final day.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .expect("23:59:59 is a valid time")
        .and_utc()
}

pub struct GateValidator<S, G, C> {
    leaves: S,
    logs: G,
    clock: C,
    codec: CredentialCodec,
    /// Serializes scans per (student, application) so two concurrent
    /// entry scans cannot both read "last action = exit".
    scan_locks: Cache<(u64, u64), Arc<Mutex<()>>>,
}

impl<S: LeaveStore, G: GateLogStore, C: Clock> GateValidator<S, G, C> {
    pub fn new(leaves: S, logs: G, clock: C, codec: CredentialCodec) -> Self {
        GateValidator {
            leaves,
            logs,
            clock,
            codec,
            scan_locks: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(std::time::Duration::from_secs(600))
                .build(),
        }
    }

    /// Validates a presented credential for an exit or entry and logs
    /// the outcome. Check order: authenticity, application lookup,
    /// approval status, not-before, expiry, then entry sequencing.
    pub async fn scan(
        &self,
        raw_token: &str,
        action: GateAction,
        scanned_by: u64,
        location: Option<String>,
    ) -> Result<ScanDecision, CoreError> {
        let now = self.clock.now();

        let claims = match self.codec.decode(raw_token) {
            Ok(claims) => claims,
            Err(err) => {
                // unresolvable credential is logged against no student
                return self
                    .log_and_finish(
                        None,
                        None,
                        action,
                        scanned_by,
                        now,
                        Some(raw_token),
                        ScanStatus::Invalid,
                        err.to_string(),
                        location,
                    )
                    .await;
            }
        };

        let lock = self
            .scan_locks
            .get_with((claims.student_id, claims.application_id), || {
                Arc::new(Mutex::new(()))
            });
        let _serialized = lock.lock().await;

        let app = self
            .leaves
            .application_for_claims(claims.application_id, claims.student_id)
            .await?;
        let Some(app) = app else {
            return self
                .log_and_finish(
                    None,
                    None,
                    action,
                    scanned_by,
                    now,
                    Some(raw_token),
                    ScanStatus::Invalid,
                    "leave application not found".into(),
                    location,
                )
                .await;
        };

        // stored values are authoritative over the token's display
        // copies: extensions move to_date after issuance
        let not_before = app.valid_not_before.unwrap_or(claims.valid_not_before);
        let (status, message) = if !app.is_approved() {
            (ScanStatus::Invalid, "leave not approved".to_string())
        } else if now < not_before {
            (
                ScanStatus::Invalid,
                format!("credential not valid before {not_before}"),
            )
        } else if now > end_of_day(app.to_date) {
            (
                ScanStatus::Expired,
                format!("leave expired on {}", app.to_date),
            )
        } else if action == GateAction::Entry {
            match self
                .logs
                .last_valid_entry(app.student_id, app.id)
                .await?
            {
                Some(prev) if prev.action == GateAction::Exit => {
                    (ScanStatus::Valid, "entry allowed".to_string())
                }
                _ => (
                    ScanStatus::Invalid,
                    "no exit record found, entry not allowed".to_string(),
                ),
            }
        } else {
            (ScanStatus::Valid, "exit allowed".to_string())
        };

        self.log_and_finish(
            Some(app.student_id),
            Some(app.id),
            action,
            scanned_by,
            now,
            Some(raw_token),
            status,
            message,
            location,
        )
        .await
    }

    /// Gate staff waves a student through without a credential, e.g.
    /// day scholars or a dead phone. Logged as MANUAL, no state-machine
    /// interaction.
    pub async fn manual_override(
        &self,
        college_id: &str,
        action: GateAction,
        reason: &str,
        scanned_by: u64,
        location: Option<String>,
    ) -> Result<u64, CoreError> {
        let student = self
            .leaves
            .student_by_college_id(college_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        let log_id = self
            .logs
            .append(NewGateLogEntry {
                student_id: Some(student.id),
                leave_application_id: None,
                action,
                scanned_by,
                scanned_at: self.clock.now(),
                raw_payload: None,
                status: ScanStatus::Manual,
                message: format!("manual {action}: {reason}"),
                location,
            })
            .await?;
        Ok(log_id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_and_finish(
        &self,
        student_id: Option<u64>,
        leave_application_id: Option<u64>,
        action: GateAction,
        scanned_by: u64,
        scanned_at: DateTime<Utc>,
        raw_payload: Option<&str>,
        status: ScanStatus,
        message: String,
        location: Option<String>,
    ) -> Result<ScanDecision, CoreError> {
        let log_id = self
            .logs
            .append(NewGateLogEntry {
                student_id,
                leave_application_id,
                action,
                scanned_by,
                scanned_at,
                raw_payload: raw_payload.map(str::to_string),
                status,
                message: message.clone(),
                location,
            })
            .await?;
        Ok(ScanDecision {
            allowed: status == ScanStatus::Valid,
            status,
            message,
            log_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::lifecycle::{
        LeaveLifecycle, LifecycleConfig, StaffActor, SubmitLeave, Verdict,
    };
    use crate::core::memory::{MemoryStore, RecordingSink};
    use crate::core::routing::ApprovalTier;
    use crate::core::store::GateLogStore;
    use crate::model::leave_application::LeaveKind;
    use chrono::TimeZone;

    const GATE_STAFF: u64 = 41;

    struct Rig {
        store: MemoryStore,
        clock: FixedClock,
        lifecycle: LeaveLifecycle<MemoryStore, RecordingSink, FixedClock>,
        gate: GateValidator<MemoryStore, MemoryStore, FixedClock>,
    }

    fn rig() -> Rig {
        let store = MemoryStore::with_fixture();
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let codec = CredentialCodec::new("unit-test-secret");
        Rig {
            store: store.clone(),
            clock: clock.clone(),
            lifecycle: LeaveLifecycle::new(
                store.clone(),
                RecordingSink::new(),
                clock.clone(),
                codec.clone(),
                LifecycleConfig::default(),
            ),
            gate: GateValidator::new(store.clone(), store, clock, codec),
        }
    }

    /// Submit 2026-03-04..2026-03-06 for student 1, approve at the
    /// deputy tier and issue the credential.
    async fn approved_token(rig: &Rig) -> (u64, String) {
        let id = rig
            .lifecycle
            .submit(SubmitLeave {
                student_id: 1,
                kind: LeaveKind::Regular,
                from_date: "2026-03-04".parse().unwrap(),
                to_date: "2026-03-06".parse().unwrap(),
                reason: "home".into(),
                destination: None,
                contact_phone: None,
            })
            .await
            .unwrap();
        rig.lifecycle
            .decide(
                id,
                StaffActor {
                    user_id: 31,
                    tier: ApprovalTier::DeputyWarden,
                },
                Verdict::Approve,
                None,
            )
            .await
            .unwrap();
        let token = rig.lifecycle.issue_or_fetch_credential(id, 1).await.unwrap();
        (id, token)
    }

    async fn log_count(rig: &Rig) -> usize {
        rig.store
            .entries_since(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn exit_within_window_then_entry_after_expiry() {
        let rig = rig();
        let (_, token) = approved_token(&rig).await;

        // one hour before from_date, inside the 2h credential lead
        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 3, 23, 0, 0).unwrap());
        let exit = rig
            .gate
            .scan(&token, GateAction::Exit, GATE_STAFF, Some("main gate".into()))
            .await
            .unwrap();
        assert!(exit.allowed);
        assert_eq!(exit.status, ScanStatus::Valid);

        // one day past to_date
        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap());
        let entry = rig
            .gate
            .scan(&token, GateAction::Entry, GATE_STAFF, None)
            .await
            .unwrap();
        assert!(!entry.allowed);
        assert_eq!(entry.status, ScanStatus::Expired);
    }

    #[tokio::test]
    async fn scan_before_window_names_the_earliest_instant() {
        let rig = rig();
        let (_, token) = approved_token(&rig).await;

        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 3, 20, 0, 0).unwrap());
        let decision = rig
            .gate
            .scan(&token, GateAction::Exit, GATE_STAFF, None)
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.status, ScanStatus::Invalid);
        assert!(decision.message.contains("2026-03-03 22:00:00"));
    }

    #[tokio::test]
    async fn entry_without_exit_is_denied_and_logged() {
        let rig = rig();
        let (_, token) = approved_token(&rig).await;
        let before = log_count(&rig).await;

        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap());
        let decision = rig
            .gate
            .scan(&token, GateAction::Entry, GATE_STAFF, None)
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.status, ScanStatus::Invalid);
        assert!(decision.message.contains("no exit record"));
        assert_eq!(log_count(&rig).await, before + 1);
    }

    #[tokio::test]
    async fn exit_entry_exit_entry_sequences_cleanly() {
        let rig = rig();
        let (_, token) = approved_token(&rig).await;

        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 4, 8, 0, 0).unwrap());
        assert!(rig.gate.scan(&token, GateAction::Exit, GATE_STAFF, None).await.unwrap().allowed);

        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 4, 20, 0, 0).unwrap());
        assert!(rig.gate.scan(&token, GateAction::Entry, GATE_STAFF, None).await.unwrap().allowed);

        // second entry without a fresh exit
        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 4, 20, 5, 0).unwrap());
        let again = rig.gate.scan(&token, GateAction::Entry, GATE_STAFF, None).await.unwrap();
        assert!(!again.allowed);

        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap());
        assert!(rig.gate.scan(&token, GateAction::Exit, GATE_STAFF, None).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn tampered_token_logs_against_no_student() {
        let rig = rig();
        let (_, token) = approved_token(&rig).await;

        let mut value: serde_json::Value = serde_json::from_str(&token).unwrap();
        value["from_date"] = serde_json::json!("2026-03-05");
        let forged = value.to_string();

        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap());
        let decision = rig
            .gate
            .scan(&forged, GateAction::Exit, GATE_STAFF, None)
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.status, ScanStatus::Invalid);

        let entries = rig
            .store
            .entries_since(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();
        let logged = entries.iter().find(|e| e.id == decision.log_id).unwrap();
        assert_eq!(logged.student_id, None);
        assert_eq!(logged.raw_payload.as_deref(), Some(forged.as_str()));
    }

    #[tokio::test]
    async fn pending_application_token_is_not_approved() {
        let rig = rig();
        let id = rig
            .lifecycle
            .submit(SubmitLeave {
                student_id: 1,
                kind: LeaveKind::Regular,
                from_date: "2026-03-04".parse().unwrap(),
                to_date: "2026-03-06".parse().unwrap(),
                reason: "home".into(),
                destination: None,
                contact_phone: None,
            })
            .await
            .unwrap();
        // forge a structurally valid token for the still-pending leave
        let app = rig.store.application(id).await.unwrap().unwrap();
        let student = rig.store.student(1).await.unwrap().unwrap();
        let token = rig.lifecycle.codec().encode(
            &app,
            &student,
            Utc.with_ymd_and_hms(2026, 3, 3, 22, 0, 0).unwrap(),
        );

        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap());
        let decision = rig.gate.scan(&token, GateAction::Exit, GATE_STAFF, None).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.message, "leave not approved");
    }

    #[tokio::test]
    async fn extension_moves_the_expiry_seen_at_the_gate() {
        let rig = rig();
        let (id, token) = approved_token(&rig).await;

        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 4, 8, 0, 0).unwrap());
        assert!(rig.gate.scan(&token, GateAction::Exit, GATE_STAFF, None).await.unwrap().allowed);

        let ext = rig
            .lifecycle
            .request_extension(90, id, "2026-03-09".parse().unwrap(), "flight delayed".into())
            .await
            .unwrap();
        rig.lifecycle
            .decide_extension(
                ext,
                StaffActor {
                    user_id: 31,
                    tier: ApprovalTier::DeputyWarden,
                },
                Verdict::Approve,
                None,
            )
            .await
            .unwrap();

        // 2026-03-07 would have been past the original to_date
        rig.clock.set(Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap());
        let entry = rig.gate.scan(&token, GateAction::Entry, GATE_STAFF, None).await.unwrap();
        assert!(entry.allowed, "extended leave admits re-entry");
    }

    #[tokio::test]
    async fn manual_override_logs_and_skips_credential_checks() {
        let rig = rig();

        let err = rig
            .gate
            .manual_override("NO-SUCH-ID", GateAction::Exit, "lost card", GATE_STAFF, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound));

        let log_id = rig
            .gate
            .manual_override("CSE-2023-002", GateAction::Exit, "phone dead", GATE_STAFF, None)
            .await
            .unwrap();
        let entries = rig
            .store
            .entries_since(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();
        let logged = entries.iter().find(|e| e.id == log_id).unwrap();
        assert_eq!(logged.status, ScanStatus::Manual);
        assert_eq!(logged.student_id, Some(2));
        assert!(logged.message.contains("phone dead"));
    }
}
