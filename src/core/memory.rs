//! In-memory collaborators for core unit tests. A single mutex plays
//! the role of the per-student critical section the MySQL store gets
//! from transactions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};

use crate::core::error::StoreError;
use crate::core::routing::{overlaps, ApprovalTier};
use crate::core::store::{
    ApprovalRecord, GateLogStore, InsertOutcome, LeaveStore, NewExtension, NewGateLogEntry,
    NewLeaveApplication, NotificationSink, TransitionOutcome,
};
use crate::model::{
    extension::{EmergencyExtension, ExtensionStatus},
    gate_log::{GateLogEntry, ScanStatus},
    leave_application::{LeaveApplication, LeaveStatus},
    student::Student,
};

#[derive(Default)]
struct MemoryState {
    applications: Vec<LeaveApplication>,
    extensions: Vec<EmergencyExtension>,
    students: Vec<Student>,
    gate_logs: Vec<GateLogEntry>,
    deputy_wardens: Vec<u64>,
    next_id: u64,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two students and one deputy warden; student 1 has a linked
    /// guardian account (user 90) and login account (user 70).
    pub fn with_fixture() -> Self {
        let store = Self::new();
        {
            let mut state = store.inner.lock().unwrap();
            state.students.push(Student {
                id: 1,
                user_id: Some(70),
                college_id: "CSE-2023-001".into(),
                full_name: "Arif Hossain".into(),
                room_no: Some("A-101".into()),
                phone: Some("01711000001".into()),
                guardian_user_id: Some(90),
            });
            state.students.push(Student {
                id: 2,
                user_id: Some(71),
                college_id: "CSE-2023-002".into(),
                full_name: "Nusrat Jahan".into(),
                room_no: Some("A-102".into()),
                phone: None,
                guardian_user_id: None,
            });
            state.deputy_wardens.push(31);
        }
        store
    }
}

impl LeaveStore for MemoryStore {
    async fn application(&self, id: u64) -> Result<Option<LeaveApplication>, StoreError> {
        let state = self.inner.lock().unwrap();
        Ok(state.applications.iter().find(|a| a.id == id).cloned())
    }

    async fn application_for_claims(
        &self,
        id: u64,
        student_id: u64,
    ) -> Result<Option<LeaveApplication>, StoreError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .applications
            .iter()
            .find(|a| a.id == id && a.student_id == student_id)
            .cloned())
    }

    async fn insert_application_if_free(
        &self,
        new: NewLeaveApplication,
    ) -> Result<InsertOutcome, StoreError> {
        let mut state = self.inner.lock().unwrap();
        let clash = state.applications.iter().any(|a| {
            a.student_id == new.student_id
                && matches!(
                    a.status,
                    LeaveStatus::Pending | LeaveStatus::ApprovedDw | LeaveStatus::ApprovedPrincipal
                )
                && overlaps(new.from_date, new.to_date, a.from_date, a.to_date)
        });
        if clash {
            return Ok(InsertOutcome::Overlapping);
        }
        let id = state.next_id();
        state.applications.push(LeaveApplication {
            id,
            student_id: new.student_id,
            kind: new.kind,
            from_date: new.from_date,
            to_date: new.to_date,
            reason: new.reason,
            destination: new.destination,
            contact_phone: new.contact_phone,
            status: LeaveStatus::Pending,
            dw_approver_id: None,
            dw_remarks: None,
            dw_decided_at: None,
            principal_approver_id: None,
            principal_remarks: None,
            principal_decided_at: None,
            qr_issued: false,
            qr_payload: None,
            valid_not_before: None,
            created_at: Utc::now(),
        });
        Ok(InsertOutcome::Created(id))
    }

    async fn transition_if_pending(
        &self,
        id: u64,
        to: LeaveStatus,
        record: ApprovalRecord,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut state = self.inner.lock().unwrap();
        let Some(app) = state.applications.iter_mut().find(|a| a.id == id) else {
            return Ok(TransitionOutcome::NotPending);
        };
        if app.status != LeaveStatus::Pending {
            return Ok(TransitionOutcome::NotPending);
        }
        app.status = to;
        match record.tier {
            ApprovalTier::DeputyWarden => {
                app.dw_approver_id = Some(record.approver_id);
                app.dw_remarks = record.remarks;
                app.dw_decided_at = Some(record.decided_at);
            }
            ApprovalTier::Principal => {
                app.principal_approver_id = Some(record.approver_id);
                app.principal_remarks = record.remarks;
                app.principal_decided_at = Some(record.decided_at);
            }
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn insert_extension(&self, new: NewExtension) -> Result<u64, StoreError> {
        let mut state = self.inner.lock().unwrap();
        let id = state.next_id();
        state.extensions.push(EmergencyExtension {
            id,
            leave_application_id: new.leave_application_id,
            guardian_id: new.guardian_id,
            new_to_date: new.new_to_date,
            reason: new.reason,
            status: ExtensionStatus::Pending,
            approver_id: None,
            remarks: None,
            decided_at: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn extension(&self, id: u64) -> Result<Option<EmergencyExtension>, StoreError> {
        let state = self.inner.lock().unwrap();
        Ok(state.extensions.iter().find(|e| e.id == id).cloned())
    }

    async fn resolve_extension_if_pending(
        &self,
        id: u64,
        approve: bool,
        record: ApprovalRecord,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut state = self.inner.lock().unwrap();
        let Some(idx) = state.extensions.iter().position(|e| e.id == id) else {
            return Ok(TransitionOutcome::NotPending);
        };
        if state.extensions[idx].status != ExtensionStatus::Pending {
            return Ok(TransitionOutcome::NotPending);
        }
        state.extensions[idx].status = if approve {
            ExtensionStatus::Approved
        } else {
            ExtensionStatus::Rejected
        };
        state.extensions[idx].approver_id = Some(record.approver_id);
        state.extensions[idx].remarks = record.remarks;
        state.extensions[idx].decided_at = Some(record.decided_at);
        if approve {
            let parent_id = state.extensions[idx].leave_application_id;
            let new_to = state.extensions[idx].new_to_date;
            if let Some(app) = state.applications.iter_mut().find(|a| a.id == parent_id) {
                app.to_date = new_to;
            }
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn cache_credential_if_absent(
        &self,
        id: u64,
        payload: &str,
        valid_not_before: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let mut state = self.inner.lock().unwrap();
        let app = state
            .applications
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::new("application vanished during issuance"))?;
        if app.qr_payload.is_none() {
            app.qr_payload = Some(payload.to_string());
            app.valid_not_before = Some(valid_not_before);
            app.qr_issued = true;
        }
        Ok(app.qr_payload.clone().expect("payload just written"))
    }

    async fn student(&self, id: u64) -> Result<Option<Student>, StoreError> {
        let state = self.inner.lock().unwrap();
        Ok(state.students.iter().find(|s| s.id == id).cloned())
    }

    async fn student_by_college_id(&self, college_id: &str) -> Result<Option<Student>, StoreError> {
        let state = self.inner.lock().unwrap();
        Ok(state.students.iter().find(|s| s.college_id == college_id).cloned())
    }

    async fn deputy_warden_user_ids(&self) -> Result<Vec<u64>, StoreError> {
        let state = self.inner.lock().unwrap();
        Ok(state.deputy_wardens.clone())
    }

    async fn end_dates_for_applications(
        &self,
        ids: &[u64],
    ) -> Result<HashMap<u64, NaiveDate>, StoreError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .applications
            .iter()
            .filter(|a| ids.contains(&a.id))
            .map(|a| (a.id, a.to_date))
            .collect())
    }
}

impl GateLogStore for MemoryStore {
    async fn append(&self, new: NewGateLogEntry) -> Result<u64, StoreError> {
        let mut state = self.inner.lock().unwrap();
        let id = state.next_id();
        state.gate_logs.push(GateLogEntry {
            id,
            student_id: new.student_id,
            leave_application_id: new.leave_application_id,
            action: new.action,
            scanned_by: new.scanned_by,
            scanned_at: new.scanned_at,
            raw_payload: new.raw_payload,
            status: new.status,
            message: new.message,
            location: new.location,
        });
        Ok(id)
    }

    async fn last_valid_entry(
        &self,
        student_id: u64,
        application_id: u64,
    ) -> Result<Option<GateLogEntry>, StoreError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .gate_logs
            .iter()
            .filter(|e| {
                e.student_id == Some(student_id)
                    && e.leave_application_id == Some(application_id)
                    && e.status == ScanStatus::Valid
            })
            .max_by_key(|e| (e.scanned_at, e.id))
            .cloned())
    }

    async fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<GateLogEntry>, StoreError> {
        let state = self.inner.lock().unwrap();
        let mut entries: Vec<_> = state
            .gate_logs
            .iter()
            .filter(|e| e.scanned_at >= since)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.scanned_at, e.id));
        Ok(entries)
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<(u64, Option<u64>, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recipients(&self) -> Vec<u64> {
        self.sent.lock().unwrap().iter().map(|(u, _, _)| *u).collect()
    }

    pub fn messages_for(&self, user_id: u64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _, _)| *u == user_id)
            .map(|(_, _, m)| m.clone())
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    async fn notify(&self, user_id: u64, leave_application_id: Option<u64>, message: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((user_id, leave_application_id, message.to_string()));
    }
}
