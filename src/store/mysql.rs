//! MySQL-backed collaborators. The per-student critical section for
//! submit comes from `SELECT ... FOR UPDATE` inside a transaction;
//! lifecycle transitions are single optimistic statements guarded by
//! `status = 'pending'`.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::MySqlPool;

use crate::core::error::StoreError;
use crate::core::routing::{overlaps, ApprovalTier};
use crate::core::store::{
    ApprovalRecord, GateLogStore, InsertOutcome, LeaveStore, NewExtension, NewGateLogEntry,
    NewLeaveApplication, TransitionOutcome,
};
use crate::model::{
    extension::EmergencyExtension,
    gate_log::GateLogEntry,
    leave_application::{LeaveApplication, LeaveStatus},
    student::Student,
};

const APPLICATION_COLUMNS: &str = "id, student_id, kind, from_date, to_date, reason, destination, \
     contact_phone, status, dw_approver_id, dw_remarks, dw_decided_at, principal_approver_id, \
     principal_remarks, principal_decided_at, qr_issued, qr_payload, valid_not_before, created_at";

const GATE_LOG_COLUMNS: &str = "id, student_id, leave_application_id, action, scanned_by, \
     scanned_at, raw_payload, status, message, location";

#[derive(Clone)]
pub struct MySqlLeaveStore {
    pool: MySqlPool,
}

impl MySqlLeaveStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlLeaveStore { pool }
    }
}

impl LeaveStore for MySqlLeaveStore {
    async fn application(&self, id: u64) -> Result<Option<LeaveApplication>, StoreError> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM leave_applications WHERE id = ?");
        sqlx::query_as::<_, LeaveApplication>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::new)
    }

    async fn application_for_claims(
        &self,
        id: u64,
        student_id: u64,
    ) -> Result<Option<LeaveApplication>, StoreError> {
        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM leave_applications WHERE id = ? AND student_id = ?"
        );
        sqlx::query_as::<_, LeaveApplication>(&sql)
            .bind(id)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::new)
    }

    async fn insert_application_if_free(
        &self,
        new: NewLeaveApplication,
    ) -> Result<InsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::new)?;

        // lock the student's active rows for the duration of the check
        let active: Vec<(NaiveDate, NaiveDate)> = sqlx::query_as(
            r#"
            SELECT from_date, to_date
            FROM leave_applications
            WHERE student_id = ?
            AND status IN ('pending', 'approved_dw', 'approved_principal')
            FOR UPDATE
            "#,
        )
        .bind(new.student_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::new)?;

        if active
            .iter()
            .any(|(from, to)| overlaps(new.from_date, new.to_date, *from, *to))
        {
            return Ok(InsertOutcome::Overlapping);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO leave_applications
                (student_id, kind, from_date, to_date, reason, destination, contact_phone, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(new.student_id)
        .bind(new.kind)
        .bind(new.from_date)
        .bind(new.to_date)
        .bind(&new.reason)
        .bind(&new.destination)
        .bind(&new.contact_phone)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::new)?;

        tx.commit().await.map_err(StoreError::new)?;
        Ok(InsertOutcome::Created(result.last_insert_id()))
    }

    async fn transition_if_pending(
        &self,
        id: u64,
        to: LeaveStatus,
        record: ApprovalRecord,
    ) -> Result<TransitionOutcome, StoreError> {
        let sql = match record.tier {
            ApprovalTier::DeputyWarden => {
                r#"
                UPDATE leave_applications
                SET status = ?, dw_approver_id = ?, dw_remarks = ?, dw_decided_at = ?
                WHERE id = ? AND status = 'pending'
                "#
            }
            ApprovalTier::Principal => {
                r#"
                UPDATE leave_applications
                SET status = ?, principal_approver_id = ?, principal_remarks = ?, principal_decided_at = ?
                WHERE id = ? AND status = 'pending'
                "#
            }
        };
        let result = sqlx::query(sql)
            .bind(to)
            .bind(record.approver_id)
            .bind(&record.remarks)
            .bind(record.decided_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::new)?;
        if result.rows_affected() == 0 {
            return Ok(TransitionOutcome::NotPending);
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn insert_extension(&self, new: NewExtension) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO emergency_extensions
                (leave_application_id, guardian_id, new_to_date, reason, status)
            VALUES (?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(new.leave_application_id)
        .bind(new.guardian_id)
        .bind(new.new_to_date)
        .bind(&new.reason)
        .execute(&self.pool)
        .await
        .map_err(StoreError::new)?;
        Ok(result.last_insert_id())
    }

    async fn extension(&self, id: u64) -> Result<Option<EmergencyExtension>, StoreError> {
        sqlx::query_as::<_, EmergencyExtension>(
            r#"
            SELECT id, leave_application_id, guardian_id, new_to_date, reason, status,
                   approver_id, remarks, decided_at, created_at
            FROM emergency_extensions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::new)
    }

    async fn resolve_extension_if_pending(
        &self,
        id: u64,
        approve: bool,
        record: ApprovalRecord,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::new)?;

        let status = if approve { "approved" } else { "rejected" };
        let result = sqlx::query(
            r#"
            UPDATE emergency_extensions
            SET status = ?, approver_id = ?, remarks = ?, decided_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status)
        .bind(record.approver_id)
        .bind(&record.remarks)
        .bind(record.decided_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::new)?;
        if result.rows_affected() == 0 {
            return Ok(TransitionOutcome::NotPending);
        }

        if approve {
            // the only post-approval date mutation, atomic with the flip
            sqlx::query(
                r#"
                UPDATE leave_applications la
                JOIN emergency_extensions ee ON ee.leave_application_id = la.id
                SET la.to_date = ee.new_to_date
                WHERE ee.id = ?
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::new)?;
        }

        tx.commit().await.map_err(StoreError::new)?;
        Ok(TransitionOutcome::Applied)
    }

    async fn cache_credential_if_absent(
        &self,
        id: u64,
        payload: &str,
        valid_not_before: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        sqlx::query(
            r#"
            UPDATE leave_applications
            SET qr_payload = ?, valid_not_before = ?, qr_issued = 1
            WHERE id = ? AND qr_payload IS NULL
            "#,
        )
        .bind(payload)
        .bind(valid_not_before)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::new)?;

        // re-read so a concurrent issuer and we agree on one token
        let stored: Option<Option<String>> =
            sqlx::query_scalar("SELECT qr_payload FROM leave_applications WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::new)?;
        stored
            .flatten()
            .ok_or_else(|| StoreError::new("credential payload missing after issuance"))
    }

    async fn student(&self, id: u64) -> Result<Option<Student>, StoreError> {
        sqlx::query_as::<_, Student>(
            r#"
            SELECT id, user_id, college_id, full_name, room_no, phone, guardian_user_id
            FROM students
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::new)
    }

    async fn student_by_college_id(&self, college_id: &str) -> Result<Option<Student>, StoreError> {
        sqlx::query_as::<_, Student>(
            r#"
            SELECT id, user_id, college_id, full_name, room_no, phone, guardian_user_id
            FROM students
            WHERE college_id = ?
            "#,
        )
        .bind(college_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::new)
    }

    async fn deputy_warden_user_ids(&self) -> Result<Vec<u64>, StoreError> {
        let ids: Vec<(u64,)> =
            sqlx::query_as("SELECT id FROM users WHERE role_id = 3 AND is_active = 1")
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::new)?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn end_dates_for_applications(
        &self,
        ids: &[u64],
    ) -> Result<HashMap<u64, NaiveDate>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT id, to_date FROM leave_applications WHERE id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, (u64, NaiveDate)>(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(StoreError::new)?;
        Ok(rows.into_iter().collect())
    }
}

#[derive(Clone)]
pub struct MySqlGateLogStore {
    pool: MySqlPool,
}

impl MySqlGateLogStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlGateLogStore { pool }
    }
}

impl GateLogStore for MySqlGateLogStore {
    async fn append(&self, new: NewGateLogEntry) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO gate_logs
                (student_id, leave_application_id, action, scanned_by, scanned_at,
                 raw_payload, status, message, location)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.student_id)
        .bind(new.leave_application_id)
        .bind(new.action)
        .bind(new.scanned_by)
        .bind(new.scanned_at)
        .bind(&new.raw_payload)
        .bind(new.status)
        .bind(&new.message)
        .bind(&new.location)
        .execute(&self.pool)
        .await
        .map_err(StoreError::new)?;
        Ok(result.last_insert_id())
    }

    async fn last_valid_entry(
        &self,
        student_id: u64,
        application_id: u64,
    ) -> Result<Option<GateLogEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {GATE_LOG_COLUMNS}
            FROM gate_logs
            WHERE student_id = ? AND leave_application_id = ? AND status = 'valid'
            ORDER BY scanned_at DESC, id DESC
            LIMIT 1
            "#
        );
        sqlx::query_as::<_, GateLogEntry>(&sql)
            .bind(student_id)
            .bind(application_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::new)
    }

    async fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<GateLogEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {GATE_LOG_COLUMNS}
            FROM gate_logs
            WHERE scanned_at >= ?
            ORDER BY scanned_at ASC, id ASC
            "#
        );
        sqlx::query_as::<_, GateLogEntry>(&sql)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::new)
    }
}
