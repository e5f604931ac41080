//! Derived "currently outside" view.
//!
//! Pure projection over the append-only gate log: no mutable counter
//! exists anywhere, so this cannot diverge from the audit trail. The
//! ordering contract is latest-movement-wins per student, where a
//! movement is a VALID or MANUAL entry; ties on `scanned_at` break on
//! the higher log id.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::gate_log::{GateAction, GateLogEntry, ScanStatus};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OutsideStudent {
    pub student_id: u64,
    pub leave_application_id: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub exited_at: DateTime<Utc>,
    pub location: Option<String>,
    /// True when the exit was a manual override rather than a scanned
    /// credential.
    pub manual: bool,
}

fn is_movement(entry: &GateLogEntry) -> bool {
    matches!(entry.status, ScanStatus::Valid | ScanStatus::Manual)
}

/// Students whose latest movement is an exit. Credentialed exits drop
/// out of the view once the leave's end date passes; manual exits have
/// no leave attached and stay until an entry supersedes them.
pub fn students_currently_outside(
    entries: &[GateLogEntry],
    leave_end_dates: &HashMap<u64, NaiveDate>,
    today: NaiveDate,
) -> Vec<OutsideStudent> {
    let mut latest: BTreeMap<u64, &GateLogEntry> = BTreeMap::new();
    for entry in entries {
        if !is_movement(entry) {
            continue;
        }
        let Some(student_id) = entry.student_id else {
            continue;
        };
        match latest.get(&student_id) {
            Some(current) if (entry.scanned_at, entry.id) < (current.scanned_at, current.id) => {}
            _ => {
                latest.insert(student_id, entry);
            }
        }
    }

    latest
        .into_values()
        .filter(|entry| entry.action == GateAction::Exit)
        .filter(|entry| match entry.leave_application_id {
            Some(app_id) => leave_end_dates
                .get(&app_id)
                .is_some_and(|end| *end >= today),
            None => true,
        })
        .map(|entry| OutsideStudent {
            student_id: entry.student_id.expect("filtered above"),
            leave_application_id: entry.leave_application_id,
            exited_at: entry.scanned_at,
            location: entry.location.clone(),
            manual: entry.status == ScanStatus::Manual,
        })
        .collect()
}
