//! Signed QR credential for an approved leave.
//!
//! The token is the JSON claim set itself; the gate device parses it
//! rather than treating it as an opaque blob. Integrity comes from an
//! HMAC-SHA256 tag over the three binding fields (application id,
//! student id, from date), so reissuing display fields can never move a
//! credential onto another application or student.

use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::model::{leave_application::LeaveApplication, student::Student};

type HmacSha256 = Hmac<Sha256>;

pub const CREDENTIAL_SCHEMA: &str = "gatepass.leave.v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CredentialClaims {
    pub schema: String,
    pub application_id: u64,
    pub student_id: u64,
    pub college_id: String,
    pub student_name: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub valid_not_before: DateTime<Utc>,
    /// Hex-encoded HMAC-SHA256 over the binding fields.
    pub integrity_tag: String,
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum CredentialError {
    #[display(fmt = "credential is not parseable")]
    Malformed,
    #[display(fmt = "credential integrity check failed")]
    Tampered,
}

impl std::error::Error for CredentialError {}

#[derive(Clone)]
pub struct CredentialCodec {
    key: Vec<u8>,
}

impl CredentialCodec {
    pub fn new(secret: &str) -> Self {
        CredentialCodec {
            key: secret.as_bytes().to_vec(),
        }
    }

    /// Deterministic serialization of the binding fields. `from_date`
    /// renders as ISO-8601 so the payload is stable across releases.
    fn tag(&self, application_id: u64, student_id: u64, from_date: NaiveDate) -> String {
        let payload = format!("{application_id}|{student_id}|{from_date}");
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Builds the full claim set for an approved application. The
    /// caller persists the result once; repeated requests must return
    /// the cached token rather than re-encoding.
    pub fn encode(
        &self,
        app: &LeaveApplication,
        student: &Student,
        valid_not_before: DateTime<Utc>,
    ) -> String {
        let claims = CredentialClaims {
            schema: CREDENTIAL_SCHEMA.to_string(),
            application_id: app.id,
            student_id: app.student_id,
            college_id: student.college_id.clone(),
            student_name: student.full_name.clone(),
            from_date: app.from_date,
            to_date: app.to_date,
            valid_not_before,
            integrity_tag: self.tag(app.id, app.student_id, app.from_date),
        };
        serde_json::to_string(&claims).expect("credential claims always serialize")
    }

    /// Parses and authenticates a presented token. Temporal and status
    /// validity are the gate validator's concern, layered on top.
    pub fn decode(&self, raw: &str) -> Result<CredentialClaims, CredentialError> {
        let claims: CredentialClaims =
            serde_json::from_str(raw).map_err(|_| CredentialError::Malformed)?;

        let expected = self.tag(claims.application_id, claims.student_id, claims.from_date);
        let stored = hex::decode(&claims.integrity_tag).map_err(|_| CredentialError::Tampered)?;
        let computed = hex::decode(&expected).expect("tag is valid hex");
        if stored.len() != computed.len() || !bool::from(stored.ct_eq(computed.as_slice())) {
            return Err(CredentialError::Tampered);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::leave_application::{LeaveKind, LeaveStatus};

    fn sample_app() -> LeaveApplication {
        LeaveApplication {
            id: 41,
            student_id: 7,
            kind: LeaveKind::Regular,
            from_date: "2026-04-10".parse().unwrap(),
            to_date: "2026-04-12".parse().unwrap(),
            reason: "home visit".into(),
            destination: Some("Sylhet".into()),
            contact_phone: None,
            status: LeaveStatus::ApprovedDw,
            dw_approver_id: Some(3),
            dw_remarks: None,
            dw_decided_at: None,
            principal_approver_id: None,
            principal_remarks: None,
            principal_decided_at: None,
            qr_issued: false,
            qr_payload: None,
            valid_not_before: None,
            created_at: Utc::now(),
        }
    }

    fn sample_student() -> Student {
        Student {
            id: 7,
            user_id: Some(70),
            college_id: "CSE-2021-041".into(),
            full_name: "Rahim Uddin".into(),
            room_no: Some("B-204".into()),
            phone: None,
            guardian_user_id: Some(90),
        }
    }

    #[test]
    fn round_trip_authenticates() {
        let codec = CredentialCodec::new("unit-test-secret");
        let vnb = "2026-04-09T22:00:00Z".parse().unwrap();
        let token = codec.encode(&sample_app(), &sample_student(), vnb);

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.application_id, 41);
        assert_eq!(claims.student_id, 7);
        assert_eq!(claims.valid_not_before, vnb);
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = CredentialCodec::new("unit-test-secret");
        assert_eq!(codec.decode("not json").unwrap_err(), CredentialError::Malformed);
        assert_eq!(codec.decode("{}").unwrap_err(), CredentialError::Malformed);
    }

    #[test]
    fn tampered_from_date_is_rejected() {
        let codec = CredentialCodec::new("unit-test-secret");
        let vnb = "2026-04-09T22:00:00Z".parse().unwrap();
        let token = codec.encode(&sample_app(), &sample_student(), vnb);

        let mut value: serde_json::Value = serde_json::from_str(&token).unwrap();
        value["from_date"] = serde_json::json!("2026-04-11");
        let forged = value.to_string();

        assert_eq!(codec.decode(&forged).unwrap_err(), CredentialError::Tampered);
    }

    #[test]
    fn tampered_student_is_rejected() {
        let codec = CredentialCodec::new("unit-test-secret");
        let vnb = "2026-04-09T22:00:00Z".parse().unwrap();
        let token = codec.encode(&sample_app(), &sample_student(), vnb);

        let mut value: serde_json::Value = serde_json::from_str(&token).unwrap();
        value["student_id"] = serde_json::json!(8);
        assert_eq!(
            codec.decode(&value.to_string()).unwrap_err(),
            CredentialError::Tampered
        );
    }

    #[test]
    fn wrong_key_is_rejected() {
        let codec = CredentialCodec::new("unit-test-secret");
        let other = CredentialCodec::new("another-secret");
        let vnb = "2026-04-09T22:00:00Z".parse().unwrap();
        let token = codec.encode(&sample_app(), &sample_student(), vnb);
        assert_eq!(other.decode(&token).unwrap_err(), CredentialError::Tampered);
    }
}
