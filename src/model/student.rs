use serde::{Deserialize, Serialize};

/// Hostel resident. `college_id` is the external id printed on the
/// student's id card and used for manual gate overrides.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: u64,
    /// Login account, if the student has one.
    pub user_id: Option<u64>,
    pub college_id: String,
    pub full_name: String,
    pub room_no: Option<String>,
    pub phone: Option<String>,
    /// Login account of the linked guardian, if any.
    pub guardian_user_id: Option<u64>,
}
