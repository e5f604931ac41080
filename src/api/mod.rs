pub mod gate;
pub mod leave;

use actix_web::HttpResponse;

use crate::core::clock::SystemClock;
use crate::core::error::CoreError;
use crate::core::gate::GateValidator;
use crate::core::lifecycle::LeaveLifecycle;
use crate::store::mysql::{MySqlGateLogStore, MySqlLeaveStore};
use crate::store::notify::DbNotificationSink;

/// Production wiring of the core services.
pub type LiveLifecycle = LeaveLifecycle<MySqlLeaveStore, DbNotificationSink, SystemClock>;
pub type LiveGate = GateValidator<MySqlLeaveStore, MySqlGateLogStore, SystemClock>;

/// The single place core rejections become HTTP. The core itself never
/// sees a status code.
pub fn core_error_response(err: &CoreError) -> HttpResponse {
    let body = serde_json::json!({ "message": err.to_string() });
    match err {
        CoreError::InvalidRange | CoreError::InsufficientLeadTime(_) => {
            HttpResponse::BadRequest().json(body)
        }
        CoreError::WrongTier | CoreError::NotApproved | CoreError::NonAdvancingDate => {
            HttpResponse::Forbidden().json(body)
        }
        CoreError::NotFound => HttpResponse::NotFound().json(body),
        CoreError::OverlappingApplication | CoreError::AlreadyProcessed => {
            HttpResponse::Conflict().json(body)
        }
        CoreError::Store(e) => {
            tracing::error!(error = %e, "Store failure");
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal Server Error" }))
        }
    }
}
