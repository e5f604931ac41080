use crate::api::gate::{GateLogFilter, ManualReq, ScanReq};
use crate::api::leave::{
    CreateLeave, DecideBody, ExtensionReq, LeaveFilter, LeaveListResponse, LeaveResponse,
};
use crate::core::credential::CredentialClaims;
use crate::core::presence::OutsideStudent;
use crate::model::extension::ExtensionStatus;
use crate::model::gate_log::{GateAction, ScanStatus};
use crate::model::leave_application::{LeaveKind, LeaveStatus};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hostel Gate Pass API",
        version = "1.0.0",
        description = r#"
## Hostel Leave & Gate Pass System

This API authorizes and audits hostel student leave.

### Key Features
- **Leave Management**
  - Students apply for leave; deputy warden / principal approve by duration tier
- **Emergency Extensions**
  - Guardians request extra days against an approved leave
- **QR Gate Credentials**
  - Approved leave is encoded into a signed, time-windowed QR token
- **Gate Audit Log**
  - Every scan (valid or not) is logged; presence is derived from the log

### Security
Most endpoints are protected using **JWT Bearer authentication**.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::leave::create_leave,
        crate::api::leave::leave_list,
        crate::api::leave::get_leave,
        crate::api::leave::approve_leave,
        crate::api::leave::reject_leave,
        crate::api::leave::get_credential,
        crate::api::leave::request_extension,
        crate::api::leave::approve_extension,
        crate::api::leave::reject_extension,

        crate::api::gate::scan,
        crate::api::gate::manual_override,
        crate::api::gate::currently_outside,
        crate::api::gate::gate_logs,
    ),
    components(
        schemas(
            CreateLeave,
            DecideBody,
            ExtensionReq,
            LeaveFilter,
            LeaveResponse,
            LeaveListResponse,
            ScanReq,
            ManualReq,
            GateLogFilter,
            CredentialClaims,
            OutsideStudent,
            LeaveKind,
            LeaveStatus,
            ExtensionStatus,
            GateAction,
            ScanStatus
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Leave", description = "Leave application lifecycle APIs"),
        (name = "Extension", description = "Emergency extension APIs"),
        (name = "Gate", description = "Gate scan and audit APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
