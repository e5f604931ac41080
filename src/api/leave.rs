use crate::api::{LiveLifecycle, core_error_response};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::core::lifecycle::{StaffActor, SubmitLeave, Verdict};
use crate::model::leave_application::{LeaveKind, LeaveStatus};
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlPool, prelude::FromRow};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    pub kind: LeaveKind,
    #[schema(example = "2026-04-10", format = "date", value_type = String)]
    pub from_date: NaiveDate,
    #[schema(example = "2026-04-12", format = "date", value_type = String)]
    pub to_date: NaiveDate,
    #[schema(example = "going home for Eid")]
    pub reason: String,
    pub destination: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DecideBody {
    pub remarks: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ExtensionReq {
    #[schema(example = "2026-04-15", format = "date", value_type = String)]
    pub new_to_date: NaiveDate,
    #[schema(example = "return flight was cancelled")]
    pub reason: String,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    /// Filter by student ID
    pub student_id: Option<u64>,
    /// Filter by leave status
    pub status: Option<String>,
    /// Restrict to one approval queue: "deputy" or "principal"
    pub queue: Option<String>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Pagination per page number
    pub per_page: Option<u64>,
}

// Helper enum for typed SQLx binding
enum FilterValue<'a> {
    U64(u64),
    I64(i64),
    Str(&'a str),
}

#[derive(Serialize, Deserialize, FromRow, ToSchema)]
pub struct LeaveResponse {
    /// leave application id
    pub id: u64,
    /// student the leave belongs to
    pub student_id: u64,
    pub kind: LeaveKind,
    #[schema(format = "date", value_type = String)]
    pub from_date: NaiveDate,
    #[schema(format = "date", value_type = String)]
    pub to_date: NaiveDate,
    pub reason: String,
    pub destination: Option<String>,
    pub status: LeaveStatus,
    pub qr_issued: bool,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveResponse>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

/* =========================
Submit leave request (student)
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/leave",
    request_body(content = CreateLeave, content_type = "application/json"),
    responses(
        (status = 200, description = "Leave request submitted", body = Object, example = json!({
            "message": "Leave request submitted",
            "application_id": 12,
            "status": "pending"
        })),
        (status = 400, description = "Bad dates or insufficient lead time"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Overlapping application")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    lifecycle: web::Data<LiveLifecycle>,
    payload: web::Json<CreateLeave>,
) -> actix_web::Result<impl Responder> {
    let student_id: u64 = auth
        .student_id
        .ok_or_else(|| actix_web::error::ErrorForbidden("No student profile"))?;

    let payload = payload.into_inner();
    let result = lifecycle
        .submit(SubmitLeave {
            student_id,
            kind: payload.kind,
            from_date: payload.from_date,
            to_date: payload.to_date,
            reason: payload.reason,
            destination: payload.destination,
            contact_phone: payload.contact_phone,
        })
        .await;

    match result {
        Ok(id) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Leave request submitted",
            "application_id": id,
            "status": "pending"
        }))),
        Err(e) => Ok(core_error_response(&e)),
    }
}

/* =========================
Approve / reject (deputy warden or principal, routed by duration)
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/approve",
    params(("leave_id" = u64, Path, description = "ID of the leave application")),
    request_body(content = DecideBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Leave approved", body = Object, example = json!({
            "message": "Leave approved",
            "status": "approved_dw"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Wrong approval tier for this duration"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    lifecycle: web::Data<LiveLifecycle>,
    path: web::Path<u64>,
    payload: web::Json<DecideBody>,
) -> actix_web::Result<impl Responder> {
    decide(auth, lifecycle, path.into_inner(), Verdict::Approve, payload).await
}

#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/reject",
    params(("leave_id" = u64, Path, description = "ID of the leave application")),
    request_body(content = DecideBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Leave rejected"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Wrong approval tier for this duration"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    lifecycle: web::Data<LiveLifecycle>,
    path: web::Path<u64>,
    payload: web::Json<DecideBody>,
) -> actix_web::Result<impl Responder> {
    decide(auth, lifecycle, path.into_inner(), Verdict::Reject, payload).await
}

async fn decide(
    auth: AuthUser,
    lifecycle: web::Data<LiveLifecycle>,
    leave_id: u64,
    verdict: Verdict,
    payload: web::Json<DecideBody>,
) -> actix_web::Result<HttpResponse> {
    let tier = auth.require_tier()?;
    let acting = StaffActor {
        user_id: auth.user_id,
        tier,
    };

    match lifecycle
        .decide(leave_id, acting, verdict, payload.remarks.clone())
        .await
    {
        Ok(status) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": match verdict {
                Verdict::Approve => "Leave approved",
                Verdict::Reject => "Leave rejected",
            },
            "status": status
        }))),
        Err(e) => Ok(core_error_response(&e)),
    }
}

/* =========================
QR credential (student)
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/leave/{leave_id}/credential",
    params(("leave_id" = u64, Path, description = "ID of the approved leave application")),
    responses(
        (status = 200, description = "Credential token for QR rendering", body = Object, example = json!({
            "token": "{\"schema\":\"gatepass.leave.v1\", \"...\":\"...\"}"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Leave not approved"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_credential(
    auth: AuthUser,
    lifecycle: web::Data<LiveLifecycle>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let student_id: u64 = auth
        .student_id
        .ok_or_else(|| actix_web::error::ErrorForbidden("No student profile"))?;

    match lifecycle
        .issue_or_fetch_credential(path.into_inner(), student_id)
        .await
    {
        Ok(token) => {
            // echo the parsed claims so the app can render them next to the QR
            let claims = lifecycle.codec().decode(&token).map_err(|e| {
                tracing::error!(error = %e, "Stored credential failed decode");
                actix_web::error::ErrorInternalServerError("Internal Server Error")
            })?;
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "token": token,
                "claims": claims
            })))
        }
        Err(e) => Ok(core_error_response(&e)),
    }
}

/* =========================
Emergency extension (guardian request, deputy warden decision)
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/leave/{leave_id}/extension",
    params(("leave_id" = u64, Path, description = "ID of the approved leave application")),
    request_body(content = ExtensionReq, content_type = "application/json"),
    responses(
        (status = 200, description = "Extension requested", body = Object, example = json!({
            "message": "Extension requested",
            "extension_id": 3
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Leave not approved, or date does not advance"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Extension"
)]
pub async fn request_extension(
    auth: AuthUser,
    lifecycle: web::Data<LiveLifecycle>,
    path: web::Path<u64>,
    payload: web::Json<ExtensionReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_guardian()?;

    match lifecycle
        .request_extension(
            auth.user_id,
            path.into_inner(),
            payload.new_to_date,
            payload.reason.clone(),
        )
        .await
    {
        Ok(id) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Extension requested",
            "extension_id": id
        }))),
        Err(e) => Ok(core_error_response(&e)),
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/extension/{extension_id}/approve",
    params(("extension_id" = u64, Path, description = "ID of the extension request")),
    request_body(content = DecideBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Extension approved, parent leave end date advanced"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Extension"
)]
pub async fn approve_extension(
    auth: AuthUser,
    lifecycle: web::Data<LiveLifecycle>,
    path: web::Path<u64>,
    payload: web::Json<DecideBody>,
) -> actix_web::Result<impl Responder> {
    decide_extension(auth, lifecycle, path.into_inner(), Verdict::Approve, payload).await
}

#[utoipa::path(
    put,
    path = "/api/v1/extension/{extension_id}/reject",
    params(("extension_id" = u64, Path, description = "ID of the extension request")),
    request_body(content = DecideBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Extension rejected"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Extension"
)]
pub async fn reject_extension(
    auth: AuthUser,
    lifecycle: web::Data<LiveLifecycle>,
    path: web::Path<u64>,
    payload: web::Json<DecideBody>,
) -> actix_web::Result<impl Responder> {
    decide_extension(auth, lifecycle, path.into_inner(), Verdict::Reject, payload).await
}

async fn decide_extension(
    auth: AuthUser,
    lifecycle: web::Data<LiveLifecycle>,
    extension_id: u64,
    verdict: Verdict,
    payload: web::Json<DecideBody>,
) -> actix_web::Result<HttpResponse> {
    auth.require_deputy_warden()?;
    let acting = StaffActor {
        user_id: auth.user_id,
        tier: crate::core::routing::ApprovalTier::DeputyWarden,
    };

    match lifecycle
        .decide_extension(extension_id, acting, verdict, payload.remarks.clone())
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": match verdict {
                Verdict::Approve => "Extension approved",
                Verdict::Reject => "Extension rejected",
            }
        }))),
        Err(e) => Ok(core_error_response(&e)),
    }
}

/* =========================
Fetch one application
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave application")),
    responses(
        (status = 200, description = "Leave application found", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave application not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let leave = sqlx::query_as::<_, LeaveResponse>(
        r#"
        SELECT id, student_id, kind, from_date, to_date, reason, destination,
               status, qr_issued, created_at
        FROM leave_applications
        WHERE id = ?
        "#,
    )
    .bind(leave_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, leave_id, "Failed to fetch leave application");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let Some(mut leave) = leave else {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Leave application not found"
        })));
    };

    // students may only see their own applications
    if auth.is_student() && auth.student_id != Some(leave.student_id) {
        return Err(actix_web::error::ErrorForbidden("Not your application"));
    }
    if !auth.is_student() {
        auth.require_staff()?;
    }

    leave.status = leave.status.effective(leave.to_date, Utc::now().date_naive());
    Ok(HttpResponse::Ok().json(leave))
}

/* =========================
List / filter applications (staff)
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<LeaveFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_staff()?;

    // -------------------------
    // Pagination
    // -------------------------
    let per_page = query.per_page.unwrap_or(10).min(100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    // -------------------------
    // WHERE clause
    // -------------------------
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(student_id) = query.student_id {
        where_sql.push_str(" AND student_id = ?");
        args.push(FilterValue::U64(student_id));
    }

    if let Some(status) = query.status.as_deref() {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Str(status));
    }

    // queue=deputy|principal narrows to the pending applications that
    // tier is allowed to decide; same duration rule as the decide path
    match query.queue.as_deref() {
        Some("deputy") => {
            where_sql
                .push_str(" AND status = 'pending' AND DATEDIFF(to_date, from_date) + 1 <= ?");
            args.push(FilterValue::I64(config.approval_threshold_days));
        }
        Some("principal") => {
            where_sql
                .push_str(" AND status = 'pending' AND DATEDIFF(to_date, from_date) + 1 > ?");
            args.push(FilterValue::I64(config.approval_threshold_days));
        }
        Some(other) => {
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "message": format!("Unknown queue '{other}'. Allowed: deputy, principal")
            })));
        }
        None => {}
    }

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!("SELECT COUNT(*) FROM leave_applications{}", where_sql);

    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::I64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(*s),
        };
    }

    let total = count_q.fetch_one(pool.get_ref()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to count leave applications");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    // -------------------------
    // DATA query
    // -------------------------
    let data_sql = format!(
        r#"
        SELECT id, student_id, kind, from_date, to_date, reason, destination,
               status, qr_issued, created_at
        FROM leave_applications
        {}
        ORDER BY created_at DESC
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );

    let mut data_q = sqlx::query_as::<_, LeaveResponse>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::I64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }

    let mut leaves = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch leave list");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    // expiry is advisory and computed on read, never written back
    let today = Utc::now().date_naive();
    for leave in &mut leaves {
        leave.status = leave.status.effective(leave.to_date, today);
    }

    let response = LeaveListResponse {
        data: leaves,
        page: page as u32,
        per_page: per_page as u32,
        total,
    };

    Ok(HttpResponse::Ok().json(response))
}
