use crate::api::{LiveGate, core_error_response};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::core::presence::students_currently_outside;
use crate::core::store::{GateLogStore, LeaveStore};
use crate::model::gate_log::{GateAction, GateLogEntry};
use crate::store::mysql::{MySqlGateLogStore, MySqlLeaveStore};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Duration, Utc};
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct ScanReq {
    /// Raw credential token as read from the QR code
    pub token: String,
    pub action: GateAction,
    #[schema(example = "main gate")]
    pub location: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ManualReq {
    #[schema(example = "CSE-2023-041")]
    pub college_id: String,
    pub action: GateAction,
    #[schema(example = "QR app not working, leave slip verified on paper")]
    pub reason: String,
    pub location: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct GateLogFilter {
    /// Filter by student ID
    pub student_id: Option<u64>,
    /// Filter by scan outcome
    pub status: Option<String>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Pagination per page number
    pub per_page: Option<u64>,
}

/* =========================
Scan a credential at the gate
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/gate/scan",
    request_body(content = ScanReq, content_type = "application/json"),
    responses(
        (status = 200, description = "Scan decided and logged (denials included)", body = Object, example = json!({
            "allowed": true,
            "status": "valid",
            "message": "exit allowed",
            "log_id": 118
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Scan could not be logged")
    ),
    security(("bearer_auth" = [])),
    tag = "Gate"
)]
pub async fn scan(
    auth: AuthUser,
    gate: web::Data<LiveGate>,
    payload: web::Json<ScanReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_gate_staff()?;

    let payload = payload.into_inner();
    match gate
        .scan(&payload.token, payload.action, auth.user_id, payload.location)
        .await
    {
        // a denied scan is still HTTP 200: the decision itself is the payload
        Ok(decision) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "allowed": decision.allowed,
            "status": decision.status,
            "message": decision.message,
            "log_id": decision.log_id
        }))),
        Err(e) => Ok(core_error_response(&e)),
    }
}

/* =========================
Manual override (no credential)
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/gate/manual",
    request_body(content = ManualReq, content_type = "application/json"),
    responses(
        (status = 200, description = "Manual movement logged", body = Object, example = json!({
            "message": "Manual movement logged",
            "log_id": 119
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Student not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Gate"
)]
pub async fn manual_override(
    auth: AuthUser,
    gate: web::Data<LiveGate>,
    payload: web::Json<ManualReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_gate_staff()?;

    let payload = payload.into_inner();
    match gate
        .manual_override(
            &payload.college_id,
            payload.action,
            &payload.reason,
            auth.user_id,
            payload.location,
        )
        .await
    {
        Ok(log_id) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Manual movement logged",
            "log_id": log_id
        }))),
        Err(e) => Ok(core_error_response(&e)),
    }
}

/* =========================
Students currently outside (derived from the log)
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/gate/outside",
    responses(
        (status = 200, description = "Students whose latest movement is an exit", body = Object, example = json!({
            "data": [{
                "student_id": 7,
                "leave_application_id": 40,
                "exited_at": "2026-04-10T07:45:00Z",
                "location": "main gate",
                "manual": false
            }]
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Gate"
)]
pub async fn currently_outside(
    auth: AuthUser,
    leaves: web::Data<MySqlLeaveStore>,
    logs: web::Data<MySqlGateLogStore>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    auth.require_staff()?;

    let since = Utc::now() - Duration::days(config.presence_window_days);
    let entries = logs.entries_since(since).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to load gate log window");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let mut app_ids: Vec<u64> = entries
        .iter()
        .filter_map(|e| e.leave_application_id)
        .collect();
    app_ids.sort_unstable();
    app_ids.dedup();
    let end_dates = leaves
        .end_dates_for_applications(&app_ids)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to load leave end dates");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    let outside = students_currently_outside(&entries, &end_dates, Utc::now().date_naive());
    Ok(HttpResponse::Ok().json(serde_json::json!({ "data": outside })))
}

/* =========================
Gate log audit listing
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/gate/logs",
    params(GateLogFilter),
    responses(
        (status = 200, description = "Paginated gate log"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Gate"
)]
pub async fn gate_logs(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<GateLogFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_staff()?;

    let per_page = query.per_page.unwrap_or(20).min(200);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    enum FilterValue<'a> {
        U64(u64),
        Str(&'a str),
    }

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

    let count_sql = format!("SELECT COUNT(*) FROM gate_logs{}", where_sql);
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(*s),
        };
    }
    let total = count_q.fetch_one(pool.get_ref()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to count gate logs");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let data_sql = format!(
        r#"
        SELECT id, student_id, leave_application_id, action, scanned_by,
               scanned_at, raw_payload, status, message, location
        FROM gate_logs
        {}
        ORDER BY scanned_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );
    let mut data_q = sqlx::query_as::<_, GateLogEntry>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }
    let entries = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch gate logs");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "data": entries,
        "page": page,
        "per_page": per_page,
        "total": total
    })))
}
