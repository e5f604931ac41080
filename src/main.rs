use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod core;
mod db;
mod model;
mod models;
mod routes;
mod store;
mod docs;

use config::Config;
use db::init_db;

use crate::api::{LiveGate, LiveLifecycle};
use crate::core::clock::SystemClock;
use crate::core::credential::CredentialCodec;
use crate::core::gate::GateValidator;
use crate::core::lifecycle::{LeaveLifecycle, LifecycleConfig};
use crate::docs::ApiDoc;
use crate::store::mysql::{MySqlGateLogStore, MySqlLeaveStore};
use crate::store::notify::DbNotificationSink;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Hostel Gate Pass"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await;

    let codec = CredentialCodec::new(&config.qr_secret);
    let leave_store = MySqlLeaveStore::new(pool.clone());
    let gate_log_store = MySqlGateLogStore::new(pool.clone());

    let lifecycle: LiveLifecycle = LeaveLifecycle::new(
        leave_store.clone(),
        DbNotificationSink::new(pool.clone()),
        SystemClock,
        codec.clone(),
        LifecycleConfig {
            approval_threshold_days: config.approval_threshold_days,
            min_advance_days: config.min_advance_days,
            credential_lead_hours: config.credential_lead_hours,
        },
    );
    let gate: LiveGate =
        GateValidator::new(leave_store.clone(), gate_log_store.clone(), SystemClock, codec);

    let lifecycle = Data::new(lifecycle);
    let gate = Data::new(gate);
    let leave_store = Data::new(leave_store);
    let gate_log_store = Data::new(gate_log_store);

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(lifecycle.clone())
            .app_data(gate.clone())
            .app_data(leave_store.clone())
            .app_data(gate_log_store.clone())
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
