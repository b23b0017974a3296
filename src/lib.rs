mod auth;
mod config;
mod cron_tasks;
pub mod database;
mod db;
mod error;
mod middleware;
pub mod models;
mod routes;
pub mod service;

#[cfg(test)]
pub mod test_utils;

pub use config::{Config, DatabaseConfig, SessionConfig, UserDeletePolicy};
pub use cron_tasks::{ReapResult, reap_expired_sessions};
pub use db::init_pool;
pub use error::app_error::AppError;

use crate::database::session::SessionStore;
use crate::database::sqlite_repository::SqliteRepository;
use crate::db::stage_db;
use crate::middleware::RequestLogger;
use crate::routes as app_routes;
use crate::service::reaper::ReaperFairing;
use crate::service::session::SessionManager;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, catchers};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const API_BASE_PATH: &str = "/api";

pub fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG takes precedence over the configured level, e.g.
    //   RUST_LOG=forum_auth::service=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    // A subscriber may already be installed (tests, embedding binaries).
    let _ = if json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
}

/// Builds the shared repository and session manager on top of the staged pool.
fn stage_sessions(session_config: SessionConfig) -> AdHoc {
    AdHoc::try_on_ignite("Session Manager", |rocket| async move {
        if let Err(e) = session_config.validate() {
            tracing::error!(error = %e, "Invalid session configuration");
            return Err(rocket);
        }

        let Some(pool) = rocket.state::<SqlitePool>().cloned() else {
            tracing::error!("Session manager requires a staged database pool");
            return Err(rocket);
        };

        let repo = SqliteRepository::new(pool);
        let store: Arc<dyn SessionStore> = Arc::new(repo.clone());
        let sessions = SessionManager::new(store, &session_config);
        tracing::info!(ttl_secs = session_config.ttl_seconds, "Session manager ready");

        Ok(rocket.manage(repo).manage(sessions).manage(session_config))
    })
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", config.server.address.clone()))
        .merge(("port", config.server.port));

    let reaper = ReaperFairing::new(config.session.reap_interval());

    rocket::custom(figment)
        .attach(RequestLogger)
        .attach(stage_db(config.database))
        .attach(stage_sessions(config.session))
        .attach(reaper)
        .mount(format!("{API_BASE_PATH}/users"), app_routes::user::routes())
        .mount(format!("{API_BASE_PATH}/health"), app_routes::health::routes())
        .register(
            API_BASE_PATH,
            catchers![
                app_routes::error::bad_request,
                app_routes::error::unauthorized,
                app_routes::error::not_found,
                app_routes::error::conflict,
                app_routes::error::unprocessable,
                app_routes::error::internal_error,
            ],
        )
}
