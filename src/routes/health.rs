use crate::database::sqlite_repository::SqliteRepository;
use crate::models::health::HealthResponse;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, routes};

#[rocket::get("/")]
pub async fn healthcheck(repo: &State<SqliteRepository>) -> (Status, Json<HealthResponse>) {
    match repo.ping().await {
        Ok(()) => (
            Status::Ok,
            Json(HealthResponse {
                status: "ok",
                database: "reachable",
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check could not reach the database");
            (
                Status::ServiceUnavailable,
                Json(HealthResponse {
                    status: "degraded",
                    database: "unreachable",
                }),
            )
        }
    }
}

pub fn routes() -> Vec<rocket::Route> {
    routes![healthcheck]
}
