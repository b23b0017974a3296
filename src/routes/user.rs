use crate::auth::{CurrentUser, SESSION_COOKIE, session_cookie, session_token};
use crate::config::SessionConfig;
use crate::database::sqlite_repository::SqliteRepository;
use crate::error::app_error::AppError;
use crate::error::json::ValidatedJson;
use crate::middleware::ClientOrigin;
use crate::models::session::SessionInfo;
use crate::models::user::{LoginRequest, UserRequest, UserResponse};
use crate::service::auth::AuthService;
use crate::service::session::SessionManager;
use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use rocket::{State, routes};
use serde::Serialize;

#[derive(Serialize)]
pub struct RevokedResponse {
    pub revoked: u64,
}

#[rocket::post("/", data = "<payload>")]
pub async fn post_user(repo: &State<SqliteRepository>, payload: ValidatedJson<UserRequest>) -> Result<(Status, Json<UserResponse>), AppError> {
    let user = repo.create_user(&payload.username, &payload.email, &payload.password).await?;
    Ok((Status::Created, Json(UserResponse::from(&user))))
}

#[rocket::post("/login", data = "<payload>")]
pub async fn post_user_login(
    repo: &State<SqliteRepository>,
    sessions: &State<SessionManager>,
    session_config: &State<SessionConfig>,
    cookies: &CookieJar<'_>,
    origin: ClientOrigin,
    payload: ValidatedJson<LoginRequest>,
) -> Result<Json<UserResponse>, AppError> {
    // A successful login replaces whatever session this client presented before.
    let previous = session_token(cookies);
    let outcome = AuthService::new(repo, sessions)
        .login(&payload.login, &payload.password, &origin.0, previous.as_deref())
        .await?;

    cookies.add_private(session_cookie(outcome.session_id, session_config.cookie_secure));

    Ok(Json(UserResponse::from(&outcome.user)))
}

/// Logging out twice, or without a session, still succeeds.
#[rocket::post("/logout")]
pub async fn post_user_logout(sessions: &State<SessionManager>, cookies: &CookieJar<'_>) -> Result<Status, AppError> {
    if let Some(token) = session_token(cookies) {
        sessions.revoke(&token).await?;
    }
    cookies.remove_private(Cookie::build(SESSION_COOKIE).path("/").build());
    Ok(Status::NoContent)
}

#[rocket::get("/me")]
pub async fn get_me(repo: &State<SqliteRepository>, current_user: CurrentUser) -> Result<Json<UserResponse>, AppError> {
    let user = repo.get_user_by_id(current_user.id).await?.ok_or(AppError::Unauthorized)?;
    Ok(Json(UserResponse::from(&user)))
}

#[rocket::get("/sessions")]
pub async fn get_sessions(sessions: &State<SessionManager>, current_user: CurrentUser) -> Result<Json<Vec<SessionInfo>>, AppError> {
    let active = sessions.active_sessions(current_user.id).await?;
    Ok(Json(
        active.iter().map(|s| SessionInfo::from_session(s, &current_user.session_id)).collect(),
    ))
}

#[rocket::delete("/sessions")]
pub async fn delete_sessions(
    sessions: &State<SessionManager>,
    cookies: &CookieJar<'_>,
    current_user: CurrentUser,
) -> Result<Json<RevokedResponse>, AppError> {
    let revoked = sessions.revoke_all(current_user.id).await?;
    cookies.remove_private(Cookie::build(SESSION_COOKIE).path("/").build());
    Ok(Json(RevokedResponse { revoked }))
}

#[rocket::delete("/me")]
pub async fn delete_me(
    repo: &State<SqliteRepository>,
    session_config: &State<SessionConfig>,
    cookies: &CookieJar<'_>,
    current_user: CurrentUser,
) -> Result<Status, AppError> {
    repo.delete_user(current_user.id, session_config.user_delete_policy).await?;
    cookies.remove_private(Cookie::build(SESSION_COOKIE).path("/").build());
    Ok(Status::NoContent)
}

pub fn routes() -> Vec<rocket::Route> {
    routes![post_user, post_user_login, post_user_logout, get_me, get_sessions, delete_sessions, delete_me]
}
