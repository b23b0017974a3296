use crate::error::app_error::AppError;
use crate::models::session::SessionValidation;
use crate::service::session::SessionManager;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use serde::Serialize;

/// Name of the private cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    #[serde(skip)]
    pub session_id: String,
}

pub(crate) fn session_token(cookies: &CookieJar<'_>) -> Option<String> {
    cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().trim().to_string())
        .filter(|token| !token.is_empty())
}

pub(crate) fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Authorizes a request from the session token it presents.
///
/// A missing, unknown or expired token is a 401. A store failure is a 500
/// for this request only.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let Some(token) = session_token(req.cookies()) else {
            return Outcome::Error((Status::Unauthorized, AppError::Unauthorized));
        };

        let Some(sessions) = req.rocket().state::<SessionManager>() else {
            return Outcome::Error((Status::InternalServerError, AppError::Unauthorized));
        };

        match sessions.validate(&token).await {
            Ok(SessionValidation::Valid { user_id }) => {
                let current_user = CurrentUser {
                    id: user_id,
                    session_id: token,
                };
                req.local_cache(|| Some(current_user.clone()));
                Outcome::Success(current_user)
            }
            Ok(SessionValidation::Invalid) => Outcome::Error((Status::Unauthorized, AppError::Unauthorized)),
            Err(err) => {
                tracing::error!(error = ?err, "Session validation failed");
                Outcome::Error((Status::InternalServerError, err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("abc".to_string(), true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }
}
