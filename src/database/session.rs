use crate::database::sqlite_repository::SqliteRepository;
use crate::error::app_error::AppError;
use crate::models::session::{Session, SessionOrigin};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, warn};

/// Bytes of entropy in a session token (hex-encoded to twice as many chars).
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Insert attempts before giving up on token collisions.
pub const MAX_TOKEN_ATTEMPTS: u32 = 3;

const COLUMNS: &str = "id, session_id, user_id, user_agent, real_ip, expires_at, created_at";

/// Durable persistence of session rows.
///
/// Lookups never interpret expiry: a row past its `expires_at` is still
/// returned. Deciding validity is the session manager's job.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session with a fresh token expiring `ttl` from now.
    async fn create_session(&self, user_id: i64, origin: &SessionOrigin, ttl: Duration) -> Result<Session, AppError>;
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, AppError>;
    /// Returns `false` when no row had this token.
    async fn delete_session(&self, session_id: &str) -> Result<bool, AppError>;
    /// Delete every row with `expires_at < cutoff`, returning how many went.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
    /// Sessions of `user_id` still valid at `now`, newest first.
    async fn list_sessions_for_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Session>, AppError>;
    async fn delete_sessions_for_user(&self, user_id: i64) -> Result<u64, AppError>;
}

pub fn generate_session_token() -> String {
    let mut token_bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut token_bytes);
    hex::encode(token_bytes)
}

/// `(created_at, expires_at)` for a session issued at `now`.
pub(crate) fn session_window(now: DateTime<Utc>, ttl: Duration) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    if ttl <= Duration::zero() {
        return Err(AppError::BadRequest("session ttl must be positive".to_string()));
    }
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::BadRequest("session ttl is out of range".to_string()))?;
    Ok((now, expires_at))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

#[async_trait::async_trait]
impl SessionStore for SqliteRepository {
    async fn create_session(&self, user_id: i64, origin: &SessionOrigin, ttl: Duration) -> Result<Session, AppError> {
        let (created_at, expires_at) = session_window(Utc::now(), ttl)?;
        let query = format!(
            "INSERT INTO sessions (session_id, user_id, user_agent, real_ip, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        );

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let result = sqlx::query_as::<_, Session>(&query)
                .bind(generate_session_token())
                .bind(user_id)
                .bind(&origin.user_agent)
                .bind(&origin.real_ip)
                .bind(expires_at)
                .bind(created_at)
                .fetch_one(&self.pool)
                .await;

            match result {
                Ok(session) => return Ok(session),
                Err(e) if is_unique_violation(&e) => {
                    warn!(user_id, attempt, "Session token collision, retrying with a fresh token");
                }
                Err(e) => return Err(AppError::db("Failed to create session", e)),
            }
        }

        Err(AppError::TokenExhausted {
            attempts: MAX_TOKEN_ATTEMPTS,
        })
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, AppError> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE session_id = ?");
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to look up session", e))?;

        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to delete session", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to delete expired sessions", e))?;

        debug!(cutoff = %cutoff, deleted = result.rows_affected(), "Deleted expired sessions");
        Ok(result.rows_affected())
    }

    async fn list_sessions_for_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Session>, AppError> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions
             WHERE user_id = ? AND expires_at > ?
             ORDER BY created_at DESC, id DESC"
        );
        let sessions = sqlx::query_as::<_, Session>(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to list sessions", e))?;

        Ok(sessions)
    }

    async fn delete_sessions_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to delete user sessions", e))?;

        Ok(result.rows_affected())
    }
}
