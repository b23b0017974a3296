use chrono::{DateTime, Utc};
use rocket::serde::Serialize;

/// A row of the `sessions` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub session_id: String,
    pub user_id: i64,
    pub user_agent: Option<String>,
    pub real_ip: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Valid strictly before `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Provenance captured when a session is issued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOrigin {
    pub user_agent: Option<String>,
    pub real_ip: Option<String>,
}

/// Outcome of checking a presented session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionValidation {
    Valid { user_id: i64 },
    Invalid,
}

/// Active session as shown to its owner. The token itself is never echoed back.
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: i64,
    pub user_agent: Option<String>,
    pub real_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub current: bool,
}

impl SessionInfo {
    pub fn from_session(session: &Session, current_token: &str) -> Self {
        Self {
            id: session.id,
            user_agent: session.user_agent.clone(),
            real_ip: session.real_ip.clone(),
            created_at: session.created_at,
            expires_at: session.expires_at,
            current: session.session_id == current_token,
        }
    }
}
