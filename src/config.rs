use rocket::figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

/// What happens to a user's sessions when the user is deleted.
///
/// The `sessions.user_id` foreign key carries no `ON DELETE` clause, so the
/// choice is made here instead of in the schema.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserDeletePolicy {
    /// Refuse to delete a user that still owns sessions.
    #[default]
    Restrict,
    /// Delete every session of the user, then the user.
    RevokeSessions,
}

/// Longest accepted session lifetime: ten years.
pub const MAX_SESSION_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Lifetime of an issued session.
    pub ttl_seconds: u64,
    /// How often the reaper sweeps expired sessions.
    pub reap_interval_seconds: u64,
    pub cookie_secure: bool,
    pub user_delete_policy: UserDeletePolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://forum.db".to_string(),
            max_connections: 8,
            min_connections: 1,
            acquire_timeout: 5,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 24 * 60 * 60,
            reap_interval_seconds: 60 * 60,
            cookie_secure: false,
            user_delete_policy: UserDeletePolicy::Restrict,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl SessionConfig {
    /// Reject lifetimes that would make every issued session fail.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_seconds == 0 {
            return Err("session.ttl_seconds must be at least 1".to_string());
        }
        if self.ttl_seconds > MAX_SESSION_TTL_SECONDS {
            return Err(format!(
                "session.ttl_seconds must not exceed {MAX_SESSION_TTL_SECONDS}, got {}",
                self.ttl_seconds
            ));
        }
        Ok(())
    }

    pub fn ttl(&self) -> chrono::Duration {
        i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn reap_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reap_interval_seconds.max(1))
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Forum.toml (base configuration file)
    /// 2. Environment variables prefixed with FORUM_, nested with `__`
    ///    (e.g. FORUM_SESSION__TTL_SECONDS)
    /// 3. DATABASE_URL environment variable
    pub fn load() -> Result<Self, figment::Error> {
        let config: Self = Self::figment().extract()?;
        config.session.validate()?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("Forum.toml"))
            .merge(Env::prefixed("FORUM_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
    }
}
