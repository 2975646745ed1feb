//! mysql-adapter: MySQL implementation of the `UserRepository` port.
//!
//! Purpose
//! - Own the process' single MySQL pool through `MysqlProvider`, built lazily
//!   by `lazy_conn::LazyConnection` the first time anyone asks for it.
//! - Implement `LivenessProbe` (pool acquire + ping) for the health endpoint.
//! - Implement `UserRepository` with a plain `INSERT` into `users`.
//!
//! Notes
//! - Uses `sqlx` with the tokio runtime; no compile-time checked queries, so
//!   building does not need a live database.
//! - Pool limits come from `MysqlSettings` unchanged. sqlx has no direct
//!   equivalent of a "max idle connections" knob: when it is at least the pool
//!   size idle connections are never reaped, otherwise sqlx's default idle
//!   timeout applies.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{CoreError, LivenessProbe, User, UserRepository};
use lazy_conn::{Connector, LazyConnection};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Connection;
use tracing::info;

/// DDL for the users table, applied by `MysqlUserRepo::init_schema`.
pub const USERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Connection and pool settings for MySQL.
#[derive(Clone)]
pub struct MysqlSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Upper bound on open connections.
    pub max_open_connections: u32,
    pub max_idle_connections: u32,
    /// Connections older than this are closed and replaced.
    pub max_lifetime: Duration,
    /// How long `acquire` (and initial construction) may wait.
    pub acquire_timeout: Duration,
}

impl Default for MysqlSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 3306,
            username: "root".into(),
            password: String::new(),
            database: "hello".into(),
            max_open_connections: 10,
            max_idle_connections: 20,
            max_lifetime: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

// Hand-written so the password never ends up in logs.
impl fmt::Debug for MysqlSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_open_connections", &self.max_open_connections)
            .field("max_idle_connections", &self.max_idle_connections)
            .field("max_lifetime", &self.max_lifetime)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl MysqlSettings {
    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
    }

    pub fn pool_options(&self) -> MySqlPoolOptions {
        let idle_timeout = if self.max_idle_connections >= self.max_open_connections {
            None
        } else {
            Some(Duration::from_secs(10 * 60))
        };
        MySqlPoolOptions::new()
            .max_connections(self.max_open_connections)
            .min_connections(0)
            .max_lifetime(Some(self.max_lifetime))
            .idle_timeout(idle_timeout)
            .acquire_timeout(self.acquire_timeout)
    }
}

/// Builds the MySQL pool for `LazyConnection`.
pub struct MysqlConnector {
    settings: MysqlSettings,
}

impl MysqlConnector {
    pub fn new(settings: MysqlSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for MysqlConnector {
    type Handle = MySqlPool;
    type Error = sqlx::Error;

    fn store(&self) -> &'static str {
        "mysql"
    }

    async fn connect(&self) -> Result<MySqlPool, sqlx::Error> {
        info!(
            host = %self.settings.host,
            port = self.settings.port,
            database = %self.settings.database,
            max_open = self.settings.max_open_connections,
            "opening mysql pool"
        );
        self.settings
            .pool_options()
            .connect_with(self.settings.connect_options())
            .await
    }

    async fn ping(&self, pool: &MySqlPool) -> Result<(), sqlx::Error> {
        let mut conn = pool.acquire().await?;
        conn.ping().await
    }
}

/// The process' shared MySQL pool, constructed on first use.
pub struct MysqlProvider {
    inner: LazyConnection<MysqlConnector>,
    settings: MysqlSettings,
}

impl MysqlProvider {
    pub fn new(settings: MysqlSettings) -> Self {
        Self {
            inner: LazyConnection::new(MysqlConnector::new(settings.clone())),
            settings,
        }
    }

    /// Shared pool; built exactly once even under concurrent first use.
    pub async fn get_connection(&self) -> Result<&MySqlPool, sqlx::Error> {
        self.inner.get_connection().await
    }

    /// Acquire a connection and ping it. Never fatal.
    pub async fn check_connection(&self) -> Result<(), sqlx::Error> {
        self.inner.check_connection().await
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    pub fn settings(&self) -> &MysqlSettings {
        &self.settings
    }
}

#[async_trait]
impl LivenessProbe for MysqlProvider {
    async fn probe(&self) -> Result<(), CoreError> {
        self.check_connection()
            .await
            .map_err(|e| CoreError::Unavailable(format!("mysql: {e}")))
    }
}

/// MySQL-backed user repository sharing the provider's pool.
pub struct MysqlUserRepo {
    provider: Arc<MysqlProvider>,
}

impl MysqlUserRepo {
    pub fn new(provider: Arc<MysqlProvider>) -> Self {
        Self { provider }
    }

    /// Create the `users` table when missing.
    pub async fn init_schema(&self) -> Result<(), CoreError> {
        let pool = self.pool().await?;
        sqlx::query(USERS_SCHEMA)
            .execute(pool)
            .await
            .map_err(map_sqlerr)?;
        Ok(())
    }

    async fn pool(&self) -> Result<&MySqlPool, CoreError> {
        self.provider
            .get_connection()
            .await
            .map_err(|e| CoreError::Unavailable(format!("mysql: {e}")))
    }
}

#[async_trait]
impl UserRepository for MysqlUserRepo {
    async fn insert(&self, user: &User) -> Result<(), CoreError> {
        let pool = self.pool().await?;
        sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
            .bind(&user.name)
            .bind(&user.email)
            .execute(pool)
            .await
            .map_err(map_sqlerr)?;
        Ok(())
    }
}

fn map_sqlerr<E: fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("mysql error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_settings() -> MysqlSettings {
        MysqlSettings {
            host: "127.0.0.1".into(),
            // Nothing listens on port 1 in a test environment.
            port: 1,
            acquire_timeout: Duration::from_millis(500),
            ..MysqlSettings::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = MysqlSettings::default();
        assert_eq!(s.port, 3306);
        assert_eq!(s.database, "hello");
        assert_eq!(s.max_open_connections, 10);
        assert_eq!(s.max_idle_connections, 20);
        assert_eq!(s.max_lifetime, Duration::from_secs(60));
    }

    #[test]
    fn pool_options_pass_limits_through() {
        let s = MysqlSettings {
            max_open_connections: 7,
            max_lifetime: Duration::from_secs(42),
            acquire_timeout: Duration::from_secs(3),
            ..MysqlSettings::default()
        };
        let opts = s.pool_options();
        assert_eq!(opts.get_max_connections(), 7);
        assert_eq!(opts.get_max_lifetime(), Some(Duration::from_secs(42)));
        assert_eq!(opts.get_acquire_timeout(), Duration::from_secs(3));
        // idle (20) >= open (7): idle connections are kept.
        assert_eq!(opts.get_idle_timeout(), None);
    }

    #[test]
    fn fewer_idle_than_open_keeps_idle_reaping() {
        let s = MysqlSettings {
            max_open_connections: 10,
            max_idle_connections: 2,
            ..MysqlSettings::default()
        };
        assert!(s.pool_options().get_idle_timeout().is_some());
    }

    #[test]
    fn debug_redacts_password() {
        let s = MysqlSettings {
            password: "hunter2".into(),
            ..MysqlSettings::default()
        };
        let dbg = format!("{:?}", s);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[tokio::test]
    async fn unreachable_server_fails_softly_on_check() {
        let provider = MysqlProvider::new(unreachable_settings());
        assert!(provider.check_connection().await.is_err());
        assert!(!provider.is_initialized());

        let err = provider.probe().await.unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn insert_without_database_is_unavailable() {
        let provider = Arc::new(MysqlProvider::new(unreachable_settings()));
        let repo = MysqlUserRepo::new(provider);
        let err = repo
            .insert(&User::new("123456", "89978"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));
    }
}
