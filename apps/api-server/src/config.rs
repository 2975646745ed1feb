//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time. `.env` files are honoured
//! by `main` (dotenvy) before this runs.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use mysql_adapter::MysqlSettings;
use url::Url;

/// Which backing store serves `POST /user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserStore {
    /// MongoDB `users` collection
    Mongo,
    /// MySQL `users` table on the shared pool
    Mysql,
    /// In-memory storage (data lost on restart)
    Memory,
}

impl UserStore {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("mysql") {
            Self::Mysql
        } else if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else {
            Self::Mongo
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// MongoDB connection values; turned into adapter settings only when the
/// `mongo` feature is compiled in.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub server_selection_timeout: Duration,
}

/// APM (New Relic) settings.
///
/// Bad values for the toggle or the proxy URL are not fatal: they are kept as
/// messages, logged after tracing is up, and APM runs disabled / unproxied.
#[derive(Clone)]
pub struct ApmConfig {
    pub enabled: bool,
    pub toggle_error: Option<String>,
    pub license_key: Option<String>,
    pub proxy_url: Option<Url>,
    pub proxy_error: Option<String>,
    pub app_name: String,
    pub endpoint: String,
}

impl fmt::Debug for ApmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApmConfig")
            .field("enabled", &self.enabled)
            .field("license_key", &self.license_key.as_ref().map(|_| "<redacted>"))
            .field("proxy_url", &self.proxy_url.as_ref().map(Url::as_str))
            .field("app_name", &self.app_name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8888)
    pub port: u16,
    /// Log format
    pub log_format: LogFormat,
    /// Store behind `POST /user` (default: mongo)
    pub user_store: UserStore,
    /// MySQL pool settings; the pool is always built because the health
    /// check probes it
    pub mysql: MysqlSettings,
    pub mongo: MongoConfig,
    pub apm: ApmConfig,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup` instead.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // Port
        let port = parse_num(&lookup, "PORT", 8888u16)?;

        // Log format
        let log_format = LogFormat::from_str(&var("LOG_FORMAT", "pretty"));

        // User store
        let user_store = UserStore::from_str(&var("USER_STORE", "mongo"));

        // MySQL
        let defaults = MysqlSettings::default();
        let mysql = MysqlSettings {
            host: var("MYSQL_HOST", &defaults.host),
            port: parse_num(&lookup, "MYSQL_PORT", defaults.port)?,
            username: var("MYSQL_USERNAME", &defaults.username),
            password: var("MYSQL_PASSWORD", &defaults.password),
            database: var("MYSQL_DATABASE", &defaults.database),
            max_open_connections: parse_num(
                &lookup,
                "MYSQL_MAX_OPEN_CONNS",
                defaults.max_open_connections,
            )?,
            max_idle_connections: parse_num(
                &lookup,
                "MYSQL_MAX_IDLE_CONNS",
                defaults.max_idle_connections,
            )?,
            max_lifetime: Duration::from_secs(parse_num(
                &lookup,
                "MYSQL_CONN_MAX_LIFETIME_SECS",
                defaults.max_lifetime.as_secs(),
            )?),
            acquire_timeout: Duration::from_secs(parse_num(
                &lookup,
                "MYSQL_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout.as_secs(),
            )?),
        };
        if mysql.max_open_connections == 0 {
            return Err(ConfigError {
                field: "MYSQL_MAX_OPEN_CONNS",
                message: "must be at least 1".into(),
            });
        }

        // MongoDB
        let mongo = MongoConfig {
            uri: var("MONGO_URL", "mongodb://localhost:27017"),
            database: var("MONGO_DATABASE", "api"),
            server_selection_timeout: Duration::from_secs(parse_num(
                &lookup,
                "MONGO_TIMEOUT_SECS",
                10u64,
            )?),
        };

        // APM
        let (enabled, toggle_error) = match lookup("ENABLE_NEW_RELIC") {
            None => (false, None),
            Some(raw) => match parse_bool(&raw) {
                Some(b) => (b, None),
                None => (
                    false,
                    Some(format!("ENABLE_NEW_RELIC: invalid boolean '{}'", raw)),
                ),
            },
        };
        let (proxy_url, proxy_error) = match lookup("NEW_RELIC_PROXY_URL").filter(|s| !s.is_empty())
        {
            None => (None, None),
            Some(raw) => match Url::parse(&raw) {
                Ok(u) => (Some(u), None),
                Err(e) => (
                    None,
                    Some(format!("NEW_RELIC_PROXY_URL: invalid url '{}': {}", raw, e)),
                ),
            },
        };
        let apm = ApmConfig {
            enabled,
            toggle_error,
            license_key: lookup("NEW_RELIC_LICENSE_KEY").filter(|s| !s.is_empty()),
            proxy_url,
            proxy_error,
            app_name: var("NEW_RELIC_APP_NAME", "user-api"),
            endpoint: var(
                "NEW_RELIC_OTLP_ENDPOINT",
                "https://otlp.nr-data.net:4318/v1/traces",
            ),
        };

        Ok(Self {
            port,
            log_format,
            user_store,
            mysql,
            mongo,
            apm,
        })
    }

    /// Log problems that were tolerated while loading.
    pub fn warn_if_misconfigured(&self) {
        if let Some(msg) = &self.apm.toggle_error {
            tracing::error!("{msg}; New Relic stays disabled");
        }
        if let Some(msg) = &self.apm.proxy_error {
            tracing::error!("{msg}; exporting without proxy");
        }
        if self.apm.enabled && self.apm.license_key.is_none() {
            tracing::warn!("ENABLE_NEW_RELIC is set but NEW_RELIC_LICENSE_KEY is empty");
        }
        if self.user_store == UserStore::Memory {
            tracing::warn!(
                "USER_STORE=memory: users are kept in process memory and lost on restart. \
                 DO NOT USE IN PRODUCTION."
            );
        }
    }
}

/// Boolean spellings accepted for toggles: 1/t/T/TRUE/true/True and the
/// matching false forms. Anything else is rejected.
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn parse_num<T, F>(lookup: &F, field: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(field) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError {
            field,
            message: format!("invalid number '{}': {}", raw, e),
        }),
    }
}
