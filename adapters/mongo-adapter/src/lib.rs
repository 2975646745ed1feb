//! mongo-adapter: MongoDB implementation of the `UserRepository` port.
//!
//! `MongoProvider` owns the shared database handle. The driver's `Client` is
//! itself lazy about opening sockets, so construction ends with a `ping` to make
//! an unreachable server fail at startup instead of on the first request.
//! Users are written to the `users` collection as `{name, email}` documents.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{CoreError, LivenessProbe, User, UserRepository};
use lazy_conn::{Connector, LazyConnection};
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tracing::info;

pub const USERS_COLLECTION: &str = "users";

/// Connection settings for MongoDB.
#[derive(Debug, Clone)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
    /// Reported to the server as the client application name.
    pub app_name: String,
    /// Bounds server selection, and with it how long construction can hang.
    pub server_selection_timeout: Duration,
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".into(),
            database: "api".into(),
            app_name: "user-api".into(),
            server_selection_timeout: Duration::from_secs(10),
        }
    }
}

pub struct MongoConnector {
    settings: MongoSettings,
}

impl MongoConnector {
    pub fn new(settings: MongoSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Handle = Database;
    type Error = mongodb::error::Error;

    fn store(&self) -> &'static str {
        "mongo"
    }

    async fn connect(&self) -> Result<Database, mongodb::error::Error> {
        let mut options = ClientOptions::parse(&self.settings.uri).await?;
        options.app_name = Some(self.settings.app_name.clone());
        options.server_selection_timeout = Some(self.settings.server_selection_timeout);
        options.connect_timeout = Some(self.settings.server_selection_timeout);

        let client = Client::with_options(options)?;
        let db = client.database(&self.settings.database);
        self.ping(&db).await?;
        info!(database = %self.settings.database, "mongo session ready");
        Ok(db)
    }

    async fn ping(&self, db: &Database) -> Result<(), mongodb::error::Error> {
        db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

/// The process' shared MongoDB database handle, constructed on first use.
pub struct MongoProvider {
    inner: LazyConnection<MongoConnector>,
}

impl MongoProvider {
    pub fn new(settings: MongoSettings) -> Self {
        Self {
            inner: LazyConnection::new(MongoConnector::new(settings)),
        }
    }

    pub async fn get_connection(&self) -> Result<&Database, mongodb::error::Error> {
        self.inner.get_connection().await
    }

    pub async fn check_connection(&self) -> Result<(), mongodb::error::Error> {
        self.inner.check_connection().await
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }
}

#[async_trait]
impl LivenessProbe for MongoProvider {
    async fn probe(&self) -> Result<(), CoreError> {
        self.check_connection()
            .await
            .map_err(|e| CoreError::Unavailable(format!("mongo: {e}")))
    }
}

/// MongoDB-backed user repository.
pub struct MongoUserRepo {
    provider: Arc<MongoProvider>,
}

impl MongoUserRepo {
    pub fn new(provider: Arc<MongoProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl UserRepository for MongoUserRepo {
    async fn insert(&self, user: &User) -> Result<(), CoreError> {
        let db = self
            .provider
            .get_connection()
            .await
            .map_err(|e| CoreError::Unavailable(format!("mongo: {e}")))?;
        db.collection::<User>(USERS_COLLECTION)
            .insert_one(user)
            .await
            .map_err(|e| CoreError::Repository(format!("mongo error: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_settings() -> MongoSettings {
        MongoSettings {
            uri: "mongodb://127.0.0.1:1/?directConnection=true".into(),
            server_selection_timeout: Duration::from_millis(300),
            ..MongoSettings::default()
        }
    }

    #[test]
    fn defaults() {
        let s = MongoSettings::default();
        assert_eq!(s.uri, "mongodb://localhost:27017");
        assert_eq!(s.database, "api");
        assert_eq!(s.server_selection_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn malformed_uri_fails_construction() {
        let provider = MongoProvider::new(MongoSettings {
            uri: "not-a-mongo-uri".into(),
            ..MongoSettings::default()
        });
        assert!(provider.get_connection().await.is_err());
        assert!(!provider.is_initialized());
    }

    #[tokio::test]
    async fn unreachable_server_fails_softly_on_check() {
        let provider = MongoProvider::new(unreachable_settings());
        assert!(provider.check_connection().await.is_err());
        assert!(!provider.is_initialized());

        let err = provider.probe().await.unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn insert_without_server_is_unavailable() {
        let repo = MongoUserRepo::new(Arc::new(MongoProvider::new(unreachable_settings())));
        let err = repo
            .insert(&User::new("123456", "89978"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));
    }
}
