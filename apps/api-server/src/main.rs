//! api-server: HTTP API for the user service.
//!
//! Provides:
//! - `GET /healthcheck`: always `200 WORKING`; probes MySQL and logs the result.
//! - `POST /user`: stores `{"name", "email"}` in the configured user store.
//! - `GET /metrics`: Prometheus exposition.
//!
//! Storage: MongoDB (default, `mongo` feature), MySQL, or in-memory, selected
//! with `USER_STORE`. The MySQL pool is always built at startup because the
//! health check depends on it; failing to build it, or the selected store,
//! exits with status 1.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # MySQL-backed users, JSON logs, New Relic export
//! USER_STORE=mysql LOG_FORMAT=json \
//! ENABLE_NEW_RELIC=true NEW_RELIC_LICENSE_KEY=... \
//!   cargo run -p api-server --features apm
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod apm;
mod config;
mod error;
mod handlers;
mod metrics;
mod request_log;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use domain::adapters::memory_repo::InMemoryUserRepo;
use domain::{LivenessProbe, UserRepository};
use mysql_adapter::{MysqlProvider, MysqlUserRepo};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, UserStore};
use crate::error::StartupError;
use crate::handlers::AppState;
use crate::request_log::RequestLogData;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let apm_status = init_tracing(&cfg);
    cfg.warn_if_misconfigured();
    apm::log_status(&apm_status);
    info!(version = %domain::about(), "starting api-server");

    let code = match run(cfg).await {
        Ok(()) => 0,
        Err(e) => {
            error!(err = %e, "api-server failed");
            1
        }
    };

    apm::shutdown();
    std::process::exit(code);
}

async fn run(cfg: Config) -> Result<(), StartupError> {
    let metrics_handle = crate::metrics::install()?;

    // The pool is a hard dependency: build it now so a bad DSN or an
    // unreachable server stops the process before it accepts traffic.
    let mysql = Arc::new(MysqlProvider::new(cfg.mysql.clone()));
    mysql
        .get_connection()
        .await
        .map_err(|e| StartupError::Mysql(e.to_string()))?;
    let settings = mysql.settings();
    info!(
        host = %settings.host,
        port = settings.port,
        database = %settings.database,
        max_open = settings.max_open_connections,
        "mysql pool ready"
    );

    let users = build_user_repo(&cfg, &mysql).await?;
    log_probe(mysql.as_ref()).await;

    let state = AppState {
        users,
        probe: mysql,
        metrics: metrics_handle,
    };

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    info!(%addr, "api-server listening");

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(StartupError::Serve)?;

    info!("api-server stopped");
    Ok(())
}

fn app(state: AppState) -> Router {
    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    Router::new()
        .route("/healthcheck", get(handlers::healthcheck))
        .route("/user", post(handlers::create_user))
        .route("/metrics", get(handlers::render_metrics))
        .route_layer(middleware::from_fn(crate::metrics::track_http))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let log = RequestLogData::from_request(request);
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %log.id,
                    origin_ip = %log.origin_ip,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state)
}

fn init_tracing(cfg: &Config) -> apm::ApmStatus {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let (apm_layer, apm_status) = apm::layer(&cfg.apm);
    let registry = registry.with(apm_layer);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
    apm_status
}

// Construct the user repository selected by USER_STORE.
async fn build_user_repo(
    cfg: &Config,
    mysql: &Arc<MysqlProvider>,
) -> Result<Arc<dyn UserRepository>, StartupError> {
    match cfg.user_store {
        UserStore::Memory => Ok(Arc::new(InMemoryUserRepo::new())),
        UserStore::Mysql => {
            let repo = MysqlUserRepo::new(Arc::clone(mysql));
            repo.init_schema()
                .await
                .map_err(|e| StartupError::UserStore {
                    store: "mysql",
                    message: e.to_string(),
                })?;
            Ok(Arc::new(repo))
        }
        UserStore::Mongo => build_mongo_repo(cfg).await,
    }
}

#[cfg(feature = "mongo")]
async fn build_mongo_repo(cfg: &Config) -> Result<Arc<dyn UserRepository>, StartupError> {
    use mongo_adapter::{MongoProvider, MongoSettings, MongoUserRepo};

    let provider = Arc::new(MongoProvider::new(MongoSettings {
        uri: cfg.mongo.uri.clone(),
        database: cfg.mongo.database.clone(),
        app_name: cfg.apm.app_name.clone(),
        server_selection_timeout: cfg.mongo.server_selection_timeout,
    }));
    provider
        .get_connection()
        .await
        .map_err(|e| StartupError::UserStore {
            store: "mongo",
            message: e.to_string(),
        })?;
    Ok(Arc::new(MongoUserRepo::new(provider)))
}

#[cfg(not(feature = "mongo"))]
async fn build_mongo_repo(_cfg: &Config) -> Result<Arc<dyn UserRepository>, StartupError> {
    Err(StartupError::UserStore {
        store: "mongo",
        message: "built without the `mongo` feature; set USER_STORE=mysql or memory".into(),
    })
}

async fn log_probe(probe: &dyn LivenessProbe) {
    match probe.probe().await {
        Ok(()) => info!("connected on mysql with success"),
        Err(e) => warn!(err = %e, "mysql startup probe failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(err = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(err = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
