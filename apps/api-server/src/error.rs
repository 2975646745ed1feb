//! Startup failures. Any of these terminates the process with exit code 1.
//! Configuration errors are reported before tracing exists and never get here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("mysql connection pool: {0}")]
    Mysql(String),

    #[error("user store ({store}): {message}")]
    UserStore { store: &'static str, message: String },

    #[error("bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
