//! Domain library for the user API.
//!
//! Holds the user record, the ports (traits) the HTTP layer talks to, and the
//! error type shared across adapters. Keep drivers and IO concerns out of this
//! crate; the only dependencies are serde (for the wire shape of `User`) and
//! async-trait (so ports can be used as trait objects).

use std::error::Error;
use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A user as accepted by `POST /user`.
///
/// No validation beyond the presence of both fields is applied here;
/// uniqueness and any other constraint belongs to the backing store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
}

impl User {
    pub fn new<N: Into<String>, E: Into<String>>(name: N, email: E) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Repository port for persisting users.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist a single user. Backend errors are surfaced unchanged as
    /// `CoreError::Repository`; there is no retry at this layer.
    async fn insert(&self, user: &User) -> Result<(), CoreError>;
}

/// Lightweight check that a backing connection is usable.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self) -> Result<(), CoreError>;
}

/// Core domain errors (no external error crates here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The store rejected or failed the operation.
    Repository(String),
    /// The store could not be reached at all.
    Unavailable(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
            CoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

impl Error for CoreError {}

/// Return a short about/version line for logs.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{}", pkg, ver)
}

pub mod adapters;
