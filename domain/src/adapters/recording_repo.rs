use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::{CoreError, User, UserRepository};

/// Test double for `UserRepository`.
///
/// Every `insert` argument is recorded before the preset outcome is returned,
/// so tests can assert both the status mapping and the exact payload.
pub struct RecordingUserRepo {
    calls: Mutex<Vec<User>>,
    outcome: Result<(), CoreError>,
}

impl RecordingUserRepo {
    /// Stub whose `insert` always succeeds.
    pub fn succeeding() -> Self {
        Self::with_outcome(Ok(()))
    }

    /// Stub whose `insert` always fails with `CoreError::Repository(message)`.
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self::with_outcome(Err(CoreError::Repository(message.into())))
    }

    pub fn with_outcome(outcome: Result<(), CoreError>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            outcome,
        }
    }

    /// Arguments of every `insert` call, oldest first.
    pub fn calls(&self) -> Vec<User> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn was_called_with(&self, user: &User) -> bool {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|u| u == user)
    }
}

#[async_trait]
impl UserRepository for RecordingUserRepo {
    async fn insert(&self, user: &User) -> Result<(), CoreError> {
        self.calls
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?
            .push(user.clone());
        self.outcome.clone()
    }
}
