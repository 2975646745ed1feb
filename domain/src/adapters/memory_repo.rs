use std::sync::Mutex;

use async_trait::async_trait;

use crate::{CoreError, User, UserRepository};

/// Simple in-memory user store. Data is lost on restart.
pub struct InMemoryUserRepo {
    inner: Mutex<Vec<User>>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything inserted so far, in insertion order.
    pub fn all(&self) -> Result<Vec<User>, CoreError> {
        let users = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(users.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|users| users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryUserRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepo {
    async fn insert(&self, user: &User) -> Result<(), CoreError> {
        let mut users = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        users.push(user.clone());
        Ok(())
    }
}
