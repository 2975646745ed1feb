//! lazy-conn: single-flight lazy construction of shared connection handles.
//!
//! A `LazyConnection` owns a `Connector` and an empty cell. The first caller of
//! `get_connection()` runs `Connector::connect`; every caller that arrives while
//! that construction is in flight waits on it and then receives a reference to
//! the same handle. Once a construction has succeeded it never runs again.
//!
//! A failed construction leaves the cell empty, so the next caller starts a new
//! attempt. Whether a failure is fatal is the caller's decision: the api-server
//! constructs every provider at startup and exits on error.
//!
//! The provider is an ordinary owned value (usually behind an `Arc`) rather than
//! a process-wide static, so tests can build as many independent ones as they need.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Knows how to build and probe one kind of shared handle (a pool, a client...).
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short label for logs, e.g. "mysql".
    fn store(&self) -> &'static str;

    /// Build the handle. Called at most once per successful construction.
    async fn connect(&self) -> Result<Self::Handle, Self::Error>;

    /// Liveness probe against an already constructed handle.
    async fn ping(&self, handle: &Self::Handle) -> Result<(), Self::Error>;
}

/// Lazily constructed, shared connection handle.
pub struct LazyConnection<C: Connector> {
    connector: C,
    handle: OnceCell<C::Handle>,
}

impl<C: Connector> LazyConnection<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            handle: OnceCell::new(),
        }
    }

    /// Return the shared handle, constructing it on first use.
    pub async fn get_connection(&self) -> Result<&C::Handle, C::Error> {
        let store = self.connector.store();
        self.handle
            .get_or_try_init(|| async {
                debug!(store, "constructing shared connection");
                match self.connector.connect().await {
                    Ok(handle) => {
                        info!(store, "shared connection established");
                        Ok(handle)
                    }
                    Err(e) => {
                        warn!(store, err = %e, "shared connection construction failed");
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Obtain the handle and ping it. Errors are returned, never escalated.
    pub async fn check_connection(&self) -> Result<(), C::Error> {
        let handle = self.get_connection().await?;
        self.connector.ping(handle).await
    }

    /// The handle if it has already been constructed; never triggers construction.
    pub fn get(&self) -> Option<&C::Handle> {
        self.handle.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Connector that counts constructions and can be told to fail the first N.
    struct CountingConnector {
        constructions: AtomicUsize,
        failures_left: AtomicUsize,
        delay: Duration,
        ping_ok: bool,
    }

    impl CountingConnector {
        fn new(delay: Duration) -> Self {
            Self {
                constructions: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(0),
                delay,
                ping_ok: true,
            }
        }

        fn failing_first(mut self, n: usize) -> Self {
            self.failures_left = AtomicUsize::new(n);
            self
        }

        fn with_failing_ping(mut self) -> Self {
            self.ping_ok = false;
            self
        }

        fn constructions(&self) -> usize {
            self.constructions.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Handle = Arc<usize>;
        type Error = io::Error;

        fn store(&self) -> &'static str {
            "test"
        }

        async fn connect(&self) -> Result<Self::Handle, Self::Error> {
            let n = self.constructions.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            Ok(Arc::new(n))
        }

        async fn ping(&self, _handle: &Self::Handle) -> Result<(), Self::Error> {
            if self.ping_ok {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "ping failed"))
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_constructs_exactly_once() {
        let lazy = Arc::new(LazyConnection::new(CountingConnector::new(
            Duration::from_millis(50),
        )));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                tokio::spawn(async move { lazy.get_connection().await.map(Arc::clone) })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(lazy.connector().constructions(), 1);
        let first = &handles[0];
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, first)));
        assert_eq!(**first, 1);
    }

    #[tokio::test]
    async fn joined_callers_in_one_task_share_the_handle() {
        let lazy = LazyConnection::new(CountingConnector::new(Duration::from_millis(10)));

        let results = futures::future::join_all((0..8).map(|_| lazy.get_connection())).await;

        let first = results[0].as_ref().unwrap();
        for r in &results {
            assert!(std::ptr::eq(*r.as_ref().unwrap(), *first));
        }
        assert_eq!(lazy.connector().constructions(), 1);
    }

    #[tokio::test]
    async fn sequential_calls_reuse_the_handle() {
        let lazy = LazyConnection::new(CountingConnector::new(Duration::ZERO));
        assert!(!lazy.is_initialized());
        assert!(lazy.get().is_none());

        let a = Arc::clone(lazy.get_connection().await.unwrap());
        let b = Arc::clone(lazy.get_connection().await.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert!(lazy.is_initialized());
        assert!(lazy.get().is_some());
        assert_eq!(lazy.connector().constructions(), 1);
    }

    #[tokio::test]
    async fn failed_construction_is_not_cached() {
        let lazy = LazyConnection::new(CountingConnector::new(Duration::ZERO).failing_first(1));

        let err = lazy.get_connection().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(!lazy.is_initialized());

        let handle = lazy.get_connection().await.unwrap();
        assert_eq!(**handle, 2);
        assert_eq!(lazy.connector().constructions(), 2);
    }

    #[tokio::test]
    async fn check_connection_pings_constructed_handle() {
        let lazy = LazyConnection::new(CountingConnector::new(Duration::ZERO));
        lazy.check_connection().await.unwrap();
        lazy.check_connection().await.unwrap();
        assert_eq!(lazy.connector().constructions(), 1);
    }

    #[tokio::test]
    async fn check_connection_reports_ping_failure() {
        let lazy = LazyConnection::new(CountingConnector::new(Duration::ZERO).with_failing_ping());
        let err = lazy.check_connection().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        // Construction itself succeeded and stays cached.
        assert!(lazy.is_initialized());
    }

    #[tokio::test]
    async fn check_connection_reports_construction_failure() {
        let lazy = LazyConnection::new(CountingConnector::new(Duration::ZERO).failing_first(5));
        let err = lazy.check_connection().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(!lazy.is_initialized());
    }
}
