//! Bounded pool of document-conversion engine sessions.
//!
//! An office engine is expensive to start and not safe to share between
//! concurrent conversions, so each job leases at most one session, lazily,
//! and returns it when the job ends. The lease closes its session on every
//! path out of the job, including cancellation.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Configuration for the engine pool.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path or name of the office converter executable.
    pub soffice_path: String,
    /// Maximum number of engine sessions alive at once.
    pub max_sessions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            soffice_path: "soffice".to_string(),
            max_sessions: 2,
        }
    }
}

/// Something that can start conversion sessions.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a new, isolated session.
    async fn open_session(&self) -> Result<Box<dyn EngineSession>>;
}

/// One live engine session.
#[async_trait]
pub trait EngineSession: Send {
    /// Convert `input` to a PDF written at `output`.
    async fn convert(&mut self, input: &Path, output: &Path) -> Result<()>;

    /// Shut the session down and release its resources.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Bounded pool handing out [`EngineLease`]s.
pub struct EnginePool {
    engine: Arc<dyn ConversionEngine>,
    permits: Arc<Semaphore>,
    max_sessions: usize,
    sessions_opened: AtomicU64,
}

impl EnginePool {
    pub fn new(engine: Arc<dyn ConversionEngine>, max_sessions: usize) -> Self {
        let max_sessions = max_sessions.max(1);
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
            sessions_opened: AtomicU64::new(0),
        }
    }

    /// Wait for a free slot and open a session in it.
    pub async fn lease(&self) -> Result<EngineLease> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::conversion("engine pool is closed"))?;

        let session = self.engine.open_session().await.map_err(|e| {
            Error::conversion(format!("could not start {}: {}", self.engine.name(), e))
        })?;
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        debug!(engine = self.engine.name(), "Engine session leased");

        Ok(EngineLease {
            session: Some(session),
            _permit: permit,
        })
    }

    /// Sessions not currently leased.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Total sessions opened since the pool was created.
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::Relaxed)
    }
}

/// A leased engine session. The pool slot is freed when the lease is dropped.
pub struct EngineLease {
    session: Option<Box<dyn EngineSession>>,
    _permit: OwnedSemaphorePermit,
}

impl EngineLease {
    pub async fn convert(&mut self, input: &Path, output: &Path) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => session.convert(input, output).await,
            None => Err(Error::conversion("engine session already closed")),
        }
    }

    /// Close the session gracefully and free the pool slot.
    pub async fn release(mut self) {
        if let Some(session) = self.session.take()
            && let Err(e) = session.close().await
        {
            warn!(error = %e, "Engine session did not close cleanly");
        }
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        if self.session.take().is_some() {
            // Sessions own their resources through drop guards; dropping the
            // box tears them down without the graceful close.
            debug!("Engine lease dropped without release");
        }
    }
}

/// A job's lazily acquired engine lease.
///
/// Jobs that never need the engine (PDF and image inputs) never touch the
/// pool. The first conversion acquires a lease that is then reused for the
/// rest of the job.
pub struct SessionScope {
    pool: Arc<EnginePool>,
    lease: Option<EngineLease>,
}

impl SessionScope {
    pub fn new(pool: Arc<EnginePool>) -> Self {
        Self { pool, lease: None }
    }

    pub async fn convert(&mut self, input: &Path, output: &Path) -> Result<()> {
        if self.lease.is_none() {
            self.lease = Some(self.pool.lease().await?);
        }
        match self.lease.as_mut() {
            Some(lease) => lease.convert(input, output).await,
            None => Err(Error::conversion("engine session unavailable")),
        }
    }

    pub fn is_leased(&self) -> bool {
        self.lease.is_some()
    }

    /// Return the lease, if one was taken, to the pool.
    pub async fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release().await;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Engine that "converts" by copying the input and counts open sessions.
    #[derive(Default)]
    pub struct CopyEngine {
        pub open: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
        /// Refuse to start a session.
        pub fail_open: bool,
        /// Start sessions whose conversions all fail.
        pub fail_convert: bool,
    }

    struct CopySession {
        open: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
        fail_convert: bool,
    }

    #[async_trait]
    impl ConversionEngine for CopyEngine {
        fn name(&self) -> &'static str {
            "copy"
        }

        async fn open_session(&self) -> Result<Box<dyn EngineSession>> {
            if self.fail_open {
                return Err(Error::conversion("office suite is not installed"));
            }
            self.open.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CopySession {
                open: self.open.clone(),
                closed: self.closed.clone(),
                fail_convert: self.fail_convert,
            }))
        }
    }

    #[async_trait]
    impl EngineSession for CopySession {
        async fn convert(&mut self, input: &Path, output: &Path) -> Result<()> {
            if self.fail_convert {
                // Leave a partial file behind, as a crashing converter would.
                tokio::fs::write(output, b"%PDF-1.").await?;
                return Err(Error::conversion("source file is password protected"));
            }
            tokio::fs::copy(input, output).await?;
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Drop for CopySession {
        fn drop(&mut self) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CopyEngine;
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lease_bounds_sessions() {
        let engine = Arc::new(CopyEngine::default());
        let pool = Arc::new(EnginePool::new(engine.clone(), 1));

        let first = pool.lease().await.unwrap();
        assert_eq!(pool.available(), 0);

        let waiting = tokio::time::timeout(Duration::from_millis(50), pool.lease()).await;
        assert!(waiting.is_err(), "second lease must wait for the first");

        first.release().await;
        assert_eq!(pool.available(), 1);
        assert_eq!(engine.closed.load(Ordering::SeqCst), 1);
        assert_eq!(engine.open.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_lease_frees_slot() {
        let engine = Arc::new(CopyEngine::default());
        let pool = EnginePool::new(engine.clone(), 1);

        drop(pool.lease().await.unwrap());

        assert_eq!(pool.available(), 1);
        assert_eq!(engine.open.load(Ordering::SeqCst), 0);
        assert_eq!(engine.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_session_scope_is_lazy_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.txt");
        std::fs::write(&input, b"hello").unwrap();

        let engine = Arc::new(CopyEngine::default());
        let pool = Arc::new(EnginePool::new(engine.clone(), 2));

        let mut scope = SessionScope::new(pool.clone());
        assert!(!scope.is_leased());
        assert_eq!(pool.sessions_opened(), 0);

        scope.convert(&input, &dir.path().join("a.pdf")).await.unwrap();
        scope.convert(&input, &dir.path().join("b.pdf")).await.unwrap();
        assert_eq!(pool.sessions_opened(), 1);

        scope.release().await;
        assert_eq!(pool.available(), 2);
    }
}
