//! Error types for prim.
//! A single `PrimError` covers element failures, cancellation and pool problems;
//! `MapError` pairs one with the results a map produced before it stopped.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Main error type for prim operations
#[derive(Debug, Clone, Error)]
pub enum PrimError {
    /// The context was cancelled explicitly
    #[error("context canceled")]
    Cancelled,
    /// The context deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// Work was submitted to a pool that has been closed
    #[error("pool {pool:?} is closed")]
    PoolClosed { pool: String },
    /// A non-blocking submission found the pool at capacity
    #[error("pool {pool:?} is full ({limit} jobs in flight)")]
    PoolFull { pool: String, limit: usize },
    /// A pool cannot be built with zero workers
    #[error("invalid pool size {0}: need at least one worker")]
    InvalidPoolSize(usize),
    /// The underlying thread pool could not be started
    #[error("failed to build worker pool: {0}")]
    PoolBuild(String),
    /// A transform panicked while processing one element
    #[error("transform panicked at position {index}: {message}")]
    Panicked { index: usize, message: String },
    /// A transform returned an error for one element
    #[error(transparent)]
    Transform(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl PrimError {
    /// Wrap any error returned by a transform.
    pub fn transform<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PrimError::Transform(Arc::new(err))
    }

    /// Transform failure carrying only a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        PrimError::Transform(Arc::new(Message(message.to_string())))
    }

    /// True for `Cancelled` and `DeadlineExceeded`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PrimError::Cancelled | PrimError::DeadlineExceeded)
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

/// Failure of a map operation. Keeps the result vector so callers still get
/// every position that was computed; failed or undispatched positions hold
/// `R::default()`.
pub struct MapError<R> {
    results: Vec<R>,
    error: PrimError,
}

impl<R> MapError<R> {
    pub(crate) fn new(results: Vec<R>, error: PrimError) -> Self {
        Self { results, error }
    }

    pub fn error(&self) -> &PrimError {
        &self.error
    }

    pub fn results(&self) -> &[R] {
        &self.results
    }

    pub fn into_results(self) -> Vec<R> {
        self.results
    }

    pub fn into_error(self) -> PrimError {
        self.error
    }

    pub fn into_parts(self) -> (Vec<R>, PrimError) {
        (self.results, self.error)
    }
}

impl<R> fmt::Debug for MapError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapError")
            .field("results", &self.results.len())
            .field("error", &self.error)
            .finish()
    }
}

impl<R> fmt::Display for MapError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map over {} element(s) failed: {}", self.results.len(), self.error)
    }
}

impl<R> std::error::Error for MapError<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
