//! Worker pool contract.
//!
//! The elementwise operations only ever talk to a pool through `Pool` and
//! `Submitter`, so any implementation with the same guarantees can stand in
//! for `LimitedPool`.

mod limited;

pub use limited::{LimitedPool, PoolStats, BACKPRESSURE_POLL};

use crate::context::Context;
use crate::error::PrimError;

/// One unit of work. Receives the context it was submitted with.
pub type Job<'env> = Box<dyn FnOnce(&Context) + Send + 'env>;

/// Submission loop run inside `Pool::scope`.
pub type Dispatch<'env> = Box<dyn FnOnce(&dyn Submitter<'env>) -> Result<(), PrimError> + 'env>;

/// Box a submission loop. Gives the closure its signature so `'env` is inferred
/// from what the jobs borrow.
pub fn dispatch<'env, F>(f: F) -> Dispatch<'env>
where
    F: FnOnce(&dyn Submitter<'env>) -> Result<(), PrimError> + 'env,
{
    Box::new(f)
}

pub trait Pool: Send + Sync {
    fn name(&self) -> &str;

    /// Run `dispatch` with a submitter for this pool. Must not return before
    /// every job submitted through that submitter has finished, whatever
    /// `dispatch` returns.
    fn scope<'env>(&self, dispatch: Dispatch<'env>) -> Result<(), PrimError>;

    /// Reject all later submissions with `PrimError::PoolClosed`.
    fn close(&self);
}

pub trait Submitter<'env> {
    /// Hand `job` to the pool. May block while the pool is at capacity.
    fn submit(&self, ctx: &Context, job: Job<'env>, opts: &SubmitOptions) -> Result<(), PrimError>;

    /// Block until every job submitted so far has finished.
    fn wait(&self);
}

/// Per-submission options
#[derive(Clone, Debug, Default)]
pub struct SubmitOptions {
    /// Fail with `PrimError::PoolFull` instead of waiting for capacity
    pub non_blocking: bool,
    /// Attached to the job's tracing span
    pub label: Option<String>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn non_blocking(mut self) -> Self {
        self.non_blocking = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
