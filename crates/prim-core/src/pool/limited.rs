//! Bounded pool on top of a dedicated rayon thread pool.
//!
//! At most `size` jobs are in flight at once. `submit` blocks while the pool
//! is full (or fails fast with `SubmitOptions::non_blocking`).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use super::{Dispatch, Job, Pool, SubmitOptions, Submitter};
use crate::context::Context;
use crate::error::PrimError;

/// How often a submitter blocked on a full pool re-checks its context.
pub const BACKPRESSURE_POLL: Duration = Duration::from_millis(10);

const DEFAULT_THREAD_PREFIX: &str = "prim-worker";

/// Counts jobs in flight; optionally caps them.
struct InFlight {
    count: Mutex<usize>,
    changed: Condvar,
    limit: usize,
}

impl InFlight {
    fn new(limit: usize) -> Self {
        Self {
            count: Mutex::new(0),
            changed: Condvar::new(),
            limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take a slot, waiting for one if the limit is reached.
    fn acquire(&self, ctx: &Context, opts: &SubmitOptions, pool: &str) -> Result<(), PrimError> {
        let mut count = self.lock();
        while *count >= self.limit {
            if opts.non_blocking {
                return Err(PrimError::PoolFull {
                    pool: pool.to_string(),
                    limit: self.limit,
                });
            }
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            count = self
                .changed
                .wait_timeout(count, BACKPRESSURE_POLL)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
        *count += 1;
        Ok(())
    }

    fn enter(&self) {
        *self.lock() += 1;
    }

    fn release(&self) {
        let mut count = self.lock();
        *count = count.saturating_sub(1);
        self.changed.notify_all();
    }

    fn wait_idle(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self
                .changed
                .wait(count)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
}

/// Snapshot of a pool's lifetime counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
}

pub struct LimitedPool {
    name: String,
    size: usize,
    threads: rayon::ThreadPool,
    slots: Arc<InFlight>,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

impl LimitedPool {
    /// Pool running at most `size` jobs at once on `size` threads.
    pub fn new(name: impl Into<String>, size: usize) -> Result<Self, PrimError> {
        if size == 0 {
            return Err(PrimError::InvalidPoolSize(size));
        }
        let name = name.into();
        let prefix = if name.is_empty() {
            DEFAULT_THREAD_PREFIX.to_string()
        } else {
            name.clone()
        };
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()
            .map_err(|e| PrimError::PoolBuild(e.to_string()))?;

        tracing::debug!(pool = %name, size, "worker pool started");
        Ok(Self {
            name,
            size,
            threads,
            slots: Arc::new(InFlight::new(size)),
            counters: Arc::new(Counters::default()),
            closed: AtomicBool::new(false),
        })
    }

    /// Pool sized to the number of available CPUs.
    pub fn with_default_size(name: impl Into<String>) -> Result<Self, PrimError> {
        Self::new(name, num_cpus::get().max(1))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.size,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    fn reject(&self, err: PrimError) -> Result<(), PrimError> {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        Err(err)
    }
}

impl Pool for LimitedPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn scope<'env>(&self, dispatch: Dispatch<'env>) -> Result<(), PrimError> {
        let pending = Arc::new(InFlight::new(usize::MAX));
        // The rayon scope joins every spawned job before returning, so borrowed
        // elements never outlive this call even when dispatch stops early.
        self.threads.in_place_scope(|scope: &rayon::Scope<'env>| {
            let submitter = ScopedSubmitter {
                pool: self,
                scope,
                pending: &pending,
            };
            dispatch(&submitter)
        })
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(pool = %self.name, "worker pool closed");
        }
    }
}

impl Drop for LimitedPool {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for LimitedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitedPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct ScopedSubmitter<'a, 'env> {
    pool: &'a LimitedPool,
    scope: &'a rayon::Scope<'env>,
    pending: &'a Arc<InFlight>,
}

/// Frees the job's slot when the job ends, panicking or not.
struct Release {
    slots: Arc<InFlight>,
    pending: Arc<InFlight>,
    counters: Arc<Counters>,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        self.slots.release();
        self.pending.release();
    }
}

impl<'env> Submitter<'env> for ScopedSubmitter<'_, 'env> {
    fn submit(&self, ctx: &Context, job: Job<'env>, opts: &SubmitOptions) -> Result<(), PrimError> {
        let pool = self.pool;
        if pool.is_closed() {
            return pool.reject(PrimError::PoolClosed {
                pool: pool.name.clone(),
            });
        }
        if let Err(err) = pool.slots.acquire(ctx, opts, &pool.name) {
            return pool.reject(err);
        }
        self.pending.enter();
        pool.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let release = Release {
            slots: Arc::clone(&pool.slots),
            pending: Arc::clone(self.pending),
            counters: Arc::clone(&pool.counters),
        };
        let span = tracing::trace_span!(
            "prim_job",
            pool = %pool.name,
            label = opts.label.as_deref().unwrap_or("")
        );
        let ctx = ctx.clone();
        self.scope.spawn(move |_| {
            let _release = release;
            let _entered = span.enter();
            job(&ctx);
        });
        Ok(())
    }

    fn wait(&self) {
        self.pending.wait_idle();
    }
}
