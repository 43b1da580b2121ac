//! Invocation context: cancellation, deadline and the terminal-error observer.
//!
//! A `Context` is a cheap handle (one `Arc`). Children see their ancestors'
//! cancellation and deadlines; cancelling a child leaves the parent alone.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::PrimError;
use crate::observe::{ErrorObserver, TracingObserver};

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Context>,
    observer: Arc<dyn ErrorObserver>,
}

impl Context {
    /// Root context: never cancelled unless `cancel` is called, no deadline,
    /// tracing observer.
    pub fn background() -> Self {
        Self::from_parts(None, None, Arc::new(TracingObserver))
    }

    fn from_parts(
        parent: Option<Context>,
        deadline: Option<Instant>,
        observer: Arc<dyn ErrorObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent,
                observer,
            }),
        }
    }

    /// New context that can be cancelled on its own.
    pub fn child(&self) -> Self {
        Self::from_parts(
            Some(self.clone()),
            self.inner.deadline,
            Arc::clone(&self.inner.observer),
        )
    }

    /// Child whose deadline is the earlier of `deadline` and the inherited one.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline() {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self::from_parts(
            Some(self.clone()),
            Some(deadline),
            Arc::clone(&self.inner.observer),
        )
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child reporting terminal errors to `observer`.
    pub fn with_observer(&self, observer: Arc<dyn ErrorObserver>) -> Self {
        Self::from_parts(Some(self.clone()), self.inner.deadline, observer)
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// `Some(Cancelled)` or `Some(DeadlineExceeded)` once this context is done.
    /// An explicit cancel anywhere up the chain wins over a passed deadline.
    pub fn err(&self) -> Option<PrimError> {
        let mut ctx = Some(self);
        while let Some(c) = ctx {
            if c.inner.cancelled.load(Ordering::Acquire) {
                return Some(PrimError::Cancelled);
            }
            ctx = c.inner.parent.as_ref();
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(PrimError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    pub fn observer(&self) -> &dyn ErrorObserver {
        self.inner.observer.as_ref()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("done", &self.is_done())
            .finish()
    }
}
