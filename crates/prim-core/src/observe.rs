//! Terminal-error observers.
//!
//! An observer hears about the one error an apply/map call ends with. It is
//! never consulted per element and never changes control flow.

use std::sync::Mutex;

use crate::error::PrimError;

/// Receives the terminal error of an elementwise operation.
pub trait ErrorObserver: Send + Sync {
    fn record_error(&self, err: &PrimError);
}

/// Default observer: one `error` event in whatever span is current.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ErrorObserver for TracingObserver {
    fn record_error(&self, err: &PrimError) {
        tracing::error!(
            error = %err,
            cancellation = err.is_cancellation(),
            "elementwise operation failed"
        );
    }
}

/// Keeps every reported error. Handy for tests and for callers that want to
/// inspect failures after the fact.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    errors: Mutex<Vec<PrimError>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors seen so far, oldest first.
    pub fn errors(&self) -> Vec<PrimError> {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorObserver for CollectingObserver {
    fn record_error(&self, err: &PrimError) {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(err.clone());
    }
}
