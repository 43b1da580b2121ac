//! Elementwise apply (in place) and map (allocating) over a bounded pool.
//!
//! Both walk positions in order, stop dispatching as soon as the context is
//! done, and funnel per-element failures into one `ErrorSlot`. A failure never
//! stops sibling elements.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::aggregate::ErrorSlot;
use crate::context::Context;
use crate::error::{MapError, PrimError};
use crate::pool::{dispatch, LimitedPool, Pool, SubmitOptions};

const DEFAULT_POOL_NAME: &str = "prim-default";

/// Either the caller's pool or one built for this call. An owned pool closes
/// and shuts its threads down when the guard drops, on every exit path.
enum PoolGuard<'p> {
    Borrowed(&'p dyn Pool),
    Owned(LimitedPool),
}

impl<'p> PoolGuard<'p> {
    fn acquire(ctx: &Context, pool: Option<&'p dyn Pool>) -> Result<Self, PrimError> {
        match pool {
            Some(pool) => Ok(PoolGuard::Borrowed(pool)),
            // A done context gets no pool.
            None => match ctx
                .err()
                .map_or_else(|| LimitedPool::with_default_size(DEFAULT_POOL_NAME), Err)
            {
                Ok(pool) => Ok(PoolGuard::Owned(pool)),
                Err(err) => {
                    ctx.observer().record_error(&err);
                    Err(err)
                }
            },
        }
    }

    fn pool(&self) -> &dyn Pool {
        match self {
            PoolGuard::Borrowed(pool) => *pool,
            PoolGuard::Owned(pool) => pool,
        }
    }
}

/// Run the mutator, turning a panic into an element failure.
fn run_guarded<R>(index: usize, f: impl FnOnce() -> Result<R, PrimError>) -> Result<R, PrimError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(PrimError::Panicked {
            index,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Report the terminal error, if any, to the context's observer.
fn finish(ctx: &Context, result: Result<(), PrimError>) -> Result<(), PrimError> {
    if let Err(err) = &result {
        ctx.observer().record_error(err);
    }
    result
}

/// Apply `mutator` to every element of `items` in place.
///
/// Positions whose mutator fails keep their original value; every other
/// position holds the mutator's result. Returns the one error that survived
/// the precedence rules, if any. With `pool == None` a pool sized to the CPU
/// count is built for this call and torn down before returning.
///
/// If `ctx` is done before a position is submitted, dispatching stops and the
/// cancellation error is returned. Jobs already submitted still run to
/// completion before this returns.
pub fn apply_elementwise<T, F>(
    ctx: &Context,
    items: &mut [T],
    mutator: F,
    pool: Option<&dyn Pool>,
    opts: &SubmitOptions,
) -> Result<(), PrimError>
where
    T: Send,
    F: Fn(&Context, &T) -> Result<T, PrimError> + Sync,
{
    if items.is_empty() {
        return Ok(());
    }
    let guard = PoolGuard::acquire(ctx, pool)?;
    let pool = guard.pool();
    let len = items.len();
    tracing::debug!(len, pool = %pool.name(), "apply: dispatching");

    let errors = ErrorSlot::new();
    let dispatched = {
        let errors = &errors;
        let mutator = &mutator;
        pool.scope(dispatch(move |submitter| {
            for (index, item) in items.iter_mut().enumerate() {
                if let Some(err) = ctx.err() {
                    tracing::warn!(index, len, error = %err, "apply: stopped dispatching");
                    return Err(err);
                }
                tracing::trace!(index, "apply: submit");
                submitter.submit(
                    ctx,
                    Box::new(move |ctx: &Context| {
                        match run_guarded(index, || mutator(ctx, &*item)) {
                            Ok(value) => *item = value,
                            Err(err) => errors.record(err),
                        }
                    }),
                    opts,
                )?;
            }
            submitter.wait();
            Ok(())
        }))
    };
    if let Err(err) = dispatched {
        if !err.is_cancellation() {
            tracing::warn!(len, error = %err, "apply: submission rejected");
        }
        return finish(ctx, Err(err));
    }

    tracing::debug!(len, "apply: drained");
    finish(ctx, errors.drain().map_or(Ok(()), Err))
}

/// Map every element of `items` through `mutator` into a new vector.
///
/// `items` is never modified. Failed positions hold `R::default()`. When the
/// call fails, `MapError` carries the results computed so far together with
/// the error: on cancellation or a rejected submission that is a partially
/// filled vector, otherwise the full vector with defaults at failed positions.
pub fn map_elementwise<T, R, F>(
    ctx: &Context,
    items: &[T],
    mutator: F,
    pool: Option<&dyn Pool>,
    opts: &SubmitOptions,
) -> Result<Vec<R>, MapError<R>>
where
    T: Sync,
    R: Default + Send,
    F: Fn(&Context, &T) -> Result<R, PrimError> + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let len = items.len();
    let mut results: Vec<R> = std::iter::repeat_with(R::default).take(len).collect();

    let guard = match PoolGuard::acquire(ctx, pool) {
        Ok(guard) => guard,
        Err(err) => return Err(MapError::new(results, err)),
    };
    let pool = guard.pool();
    tracing::debug!(len, pool = %pool.name(), "map: dispatching");

    let errors = ErrorSlot::new();
    let dispatched = {
        let errors = &errors;
        let mutator = &mutator;
        let slots = results.as_mut_slice();
        pool.scope(dispatch(move |submitter| {
            for (index, (item, slot)) in items.iter().zip(slots.iter_mut()).enumerate() {
                if let Some(err) = ctx.err() {
                    tracing::warn!(index, len, error = %err, "map: stopped dispatching");
                    return Err(err);
                }
                tracing::trace!(index, "map: submit");
                submitter.submit(
                    ctx,
                    Box::new(move |ctx: &Context| {
                        match run_guarded(index, || mutator(ctx, item)) {
                            Ok(value) => *slot = value,
                            Err(err) => errors.record(err),
                        }
                    }),
                    opts,
                )?;
            }
            submitter.wait();
            Ok(())
        }))
    };

    let outcome = match dispatched {
        Err(err) => {
            if !err.is_cancellation() {
                tracing::warn!(len, error = %err, "map: submission rejected");
            }
            Err(err)
        }
        Ok(()) => {
            tracing::debug!(len, "map: drained");
            errors.drain().map_or(Ok(()), Err)
        }
    };
    match finish(ctx, outcome) {
        Ok(()) => Ok(results),
        Err(err) => Err(MapError::new(results, err)),
    }
}

/// `map_elementwise` for an input that may be absent. `None` maps to
/// `Ok(None)`; a present input, empty or not, maps to `Some` results.
pub fn map_optional<T, R, F>(
    ctx: &Context,
    items: Option<&[T]>,
    mutator: F,
    pool: Option<&dyn Pool>,
    opts: &SubmitOptions,
) -> Result<Option<Vec<R>>, MapError<R>>
where
    T: Sync,
    R: Default + Send,
    F: Fn(&Context, &T) -> Result<R, PrimError> + Sync,
{
    match items {
        None => Ok(None),
        Some(items) => map_elementwise(ctx, items, mutator, pool, opts).map(Some),
    }
}
