//! Behavior of apply/map against pools other than `LimitedPool`: a
//! thread-per-job pool that can reject submissions or cancel the context
//! after a fixed number of them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

use prim_core::pool::Dispatch;
use prim_core::{
    apply_elementwise, map_elementwise, CollectingObserver, Context, Job, LimitedPool, Pool,
    PrimError, SubmitOptions, Submitter,
};

#[derive(Default)]
struct ThreadPerJob {
    reject_after: Option<usize>,
    cancel_after: Option<(usize, Context)>,
    submitted: AtomicUsize,
}

impl ThreadPerJob {
    fn rejecting_after(n: usize) -> Self {
        Self {
            reject_after: Some(n),
            ..Default::default()
        }
    }

    fn cancelling_after(n: usize, ctx: &Context) -> Self {
        Self {
            cancel_after: Some((n, ctx.clone())),
            ..Default::default()
        }
    }
}

impl Pool for ThreadPerJob {
    fn name(&self) -> &str {
        "thread-per-job"
    }

    fn scope<'env>(&self, dispatch: Dispatch<'env>) -> Result<(), PrimError> {
        std::thread::scope(|scope| {
            let spawner = Spawner {
                pool: self,
                scope,
                handles: Mutex::new(Vec::new()),
            };
            dispatch(&spawner)
        })
    }

    fn close(&self) {}
}

struct Spawner<'p, 'scope, 'env: 'scope> {
    pool: &'p ThreadPerJob,
    scope: &'scope Scope<'scope, 'env>,
    handles: Mutex<Vec<ScopedJoinHandle<'scope, ()>>>,
}

impl<'env> Submitter<'env> for Spawner<'_, '_, 'env> {
    fn submit(&self, ctx: &Context, job: Job<'env>, _opts: &SubmitOptions) -> Result<(), PrimError> {
        let n = self.pool.submitted.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.pool.reject_after {
            if n >= limit {
                return Err(PrimError::PoolFull {
                    pool: self.pool.name().to_string(),
                    limit,
                });
            }
        }
        let ctx = ctx.clone();
        let handle = self.scope.spawn(move || job(&ctx));
        self.handles.lock().unwrap().push(handle);
        if let Some((k, target)) = &self.pool.cancel_after {
            if n + 1 == *k {
                target.cancel();
            }
        }
        Ok(())
    }

    fn wait(&self) {
        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}

fn double_even(_: &Context, v: &i32) -> Result<i32, PrimError> {
    if v % 2 == 0 {
        Ok(v * 2)
    } else {
        Err(PrimError::msg(format!("odd value {}", v)))
    }
}

#[test]
fn test_apply_all_succeed_custom_pool() {
    let pool = ThreadPerJob::default();
    let mut items: Vec<i32> = (0..50).map(|i| i * 2).collect();
    apply_elementwise(
        &Context::background(),
        &mut items,
        double_even,
        Some(&pool),
        &SubmitOptions::default(),
    )
    .unwrap();
    assert_eq!(items, (0..50).map(|i| i * 4).collect::<Vec<_>>());
}

#[test]
fn test_apply_single_failure_is_returned() {
    let pool = LimitedPool::new("single", 3).unwrap();
    let mut items = vec![2, 4, 7, 8];
    let err = apply_elementwise(
        &Context::background(),
        &mut items,
        double_even,
        Some(&pool),
        &SubmitOptions::default(),
    )
    .unwrap_err();
    assert_eq!(items, vec![4, 8, 7, 16]);
    assert_eq!(err.to_string(), "odd value 7");
}

#[test]
fn test_apply_two_failures_returns_one_of_them() {
    let pool = LimitedPool::new("double", 4).unwrap();
    let mut items = vec![1, 2, 3, 4];
    let err = apply_elementwise(
        &Context::background(),
        &mut items,
        double_even,
        Some(&pool),
        &SubmitOptions::default(),
    )
    .unwrap_err();
    assert_eq!(items, vec![1, 4, 3, 8]);
    assert!(["odd value 1", "odd value 3"].contains(&err.to_string().as_str()));
}

#[test]
fn test_identity_leaves_collection_identical() {
    let original: Vec<String> = (0..100).map(|i| format!("row-{}", i)).collect();
    let mut items = original.clone();
    apply_elementwise(
        &Context::background(),
        &mut items,
        |_, s: &String| Ok(s.clone()),
        None,
        &SubmitOptions::default(),
    )
    .unwrap();
    assert_eq!(items, original);
}

#[test]
fn test_already_cancelled_never_calls_transform() {
    let ctx = Context::background().child();
    ctx.cancel();
    let calls = AtomicUsize::new(0);
    let count = |_: &Context, v: &i32| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<i32, PrimError>(*v)
    };

    let mut items = vec![1, 2, 3];
    let err = apply_elementwise(&ctx, &mut items, count, None, &SubmitOptions::default())
        .unwrap_err();
    assert!(matches!(err, PrimError::Cancelled));

    let err = map_elementwise(&ctx, &items, count, None, &SubmitOptions::default()).unwrap_err();
    assert!(matches!(err.error(), PrimError::Cancelled));
    assert_eq!(err.results(), &[0, 0, 0]);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_expired_deadline_is_deadline_exceeded() {
    let ctx = Context::background().with_deadline(Instant::now() - Duration::from_millis(1));
    let mut items = vec![2, 4];
    let err = apply_elementwise(&ctx, &mut items, double_even, None, &SubmitOptions::default())
        .unwrap_err();
    assert!(matches!(err, PrimError::DeadlineExceeded));
    assert_eq!(items, vec![2, 4]);
}

#[test]
fn test_apply_cancel_after_k_dispatches() {
    let ctx = Context::background().child();
    let pool = ThreadPerJob::cancelling_after(4, &ctx);
    let calls = AtomicUsize::new(0);
    let mut items: Vec<i32> = (0..10).map(|i| i * 2).collect();

    let err = apply_elementwise(
        &ctx,
        &mut items,
        |ctx, v: &i32| {
            calls.fetch_add(1, Ordering::SeqCst);
            double_even(ctx, v)
        },
        Some(&pool),
        &SubmitOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, PrimError::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(pool.submitted.load(Ordering::SeqCst), 4);
    // Dispatched positions ran to completion; the rest were never touched.
    assert_eq!(&items[..4], &[0, 4, 8, 12]);
    assert_eq!(&items[4..], &[8, 10, 12, 14, 16, 18]);
}

#[test]
fn test_map_cancel_returns_partial_results() {
    let ctx = Context::background().child();
    let pool = ThreadPerJob::cancelling_after(3, &ctx);
    let items: Vec<i32> = vec![2, 4, 6, 8, 10];

    let err = map_elementwise(
        &ctx,
        &items,
        |_, v: &i32| Ok(i64::from(*v) + 1),
        Some(&pool),
        &SubmitOptions::default(),
    )
    .unwrap_err();

    assert!(err.error().is_cancellation());
    assert_eq!(err.into_results(), vec![3, 5, 7, 0, 0]);
}

#[test]
fn test_apply_submission_failure_returned() {
    let pool = ThreadPerJob::rejecting_after(3);
    let mut items = vec![2, 4, 6, 8, 10];
    let err = apply_elementwise(
        &Context::background(),
        &mut items,
        double_even,
        Some(&pool),
        &SubmitOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PrimError::PoolFull { limit: 3, .. }));
    assert_eq!(items, vec![4, 8, 12, 8, 10]);
}

#[test]
fn test_map_submission_failure_returned() {
    let pool = ThreadPerJob::rejecting_after(1);
    let items = vec!["a", "b"];
    let err = map_elementwise(
        &Context::background(),
        &items,
        |_, s: &&str| Ok(s.to_uppercase()),
        Some(&pool),
        &SubmitOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err.error(), PrimError::PoolFull { .. }));
    assert_eq!(err.results(), &["A".to_string(), String::new()]);
}

#[test]
fn test_closed_caller_pool_is_a_submission_failure() {
    let pool = LimitedPool::new("closed", 2).unwrap();
    pool.close();
    let mut items = vec![2];
    let err = apply_elementwise(
        &Context::background(),
        &mut items,
        double_even,
        Some(&pool),
        &SubmitOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PrimError::PoolClosed { .. }));
    assert_eq!(items, vec![2]);
}

#[test]
fn test_caller_pool_stays_open_and_reusable() {
    let pool = LimitedPool::new("reuse", 2).unwrap();
    let ctx = Context::background();
    for _ in 0..3 {
        let mut items = vec![2, 4, 6];
        apply_elementwise(&ctx, &mut items, double_even, Some(&pool), &SubmitOptions::default())
            .unwrap();
        assert_eq!(items, vec![4, 8, 12]);
    }
    assert!(!pool.is_closed());
    assert_eq!(pool.stats().completed, 9);
}

#[test]
fn test_single_worker_pool_handles_many_elements() {
    let pool = LimitedPool::new("one", 1).unwrap();
    let items: Vec<u32> = (0..500).collect();
    let out = map_elementwise(
        &Context::background(),
        &items,
        |_, v: &u32| Ok(u64::from(*v) * 10),
        Some(&pool),
        &SubmitOptions::new().with_label("scale"),
    )
    .unwrap();
    assert_eq!(out, (0..500u64).map(|v| v * 10).collect::<Vec<_>>());
}

#[test]
fn test_observer_sees_one_terminal_error() {
    let obs = Arc::new(CollectingObserver::new());
    let ctx = Context::background().with_observer(obs.clone());
    let items: Vec<i32> = (1..=20).collect();

    let err = map_elementwise(&ctx, &items, double_even, None, &SubmitOptions::default())
        .unwrap_err();
    let seen = obs.errors();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].to_string(), err.error().to_string());

    let cancelled = ctx.child();
    cancelled.cancel();
    let mut again = vec![2];
    let _ = apply_elementwise(&cancelled, &mut again, double_even, None, &SubmitOptions::default());
    assert_eq!(obs.len(), 2);
    assert!(obs.errors()[1].is_cancellation());
}

#[test]
fn test_cancellation_from_transform_does_not_mask_failure() {
    let pool = LimitedPool::new("mask", 1).unwrap();
    let mut items = vec![1, 2, 3];
    let err = apply_elementwise(
        &Context::background(),
        &mut items,
        |_, v: &i32| match v {
            1 => Err(PrimError::msg("bad first")),
            _ => Err(PrimError::Cancelled),
        },
        Some(&pool),
        &SubmitOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "bad first");
    assert_eq!(items, vec![1, 2, 3]);
}
