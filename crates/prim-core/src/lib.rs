//! Core library for prim: apply a transform to every element of a slice on a
//! bounded worker pool, keeping at most one error and never letting one
//! element's failure stop the others.
//! Used by the `prim` CLI; can be embedded in any batch pipeline.

pub mod aggregate;
pub mod config;
pub mod context;
pub mod error;
pub mod observe;
pub mod pool;
pub mod slice;

pub use aggregate::ErrorSlot;
pub use config::{load_config, PoolConfig};
pub use context::Context;
pub use error::{MapError, PrimError};
pub use observe::{CollectingObserver, ErrorObserver, TracingObserver};
pub use pool::{dispatch, Job, LimitedPool, Pool, PoolStats, SubmitOptions, Submitter};
pub use slice::{apply_elementwise, map_elementwise, map_optional};
