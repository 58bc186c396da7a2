//! # procpool-core: Types and traits for procpool
//!
//! Platform-independent half of the process pool: the records that cross
//! the worker pipes, the pending-result handle, the task registry, the
//! `WorkerPool` trait and its failure policies, configuration and
//! logging. The fork/pipe implementation lives in `procpool-module`.
//!
//! ## Failure policies
//!
//! A worker is an OS process. The kernel can kill it at any time, most
//! often the OOM killer picking the largest process under memory
//! pressure. The pool only learns about it by noticing the worker's pipe
//! closed.
//!
//! | Policy     | In-flight result of the dead worker | Later submissions |
//! |------------|-------------------------------------|-------------------|
//! | `Hang`     | pending forever                     | still accepted    |
//! | `FailFast` | `PoolError::BrokenPool`             | `BrokenPool`      |

pub mod entry;
pub mod error;
pub mod task;
pub mod pending;
pub mod pool;
pub mod config;
pub mod env;
pub mod plog;

pub use config::PoolConfig;
pub use entry::{JobId, TaskId, WorkItem, MAX_ARGS};
pub use error::{PoolError, Result, Termination};
pub use pending::PendingResult;
pub use pool::{FailurePolicy, PoolState, WorkerPool};
pub use task::{TaskFn, TaskRegistry};
