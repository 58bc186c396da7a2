//! # procpool
//!
//! A bounded pool of worker *processes* and what happens to it when the
//! operating system kills one of them.
//!
//! Worker processes have private memory. Under memory pressure the
//! kernel's OOM killer picks a victim, usually the largest process, and
//! sends it SIGKILL. The pool is not consulted. A pool that only waits
//! for answers will wait forever for the victim's job; a pool that
//! watches its workers can fail every caller immediately instead.
//!
//! # Quick Start
//!
//! ```no_run
//! use procpool::{tasks, FailurePolicy, PoolConfig, ProcessPool, WorkerPool};
//!
//! let registry = tasks::builtin();
//! let config = PoolConfig::new().num_workers(2).policy(FailurePolicy::FailFast);
//! let mut pool = ProcessPool::new(config, &registry).unwrap();
//!
//! let a = pool.submit(registry.item("add", &[1, 2]).unwrap()).unwrap();
//! let b = pool.submit(registry.item("add", &[1, 3]).unwrap()).unwrap();
//! assert_eq!(a.get().unwrap() + b.get().unwrap(), 7);
//!
//! pool.close();
//! pool.join().unwrap();
//! ```
//!
//! # Custom tasks
//!
//! Tasks are plain `fn(&[i64]) -> i64` registered by name before the
//! pool is built. Workers are forked with a copy of the registry.
//!
//! ```no_run
//! use procpool::{PoolConfig, ProcessPool, TaskRegistry, WorkerPool};
//!
//! fn square(args: &[i64]) -> i64 {
//!     args[0] * args[0]
//! }
//!
//! let registry = TaskRegistry::new().with("square", square);
//! let mut pool = ProcessPool::new(PoolConfig::new().num_workers(4), &registry).unwrap();
//! let items: Vec<_> = (1..=8).map(|i| registry.item("square", &[i]).unwrap()).collect();
//! let total: i64 = pool.map(&items).unwrap().iter().map(|h| h.get().unwrap()).sum();
//! assert_eq!(total, 204);
//! pool.close();
//! pool.join().unwrap();
//! ```

pub use procpool_core::config::{PoolConfig, MAX_WORKERS};
pub use procpool_core::entry::{JobId, TaskId, WorkItem, MAX_ARGS};
pub use procpool_core::error::{PoolError, Result, Termination};
pub use procpool_core::pending::PendingResult;
pub use procpool_core::plog::{set_log_level, LogLevel};
pub use procpool_core::pool::{FailurePolicy, PoolState, WorkerPool};
pub use procpool_core::task::{TaskFn, TaskRegistry};
pub use procpool_core::{pdebug, perror, pinfo, ptrace, pwarn};

pub use procpool_module::process_pool::ProcessPool;
pub use procpool_module::tasks;

