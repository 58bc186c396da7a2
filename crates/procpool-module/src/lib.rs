//! # procpool-module: Default implementations
//!
//! | Trait        | Default Impl  | Notes                                 |
//! |--------------|---------------|---------------------------------------|
//! | WorkerPool   | ProcessPool   | fork + pipes, hang or fail-fast       |
//!
//! Plus the pieces it is built from: worker spawning, the worker's
//! main loop, exit-status reaping, and the built-in task set
//! (including the `runaway` allocator).

pub mod spawn;
pub mod worker;
pub mod reap;
pub mod process_pool;
pub mod tasks;

pub use process_pool::ProcessPool;
