//! Worker pool abstraction.
//!
//! A `WorkerPool` runs work items on a fixed set of worker processes.
//! Workers have private memory, so the OS may kill any one of them
//! (OOM killer, rlimit abort, a stray `kill -9`) without the pool
//! being told. What happens next is the pool's [`FailurePolicy`].
//!
//! # Implementors
//!
//! - `ProcessPool` (default): forks N workers at creation time and
//!   talks to each over a pair of pipes.

use std::fmt;
use std::str::FromStr;

use nix::unistd::Pid;

use crate::entry::WorkItem;
use crate::error::Result;
use crate::pending::PendingResult;

/// Reaction to a worker that terminated outside the pool's control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Ignore it. The dead worker's in-flight result never resolves.
    Hang,
    /// Break the pool. Every outstanding and future result fails with
    /// `PoolError::BrokenPool`.
    #[default]
    FailFast,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hang => "hang",
            Self::FailFast => "fail-fast",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "hang" | "naive" => Ok(Self::Hang),
            "fail-fast" | "failfast" | "fail_fast" => Ok(Self::FailFast),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting submissions.
    Running,
    /// `close()` called; queued work still runs.
    Closed,
    /// `join()` returned; all workers reaped.
    Joined,
    /// A worker died unexpectedly (fail-fast only).
    Broken,
    /// `terminate()` called.
    Terminated,
}

impl PoolState {
    /// Submissions are accepted only while running.
    #[inline]
    pub fn accepts_work(self) -> bool {
        self == Self::Running
    }
}

/// Runs work items on worker processes.
///
/// **Contract:**
/// - `submit()` never blocks. It queues the item and returns a handle.
/// - Every result slot resolves exactly once, unless the policy is
///   `Hang` and the worker holding the item was killed.
/// - `close()` is idempotent; `join()` requires `close()` first.
pub trait WorkerPool {
    /// Queue a work item and return a handle to its result.
    fn submit(&self, item: WorkItem) -> Result<PendingResult>;

    /// Submit a batch; handles come back in submission order.
    fn map(&self, items: &[WorkItem]) -> Result<Vec<PendingResult>> {
        items.iter().map(|item| self.submit(*item)).collect()
    }

    /// Stop accepting new submissions.
    fn close(&self);

    /// Block until queued work drains and every worker has exited
    /// or is confirmed dead.
    fn join(&mut self) -> Result<()>;

    /// Kill all workers now. Outstanding results fail with `Terminated`.
    fn terminate(&mut self);

    fn state(&self) -> PoolState;

    fn policy(&self) -> FailurePolicy;

    /// Number of workers the pool was created with.
    fn worker_count(&self) -> usize;

    /// Workers not yet known to be dead.
    fn live_workers(&self) -> usize;

    /// Workers currently holding a work item.
    fn active_workers(&self) -> usize;

    /// Items submitted but not yet handed to a worker.
    fn queued(&self) -> usize;

    /// Process ids of the workers, dead ones included.
    fn worker_pids(&self) -> Vec<Pid>;
}
