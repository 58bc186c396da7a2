//! procpool error types.

use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::entry::TaskId;

/// How a worker process ended, as reported by `waitpid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own with this status code.
    Exited(i32),
    /// Killed by a signal (SIGKILL from the OOM killer, SIGABRT on
    /// allocation failure under a memory cap, ...).
    Signaled(Signal),
    /// `waitpid` could not report a status (already reaped elsewhere).
    Unknown,
}

impl Termination {
    /// The only termination a worker performs when asked to.
    #[inline]
    pub fn is_clean(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with status {}", code),
            Self::Signaled(Signal::SIGKILL) => {
                write!(f, "killed by SIGKILL (possibly the OOM killer)")
            }
            Self::Signaled(sig) => write!(f, "killed by {}", sig.as_str()),
            Self::Unknown => write!(f, "exit status unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A worker died outside the pool's control (fail-fast policy).
    BrokenPool { pid: Pid, cause: Termination },
    /// `submit()` after `close()`.
    Closed,
    /// `join()` while the pool still accepts submissions.
    NotClosed,
    /// The pool was terminated before the result arrived.
    Terminated,
    /// `get_timeout()` deadline passed while the result was pending.
    Timeout,
    /// The task panicked inside the worker.
    TaskPanicked,
    /// Task id not present in the worker's registry.
    UnknownTask(TaskId),
    /// Task name not present in the registry.
    UnknownTaskName(String),
    /// More arguments than a work item can carry.
    InvalidArgs(usize),
    /// A task with this name is already registered.
    DuplicateTask(String),
    /// Configuration rejected by `PoolConfig::validate()`.
    InvalidConfig(&'static str),
    /// fork() or pipe() failed while creating a worker.
    Spawn(Errno),
    /// I/O on a worker pipe failed.
    Io(Errno),
}

impl PoolError {
    /// True for the distinguishable error raised after a worker death.
    #[inline]
    pub fn is_broken_pool(&self) -> bool {
        matches!(self, Self::BrokenPool { .. })
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BrokenPool { pid, cause } => write!(
                f,
                "process pool is broken: worker {} terminated abruptly ({})",
                pid, cause
            ),
            Self::Closed => write!(f, "pool is closed to new submissions"),
            Self::NotClosed => write!(f, "pool must be closed before join"),
            Self::Terminated => write!(f, "pool was terminated"),
            Self::Timeout => write!(f, "timed out waiting for result"),
            Self::TaskPanicked => write!(f, "task panicked in worker"),
            Self::UnknownTask(id) => write!(f, "unknown task id {}", id.0),
            Self::UnknownTaskName(name) => write!(f, "unknown task '{}'", name),
            Self::InvalidArgs(n) => write!(f, "invalid argument count {}", n),
            Self::DuplicateTask(name) => write!(f, "task '{}' already registered", name),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            Self::Spawn(e) => write!(f, "failed to spawn worker: {}", e),
            Self::Io(e) => write!(f, "worker pipe I/O: {}", e),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<std::io::Error> for PoolError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO))
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_pool_is_distinguishable() {
        let err = PoolError::BrokenPool {
            pid: Pid::from_raw(1234),
            cause: Termination::Signaled(Signal::SIGKILL),
        };
        assert!(err.is_broken_pool());
        assert!(!PoolError::Timeout.is_broken_pool());
        assert!(!PoolError::Terminated.is_broken_pool());

        let msg = err.to_string();
        assert!(msg.contains("1234"));
        assert!(msg.contains("SIGKILL"));
    }

    #[test]
    fn test_termination_clean() {
        assert!(Termination::Exited(0).is_clean());
        assert!(!Termination::Exited(3).is_clean());
        assert!(!Termination::Signaled(Signal::SIGTERM).is_clean());
    }

    #[test]
    fn test_io_error_keeps_errno() {
        let io = std::io::Error::from_raw_os_error(Errno::EPIPE as i32);
        assert_eq!(PoolError::from(io), PoolError::Io(Errno::EPIPE));
    }
}
