//! Worker process creation.
//!
//! Each worker gets two pipes: a task pipe (parent writes, worker reads)
//! and a result pipe (worker writes, parent reads). Closing the task pipe
//! is how the parent asks a worker to exit; the result pipe reaching EOF
//! is how the parent learns a worker is gone, for whatever reason.
//!
//! The child only inherits the forking thread. Any lock another thread
//! of the host process held at fork time stays locked in the child
//! forever, so between `fork` and `_exit` the child takes no std lock:
//! logging goes straight to fd 2 and the environment is never read.

use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};

use nix::errno::Errno;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{fork, pipe, ForkResult, Pid};

use procpool_core::config::PoolConfig;
use procpool_core::error::{PoolError, Result, Termination};
use procpool_core::plog;
use procpool_core::task::TaskRegistry;
use procpool_core::{pdebug, pwarn};

use crate::reap::reap;
use crate::worker;

/// Parent-side ends of a freshly forked worker.
pub struct Spawned {
    pub pid: Pid,
    /// Write end of the task pipe.
    pub task_tx: File,
    /// Read end of the result pipe.
    pub result_rx: File,
}

/// Fork one worker. In the child this never returns.
pub fn spawn_worker(index: usize, config: &PoolConfig, registry: &TaskRegistry) -> Result<Spawned> {
    let (task_rx, task_tx) = pipe().map_err(PoolError::Spawn)?;
    let (result_rx, result_tx) = pipe().map_err(PoolError::Spawn)?;

    // Log settings come from the environment; read them here, not in the child.
    plog::init();

    // Safety: other threads of this process may hold locks at fork time.
    // The child switches logging to raw fd writes before anything else,
    // never touches the environment, and ends in `_exit` without running
    // destructors or atexit handlers.
    match unsafe { fork() }.map_err(PoolError::Spawn)? {
        ForkResult::Parent { child } => {
            drop(task_rx);
            drop(result_tx);
            pdebug!("{}: spawned worker {} as pid {}", config.name, index, child);
            Ok(Spawned {
                pid: child,
                task_tx: File::from(task_tx),
                result_rx: File::from(result_rx),
            })
        }
        ForkResult::Child => {
            plog::enter_forked_child();
            drop(task_tx);
            drop(result_rx);
            close_inherited_fds(&[task_rx.as_raw_fd(), result_tx.as_raw_fd()]);
            apply_limits(config);
            let code = worker::run(index, File::from(task_rx), File::from(result_tx), registry);
            // Skip atexit handlers and stdio flushing inherited from the parent.
            unsafe { libc::_exit(code) }
        }
    }
}

/// Fork `config.num_workers` workers. On failure the ones already
/// started are killed and reaped.
pub fn spawn_all(config: &PoolConfig, registry: &TaskRegistry) -> Result<Vec<Spawned>> {
    let mut spawned = Vec::with_capacity(config.num_workers);
    for index in 0..config.num_workers {
        match spawn_worker(index, config, registry) {
            Ok(w) => spawned.push(w),
            Err(e) => {
                for w in spawned {
                    drop(w.task_tx);
                    kill_and_reap(w.pid);
                }
                return Err(e);
            }
        }
    }
    Ok(spawned)
}

/// SIGKILL a worker and wait for it, for workers nothing else will reap.
pub fn kill_and_reap(pid: Pid) -> Termination {
    if let Err(e) = kill(pid, Signal::SIGKILL) {
        if e != Errno::ESRCH {
            pwarn!("kill({}) failed: {}", pid, e);
        }
    }
    reap(pid)
}

/// Close every descriptor above stderr except `keep`.
///
/// Other pools in this process may be creating pipes concurrently. A
/// worker holding a copy of someone else's pipe end would keep that
/// pipe from ever reaching EOF.
fn close_inherited_fds(keep: &[RawFd]) {
    for fd in open_fds() {
        if fd > 2 && !keep.contains(&fd) {
            unsafe {
                libc::close(fd);
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn open_fds() -> Vec<RawFd> {
            match std::fs::read_dir("/proc/self/fd") {
                Ok(dir) => dir
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().to_str().and_then(|s| s.parse().ok()))
                    .collect(),
                Err(_) => fallback_fds(),
            }
        }
    } else {
        fn open_fds() -> Vec<RawFd> {
            fallback_fds()
        }
    }
}

fn fallback_fds() -> Vec<RawFd> {
    let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let max = if max <= 0 { 1024 } else { max.min(65536) as RawFd };
    (3..max).collect()
}

/// Per-worker resource setup. Failures are logged, not fatal.
fn apply_limits(config: &PoolConfig) {
    if let Some(bytes) = config.memory_limit {
        if let Err(e) = setrlimit(Resource::RLIMIT_AS, bytes, bytes) {
            pwarn!("{}: RLIMIT_AS={} rejected: {}", config.name, bytes, e);
        }
    }
    if let Some(adj) = config.oom_score_adj {
        if let Err(e) = set_oom_score_adj(adj) {
            pwarn!("{}: oom_score_adj={} rejected: {}", config.name, adj, e);
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        /// Raise (or, with CAP_SYS_RESOURCE, lower) this process's
        /// standing with the OOM killer.
        pub fn set_oom_score_adj(adj: i32) -> std::result::Result<(), Errno> {
            std::fs::write("/proc/self/oom_score_adj", adj.to_string()).map_err(|e| {
                e.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO)
            })
        }
    } else {
        pub fn set_oom_score_adj(_adj: i32) -> std::result::Result<(), Errno> {
            Err(Errno::ENOSYS)
        }
    }
}
