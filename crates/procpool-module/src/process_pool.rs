//! `ProcessPool`: default `WorkerPool` implementation.
//!
//! Forks N worker processes at creation. Submissions go into a lock-free
//! MPMC queue; a dispatcher thread hands each item to an idle worker over
//! that worker's task pipe. One monitor thread per worker reads results
//! off the worker's result pipe and resolves the matching handle.
//!
//! A monitor that hits EOF knows its worker is gone. It reaps the child
//! and decides whether the exit was one the pool asked for. If not, the
//! pool's `FailurePolicy` applies:
//!
//! - `Hang`: the worker stops taking work; its in-flight job is lost
//!   and that handle never resolves.
//! - `FailFast`: the pool breaks. Outstanding and future results fail
//!   with `PoolError::BrokenPool`, surviving workers are killed.
//!
//! No dynamic scaling, no respawn, no retry.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use crossbeam_queue::{ArrayQueue, SegQueue};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use procpool_core::config::PoolConfig;
use procpool_core::entry::{JobId, ResultRecord, SubmitRecord, WorkItem};
use procpool_core::error::{PoolError, Result, Termination};
use procpool_core::pending::{PendingResult, ResultSlot};
use procpool_core::pool::{FailurePolicy, PoolState, WorkerPool};
use procpool_core::task::TaskRegistry;
use procpool_core::{pdebug, pinfo, ptrace, pwarn};

use crate::reap::reap;
use crate::spawn::{kill_and_reap, spawn_all, Spawned};

/// Dispatcher idle wait. Submissions and completions unpark it early.
const DISPATCH_PARK: Duration = Duration::from_millis(10);

/// A submission waiting for a worker.
struct Queued {
    job_id: JobId,
    item: WorkItem,
}

/// Parent-side view of one worker process.
struct WorkerSlot {
    index: usize,
    pid: Pid,
    /// Write end of the task pipe. `None` once closed for shutdown.
    task_tx: Mutex<Option<File>>,
    /// Job in flight, `JobId::NONE` when idle.
    current: AtomicU64,
    alive: AtomicBool,
}

impl WorkerSlot {
    fn new(index: usize, pid: Pid, task_tx: File) -> Self {
        Self {
            index,
            pid,
            task_tx: Mutex::new(Some(task_tx)),
            current: AtomicU64::new(JobId::NONE.0),
            alive: AtomicBool::new(true),
        }
    }

    fn current(&self) -> JobId {
        JobId(self.current.load(Ordering::Acquire))
    }

    fn is_busy(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.current().is_none()
    }

    fn close_task_pipe(&self) {
        lock(&self.task_tx).take();
    }
}

/// Everything guarded by the pool lock.
struct Books {
    state: PoolState,
    /// Set by `join()` right before it closes the task pipes.
    shutting_down: bool,
    /// Every job whose handle has not resolved yet.
    jobs: HashMap<JobId, Arc<ResultSlot>>,
    /// Jobs held by a worker that died under the hang policy.
    lost: HashSet<JobId>,
    /// The error every caller sees once broken.
    broken: Option<PoolError>,
}

/// Shared state between submitters, dispatcher and monitors.
struct PoolInner {
    name: String,
    policy: FailurePolicy,
    workers: Vec<WorkerSlot>,
    /// Work queue: submitters → dispatcher.
    queue: SegQueue<Queued>,
    /// Indices of workers waiting for a job.
    idle: ArrayQueue<usize>,
    books: Mutex<Books>,
    /// Signalled whenever jobs resolve, workers die or state changes.
    changed: Condvar,
    next_job: AtomicU64,
    stop_dispatch: AtomicBool,
    dispatcher: OnceLock<Thread>,
}

pub struct ProcessPool {
    inner: Arc<PoolInner>,
    dispatcher: Option<JoinHandle<()>>,
    monitors: Vec<JoinHandle<()>>,
}

impl ProcessPool {
    /// Fork `config.num_workers` workers running tasks from `registry`.
    ///
    /// The registry is copied into every worker by `fork`; tasks
    /// registered afterwards are unknown to this pool.
    pub fn new(config: PoolConfig, registry: &TaskRegistry) -> Result<Self> {
        config.validate()?;

        // All forks happen before any pool thread exists.
        let spawned = spawn_all(&config, registry)?;

        let n = spawned.len();
        let mut workers = Vec::with_capacity(n);
        let mut readers = Vec::with_capacity(n);
        for (index, Spawned { pid, task_tx, result_rx }) in spawned.into_iter().enumerate() {
            workers.push(WorkerSlot::new(index, pid, task_tx));
            readers.push(result_rx);
        }

        let idle = ArrayQueue::new(n);
        for index in 0..n {
            let _ = idle.push(index);
        }

        let inner = Arc::new(PoolInner {
            name: config.name.clone(),
            policy: config.policy,
            workers,
            queue: SegQueue::new(),
            idle,
            books: Mutex::new(Books {
                state: PoolState::Running,
                shutting_down: false,
                jobs: HashMap::new(),
                lost: HashSet::new(),
                broken: None,
            }),
            changed: Condvar::new(),
            next_job: AtomicU64::new(1),
            stop_dispatch: AtomicBool::new(false),
            dispatcher: OnceLock::new(),
        });

        let dispatcher = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name(format!("{}-dispatch", config.name))
                .spawn(move || dispatch_loop(inner))
                .map_err(PoolError::from)?
        };
        let _ = inner.dispatcher.set(dispatcher.thread().clone());

        let mut pool = ProcessPool {
            inner,
            dispatcher: Some(dispatcher),
            monitors: Vec::with_capacity(n),
        };

        for (index, result_rx) in readers.into_iter().enumerate() {
            let inner = Arc::clone(&pool.inner);
            let spawned = thread::Builder::new()
                .name(format!("{}-monitor-{}", config.name, index))
                .spawn(move || monitor_loop(inner, index, result_rx));
            match spawned {
                Ok(handle) => pool.monitors.push(handle),
                Err(e) => {
                    // Workers from `index` on have no monitor to reap them;
                    // Drop terminates the rest.
                    discard_unmonitored(&pool.inner.workers[index..]);
                    return Err(PoolError::from(e));
                }
            }
        }

        pinfo!(
            "{}: started {} workers, policy {}",
            config.name,
            n,
            config.policy
        );
        Ok(pool)
    }

    /// Pool with the default config overridden from `PROCPOOL_*` variables.
    pub fn from_env(registry: &TaskRegistry) -> Result<Self> {
        Self::new(PoolConfig::from_env(), registry)
    }

    /// The error reported to callers once the pool broke.
    pub fn broken_error(&self) -> Option<PoolError> {
        self.inner.books().broken.clone()
    }

    fn stop_dispatcher(&mut self) {
        self.inner.stop_dispatch.store(true, Ordering::SeqCst);
        self.inner.wake_dispatcher();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }

    /// Close every task pipe and wait for the monitors, which exit once
    /// their worker is gone and reaped.
    fn release_workers(&mut self) {
        for w in &self.inner.workers {
            w.close_task_pipe();
        }
        for handle in self.monitors.drain(..) {
            let _ = handle.join();
        }
    }
}

impl WorkerPool for ProcessPool {
    fn submit(&self, item: WorkItem) -> Result<PendingResult> {
        let inner = &self.inner;
        let handle = {
            let mut books = inner.books();
            match books.state {
                PoolState::Running => {}
                PoolState::Closed | PoolState::Joined => return Err(PoolError::Closed),
                PoolState::Terminated => return Err(PoolError::Terminated),
                PoolState::Broken => {
                    return Err(books.broken.clone().unwrap_or(PoolError::Terminated));
                }
            }
            let job_id = JobId(inner.next_job.fetch_add(1, Ordering::Relaxed));
            let (slot, handle) = ResultSlot::new(job_id);
            books.jobs.insert(job_id, slot);
            handle
        };

        inner.queue.push(Queued { job_id: handle.job_id(), item });
        inner.wake_dispatcher();
        ptrace!("{}: queued job {}", inner.name, handle.job_id().0);
        Ok(handle)
    }

    fn close(&self) {
        let mut books = self.inner.books();
        if books.state == PoolState::Running {
            books.state = PoolState::Closed;
            self.inner.changed.notify_all();
        }
    }

    fn join(&mut self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        {
            let mut books = inner.books();
            match books.state {
                PoolState::Running => return Err(PoolError::NotClosed),
                PoolState::Joined => return Ok(()),
                _ => {}
            }

            while books.state == PoolState::Closed && !inner.drained(&books) {
                books = inner
                    .changed
                    .wait(books)
                    .unwrap_or_else(|p| p.into_inner());
            }

            if books.state == PoolState::Closed {
                books.shutting_down = true;
            }
        }

        // Stop handing out work, then let workers see EOF and exit.
        self.stop_dispatcher();
        self.release_workers();

        let mut books = inner.books();
        if books.state == PoolState::Closed {
            books.state = PoolState::Joined;
        }
        pinfo!("{}: joined ({:?})", inner.name, books.state);
        Ok(())
    }

    fn terminate(&mut self) {
        let inner = Arc::clone(&self.inner);
        {
            let mut books = inner.books();
            match books.state {
                PoolState::Joined | PoolState::Terminated => return,
                PoolState::Broken => {}
                _ => books.state = PoolState::Terminated,
            }
            for (_, slot) in books.jobs.drain() {
                slot.fail(PoolError::Terminated);
            }
            books.lost.clear();
            inner.changed.notify_all();
        }
        while inner.queue.pop().is_some() {}

        self.stop_dispatcher();
        inner.kill_live_workers();
        self.release_workers();
        pdebug!("{}: terminated", inner.name);
    }

    fn state(&self) -> PoolState {
        self.inner.books().state
    }

    fn policy(&self) -> FailurePolicy {
        self.inner.policy
    }

    fn worker_count(&self) -> usize {
        self.inner.workers.len()
    }

    fn live_workers(&self) -> usize {
        self.inner.live_workers()
    }

    fn active_workers(&self) -> usize {
        self.inner.workers.iter().filter(|w| w.is_busy()).count()
    }

    fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    fn worker_pids(&self) -> Vec<Pid> {
        self.inner.workers.iter().map(|w| w.pid).collect()
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        if self.dispatcher.is_some() || !self.monitors.is_empty() {
            self.terminate();
        }
    }
}

impl PoolInner {
    fn books(&self) -> MutexGuard<'_, Books> {
        lock(&self.books)
    }

    fn wake_dispatcher(&self) {
        if let Some(t) = self.dispatcher.get() {
            t.unpark();
        }
    }

    fn live_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.alive.load(Ordering::Acquire))
            .count()
    }

    /// Nothing left that a live worker will ever finish.
    fn drained(&self, books: &Books) -> bool {
        self.live_workers() == 0 || books.jobs.keys().all(|id| books.lost.contains(id))
    }

    fn kill_live_workers(&self) {
        for w in &self.workers {
            if w.alive.load(Ordering::Acquire) {
                if let Err(e) = kill(w.pid, Signal::SIGKILL) {
                    if e != Errno::ESRCH {
                        pwarn!("{}: kill({}) failed: {}", self.name, w.pid, e);
                    }
                }
            }
        }
    }

    /// Resolve a job from a worker's answer.
    fn resolve(&self, job_id: JobId, outcome: Result<i64>) {
        let mut books = self.books();
        if let Some(slot) = books.jobs.remove(&job_id) {
            slot.resolve(outcome);
        }
        self.changed.notify_all();
    }

    /// A job handed to a worker that can no longer run it.
    fn mark_lost(&self, job_id: JobId) {
        if self.policy != FailurePolicy::Hang {
            // The dying worker's monitor breaks the pool.
            return;
        }
        let mut books = self.books();
        if books.jobs.contains_key(&job_id) {
            books.lost.insert(job_id);
            self.changed.notify_all();
        }
    }

    /// Called by a monitor once its worker is reaped.
    fn worker_exited(&self, index: usize, cause: Termination) {
        let w = &self.workers[index];
        let in_flight = w.current();
        let mut books = self.books();

        let expected = match books.state {
            PoolState::Terminated | PoolState::Broken => true,
            _ => books.shutting_down && cause.is_clean() && in_flight.is_none(),
        };
        if expected {
            pdebug!("{}: worker {} (pid {}) {}", self.name, index, w.pid, cause);
            self.changed.notify_all();
            return;
        }

        match self.policy {
            FailurePolicy::Hang => {
                // Nobody is told. The job stays pending.
                pdebug!(
                    "{}: worker {} (pid {}) {}; job {} abandoned",
                    self.name,
                    index,
                    w.pid,
                    cause,
                    in_flight.0
                );
                if !in_flight.is_none() && books.jobs.contains_key(&in_flight) {
                    books.lost.insert(in_flight);
                }
                self.changed.notify_all();
            }
            FailurePolicy::FailFast => {
                let err = PoolError::BrokenPool { pid: w.pid, cause };
                pwarn!("{}: {}", self.name, err);
                self.break_pool(&mut books, err);
            }
        }
    }

    fn break_pool(&self, books: &mut Books, err: PoolError) {
        books.state = PoolState::Broken;
        books.broken = Some(err.clone());
        let failed = books.jobs.len();
        for (_, slot) in books.jobs.drain() {
            slot.fail(err.clone());
        }
        books.lost.clear();
        while self.queue.pop().is_some() {}
        self.stop_dispatch.store(true, Ordering::SeqCst);
        self.wake_dispatcher();
        self.kill_live_workers();
        self.changed.notify_all();
        pdebug!("{}: failed {} outstanding jobs", self.name, failed);
    }
}

/// Dispatcher thread main loop.
fn dispatch_loop(inner: Arc<PoolInner>) {
    while !inner.stop_dispatch.load(Ordering::Acquire) {
        if inner.queue.is_empty() || inner.idle.is_empty() {
            thread::park_timeout(DISPATCH_PARK);
            continue;
        }
        let Some(index) = inner.idle.pop() else { continue };
        let w = &inner.workers[index];
        if !w.alive.load(Ordering::Acquire) {
            // Dead workers leave the rotation.
            continue;
        }
        let Some(job) = inner.queue.pop() else {
            let _ = inner.idle.push(index);
            continue;
        };

        // Publish before writing, so a monitor that sees the worker die
        // knows which job went with it.
        w.current.store(job.job_id.0, Ordering::Release);
        let record = SubmitRecord { job_id: job.job_id, item: job.item };
        let written = match lock(&w.task_tx).as_mut() {
            Some(tx) => tx.write_all(&record.encode()).map_err(PoolError::from),
            None => Err(PoolError::Closed),
        };
        match written {
            Ok(()) => ptrace!("{}: job {} -> worker {}", inner.name, job.job_id.0, index),
            Err(e) => {
                pdebug!(
                    "{}: job {} undeliverable to worker {}: {}",
                    inner.name,
                    job.job_id.0,
                    w.index,
                    e
                );
                inner.mark_lost(job.job_id);
            }
        }
    }
}

/// Monitor thread main loop: results until EOF, then reap.
fn monitor_loop(inner: Arc<PoolInner>, index: usize, mut result_rx: File) {
    let mut buf = [0u8; ResultRecord::SIZE];
    loop {
        match result_rx.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => {
                pwarn!("{}: worker {} result pipe: {}", inner.name, index, e);
                break;
            }
        }

        let w = &inner.workers[index];
        match ResultRecord::decode(&buf) {
            Some(record) => inner.resolve(record.job_id, record.into_outcome()),
            None => {
                pwarn!("{}: worker {} sent a malformed record", inner.name, index);
                inner.resolve(w.current(), Err(PoolError::Io(Errno::EPROTO)));
            }
        }
        w.current.store(JobId::NONE.0, Ordering::Release);
        let _ = inner.idle.push(index);
        inner.wake_dispatcher();
    }

    let w = &inner.workers[index];
    w.alive.store(false, Ordering::Release);
    let cause = reap(w.pid);
    inner.worker_exited(index, cause);
}

/// Kill and reap workers that never got a monitor thread.
fn discard_unmonitored(workers: &[WorkerSlot]) {
    for w in workers {
        w.close_task_pipe();
        let cause = kill_and_reap(w.pid);
        w.alive.store(false, Ordering::Release);
        pdebug!("worker {} (pid {}) discarded: {}", w.index, w.pid, cause);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks;
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use procpool_core::plog::{set_log_level, LogLevel};
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(10);

    fn pool(n: usize, policy: FailurePolicy) -> (ProcessPool, TaskRegistry) {
        let reg = tasks::builtin();
        let cfg = PoolConfig::new().num_workers(n).policy(policy).name("test");
        (ProcessPool::new(cfg, &reg).unwrap(), reg)
    }

    /// Wait until the worker has picked up a job.
    fn wait_busy(pool: &ProcessPool, busy: usize) {
        let start = Instant::now();
        while pool.active_workers() < busy {
            assert!(start.elapsed() < WAIT, "workers never became busy");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_pairwise_sums() {
        let (mut pool, reg) = pool(2, FailurePolicy::FailFast);
        let a = pool.submit(reg.item("add", &[1, 2]).unwrap()).unwrap();
        let b = pool.submit(reg.item("add", &[1, 3]).unwrap()).unwrap();

        let got: HashSet<i64> = [a, b]
            .iter()
            .map(|h| h.get_timeout(WAIT).unwrap())
            .collect();
        assert_eq!(got, HashSet::from([3, 4]));

        pool.close();
        pool.join().unwrap();
        assert_eq!(pool.state(), PoolState::Joined);
    }

    #[test]
    fn test_more_items_than_workers() {
        let (mut pool, reg) = pool(3, FailurePolicy::FailFast);
        let items: Vec<WorkItem> = (0..20).map(|i| reg.item("add", &[i, i]).unwrap()).collect();
        let handles = pool.map(&items).unwrap();
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(h.get_timeout(WAIT), Ok(2 * i as i64));
        }
        pool.close();
        pool.join().unwrap();
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_join_drains_queue() {
        let (mut pool, reg) = pool(2, FailurePolicy::FailFast);
        let handles: Vec<_> = (0..6)
            .map(|_| pool.submit(reg.item("sleep_ms", &[20]).unwrap()).unwrap())
            .collect();
        pool.close();
        pool.join().unwrap();
        assert!(handles.iter().all(|h| h.try_get() == Some(Ok(20))));
    }

    #[test]
    fn test_task_panic_fails_only_that_job() {
        let (mut pool, reg) = pool(1, FailurePolicy::FailFast);
        let bad = pool.submit(reg.item("panic", &[]).unwrap()).unwrap();
        let good = pool.submit(reg.item("add", &[2, 2]).unwrap()).unwrap();
        assert_eq!(bad.get_timeout(WAIT), Err(PoolError::TaskPanicked));
        assert_eq!(good.get_timeout(WAIT), Ok(4));
        assert_eq!(pool.state(), PoolState::Running);
        pool.close();
        pool.join().unwrap();
    }

    #[test]
    fn test_submit_after_close_rejected() {
        let (mut pool, reg) = pool(1, FailurePolicy::FailFast);
        pool.close();
        assert_eq!(
            pool.submit(reg.item("add", &[1]).unwrap()).unwrap_err(),
            PoolError::Closed
        );
        pool.join().unwrap();
    }

    #[test]
    fn test_join_requires_close() {
        let (mut pool, _reg) = pool(1, FailurePolicy::FailFast);
        assert_eq!(pool.join(), Err(PoolError::NotClosed));
        pool.close();
        assert!(pool.join().is_ok());
        assert!(pool.join().is_ok());
    }

    #[test]
    fn test_fail_fast_on_killed_worker() {
        let (mut pool, reg) = pool(2, FailurePolicy::FailFast);
        let victim = pool.submit(reg.item("sleep_ms", &[60_000]).unwrap()).unwrap();
        wait_busy(&pool, 1);

        let busy_pid = pool
            .inner
            .workers
            .iter()
            .find(|w| w.is_busy())
            .map(|w| w.pid)
            .unwrap();
        kill(busy_pid, Signal::SIGKILL).unwrap();

        let err = victim.get_timeout(WAIT).unwrap_err();
        assert!(err.is_broken_pool(), "{:?}", err);
        assert_eq!(
            err,
            PoolError::BrokenPool {
                pid: busy_pid,
                cause: Termination::Signaled(Signal::SIGKILL)
            }
        );

        let later = pool.submit(reg.item("add", &[1, 2]).unwrap()).unwrap_err();
        assert!(later.is_broken_pool());
        assert_eq!(pool.state(), PoolState::Broken);

        pool.close();
        pool.join().unwrap();
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_fail_fast_fails_queued_jobs() {
        let (mut pool, reg) = pool(1, FailurePolicy::FailFast);
        let first = pool.submit(reg.item("exit_with", &[3]).unwrap()).unwrap();
        let queued: Vec<_> = (0..4)
            .map(|_| pool.submit(reg.item("sleep_ms", &[10_000]).unwrap()).unwrap())
            .collect();

        let err = first.get_timeout(WAIT).unwrap_err();
        assert!(matches!(
            err,
            PoolError::BrokenPool { cause: Termination::Exited(3), .. }
        ));
        for h in &queued {
            assert!(h.get_timeout(WAIT).unwrap_err().is_broken_pool());
        }
        pool.terminate();
    }

    #[test]
    fn test_hang_policy_never_resolves() {
        let (mut pool, reg) = pool(2, FailurePolicy::Hang);
        let victim = pool.submit(reg.item("sleep_ms", &[60_000]).unwrap()).unwrap();
        wait_busy(&pool, 1);
        let busy_pid = pool.inner.workers.iter().find(|w| w.is_busy()).unwrap().pid;
        kill(busy_pid, Signal::SIGKILL).unwrap();

        assert_eq!(
            victim.get_timeout(Duration::from_millis(500)),
            Err(PoolError::Timeout)
        );
        assert!(!victim.is_ready());

        // The surviving worker keeps serving.
        let ok = pool.submit(reg.item("add", &[1, 3]).unwrap()).unwrap();
        assert_eq!(ok.get_timeout(WAIT), Ok(4));
        assert_eq!(pool.state(), PoolState::Running);
        assert_eq!(pool.live_workers(), 1);

        // join() returns even though the lost job never will.
        pool.close();
        pool.join().unwrap();
        assert!(!victim.is_ready());
    }

    #[test]
    fn test_runaway_under_memory_cap_breaks_pool() {
        let reg = tasks::builtin();
        let cfg = PoolConfig::new()
            .num_workers(1)
            .policy(FailurePolicy::FailFast)
            .memory_limit_mb(256)
            .name("oom-test");
        let mut pool = ProcessPool::new(cfg, &reg).unwrap();

        let start = Instant::now();
        let handle = pool.submit(reg.item("runaway", &[32, 5]).unwrap()).unwrap();
        let err = handle.get_timeout(Duration::from_secs(30)).unwrap_err();
        assert!(err.is_broken_pool(), "{:?}", err);
        assert!(start.elapsed() < Duration::from_secs(30));
        pool.terminate();
    }

    #[test]
    fn test_terminate_fails_outstanding() {
        let (mut pool, reg) = pool(1, FailurePolicy::FailFast);
        let h = pool.submit(reg.item("sleep_ms", &[60_000]).unwrap()).unwrap();
        pool.terminate();
        assert_eq!(h.get_timeout(WAIT), Err(PoolError::Terminated));
        assert_eq!(pool.state(), PoolState::Terminated);
        assert_eq!(
            pool.submit(reg.item("add", &[]).unwrap()).unwrap_err(),
            PoolError::Terminated
        );
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_unknown_task_fails_job() {
        let (mut pool, _reg) = pool(1, FailurePolicy::FailFast);
        let item = WorkItem::new(procpool_core::entry::TaskId(999), &[]).unwrap();
        let h = pool.submit(item).unwrap();
        assert!(matches!(h.get_timeout(WAIT), Err(PoolError::UnknownTask(_))));
        pool.close();
        pool.join().unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let reg = tasks::builtin();
        let res = ProcessPool::new(PoolConfig::new().num_workers(0), &reg);
        assert!(matches!(res, Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_worker_pids_distinct() {
        let (pool, _reg) = pool(3, FailurePolicy::FailFast);
        let pids: HashSet<Pid> = pool.worker_pids().into_iter().collect();
        assert_eq!(pids.len(), 3);
        assert_eq!(pool.worker_count(), 3);
        assert_eq!(pool.queued(), 0);
        // Dropping an un-joined pool terminates it.
    }

    #[test]
    fn test_workers_start_while_stderr_locked_elsewhere() {
        set_log_level(LogLevel::Debug);
        let (locked_tx, locked_rx) = mpsc::channel();
        let holder = thread::spawn(move || {
            let guard = std::io::stderr().lock();
            locked_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(1500));
            drop(guard);
        });
        locked_rx.recv().unwrap();

        // The worker is forked while another thread owns the stderr lock.
        let (mut pool, reg) = pool(1, FailurePolicy::FailFast);
        holder.join().unwrap();
        set_log_level(LogLevel::Warn);

        let h = pool.submit(reg.item("add", &[1, 2]).unwrap()).unwrap();
        assert_eq!(h.get_timeout(WAIT), Ok(3));
        pool.close();
        pool.join().unwrap();
    }

    #[test]
    fn test_discard_unmonitored_reaps_workers() {
        let reg = tasks::builtin();
        let cfg = PoolConfig::new().num_workers(2).name("test");
        let workers: Vec<WorkerSlot> = spawn_all(&cfg, &reg)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(index, s)| WorkerSlot::new(index, s.pid, s.task_tx))
            .collect();

        discard_unmonitored(&workers);
        for w in &workers {
            assert!(!w.alive.load(Ordering::Acquire));
            assert!(lock(&w.task_tx).is_none());
            // Already reaped: no zombie left behind.
            assert_eq!(waitpid(w.pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
        }
    }
}
