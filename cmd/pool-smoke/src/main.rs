//! procpool End-to-End Smoke Test
//!
//! Exercises a real fork-based pool:
//!   Part A (Basic dispatch): pairwise sums, batch map, join drains
//!   Part B (Task-level failures): panic, unknown task
//!   Part C (Fail-fast policy): SIGKILL a busy worker
//!   Part D (Hang policy): SIGKILL a busy worker, observe the timeout
//!
//! Run: ./target/release/pool-smoke

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use procpool::{
    tasks, FailurePolicy, PoolConfig, PoolError, PoolState, ProcessPool, TaskId, TaskRegistry,
    WorkItem, WorkerPool,
};

const WAIT: Duration = Duration::from_secs(10);

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

fn build(t: &mut TestRunner, reg: &TaskRegistry, n: usize, policy: FailurePolicy) -> Option<ProcessPool> {
    let cfg = PoolConfig::new().num_workers(n).policy(policy).name("smoke");
    match ProcessPool::new(cfg, reg) {
        Ok(p) => Some(p),
        Err(e) => {
            t.fail(&format!("create {} pool", policy), &e.to_string());
            None
        }
    }
}

/// Submit a long sleep, wait for a worker to take it, SIGKILL that worker.
fn kill_busy_worker(pool: &ProcessPool, reg: &TaskRegistry) -> Option<(procpool::PendingResult, Pid)> {
    let before: HashSet<Pid> = pool.worker_pids().into_iter().collect();
    let handle = pool.submit(reg.item("sleep_ms", &[60_000]).ok()?).ok()?;
    let start = Instant::now();
    while pool.active_workers() == 0 {
        if start.elapsed() > WAIT {
            return None;
        }
        thread::sleep(Duration::from_millis(5));
    }
    // With one worker the busy one is unambiguous.
    let pid = *before.iter().next()?;
    kill(pid, Signal::SIGKILL).ok()?;
    Some((handle, pid))
}

// ════════════════════════════════════════════════════════════
// Part A: Basic dispatch
// ════════════════════════════════════════════════════════════

fn test_dispatch(t: &mut TestRunner, reg: &TaskRegistry) {
    t.section("Part A: Basic dispatch");

    let Some(mut pool) = build(t, reg, 2, FailurePolicy::FailFast) else { return };
    t.check("worker count", pool.worker_count() == 2, "expected 2 workers");

    // A1: (1,2) and (1,3) -> {3, 4}
    let handles: Vec<_> = [[1, 2], [1, 3]]
        .iter()
        .filter_map(|args| pool.submit(reg.item("add", args).ok()?).ok())
        .collect();
    let got: HashSet<i64> = handles.iter().filter_map(|h| h.get_timeout(WAIT).ok()).collect();
    t.check(
        "pairwise sums = {3, 4}",
        got == HashSet::from([3, 4]),
        &format!("got {:?}", got),
    );

    // A2: batch larger than the pool
    let items: Vec<WorkItem> = (0..32).filter_map(|i| reg.item("add", &[i, 1]).ok()).collect();
    match pool.map(&items) {
        Ok(hs) => {
            let sum: i64 = hs.iter().filter_map(|h| h.get_timeout(WAIT).ok()).sum();
            t.check("map 32 items", sum == (1..=32).sum::<i64>(), &format!("sum {}", sum));
        }
        Err(e) => t.fail("map 32 items", &e.to_string()),
    }

    // A3: close + join
    pool.close();
    let rejected = pool.submit(items[0]).err();
    t.check("submit after close", rejected == Some(PoolError::Closed), &format!("{:?}", rejected));
    let joined = pool.join();
    t.check("join", joined.is_ok(), &format!("{:?}", joined.err()));
    t.check("state joined", pool.state() == PoolState::Joined, &format!("{:?}", pool.state()));
}

// ════════════════════════════════════════════════════════════
// Part B: Task-level failures
// ════════════════════════════════════════════════════════════

fn test_task_failures(t: &mut TestRunner, reg: &TaskRegistry) {
    t.section("Part B: Task-level failures");

    let Some(mut pool) = build(t, reg, 1, FailurePolicy::FailFast) else { return };

    let panicked = reg
        .item("panic", &[])
        .and_then(|item| pool.submit(item))
        .and_then(|h| h.get_timeout(WAIT));
    t.check("panic -> TaskPanicked", panicked == Err(PoolError::TaskPanicked), &format!("{:?}", panicked));

    let unknown = WorkItem::new(TaskId(4242), &[])
        .and_then(|item| pool.submit(item))
        .and_then(|h| h.get_timeout(WAIT));
    t.check(
        "unknown task id",
        unknown == Err(PoolError::UnknownTask(TaskId(4242))),
        &format!("{:?}", unknown),
    );

    t.check("pool still running", pool.state() == PoolState::Running, &format!("{:?}", pool.state()));
    pool.close();
    let _ = pool.join();
}

// ════════════════════════════════════════════════════════════
// Part C: Fail-fast
// ════════════════════════════════════════════════════════════

fn test_fail_fast(t: &mut TestRunner, reg: &TaskRegistry) {
    t.section("Part C: Fail-fast policy");

    let Some(mut pool) = build(t, reg, 1, FailurePolicy::FailFast) else { return };
    let Some((handle, pid)) = kill_busy_worker(&pool, reg) else {
        t.fail("kill busy worker", "worker never picked up the job");
        return;
    };
    t.pass(&format!("SIGKILL worker {}", pid));

    let start = Instant::now();
    let res = handle.get_timeout(WAIT);
    t.check(
        "pending result -> BrokenPool",
        res.as_ref().err().is_some_and(PoolError::is_broken_pool),
        &format!("{:?}", res),
    );
    t.check("failed promptly", start.elapsed() < WAIT, &format!("{:?}", start.elapsed()));
    if let Err(e) = &res {
        println!("       {}", e);
    }

    let later = reg.item("add", &[1, 1]).and_then(|item| pool.submit(item));
    t.check(
        "later submit -> BrokenPool",
        later.as_ref().err().is_some_and(PoolError::is_broken_pool),
        &format!("{:?}", later.map(|h| h.job_id())),
    );
    t.check("state broken", pool.state() == PoolState::Broken, &format!("{:?}", pool.state()));
    pool.terminate();
}

// ════════════════════════════════════════════════════════════
// Part D: Hang
// ════════════════════════════════════════════════════════════

fn test_hang(t: &mut TestRunner, reg: &TaskRegistry) {
    t.section("Part D: Hang policy");

    let Some(mut pool) = build(t, reg, 1, FailurePolicy::Hang) else { return };
    let Some((handle, pid)) = kill_busy_worker(&pool, reg) else {
        t.fail("kill busy worker", "worker never picked up the job");
        return;
    };
    t.pass(&format!("SIGKILL worker {}", pid));

    let res = handle.get_timeout(Duration::from_secs(1));
    t.check("pending result times out", res == Err(PoolError::Timeout), &format!("{:?}", res));
    t.check("state still running", pool.state() == PoolState::Running, &format!("{:?}", pool.state()));
    t.check("no live workers", pool.live_workers() == 0, &format!("{}", pool.live_workers()));

    pool.close();
    let joined = pool.join();
    t.check("join returns", joined.is_ok(), &format!("{:?}", joined.err()));
    t.check("result still pending", !handle.is_ready(), "resolved after join");
}

fn main() {
    println!("procpool smoke test (pid {})", std::process::id());

    let registry = tasks::builtin();
    let mut t = TestRunner::new();

    test_dispatch(&mut t, &registry);
    test_task_failures(&mut t, &registry);
    test_fail_fast(&mut t, &registry);
    test_hang(&mut t, &registry);

    t.summary();
    if t.failed > 0 {
        std::process::exit(1);
    }
}
