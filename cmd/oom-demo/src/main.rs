//! OOM demo - runaway allocation inside a process pool
//!
//! Submits a handful of ordinary jobs next to one `runaway` job that
//! allocates until the kernel (or the memory cap) kills its worker, then
//! reports what each caller sees.
//!
//! Usage: oom-demo [hang|fail-fast] [mem-limit-mb] [workers]
//!
//! Without a memory cap the runaway worker grows until the host OOM
//! killer acts. Pass a cap (default 512 MiB) unless that is the point.
//!
//! Environment: PROCPOOL_LOG_LEVEL=debug shows the runaway's growth.

use std::time::{Duration, Instant};

use procpool::{tasks, FailurePolicy, PoolConfig, ProcessPool, WorkerPool};

fn main() {
    println!("=== procpool OOM demo ===\n");

    let mut args = std::env::args().skip(1);
    let policy: FailurePolicy = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let mem_limit_mb: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(512);
    let workers: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(4);

    let mut config = PoolConfig::new().apply_env().num_workers(workers).policy(policy);
    if mem_limit_mb > 0 {
        config = config.memory_limit_mb(mem_limit_mb);
    }
    // Make the workers, not this process, the OOM killer's first choice.
    config = config.oom_score_adj(1000);

    println!("Policy:        {}", config.policy);
    println!("Workers:       {}", config.num_workers);
    match config.memory_limit {
        Some(bytes) => println!("Memory cap:    {} MiB per worker", bytes >> 20),
        None => println!("Memory cap:    none (host OOM killer decides)"),
    }

    let registry = tasks::builtin();
    let mut pool = match ProcessPool::new(config, &registry) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("failed to start pool: {}", e);
            std::process::exit(1);
        }
    };
    println!("Worker pids:   {:?}\n", pool.worker_pids());

    let mut jobs = Vec::new();
    for i in 0..6 {
        let item = registry.item("sleep_ms", &[200 + 100 * i]);
        jobs.push((format!("sleep_ms({})", 200 + 100 * i), item.and_then(|it| pool.submit(it))));
    }
    let runaway = registry.item("runaway", &[64, 100]).and_then(|it| pool.submit(it));
    jobs.push(("runaway(64 MiB)".to_string(), runaway));

    // Bounded wait, so the hang policy shows up as a timeout instead of
    // hanging the demo.
    let deadline = Instant::now() + Duration::from_secs(30);
    for (name, submitted) in &jobs {
        let handle = match submitted {
            Ok(h) => h,
            Err(e) => {
                println!("  {:<20} rejected: {}", name, e);
                continue;
            }
        };
        let left = deadline.saturating_duration_since(Instant::now());
        match handle.get_timeout(left) {
            Ok(v) => println!("  {:<20} = {}", name, v),
            Err(e) if e.is_broken_pool() => println!("  {:<20} BROKEN: {}", name, e),
            Err(e) => println!("  {:<20} {}", name, e),
        }
    }

    println!("\nPool state:    {:?}", pool.state());
    println!("Live workers:  {}/{}", pool.live_workers(), pool.worker_count());

    let late = registry.item("add", &[1, 2]).and_then(|it| pool.submit(it));
    match late {
        Ok(h) => match h.get_timeout(Duration::from_secs(5)) {
            Ok(v) => println!("Late submit:   add(1, 2) = {}", v),
            Err(e) => println!("Late submit:   {}", e),
        },
        Err(e) => println!("Late submit:   rejected: {}", e),
    }

    // The runaway job never finishes on its own; don't wait for it.
    pool.terminate();
    println!("\nDone.");
}
