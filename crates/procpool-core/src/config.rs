//! Pool configuration

use crate::env::{env_get, env_get_opt};
use crate::error::{PoolError, Result};
use crate::pool::FailurePolicy;

/// Upper bound on workers per pool.
pub const MAX_WORKERS: usize = 64;

/// `oom_score_adj` accepts values in this range.
pub const OOM_SCORE_ADJ_RANGE: std::ops::RangeInclusive<i32> = -1000..=1000;

/// Configuration for a process pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker processes (defaults to CPU count)
    pub num_workers: usize,

    /// What to do when a worker dies outside the pool's control
    pub policy: FailurePolicy,

    /// Address-space cap applied to each worker via RLIMIT_AS, in bytes
    pub memory_limit: Option<u64>,

    /// Written to /proc/self/oom_score_adj in each worker (Linux only)
    pub oom_score_adj: Option<i32>,

    /// Prefix for worker names in log output
    pub name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            num_workers: num_cpus.clamp(1, MAX_WORKERS),
            policy: FailurePolicy::default(),
            memory_limit: None,
            oom_score_adj: None,
            name: "procpool".to_string(),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the environment:
    ///
    /// - `PROCPOOL_WORKERS` - worker count
    /// - `PROCPOOL_POLICY` - `hang` or `fail-fast`
    /// - `PROCPOOL_MEM_LIMIT_MB` - per-worker address-space cap
    /// - `PROCPOOL_OOM_SCORE_ADJ` - per-worker OOM score adjustment
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Apply environment overrides on top of `self`.
    pub fn apply_env(mut self) -> Self {
        self.num_workers = env_get("PROCPOOL_WORKERS", self.num_workers);
        self.policy = env_get("PROCPOOL_POLICY", self.policy);
        if let Some(mb) = env_get_opt::<u64>("PROCPOOL_MEM_LIMIT_MB") {
            self.memory_limit = Some(mib_to_bytes(mb));
        }
        if let Some(adj) = env_get_opt("PROCPOOL_OOM_SCORE_ADJ") {
            self.oom_score_adj = Some(adj);
        }
        self
    }

    /// Set number of worker processes
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cap each worker's address space at `bytes`
    pub fn memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Cap each worker's address space at `mb` MiB
    pub fn memory_limit_mb(self, mb: u64) -> Self {
        self.memory_limit(mib_to_bytes(mb))
    }

    pub fn oom_score_adj(mut self, adj: i32) -> Self {
        self.oom_score_adj = Some(adj);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(PoolError::InvalidConfig("num_workers must be at least 1"));
        }
        if self.num_workers > MAX_WORKERS {
            return Err(PoolError::InvalidConfig("num_workers exceeds maximum"));
        }
        if self.memory_limit == Some(0) {
            return Err(PoolError::InvalidConfig("memory_limit must be non-zero"));
        }
        if let Some(adj) = self.oom_score_adj {
            if !OOM_SCORE_ADJ_RANGE.contains(&adj) {
                return Err(PoolError::InvalidConfig("oom_score_adj out of range"));
            }
        }
        Ok(())
    }
}

/// MiB to bytes, clamped at `u64::MAX`.
fn mib_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1 << 20)
}
