//! Pending result handles.
//!
//! `submit()` returns a [`PendingResult`]; the pool keeps the matching
//! [`ResultSlot`] and resolves it when the worker answers or when the
//! pool learns the answer will never come. A slot resolves at most
//! once. Later attempts are ignored.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::entry::JobId;
use crate::error::{PoolError, Result};

#[derive(Debug)]
enum SlotState {
    Pending,
    Done(Result<i64>),
}

/// Pool-side half of a pending result.
#[derive(Debug)]
pub struct ResultSlot {
    job_id: JobId,
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl ResultSlot {
    /// Create a slot and the submitter's handle to it.
    pub fn new(job_id: JobId) -> (Arc<Self>, PendingResult) {
        let slot = Arc::new(Self {
            job_id,
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        });
        let handle = PendingResult { slot: Arc::clone(&slot) };
        (slot, handle)
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Resolve with a value or error. Returns false if already resolved.
    pub fn resolve(&self, outcome: Result<i64>) -> bool {
        let mut state = self.lock();
        if matches!(*state, SlotState::Done(_)) {
            return false;
        }
        *state = SlotState::Done(outcome);
        self.ready.notify_all();
        true
    }

    pub fn fail(&self, err: PoolError) -> bool {
        self.resolve(Err(err))
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.lock(), SlotState::Done(_))
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A poisoned slot still holds a coherent state value.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Submitter's handle to the eventual outcome of one work item.
#[derive(Debug, Clone)]
pub struct PendingResult {
    slot: Arc<ResultSlot>,
}

impl PendingResult {
    pub fn job_id(&self) -> JobId {
        self.slot.job_id
    }

    /// True once completed or failed.
    pub fn is_ready(&self) -> bool {
        self.slot.is_resolved()
    }

    /// Non-blocking. `None` while pending.
    pub fn try_get(&self) -> Option<Result<i64>> {
        match &*self.slot.lock() {
            SlotState::Pending => None,
            SlotState::Done(r) => Some(r.clone()),
        }
    }

    /// Block until the result is available.
    ///
    /// Under the hang policy this never returns for a job whose worker
    /// was killed externally.
    pub fn get(&self) -> Result<i64> {
        let mut state = self.slot.lock();
        loop {
            if let SlotState::Done(r) = &*state {
                return r.clone();
            }
            state = self
                .slot
                .ready
                .wait(state)
                .unwrap_or_else(|p| p.into_inner());
        }
    }

    /// Block for at most `timeout`. `Err(Timeout)` if still pending.
    ///
    /// A timeout too large to express as a deadline waits like `get()`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<i64> {
        let mut state = self.slot.lock();
        if let SlotState::Done(r) = &*state {
            return r.clone();
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            drop(state);
            return self.get();
        };
        loop {
            if let SlotState::Done(r) = &*state {
                return r.clone();
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PoolError::Timeout);
            }
            state = self
                .slot
                .ready
                .wait_timeout(state, deadline - now)
                .map(|(s, _)| s)
                .unwrap_or_else(|p| p.into_inner().0);
        }
    }
}
