//! Task registry.
//!
//! A work item names its function by [`TaskId`], not by pointer. The
//! registry is frozen when a pool is built and every forked worker
//! inherits an identical copy, so ids resolve to the same function on
//! both sides of the pipe.

use std::collections::HashMap;

use crate::entry::{TaskId, WorkItem};
use crate::error::{PoolError, Result};

/// Signature of a task run inside a worker process.
pub type TaskFn = fn(&[i64]) -> i64;

#[derive(Clone, Default)]
pub struct TaskRegistry {
    funcs: Vec<(String, TaskFn)>,
    by_name: HashMap<String, TaskId>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` under `name`. Ids are assigned in registration order.
    pub fn register(&mut self, name: &str, func: TaskFn) -> Result<TaskId> {
        if self.by_name.contains_key(name) {
            return Err(PoolError::DuplicateTask(name.to_string()));
        }
        let id = TaskId(self.funcs.len() as u32);
        self.funcs.push((name.to_string(), func));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Builder-style `register` that panics on duplicates.
    /// Intended for static registries assembled at startup.
    pub fn with(mut self, name: &str, func: TaskFn) -> Self {
        if let Err(e) = self.register(name, func) {
            panic!("{}", e);
        }
        self
    }

    pub fn id_of(&self, name: &str) -> Result<TaskId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| PoolError::UnknownTaskName(name.to_string()))
    }

    pub fn get(&self, id: TaskId) -> Option<TaskFn> {
        self.funcs.get(id.0 as usize).map(|(_, f)| *f)
    }

    pub fn name_of(&self, id: TaskId) -> Option<&str> {
        self.funcs.get(id.0 as usize).map(|(n, _)| n.as_str())
    }

    /// Build a work item for the named task.
    pub fn item(&self, name: &str, args: &[i64]) -> Result<WorkItem> {
        WorkItem::new(self.id_of(name)?, args)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.funcs.iter().map(|(n, _)| n))
            .finish()
    }
}
