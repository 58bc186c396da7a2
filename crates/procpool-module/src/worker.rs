//! Worker process main loop.
//!
//! Runs in the forked child. Reads one `SubmitRecord` at a time from the
//! task pipe, runs the task, writes one `ResultRecord` back. A worker
//! holds at most one item, so its pipes never fill.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::panic::{self, AssertUnwindSafe};

use procpool_core::entry::{ResultRecord, ResultStatus, SubmitRecord, MAX_ARGS};
use procpool_core::task::TaskRegistry;
use procpool_core::{pdebug, perror, ptrace};

/// Serve work items until the task pipe closes. Returns the exit code.
pub fn run(index: usize, mut task_rx: File, mut result_tx: File, registry: &TaskRegistry) -> i32 {
    pdebug!("worker {} ready", index);
    let mut buf = [0u8; SubmitRecord::SIZE];
    loop {
        match task_rx.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                pdebug!("worker {} task pipe closed, exiting", index);
                return 0;
            }
            Err(e) => {
                perror!("worker {} read failed: {}", index, e);
                return 1;
            }
        }

        let (record, argc) = SubmitRecord::decode(&buf);
        ptrace!("worker {} running job {}", index, record.job_id.0);
        let result = execute(registry, &record, argc);

        if let Err(e) = result_tx.write_all(&result.encode()) {
            // Parent is gone or stopped listening.
            pdebug!("worker {} result write failed: {}", index, e);
            return 1;
        }
    }
}

/// Run one work item. Task panics are contained to the item.
pub fn execute(registry: &TaskRegistry, record: &SubmitRecord, argc: u32) -> ResultRecord {
    let job_id = record.job_id;
    if argc as usize > MAX_ARGS {
        return ResultRecord::failed(job_id, ResultStatus::InvalidArgs, argc as i64);
    }
    let Some(func) = registry.get(record.item.task) else {
        return ResultRecord::failed(job_id, ResultStatus::UnknownTask, record.item.task.0 as i64);
    };
    let args = record.item.args();
    match panic::catch_unwind(AssertUnwindSafe(|| func(args))) {
        Ok(value) => ResultRecord::ok(job_id, value),
        Err(_) => ResultRecord::failed(job_id, ResultStatus::Panicked, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procpool_core::entry::{JobId, TaskId, WorkItem};
    use procpool_core::error::PoolError;
    use std::thread;

    fn sum(args: &[i64]) -> i64 {
        args.iter().sum()
    }

    fn boom(_: &[i64]) -> i64 {
        panic!("boom")
    }

    fn registry() -> TaskRegistry {
        TaskRegistry::new().with("sum", sum).with("boom", boom)
    }

    fn record(task: u32, args: &[i64]) -> SubmitRecord {
        SubmitRecord {
            job_id: JobId(5),
            item: WorkItem::new(TaskId(task), args).unwrap(),
        }
    }

    #[test]
    fn test_execute_ok() {
        let res = execute(&registry(), &record(0, &[1, 2, 3]), 3);
        assert_eq!(res, ResultRecord::ok(JobId(5), 6));
    }

    #[test]
    fn test_execute_panic_contained() {
        let res = execute(&registry(), &record(1, &[]), 0);
        assert_eq!(res.status, ResultStatus::Panicked);
        assert_eq!(res.into_outcome(), Err(PoolError::TaskPanicked));
    }

    #[test]
    fn test_execute_unknown_task() {
        let res = execute(&registry(), &record(9, &[]), 0);
        assert_eq!(res.into_outcome(), Err(PoolError::UnknownTask(TaskId(9))));
    }

    #[test]
    fn test_execute_bad_argc() {
        let res = execute(&registry(), &record(0, &[1]), 40);
        assert_eq!(res.into_outcome(), Err(PoolError::InvalidArgs(40)));
    }

    #[test]
    fn test_run_over_pipes() {
        let (task_rx, task_tx) = nix::unistd::pipe().unwrap();
        let (result_rx, result_tx) = nix::unistd::pipe().unwrap();
        let (task_rx, mut task_tx) = (File::from(task_rx), File::from(task_tx));
        let (mut result_rx, result_tx) = (File::from(result_rx), File::from(result_tx));

        let worker = thread::spawn(move || run(0, task_rx, result_tx, &registry()));

        task_tx.write_all(&record(0, &[1, 2]).encode()).unwrap();
        let mut buf = [0u8; ResultRecord::SIZE];
        result_rx.read_exact(&mut buf).unwrap();
        assert_eq!(ResultRecord::decode(&buf), Some(ResultRecord::ok(JobId(5), 3)));

        drop(task_tx);
        assert_eq!(worker.join().unwrap(), 0);
    }
}
