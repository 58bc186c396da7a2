//! Work item and result record types.
//!
//! These are the records that cross the parent/worker pipe boundary.
//! Both are fixed-size and smaller than `PIPE_BUF`, so a single
//! `write(2)` of a record is atomic and a reader never sees a torn entry.

use crate::error::{PoolError, Result};

/// Maximum number of arguments carried by one work item.
pub const MAX_ARGS: usize = 6;

/// Correlation ID for one submission.
/// Assigned by the pool at `submit()` time, echoed back by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct JobId(pub u64);

impl JobId {
    pub const NONE: Self = Self(0);

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Index of a task function inside a [`TaskRegistry`](crate::task::TaskRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TaskId(pub u32);

/// A unit of work: task reference plus an ordered argument list.
///
/// Immutable once submitted. Unused argument slots are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub task: TaskId,
    argc: u32,
    args: [i64; MAX_ARGS],
}

impl WorkItem {
    /// Build a work item. Fails with `InvalidArgs` past `MAX_ARGS`.
    pub fn new(task: TaskId, args: &[i64]) -> Result<Self> {
        if args.len() > MAX_ARGS {
            return Err(PoolError::InvalidArgs(args.len()));
        }
        let mut slots = [0i64; MAX_ARGS];
        slots[..args.len()].copy_from_slice(args);
        Ok(Self {
            task,
            argc: args.len() as u32,
            args: slots,
        })
    }

    /// The arguments actually supplied at submission.
    #[inline]
    pub fn args(&self) -> &[i64] {
        &self.args[..self.argc as usize]
    }
}

/// Work item as written to a worker's task pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitRecord {
    pub job_id: JobId,
    pub item: WorkItem,
}

impl SubmitRecord {
    pub const SIZE: usize = 64;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.job_id.0.to_le_bytes());
        buf[8..12].copy_from_slice(&self.item.task.0.to_le_bytes());
        buf[12..16].copy_from_slice(&self.item.argc.to_le_bytes());
        for (i, arg) in self.item.args.iter().enumerate() {
            let off = 16 + i * 8;
            buf[off..off + 8].copy_from_slice(&arg.to_le_bytes());
        }
        buf
    }

    /// Decode a record. An `argc` above `MAX_ARGS` is clamped; the
    /// worker reports it back as `InvalidArgs` rather than trusting it.
    pub fn decode(buf: &[u8; Self::SIZE]) -> (Self, u32) {
        let job_id = JobId(u64::from_le_bytes(word8(buf, 0)));
        let task = TaskId(u32::from_le_bytes(word4(buf, 8)));
        let raw_argc = u32::from_le_bytes(word4(buf, 12));
        let mut args = [0i64; MAX_ARGS];
        for (i, arg) in args.iter_mut().enumerate() {
            *arg = i64::from_le_bytes(word8(buf, 16 + i * 8));
        }
        let item = WorkItem {
            task,
            argc: raw_argc.min(MAX_ARGS as u32),
            args,
        };
        (Self { job_id, item }, raw_argc)
    }
}

/// Outcome of one work item as reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResultStatus {
    Ok = 0,
    Panicked = 1,
    UnknownTask = 2,
    InvalidArgs = 3,
}

impl ResultStatus {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Ok),
            1 => Some(Self::Panicked),
            2 => Some(Self::UnknownTask),
            3 => Some(Self::InvalidArgs),
            _ => None,
        }
    }
}

/// Result record written by a worker to its result pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultRecord {
    pub job_id: JobId,
    pub status: ResultStatus,
    /// Task return value when `status == Ok`; otherwise status detail
    /// (task id for `UnknownTask`, argc for `InvalidArgs`).
    pub value: i64,
}

impl ResultRecord {
    pub const SIZE: usize = 24;

    pub fn ok(job_id: JobId, value: i64) -> Self {
        Self { job_id, status: ResultStatus::Ok, value }
    }

    pub fn failed(job_id: JobId, status: ResultStatus, detail: i64) -> Self {
        Self { job_id, status, value: detail }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.job_id.0.to_le_bytes());
        buf[8..12].copy_from_slice(&(self.status as u32).to_le_bytes());
        buf[16..24].copy_from_slice(&self.value.to_le_bytes());
        buf
    }

    /// Returns `None` for an unknown status code.
    pub fn decode(buf: &[u8; Self::SIZE]) -> Option<Self> {
        let status = ResultStatus::from_u32(u32::from_le_bytes(word4(buf, 8)))?;
        Some(Self {
            job_id: JobId(u64::from_le_bytes(word8(buf, 0))),
            status,
            value: i64::from_le_bytes(word8(buf, 16)),
        })
    }

    /// Convert into what the submitter sees.
    pub fn into_outcome(self) -> Result<i64> {
        match self.status {
            ResultStatus::Ok => Ok(self.value),
            ResultStatus::Panicked => Err(PoolError::TaskPanicked),
            ResultStatus::UnknownTask => Err(PoolError::UnknownTask(TaskId(self.value as u32))),
            ResultStatus::InvalidArgs => Err(PoolError::InvalidArgs(self.value as usize)),
        }
    }
}

#[inline]
fn word4(buf: &[u8], off: usize) -> [u8; 4] {
    let mut w = [0u8; 4];
    w.copy_from_slice(&buf[off..off + 4]);
    w
}

#[inline]
fn word8(buf: &[u8], off: usize) -> [u8; 8] {
    let mut w = [0u8; 8];
    w.copy_from_slice(&buf[off..off + 8]);
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_fit_in_pipe_buf() {
        assert!(SubmitRecord::SIZE <= 512);
        assert!(ResultRecord::SIZE <= 512);
    }

    #[test]
    fn test_work_item_keeps_argument_order() {
        let item = WorkItem::new(TaskId(3), &[1, -2, 3]).unwrap();
        assert_eq!(item.args(), &[1, -2, 3]);

        let rec = SubmitRecord { job_id: JobId(42), item };
        let (back, argc) = SubmitRecord::decode(&rec.encode());
        assert_eq!(argc, 3);
        assert_eq!(back, rec);
        assert_eq!(back.item.args(), &[1, -2, 3]);
    }

    #[test]
    fn test_too_many_args_rejected() {
        let err = WorkItem::new(TaskId(0), &[0; MAX_ARGS + 1]).unwrap_err();
        assert!(matches!(err, PoolError::InvalidArgs(7)));
    }

    #[test]
    fn test_corrupt_argc_is_clamped() {
        let item = WorkItem::new(TaskId(1), &[5]).unwrap();
        let mut raw = SubmitRecord { job_id: JobId(1), item }.encode();
        raw[12..16].copy_from_slice(&99u32.to_le_bytes());
        let (rec, argc) = SubmitRecord::decode(&raw);
        assert_eq!(argc, 99);
        assert_eq!(rec.item.args().len(), MAX_ARGS);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut raw = ResultRecord::ok(JobId(1), 7).encode();
        raw[8..12].copy_from_slice(&77u32.to_le_bytes());
        assert!(ResultRecord::decode(&raw).is_none());
    }

    #[test]
    fn test_result_outcomes() {
        assert_eq!(ResultRecord::ok(JobId(1), 4).into_outcome().unwrap(), 4);
        assert!(matches!(
            ResultRecord::failed(JobId(1), ResultStatus::Panicked, 0).into_outcome(),
            Err(PoolError::TaskPanicked)
        ));
        assert!(matches!(
            ResultRecord::failed(JobId(1), ResultStatus::UnknownTask, 9).into_outcome(),
            Err(PoolError::UnknownTask(TaskId(9)))
        ));
    }
}
