//! Built-in tasks.
//!
//! | Name        | Arguments                    | Behavior                          |
//! |-------------|------------------------------|-----------------------------------|
//! | `add`       | any                          | sum of arguments                  |
//! | `sleep_ms`  | `[ms]`                       | sleep, return `ms`                |
//! | `exit_with` | `[code]`                     | `_exit(code)` the worker process  |
//! | `panic`     | none                         | panic inside the task             |
//! | `runaway`   | `[block_mib, max_sleep_ms]`  | allocate until killed             |

use std::thread;
use std::time::Duration;

use rand::Rng;

use procpool_core::pdebug;
use procpool_core::task::TaskRegistry;

/// Default block size for `runaway`, in MiB.
pub const RUNAWAY_BLOCK_MIB: usize = 64;
/// Default upper bound on `runaway`'s pause between blocks.
pub const RUNAWAY_MAX_SLEEP_MS: u64 = 100;

pub fn add(args: &[i64]) -> i64 {
    args.iter().fold(0i64, |acc, v| acc.wrapping_add(*v))
}

pub fn sleep_ms(args: &[i64]) -> i64 {
    let ms = args.first().copied().unwrap_or(0).max(0);
    thread::sleep(Duration::from_millis(ms as u64));
    ms
}

/// Ends the worker process, the pool sees an abrupt exit.
pub fn exit_with(args: &[i64]) -> i64 {
    let code = args.first().copied().unwrap_or(1) as i32;
    unsafe { libc::_exit(code) }
}

pub fn panic(_args: &[i64]) -> i64 {
    panic!("task panicked on request")
}

/// Allocate memory without bound until the process is killed.
///
/// Each round allocates a block, fills it so every page is resident,
/// keeps it in an ever-growing hoard and sleeps a random interval.
/// There is no exit condition. Under a memory cap the allocation
/// eventually fails and the process aborts; without one the OOM killer
/// ends it (or something else on the host).
pub fn runaway(args: &[i64]) -> i64 {
    let block_mib = args
        .first()
        .copied()
        .filter(|v| *v > 0)
        .map_or(RUNAWAY_BLOCK_MIB, |v| v as usize);
    let max_sleep = args
        .get(1)
        .copied()
        .filter(|v| *v > 0)
        .map_or(RUNAWAY_MAX_SLEEP_MS, |v| v as u64);

    let block = block_bytes(block_mib);
    let mut rng = rand::thread_rng();
    let mut hoard: Vec<Vec<u8>> = Vec::new();
    loop {
        hoard.push(vec![0xA5; block]);
        pdebug!("runaway holding {} MiB", hoard.len() * block_mib);
        thread::sleep(Duration::from_millis(rng.gen_range(0..max_sleep)));
    }
}

/// Block size in bytes, clamped so an absurd request fails in the
/// allocator instead of wrapping around to a small block.
fn block_bytes(mib: usize) -> usize {
    mib.saturating_mul(1 << 20)
}

/// Registry with every built-in task.
pub fn builtin() -> TaskRegistry {
    TaskRegistry::new()
        .with("add", add)
        .with("sleep_ms", sleep_ms)
        .with("exit_with", exit_with)
        .with("panic", panic)
        .with("runaway", runaway)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add() {
        assert_eq!(add(&[1, 2]), 3);
        assert_eq!(add(&[1, 3]), 4);
        assert_eq!(add(&[]), 0);
        assert_eq!(add(&[i64::MAX, 1]), i64::MIN);
    }

    #[test]
    fn test_sleep_returns_duration() {
        assert_eq!(sleep_ms(&[5]), 5);
        assert_eq!(sleep_ms(&[-3]), 0);
    }

    #[test]
    fn test_block_bytes_saturates() {
        assert_eq!(block_bytes(RUNAWAY_BLOCK_MIB), 64 << 20);
        assert_eq!(block_bytes(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_builtin_registry() {
        let reg = builtin();
        for name in ["add", "sleep_ms", "exit_with", "panic", "runaway"] {
            assert!(reg.id_of(name).is_ok(), "{}", name);
        }
        let f = reg.get(reg.id_of("add").unwrap()).unwrap();
        assert_eq!(f(&[40, 2]), 42);
    }
}
