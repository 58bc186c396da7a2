//! Collecting worker exit status.

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use procpool_core::error::Termination;
use procpool_core::pwarn;

/// Block until `pid` terminates and report how.
///
/// Stop/continue notifications are skipped. If the status cannot be
/// collected (ECHILD: SIGCHLD ignored, or reaped by someone else) the
/// result is `Termination::Unknown`.
pub fn reap(pid: Pid) -> Termination {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Termination::Exited(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Termination::Signaled(sig),
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                pwarn!("waitpid({}) failed: {}", pid, e);
                return Termination::Unknown;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::{fork, ForkResult};

    fn fork_child(body: fn() -> !) -> Pid {
        match unsafe { fork() }.unwrap() {
            ForkResult::Parent { child } => child,
            ForkResult::Child => body(),
        }
    }

    fn exit_seven() -> ! {
        unsafe { libc::_exit(7) }
    }

    fn exit_clean() -> ! {
        unsafe { libc::_exit(0) }
    }

    fn wait_forever() -> ! {
        loop {
            unsafe { libc::pause() };
        }
    }

    #[test]
    fn test_reap_exit_code() {
        let pid = fork_child(exit_seven);
        assert_eq!(reap(pid), Termination::Exited(7));
    }

    #[test]
    fn test_reap_signal() {
        let pid = fork_child(wait_forever);
        kill(pid, Signal::SIGKILL).unwrap();
        assert_eq!(reap(pid), Termination::Signaled(Signal::SIGKILL));
    }

    #[test]
    fn test_reap_twice_is_unknown() {
        let pid = fork_child(exit_clean);
        assert_eq!(reap(pid), Termination::Exited(0));
        assert_eq!(reap(pid), Termination::Unknown);
    }
}
