//! Leveled stderr logging for procpool
//!
//! Both the parent and its forked workers write to the same stderr, so
//! every line carries the writing process id.
//!
//! A forked worker may inherit std's stderr lock held by a parent thread
//! that no longer exists in the child. After [`enter_forked_child`] every
//! line is formatted into a stack buffer and written to fd 2 with a single
//! `write(2)`, without taking any lock.
//!
//! # Environment Variables
//!
//! - `PROCPOOL_FLUSH_EPRINT=1` - Flush stderr after each line (useful when a worker is about to be OOM-killed)
//! - `PROCPOOL_LOG_LEVEL=<level>` - off|error|warn|info|debug|trace, or 0-5
//!
//! # Usage
//!
//! ```ignore
//! use procpool_core::{pinfo, pwarn};
//!
//! pinfo!("worker {} started", pid);
//! pwarn!("worker {} died: {}", pid, cause);
//! ```

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::env::{env_get, env_get_bool};

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Ok(LogLevel::Off),
            "error" | "1" => Ok(LogLevel::Error),
            "warn" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
// Warnings by default: a broken pool is worth seeing, routine worker
// churn is not.
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static RAW_STDERR: AtomicBool = AtomicBool::new(false);

/// Longest line a forked child writes; longer lines are truncated.
const RAW_LINE_MAX: usize = 512;

/// Initialize logging from environment variables
///
/// Called automatically on first log, but can be called explicitly for
/// deterministic initialization. Must run before forking workers: a
/// child never reads the environment.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    FLUSH_ENABLED.store(env_get_bool("PROCPOOL_FLUSH_EPRINT", false), Ordering::Relaxed);
    let level = env_get("PROCPOOL_LOG_LEVEL", LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed)));
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
fn ensure_init() {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
}

#[inline]
pub fn flush_enabled() -> bool {
    ensure_init();
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    ensure_init();
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically. Overrides the environment.
pub fn set_log_level(level: LogLevel) {
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_flush_enabled(enabled: bool) {
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

/// Switch this process to lock-free stderr output. Called in a forked
/// child before it logs anything.
pub fn enter_forked_child() {
    INITIALIZED.store(true, Ordering::SeqCst);
    RAW_STDERR.store(true, Ordering::SeqCst);
}

/// Fixed-capacity line buffer, truncates on overflow.
struct LineBuf {
    buf: [u8; RAW_LINE_MAX],
    len: usize,
}

impl LineBuf {
    fn new() -> Self {
        Self { buf: [0; RAW_LINE_MAX], len: 0 }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = RAW_LINE_MAX - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

fn format_line(level: LogLevel, args: fmt::Arguments<'_>) -> LineBuf {
    use std::fmt::Write as _;
    let mut line = LineBuf::new();
    let _ = write!(line, "{} [pid {}] ", level.prefix(), std::process::id());
    let _ = line.write_fmt(args);
    // Keep room for the newline.
    line.len = line.len.min(RAW_LINE_MAX - 1);
    line.buf[line.len] = b'\n';
    line.len += 1;
    line
}

fn write_raw_stderr(mut bytes: &[u8]) {
    while !bytes.is_empty() {
        let n = unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };
        if n < 0 {
            if std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return;
        }
        if n == 0 {
            return;
        }
        bytes = &bytes[n as usize..];
    }
}

/// Internal: leveled print, one write per line.
#[doc(hidden)]
pub fn _plog_impl(level: LogLevel, args: fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    if RAW_STDERR.load(Ordering::Relaxed) {
        write_raw_stderr(format_line(level, args).as_bytes());
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} [pid {}] ", level.prefix(), std::process::id());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! perror {
    ($($arg:tt)*) => {{
        $crate::plog::_plog_impl(
            $crate::plog::LogLevel::Error,
            format_args!($($arg)*)
        );
    }};
}

/// Warning level log
#[macro_export]
macro_rules! pwarn {
    ($($arg:tt)*) => {{
        $crate::plog::_plog_impl(
            $crate::plog::LogLevel::Warn,
            format_args!($($arg)*)
        );
    }};
}

/// Info level log
#[macro_export]
macro_rules! pinfo {
    ($($arg:tt)*) => {{
        $crate::plog::_plog_impl(
            $crate::plog::LogLevel::Info,
            format_args!($($arg)*)
        );
    }};
}

/// Debug level log
#[macro_export]
macro_rules! pdebug {
    ($($arg:tt)*) => {{
        $crate::plog::_plog_impl(
            $crate::plog::LogLevel::Debug,
            format_args!($($arg)*)
        );
    }};
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ptrace {
    ($($arg:tt)*) => {{
        $crate::plog::_plog_impl(
            $crate::plog::LogLevel::Trace,
            format_args!($($arg)*)
        );
    }};
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_level_from_u8() {
        assert_eq!(LogLevel::from_u8(0), LogLevel::Off);
        assert_eq!(LogLevel::from_u8(1), LogLevel::Error);
        assert_eq!(LogLevel::from_u8(4), LogLevel::Debug);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("5".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert_eq!("loud".parse::<LogLevel>(), Err(()));
    }

    #[test]
    fn test_macros_compile() {
        set_log_level(LogLevel::Off);
        assert!(!level_enabled(LogLevel::Error));

        perror!("error {}", "msg");
        pwarn!("warn");
        pinfo!("info");
        pdebug!("debug");
        ptrace!("trace");
    }

    #[test]
    fn test_format_line() {
        let line = format_line(LogLevel::Warn, format_args!("worker {} died", 3));
        let text = std::str::from_utf8(line.as_bytes()).unwrap();
        assert!(text.starts_with("[WARN]  [pid "), "{}", text);
        assert!(text.ends_with("worker 3 died\n"), "{}", text);
    }

    #[test]
    fn test_format_line_truncates() {
        let long = "x".repeat(RAW_LINE_MAX * 2);
        let line = format_line(LogLevel::Error, format_args!("{}", long));
        assert_eq!(line.as_bytes().len(), RAW_LINE_MAX);
        assert_eq!(line.as_bytes()[RAW_LINE_MAX - 1], b'\n');
    }
}
