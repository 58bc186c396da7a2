//! Environment variable utilities
//!
//! Generic `env_get<T>` for parsing environment variables with defaults.
//! Used by `PoolConfig::from_env()` and the logging layer.
//!
//! ```ignore
//! use procpool_core::env::{env_get, env_get_opt};
//!
//! let workers: usize = env_get("PROCPOOL_WORKERS", 4);
//! let cap: Option<u64> = env_get_opt("PROCPOOL_MEM_LIMIT_MB");
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default.
///
/// Unset and unparsable values both yield the default.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean.
///
/// Accepts: "1", "true", "yes", "on" (case-insensitive) as true.
/// Any other set value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses, `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__PROCPOOL_TEST_UNSET__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_opt_none() {
        let val: Option<usize> = env_get_opt("__PROCPOOL_TEST_UNSET__");
        assert!(val.is_none());
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__PROCPOOL_TEST_NUM__", " 123 ");
        let val: usize = env_get("__PROCPOOL_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__PROCPOOL_TEST_NUM__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        for (raw, expect) in [("1", true), ("TRUE", true), ("on", true), ("0", false), ("garbage", false)] {
            std::env::set_var("__PROCPOOL_TEST_BOOL__", raw);
            assert_eq!(env_get_bool("__PROCPOOL_TEST_BOOL__", !expect), expect, "{}", raw);
        }
        std::env::remove_var("__PROCPOOL_TEST_BOOL__");
        assert!(env_get_bool("__PROCPOOL_TEST_BOOL__", true));
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__PROCPOOL_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__PROCPOOL_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__PROCPOOL_TEST_INVALID__");
    }
}
