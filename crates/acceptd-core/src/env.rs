//! Environment variable helpers
//!
//! Typed lookups with defaults, used by `ServerConfig::from_env()`.
//!
//! ```ignore
//! use acceptd_core::env::{env_get, env_get_bool, env_get_millis};
//!
//! let workers: usize = env_get("ACCEPTD_WORKERS", 64);
//! let drain = env_get_bool("ACCEPTD_DRAIN", true);
//! let wait = env_get_millis("ACCEPTD_WAIT_TIMEOUT_MS", Duration::from_millis(500));
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, or return `default` if unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Boolean lookup.
///
/// "1", "true", "yes", "on" are true and "0", "false", "no", "off" are
/// false (case-insensitive). Anything else, including unset, is `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Milliseconds lookup as a `Duration`.
#[inline]
pub fn env_get_millis(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// `Some(T)` if set and parsable.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__ACCEPTD_TEST_UNSET__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__ACCEPTD_TEST_NUM__", " 123 ");
        let val: usize = env_get("__ACCEPTD_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__ACCEPTD_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__ACCEPTD_TEST_INVALID__", "not_a_number");
        let val: u16 = env_get("__ACCEPTD_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__ACCEPTD_TEST_INVALID__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        let key = "__ACCEPTD_TEST_BOOL__";
        for v in ["1", "true", "TRUE", "yes", "on"] {
            std::env::set_var(key, v);
            assert!(env_get_bool(key, false), "{v}");
        }
        for v in ["0", "false", "No", "off"] {
            std::env::set_var(key, v);
            assert!(!env_get_bool(key, true), "{v}");
        }
        std::env::set_var(key, "garbage");
        assert!(env_get_bool(key, true));
        assert!(!env_get_bool(key, false));
        std::env::remove_var(key);
        assert!(env_get_bool(key, true));
    }

    #[test]
    fn test_env_get_millis() {
        let key = "__ACCEPTD_TEST_MS__";
        assert_eq!(env_get_millis(key, Duration::from_millis(7)), Duration::from_millis(7));
        std::env::set_var(key, "250");
        assert_eq!(env_get_millis(key, Duration::ZERO), Duration::from_millis(250));
        std::env::remove_var(key);
    }
}
