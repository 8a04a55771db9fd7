//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `SchedulerConfig::from_env()` and
//! the logging setup.
//!
//! ```ignore
//! use skein_core::env::{env_get, env_flag, env_millis};
//!
//! let workers: usize = env_get("SKEIN_NUM_WORKERS", 4);
//! let debug = env_flag("SKEIN_DEBUG", false);
//! let park = env_millis("SKEIN_PARK_TIMEOUT_MS", 50);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as `T`, or `default` if unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable parsed as `T`, `None` if unset or unparsable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a boolean switch: 1/true/yes/on and 0/false/no/off
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get environment variable as boolean
///
/// Unrecognized values fall back to `default` rather than `false`.
#[inline]
pub fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

/// Get environment variable as a millisecond duration
#[inline]
pub fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}
