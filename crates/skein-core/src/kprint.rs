//! Kernel-style print macros for skein
//!
//! Thread-safe, optionally-flushing debug output similar to Linux kernel's printk.
//! Each line is tagged with the worker and fiber it was emitted from.
//!
//! # Environment Variables
//!
//! - `SKEIN_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0-5)
//! - `SKEIN_FLUSH_EPRINT=1` - Flush stderr after each line (useful for crashes)
//! - `SKEIN_LOG_TIME=1` - Prefix lines with microseconds since first log
//!
//! # Usage
//!
//! ```ignore
//! use skein_core::{kdebug, kinfo, kwarn};
//!
//! kinfo!("Worker {} started", id);
//! kdebug!("fiber {} -> {}", id, state);
//! kwarn!("Unexpected state: {:?}", state);
//! ```

use std::cell::Cell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

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

    /// Parse a level name or digit; `None` for anything else
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
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

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static EPOCH: OnceLock<Instant> = OnceLock::new();

thread_local! {
    static WORKER_CTX: Cell<u32> = const { Cell::new(u32::MAX) };
    static FIBER_CTX: Cell<u64> = const { Cell::new(0) };
}

/// Initialize logging from environment variables
///
/// Called automatically on first log; call it explicitly for
/// deterministic initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    let _ = EPOCH.get_or_init(Instant::now);

    if let Some(level) = std::env::var("SKEIN_LOG_LEVEL").ok().and_then(|v| LogLevel::parse(&v)) {
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
    FLUSH_ENABLED.store(crate::env::env_flag("SKEIN_FLUSH_EPRINT", false), Ordering::Relaxed);
    TIME_ENABLED.store(crate::env::env_flag("SKEIN_LOG_TIME", false), Ordering::Relaxed);
}

#[inline]
fn ensure_init() {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
}

/// Get current log level
#[inline]
pub fn log_level() -> LogLevel {
    ensure_init();
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
pub fn set_log_level(level: LogLevel) {
    ensure_init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Set flush mode programmatically
pub fn set_flush_enabled(enabled: bool) {
    ensure_init();
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Set timestamp prefix programmatically
pub fn set_time_enabled(enabled: bool) {
    ensure_init();
    TIME_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Check if a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

// ============================================================================
// Per-thread context (set by the worker loop)
// ============================================================================

/// Tag subsequent lines from this thread with a worker index
pub fn set_worker_id(id: u32) {
    WORKER_CTX.with(|c| c.set(id));
}

pub fn clear_worker_id() {
    WORKER_CTX.with(|c| c.set(u32::MAX));
}

/// Tag subsequent lines from this thread with a fiber id
pub fn set_fiber_id(id: u64) {
    FIBER_CTX.with(|c| c.set(id));
}

pub fn clear_fiber_id() {
    FIBER_CTX.with(|c| c.set(0));
}

fn write_context(out: &mut impl Write) {
    if TIME_ENABLED.load(Ordering::Relaxed) {
        let us = EPOCH.get().map(|e| e.elapsed().as_micros()).unwrap_or(0);
        let _ = write!(out, "{:>10}us ", us);
    }
    let worker = WORKER_CTX.with(|c| c.get());
    let fiber = FIBER_CTX.with(|c| c.get());
    match (worker, fiber) {
        (u32::MAX, 0) => {}
        (u32::MAX, f) => {
            let _ = write!(out, "[f{}] ", f);
        }
        (w, 0) => {
            let _ = write!(out, "[w{}] ", w);
        }
        (w, f) => {
            let _ = write!(out, "[w{} f{}] ", w, f);
        }
    }
}

/// Internal: Write with newline and optionally flush
#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    ensure_init();
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    write_context(&mut handle);
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = handle.flush();
    }
}

/// Internal: Leveled print
#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    write_context(&mut handle);
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = handle.flush();
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Print to stderr with newline, unconditionally
#[macro_export]
macro_rules! kprintln {
    () => {{
        $crate::kprint::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::kprint::_kprintln_impl(format_args!($($arg)*));
    }};
}

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Error,
            format_args!($($arg)*)
        );
    }};
}

/// Warning level log
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Warn,
            format_args!($($arg)*)
        );
    }};
}

/// Info level log
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Info,
            format_args!($($arg)*)
        );
    }};
}

/// Debug level log
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Debug,
            format_args!($($arg)*)
        );
    }};
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Trace,
            format_args!($($arg)*)
        );
    }};
}

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
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse(" 2 "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_context_prefix() {
        let mut buf = Vec::new();
        set_worker_id(3);
        set_fiber_id(12);
        write_context(&mut buf);
        clear_fiber_id();
        write_context(&mut buf);
        clear_worker_id();
        write_context(&mut buf);

        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("[w3 f12] [w3] "));
    }

    #[test]
    fn test_off_disables_everything() {
        set_log_level(LogLevel::Off);
        assert!(!level_enabled(LogLevel::Error));
        kerror!("suppressed {}", 1);
        kdebug!("suppressed");
        ktrace!("suppressed");
    }
}
