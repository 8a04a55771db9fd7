//! Fiber identifier type

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a fiber
///
/// Ids are handed out from a process-wide counter and never reused.
/// Zero is reserved as the "not a fiber" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FiberId(u64);

/// The id reported when the caller is not a fiber
pub const NOT_A_FIBER: FiberId = FiberId::NONE;

impl FiberId {
    /// Sentinel value indicating no fiber
    pub const NONE: FiberId = FiberId(0);

    /// Allocate the next process-unique id
    #[inline]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        FiberId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw value
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        FiberId(raw)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Check if this names a fiber
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<FiberId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<FiberId> for u64 {
    #[inline]
    fn from(id: FiberId) -> Self {
        id.0
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "FiberId(NONE)")
        } else {
            write!(f, "FiberId({})", self.0)
        }
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for FiberId {
    fn default() -> Self {
        FiberId::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_is_unique_and_nonzero() {
        let a = FiberId::next();
        let b = FiberId::next();
        assert_ne!(a, b);
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(b > a);
    }

    #[test]
    fn test_none_sentinel() {
        assert!(NOT_A_FIBER.is_none());
        assert_eq!(NOT_A_FIBER.as_u64(), 0);
        assert_eq!(FiberId::default(), FiberId::NONE);
        assert_eq!(FiberId::NONE.to_option(), None);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format!("{}", FiberId::from_raw(7)), "7");
        assert_eq!(format!("{:?}", FiberId::from_raw(7)), "FiberId(7)");
        assert_eq!(format!("{}", FiberId::NONE), "none");
    }
}
