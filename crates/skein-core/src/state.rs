//! Fiber state machine and scheduling policy types

use core::fmt;

/// Why a fiber gave up its worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    /// `yield_now()` - goes straight back to its ready-queue
    Yielded,

    /// `sleep_for`/`sleep_until` - a reactor timer makes it ready again
    Sleeping,

    /// Blocked in `join()` until the target finishes
    WaitingJoin,
}

/// State of a fiber
///
/// ```text
/// Created -> Ready -> Running -> Finished
///              ^         |
///              |         v
///              +---- Suspended{Yielded|Sleeping|WaitingJoin}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    /// Built, context allocated, not yet enqueued
    Created,

    /// In a ready-queue, waiting for a worker
    Ready,

    /// Executing on a worker's OS thread
    Running,

    /// Parked on its own stack
    Suspended(SuspendReason),

    /// Callable returned or panicked
    Finished,
}

impl FiberState {
    /// Check if a worker may pick this fiber up
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, FiberState::Ready)
    }

    /// Check if the callable has completed
    #[inline]
    pub const fn is_finished(&self) -> bool {
        matches!(self, FiberState::Finished)
    }

    /// Check if the fiber holds its own stack off-worker
    #[inline]
    pub const fn is_suspended(&self) -> bool {
        matches!(self, FiberState::Suspended(_))
    }

    /// Legal edges of the state machine.
    ///
    /// Everything is monotonic except the Suspended -> Ready cycle.
    pub const fn can_transition_to(&self, next: FiberState) -> bool {
        matches!(
            (self, next),
            (FiberState::Created, FiberState::Ready)
                | (FiberState::Ready, FiberState::Running)
                | (FiberState::Running, FiberState::Suspended(_))
                | (FiberState::Running, FiberState::Finished)
                | (FiberState::Suspended(_), FiberState::Ready)
        )
    }
}

impl fmt::Display for FiberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiberState::Created => write!(f, "created"),
            FiberState::Ready => write!(f, "ready"),
            FiberState::Running => write!(f, "running"),
            FiberState::Suspended(SuspendReason::Yielded) => write!(f, "suspended(yielded)"),
            FiberState::Suspended(SuspendReason::Sleeping) => write!(f, "suspended(sleeping)"),
            FiberState::Suspended(SuspendReason::WaitingJoin) => write!(f, "suspended(join)"),
            FiberState::Finished => write!(f, "finished"),
        }
    }
}

/// Which worker threads may run a fiber
///
/// - `Normal`: freely scheduled across every worker of the scheduler
/// - `StickWithParent`: always runs on the worker its parent ran on when it
///   was spawned, so parent and child never run concurrently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    #[default]
    Normal,
    StickWithParent,
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingPolicy::Normal => write!(f, "NORMAL"),
            SchedulingPolicy::StickWithParent => write!(f, "STICK_WITH_PARENT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(FiberState::Created.can_transition_to(FiberState::Ready));
        assert!(FiberState::Ready.can_transition_to(FiberState::Running));
        assert!(FiberState::Running.can_transition_to(FiberState::Finished));
        assert!(FiberState::Running
            .can_transition_to(FiberState::Suspended(SuspendReason::Sleeping)));
        assert!(FiberState::Suspended(SuspendReason::WaitingJoin)
            .can_transition_to(FiberState::Ready));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!FiberState::Finished.can_transition_to(FiberState::Ready));
        assert!(!FiberState::Finished.can_transition_to(FiberState::Running));
        assert!(!FiberState::Created.can_transition_to(FiberState::Running));
        assert!(!FiberState::Ready.can_transition_to(FiberState::Finished));
        assert!(!FiberState::Suspended(SuspendReason::Yielded)
            .can_transition_to(FiberState::Running));
    }

    #[test]
    fn test_predicates() {
        assert!(FiberState::Ready.is_runnable());
        assert!(!FiberState::Running.is_runnable());
        assert!(FiberState::Finished.is_finished());
        assert!(FiberState::Suspended(SuspendReason::Yielded).is_suspended());
        assert_eq!(
            FiberState::Suspended(SuspendReason::WaitingJoin).to_string(),
            "suspended(join)"
        );
    }

    #[test]
    fn test_policy_default() {
        assert_eq!(SchedulingPolicy::default(), SchedulingPolicy::Normal);
        assert_eq!(SchedulingPolicy::StickWithParent.to_string(), "STICK_WITH_PARENT");
    }
}
