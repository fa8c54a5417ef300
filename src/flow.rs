//! # Capability-based error classification.
//!
//! Control loops in this crate never branch on a concrete error type. Every
//! error that crosses a loop boundary implements [`FlowControl`], and the
//! loop asks three questions:
//!
//! - [`can_skip`](FlowControl::can_skip): non-fatal, drop it and continue;
//! - [`should_log`](FlowControl::should_log): worth recording even when
//!   skipped;
//! - [`should_retry`](FlowControl::should_retry): transient resource
//!   exhaustion, try again after a short delay.
//!
//! All three default to `false`, so an error advertises only the
//! capabilities it opts into and everything else is treated as fatal. New
//! error kinds plug into existing loops without changing them.

/// Flow-control capabilities advertised by an error.
///
/// # Example
/// ```
/// use thermolink::FlowControl;
///
/// #[derive(Debug)]
/// struct QueueFull;
///
/// impl FlowControl for QueueFull {
///     fn should_retry(&self) -> bool {
///         true
///     }
/// }
///
/// assert!(QueueFull.should_retry());
/// assert!(!QueueFull.can_skip());
/// ```
pub trait FlowControl {
    /// Returns `true` when the error is non-fatal and processing may
    /// continue without it.
    fn can_skip(&self) -> bool {
        false
    }

    /// Returns `true` when the error is worth recording even if skipped.
    fn should_log(&self) -> bool {
        false
    }

    /// Returns `true` when the failed operation should be retried after a
    /// short delay.
    fn should_retry(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Opaque;

    impl FlowControl for Opaque {}

    struct Anomaly;

    impl FlowControl for Anomaly {
        fn can_skip(&self) -> bool {
            true
        }

        fn should_log(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_capabilities_default_to_false() {
        assert!(!Opaque.can_skip());
        assert!(!Opaque.should_log());
        assert!(!Opaque.should_retry());
    }

    #[test]
    fn test_overrides_are_independent() {
        assert!(Anomaly.can_skip());
        assert!(Anomaly.should_log());
        assert!(!Anomaly.should_retry());
    }
}
