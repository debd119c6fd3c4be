//! Deadline-based throttle and settle timers
//!
//! There is no event loop to schedule callbacks on, so both timers are plain
//! deadlines compared against the caller's clock. A timer "fires" when it is
//! polled at or after its deadline.

use serde::Serialize;

/// Rate limiter that lets a call through at most once per `limit_ms`.
///
/// The gate closes when a call passes and reopens `limit_ms` later; calls
/// arriving while it is closed are dropped, not deferred.
#[derive(Debug, Clone, Serialize)]
pub struct Throttle {
    limit_ms: i64,
    reopens_at: Option<i64>,
}

impl Throttle {
    pub fn new(limit_ms: i64) -> Self {
        Self {
            limit_ms,
            reopens_at: None,
        }
    }

    /// Returns true when the call at `now_ms` may proceed
    pub fn try_pass(&mut self, now_ms: i64) -> bool {
        if let Some(reopens_at) = self.reopens_at {
            if now_ms < reopens_at {
                return false;
            }
        }
        self.reopens_at = Some(now_ms.saturating_add(self.limit_ms));
        true
    }
}

/// Debounce timer: fires once after `delay_ms` with no further resets.
#[derive(Debug, Clone, Serialize)]
pub struct SettleTimer {
    delay_ms: i64,
    deadline: Option<i64>,
}

impl SettleTimer {
    pub fn new(delay_ms: i64) -> Self {
        Self {
            delay_ms,
            deadline: None,
        }
    }

    /// Cancel any pending deadline and start a new one from `now_ms`
    pub fn reset(&mut self, now_ms: i64) {
        self.deadline = Some(now_ms.saturating_add(self.delay_ms));
    }

    /// Fire the timer if its deadline has passed. Returns true exactly once
    /// per armed deadline.
    pub fn poll(&mut self, now_ms: i64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_drops_calls_inside_window() {
        let mut throttle = Throttle::new(300);

        assert!(throttle.try_pass(0));
        assert!(!throttle.try_pass(100));
        assert!(!throttle.try_pass(299));
        assert!(throttle.try_pass(300));
        assert!(!throttle.try_pass(450));
        assert!(throttle.try_pass(1_000));
    }

    #[test]
    fn test_settle_timer_fires_once_after_quiet_period() {
        let mut timer = SettleTimer::new(900);
        assert!(!timer.poll(10_000));

        timer.reset(0);
        assert!(timer.is_pending());
        assert!(!timer.poll(899));
        assert!(timer.poll(900));
        assert!(!timer.poll(2_000));
        assert!(!timer.is_pending());
    }

    #[test]
    fn test_settle_timer_reset_pushes_deadline() {
        let mut timer = SettleTimer::new(900);

        timer.reset(0);
        timer.reset(600);
        assert!(!timer.poll(1_000));
        assert!(timer.poll(1_500));
    }

    #[test]
    fn test_deadlines_saturate_at_end_of_time() {
        let mut throttle = Throttle::new(300);
        assert!(throttle.try_pass(i64::MAX - 10));
        assert!(!throttle.try_pass(i64::MAX));

        let mut timer = SettleTimer::new(900);
        timer.reset(i64::MAX - 10);
        assert!(!timer.poll(i64::MAX - 1));
        assert!(timer.poll(i64::MAX));
    }
}
