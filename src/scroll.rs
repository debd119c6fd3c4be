//! Scroll tracking
//!
//! Accepted samples pass a throttle gate first. Each accepted sample rearms a
//! settle timer; a scroll "action" is counted only when that timer fires, so
//! the count measures settled scrolls rather than raw scroll ticks.

use serde::Serialize;
use tracing::debug;

use crate::timer::{SettleTimer, Throttle};
use crate::types::{ScrollDirection, ScrollSample};

/// Minimum spacing between handled scroll samples
pub const SCROLL_THROTTLE_MS: i64 = 300;

/// Quiet period after which a scroll counts as settled
pub const SCROLL_SETTLE_MS: i64 = 900;

/// Accumulated scroll counters for one page view
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScrollState {
    pub latest_scroll_y: f64,
    pub total_scroll_distance: f64,
    pub scroll_event_count: u32,
    pub direction_change_count: u32,
    pub current_direction: Option<ScrollDirection>,
}

/// Scroll accumulator fed by throttled scroll samples
#[derive(Debug, Clone, Serialize)]
pub struct ScrollTracker {
    state: ScrollState,
    throttle: Throttle,
    settle: SettleTimer,
}

impl Default for ScrollTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollTracker {
    pub fn new() -> Self {
        Self::with_timing(SCROLL_THROTTLE_MS, SCROLL_SETTLE_MS)
    }

    pub fn with_timing(throttle_ms: i64, settle_ms: i64) -> Self {
        Self {
            state: ScrollState::default(),
            throttle: Throttle::new(throttle_ms),
            settle: SettleTimer::new(settle_ms),
        }
    }

    /// Handle a dispatched scroll event. Returns false when the throttle
    /// dropped it.
    pub fn on_scroll(&mut self, sample: ScrollSample, now_ms: i64) -> bool {
        self.advance(now_ms);
        if !self.throttle.try_pass(now_ms) {
            return false;
        }
        self.record(sample.offset(), now_ms);
        true
    }

    /// Fire the settle timer if it is due at `now_ms`
    pub fn advance(&mut self, now_ms: i64) {
        if self.settle.poll(now_ms) {
            self.state.scroll_event_count += 1;
            debug!(count = self.state.scroll_event_count, "scroll settled");
        }
    }

    fn record(&mut self, current: f64, now_ms: i64) {
        self.settle.reset(now_ms);

        let previous = self.state.latest_scroll_y;
        let direction = if previous - current > 0.0 {
            ScrollDirection::Up
        } else {
            ScrollDirection::Down
        };

        if self.state.current_direction != Some(direction) {
            if self.state.current_direction.is_some() {
                self.state.direction_change_count += 1;
            }
            self.state.current_direction = Some(direction);
        }

        self.state.total_scroll_distance += (previous - current).abs();
        self.state.latest_scroll_y = current;
    }

    pub fn state(&self) -> &ScrollState {
        &self.state
    }

    pub fn current_scroll_height(&self) -> f64 {
        self.state.latest_scroll_y
    }

    pub fn total_scroll_length(&self) -> f64 {
        self.state.total_scroll_distance
    }

    pub fn total_scroll_count(&self) -> u32 {
        self.state.scroll_event_count
    }

    pub fn scroll_direction_changes_count(&self) -> u32 {
        self.state.direction_change_count
    }
}
