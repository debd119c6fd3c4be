//! Hidden-time accumulation from document visibility changes

use serde::Serialize;
use tracing::debug;

use crate::types::Visibility;

/// Running hidden-time total for one page view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisibilityAccumulator {
    hidden_since: Option<i64>,
    total_hidden_ms: i64,
}

impl VisibilityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a `visibilitychange` observed at `now_ms`.
    ///
    /// Only a hide followed by a show contributes time; a show with no
    /// recorded hide is a no-op.
    pub fn on_visibility_change(&mut self, visibility: Visibility, now_ms: i64) {
        match visibility {
            Visibility::Hidden => {
                self.hidden_since = Some(now_ms);
            }
            Visibility::Visible => {
                if let Some(since) = self.hidden_since.take() {
                    let hidden = now_ms.saturating_sub(since).max(0);
                    self.total_hidden_ms = self.total_hidden_ms.saturating_add(hidden);
                    debug!(hidden_ms = hidden, total_ms = self.total_hidden_ms, "page visible again");
                }
            }
        }
    }

    pub fn total_hidden_ms(&self) -> i64 {
        self.total_hidden_ms
    }

    pub fn hidden_since(&self) -> Option<i64> {
        self.hidden_since
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden_since.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hide_show_adds_exact_duration() {
        let mut acc = VisibilityAccumulator::new();

        acc.on_visibility_change(Visibility::Hidden, 1_000);
        acc.on_visibility_change(Visibility::Visible, 6_000);

        assert_eq!(acc.total_hidden_ms(), 5_000);
        assert!(!acc.is_hidden());
    }

    #[test]
    fn test_unmatched_hide_contributes_nothing() {
        let mut acc = VisibilityAccumulator::new();

        acc.on_visibility_change(Visibility::Hidden, 1_000);

        assert_eq!(acc.total_hidden_ms(), 0);
        assert_eq!(acc.hidden_since(), Some(1_000));
    }

    #[test]
    fn test_show_without_hide_is_ignored() {
        let mut acc = VisibilityAccumulator::new();

        acc.on_visibility_change(Visibility::Visible, 2_000);
        acc.on_visibility_change(Visibility::Hidden, 3_000);
        acc.on_visibility_change(Visibility::Visible, 3_500);
        acc.on_visibility_change(Visibility::Visible, 9_000);

        assert_eq!(acc.total_hidden_ms(), 500);
    }

    #[test]
    fn test_multiple_hidden_periods_accumulate() {
        let mut acc = VisibilityAccumulator::new();

        for (hide, show) in [(0, 100), (1_000, 1_250), (5_000, 7_000)] {
            acc.on_visibility_change(Visibility::Hidden, hide);
            acc.on_visibility_change(Visibility::Visible, show);
        }

        assert_eq!(acc.total_hidden_ms(), 2_350);
    }
}
