//! Engagement payload and its wire encoding
//!
//! The payload is built once at unload and sent as an
//! `application/x-www-form-urlencoded` body. Numbers are written the way a
//! browser stringifies them: integral values without a fractional part.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::ViewabilityError;

/// Content type of the beacon body
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Metrics harvested for one page view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPayload {
    /// Page time minus time spent hidden (ms)
    pub active_page_time: i64,
    pub browser_language: String,
    pub url: String,
    /// Settled scroll actions
    pub total_scroll_count: u32,
    /// Assembly time (epoch ms)
    pub timestamp: i64,
    /// Viewport height (px)
    pub site_length: f64,
    /// Cumulative scroll distance (px)
    pub total_scroll_length: f64,
    pub scroll_direction_changes_count: u32,
    /// Time since navigation start (ms)
    pub total_page_time: i64,
    /// Time since the previous page view unloaded (ms), 0 on a first visit
    pub since_last_visit: i64,
}

impl MetricsPayload {
    /// Field name/value pairs in wire order
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("active_page_time", self.active_page_time.to_string()),
            ("browser_language", self.browser_language.clone()),
            ("url", self.url.clone()),
            ("total_scroll_count", self.total_scroll_count.to_string()),
            ("timestamp", self.timestamp.to_string()),
            ("site_length", format_number(self.site_length)),
            ("total_scroll_length", format_number(self.total_scroll_length)),
            (
                "scroll_direction_changes_count",
                self.scroll_direction_changes_count.to_string(),
            ),
            ("total_page_time", self.total_page_time.to_string()),
            ("since_last_visit", self.since_last_visit.to_string()),
        ]
    }

    /// URL-encoded form body
    pub fn to_form_body(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.form_fields() {
            serializer.append_pair(key, &value);
        }
        serializer.finish()
    }

    pub fn to_json(&self) -> Result<String, ViewabilityError> {
        serde_json::to_string(self).map_err(ViewabilityError::JsonError)
    }
}

/// Stringify a pixel value without a trailing `.0` when it is integral
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
