//! Page event and environment types
//!
//! The browser is modeled as a stream of typed events delivered by whatever
//! process hosts the page integration. Each event carries only what the
//! trackers read from the DOM at that moment.

use serde::{Deserialize, Serialize};

/// Document visibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Vertical scroll direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Scroll position read when a scroll event is dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollSample {
    /// `window.scrollY`
    #[serde(default)]
    pub scroll_y: f64,
    /// `document.documentElement.scrollTop`, used when `scroll_y` is zero
    #[serde(default)]
    pub scroll_top: f64,
}

impl ScrollSample {
    pub fn at(offset: f64) -> Self {
        Self {
            scroll_y: offset,
            scroll_top: 0.0,
        }
    }

    /// Effective vertical offset of the page
    pub fn offset(&self) -> f64 {
        if self.scroll_y != 0.0 {
            self.scroll_y
        } else {
            self.scroll_top
        }
    }
}

/// Document and viewport heights in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageGeometry {
    pub body_scroll_height: f64,
    pub body_offset_height: f64,
    pub document_client_height: f64,
    pub document_scroll_height: f64,
    pub document_offset_height: f64,
    /// `window.innerHeight`, absent in some embedded contexts
    pub window_inner_height: Option<f64>,
}

impl PageGeometry {
    /// Visible viewport height
    pub fn site_length(&self) -> f64 {
        self.document_client_height
            .max(self.window_inner_height.unwrap_or(0.0))
    }

    /// Full scrollable document height
    pub fn max_scroll_length(&self) -> f64 {
        [
            self.body_scroll_height,
            self.body_offset_height,
            self.document_client_height,
            self.document_scroll_height,
            self.document_offset_height,
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }
}

/// Ambient browser values captured when the page integration boots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEnvironment {
    /// `window.location.href`
    pub url: String,
    /// `navigator.language`
    #[serde(default)]
    pub language: String,
    /// Legacy `navigator.userLanguage`, preferred when present
    #[serde(default)]
    pub user_language: Option<String>,
    /// `performance.timing.navigationStart` in epoch milliseconds
    pub navigation_start_ms: i64,
    #[serde(default)]
    pub geometry: PageGeometry,
}

impl PageEnvironment {
    pub fn new(url: impl Into<String>, language: impl Into<String>, navigation_start_ms: i64) -> Self {
        Self {
            url: url.into(),
            language: language.into(),
            user_language: None,
            navigation_start_ms,
            geometry: PageGeometry::default(),
        }
    }

    pub fn with_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn browser_language(&self) -> &str {
        self.user_language.as_deref().unwrap_or(&self.language)
    }
}

/// A page lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEvent {
    /// `scroll` on the window
    Scroll(ScrollSample),
    /// `visibilitychange` on the document
    VisibilityChange { visibility: Visibility },
    /// Layout change; replaces the current geometry
    Resize(PageGeometry),
    /// `beforeunload` on the window
    BeforeUnload,
}

/// A page event stamped with its dispatch time (epoch milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedPageEvent {
    pub at: i64,
    #[serde(flatten)]
    pub event: PageEvent,
}

impl TimedPageEvent {
    pub fn new(at: i64, event: PageEvent) -> Self {
        Self { at, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scroll_offset_falls_back_to_scroll_top() {
        let sample = ScrollSample {
            scroll_y: 0.0,
            scroll_top: 120.0,
        };
        assert_eq!(sample.offset(), 120.0);
        assert_eq!(ScrollSample::at(40.0).offset(), 40.0);
    }

    #[test]
    fn test_geometry_heights() {
        let geometry = PageGeometry {
            body_scroll_height: 3_200.0,
            body_offset_height: 3_150.0,
            document_client_height: 760.0,
            document_scroll_height: 3_210.0,
            document_offset_height: 3_100.0,
            window_inner_height: Some(800.0),
        };

        assert_eq!(geometry.site_length(), 800.0);
        assert_eq!(geometry.max_scroll_length(), 3_210.0);

        let no_window = PageGeometry {
            window_inner_height: None,
            ..geometry
        };
        assert_eq!(no_window.site_length(), 760.0);
    }

    #[test]
    fn test_browser_language_prefers_user_language() {
        let mut env = PageEnvironment::new("https://example.com/", "en-US", 0);
        assert_eq!(env.browser_language(), "en-US");

        env.user_language = Some("pl".to_string());
        assert_eq!(env.browser_language(), "pl");
    }

    #[test]
    fn test_timed_event_json_shape() {
        let json = r#"{"at": 1500, "type": "scroll", "scroll_y": 500}"#;
        let event: TimedPageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, TimedPageEvent::new(1_500, PageEvent::Scroll(ScrollSample::at(500.0))));

        let json = r#"{"at": 2000, "type": "visibility_change", "visibility": "hidden"}"#;
        let event: TimedPageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event.event,
            PageEvent::VisibilityChange {
                visibility: Visibility::Hidden
            }
        );

        let json = r#"{"at": 9000, "type": "before_unload"}"#;
        let event: TimedPageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event, PageEvent::BeforeUnload);
    }
}
