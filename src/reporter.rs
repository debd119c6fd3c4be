//! Session reporter orchestration
//!
//! The reporter owns every tracker for one page view. The bootstrap creates it
//! once when the page loads, feeds it page events for the page's lifetime and
//! lets the `BeforeUnload` event stamp the session cookie and send the beacon.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterRegistration, AdapterRegistry};
use crate::clock::Clock;
use crate::config::ReporterConfig;
use crate::cookie::{CookieJar, CookieStore};
use crate::payload::MetricsPayload;
use crate::scroll::ScrollTracker;
use crate::transport::BeaconTransport;
use crate::types::{PageEnvironment, PageEvent};
use crate::visibility::VisibilityAccumulator;

/// Engagement reporter for a single page view
pub struct SessionReporter {
    config: ReporterConfig,
    environment: PageEnvironment,
    cookies: CookieStore,
    scroll: ScrollTracker,
    visibility: VisibilityAccumulator,
    transport: Box<dyn BeaconTransport>,
    clock: Arc<dyn Clock>,
    registration: AdapterRegistration,
    previous_visit_ms: Option<i64>,
    enabled: bool,
    unloaded: bool,
}

/// Full internal state, exposed only in debug mode
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    pub config: ReporterConfig,
    pub environment: PageEnvironment,
    pub registration: AdapterRegistration,
    pub scroll: ScrollTracker,
    pub visibility: VisibilityAccumulator,
    pub previous_visit_ms: Option<i64>,
    pub enabled: bool,
    pub unloaded: bool,
    pub payload: MetricsPayload,
}

impl SessionReporter {
    /// Wire a reporter for the page described by `environment` and register
    /// it with the host framework.
    ///
    /// The previous session marker is read here, before this page view
    /// overwrites it at unload.
    pub fn new(
        config: ReporterConfig,
        environment: PageEnvironment,
        jar: Box<dyn CookieJar>,
        transport: Box<dyn BeaconTransport>,
        clock: Arc<dyn Clock>,
        registry: &mut dyn AdapterRegistry,
    ) -> Self {
        let cookies = CookieStore::with_expiry(jar, Arc::clone(&clock), config.cookie_expiry_ms);
        let previous_visit_ms = read_session_marker(&cookies, &config.cookie_name);
        let scroll = ScrollTracker::with_timing(config.scroll_throttle_ms, config.scroll_settle_ms);
        let registration = AdapterRegistration::from_config(&config);

        registry.register_analytics_adapter(registration.clone());

        Self {
            config,
            environment,
            cookies,
            scroll,
            visibility: VisibilityAccumulator::new(),
            transport,
            clock,
            registration,
            previous_visit_ms,
            enabled: false,
            unloaded: false,
        }
    }

    /// Called by the host framework when analytics are switched on
    pub fn enable_analytics(&mut self) {
        self.enabled = true;
        info!("Yieldbird Analytics is ready");
    }

    /// Dispatch a page event at the current clock time.
    ///
    /// Returns the sent payload for the first `BeforeUnload`, `None` otherwise.
    pub fn handle(&mut self, event: PageEvent) -> Option<MetricsPayload> {
        let now = self.clock.now_ms();
        self.scroll.advance(now);

        match event {
            PageEvent::Scroll(sample) => {
                if self.scroll.on_scroll(sample, now) {
                    debug!(offset = sample.offset(), "scroll sample accepted");
                }
                None
            }
            PageEvent::VisibilityChange { visibility } => {
                self.visibility.on_visibility_change(visibility, now);
                None
            }
            PageEvent::Resize(geometry) => {
                self.environment.geometry = geometry;
                None
            }
            PageEvent::BeforeUnload => self.on_before_unload(),
        }
    }

    /// Fire timers that are due at the current clock time
    pub fn advance(&mut self) {
        let now = self.clock.now_ms();
        self.scroll.advance(now);
    }

    /// Stamp the session cookie, then assemble and send the payload.
    ///
    /// Runs once; later calls are ignored. A refused beacon is logged, never
    /// surfaced to the page.
    pub fn on_before_unload(&mut self) -> Option<MetricsPayload> {
        if self.unloaded {
            debug!("unload already handled");
            return None;
        }
        self.unloaded = true;

        let now = self.clock.now_ms();
        self.scroll.advance(now);
        self.cookies.write(&self.config.cookie_name, &now.to_string());

        let payload = self.data();
        if self.transport.send_beacon(&self.config.endpoint_url, &payload) {
            info!(
                endpoint = %self.config.endpoint_url,
                active_page_time = payload.active_page_time,
                "engagement beacon queued"
            );
        } else {
            warn!(endpoint = %self.config.endpoint_url, "engagement beacon was not queued");
        }
        Some(payload)
    }

    /// Assemble the metrics payload at the current clock time
    pub fn data(&self) -> MetricsPayload {
        let time = self.clock.now_ms();
        let page_time = time.saturating_sub(self.environment.navigation_start_ms);

        MetricsPayload {
            active_page_time: page_time.saturating_sub(self.visibility.total_hidden_ms()),
            browser_language: self.environment.browser_language().to_string(),
            url: self.environment.url.clone(),
            total_scroll_count: self.scroll.total_scroll_count(),
            timestamp: time,
            site_length: self.environment.geometry.site_length(),
            total_scroll_length: self.scroll.total_scroll_length(),
            scroll_direction_changes_count: self.scroll.scroll_direction_changes_count(),
            total_page_time: page_time,
            since_last_visit: self
                .previous_visit_ms
                .map_or(0, |previous| time.saturating_sub(previous)),
        }
    }

    /// Internal state for inspection; `None` unless `config.debug` is set
    pub fn debug_snapshot(&self) -> Option<DebugSnapshot> {
        if !self.config.debug {
            return None;
        }
        Some(DebugSnapshot {
            config: self.config.clone(),
            environment: self.environment.clone(),
            registration: self.registration.clone(),
            scroll: self.scroll.clone(),
            visibility: self.visibility.clone(),
            previous_visit_ms: self.previous_visit_ms,
            enabled: self.enabled,
            unloaded: self.unloaded,
            payload: self.data(),
        })
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    pub fn environment(&self) -> &PageEnvironment {
        &self.environment
    }

    pub fn registration(&self) -> &AdapterRegistration {
        &self.registration
    }

    pub fn scroll(&self) -> &ScrollTracker {
        &self.scroll
    }

    pub fn visibility(&self) -> &VisibilityAccumulator {
        &self.visibility
    }

    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    pub fn previous_visit_ms(&self) -> Option<i64> {
        self.previous_visit_ms
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }
}

fn read_session_marker(cookies: &CookieStore, name: &str) -> Option<i64> {
    let cookie = cookies.read(name)?;
    match cookie.value.parse::<i64>() {
        Ok(timestamp) => Some(timestamp),
        Err(_) => {
            warn!(cookie = name, value = %cookie.value, "ignoring unreadable session marker");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryRegistry;
    use crate::clock::ManualClock;
    use crate::cookie::MemoryCookieJar;
    use crate::transport::RecordingTransport;
    use crate::types::{PageGeometry, ScrollSample, Visibility};
    use pretty_assertions::assert_eq;

    // 2024-01-15T14:00:00Z
    const NAV_START: i64 = 1_705_327_200_000;

    struct Harness {
        reporter: SessionReporter,
        clock: ManualClock,
        transport: RecordingTransport,
        registry: InMemoryRegistry,
    }

    fn environment() -> PageEnvironment {
        PageEnvironment::new("https://news.example.com/article/42", "pl-PL", NAV_START).with_geometry(
            PageGeometry {
                body_scroll_height: 4_000.0,
                document_client_height: 780.0,
                document_scroll_height: 4_010.0,
                window_inner_height: Some(800.0),
                ..PageGeometry::default()
            },
        )
    }

    fn harness_with_jar(jar: MemoryCookieJar, config: ReporterConfig) -> Harness {
        let clock = ManualClock::new(NAV_START + 200);
        let transport = RecordingTransport::new();
        let mut registry = InMemoryRegistry::new();
        let reporter = SessionReporter::new(
            config,
            environment(),
            Box::new(jar),
            Box::new(transport.clone()),
            Arc::new(clock.clone()),
            &mut registry,
        );
        Harness {
            reporter,
            clock,
            transport,
            registry,
        }
    }

    fn harness() -> Harness {
        harness_with_jar(MemoryCookieJar::new(), ReporterConfig::default())
    }

    impl Harness {
        fn at(&mut self, offset_ms: i64, event: PageEvent) -> Option<MetricsPayload> {
            self.clock.set(NAV_START + offset_ms);
            self.reporter.handle(event)
        }
    }

    #[test]
    fn test_construction_registers_adapter() {
        let h = harness();

        let registration = h.registry.get("yieldbirdViewability").unwrap();
        assert_eq!(registration.adapter.global, "YieldbirdViewability");
        assert_eq!(registration.adapter.analytics_type, "endpoint");
        assert!(!h.reporter.is_enabled());
    }

    #[test]
    fn test_enable_analytics() {
        let mut h = harness();
        h.reporter.enable_analytics();
        assert!(h.reporter.is_enabled());
    }

    #[test]
    fn test_end_to_end_scroll_hide_unload() {
        let mut h = harness();

        h.at(1_000, PageEvent::Scroll(ScrollSample::at(500.0)));
        h.at(1_400, PageEvent::Scroll(ScrollSample::at(300.0)));
        // quiet for more than the settle period
        h.at(
            3_000,
            PageEvent::VisibilityChange {
                visibility: Visibility::Hidden,
            },
        );
        h.at(
            8_000,
            PageEvent::VisibilityChange {
                visibility: Visibility::Visible,
            },
        );
        let payload = h.at(12_000, PageEvent::BeforeUnload).unwrap();

        assert_eq!(
            payload,
            MetricsPayload {
                active_page_time: 7_000,
                browser_language: "pl-PL".to_string(),
                url: "https://news.example.com/article/42".to_string(),
                total_scroll_count: 1,
                timestamp: NAV_START + 12_000,
                site_length: 800.0,
                total_scroll_length: 700.0,
                scroll_direction_changes_count: 1,
                total_page_time: 12_000,
                since_last_visit: 0,
            }
        );

        let cookie = h.reporter.cookies().read("_ybv_sct").unwrap();
        assert_eq!(cookie.value, (NAV_START + 12_000).to_string());

        let beacon = h.transport.last().unwrap();
        assert_eq!(beacon.endpoint, "http://108.128.111.105:5000/harvest");
        assert_eq!(beacon.body, payload.to_form_body());
    }

    #[test]
    fn test_since_last_visit_uses_previous_marker() {
        let mut jar = MemoryCookieJar::new();
        let previous = NAV_START - 3_600_000;
        jar.set_cookie(&format!("_ybv_sct={previous};"), NAV_START);

        let mut h = harness_with_jar(jar, ReporterConfig::default());
        assert_eq!(h.reporter.previous_visit_ms(), Some(previous));

        let payload = h.at(10_000, PageEvent::BeforeUnload).unwrap();
        assert_eq!(payload.since_last_visit, 3_610_000);
    }

    #[test]
    fn test_unreadable_marker_counts_as_first_visit() {
        let mut jar = MemoryCookieJar::new();
        jar.set_cookie("_ybv_sct=garbage;", NAV_START);

        let mut h = harness_with_jar(jar, ReporterConfig::default());
        let payload = h.at(5_000, PageEvent::BeforeUnload).unwrap();

        assert_eq!(payload.since_last_visit, 0);
    }

    #[test]
    fn test_out_of_range_marker_saturates() {
        let mut jar = MemoryCookieJar::new();
        jar.set_cookie(&format!("_ybv_sct={};", i64::MIN), NAV_START);

        let mut h = harness_with_jar(jar, ReporterConfig::default());
        assert_eq!(h.reporter.previous_visit_ms(), Some(i64::MIN));

        let payload = h.at(5_000, PageEvent::BeforeUnload).unwrap();
        assert_eq!(payload.since_last_visit, i64::MAX);
        assert_eq!(payload.total_page_time, 5_000);
        assert_eq!(h.transport.beacons().len(), 1);
    }

    #[test]
    fn test_unload_runs_once() {
        let mut h = harness();

        assert!(h.at(5_000, PageEvent::BeforeUnload).is_some());
        assert!(h.at(6_000, PageEvent::BeforeUnload).is_none());
        assert_eq!(h.transport.beacons().len(), 1);
        assert!(h.reporter.is_unloaded());
    }

    #[test]
    fn test_refused_beacon_is_swallowed() {
        let clock = ManualClock::new(NAV_START);
        let mut registry = InMemoryRegistry::new();
        let mut reporter = SessionReporter::new(
            ReporterConfig::default(),
            environment(),
            Box::new(MemoryCookieJar::new()),
            Box::new(RecordingTransport::refusing()),
            Arc::new(clock.clone()),
            &mut registry,
        );

        clock.advance(2_000);
        let payload = reporter.handle(PageEvent::BeforeUnload).unwrap();

        assert_eq!(payload.total_page_time, 2_000);
        assert!(reporter.cookies().read("_ybv_sct").is_some());
    }

    #[test]
    fn test_hidden_at_unload_is_not_subtracted() {
        let mut h = harness();

        h.at(
            1_000,
            PageEvent::VisibilityChange {
                visibility: Visibility::Hidden,
            },
        );
        let payload = h.at(4_000, PageEvent::BeforeUnload).unwrap();

        assert_eq!(payload.active_page_time, 4_000);
    }

    #[test]
    fn test_resize_updates_site_length() {
        let mut h = harness();

        h.at(
            500,
            PageEvent::Resize(PageGeometry {
                document_client_height: 1_024.0,
                window_inner_height: Some(1_000.0),
                ..PageGeometry::default()
            }),
        );

        assert_eq!(h.reporter.data().site_length, 1_024.0);
    }

    #[test]
    fn test_settle_timer_fires_before_unload_payload() {
        let mut h = harness();

        h.at(1_000, PageEvent::Scroll(ScrollSample::at(250.0)));
        // unload lands after the settle deadline with no event in between
        let payload = h.at(2_500, PageEvent::BeforeUnload).unwrap();

        assert_eq!(payload.total_scroll_count, 1);
    }

    #[test]
    fn test_debug_snapshot_gated_by_config() {
        let h = harness();
        assert!(h.reporter.debug_snapshot().is_none());

        let mut h = harness_with_jar(MemoryCookieJar::new(), ReporterConfig::default().with_debug(true));
        h.at(700, PageEvent::Scroll(ScrollSample::at(120.0)));

        let snapshot = h.reporter.debug_snapshot().unwrap();
        assert_eq!(snapshot.scroll.total_scroll_length(), 120.0);
        assert!(!snapshot.unloaded);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["registration"]["code"], "yieldbirdViewability");
        assert_eq!(json["scroll"]["state"]["latest_scroll_y"], 120.0);
    }
}
