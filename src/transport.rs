//! Beacon transports
//!
//! A beacon is a single fire-and-forget POST. `send_beacon` only reports
//! whether the body was queued; delivery is never confirmed or retried.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::payload::{MetricsPayload, FORM_CONTENT_TYPE};

/// `navigator.sendBeacon` seam
pub trait BeaconTransport: Send + Sync {
    /// Queue `payload` for delivery to `endpoint`. Returns false when the
    /// transport refused to queue it.
    fn send_beacon(&self, endpoint: &str, payload: &MetricsPayload) -> bool;
}

impl<T: BeaconTransport + ?Sized> BeaconTransport for Arc<T> {
    fn send_beacon(&self, endpoint: &str, payload: &MetricsPayload) -> bool {
        (**self).send_beacon(endpoint, payload)
    }
}

/// A beacon as it would go over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Beacon {
    pub endpoint: String,
    pub content_type: String,
    pub body: String,
}

impl Beacon {
    pub fn from_payload(endpoint: &str, payload: &MetricsPayload) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            content_type: FORM_CONTENT_TYPE.to_string(),
            body: payload.to_form_body(),
        }
    }
}

/// Keeps every queued beacon in memory. Clones share the same log.
#[derive(Debug, Clone)]
pub struct RecordingTransport {
    beacons: Arc<Mutex<Vec<Beacon>>>,
    accept: bool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            beacons: Arc::new(Mutex::new(Vec::new())),
            accept: true,
        }
    }

    /// A transport whose queue is always full
    pub fn refusing() -> Self {
        Self {
            accept: false,
            ..Self::new()
        }
    }

    pub fn beacons(&self) -> Vec<Beacon> {
        self.beacons
            .lock()
            .map(|beacons| beacons.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<Beacon> {
        self.beacons().pop()
    }
}

impl BeaconTransport for RecordingTransport {
    fn send_beacon(&self, endpoint: &str, payload: &MetricsPayload) -> bool {
        if !self.accept {
            return false;
        }
        match self.beacons.lock() {
            Ok(mut beacons) => {
                beacons.push(Beacon::from_payload(endpoint, payload));
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(feature = "http")]
pub use http::HttpBeaconTransport;

#[cfg(feature = "http")]
mod http {
    use std::sync::Mutex;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use reqwest::blocking::Client;
    use reqwest::header::CONTENT_TYPE;
    use tracing::{debug, warn};

    use super::BeaconTransport;
    use crate::error::ViewabilityError;
    use crate::payload::{MetricsPayload, FORM_CONTENT_TYPE};

    /// Posts beacons with a blocking reqwest client on detached threads
    pub struct HttpBeaconTransport {
        client: Client,
        in_flight: Mutex<Vec<JoinHandle<()>>>,
    }

    impl HttpBeaconTransport {
        pub fn new(timeout: Duration) -> Result<Self, ViewabilityError> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ViewabilityError::Transport(e.to_string()))?;
            Ok(Self {
                client,
                in_flight: Mutex::new(Vec::new()),
            })
        }

        /// Wait for queued beacons. Only a short-lived process needs this;
        /// a page host lets them finish on their own.
        pub fn flush(&self) {
            let handles = match self.in_flight.lock() {
                Ok(mut handles) => std::mem::take(&mut *handles),
                Err(_) => return,
            };
            for handle in handles {
                let _ = handle.join();
            }
        }
    }

    impl BeaconTransport for HttpBeaconTransport {
        fn send_beacon(&self, endpoint: &str, payload: &MetricsPayload) -> bool {
            let client = self.client.clone();
            let endpoint = endpoint.to_string();
            let body = payload.to_form_body();

            let spawned = thread::Builder::new()
                .name("ybv-beacon".to_string())
                .spawn(move || {
                    let result = client
                        .post(&endpoint)
                        .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                        .body(body)
                        .send();
                    match result {
                        Ok(response) => debug!(status = %response.status(), "beacon delivered"),
                        Err(e) => debug!(error = %e, "beacon lost"),
                    }
                });

            match spawned {
                Ok(handle) => {
                    if let Ok(mut in_flight) = self.in_flight.lock() {
                        in_flight.push(handle);
                    }
                    true
                }
                Err(e) => {
                    warn!(error = %e, "could not queue beacon");
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> MetricsPayload {
        MetricsPayload {
            active_page_time: 10,
            browser_language: "en".to_string(),
            url: "https://example.com/".to_string(),
            total_scroll_count: 0,
            timestamp: 10,
            site_length: 0.0,
            total_scroll_length: 0.0,
            scroll_direction_changes_count: 0,
            total_page_time: 10,
            since_last_visit: 0,
        }
    }

    #[test]
    fn test_recording_transport_shares_log() {
        let transport = RecordingTransport::new();
        let observer = transport.clone();

        assert!(transport.send_beacon("https://collect.example.com/harvest", &payload()));

        let beacon = observer.last().unwrap();
        assert_eq!(beacon.endpoint, "https://collect.example.com/harvest");
        assert_eq!(beacon.content_type, FORM_CONTENT_TYPE);
        assert!(beacon.body.contains("active_page_time=10"));
    }

    #[test]
    fn test_refusing_transport_queues_nothing() {
        let transport = RecordingTransport::refusing();

        assert!(!transport.send_beacon("https://collect.example.com/harvest", &payload()));
        assert!(transport.beacons().is_empty());
    }
}
