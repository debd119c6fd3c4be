//! Offline page-view replay
//!
//! Drives a [`SessionReporter`] through a recorded event log with a manual
//! clock, reproducing what the reporter would have sent for that page view.
//!
//! Pipeline: event log → parse → sort by time → reporter → payload

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::adapter::InMemoryRegistry;
use crate::clock::ManualClock;
use crate::config::ReporterConfig;
use crate::cookie::CookieJar;
use crate::error::ViewabilityError;
use crate::payload::MetricsPayload;
use crate::reporter::{DebugSnapshot, SessionReporter};
use crate::transport::BeaconTransport;
use crate::types::{PageEnvironment, PageEvent, TimedPageEvent};

/// Result of replaying one page view
#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub payload: MetricsPayload,
    /// Set-cookie string written at unload
    pub set_cookie: Option<String>,
    /// Reporter state after unload, when the config enables debug
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugSnapshot>,
}

/// Parse newline-delimited JSON events, skipping blank lines
pub fn parse_ndjson(input: &str) -> Result<Vec<TimedPageEvent>, ViewabilityError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line.trim()).map_err(|e| ViewabilityError::InvalidEvent {
                line: index + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Parse a JSON array of events
pub fn parse_array(input: &str) -> Result<Vec<TimedPageEvent>, ViewabilityError> {
    serde_json::from_str(input)
        .map_err(|e| ViewabilityError::ParseError(format!("Failed to parse event array: {}", e)))
}

/// Replay `events` against a fresh reporter.
///
/// Events are applied in time order (stable for equal timestamps). Events
/// after the first `BeforeUnload` are ignored; a log without one is closed
/// by an implicit unload at its last timestamp.
pub fn replay_session(
    config: ReporterConfig,
    environment: PageEnvironment,
    events: &[TimedPageEvent],
    jar: Box<dyn CookieJar>,
    transport: Box<dyn BeaconTransport>,
) -> Result<ReplayOutcome, ViewabilityError> {
    config.validate()?;
    if events.is_empty() {
        return Err(ViewabilityError::NoEvents);
    }

    let mut ordered: Vec<&TimedPageEvent> = events.iter().collect();
    ordered.sort_by_key(|event| event.at);

    let clock = ManualClock::new(environment.navigation_start_ms);
    let mut registry = InMemoryRegistry::new();
    let mut reporter = SessionReporter::new(
        config,
        environment,
        jar,
        transport,
        Arc::new(clock.clone()),
        &mut registry,
    );
    reporter.enable_analytics();

    let mut payload = None;
    for event in &ordered {
        clock.set(event.at);
        if let Some(sent) = reporter.handle(event.event.clone()) {
            payload = Some(sent);
            break;
        }
    }

    let payload = match payload {
        Some(payload) => payload,
        None => {
            debug!("event log has no unload, closing at last event");
            reporter
                .handle(PageEvent::BeforeUnload)
                .ok_or_else(|| ViewabilityError::ParseError("page view already unloaded".to_string()))?
        }
    };

    Ok(ReplayOutcome {
        payload,
        set_cookie: reporter.cookies().last_write().map(str::to_string),
        debug: reporter.debug_snapshot(),
    })
}
