//! Yieldbird Viewability - page-engagement analytics adapter
//!
//! Measures how a visitor engages with a page (scroll distance, settled scroll
//! actions, direction changes, hidden-tab time, time since the previous visit)
//! and sends one best-effort beacon when the page unloads.
//!
//! The page is modeled as a stream of [`PageEvent`]s delivered by whatever
//! hosts the integration. Time, cookie storage, beacon transport and the host
//! framework's adapter registry are traits, so the same [`SessionReporter`]
//! runs inside a webview shell (via [`ffi`]), in the `ybv` replay CLI and in
//! tests.
//!
//! ## Modules
//!
//! - **Trackers**: [`scroll`] and [`visibility`] accumulate engagement signals
//! - **Session**: [`cookie`] keeps the previous-visit marker, [`reporter`]
//!   orchestrates a page view and sends the [`payload`]
//! - **Replay**: [`replay`] drives a reporter from a recorded event log

pub mod adapter;
pub mod clock;
pub mod config;
pub mod cookie;
pub mod error;
pub mod payload;
pub mod replay;
pub mod reporter;
pub mod scroll;
pub mod timer;
pub mod transport;
pub mod types;
pub mod visibility;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use adapter::{AdapterRegistration, AdapterRegistry, AnalyticsAdapter, InMemoryRegistry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ReporterConfig;
pub use cookie::{Cookie, CookieJar, CookieStore, MemoryCookieJar, SharedCookieJar};
pub use error::ViewabilityError;
pub use payload::MetricsPayload;
pub use replay::{replay_session, ReplayOutcome};
pub use reporter::{DebugSnapshot, SessionReporter};
pub use scroll::ScrollTracker;
pub use transport::{Beacon, BeaconTransport, RecordingTransport};
pub use types::{PageEnvironment, PageEvent, PageGeometry, ScrollSample, TimedPageEvent, Visibility};
pub use visibility::VisibilityAccumulator;

#[cfg(feature = "http")]
pub use transport::HttpBeaconTransport;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
