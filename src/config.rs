//! Reporter configuration

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cookie::COOKIE_STORAGE_EXPIRY_MS;
use crate::error::ViewabilityError;
use crate::scroll::{SCROLL_SETTLE_MS, SCROLL_THROTTLE_MS};

/// Collection endpoint for engagement beacons
pub const ENDPOINT_URL: &str = "http://108.128.111.105:5000/harvest";

/// Cookie holding the last unload timestamp
pub const SESSION_COOKIE_TIMESTAMP: &str = "_ybv_sct";

/// Name the adapter is registered under in the host framework
pub const GLOBAL_NAME: &str = "YieldbirdViewability";

/// Adapter code used for registration
pub const ADAPTER_CODE: &str = "yieldbirdViewability";

/// Host analytics adapter type
pub const ANALYTICS_TYPE: &str = "endpoint";

/// Query parameter that asks for debug exposure
pub const DEBUG_QUERY_PARAM: &str = "viewability_debug";

/// Settings for a [`SessionReporter`](crate::reporter::SessionReporter)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    pub endpoint_url: String,
    pub cookie_name: String,
    pub cookie_expiry_ms: i64,
    pub scroll_throttle_ms: i64,
    pub scroll_settle_ms: i64,
    pub global_name: String,
    pub adapter_code: String,
    pub analytics_type: String,
    /// Expose internal state through `SessionReporter::debug_snapshot`
    pub debug: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            endpoint_url: ENDPOINT_URL.to_string(),
            cookie_name: SESSION_COOKIE_TIMESTAMP.to_string(),
            cookie_expiry_ms: COOKIE_STORAGE_EXPIRY_MS,
            scroll_throttle_ms: SCROLL_THROTTLE_MS,
            scroll_settle_ms: SCROLL_SETTLE_MS,
            global_name: GLOBAL_NAME.to_string(),
            adapter_code: ADAPTER_CODE.to_string(),
            analytics_type: ANALYTICS_TYPE.to_string(),
            debug: false,
        }
    }
}

impl ReporterConfig {
    /// Parse and validate a JSON config; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self, ViewabilityError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = endpoint_url.into();
        self
    }

    pub fn validate(&self) -> Result<(), ViewabilityError> {
        let endpoint = Url::parse(&self.endpoint_url)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ViewabilityError::InvalidConfig(format!(
                "endpoint_url must be http(s), got {}",
                endpoint.scheme()
            )));
        }
        if self.cookie_name.is_empty() || self.cookie_name.contains(['=', ';', ' ']) {
            return Err(ViewabilityError::InvalidConfig(format!(
                "cookie_name {:?} is not a valid cookie name",
                self.cookie_name
            )));
        }
        for (name, value) in [
            ("cookie_expiry_ms", self.cookie_expiry_ms),
            ("scroll_throttle_ms", self.scroll_throttle_ms),
            ("scroll_settle_ms", self.scroll_settle_ms),
        ] {
            if value <= 0 {
                return Err(ViewabilityError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Whether a page URL asks for debug exposure (`viewability_debug=true`).
    /// Unparseable URLs never do.
    pub fn debug_requested(page_url: &str) -> bool {
        Url::parse(page_url)
            .map(|url| {
                url.query_pairs()
                    .any(|(key, value)| key == DEBUG_QUERY_PARAM && value == "true")
            })
            .unwrap_or(false)
    }
}
