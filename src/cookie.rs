//! Session cookie access
//!
//! [`CookieStore`] reads and writes single named cookies on top of a
//! [`CookieJar`], the crate's stand-in for `document.cookie`: reads return the
//! whole `name=value; name=value` string, writes take one set-cookie string.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::error::ViewabilityError;

/// Cookie lifetime applied on every write (372 days)
pub const COOKIE_STORAGE_EXPIRY_MS: i64 = 32_140_800_000;

const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// A parsed cookie pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub key: String,
    pub value: String,
}

/// Backing store with `document.cookie` semantics
pub trait CookieJar: Send {
    /// All live cookies as `a=1; b=2`
    fn cookie_string(&self, now_ms: i64) -> String;

    /// Apply one set-cookie string such as `a=1;expires=...;`
    fn set_cookie(&mut self, set_cookie: &str, now_ms: i64);
}

/// Reads and writes named cookies with a fixed expiry
pub struct CookieStore {
    jar: Box<dyn CookieJar>,
    clock: Arc<dyn Clock>,
    expiry_ms: i64,
    last_write: Option<String>,
}

impl CookieStore {
    pub fn new(jar: Box<dyn CookieJar>, clock: Arc<dyn Clock>) -> Self {
        Self::with_expiry(jar, clock, COOKIE_STORAGE_EXPIRY_MS)
    }

    pub fn with_expiry(jar: Box<dyn CookieJar>, clock: Arc<dyn Clock>, expiry_ms: i64) -> Self {
        Self {
            jar,
            clock,
            expiry_ms,
            last_write: None,
        }
    }

    /// First cookie whose key equals `name` exactly
    pub fn read(&self, name: &str) -> Option<Cookie> {
        let cookies = self.jar.cookie_string(self.clock.now_ms());
        parse_cookie_string(&cookies)
            .into_iter()
            .find(|cookie| cookie.key == name)
    }

    /// Set `name=value` expiring `expiry_ms` from now, with default path and domain
    pub fn write(&mut self, name: &str, value: &str) {
        let now = self.clock.now_ms();
        let set_cookie = format!(
            "{}={};expires={};",
            name,
            value,
            format_expires(now.saturating_add(self.expiry_ms))
        );
        debug!(cookie = %set_cookie, "writing cookie");
        self.jar.set_cookie(&set_cookie, now);
        self.last_write = Some(set_cookie);
    }

    /// The set-cookie string applied by the latest [`CookieStore::write`]
    pub fn last_write(&self) -> Option<&str> {
        self.last_write.as_deref()
    }

    pub fn jar(&self) -> &dyn CookieJar {
        self.jar.as_ref()
    }
}

/// Split a `document.cookie` string into pairs. Each pair is split on its
/// first `=`; a pair without one becomes a key with an empty value.
pub fn parse_cookie_string(cookies: &str) -> Vec<Cookie> {
    cookies
        .split("; ")
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => Cookie {
                key: key.to_string(),
                value: value.to_string(),
            },
            None => Cookie {
                key: pair.to_string(),
                value: String::new(),
            },
        })
        .collect()
}

/// Format an epoch-millisecond instant as an HTTP cookie date
pub fn format_expires(at_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(at_ms)
        .unwrap_or_default()
        .format(EXPIRES_FORMAT)
        .to_string()
}

fn parse_expires(value: &str) -> Option<i64> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, EXPIRES_FORMAT)
        .map(|naive| naive.and_utc().timestamp_millis())
        .or_else(|_| DateTime::parse_from_rfc2822(value).map(|dt| dt.timestamp_millis()))
        .ok()
}

/// A cookie held by [`MemoryCookieJar`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    /// Expiry in epoch milliseconds; `None` for a browser-session cookie
    pub expires_ms: Option<i64>,
}

impl StoredCookie {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_ms.map_or(true, |expires| expires > now_ms)
    }
}

/// In-memory jar that applies set-cookie strings the way a browser does.
///
/// Cookies are replaced by name, deleted when written with a past expiry and
/// hidden from reads once expired. The jar can be persisted as JSON so
/// separate page views share state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCookieJar {
    cookies: Vec<StoredCookie>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a jar saved with [`MemoryCookieJar::save`]; a missing file is an empty jar
    pub fn load(path: &Path) -> Result<Self, ViewabilityError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ViewabilityError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn cookies(&self) -> &[StoredCookie] {
        &self.cookies
    }

    pub fn get(&self, name: &str, now_ms: i64) -> Option<&StoredCookie> {
        self.cookies
            .iter()
            .find(|cookie| cookie.name == name && cookie.is_live(now_ms))
    }
}

impl CookieJar for MemoryCookieJar {
    fn cookie_string(&self, now_ms: i64) -> String {
        self.cookies
            .iter()
            .filter(|cookie| cookie.is_live(now_ms))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set_cookie(&mut self, set_cookie: &str, now_ms: i64) {
        let mut parts = set_cookie.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let name = name.trim().to_string();
        let value = value.trim().to_string();

        let mut expires_ms = None;
        for attribute in parts {
            let Some((key, attr_value)) = attribute.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "expires" => expires_ms = parse_expires(attr_value).or(expires_ms),
                "max-age" => {
                    if let Ok(seconds) = attr_value.trim().parse::<i64>() {
                        expires_ms = Some(now_ms.saturating_add(seconds.saturating_mul(1_000)));
                    }
                }
                _ => {}
            }
        }

        self.cookies.retain(|cookie| cookie.name != name);
        if expires_ms.map_or(true, |expires| expires > now_ms) {
            self.cookies.push(StoredCookie {
                name,
                value,
                expires_ms,
            });
        }
    }
}

/// Clonable handle to one [`MemoryCookieJar`], so the owner of a reporter
/// can still persist the jar the reporter writes to.
#[derive(Debug, Clone, Default)]
pub struct SharedCookieJar {
    inner: Arc<Mutex<MemoryCookieJar>>,
}

impl SharedCookieJar {
    pub fn new(jar: MemoryCookieJar) -> Self {
        Self {
            inner: Arc::new(Mutex::new(jar)),
        }
    }

    /// Copy of the current jar contents
    pub fn snapshot(&self) -> MemoryCookieJar {
        self.inner
            .lock()
            .map(|jar| jar.clone())
            .unwrap_or_default()
    }
}

impl CookieJar for SharedCookieJar {
    fn cookie_string(&self, now_ms: i64) -> String {
        self.inner
            .lock()
            .map(|jar| jar.cookie_string(now_ms))
            .unwrap_or_default()
    }

    fn set_cookie(&mut self, set_cookie: &str, now_ms: i64) {
        if let Ok(mut jar) = self.inner.lock() {
            jar.set_cookie(set_cookie, now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;

    // 2024-01-15T14:00:00Z
    const NOW: i64 = 1_705_327_200_000;

    fn store_with_clock() -> (CookieStore, ManualClock) {
        let clock = ManualClock::new(NOW);
        let store = CookieStore::new(Box::new(MemoryCookieJar::new()), Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let (mut store, _) = store_with_clock();

        store.write("_ybv_sct", "1705327200000");

        assert_eq!(
            store.read("_ybv_sct"),
            Some(Cookie {
                key: "_ybv_sct".to_string(),
                value: "1705327200000".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_cookie_is_none() {
        let (store, _) = store_with_clock();
        assert_eq!(store.read("_ybv_sct"), None);
    }

    #[test]
    fn test_cookie_expires_after_372_days() {
        let (mut store, clock) = store_with_clock();
        store.write("_ybv_sct", "1");

        clock.advance(COOKIE_STORAGE_EXPIRY_MS - 1_000);
        assert!(store.read("_ybv_sct").is_some());

        clock.advance(1_000);
        assert_eq!(store.read("_ybv_sct"), None);
    }

    #[test]
    fn test_write_replaces_existing_value() {
        let (mut store, clock) = store_with_clock();
        store.write("_ybv_sct", "1");
        clock.advance(60_000);
        store.write("_ybv_sct", "2");

        assert_eq!(store.read("_ybv_sct").unwrap().value, "2");
        assert_eq!(store.jar().cookie_string(clock.now_ms()), "_ybv_sct=2");
        assert_eq!(
            store.last_write(),
            Some("_ybv_sct=2;expires=Tue, 21 Jan 2025 14:01:00 GMT;")
        );
    }

    #[test]
    fn test_read_requires_exact_key() {
        let cookies = parse_cookie_string("_ybv_sct_old=5; _ybv_sct=7; other=x=y; flag");

        assert_eq!(cookies.len(), 4);
        assert_eq!(cookies[1].value, "7");
        assert_eq!(cookies[2].value, "x=y");
        assert_eq!(cookies[3].key, "flag");
        assert!(parse_cookie_string("").is_empty());
    }

    #[test]
    fn test_format_expires_is_http_date() {
        assert_eq!(format_expires(NOW), "Mon, 15 Jan 2024 14:00:00 GMT");
        assert_eq!(parse_expires("Mon, 15 Jan 2024 14:00:00 GMT"), Some(NOW));
    }

    #[test]
    fn test_jar_deletes_on_past_expiry() {
        let mut jar = MemoryCookieJar::new();
        jar.set_cookie("a=1;expires=Mon, 15 Jan 2024 15:00:00 GMT;", NOW);
        jar.set_cookie("b=2;max-age=60", NOW);
        assert_eq!(jar.cookie_string(NOW), "a=1; b=2");

        jar.set_cookie("a=;expires=Thu, 01 Jan 1970 00:00:00 GMT;", NOW);
        assert_eq!(jar.cookie_string(NOW), "b=2");
        assert_eq!(jar.cookie_string(NOW + 61_000), "");
    }

    #[test]
    fn test_jar_max_age_saturates() {
        let mut jar = MemoryCookieJar::new();
        jar.set_cookie(&format!("forever=1; max-age={}", i64::MAX), NOW);
        jar.set_cookie(&format!("never=1; max-age={}", i64::MIN), NOW);

        assert_eq!(jar.get("forever", NOW).unwrap().expires_ms, Some(i64::MAX));
        assert_eq!(jar.cookie_string(NOW), "forever=1");
    }

    #[test]
    fn test_jar_ignores_malformed_set_cookie() {
        let mut jar = MemoryCookieJar::new();
        jar.set_cookie("no-equals-sign", NOW);
        assert!(jar.cookies().is_empty());
    }

    #[test]
    fn test_shared_jar_sees_store_writes() {
        let clock = ManualClock::new(NOW);
        let shared = SharedCookieJar::default();
        let mut store = CookieStore::new(Box::new(shared.clone()), Arc::new(clock));

        store.write("_ybv_sct", "99");

        assert_eq!(shared.snapshot().get("_ybv_sct", NOW).unwrap().value, "99");
    }

    #[test]
    fn test_jar_json_persistence() {
        let mut jar = MemoryCookieJar::new();
        jar.set_cookie("_ybv_sct=42;", NOW);

        let json = serde_json::to_string(&jar).unwrap();
        let restored: MemoryCookieJar = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.get("_ybv_sct", NOW).map(|c| c.value.as_str()), Some("42"));
    }
}
