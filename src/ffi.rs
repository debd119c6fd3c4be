//! FFI bindings for Yieldbird Viewability
//!
//! This module lets a native page host (a webview shell, a wasm shim) drive a
//! reporter through C-compatible functions. The host owns the real cookie
//! store and network: it seeds the reporter with its `document.cookie` string,
//! forwards page events, and on unload receives the set-cookie string and the
//! beacon body to apply and send itself.
//!
//! All strings are null-terminated UTF-8. Returned strings are allocated and
//! must be freed with `ybv_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use serde::Serialize;

use crate::adapter::{AdapterRegistration, AdapterRegistry};
use crate::clock::ManualClock;
use crate::config::ReporterConfig;
use crate::cookie::{parse_cookie_string, CookieJar, MemoryCookieJar};
use crate::reporter::SessionReporter;
use crate::transport::{Beacon, RecordingTransport};
use crate::types::{PageEnvironment, PageEvent, TimedPageEvent};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn json_to_cstr<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Registration is recorded on the handle so the host can read it back
struct HandleRegistry<'a>(&'a mut Option<AdapterRegistration>);

impl AdapterRegistry for HandleRegistry<'_> {
    fn register_analytics_adapter(&mut self, registration: AdapterRegistration) {
        *self.0 = Some(registration);
    }
}

/// Opaque handle to a SessionReporter
pub struct ReporterHandle {
    reporter: SessionReporter,
    clock: ManualClock,
    transport: RecordingTransport,
    registration: Option<AdapterRegistration>,
    pending_unload: Option<UnloadInstructions>,
}

impl ReporterHandle {
    /// Run the reporter's unload and collect what the host has to apply
    fn unload(&mut self) -> Option<UnloadInstructions> {
        let payload = self.reporter.on_before_unload()?;
        Some(UnloadInstructions {
            set_cookie: self.reporter.cookies().last_write().map(str::to_string),
            beacon: self.transport.last(),
            payload,
        })
    }
}

/// What the host must do when the page unloads
#[derive(Serialize)]
struct UnloadInstructions {
    set_cookie: Option<String>,
    beacon: Option<Beacon>,
    payload: crate::payload::MetricsPayload,
}

// ============================================================================
// Reporter Lifecycle
// ============================================================================

/// Create a reporter for one page view.
///
/// `config_json` may be NULL for the default configuration. `cookies` is the
/// host's current `document.cookie` string and may be NULL. `now_ms` is the
/// construction time in epoch milliseconds.
///
/// # Safety
/// - Non-null pointers must be valid null-terminated C strings.
/// - Returns a handle that must be freed with `ybv_reporter_free`.
/// - Returns NULL on error; call `ybv_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ybv_reporter_new(
    config_json: *const c_char,
    environment_json: *const c_char,
    cookies: *const c_char,
    now_ms: i64,
) -> *mut ReporterHandle {
    clear_last_error();

    let config = match cstr_to_string(config_json) {
        Some(json) => match ReporterConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => ReporterConfig::default(),
    };

    let environment: PageEnvironment = match cstr_to_string(environment_json) {
        Some(json) => match serde_json::from_str(&json) {
            Ok(environment) => environment,
            Err(e) => {
                set_last_error(&format!("Invalid environment JSON: {e}"));
                return ptr::null_mut();
            }
        },
        None => {
            set_last_error("Invalid environment string pointer");
            return ptr::null_mut();
        }
    };

    // Host cookies arrive without attributes; hold them as session cookies
    let mut jar = MemoryCookieJar::new();
    if let Some(cookies) = cstr_to_string(cookies) {
        for cookie in parse_cookie_string(&cookies) {
            jar.set_cookie(&format!("{}={}", cookie.key, cookie.value), now_ms);
        }
    }

    let clock = ManualClock::new(now_ms);
    let transport = RecordingTransport::new();
    let mut registration = None;
    let reporter = SessionReporter::new(
        config,
        environment,
        Box::new(jar),
        Box::new(transport.clone()),
        Arc::new(clock.clone()),
        &mut HandleRegistry(&mut registration),
    );

    Box::into_raw(Box::new(ReporterHandle {
        reporter,
        clock,
        transport,
        registration,
        pending_unload: None,
    }))
}

/// Free a reporter.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ybv_reporter_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ybv_reporter_free(handle: *mut ReporterHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Get the registration record as JSON (`{"code": ..., "adapter": {...}}`).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ybv_reporter_new`.
/// - Returns a newly allocated string that must be freed with `ybv_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ybv_reporter_registration(handle: *const ReporterHandle) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_ref() else {
        set_last_error("Invalid reporter handle");
        return ptr::null_mut();
    };
    match &handle.registration {
        Some(registration) => json_to_cstr(registration),
        None => {
            set_last_error("Reporter was not registered");
            ptr::null_mut()
        }
    }
}

/// Mark analytics enabled by the host framework.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ybv_reporter_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ybv_reporter_enable(handle: *mut ReporterHandle) -> i32 {
    clear_last_error();

    match handle.as_mut() {
        Some(handle) => {
            handle.reporter.enable_analytics();
            0
        }
        None => {
            set_last_error("Invalid reporter handle");
            -1
        }
    }
}

// ============================================================================
// Event Delivery
// ============================================================================

/// Deliver one page event, e.g. `{"at": 1705327201000, "type": "scroll", "scroll_y": 500}`.
///
/// A `before_unload` event runs the unload at the event's time and holds its
/// instructions until the next `ybv_reporter_unload` call returns them.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ybv_reporter_new`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ybv_reporter_handle_event(
    handle: *mut ReporterHandle,
    event_json: *const c_char,
) -> i32 {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Invalid reporter handle");
        return -1;
    };

    let json = match cstr_to_string(event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event string pointer");
            return -1;
        }
    };

    match serde_json::from_str::<TimedPageEvent>(&json) {
        Ok(TimedPageEvent {
            at,
            event: PageEvent::BeforeUnload,
        }) => {
            handle.clock.set(at);
            if let Some(instructions) = handle.unload() {
                handle.pending_unload = Some(instructions);
            }
            0
        }
        Ok(event) => {
            handle.clock.set(event.at);
            handle.reporter.handle(event.event);
            0
        }
        Err(e) => {
            set_last_error(&format!("Invalid page event: {e}"));
            -1
        }
    }
}

/// Current payload as JSON, assembled at `now_ms`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ybv_reporter_new`.
/// - Returns a newly allocated string that must be freed with `ybv_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ybv_reporter_data(handle: *mut ReporterHandle, now_ms: i64) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Invalid reporter handle");
        return ptr::null_mut();
    };
    handle.clock.set(now_ms);
    handle.reporter.advance();
    json_to_cstr(&handle.reporter.data())
}

/// Handle page unload at `now_ms`.
///
/// Returns JSON `{"set_cookie": ..., "beacon": {"endpoint", "content_type",
/// "body"}, "payload": {...}}`. The host applies `set_cookie` to its cookie
/// store and sends `beacon`. If a `before_unload` event already ran the
/// unload, its held instructions are returned and `now_ms` is ignored.
/// Returns NULL once the instructions have been handed out.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ybv_reporter_new`.
/// - Returns a newly allocated string that must be freed with `ybv_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ybv_reporter_unload(handle: *mut ReporterHandle, now_ms: i64) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Invalid reporter handle");
        return ptr::null_mut();
    };
    let instructions = match handle.pending_unload.take() {
        Some(instructions) => Some(instructions),
        None => {
            handle.clock.set(now_ms);
            handle.unload()
        }
    };

    match instructions {
        Some(instructions) => json_to_cstr(&instructions),
        None => {
            set_last_error("Page already unloaded");
            ptr::null_mut()
        }
    }
}

/// Internal state as JSON; NULL unless the config enables debug.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ybv_reporter_new`.
/// - Returns a newly allocated string that must be freed with `ybv_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ybv_reporter_debug(handle: *const ReporterHandle) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_ref() else {
        set_last_error("Invalid reporter handle");
        return ptr::null_mut();
    };
    match handle.reporter.debug_snapshot() {
        Some(snapshot) => json_to_cstr(&snapshot),
        None => {
            set_last_error("Debug mode is disabled");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a ybv function.
///
/// # Safety
/// - `s` must be a pointer returned by a ybv function, or NULL.
#[no_mangle]
pub unsafe extern "C" fn ybv_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next ybv function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn ybv_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn ybv_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
