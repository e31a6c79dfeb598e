//! FFI bindings for Suraksha
//!
//! This module provides C-compatible functions for computing session features
//! from other languages. All functions use C strings (null-terminated) and
//! return allocated memory that must be freed by the caller using
//! `suraksha_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::Deserialize;

use crate::config::Config;
use crate::error::CollectError;
use crate::features::compute_derived_features;
use crate::pipeline::{features_from_capture, replay_session};
use crate::types::{FocusEvent, InputEvent, KeyEvent, PointerSnapshot};

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

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Drained capture buffers as handed over by the host
#[derive(Deserialize)]
struct CapturedSession {
    #[serde(default)]
    typing_events: Vec<KeyEvent>,
    #[serde(default)]
    mouse_samples: PointerSnapshot,
    #[serde(default)]
    focus_events: Vec<FocusEvent>,
}

fn compute_features_json(json: &str) -> Result<String, CollectError> {
    let session: CapturedSession = serde_json::from_str(json)?;
    let features = compute_derived_features(
        &session.typing_events,
        &session.mouse_samples,
        &session.focus_events,
    );
    Ok(serde_json::to_string(&features)?)
}

fn replay_features_json(events_json: &str, config_json: Option<&str>) -> Result<String, CollectError> {
    let config = match config_json {
        Some(json) => Config::from_json(json)?,
        None => Config::default(),
    };
    let events = InputEvent::parse_array(events_json)?;
    let capture = replay_session(&events, &config.capture)?;
    Ok(serde_json::to_string(&features_from_capture(&capture))?)
}

// ============================================================================
// Stateless API
// ============================================================================

/// Compute DerivedFeatures from captured session buffers.
///
/// Input is a JSON object with `typing_events`, `mouse_samples`
/// (`{samples, clicks}`) and `focus_events`; missing fields count as empty.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `suraksha_free_string`.
/// - Returns NULL on error; call `suraksha_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn suraksha_compute_features(json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match compute_features_json(&json_str) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Replay a JSON array of raw input events and return DerivedFeatures JSON.
///
/// # Safety
/// - `events_json` must be a valid null-terminated C string.
/// - `config_json` must be NULL (defaults) or a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `suraksha_free_string`.
/// - Returns NULL on error; call `suraksha_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn suraksha_replay_features(
    events_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let events_str = match cstr_to_string(events_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid events string pointer");
            return ptr::null_mut();
        }
    };

    let config_str = if config_json.is_null() {
        None
    } else {
        match cstr_to_string(config_json) {
            Some(s) => Some(s),
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        }
    };

    match replay_features_json(&events_str, config_str.as_deref()) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Suraksha functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Suraksha function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn suraksha_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Suraksha function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn suraksha_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Suraksha library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn suraksha_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        suraksha_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_compute_features() {
        let json = CString::new(
            r#"{
                "typing_events": [
                    {"t": 0, "type": "keydown", "key_class": "letter"},
                    {"t": 80, "type": "keyup", "key_class": "letter"},
                    {"t": 100, "type": "keydown", "key_class": "backspace"},
                    {"t": 140, "type": "keyup", "key_class": "backspace"}
                ],
                "mouse_samples": {
                    "samples": [{"t": 0, "x": 0, "y": 0}, {"t": 10, "x": 10, "y": 0}],
                    "clicks": []
                }
            }"#,
        )
        .unwrap();

        unsafe {
            let result = take_string(suraksha_compute_features(json.as_ptr()));
            let value: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert_eq!(value["mean_dwell"], 60.0);
            assert_eq!(value["backspace_rate"], 0.5);
            assert_eq!(value["mouse_mean_velocity"], 1.0);
            assert_eq!(value["focus_changes"], 0);
        }
    }

    #[test]
    fn test_ffi_replay_features() {
        let events = CString::new(
            r#"[
                {"type": "key_down", "t": 0.4, "code": "KeyA"},
                {"type": "key_up", "t": 60.2, "code": "KeyA"},
                {"type": "focus", "t": 90}
            ]"#,
        )
        .unwrap();
        let config = CString::new(r#"{"capture": {"pointer_sample_interval_ms": 10}}"#).unwrap();

        unsafe {
            let result = take_string(suraksha_replay_features(events.as_ptr(), ptr::null()));
            let value: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert_eq!(value["mean_dwell"], 60.0);
            assert_eq!(value["typing_event_count"], 2);
            assert_eq!(value["focus_changes"], 1);

            let result = take_string(suraksha_replay_features(events.as_ptr(), config.as_ptr()));
            assert!(result.contains("mean_dwell"));
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            let result = suraksha_compute_features(invalid_json.as_ptr());
            assert!(result.is_null());

            let error = suraksha_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            let result = suraksha_replay_features(ptr::null(), ptr::null());
            assert!(result.is_null());
            let error_str = CStr::from_ptr(suraksha_last_error()).to_str().unwrap();
            assert_eq!(error_str, "Invalid events string pointer");
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = suraksha_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
