//! FFI bindings for mobile hosts
//!
//! The host app owns the provider and permission SDKs, so this surface takes
//! readings and permission state it already fetched, runs reconciliation and
//! classification, and hands back JSON. All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `vitals_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::adapters::{ExportAdapter, ReadingsAdapter};
use crate::classifier::DataAvailabilityClassifier;
use crate::config::offset_from_minutes;
use crate::error::{FailureReason, VitalsError};
use crate::reconciler::reconcile_at;
use crate::types::PermissionState;

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

fn failure_json(reason: &FailureReason) -> serde_json::Value {
    json!({
        "error": {
            "code": reason.code(),
            "reason": reason,
            "guidance": reason.guidance(),
        }
    })
}

fn reconcile_and_classify(
    readings_json: &str,
    permission_json: &str,
    now: Option<&str>,
    utc_offset_minutes: i32,
) -> Result<String, VitalsError> {
    let readings = ReadingsAdapter.parse(readings_json)?;
    let permissions: PermissionState = serde_json::from_str(permission_json)?;
    let now = match now {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map_err(|e| VitalsError::ParseError(format!("invalid timestamp {}: {}", text, e)))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let offset = offset_from_minutes(utc_offset_minutes).ok_or_else(|| {
        VitalsError::InvalidConfig(format!("invalid utc offset {} minutes", utc_offset_minutes))
    })?;

    let snapshot = reconcile_at(&readings, now, offset);
    let value = match DataAvailabilityClassifier::classify(snapshot, &permissions) {
        Ok(snapshot) => json!({ "ok": snapshot }),
        Err(reason) => failure_json(&reason),
    };
    Ok(value.to_string())
}

/// Reconcile readings and classify the result.
///
/// Returns `{"ok": <snapshot>}` or `{"error": {"code", "reason", "guidance"}}`.
///
/// # Safety
/// - `readings_json` and `permission_json` must be valid null-terminated C strings.
/// - `now_rfc3339` may be NULL to use the current time.
/// - Returns a newly allocated string that must be freed with `vitals_free_string`.
/// - Returns NULL on invalid input; call `vitals_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitals_reconcile_json(
    readings_json: *const c_char,
    permission_json: *const c_char,
    now_rfc3339: *const c_char,
    utc_offset_minutes: i32,
) -> *mut c_char {
    clear_last_error();

    let readings_str = match cstr_to_string(readings_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid readings string pointer");
            return ptr::null_mut();
        }
    };

    let permission_str = match cstr_to_string(permission_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid permission string pointer");
            return ptr::null_mut();
        }
    };

    let now_str = cstr_to_string(now_rfc3339);

    match reconcile_and_classify(
        &readings_str,
        &permission_str,
        now_str.as_deref(),
        utc_offset_minutes,
    ) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Guidance sentence for a failure code (e.g. "NO_DATA_IN_RANGE").
///
/// # Safety
/// - `code` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `vitals_free_string`.
/// - Returns NULL for unknown codes.
#[no_mangle]
pub unsafe extern "C" fn vitals_guidance(code: *const c_char) -> *mut c_char {
    clear_last_error();

    let code_str = match cstr_to_string(code) {
        Some(s) => s,
        None => {
            set_last_error("Invalid code string pointer");
            return ptr::null_mut();
        }
    };

    match FailureReason::from_code(&code_str) {
        Some(reason) => string_to_cstr(&reason.guidance()),
        None => {
            set_last_error(&format!("Unknown failure code: {}", code_str));
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a vitals function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a vitals function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn vitals_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next vitals function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn vitals_last_error() -> *const c_char {
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
pub unsafe extern "C" fn vitals_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granted() -> CString {
        CString::new(
            r#"{"runtime_granted": true, "provider_authorized": true, "provider_available": true}"#,
        )
        .unwrap()
    }

    fn call(readings: &str, permissions: &CString) -> serde_json::Value {
        let readings = CString::new(readings).unwrap();
        let now = CString::new("2024-01-15T18:00:00Z").unwrap();
        unsafe {
            let result =
                vitals_reconcile_json(readings.as_ptr(), permissions.as_ptr(), now.as_ptr(), 0);
            assert!(!result.is_null());
            let text = CStr::from_ptr(result).to_str().unwrap().to_string();
            vitals_free_string(result);
            serde_json::from_str(&text).unwrap()
        }
    }

    #[test]
    fn test_ffi_reconcile_success() {
        let value = call(
            r#"[
                {"kind": "steps", "value": 500, "unit": "count", "observed_at": "2024-01-15T08:00:00Z",
                 "recorded_interval": {"start": "2024-01-15T07:00:00Z", "end": "2024-01-15T08:00:00Z"}},
                {"kind": "steps", "value": 300, "unit": "count", "observed_at": "2024-01-15T14:00:00Z",
                 "recorded_interval": {"start": "2024-01-15T13:00:00Z", "end": "2024-01-15T14:00:00Z"}}
            ]"#,
            &granted(),
        );

        assert_eq!(value["ok"]["metrics"]["steps"]["value"], 800.0);
    }

    #[test]
    fn test_ffi_reconcile_failure_carries_guidance() {
        let value = call("[]", &granted());

        assert_eq!(value["error"]["code"], "NO_DATA_IN_RANGE");
        assert_eq!(value["error"]["reason"]["reason"], "no_data_in_range");
        assert!(value["error"]["guidance"].as_str().unwrap().len() > 10);
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let readings = CString::new("not json").unwrap();
            let result =
                vitals_reconcile_json(readings.as_ptr(), granted().as_ptr(), ptr::null(), 0);

            assert!(result.is_null());

            let error = vitals_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());
        }
    }

    #[test]
    fn test_ffi_out_of_range_offset_reports_error() {
        unsafe {
            let readings = CString::new("[]").unwrap();
            let permissions = granted();
            for minutes in [i32::MAX, i32::MIN, 24 * 60] {
                let result = vitals_reconcile_json(
                    readings.as_ptr(),
                    permissions.as_ptr(),
                    ptr::null(),
                    minutes,
                );
                assert!(result.is_null());

                let error = vitals_last_error();
                assert!(!error.is_null());
                let error_str = CStr::from_ptr(error).to_str().unwrap();
                assert!(error_str.contains("utc offset"));
            }
        }
    }

    #[test]
    fn test_ffi_guidance_lookup() {
        unsafe {
            let code = CString::new("DATA_ALL_ZERO").unwrap();
            let text = vitals_guidance(code.as_ptr());
            assert!(!text.is_null());
            vitals_free_string(text);

            let code = CString::new("NOT_A_CODE").unwrap();
            assert!(vitals_guidance(code.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = vitals_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
