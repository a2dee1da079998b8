//! FFI safety wrappers: conversions between library strings and Rust values.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use serde_json::Value;

use super::abi::FfiFreeStringFn;

/// Safely converts a C string pointer to a Rust `String`.
///
/// Returns `None` if the pointer is null or the bytes are not UTF-8.
///
/// # Safety
/// `ptr` must be null or point to a valid null-terminated string.
pub unsafe fn c_str_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(str::to_string)
}

/// Converts a Rust string to a `CString`.
///
/// Returns `None` if the string contains null bytes.
pub fn string_to_c_string(s: &str) -> Option<CString> {
    CString::new(s).ok()
}

/// Copies a library-owned string and hands it back to the library.
///
/// # Safety
/// `ptr` must be null or a string returned by the library that exported `free`.
pub unsafe fn take_library_string(ptr: *mut c_char, free: FfiFreeStringFn) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let copied = unsafe { c_str_to_string(ptr) };
    unsafe { free(ptr) };
    copied
}

/// Interprets the `{"ok": ...}` / `{"error": ...}` envelope returned by `hookhost_invoke`.
pub fn parse_invoke_result(raw: &str) -> Result<Value, String> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| format!("invalid result from library: {e}"))?;

    match value {
        Value::Object(mut envelope) => {
            if let Some(error) = envelope.remove("error") {
                return Err(match error {
                    Value::String(message) => message,
                    other => other.to_string(),
                });
            }
            Ok(envelope.remove("ok").unwrap_or(Value::Null))
        }
        _ => Err("library result must be a JSON object".to_string()),
    }
}
