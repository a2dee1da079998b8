//! FFI ABI definitions for shared-library modules.
//!
//! A library must export:
//!
//! ```c
//! // Manifest JSON: the metadata fields plus "hooks": ["ping", ...].
//! char *hookhost_module(void);
//! // Runs one hook. Returns {"ok": <value>} or {"error": "<message>"}.
//! char *hookhost_invoke(const char *hook, const char *args_json);
//! // Releases a string returned by the two functions above.
//! void hookhost_free_string(char *s);
//! ```
//!
//! and may export `int hookhost_initialize(void)` and
//! `int hookhost_cleanup(void)`, returning 0 on success.

use std::os::raw::{c_char, c_int};

/// Symbol returning the module manifest.
pub const MODULE_SYMBOL: &[u8] = b"hookhost_module\0";
/// Symbol dispatching a hook.
pub const INVOKE_SYMBOL: &[u8] = b"hookhost_invoke\0";
/// Symbol releasing returned strings.
pub const FREE_STRING_SYMBOL: &[u8] = b"hookhost_free_string\0";
/// Optional initialize symbol.
pub const INITIALIZE_SYMBOL: &[u8] = b"hookhost_initialize\0";
/// Optional cleanup symbol.
pub const CLEANUP_SYMBOL: &[u8] = b"hookhost_cleanup\0";

/// Type signature of `hookhost_module`.
pub type FfiModuleFn = unsafe extern "C" fn() -> *mut c_char;

/// Type signature of `hookhost_invoke`.
///
/// `hook` and `args_json` are null-terminated; `args_json` is a JSON array.
pub type FfiInvokeFn = unsafe extern "C" fn(hook: *const c_char, args_json: *const c_char) -> *mut c_char;

/// Type signature of `hookhost_free_string`.
pub type FfiFreeStringFn = unsafe extern "C" fn(s: *mut c_char);

/// Type signature of `hookhost_initialize` / `hookhost_cleanup`.
pub type FfiLifecycleFn = unsafe extern "C" fn() -> c_int;
