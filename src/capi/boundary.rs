//! Failure-to-callback protocol applied at every C entry point
//!
//! Entry points run their body through [`guard`]. An error is classified with
//! [`Error::kind`], a panic becomes [`ErrorKind::UnknownError`]; either way
//! the process-wide callback is invoked once, synchronously, and the entry
//! point returns its sentinel.

use crate::error::{Error, ErrorKind, Result, panic_message};
use parking_lot::RwLock;
use std::ffi::{CStr, CString, c_char};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::error;

/// Error callback installed with `hcrt_set_error_func`
pub type HcrtErrorFunc = extern "C" fn(kind: ErrorKind, message: *const c_char);

/// Message reported for panics that carry no text
pub const UNRECOGNIZED_PANIC: &str = "an unrecognized panic was caught";

static ERROR_FUNC: RwLock<Option<HcrtErrorFunc>> =
    parking_lot::const_rwlock(Some(default_error_func as HcrtErrorFunc));

/// Default handler: log, print, and terminate with a non-zero status
pub extern "C" fn default_error_func(kind: ErrorKind, message: *const c_char) {
    let text = if message.is_null() {
        String::new()
    } else {
        // SAFETY: the runtime always passes a NUL-terminated string.
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    };
    error!(%kind, message = %text, "Unhandled hcrt error, terminating");
    eprintln!("HCRT Error ({kind}): {text}");
    std::process::exit(-1);
}

/// Replace the error callback; `None` silences reporting
pub fn set_error_func(func: Option<HcrtErrorFunc>) {
    *ERROR_FUNC.write() = func;
}

/// Reinstall [`default_error_func`]
pub fn restore_default_error_func() {
    set_error_func(Some(default_error_func));
}

/// Currently installed callback
pub fn error_func() -> Option<HcrtErrorFunc> {
    *ERROR_FUNC.read()
}

/// Deliver one failure to the installed callback
pub fn report(kind: ErrorKind, message: &str) {
    // Copied out so a callback may itself replace the handler.
    let Some(func) = error_func() else {
        return;
    };
    let message = CString::new(message.replace('\0', "")).unwrap_or_default();
    func(kind, message.as_ptr());
}

/// Report an error through the callback
pub fn report_error(err: &Error) {
    report(err.kind(), &err.to_string());
}

/// Run `body`, reporting any failure and returning `sentinel` instead
pub fn guard<T>(sentinel: T, body: impl FnOnce() -> Result<T>) -> T {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            report_error(&err);
            sentinel
        }
        Err(payload) => {
            let message =
                panic_message(payload.as_ref()).unwrap_or_else(|| UNRECOGNIZED_PANIC.to_string());
            report(ErrorKind::UnknownError, &message);
            sentinel
        }
    }
}
