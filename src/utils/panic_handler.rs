//! Panic containment for external compile/render code
//!
//! Oracles and render contexts are third-party code. A panic inside one must
//! turn into a failed compile or a failed thumbnail, never take down the
//! caller or the thumbnail queue's worker threads.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Result type for operations that might panic
pub type PanicResult<T> = Result<T, String>;

/// Extract a readable message from a panic payload
pub fn panic_to_string(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic occurred".to_string()
    }
}

/// Catch panics from a closure that borrows mutable state
///
/// Uses `AssertUnwindSafe`: callers discard or reset the borrowed state
/// (compiled pipelines, render targets) after a panic.
pub fn catch_panic_mut<F, T>(f: F) -> PanicResult<T>
where
    F: FnOnce() -> T,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_to_string(payload);
        log::error!("Caught panic: {}", message);
        message
    })
}

/// Format a panic message so it reads as a compiler log entry
pub fn format_panic_message(panic_msg: &str) -> String {
    let first_line = panic_msg.lines().next().unwrap_or("").trim();
    if panic_msg.contains("Validation Error") {
        format!("Shader validation error (driver panic): {}", first_line)
    } else {
        format!("Internal error (compiler panic): {}", first_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_panic_success() {
        let mut compiled = 0;
        let result = catch_panic_mut(|| {
            compiled += 1;
            compiled
        });
        assert_eq!(result, Ok(1));
    }

    #[test]
    fn test_catch_panic_failure() {
        let result: PanicResult<()> = catch_panic_mut(|| panic!("driver lost"));
        assert!(result.unwrap_err().contains("driver lost"));
    }

    #[test]
    fn test_formatted_panic_reads_as_error() {
        let formatted = format_panic_message("wgpu error: Validation Error\n\nCaused by: ...");
        assert!(formatted.to_lowercase().contains("error"));
        assert!(!formatted.contains('\n'));
    }
}
