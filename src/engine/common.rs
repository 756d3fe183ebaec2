// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Codec libraries (libjpeg, libwebp, oxipng) can panic on hostile input.
// Every codec call, and every batch item as a whole, goes through
// run_with_panic_policy so one bad file turns into an error value instead
// of unwinding through a batch.

use crate::error::PixelPressError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, PixelPressError>;

/// Run `f`, converting a panic into `InternalPanic` tagged with `stage`.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::warn!(target: "pixel_press::panic", stage, %detail, "stage panicked");
            Err(PixelPressError::internal_panic(format!(
                "{stage} panicked: {detail}"
            )))
        }
    }
}
