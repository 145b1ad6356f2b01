// src/engine/common.rs
//
// Common utilities shared across engine modules.

use crate::error::{OptiImageError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a codec stage and turn any panic inside it into an `InternalPanic` error.
///
/// FFI-backed codecs and the image crate occasionally panic on hostile input; every
/// stage boundary goes through here.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            tracing::error!(stage, panic = %detail, "codec stage panicked");
            Err(OptiImageError::internal_panic(format!(
                "{stage} panicked: {detail}"
            )))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_ok_and_err() {
        assert_eq!(run_with_panic_policy("test", || Ok(7)).unwrap(), 7);
        let err = run_with_panic_policy::<(), _>("test", || {
            Err(OptiImageError::decode_failed("bad"))
        })
        .unwrap_err();
        assert!(matches!(err, OptiImageError::DecodeFailed { .. }));
    }

    #[test]
    fn converts_panic_to_internal_error() {
        let err = run_with_panic_policy::<(), _>("decode:test", || panic!("boom")).unwrap_err();
        match err {
            OptiImageError::InternalPanic { message } => {
                assert!(message.contains("decode:test"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
