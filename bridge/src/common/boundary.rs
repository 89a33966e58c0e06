// Copyright (c) 2018-2022 The MobileCoin Foundation

use super::{IntoFfi, McError};
use crate::error::{abort_on_violation, BridgeError};
use mc_common::logger::global_log;
use mc_util_ffi::{FfiOptMutPtr, FfiOptOwnedPtr, FfiOwnedPtr};
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    process::abort,
};

/// The outer-most layer of every `extern "C"` function that cannot fail.
///
/// Panics are caught, logged, and turned into `R::error_value()`, so they
/// never unwind into foreign frames.
pub fn ffi_boundary<R, I>(f: impl FnOnce() -> R) -> I
where
    R: IntoFfi<I>,
{
    ffi_boundary_impl(|| Ok(f().into_ffi())).unwrap_or_else(|err| {
        log_error(&err);
        R::error_value()
    })
}

/// The outer-most layer of every fallible `extern "C"` function.
///
/// A recoverable error (or a caught panic) is written to `out_error` when the
/// caller supplied one, and the sentinel `R::error_value()` is returned. A
/// fatal error aborts the process.
pub fn ffi_boundary_with_error<R, I>(
    out_error: FfiOptMutPtr<FfiOptOwnedPtr<McError>>,
    f: impl FnOnce() -> Result<R, BridgeError>,
) -> I
where
    R: IntoFfi<I>,
{
    ffi_boundary_impl(|| Ok(f()?.into_ffi())).unwrap_or_else(|err| {
        set_error_or_log(err, out_error);
        R::error_value()
    })
}

/// Run `f`, turning a panic into `BridgeError::Panic`.
///
/// `AssertUnwindSafe` is fine here: all we need at the boundary is to stop the
/// unwind, and callers treat anything `f` touched as suspect afterwards.
pub fn catch_panic<R>(
    f: impl FnOnce() -> Result<R, BridgeError>,
) -> Result<R, BridgeError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(panic_error(payload)))
}

fn ffi_boundary_impl<R>(f: impl FnOnce() -> Result<R, BridgeError>) -> Result<R, BridgeError> {
    let result = catch_panic(f);
    if let Err(err) = &result {
        if err.is_fatal() {
            abort_on_violation(err);
        }
    }
    result
}

/// Formats a panic payload. Formatting can itself panic, in which case there
/// is nothing sane left to do.
pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> BridgeError {
    let payload = AssertUnwindSafe(payload);
    catch_unwind(|| {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        BridgeError::Panic(message)
    })
    .unwrap_or_else(|_| abort())
}

fn set_error_or_log(err: BridgeError, out_error: FfiOptMutPtr<FfiOptOwnedPtr<McError>>) {
    error_handling_ffi_boundary(|| {
        if let Some(error) = out_error.into_mut() {
            *error = FfiOwnedPtr::new(McError::from(err)).into();
        } else {
            global_log::error!("mc-bridge error: {}", err);
        }
    });
}

fn log_error(err: &BridgeError) {
    error_handling_ffi_boundary(|| global_log::error!("mc-bridge error: {}", err))
}

/// Errors while reporting an error are swallowed after a best-effort print;
/// aborting here would turn a recoverable failure into a crash.
fn error_handling_ffi_boundary(f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        let _ = catch_unwind(|| eprintln!("mc-bridge panicked during error handling"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_codes::*;

    fn fails_with(err: BridgeError, out_error: FfiOptMutPtr<FfiOptOwnedPtr<McError>>) -> bool {
        ffi_boundary_with_error(out_error, || -> Result<(), BridgeError> { Err(err) })
    }

    #[test]
    fn errors_reach_the_out_parameter() {
        let mut error = FfiOptOwnedPtr::<McError>::null();
        let ok = fails_with(
            BridgeError::EncodingFailure("bad".into()),
            FfiOptMutPtr::from(&mut error),
        );
        assert!(!ok);
        let error = error.into_option().expect("error was not set");
        assert_eq!(error.error_code, MC_BRIDGE_ERROR_CODE_ENCODING);
        assert_eq!(error.description_lossy(), "bad");
    }

    #[test]
    fn errors_without_out_parameter_return_sentinel() {
        assert!(!fails_with(
            BridgeError::InvalidInput("x".into()),
            FfiOptMutPtr::null()
        ));
    }

    #[test]
    fn panics_become_errors() {
        let mut error = FfiOptOwnedPtr::<McError>::null();
        let value: i64 = ffi_boundary_with_error(
            FfiOptMutPtr::from(&mut error),
            || -> Result<i64, BridgeError> { panic!("kaboom") },
        );
        assert_eq!(value, -1);
        let error = error.into_option().expect("error was not set");
        assert_eq!(error.error_code, MC_BRIDGE_ERROR_CODE_PANIC);
        assert_eq!(error.description_lossy(), "kaboom");
    }

    #[test]
    fn success_passes_through() {
        let mut error = FfiOptOwnedPtr::<McError>::null();
        let value: i64 = ffi_boundary_with_error(FfiOptMutPtr::from(&mut error), || Ok(5i64));
        assert_eq!(value, 5);
        assert!(error.is_null());

        let unit: bool = ffi_boundary(|| ());
        assert!(unit);
    }
}
