// Copyright (c) 2018-2022 The MobileCoin Foundation

use super::{ffi_boundary, McStr, McString};
use mc_util_ffi::{FfiOptMutPtr, FfiOptOwnedPtr, FfiOwnedPtr};
use std::os::raw::c_int;

/// The failure record written to a call's `out_error` parameter.
///
/// Allocated by Rust, read by foreign code, and released with
/// `mc_bridge_error_free`.
#[repr(C)]
#[derive(Debug)]
pub struct McError {
    pub error_code: c_int,
    pub error_description: McString,
}

impl McError {
    pub fn new(error_code: c_int, error_description: String) -> Self {
        Self {
            error_code,
            error_description: McString::from(error_description),
        }
    }

    pub fn description_lossy(&self) -> String {
        String::from_utf8_lossy(self.error_description.as_bytes()).into_owned()
    }
}

#[no_mangle]
pub extern "C" fn mc_bridge_error_free(error: FfiOptOwnedPtr<McError>) {
    ffi_boundary(|| drop(error))
}

/// Report a failure from foreign code into an error slot the bridge handed
/// out (e.g. the `out_error` of a foreign function the bridge is calling).
///
/// `message` is copied; it need not outlive this call and need not be valid
/// UTF-8. A slot that already holds an error keeps the first one.
///
/// # Preconditions
///
/// * `out_error` - must be null or point to a valid error slot.
#[no_mangle]
pub extern "C" fn mc_bridge_error_raise(
    out_error: FfiOptMutPtr<FfiOptOwnedPtr<McError>>,
    error_code: c_int,
    message: McStr,
) {
    ffi_boundary(|| {
        let description = match message.as_bytes() {
            Ok(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Err(err) => err.to_string(),
        };
        if let Some(slot) = out_error.into_mut() {
            if slot.is_null() {
                *slot = FfiOwnedPtr::new(McError::new(error_code, description)).into();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    #[test]
    fn raise_fills_an_empty_slot() {
        let mut slot = FfiOptOwnedPtr::<McError>::null();
        mc_bridge_error_raise(
            FfiOptMutPtr::from(&mut slot),
            17,
            McStr::from_bytes(b"no such blob\xff"),
        );
        let error = slot.into_option().expect("error was not raised");
        assert_eq!(
            BridgeError::from(&*error),
            BridgeError::CalleeFailure {
                code: 17,
                message: "no such blob\u{fffd}".into()
            }
        );
        mc_bridge_error_free(error.into());
    }

    #[test]
    fn raise_keeps_the_first_error() {
        let mut slot = FfiOptOwnedPtr::<McError>::null();
        mc_bridge_error_raise(FfiOptMutPtr::from(&mut slot), 1, McStr::borrow("first"));
        mc_bridge_error_raise(FfiOptMutPtr::from(&mut slot), 2, McStr::borrow("second"));
        let error = slot.into_option().expect("error was not raised");
        assert_eq!(error.error_code, 1);
        assert_eq!(error.description_lossy(), "first");
    }

    #[test]
    fn raise_without_slot_is_a_no_op() {
        mc_bridge_error_raise(FfiOptMutPtr::null(), 3, McStr::borrow("dropped"));
    }
}
