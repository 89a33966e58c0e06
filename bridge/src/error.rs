// Copyright (c) 2018-2022 The MobileCoin Foundation

use crate::common::McError;
use core::str::Utf8Error;
use displaydoc::Display;
use mc_common::logger::global_log;
use mc_util_ffi::FfiAllocError;
use std::{
    os::raw::c_int,
    panic::{catch_unwind, AssertUnwindSafe},
    process::abort,
};

impl From<BridgeError> for McError {
    fn from(err: BridgeError) -> Self {
        Self::new(err.error_code(), err.message())
    }
}

impl From<&McError> for BridgeError {
    fn from(err: &McError) -> Self {
        Self::from_code(err.error_code, err.description_lossy())
    }
}

/// Every failure that can cross the boundary.
// ContractViolation and LifetimeViolation are fatal: boundary code that sees
// one aborts the process instead of returning it.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum BridgeError {
    /// Unknown
    Unknown,
    /// Rust panicked: {0}
    Panic(String),

    /// Invalid input: {0}
    InvalidInput(String),
    /// Allocation failure: {0}
    AllocationFailure(String),
    /// Encoding failure: {0}
    EncodingFailure(String),

    /// Contract violation: {0}
    ContractViolation(String),
    /// Lifetime violation: {0}
    LifetimeViolation(String),

    /// Callee failed with code {code}: {message}
    CalleeFailure {
        /// The code the callee reported.
        code: c_int,
        /// The callee's description of the failure.
        message: String,
    },
}

pub mod error_codes {
    use super::*;

    pub const MC_BRIDGE_ERROR_CODE_UNKNOWN: c_int = -1;
    pub const MC_BRIDGE_ERROR_CODE_PANIC: c_int = -2;

    pub const MC_BRIDGE_ERROR_CODE_INVALID_INPUT: c_int = 100;
    pub const MC_BRIDGE_ERROR_CODE_ALLOCATION: c_int = 101;
    pub const MC_BRIDGE_ERROR_CODE_ENCODING: c_int = 102;

    pub const MC_BRIDGE_ERROR_CODE_CONTRACT_VIOLATION: c_int = 200;
    pub const MC_BRIDGE_ERROR_CODE_LIFETIME_VIOLATION: c_int = 201;

    /// Raised by a foreign callee that could not allocate. Reported to the
    /// host as an allocation failure.
    pub const MC_BRIDGE_CALLEE_CODE_ALLOCATION: c_int = -101;
    /// Raised by a foreign callee handed text it could not decode. Reported
    /// to the host as an encoding failure.
    pub const MC_BRIDGE_CALLEE_CODE_ENCODING: c_int = -102;
}

impl BridgeError {
    pub fn error_code(&self) -> c_int {
        use error_codes::*;
        match self {
            BridgeError::Unknown => MC_BRIDGE_ERROR_CODE_UNKNOWN,
            BridgeError::Panic(_) => MC_BRIDGE_ERROR_CODE_PANIC,
            BridgeError::InvalidInput(_) => MC_BRIDGE_ERROR_CODE_INVALID_INPUT,
            BridgeError::AllocationFailure(_) => MC_BRIDGE_ERROR_CODE_ALLOCATION,
            BridgeError::EncodingFailure(_) => MC_BRIDGE_ERROR_CODE_ENCODING,
            BridgeError::ContractViolation(_) => MC_BRIDGE_ERROR_CODE_CONTRACT_VIOLATION,
            BridgeError::LifetimeViolation(_) => MC_BRIDGE_ERROR_CODE_LIFETIME_VIOLATION,
            BridgeError::CalleeFailure { code, .. } => *code,
        }
    }

    /// The detail carried with the error, without the kind. The kind travels
    /// as the code.
    pub fn message(&self) -> String {
        match self {
            BridgeError::Unknown => self.to_string(),
            BridgeError::Panic(message)
            | BridgeError::InvalidInput(message)
            | BridgeError::AllocationFailure(message)
            | BridgeError::EncodingFailure(message)
            | BridgeError::ContractViolation(message)
            | BridgeError::LifetimeViolation(message)
            | BridgeError::CalleeFailure { message, .. } => message.clone(),
        }
    }

    /// Rebuild an error the bridge itself wrote to an error slot.
    ///
    /// Codes owned by the bridge map back to their variant. Anything else is
    /// a callee's domain error.
    pub fn from_code(code: c_int, message: String) -> Self {
        use error_codes::*;
        match code {
            MC_BRIDGE_ERROR_CODE_UNKNOWN => BridgeError::Unknown,
            MC_BRIDGE_ERROR_CODE_PANIC => BridgeError::Panic(message),
            MC_BRIDGE_ERROR_CODE_INVALID_INPUT => BridgeError::InvalidInput(message),
            MC_BRIDGE_ERROR_CODE_ALLOCATION => BridgeError::AllocationFailure(message),
            MC_BRIDGE_ERROR_CODE_ENCODING => BridgeError::EncodingFailure(message),
            MC_BRIDGE_ERROR_CODE_CONTRACT_VIOLATION => BridgeError::ContractViolation(message),
            MC_BRIDGE_ERROR_CODE_LIFETIME_VIOLATION => BridgeError::LifetimeViolation(message),
            code => BridgeError::CalleeFailure { code, message },
        }
    }

    /// Interpret an error a foreign callee raised.
    ///
    /// Only the two callee codes map to bridge variants, and neither is
    /// fatal. Every other code, including the bridge's own, is the callee's
    /// and comes back as `CalleeFailure`.
    pub fn from_callee(code: c_int, message: String) -> Self {
        use error_codes::*;
        match code {
            MC_BRIDGE_CALLEE_CODE_ALLOCATION => BridgeError::AllocationFailure(message),
            MC_BRIDGE_CALLEE_CODE_ENCODING => BridgeError::EncodingFailure(message),
            code => BridgeError::CalleeFailure { code, message },
        }
    }

    /// Whether this error means memory safety can no longer be vouched for.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::ContractViolation(_) | BridgeError::LifetimeViolation(_)
        )
    }
}

impl From<FfiAllocError> for BridgeError {
    fn from(err: FfiAllocError) -> Self {
        BridgeError::AllocationFailure(err.to_string())
    }
}

impl From<Utf8Error> for BridgeError {
    fn from(err: Utf8Error) -> Self {
        BridgeError::EncodingFailure(format!(
            "invalid UTF-8 after {} valid bytes",
            err.valid_up_to()
        ))
    }
}

impl From<std::collections::TryReserveError> for BridgeError {
    fn from(err: std::collections::TryReserveError) -> Self {
        BridgeError::AllocationFailure(err.to_string())
    }
}

/// Terminate the process after a fatal violation.
///
/// The diagnostic goes to the scoped logger and to stderr, since an async
/// drain may not get to flush before the abort.
pub fn abort_on_violation(err: &BridgeError) -> ! {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        global_log::crit!("mc-bridge fatal: {}", err);
        eprintln!("mc-bridge fatal: {}", err);
    }));
    abort()
}
