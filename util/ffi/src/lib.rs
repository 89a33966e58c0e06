// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Pointer wrappers whose memory layout is exactly that of a raw C pointer.
//!
//! These are meant to appear directly in the signatures of `extern "C"`
//! functions, so that ownership and nullability are spelled out in the Rust
//! types while foreign code only ever sees `T*`.

mod ffi_owned_ptr;
mod ffi_ref_ptr;

pub use self::{
    ffi_owned_ptr::{FfiAllocError, FfiOptOwnedPtr, FfiOwnedPtr},
    ffi_ref_ptr::{FfiMutPtr, FfiOptMutPtr, FfiOptRefPtr, FfiRefPtr},
};
