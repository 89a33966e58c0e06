// Copyright (c) 2018-2022 The MobileCoin Foundation

use super::{McStr, McString, McVec};
use crate::handle::{Opaque, OpaqueHandle, RawHandle};
use libc::ssize_t;
use mc_util_ffi::{FfiOptOwnedPtr, FfiOwnedPtr};

/// Converts a Rust value into what an `extern "C"` function returns, either
/// as its return value or through an out parameter.
///
/// After an error or a caught panic, `error_value()` is returned instead. It
/// is a sentinel foreign code can tell apart from success (`null` for a
/// pointer or handle, `-1` for a signed count), or a neutral value when the
/// `out_error` parameter is the only way to detect failure.
pub trait IntoFfi<T>: Sized {
    fn error_value() -> T;

    fn into_ffi(self) -> T;
}

impl<T: IntoFfi<I>, I> IntoFfi<I> for Option<T> {
    #[inline]
    fn error_value() -> I {
        T::error_value()
    }

    #[inline]
    fn into_ffi(self) -> I {
        if let Some(s) = self {
            s.into_ffi()
        } else {
            T::error_value()
        }
    }
}

macro_rules! impl_into_ffi_using_default {
    ($($Type:ty),+) => {
        $(
            impl IntoFfi<$Type> for $Type {
                #[inline]
                fn error_value() -> Self {
                    Default::default()
                }

                #[inline]
                fn into_ffi(self) -> Self {
                    self
                }
            }
        )+
    }
}

macro_rules! impl_into_ffi_using_minus_one {
    ($($Type:ty),+) => {
        $(
            impl IntoFfi<$Type> for $Type {
                #[inline]
                fn error_value() -> Self {
                    -1
                }

                #[inline]
                fn into_ffi(self) -> Self {
                    self
                }
            }
        )+
    }
}

impl_into_ffi_using_default![(), bool, u8, u32, u64, f64];

impl_into_ffi_using_minus_one![i32, i64, ssize_t];

impl IntoFfi<bool> for () {
    #[inline]
    fn error_value() -> bool {
        false
    }

    #[inline]
    fn into_ffi(self) -> bool {
        true
    }
}

impl IntoFfi<RawHandle> for RawHandle {
    #[inline]
    fn error_value() -> RawHandle {
        RawHandle::NULL
    }

    #[inline]
    fn into_ffi(self) -> RawHandle {
        self
    }
}

/// Returning an owned handle transfers it to the caller.
impl<T: Opaque> IntoFfi<RawHandle> for OpaqueHandle<T> {
    #[inline]
    fn error_value() -> RawHandle {
        RawHandle::NULL
    }

    #[inline]
    fn into_ffi(self) -> RawHandle {
        self.into_raw()
    }
}

impl IntoFfi<McString> for McString {
    #[inline]
    fn error_value() -> McString {
        McString::null()
    }

    #[inline]
    fn into_ffi(self) -> McString {
        self
    }
}

impl IntoFfi<McString> for String {
    #[inline]
    fn error_value() -> McString {
        McString::null()
    }

    #[inline]
    fn into_ffi(self) -> McString {
        self.into()
    }
}

impl IntoFfi<McVec<u8>> for McVec<u8> {
    #[inline]
    fn error_value() -> McVec<u8> {
        McVec::null()
    }

    #[inline]
    fn into_ffi(self) -> McVec<u8> {
        self
    }
}

impl IntoFfi<McVec<u8>> for Vec<u8> {
    #[inline]
    fn error_value() -> McVec<u8> {
        McVec::null()
    }

    #[inline]
    fn into_ffi(self) -> McVec<u8> {
        self.into()
    }
}

impl<'a> IntoFfi<McStr<'a>> for McStr<'a> {
    #[inline]
    fn error_value() -> McStr<'a> {
        McStr::empty()
    }

    #[inline]
    fn into_ffi(self) -> McStr<'a> {
        self
    }
}

impl<T> IntoFfi<FfiOptOwnedPtr<T>> for FfiOwnedPtr<T> {
    #[inline]
    fn error_value() -> FfiOptOwnedPtr<T> {
        FfiOptOwnedPtr::null()
    }

    #[inline]
    fn into_ffi(self) -> FfiOptOwnedPtr<T> {
        self.into()
    }
}
