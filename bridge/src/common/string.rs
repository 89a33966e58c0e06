// Copyright (c) 2018-2022 The MobileCoin Foundation

use super::{ffi_boundary, slice::check_view, McBuffer, McVec};
use crate::error::BridgeError;
use core::{fmt, marker, slice, str};
use libc::size_t;
use mc_util_ffi::{FfiOptRefPtr, FfiRefPtr};

/// A borrowed view of text owned by the other side: a pointer to UTF-8 bytes
/// and a byte count.
///
/// The bytes are not NUL-terminated, and an embedded zero byte is an ordinary
/// character. Foreign code is not trusted to pass valid UTF-8: the encoding is
/// checked when the view is read as `str` or materialized.
#[repr(C)]
pub struct McStr<'a> {
    buffer: FfiOptRefPtr<'a, u8>,
    len: size_t,
    _phantom: marker::PhantomData<&'a str>,
}

impl<'a> McStr<'a> {
    #[inline]
    pub fn borrow(text: &'a str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    /// A view of bytes that are only claimed to be UTF-8.
    #[inline]
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self {
            buffer: unsafe { FfiOptRefPtr::from_raw(bytes.as_ptr()) },
            len: bytes.len(),
            _phantom: marker::PhantomData,
        }
    }

    /// # Safety
    ///
    /// `ptr` must be null with `len == 0`, or point to `len` bytes that stay
    /// valid and unmodified for `'a`.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *const u8, len: size_t) -> Self {
        Self {
            buffer: FfiOptRefPtr::from_raw(ptr),
            len,
            _phantom: marker::PhantomData,
        }
    }

    #[inline]
    pub fn empty() -> Self {
        Self {
            buffer: FfiOptRefPtr::null(),
            len: 0,
            _phantom: marker::PhantomData,
        }
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> size_t {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.buffer.as_raw()
    }

    /// The raw bytes, without any encoding check.
    pub fn as_bytes(&self) -> Result<&'a [u8], BridgeError> {
        if self.len == 0 {
            return Ok(&[]);
        }
        check_view(self.buffer.as_raw(), self.len, "text view")?;
        Ok(unsafe { slice::from_raw_parts(self.buffer.as_raw(), self.len) })
    }

    pub fn to_str(&self) -> Result<&'a str, BridgeError> {
        Ok(str::from_utf8(self.as_bytes()?)?)
    }

    /// Copy the text into an owned `String`.
    ///
    /// The encoding is validated before anything is allocated, so invalid
    /// input never leaves a partial buffer behind.
    pub fn materialize(&self) -> Result<String, BridgeError> {
        let text = self.to_str()?;
        let mut result = String::new();
        result.try_reserve_exact(text.len())?;
        result.push_str(text);
        Ok(result)
    }

    #[inline]
    pub fn as_buffer(&self) -> McBuffer<'a> {
        unsafe { McBuffer::from_raw_parts(self.buffer.as_raw(), self.len) }
    }
}

impl Clone for McStr<'_> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl Copy for McStr<'_> {}

impl Default for McStr<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a> From<&'a str> for McStr<'a> {
    #[inline]
    fn from(text: &'a str) -> Self {
        Self::borrow(text)
    }
}

impl<'a> From<&'a String> for McStr<'a> {
    #[inline]
    fn from(text: &'a String) -> Self {
        Self::borrow(text)
    }
}

impl fmt::Debug for McStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.as_bytes() {
            Ok(bytes) => write!(f, "McStr({:?})", String::from_utf8_lossy(bytes)),
            Err(_) => write!(f, "McStr(null, {})", self.len),
        }
    }
}

/// Text produced by Rust and handed to foreign code by ownership. Released
/// with `mc_bridge_string_free`.
#[repr(C)]
#[derive(Default)]
pub struct McString {
    bytes: McVec<u8>,
}

impl McString {
    #[inline]
    pub fn len(&self) -> size_t {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.bytes.is_null()
    }

    pub(crate) fn null() -> Self {
        Self {
            bytes: McVec::null(),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub fn as_str(&self) -> &str {
        // Only ever built from a `String`.
        unsafe { str::from_utf8_unchecked(self.as_bytes()) }
    }

    #[inline]
    pub fn as_view(&self) -> McStr<'_> {
        McStr::borrow(self.as_str())
    }

    pub fn into_string(self) -> String {
        // Only ever built from a `String`.
        unsafe { String::from_utf8_unchecked(self.bytes.into_vec()) }
    }
}

impl From<String> for McString {
    fn from(text: String) -> Self {
        Self {
            bytes: McVec::from(text.into_bytes()),
        }
    }
}

impl From<&str> for McString {
    fn from(text: &str) -> Self {
        Self::from(text.to_owned())
    }
}

impl fmt::Debug for McString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "McString({:?})", self.as_str())
    }
}

impl fmt::Display for McString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Releases text handed out by Rust.
#[no_mangle]
pub extern "C" fn mc_bridge_string_free(string: McString) {
    ffi_boundary(|| drop(string))
}

/// A view of text handed out by Rust, valid until it is freed.
#[no_mangle]
pub extern "C" fn mc_bridge_string_view(string: FfiRefPtr<McString>) -> McStr {
    string.into_ref().as_view()
}
