// Copyright (c) 2018-2022 The MobileCoin Foundation

use crate::error::BridgeError;
use core::{fmt, marker, mem, slice};
use libc::size_t;
use mc_util_ffi::{FfiOptMutPtr, FfiOptRefPtr};

/// A borrowed `(pointer, length)` view of `T`s owned by the other side.
///
/// This type does *not* signal a transfer of ownership, and it is only valid
/// for the call it was passed to. Rust code keeps data past the call by
/// materializing it.
///
/// The length counts elements; nothing about the contents (such as a zero
/// byte) ends the view early. A null pointer is accepted only together with
/// a zero length.
#[repr(C)]
pub struct McSlice<'a, T> {
    buffer: FfiOptRefPtr<'a, T>,
    len: size_t,
    _phantom: marker::PhantomData<&'a [T]>,
}

/// A view of bytes.
pub type McBuffer<'a> = McSlice<'a, u8>;

impl<'a, T> McSlice<'a, T> {
    /// Borrow `data` without copying.
    #[inline]
    pub fn borrow(data: &'a [T]) -> Self {
        Self {
            // An empty slice still has a non-null, aligned pointer.
            buffer: unsafe { FfiOptRefPtr::from_raw(data.as_ptr()) },
            len: data.len(),
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

    /// # Safety
    ///
    /// `ptr` must be null with `len == 0`, or point to `len` initialized `T`s
    /// that stay valid and unmodified for `'a`.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *const T, len: size_t) -> Self {
        Self {
            buffer: FfiOptRefPtr::from_raw(ptr),
            len,
            _phantom: marker::PhantomData,
        }
    }

    /// Number of elements, independent of their values.
    #[inline]
    pub fn len(&self) -> size_t {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.buffer.as_raw()
    }

    pub fn as_slice(&self) -> Result<&'a [T], BridgeError> {
        if self.len == 0 {
            return Ok(&[]);
        }
        check_view(self.buffer.as_raw(), self.len, "view")?;
        Ok(unsafe { slice::from_raw_parts(self.buffer.as_raw(), self.len) })
    }
}

/// Check that a non-empty `(pointer, length)` pair from the other side can
/// be a Rust slice: not null, aligned for `T`, and at most `isize::MAX`
/// bytes long.
pub(crate) fn check_view<T>(ptr: *const T, len: usize, what: &str) -> Result<(), BridgeError> {
    if ptr.is_null() {
        return Err(BridgeError::ContractViolation(format!(
            "{} of {} elements has a null pointer",
            what, len
        )));
    }
    let fits = len
        .checked_mul(mem::size_of::<T>())
        .map_or(false, |bytes| bytes <= isize::MAX as usize);
    if !fits {
        return Err(BridgeError::InvalidInput(format!(
            "{} of {} elements is larger than any buffer",
            what, len
        )));
    }
    if (ptr as usize) % mem::align_of::<T>() != 0 {
        return Err(BridgeError::InvalidInput(format!(
            "{} pointer {:p} is not aligned to {} bytes",
            what,
            ptr,
            mem::align_of::<T>()
        )));
    }
    Ok(())
}

impl<'a, T: Copy> McSlice<'a, T> {
    /// Copy the viewed elements into a new `Vec`. Nothing is allocated when
    /// the view turns out to be malformed.
    pub fn materialize(&self) -> Result<Vec<T>, BridgeError> {
        let data = self.as_slice()?;
        let mut result = Vec::new();
        result.try_reserve_exact(data.len())?;
        result.extend_from_slice(data);
        Ok(result)
    }
}

/// Element count of a view.
#[inline]
pub fn length_of<T>(view: &McSlice<'_, T>) -> size_t {
    view.len()
}

impl<T> Clone for McSlice<'_, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for McSlice<'_, T> {}

impl<T> Default for McSlice<'_, T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a, T> From<&'a [T]> for McSlice<'a, T> {
    #[inline]
    fn from(data: &'a [T]) -> Self {
        Self::borrow(data)
    }
}

impl<'a, T> From<&'a Vec<T>> for McSlice<'a, T> {
    #[inline]
    fn from(data: &'a Vec<T>) -> Self {
        Self::borrow(data)
    }
}

impl<T> fmt::Debug for McSlice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("McSlice")
            .field("buffer", &self.buffer)
            .field("len", &self.len)
            .finish()
    }
}

/// A caller-allocated output buffer that Rust fills in.
#[repr(C)]
pub struct McMutableBuffer<'a> {
    buffer: FfiOptMutPtr<'a, u8>,
    len: size_t,
    _phantom: marker::PhantomData<&'a mut [u8]>,
}

impl<'a> McMutableBuffer<'a> {
    #[inline]
    pub fn borrow(data: &'a mut [u8]) -> Self {
        let len = data.len();
        Self {
            buffer: unsafe { FfiOptMutPtr::from_raw(data.as_mut_ptr()) },
            len,
            _phantom: marker::PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> size_t {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice_mut(&mut self) -> Result<&mut [u8], BridgeError> {
        if self.len == 0 {
            return Ok(&mut []);
        }
        check_view(self.buffer.as_raw() as *const u8, self.len, "output buffer")?;
        Ok(unsafe { slice::from_raw_parts_mut(self.buffer.as_raw(), self.len) })
    }

    pub fn as_slice_mut_of_len(&mut self, len: usize) -> Result<&mut [u8], BridgeError> {
        if self.len < len {
            return Err(BridgeError::InvalidInput(format!(
                "buffer.len() ({}) must be >= {}",
                self.len(),
                len
            )));
        }

        Ok(&mut self.as_slice_mut()?[..len])
    }
}
