// Copyright (c) 2018-2022 The MobileCoin Foundation

use core::{fmt, marker::PhantomData, ops, ptr};

/// A borrowed `&'a T` with the memory layout of `*const T`.
///
/// This type does *not* signal a transfer of ownership. Foreign code keeps
/// ownership of the pointee and guarantees it outlives `'a`, which for
/// function parameters is the duration of the call.
#[repr(transparent)]
pub struct FfiRefPtr<'a, T: ?Sized>(*const T, PhantomData<&'a T>);

impl<'a, T: ?Sized> FfiRefPtr<'a, T> {
    /// # Safety
    ///
    /// `ptr` must be non-null, aligned and point to a valid `T` for `'a`.
    #[inline]
    pub unsafe fn from_raw(ptr: *const T) -> Self {
        assert!(!ptr.is_null(), "Pointer cannot be null");
        Self(ptr, PhantomData)
    }

    #[inline]
    pub fn as_raw(&self) -> *const T {
        self.0
    }

    #[inline]
    pub fn into_ref(self) -> &'a T {
        unsafe { &*self.0 }
    }
}

impl<'a, T: ?Sized> From<&'a T> for FfiRefPtr<'a, T> {
    #[inline]
    fn from(src: &'a T) -> Self {
        Self(src, PhantomData)
    }
}

impl<T: ?Sized> ops::Deref for FfiRefPtr<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.0 }
    }
}

impl<T: ?Sized> Clone for FfiRefPtr<'_, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for FfiRefPtr<'_, T> {}

impl<T: ?Sized> fmt::Debug for FfiRefPtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FfiRefPtr({:p})", self.0)
    }
}

/// Nullable sibling of [`FfiRefPtr`], with the layout of `*const T`.
#[repr(transparent)]
pub struct FfiOptRefPtr<'a, T>(*const T, PhantomData<Option<&'a T>>);

impl<'a, T> FfiOptRefPtr<'a, T> {
    /// # Safety
    ///
    /// `ptr` must be null, or aligned and pointing to a valid `T` for `'a`.
    #[inline]
    pub unsafe fn from_raw(ptr: *const T) -> Self {
        Self(ptr, PhantomData)
    }

    #[inline]
    pub fn null() -> Self {
        Self(ptr::null(), PhantomData)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    #[inline]
    pub fn as_raw(&self) -> *const T {
        self.0
    }

    #[inline]
    pub fn as_ref(&self) -> Option<&'a T> {
        unsafe { self.0.as_ref() }
    }

    #[inline]
    pub fn into_option(self) -> Option<FfiRefPtr<'a, T>> {
        self.as_ref().map(FfiRefPtr::from)
    }
}

impl<'a, T> From<&'a T> for FfiOptRefPtr<'a, T> {
    #[inline]
    fn from(src: &'a T) -> Self {
        Self(src, PhantomData)
    }
}

impl<'a, T> From<Option<&'a T>> for FfiOptRefPtr<'a, T> {
    #[inline]
    fn from(src: Option<&'a T>) -> Self {
        src.map(Self::from).unwrap_or_default()
    }
}

impl<T> Default for FfiOptRefPtr<'_, T> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Clone for FfiOptRefPtr<'_, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FfiOptRefPtr<'_, T> {}

impl<T> fmt::Debug for FfiOptRefPtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FfiOptRefPtr({:p})", self.0)
    }
}

/// A borrowed `&'a mut T` with the memory layout of `*mut T`. Typically an
/// out-parameter the caller allocated.
#[repr(transparent)]
pub struct FfiMutPtr<'a, T: ?Sized>(*mut T, PhantomData<&'a mut T>);

impl<'a, T: ?Sized> FfiMutPtr<'a, T> {
    /// # Safety
    ///
    /// `ptr` must be non-null, aligned, point to a valid `T` for `'a`, and not
    /// be aliased while this value exists.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        assert!(!ptr.is_null(), "Pointer cannot be null");
        Self(ptr, PhantomData)
    }

    #[inline]
    pub fn as_raw(&self) -> *mut T {
        self.0
    }

    #[inline]
    pub fn into_mut(self) -> &'a mut T {
        unsafe { &mut *self.0 }
    }
}

impl<'a, T: ?Sized> From<&'a mut T> for FfiMutPtr<'a, T> {
    #[inline]
    fn from(src: &'a mut T) -> Self {
        Self(src, PhantomData)
    }
}

impl<T: ?Sized> ops::Deref for FfiMutPtr<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.0 }
    }
}

impl<T: ?Sized> ops::DerefMut for FfiMutPtr<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.0 }
    }
}

impl<T: ?Sized> fmt::Debug for FfiMutPtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FfiMutPtr({:p})", self.0)
    }
}

/// Nullable sibling of [`FfiMutPtr`]. Used for optional out-parameters such
/// as `out_error`.
#[repr(transparent)]
pub struct FfiOptMutPtr<'a, T>(*mut T, PhantomData<Option<&'a mut T>>);

impl<'a, T> FfiOptMutPtr<'a, T> {
    /// # Safety
    ///
    /// `ptr` must be null or satisfy the preconditions of
    /// [`FfiMutPtr::from_raw`].
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self(ptr, PhantomData)
    }

    #[inline]
    pub fn null() -> Self {
        Self(ptr::null_mut(), PhantomData)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    #[inline]
    pub fn as_raw(&self) -> *mut T {
        self.0
    }

    #[inline]
    pub fn as_mut(&mut self) -> Option<&mut T> {
        unsafe { self.0.as_mut() }
    }

    #[inline]
    pub fn into_mut(self) -> Option<&'a mut T> {
        unsafe { self.0.as_mut() }
    }
}

impl<'a, T> From<&'a mut T> for FfiOptMutPtr<'a, T> {
    #[inline]
    fn from(src: &'a mut T) -> Self {
        Self(src, PhantomData)
    }
}

impl<'a, T> From<Option<&'a mut T>> for FfiOptMutPtr<'a, T> {
    #[inline]
    fn from(src: Option<&'a mut T>) -> Self {
        match src {
            Some(src) => Self::from(src),
            None => Self::null(),
        }
    }
}

impl<T> Default for FfiOptMutPtr<'_, T> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for FfiOptMutPtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FfiOptMutPtr({:p})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_ref_from_none_is_null() {
        let ptr = FfiOptRefPtr::<u32>::from(None);
        assert!(ptr.is_null());
        assert!(ptr.into_option().is_none());
    }

    #[test]
    fn opt_mut_writes_through() {
        let mut slot = 0u32;
        let out = FfiOptMutPtr::from(&mut slot);
        if let Some(value) = out.into_mut() {
            *value = 7;
        }
        assert_eq!(slot, 7);
    }

    #[test]
    fn ref_ptr_is_layout_compatible_with_raw_pointer() {
        assert_eq!(
            core::mem::size_of::<FfiRefPtr<u64>>(),
            core::mem::size_of::<*const u64>()
        );
        assert_eq!(
            core::mem::size_of::<FfiOptMutPtr<u64>>(),
            core::mem::size_of::<*mut u64>()
        );
    }
}
