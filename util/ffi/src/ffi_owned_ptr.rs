// Copyright (c) 2018-2022 The MobileCoin Foundation

use core::{any, mem, ops, ptr};
use displaydoc::Display;
use std::alloc::{alloc, Layout};

/// Failed to allocate {size} bytes for {type_name}
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub struct FfiAllocError {
    /// The type that could not be placed on the heap.
    pub type_name: &'static str,
    /// The number of bytes requested.
    pub size: usize,
}

/// An owned, heap-allocated `T` whose memory layout is exactly `*mut T`.
///
/// The pointee is allocated by the Rust global allocator and is released by
/// it when this value is dropped, so a pointer handed out with
/// [`FfiOwnedPtr::into_raw`] must eventually come back through
/// [`FfiOwnedPtr::from_raw`] on the Rust side to be freed.
///
/// `null` is never a valid value, but it is not a niche either: foreign code
/// can pass anything, and we check for `null` instead of invoking undefined
/// behavior.
#[derive(Debug)]
#[repr(transparent)]
pub struct FfiOwnedPtr<T: ?Sized>(*mut T);

impl<T> FfiOwnedPtr<T> {
    /// Move `t` to the heap. Aborts the process on allocation failure, like
    /// `Box::new`.
    #[inline]
    pub fn new(t: T) -> Self {
        Self(Box::into_raw(Box::new(t)))
    }

    /// Move `t` to the heap, reporting allocation failure as an error instead
    /// of aborting.
    pub fn try_new(t: T) -> Result<Self, FfiAllocError> {
        let layout = Layout::new::<T>();
        if layout.size() == 0 {
            return Ok(Self::new(t));
        }

        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc(layout) } as *mut T;
        if ptr.is_null() {
            return Err(FfiAllocError {
                type_name: any::type_name::<T>(),
                size: layout.size(),
            });
        }

        // SAFETY: `ptr` is non-null, properly aligned for `T`, and was
        // allocated with the layout `Box<T>` expects when it is released.
        unsafe { ptr.write(t) };
        Ok(Self(ptr))
    }
}

impl<T: ?Sized> FfiOwnedPtr<T> {
    /// # Safety
    ///
    /// `ptr` must have been produced by [`FfiOwnedPtr::into_raw`] (or
    /// `Box::into_raw`) and must not be owned by anything else.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        // A null pointer here is a broken precondition, not a recoverable error.
        assert!(!ptr.is_null(), "Pointer cannot be null");
        Self(ptr)
    }

    /// Give up ownership without freeing.
    #[inline]
    pub fn into_raw(self) -> *mut T {
        mem::ManuallyDrop::new(self).0
    }

    #[inline]
    pub fn as_raw(&self) -> *mut T {
        self.0
    }
}

impl<T: ?Sized> Drop for FfiOwnedPtr<T> {
    #[inline]
    fn drop(&mut self) {
        debug_assert!(!self.0.is_null());
        // SAFETY: we own the allocation and it came from the global allocator.
        unsafe { drop(Box::from_raw(self.0)) }
    }
}

impl<T: ?Sized> AsRef<T> for FfiOwnedPtr<T> {
    #[inline]
    fn as_ref(&self) -> &T {
        unsafe { self.0.as_ref() }.expect("Pointer cannot be null")
    }
}

impl<T: ?Sized> AsMut<T> for FfiOwnedPtr<T> {
    #[inline]
    fn as_mut(&mut self) -> &mut T {
        unsafe { self.0.as_mut() }.expect("Pointer cannot be null")
    }
}

impl<T: ?Sized> ops::Deref for FfiOwnedPtr<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl<T: ?Sized> ops::DerefMut for FfiOwnedPtr<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut()
    }
}

unsafe impl<T: Send + ?Sized> Send for FfiOwnedPtr<T> {}
unsafe impl<T: Send + Sync + ?Sized> Sync for FfiOwnedPtr<T> {}

/// Same as [`FfiOwnedPtr`] but `null` is a valid value, meaning "nothing".
/// Used for out-parameters and for return values that can fail.
#[derive(Debug)]
#[repr(transparent)]
pub struct FfiOptOwnedPtr<T: ?Sized>(*mut T);

impl<T> FfiOptOwnedPtr<T> {
    #[inline]
    pub fn new(t: Option<T>) -> Self {
        match t {
            Some(t) => FfiOwnedPtr::new(t).into(),
            None => Self::null(),
        }
    }

    #[inline]
    pub fn null() -> Self {
        Self(ptr::null_mut())
    }
}

impl<T: ?Sized> FfiOptOwnedPtr<T> {
    /// # Safety
    ///
    /// `ptr` must be null or satisfy the preconditions of
    /// [`FfiOwnedPtr::from_raw`].
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self(ptr)
    }

    #[inline]
    pub fn into_raw(self) -> *mut T {
        mem::ManuallyDrop::new(self).0
    }

    #[inline]
    pub fn as_raw(&self) -> *mut T {
        self.0
    }

    #[inline]
    pub fn as_ref(&self) -> Option<&T> {
        unsafe { self.0.as_ref() }
    }

    #[inline]
    pub fn as_mut(&mut self) -> Option<&mut T> {
        unsafe { self.0.as_mut() }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    #[inline]
    pub fn into_option(self) -> Option<FfiOwnedPtr<T>> {
        if self.is_null() {
            None
        } else {
            Some(unsafe { FfiOwnedPtr::from_raw(self.into_raw()) })
        }
    }
}

impl<T> Default for FfiOptOwnedPtr<T> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> From<FfiOwnedPtr<T>> for FfiOptOwnedPtr<T> {
    #[inline]
    fn from(ptr: FfiOwnedPtr<T>) -> Self {
        unsafe { Self::from_raw(ptr.into_raw()) }
    }
}

impl<T: ?Sized> Drop for FfiOptOwnedPtr<T> {
    #[inline]
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { drop(Box::from_raw(self.0)) }
        }
    }
}

unsafe impl<T: Send + ?Sized> Send for FfiOptOwnedPtr<T> {}
unsafe impl<T: Send + Sync + ?Sized> Sync for FfiOptOwnedPtr<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        rc::Rc,
        sync::atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn try_new_round_trips_through_raw() {
        let owned = FfiOwnedPtr::try_new(41u64).unwrap();
        let raw = owned.into_raw();
        let mut owned = unsafe { FfiOwnedPtr::from_raw(raw) };
        *owned += 1;
        assert_eq!(*owned, 42);
    }

    #[test]
    fn try_new_handles_zero_sized_types() {
        let owned = FfiOwnedPtr::try_new(()).unwrap();
        assert!(!owned.as_raw().is_null());
    }

    #[test]
    fn drop_runs_exactly_once() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let owned = FfiOwnedPtr::try_new(Counted).unwrap();
        let opt = FfiOptOwnedPtr::from(owned);
        let owned = opt.into_option().unwrap();
        drop(owned);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_opt_is_none() {
        let opt = FfiOptOwnedPtr::<Rc<u8>>::null();
        assert!(opt.is_null());
        assert!(opt.as_ref().is_none());
        assert!(opt.into_option().is_none());
    }
}
