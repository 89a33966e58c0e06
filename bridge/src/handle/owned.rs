// Copyright (c) 2018-2022 The MobileCoin Foundation

use super::{Opaque, Side};
use crate::{
    call::OutError,
    config::BridgeConfig,
    error::{abort_on_violation, BridgeError},
};
use core::{fmt, marker::PhantomData, mem::ManuallyDrop, ops, ptr::NonNull};

/// The identifier of a registered object as it crosses the boundary: a slot
/// index and the generation the slot had when the object was registered.
///
/// Generation 0 is never issued, so [`RawHandle::NULL`] never names a live
/// object.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct RawHandle {
    pub index: u32,
    pub generation: u32,
}

impl RawHandle {
    pub const NULL: RawHandle = RawHandle {
        index: 0,
        generation: 0,
    };

    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.generation == 0
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// The host's owning reference to a registered object.
///
/// Dropping it destroys the object. Passing it to the foreign side by
/// ownership ([`OpaqueHandle::into_raw`]) moves destruction responsibility
/// there; the foreign side then releases it through the type's `free`
/// function.
#[repr(transparent)]
pub struct OpaqueHandle<T: Opaque> {
    raw: RawHandle,
    _phantom: PhantomData<*const T>,
}

unsafe impl<T: Opaque + Send> Send for OpaqueHandle<T> {}
unsafe impl<T: Opaque + Sync> Sync for OpaqueHandle<T> {}

impl<T: Opaque> OpaqueHandle<T> {
    /// Move `value` to the host heap. Only valid for host-owned types.
    pub fn new(value: T) -> Result<Self, BridgeError> {
        Ok(Self::wrap(T::registry().create(value)?))
    }

    /// Register an object the foreign side constructed.
    ///
    /// # Safety
    ///
    /// See [`HandleRegistry::adopt`](super::HandleRegistry::adopt).
    pub unsafe fn adopt(object: *mut T, destructor: super::Destructor) -> Result<Self, BridgeError> {
        Ok(Self::wrap(T::registry().adopt(object, destructor)?))
    }

    /// Construct a foreign-owned object through a constructor that reports
    /// failure through an error slot.
    ///
    /// # Safety
    ///
    /// See [`HandleRegistry::construct_foreign`](super::HandleRegistry::construct_foreign).
    pub unsafe fn construct_foreign(
        destructor: super::Destructor,
        ctor: impl FnOnce(OutError) -> *mut T,
    ) -> Result<Self, BridgeError> {
        Ok(Self::wrap(T::registry().construct_foreign(destructor, ctor)?))
    }

    pub(crate) fn wrap(raw: RawHandle) -> Self {
        Self {
            raw,
            _phantom: PhantomData,
        }
    }

    #[inline]
    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    /// The object's address, for passing to the owning side's functions.
    pub fn as_ptr(&self) -> NonNull<T> {
        T::registry()
            .resolve(self.raw)
            .unwrap_or_else(|err| abort_on_violation(&err))
    }

    /// Hand the object to the foreign side by ownership.
    pub fn into_raw(self) -> RawHandle {
        let this = ManuallyDrop::new(self);
        if let Err(err) = T::registry().transfer(this.raw, Side::Host, Side::Foreign) {
            abort_on_violation(&err);
        }
        this.raw
    }

    /// Take back an object previously handed to the foreign side by
    /// ownership.
    pub fn from_raw(raw: RawHandle) -> Result<Self, BridgeError> {
        T::registry().transfer(raw, Side::Foreign, Side::Host)?;
        Ok(Self::wrap(raw))
    }

}

impl<T: Opaque> ops::Deref for OpaqueHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.as_ptr().as_ref() }
    }
}

impl<T: Opaque> Drop for OpaqueHandle<T> {
    fn drop(&mut self) {
        if let Err(err) = T::registry().destroy(self.raw, Side::Host) {
            abort_on_violation(&err);
        }
    }
}

impl<T: Opaque> fmt::Debug for OpaqueHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "OpaqueHandle<{}>({})", T::registry().type_name(), self.raw)
    }
}

/// A by-reference identifier, valid for the call it was lent to.
///
/// It is layout-identical to [`RawHandle`] and is meant to be used directly
/// as a parameter type of `extern "C"` functions. Resolving it goes through
/// the registry, so a stale identifier is caught instead of dereferenced.
///
/// A resolved object is borrowed from the `HandleRef` itself, never for
/// `'a`, so it cannot be held past the point where the identifier goes away:
///
/// ```compile_fail
/// use mc_bridge::{opaque_type, HandleRef, RawHandle};
///
/// struct Thing(i32);
/// opaque_type!(Thing: Host);
///
/// fn keep(raw: RawHandle) -> &'static Thing {
///     let thing = unsafe { HandleRef::<'static, Thing>::from_raw(raw) };
///     thing.get().unwrap()
/// }
/// ```
#[repr(transparent)]
pub struct HandleRef<'a, T: Opaque> {
    raw: RawHandle,
    _phantom: PhantomData<&'a T>,
}

impl<'a, T: Opaque> HandleRef<'a, T> {
    /// Rebuild a by-reference identifier from the raw handle the owning side
    /// handed out. The identifier itself is checked when it is resolved.
    ///
    /// # Safety
    ///
    /// The object `raw` names must not be destroyed while `'a` lasts, or
    /// while anything resolved through this value is still in use. An
    /// `extern "C"` function taking a `HandleRef` parameter places this
    /// obligation on its foreign caller, for the duration of the call.
    pub unsafe fn from_raw(raw: RawHandle) -> Self {
        Self {
            raw,
            _phantom: PhantomData,
        }
    }

    #[inline]
    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    fn resolve(&self) -> Result<NonNull<T>, BridgeError> {
        let check = BridgeConfig::current().ref_check.enabled();
        T::registry().resolve_ref(self.raw, check)
    }

    /// The object, borrowed for as long as this `HandleRef` is.
    pub fn get(&self) -> Result<&T, BridgeError> {
        Ok(unsafe { self.resolve()?.as_ref() })
    }

    /// The object's address, for passing to the owning side's functions.
    pub fn as_ptr(&self) -> Result<*mut T, BridgeError> {
        Ok(self.resolve()?.as_ptr())
    }
}

impl<T: Opaque> Clone for HandleRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Opaque> Copy for HandleRef<'_, T> {}

impl<T: Opaque> fmt::Debug for HandleRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HandleRef<{}>({})", T::registry().type_name(), self.raw)
    }
}
