// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Opaque handles: objects owned by one side and referenced, but never
//! inspected, by the other.
//!
//! Every opaque type has one [`HandleRegistry`], declared with
//! [`opaque_type!`](crate::opaque_type). The other side only ever sees a
//! [`RawHandle`], which it presents back to the owning side's functions.

mod owned;
mod registry;

pub use self::{
    owned::{HandleRef, OpaqueHandle, RawHandle},
    registry::{Destructor, HandleRegistry, RegistryStats},
};

use crate::{common::ffi_boundary, error::abort_on_violation};
use core::{fmt, ptr};

/// The two sides of the boundary.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Side {
    /// Rust.
    Host,
    /// Code reached through the C ABI.
    Foreign,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Host => Side::Foreign,
            Side::Foreign => Side::Host,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Host => f.write_str("host"),
            Side::Foreign => f.write_str("foreign"),
        }
    }
}

/// A type that crosses the boundary only as a handle.
pub trait Opaque: Sized + 'static {
    fn registry() -> &'static HandleRegistry<Self>;
}

/// Destroy an object the foreign side holds. Backs the `free` functions
/// generated by [`opaque_type!`](crate::opaque_type).
///
/// A null handle is ignored. Anything else that does not name an object the
/// foreign side holds (a second free, a handle it never owned) is fatal.
pub fn free_from_foreign<T: Opaque>(raw: RawHandle) {
    ffi_boundary(|| {
        if raw.is_null() {
            return;
        }
        if let Err(err) = T::registry().destroy(raw, Side::Foreign) {
            abort_on_violation(&err);
        }
    })
}

/// Give a foreign-owned object back to its owner without destroying it.
/// Backs the `take` functions generated by
/// [`opaque_type!`](crate::opaque_type).
pub fn take_from_foreign<T: Opaque>(raw: RawHandle) -> *mut T {
    if raw.is_null() {
        return ptr::null_mut();
    }
    match T::registry().release(raw, Side::Foreign) {
        Ok(object) => object.as_ptr(),
        Err(err) => abort_on_violation(&err),
    }
}

/// Declare the registry of an opaque type, and the C functions the foreign
/// side uses to give up a handle it holds.
///
/// ```ignore
/// struct Thing { .. }
/// opaque_type!(Thing: Host, free = mc_thing_free);
///
/// #[repr(C)]
/// struct Blob { _private: [u8; 0] }
/// opaque_type!(Blob: Foreign, take = mc_blob_take);
/// ```
///
/// For a host-owned type, `free` destroys the object. For a foreign-owned
/// type, `take` hands the object's address back to its owner, which destroys
/// it itself.
#[macro_export]
macro_rules! opaque_type {
    (@registry $ty:ident, $side:ident) => {
        impl $crate::handle::Opaque for $ty {
            fn registry() -> &'static $crate::handle::HandleRegistry<Self> {
                static REGISTRY: $crate::handle::HandleRegistry<$ty> =
                    $crate::handle::HandleRegistry::new(
                        stringify!($ty),
                        $crate::handle::Side::$side,
                    );
                &REGISTRY
            }
        }
    };
    ($ty:ident : Host $(, free = $free:ident)? $(,)?) => {
        $crate::opaque_type!(@registry $ty, Host);
        $(
            #[no_mangle]
            pub extern "C" fn $free(handle: $crate::handle::RawHandle) {
                $crate::handle::free_from_foreign::<$ty>(handle)
            }
        )?
    };
    ($ty:ident : Foreign $(, take = $take:ident)? $(,)?) => {
        $crate::opaque_type!(@registry $ty, Foreign);
        $(
            #[no_mangle]
            pub extern "C" fn $take(handle: $crate::handle::RawHandle) -> *mut $ty {
                $crate::handle::take_from_foreign::<$ty>(handle)
            }
        )?
    };
}
