// Copyright (c) 2018-2022 The MobileCoin Foundation

use super::{ffi_boundary, ffi_boundary_with_error, McBuffer, McError, McMutableBuffer, McSlice};
use crate::error::BridgeError;
use core::{ffi::c_void, fmt, mem::ManuallyDrop, ptr};
use libc::{size_t, ssize_t};
use mc_util_ffi::{FfiMutPtr, FfiOptMutPtr, FfiOptOwnedPtr, FfiRefPtr};

/// A Rust `Vec<T>` whose ownership has been handed to foreign code.
///
/// Foreign code reads it through `ptr`/`len` and must give it back to the
/// matching `mc_bridge_vec_*_free` function, since only the Rust allocator
/// can release it.
#[repr(C)]
pub struct McVec<T> {
    ptr: *mut T,
    len: size_t,
    capacity: size_t,
}

impl<T> McVec<T> {
    pub fn new() -> Self {
        Vec::new().into()
    }

    #[inline]
    pub fn len(&self) -> size_t {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether this is the sentinel returned by a failed call.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    pub(crate) fn null() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
            capacity: 0,
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        if self.ptr.is_null() {
            &[]
        } else {
            unsafe { core::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    #[inline]
    pub fn view(&self) -> McSlice<'_, T> {
        McSlice::borrow(self.as_slice())
    }

    pub fn into_vec(self) -> Vec<T> {
        let this = ManuallyDrop::new(self);
        if this.ptr.is_null() {
            Vec::new()
        } else {
            unsafe { Vec::from_raw_parts(this.ptr, this.len, this.capacity) }
        }
    }
}

impl<T: Copy> McVec<T> {
    /// Append a copy of every element to `target`, which may belong to
    /// either side.
    pub fn copy_to(&self, target: &mut impl NativeSequence<T>) -> Result<(), BridgeError> {
        target.extend_from_view(self.view())
    }
}

impl<T> Default for McVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for McVec<T> {
    fn from(vec: Vec<T>) -> Self {
        let mut vec = ManuallyDrop::new(vec);
        Self {
            ptr: vec.as_mut_ptr(),
            len: vec.len(),
            capacity: vec.capacity(),
        }
    }
}

impl<T> Drop for McVec<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            drop(unsafe { Vec::from_raw_parts(self.ptr, self.len, self.capacity) });
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for McVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

unsafe impl<T: Send> Send for McVec<T> {}
unsafe impl<T: Sync> Sync for McVec<T> {}

/// What the bridge needs from a side's native growable sequence: a view of
/// its contents, and a way to grow it when materializing into it.
pub trait NativeSequence<T: Copy> {
    fn view(&self) -> McSlice<'_, T>;

    /// Make room for `additional` more elements.
    fn reserve(&mut self, additional: usize) -> Result<(), BridgeError>;

    fn append(&mut self, items: &[T]) -> Result<(), BridgeError>;

    /// Materialize `view` at the end of this sequence. On failure nothing has
    /// been appended.
    fn extend_from_view(&mut self, view: McSlice<'_, T>) -> Result<(), BridgeError> {
        let items = view.as_slice()?;
        self.reserve(items.len())?;
        self.append(items)
    }
}

impl<T: Copy> NativeSequence<T> for Vec<T> {
    fn view(&self) -> McSlice<'_, T> {
        McSlice::borrow(self)
    }

    fn reserve(&mut self, additional: usize) -> Result<(), BridgeError> {
        Ok(self.try_reserve_exact(additional)?)
    }

    fn append(&mut self, items: &[T]) -> Result<(), BridgeError> {
        self.try_reserve(items.len())?;
        self.extend_from_slice(items);
        Ok(())
    }
}

/// Operations of a foreign growable sequence, implemented by its owner.
///
/// `object` arguments are the `object` field of the `ForeignVec`.
#[repr(C)]
pub struct ForeignVecVtable<T> {
    pub len: unsafe extern "C" fn(object: *const c_void) -> size_t,
    pub data: unsafe extern "C" fn(object: *const c_void) -> *const T,
    /// Returns false if the owner could not allocate.
    pub reserve: unsafe extern "C" fn(object: *mut c_void, additional: size_t) -> bool,
    /// Appends a copy of `*item`. Returns false if the owner could not
    /// allocate.
    pub push: unsafe extern "C" fn(object: *mut c_void, item: *const T) -> bool,
    /// Shortens the sequence to `len` elements. Never called with a `len`
    /// larger than the current length.
    pub truncate: unsafe extern "C" fn(object: *mut c_void, len: size_t),
    /// Releases the object. Called exactly once.
    pub drop: unsafe extern "C" fn(object: *mut c_void),
}

/// A growable sequence owned by foreign code, handed to Rust by ownership.
///
/// Rust never touches the memory directly except through a view; growing and
/// releasing go back through the owner's vtable. A null `object` is the
/// failure sentinel of a call that returns one.
#[repr(C)]
pub struct ForeignVec<T: 'static> {
    object: *mut c_void,
    vtable: Option<&'static ForeignVecVtable<T>>,
}

impl<T: 'static> ForeignVec<T> {
    /// # Safety
    ///
    /// `object` must be a live object the functions in `vtable` accept, and
    /// ownership of it passes to the returned value.
    pub unsafe fn from_raw(object: *mut c_void, vtable: &'static ForeignVecVtable<T>) -> Self {
        Self {
            object,
            vtable: Some(vtable),
        }
    }

    pub fn null() -> Self {
        Self {
            object: ptr::null_mut(),
            vtable: None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.object.is_null() || self.vtable.is_none()
    }

    pub fn len(&self) -> usize {
        match self.vtable {
            Some(vtable) if !self.object.is_null() => unsafe { (vtable.len)(self.object) },
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn vtable(&self) -> Result<&'static ForeignVecVtable<T>, BridgeError> {
        match self.vtable {
            Some(vtable) if !self.object.is_null() => Ok(vtable),
            _ => Err(BridgeError::ContractViolation(
                "use of a null foreign vector".into(),
            )),
        }
    }
}

impl<T: Copy + 'static> ForeignVec<T> {
    /// Copy the contents into a Rust `Vec`.
    pub fn to_vec(&self) -> Result<Vec<T>, BridgeError> {
        let mut result = Vec::new();
        result.extend_from_view(self.view())?;
        Ok(result)
    }
}

impl<T: Copy + 'static> NativeSequence<T> for ForeignVec<T> {
    fn view(&self) -> McSlice<'_, T> {
        match self.vtable {
            Some(vtable) if !self.object.is_null() => unsafe {
                McSlice::from_raw_parts((vtable.data)(self.object), (vtable.len)(self.object))
            },
            _ => McSlice::empty(),
        }
    }

    fn reserve(&mut self, additional: usize) -> Result<(), BridgeError> {
        let vtable = self.vtable()?;
        if unsafe { (vtable.reserve)(self.object, additional) } {
            Ok(())
        } else {
            Err(BridgeError::AllocationFailure(format!(
                "foreign vector could not grow by {} elements",
                additional
            )))
        }
    }

    /// Pushes one element at a time. If a push fails, the elements already
    /// pushed are removed again.
    fn append(&mut self, items: &[T]) -> Result<(), BridgeError> {
        let vtable = self.vtable()?;
        let start = unsafe { (vtable.len)(self.object) };
        for (pushed, item) in items.iter().enumerate() {
            if !unsafe { (vtable.push)(self.object, item) } {
                unsafe { (vtable.truncate)(self.object, start) };
                return Err(BridgeError::AllocationFailure(format!(
                    "foreign vector push failed after {} of {} elements",
                    pushed,
                    items.len()
                )));
            }
        }
        Ok(())
    }
}

impl<T: 'static> Drop for ForeignVec<T> {
    fn drop(&mut self) {
        if let Some(vtable) = self.vtable.take() {
            if !self.object.is_null() {
                unsafe { (vtable.drop)(self.object) };
            }
        }
        self.object = ptr::null_mut();
    }
}

impl<T: 'static> fmt::Debug for ForeignVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ForeignVec")
            .field("object", &self.object)
            .field("len", &self.len())
            .finish()
    }
}

/// Releases a byte vector handed out by Rust.
#[no_mangle]
pub extern "C" fn mc_bridge_vec_u8_free(vec: McVec<u8>) {
    ffi_boundary(|| drop(vec))
}

/// A view of a byte vector handed out by Rust, valid until it is freed.
#[no_mangle]
pub extern "C" fn mc_bridge_vec_u8_view(vec: FfiRefPtr<McVec<u8>>) -> McBuffer {
    let vec = vec.into_ref();
    McBuffer::borrow(vec.as_slice())
}

/// Copies a byte vector handed out by Rust into a caller-owned buffer.
///
/// # Returns
///
/// The number of bytes copied, or -1 on error.
///
/// # Errors
///
/// * `BridgeError::InvalidInput` - if `out_buffer` is too small.
#[no_mangle]
pub extern "C" fn mc_bridge_vec_u8_copy_to(
    vec: FfiRefPtr<McVec<u8>>,
    out_buffer: FfiMutPtr<McMutableBuffer>,
    out_error: FfiOptMutPtr<FfiOptOwnedPtr<McError>>,
) -> ssize_t {
    ffi_boundary_with_error(out_error, || {
        let vec = vec.into_ref();
        let out_buffer = out_buffer.into_mut();
        out_buffer
            .as_slice_mut_of_len(vec.len())?
            .copy_from_slice(vec.as_slice());
        ssize_t::try_from(vec.len())
            .map_err(|err| BridgeError::InvalidInput(format!("length overflow: {}", err)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn mc_vec_hands_back_the_same_allocation() {
        let data = vec![1u32, 2, 3];
        let ptr = data.as_ptr();
        let vec = McVec::from(data);
        assert_eq!(vec.len(), 3);
        let data = vec.into_vec();
        assert_eq!(data.as_ptr(), ptr);
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn copy_to_fills_caller_buffer() {
        let vec = McVec::from(vec![0u8, 9, 0, 8]);
        let mut out = [0xffu8; 6];
        let mut error = FfiOptOwnedPtr::<McError>::null();
        let copied = mc_bridge_vec_u8_copy_to(
            FfiRefPtr::from(&vec),
            FfiMutPtr::from(&mut McMutableBuffer::borrow(&mut out)),
            FfiOptMutPtr::from(&mut error),
        );
        assert_eq!(copied, 4);
        assert!(error.is_null());
        assert_eq!(out, [0, 9, 0, 8, 0xff, 0xff]);
        mc_bridge_vec_u8_free(vec);
    }

    #[test]
    fn copy_to_rejects_short_buffer() {
        let vec = McVec::from(vec![1u8, 2, 3]);
        let mut out = [0u8; 2];
        let mut error = FfiOptOwnedPtr::<McError>::null();
        let copied = mc_bridge_vec_u8_copy_to(
            FfiRefPtr::from(&vec),
            FfiMutPtr::from(&mut McMutableBuffer::borrow(&mut out)),
            FfiOptMutPtr::from(&mut error),
        );
        assert_eq!(copied, -1);
        assert!(matches!(
            BridgeError::from(error.as_ref().unwrap()),
            BridgeError::InvalidInput(_)
        ));
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn extend_from_view_appends_to_vec() {
        let mut target = vec![7u8];
        let source = [0u8, 1, 2];
        target.extend_from_view(McSlice::borrow(&source[..])).unwrap();
        assert_eq!(target, vec![7, 0, 1, 2]);
        assert_eq!(target.view().len(), 4);
    }

    // A minimal foreign vector, to check drop and growth go through the vtable.
    // Pushes fail once it holds `limit` items.
    struct Counted {
        items: Vec<u16>,
        limit: usize,
        drops: &'static AtomicUsize,
    }

    unsafe extern "C" fn counted_len(object: *const c_void) -> size_t {
        (*(object as *const Counted)).items.len()
    }

    unsafe extern "C" fn counted_data(object: *const c_void) -> *const u16 {
        (*(object as *const Counted)).items.as_ptr()
    }

    unsafe extern "C" fn counted_reserve(object: *mut c_void, additional: size_t) -> bool {
        (*(object as *mut Counted))
            .items
            .try_reserve(additional)
            .is_ok()
    }

    unsafe extern "C" fn counted_push(object: *mut c_void, item: *const u16) -> bool {
        let counted = &mut *(object as *mut Counted);
        if counted.items.len() >= counted.limit {
            return false;
        }
        counted.items.push(*item);
        true
    }

    unsafe extern "C" fn counted_truncate(object: *mut c_void, len: size_t) {
        (*(object as *mut Counted)).items.truncate(len);
    }

    unsafe extern "C" fn counted_drop(object: *mut c_void) {
        let counted = Box::from_raw(object as *mut Counted);
        counted.drops.fetch_add(1, Ordering::SeqCst);
    }

    static COUNTED_VTABLE: ForeignVecVtable<u16> = ForeignVecVtable {
        len: counted_len,
        data: counted_data,
        reserve: counted_reserve,
        push: counted_push,
        truncate: counted_truncate,
        drop: counted_drop,
    };

    fn counted(items: Vec<u16>, drops: &'static AtomicUsize) -> ForeignVec<u16> {
        counted_with_limit(items, usize::MAX, drops)
    }

    fn counted_with_limit(
        items: Vec<u16>,
        limit: usize,
        drops: &'static AtomicUsize,
    ) -> ForeignVec<u16> {
        let object = Box::into_raw(Box::new(Counted {
            items,
            limit,
            drops,
        }));
        unsafe { ForeignVec::from_raw(object as *mut c_void, &COUNTED_VTABLE) }
    }

    #[test]
    fn foreign_vec_is_released_once() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let vec = counted(vec![4, 5, 6], &DROPS);
        assert_eq!(vec.len(), 3);
        assert_eq!(vec.to_vec().unwrap(), vec![4, 5, 6]);
        drop(vec);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn host_vec_materializes_into_foreign_vec() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let mut target = counted(vec![1], &DROPS);
        let source = McVec::from(vec![2u16, 0, 3]);
        source.copy_to(&mut target).unwrap();
        assert_eq!(target.to_vec().unwrap(), vec![1, 2, 0, 3]);
        drop(target);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_pushes_leave_the_foreign_vec_unchanged() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let mut target = counted_with_limit(vec![1, 2], 4, &DROPS);
        let source = [3u16, 4, 5, 6];

        assert!(matches!(
            target.extend_from_view(McSlice::borrow(&source[..])),
            Err(BridgeError::AllocationFailure(_))
        ));
        assert_eq!(target.to_vec().unwrap(), vec![1, 2]);

        target.extend_from_view(McSlice::borrow(&source[..2])).unwrap();
        assert_eq!(target.to_vec().unwrap(), vec![1, 2, 3, 4]);
        drop(target);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_foreign_vec_is_inert() {
        let mut vec = ForeignVec::<u8>::null();
        assert!(vec.is_null());
        assert!(vec.view().is_empty());
        assert!(matches!(
            vec.reserve(1),
            Err(BridgeError::ContractViolation(_))
        ));
    }
}
