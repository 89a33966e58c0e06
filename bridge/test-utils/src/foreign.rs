// Copyright (c) 2018-2022 The MobileCoin Foundation

//! The foreign side of the demo bridge.
//!
//! Everything here is written the way C code on the other side of the
//! boundary would be: objects live in `malloc`ed memory, host functions are
//! reached through their `extern "C"` declarations, and data crosses only as
//! the `#[repr(C)]` header types. The wire structs mirror the host's shared
//! structs field for field.

use core::{
    ffi::c_void,
    mem, ptr, slice,
    sync::atomic::{AtomicUsize, Ordering},
};
use mc_bridge::{
    common::mc_bridge_error_raise,
    error::error_codes::MC_BRIDGE_CALLEE_CODE_ALLOCATION,
    ForeignVec, ForeignVecVtable, McBuffer, McStr, OutError, RawHandle,
};
use mc_util_ffi::FfiOptMutPtr;

/// Code raised by constructors that refuse a name.
pub const DEMO_ERROR_CODE_REJECTED: i32 = 7;

/// Code raised for arguments the foreign side will not work with.
pub const DEMO_ERROR_CODE_BAD_ARGUMENT: i32 = 8;

/// Code raised by a listener that is handed `u32::MAX`.
pub const DEMO_ERROR_CODE_OVERFLOW: i32 = 9;

extern "C" {
    fn mc_demo_print_r(thing: RawHandle, out_error: OutError) -> bool;
    fn mc_demo_thing_r_free(thing: RawHandle);
    fn mc_demo_thing_c_take(thing: RawHandle) -> *mut c_void;
}

static LIVE_BYTE_VECS: AtomicUsize = AtomicUsize::new(0);

/// Byte vectors the foreign side has allocated and not yet freed.
pub fn live_byte_vecs() -> usize {
    LIVE_BYTE_VECS.load(Ordering::SeqCst)
}

fn raise(out_error: &mut OutError, code: i32, message: &str) {
    mc_bridge_error_raise(
        FfiOptMutPtr::from(out_error.as_mut()),
        code,
        McStr::borrow(message),
    );
}

fn raised(out_error: &mut OutError) -> bool {
    out_error.as_mut().map_or(false, |slot| !slot.is_null())
}

/// The demo object the foreign side owns.
#[repr(C)]
pub struct ThingCObject {
    name: *mut u8,
    name_len: usize,
    drops: *const AtomicUsize,
}

unsafe fn thing_c_alloc(name: McStr, drops: *const AtomicUsize) -> *mut ThingCObject {
    let bytes = match name.as_bytes() {
        Ok(bytes) => bytes,
        Err(_) => return ptr::null_mut(),
    };
    let object = libc::malloc(mem::size_of::<ThingCObject>()) as *mut ThingCObject;
    if object.is_null() {
        return ptr::null_mut();
    }
    let copy = libc::malloc(bytes.len().max(1)) as *mut u8;
    if copy.is_null() {
        libc::free(object as *mut c_void);
        return ptr::null_mut();
    }
    ptr::copy_nonoverlapping(bytes.as_ptr(), copy, bytes.len());
    object.write(ThingCObject {
        name: copy,
        name_len: bytes.len(),
        drops,
    });
    object
}

/// # Safety
///
/// `drops` must be null or outlive the object.
#[no_mangle]
pub unsafe extern "C" fn demo_thing_c_new(
    name: McStr,
    drops: *const AtomicUsize,
    mut out_error: OutError,
) -> *mut ThingCObject {
    let object = thing_c_alloc(name, drops);
    if object.is_null() {
        raise(&mut out_error, MC_BRIDGE_CALLEE_CODE_ALLOCATION, "out of memory");
    }
    object
}

/// Builds the object, then refuses the name. The half-built object is still
/// returned, for the caller to destroy.
///
/// # Safety
///
/// `drops` must be null or outlive the object.
#[no_mangle]
pub unsafe extern "C" fn demo_thing_c_new_rejecting(
    name: McStr,
    drops: *const AtomicUsize,
    mut out_error: OutError,
) -> *mut ThingCObject {
    let object = thing_c_alloc(name, drops);
    raise(&mut out_error, DEMO_ERROR_CODE_REJECTED, "name rejected");
    object
}

/// Fails the way an allocator that has run dry does: null, and nothing else.
#[no_mangle]
pub extern "C" fn demo_thing_c_new_exhausted(
    _name: McStr,
    _drops: *const AtomicUsize,
    _out_error: OutError,
) -> *mut ThingCObject {
    ptr::null_mut()
}

/// # Safety
///
/// `object` must be null or come from one of the `demo_thing_c_new`
/// constructors, and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn demo_thing_c_destroy(object: *mut c_void) {
    let object = object as *mut ThingCObject;
    if object.is_null() {
        return;
    }
    if let Some(drops) = (*object).drops.as_ref() {
        drops.fetch_add(1, Ordering::SeqCst);
    }
    libc::free((*object).name as *mut c_void);
    libc::free(object as *mut c_void);
}

/// # Safety
///
/// `object` must be a live object. The view is valid until it is destroyed.
#[no_mangle]
pub unsafe extern "C" fn demo_thing_c_get_name(object: *const ThingCObject) -> McStr<'static> {
    McStr::from_raw_parts((*object).name, (*object).name_len)
}

/// A growable byte array behind [`ForeignVecVtable`].
#[repr(C)]
struct ByteVec {
    data: *mut u8,
    len: usize,
    capacity: usize,
}

unsafe extern "C" fn byte_vec_len(object: *const c_void) -> usize {
    (*(object as *const ByteVec)).len
}

unsafe extern "C" fn byte_vec_data(object: *const c_void) -> *const u8 {
    (*(object as *const ByteVec)).data
}

unsafe extern "C" fn byte_vec_reserve(object: *mut c_void, additional: usize) -> bool {
    let vec = &mut *(object as *mut ByteVec);
    let needed = match vec.len.checked_add(additional) {
        Some(needed) => needed,
        None => return false,
    };
    if needed <= vec.capacity {
        return true;
    }
    let capacity = needed.max(vec.capacity.saturating_mul(2)).max(8);
    let data = libc::realloc(vec.data as *mut c_void, capacity) as *mut u8;
    if data.is_null() {
        return false;
    }
    vec.data = data;
    vec.capacity = capacity;
    true
}

unsafe extern "C" fn byte_vec_push(object: *mut c_void, item: *const u8) -> bool {
    if !byte_vec_reserve(object, 1) {
        return false;
    }
    let vec = &mut *(object as *mut ByteVec);
    *vec.data.add(vec.len) = *item;
    vec.len += 1;
    true
}

unsafe extern "C" fn byte_vec_truncate(object: *mut c_void, len: usize) {
    let vec = &mut *(object as *mut ByteVec);
    vec.len = vec.len.min(len);
}

unsafe extern "C" fn byte_vec_drop(object: *mut c_void) {
    let vec = object as *mut ByteVec;
    libc::free((*vec).data as *mut c_void);
    libc::free(object);
    LIVE_BYTE_VECS.fetch_sub(1, Ordering::SeqCst);
}

static BYTE_VEC_VTABLE: ForeignVecVtable<u8> = ForeignVecVtable {
    len: byte_vec_len,
    data: byte_vec_data,
    reserve: byte_vec_reserve,
    push: byte_vec_push,
    truncate: byte_vec_truncate,
    drop: byte_vec_drop,
};

unsafe fn byte_vec_alloc() -> *mut ByteVec {
    let vec = libc::malloc(mem::size_of::<ByteVec>()) as *mut ByteVec;
    if !vec.is_null() {
        vec.write(ByteVec {
            data: ptr::null_mut(),
            len: 0,
            capacity: 0,
        });
        LIVE_BYTE_VECS.fetch_add(1, Ordering::SeqCst);
    }
    vec
}

unsafe fn byte_vec_wrap(vec: *mut ByteVec) -> ForeignVec<u8> {
    ForeignVec::from_raw(vec as *mut c_void, &BYTE_VEC_VTABLE)
}

/// An empty foreign byte vector, or a null one if allocation failed.
#[no_mangle]
pub extern "C" fn demo_byte_vec_new() -> ForeignVec<u8> {
    unsafe {
        let vec = byte_vec_alloc();
        if vec.is_null() {
            return ForeignVec::null();
        }
        byte_vec_wrap(vec)
    }
}

/// The wire form of the host's `SharedThing`.
#[repr(C)]
pub struct SharedThingWire {
    pub z: i32,
    pub y: RawHandle,
    pub x: RawHandle,
}

/// Takes ownership of both handles in `state`: prints `y` through the host,
/// then frees it, and takes `x` back and destroys it. Returns `i * i` for
/// each `i` below `z`.
///
/// # Safety
///
/// `state` must hold handles transferred to the foreign side.
#[no_mangle]
pub unsafe extern "C" fn demo_do_thing(
    state: SharedThingWire,
    mut out_error: OutError,
) -> ForeignVec<u8> {
    let printed = mc_demo_print_r(state.y, FfiOptMutPtr::from(out_error.as_mut()));
    mc_demo_thing_r_free(state.y);
    demo_thing_c_destroy(mc_demo_thing_c_take(state.x));
    if !printed {
        return ForeignVec::null();
    }
    if state.z < 0 {
        raise(&mut out_error, DEMO_ERROR_CODE_BAD_ARGUMENT, "negative length");
        return ForeignVec::null();
    }

    let vec = byte_vec_alloc();
    if vec.is_null() || !byte_vec_reserve(vec as *mut c_void, state.z as usize) {
        if !vec.is_null() {
            byte_vec_drop(vec as *mut c_void);
        }
        raise(&mut out_error, MC_BRIDGE_CALLEE_CODE_ALLOCATION, "out of memory");
        return ForeignVec::null();
    }
    for i in 0..state.z {
        let item = i.wrapping_mul(i) as u8;
        byte_vec_push(vec as *mut c_void, &item);
    }
    byte_vec_wrap(vec)
}

/// Prints a host object it was lent, twice.
///
/// # Safety
///
/// `thing` must be lent for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn demo_describe_r(thing: RawHandle, mut out_error: OutError) -> bool {
    for _ in 0..2 {
        if !mc_demo_print_r(thing, FfiOptMutPtr::from(out_error.as_mut())) {
            return false;
        }
    }
    true
}

/// # Safety
///
/// `bytes` must be a valid view.
#[no_mangle]
pub unsafe extern "C" fn demo_sum_bytes(bytes: McBuffer) -> u64 {
    if bytes.as_ptr().is_null() {
        return 0;
    }
    slice::from_raw_parts(bytes.as_ptr(), bytes.len())
        .iter()
        .map(|byte| *byte as u64)
        .sum()
}

/// Copy a view into a new foreign byte vector.
///
/// # Safety
///
/// `bytes` must be a valid view.
#[no_mangle]
pub unsafe extern "C" fn demo_bytes_copy(bytes: McBuffer, mut out_error: OutError) -> ForeignVec<u8> {
    if bytes.as_ptr().is_null() && !bytes.is_empty() {
        raise(&mut out_error, DEMO_ERROR_CODE_BAD_ARGUMENT, "null view");
        return ForeignVec::null();
    }
    let vec = byte_vec_alloc();
    if vec.is_null() || !byte_vec_reserve(vec as *mut c_void, bytes.len()) {
        if !vec.is_null() {
            byte_vec_drop(vec as *mut c_void);
        }
        raise(&mut out_error, MC_BRIDGE_CALLEE_CODE_ALLOCATION, "out of memory");
        return ForeignVec::null();
    }
    if !bytes.is_empty() {
        ptr::copy_nonoverlapping(bytes.as_ptr(), (*vec).data, bytes.len());
        (*vec).len = bytes.len();
    }
    byte_vec_wrap(vec)
}

/// The wire form of `McCallback<i32>`.
#[repr(C)]
pub struct I32Callback {
    call: Option<unsafe extern "C" fn(context: *mut c_void, arg: i32, out_error: OutError)>,
    context: *mut c_void,
}

/// Call `callback` with `0..times`, stopping at the first error it raises.
///
/// # Safety
///
/// `callback` must be valid for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn demo_apply(
    callback: I32Callback,
    times: i32,
    mut out_error: OutError,
) -> bool {
    let call = match callback.call {
        Some(call) => call,
        None => {
            raise(&mut out_error, DEMO_ERROR_CODE_BAD_ARGUMENT, "no callback");
            return false;
        }
    };
    for i in 0..times {
        call(callback.context, i, FfiOptMutPtr::from(out_error.as_mut()));
        if raised(&mut out_error) {
            return false;
        }
    }
    true
}

/// The wire form of `RetainedCallback<u32>`.
#[repr(C)]
pub struct ListenerWire {
    call: Option<unsafe extern "C" fn(context: *mut c_void, arg: u32, out_error: OutError)>,
    context: *mut c_void,
    release: Option<unsafe extern "C" fn(context: *mut c_void)>,
}

#[repr(C)]
struct ListenerState {
    total: *const AtomicUsize,
    releases: *const AtomicUsize,
}

unsafe extern "C" fn listener_call(context: *mut c_void, arg: u32, mut out_error: OutError) {
    if arg == u32::MAX {
        raise(&mut out_error, DEMO_ERROR_CODE_OVERFLOW, "listener overflow");
        return;
    }
    let state = &*(context as *const ListenerState);
    (*state.total).fetch_add(arg as usize, Ordering::SeqCst);
}

unsafe extern "C" fn listener_release(context: *mut c_void) {
    let state = &*(context as *const ListenerState);
    (*state.releases).fetch_add(1, Ordering::SeqCst);
    libc::free(context);
}

/// A listener that adds every value it is called with to `total`, and
/// counts its release in `releases`.
///
/// # Safety
///
/// Both counters must outlive the listener.
#[no_mangle]
pub unsafe extern "C" fn demo_listener_new(
    total: *const AtomicUsize,
    releases: *const AtomicUsize,
) -> ListenerWire {
    let state = libc::malloc(mem::size_of::<ListenerState>()) as *mut ListenerState;
    if state.is_null() {
        return ListenerWire {
            call: None,
            context: ptr::null_mut(),
            release: None,
        };
    }
    state.write(ListenerState { total, releases });
    ListenerWire {
        call: Some(listener_call),
        context: state as *mut c_void,
        release: Some(listener_release),
    }
}

/// The wire form of the host's `Sample`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SampleWire {
    pub id: u32,
    pub weight: f64,
    pub flags: u8,
}

#[no_mangle]
pub extern "C" fn demo_sample_echo(sample: SampleWire) -> SampleWire {
    sample
}

/// A value that depends on every field and nothing else.
#[no_mangle]
pub extern "C" fn demo_sample_checksum(sample: SampleWire) -> u64 {
    (sample.id as u64)
        .wrapping_mul(0x9e37_79b9_7f4a_7c15)
        .rotate_left(17)
        ^ sample.weight.to_bits()
        ^ ((sample.flags as u64) << 56)
}
