// Copyright (c) 2018-2022 The MobileCoin Foundation

//! The host side of the demo bridge: its opaque and shared types, the
//! functions it exports to the foreign side, and the bridged wrappers it
//! calls the foreign side through.

use core::{
    ffi::c_void,
    sync::atomic::{AtomicUsize, Ordering},
};
use lazy_static::lazy_static;
use mc_bridge::{
    common::catch_panic, ffi_boundary_with_error, invoke, opaque_type, shared_struct,
    signature::fingerprint_of, Atom, BridgeError, CallDescriptor, ContractTable, ForeignVec,
    HandleRef, McBuffer, McCallback, McStr, McString, OpaqueHandle, OutError, RawHandle,
    RetainedCallback, Side, Transfer, Transferred, ValueKind,
};
use mc_common::logger::global_log;

/// A host-owned demo object.
pub struct ThingR {
    pub value: i32,
    pub name: String,
    prints: AtomicUsize,
    drops: Option<&'static AtomicUsize>,
}

impl ThingR {
    pub fn new(value: i32, name: impl Into<String>, drops: Option<&'static AtomicUsize>) -> Self {
        Self {
            value,
            name: name.into(),
            prints: AtomicUsize::new(0),
            drops,
        }
    }

    /// How many times the foreign side had this object printed.
    pub fn prints(&self) -> usize {
        self.prints.load(Ordering::SeqCst)
    }

    fn print(&self) {
        self.prints.fetch_add(1, Ordering::SeqCst);
        global_log::info!("called back with r={}", self.value);
    }
}

impl Drop for ThingR {
    fn drop(&mut self) {
        if let Some(drops) = self.drops {
            drops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

opaque_type!(ThingR: Host, free = mc_demo_thing_r_free);

/// A foreign-owned demo object. Its contents are only known to the foreign
/// side.
#[repr(C)]
pub struct ThingC {
    _private: [u8; 0],
}

opaque_type!(ThingC: Foreign, take = mc_demo_thing_c_take);

shared_struct! {
    /// Handed to the foreign side by ownership, handles and all.
    #[derive(Debug)]
    pub struct SharedThing {
        pub z: i32,
        pub y: OpaqueHandle<ThingR>,
        pub x: OpaqueHandle<ThingC>,
    }
}

shared_struct! {
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct Sample {
        pub id: u32,
        pub weight: f64,
        pub flags: u8,
    }
}

/// A counter that lives for the rest of the process.
pub fn drop_counter() -> &'static AtomicUsize {
    Box::leak(Box::default())
}

type ThingCCtor = unsafe extern "C" fn(McStr, *const AtomicUsize, OutError) -> *mut ThingC;

extern "C" {
    fn demo_thing_c_new(name: McStr, drops: *const AtomicUsize, out_error: OutError) -> *mut ThingC;
    fn demo_thing_c_new_rejecting(
        name: McStr,
        drops: *const AtomicUsize,
        out_error: OutError,
    ) -> *mut ThingC;
    fn demo_thing_c_new_exhausted(
        name: McStr,
        drops: *const AtomicUsize,
        out_error: OutError,
    ) -> *mut ThingC;
    fn demo_thing_c_destroy(object: *mut c_void);
    fn demo_thing_c_get_name(object: *const ThingC) -> McStr<'static>;
    fn demo_do_thing(state: Transferred<SharedThing>, out_error: OutError) -> ForeignVec<u8>;
    fn demo_describe_r(thing: HandleRef<ThingR>, out_error: OutError) -> bool;
    fn demo_sum_bytes(bytes: McBuffer) -> u64;
    fn demo_bytes_copy(bytes: McBuffer, out_error: OutError) -> ForeignVec<u8>;
    fn demo_byte_vec_new() -> ForeignVec<u8>;
    fn demo_apply(callback: McCallback<i32>, times: i32, out_error: OutError) -> bool;
    fn demo_listener_new(
        total: *const AtomicUsize,
        releases: *const AtomicUsize,
    ) -> RetainedCallback<u32>;
    fn demo_sample_echo(sample: Sample) -> Sample;
    fn demo_sample_checksum(sample: Sample) -> u64;
}

fn constructor(name: &str) -> CallDescriptor {
    CallDescriptor::new("demo", name, Side::Foreign)
        .arg("name", ValueKind::Text)
        .returns(ValueKind::handle::<ThingC>(Transfer::ByOwnership))
        .fallible()
}

lazy_static! {
    pub static ref MAKE_DEMO: CallDescriptor = constructor("make_demo");
    pub static ref MAKE_DEMO_REJECTING: CallDescriptor = constructor("make_demo_rejecting");
    pub static ref MAKE_DEMO_EXHAUSTED: CallDescriptor = constructor("make_demo_exhausted");
    pub static ref GET_NAME: CallDescriptor = CallDescriptor::new("demo", "get_name", Side::Foreign)
        .arg("thing", ValueKind::handle::<ThingC>(Transfer::ByReference))
        .returns(ValueKind::Text);
    pub static ref DO_THING: CallDescriptor = CallDescriptor::new("demo", "do_thing", Side::Foreign)
        .arg(
            "state",
            ValueKind::shared::<SharedThing>().expect("SharedThing has a valid layout"),
        )
        .returns(ValueKind::ForeignBytes)
        .fallible();
    pub static ref DESCRIBE_R: CallDescriptor =
        CallDescriptor::new("demo", "describe_r", Side::Foreign)
            .arg("thing", ValueKind::handle::<ThingR>(Transfer::ByReference))
            .returns(ValueKind::Atom(Atom::Bool))
            .fallible();
    pub static ref SUM_BYTES: CallDescriptor = CallDescriptor::new("demo", "sum_bytes", Side::Foreign)
        .arg("bytes", ValueKind::Bytes)
        .returns(ValueKind::Atom(Atom::U64));
    pub static ref COPY_BYTES: CallDescriptor =
        CallDescriptor::new("demo", "copy_bytes", Side::Foreign)
            .arg("bytes", ValueKind::Bytes)
            .returns(ValueKind::ForeignBytes)
            .fallible();
    pub static ref APPLY: CallDescriptor = CallDescriptor::new("demo", "apply", Side::Foreign)
        .arg(
            "callback",
            ValueKind::Callback {
                args: vec![ValueKind::Atom(Atom::I32)],
            },
        )
        .arg("times", ValueKind::Atom(Atom::I32))
        .returns(ValueKind::Atom(Atom::Bool))
        .fallible();
    pub static ref LISTEN: CallDescriptor = CallDescriptor::new("demo", "listen", Side::Foreign)
        .arg("total", ValueKind::Atom(Atom::Usize))
        .arg("releases", ValueKind::Atom(Atom::Usize))
        .returns(ValueKind::Callback {
            args: vec![ValueKind::Atom(Atom::U32)],
        });
    pub static ref SAMPLE_ECHO: CallDescriptor =
        CallDescriptor::new("demo", "sample_echo", Side::Foreign)
            .arg("sample", ValueKind::shared::<Sample>().expect("Sample has a valid layout"))
            .returns(ValueKind::shared::<Sample>().expect("Sample has a valid layout"));
    pub static ref SAMPLE_CHECKSUM: CallDescriptor =
        CallDescriptor::new("demo", "sample_checksum", Side::Foreign)
            .arg("sample", ValueKind::shared::<Sample>().expect("Sample has a valid layout"))
            .returns(ValueKind::Atom(Atom::U64));

    pub static ref THING_R_NEW: CallDescriptor = CallDescriptor::new("demo", "thing_r_new", Side::Host)
        .arg("value", ValueKind::Atom(Atom::I32))
        .arg("name", ValueKind::Text)
        .arg("drops", ValueKind::Atom(Atom::Usize))
        .returns(ValueKind::handle::<ThingR>(Transfer::ByOwnership))
        .fallible();
    pub static ref THING_R_VALUE: CallDescriptor =
        CallDescriptor::new("demo", "thing_r_value", Side::Host)
            .arg("thing", ValueKind::handle::<ThingR>(Transfer::ByReference))
            .returns(ValueKind::Atom(Atom::I32))
            .fallible();
    pub static ref THING_R_NAME: CallDescriptor =
        CallDescriptor::new("demo", "thing_r_name", Side::Host)
            .arg("thing", ValueKind::handle::<ThingR>(Transfer::ByReference))
            .returns(ValueKind::OwnedText)
            .fallible();
    pub static ref PRINT_R: CallDescriptor = CallDescriptor::new("demo", "print_r", Side::Host)
        .arg("thing", ValueKind::handle::<ThingR>(Transfer::ByReference))
        .returns(ValueKind::Atom(Atom::Bool))
        .fallible();
}

/// Every bridged function of the demo, in both directions.
pub fn demo_descriptors() -> Vec<&'static CallDescriptor> {
    vec![
        &*MAKE_DEMO,
        &*MAKE_DEMO_REJECTING,
        &*MAKE_DEMO_EXHAUSTED,
        &*GET_NAME,
        &*DO_THING,
        &*DESCRIBE_R,
        &*SUM_BYTES,
        &*COPY_BYTES,
        &*APPLY,
        &*LISTEN,
        &*SAMPLE_ECHO,
        &*SAMPLE_CHECKSUM,
        &*THING_R_NEW,
        &*THING_R_VALUE,
        &*THING_R_NAME,
        &*PRINT_R,
    ]
}

pub fn demo_contracts() -> Result<ContractTable, BridgeError> {
    let mut table = ContractTable::new();
    for descriptor in demo_descriptors() {
        table.register(descriptor)?;
    }
    Ok(table)
}

/// Install the demo contract table. Safe to call from every test.
pub fn install_demo_contracts() -> Result<&'static ContractTable, BridgeError> {
    demo_contracts()?.install()
}

/// The fingerprint the foreign side would compute for `descriptor` from its
/// own copy of the signature text.
pub fn foreign_view_of(descriptor: &CallDescriptor) -> (String, u64) {
    (
        descriptor.symbol_name(),
        fingerprint_of(&descriptor.canonical()),
    )
}

// Functions the foreign side calls.

/// # Errors
///
/// * `BridgeError::EncodingFailure` when `name` is not UTF-8. The result is
///   then the null handle and no object exists.
#[no_mangle]
pub extern "C" fn mc_demo_thing_r_new(
    value: i32,
    name: McStr,
    drops: *const AtomicUsize,
    out_error: OutError,
) -> RawHandle {
    ffi_boundary_with_error(out_error, || {
        let name = name.materialize()?;
        let drops = unsafe { drops.as_ref() };
        OpaqueHandle::new(ThingR::new(value, name, drops))
    })
}

#[no_mangle]
pub extern "C" fn mc_demo_thing_r_value(thing: HandleRef<ThingR>, out_error: OutError) -> i32 {
    ffi_boundary_with_error(out_error, || Ok(thing.get()?.value))
}

/// The name, copied. Release it with `mc_bridge_string_free`.
#[no_mangle]
pub extern "C" fn mc_demo_thing_r_name(thing: HandleRef<ThingR>, out_error: OutError) -> McString {
    ffi_boundary_with_error(out_error, || Ok(thing.get()?.name.clone()))
}

#[no_mangle]
pub extern "C" fn mc_demo_print_r(thing: HandleRef<ThingR>, out_error: OutError) -> bool {
    ffi_boundary_with_error(out_error, || {
        thing.get()?.print();
        Ok(())
    })
}

// Bridged wrappers the host calls the foreign side through.

fn make_demo_with(
    descriptor: &CallDescriptor,
    ctor: ThingCCtor,
    name: &[u8],
    drops: &'static AtomicUsize,
) -> Result<OpaqueHandle<ThingC>, BridgeError> {
    invoke(descriptor, |frame| {
        let name = frame.borrow_text(name);
        unsafe {
            OpaqueHandle::construct_foreign(demo_thing_c_destroy, |out_error| {
                ctor(name, drops, out_error)
            })
        }
    })
}

/// Have the foreign side build a demo object named `name`.
pub fn make_demo(name: &str, drops: &'static AtomicUsize) -> Result<OpaqueHandle<ThingC>, BridgeError> {
    make_demo_with(&MAKE_DEMO, demo_thing_c_new, name.as_bytes(), drops)
}

/// Like [`make_demo`], with a name the foreign side stores without checking.
pub fn make_demo_from_bytes(
    name: &[u8],
    drops: &'static AtomicUsize,
) -> Result<OpaqueHandle<ThingC>, BridgeError> {
    make_demo_with(&MAKE_DEMO, demo_thing_c_new, name, drops)
}

/// A constructor that builds the object and then fails.
pub fn make_demo_rejecting(
    name: &str,
    drops: &'static AtomicUsize,
) -> Result<OpaqueHandle<ThingC>, BridgeError> {
    make_demo_with(
        &MAKE_DEMO_REJECTING,
        demo_thing_c_new_rejecting,
        name.as_bytes(),
        drops,
    )
}

/// A constructor that returns null without an error.
pub fn make_demo_exhausted(
    name: &str,
    drops: &'static AtomicUsize,
) -> Result<OpaqueHandle<ThingC>, BridgeError> {
    make_demo_with(
        &MAKE_DEMO_EXHAUSTED,
        demo_thing_c_new_exhausted,
        name.as_bytes(),
        drops,
    )
}

/// Read the name of a foreign object through a by-reference call.
pub fn get_name(thing: &OpaqueHandle<ThingC>) -> Result<String, BridgeError> {
    invoke(&GET_NAME, |frame| {
        let thing = frame.lend(thing)?;
        let name = unsafe { demo_thing_c_get_name(thing.as_ptr()?) };
        name.materialize()
    })
}

/// Hand `state` to the foreign side by ownership and materialize the bytes
/// it returns.
pub fn do_thing(state: SharedThing) -> Result<Vec<u8>, BridgeError> {
    invoke(&DO_THING, |frame| {
        let state = frame.transfer(state)?;
        let bytes = frame.call_foreign(|out_error| unsafe { demo_do_thing(state, out_error) })?;
        if bytes.is_null() {
            return Err(BridgeError::AllocationFailure(
                "do_thing returned no buffer".into(),
            ));
        }
        bytes.to_vec()
    })
}

/// Lend `thing` to the foreign side, which prints it twice through the host.
pub fn describe_r(thing: &OpaqueHandle<ThingR>) -> Result<(), BridgeError> {
    invoke(&DESCRIBE_R, |frame| {
        let thing = frame.lend(thing)?;
        let printed = frame.call_foreign(|out_error| unsafe { demo_describe_r(thing, out_error) })?;
        if printed {
            Ok(())
        } else {
            Err(BridgeError::Unknown)
        }
    })
}

pub fn sum_bytes(bytes: &[u8]) -> Result<u64, BridgeError> {
    invoke(&SUM_BYTES, |frame| {
        Ok(unsafe { demo_sum_bytes(frame.borrow_slice(bytes)) })
    })
}

/// Have the foreign side materialize `bytes` into a collection it owns.
pub fn copy_bytes(bytes: &[u8]) -> Result<ForeignVec<u8>, BridgeError> {
    invoke(&COPY_BYTES, |frame| {
        let view = frame.borrow_slice(bytes);
        let copy = frame.call_foreign(|out_error| unsafe { demo_bytes_copy(view, out_error) })?;
        if copy.is_null() {
            return Err(BridgeError::AllocationFailure(
                "copy_bytes returned no buffer".into(),
            ));
        }
        Ok(copy)
    })
}

/// An empty byte collection owned by the foreign side.
pub fn foreign_byte_vec() -> Result<ForeignVec<u8>, BridgeError> {
    let vec = unsafe { demo_byte_vec_new() };
    if vec.is_null() {
        return Err(BridgeError::AllocationFailure(
            "foreign byte vector".into(),
        ));
    }
    Ok(vec)
}

/// The callback context of [`apply`]. The first error the callback returns is
/// kept here as well as raised, so the host gets it back as it was.
struct ApplyContext<F> {
    f: F,
    failure: Option<BridgeError>,
}

unsafe extern "C" fn apply_trampoline<F>(context: *mut c_void, arg: i32, out_error: OutError)
where
    F: FnMut(i32) -> Result<(), BridgeError>,
{
    let context = &mut *(context as *mut ApplyContext<F>);
    ffi_boundary_with_error(out_error, || {
        let result = catch_panic(|| (context.f)(arg));
        if let Err(err) = &result {
            context.failure.get_or_insert_with(|| err.clone());
        }
        result
    })
}

/// Have the foreign side call `f` with `0..times`. The first error `f`
/// returns stops the loop and becomes the result.
pub fn apply<F>(times: i32, f: F) -> Result<(), BridgeError>
where
    F: FnMut(i32) -> Result<(), BridgeError>,
{
    let mut context = ApplyContext { f, failure: None };
    invoke(&APPLY, |frame| {
        let callback = McCallback::new(apply_trampoline::<F>, &mut context);
        let completed =
            frame.call_foreign(|out_error| unsafe { demo_apply(callback, times, out_error) });
        if let Some(failure) = context.failure.take() {
            return Err(failure);
        }
        if completed? {
            Ok(())
        } else {
            Err(BridgeError::Unknown)
        }
    })
}

/// A foreign listener the host keeps. It adds what it is called with to
/// `total`, and counts its release in `releases`.
pub fn listen(
    total: &'static AtomicUsize,
    releases: &'static AtomicUsize,
) -> Result<RetainedCallback<u32>, BridgeError> {
    invoke(&LISTEN, |_| Ok(unsafe { demo_listener_new(total, releases) }))
}

pub fn sample_echo(sample: Sample) -> Result<Sample, BridgeError> {
    invoke(&SAMPLE_ECHO, |_| Ok(unsafe { demo_sample_echo(sample) }))
}

pub fn sample_checksum(sample: Sample) -> Result<u64, BridgeError> {
    invoke(&SAMPLE_CHECKSUM, |_| Ok(unsafe { demo_sample_checksum(sample) }))
}
