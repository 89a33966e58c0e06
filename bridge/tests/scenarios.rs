// Copyright (c) 2018-2022 The MobileCoin Foundation

//! End-to-end runs of the demo bridge, host and foreign side together.

use core::sync::atomic::Ordering;
use mc_bridge::{BridgeError, McStr, McString, OpaqueHandle, RawHandle};
use mc_bridge_test_utils::{
    do_thing, drop_counter, get_name, install_demo_contracts, make_demo, make_demo_from_bytes,
    mc_demo_thing_r_new, sample_checksum, sample_echo, Sample, SharedThing, ThingR,
    DEMO_ERROR_CODE_BAD_ARGUMENT,
};
use mc_common::logger::{log, test_with_logger, Logger};
use mc_util_ffi::{FfiOptMutPtr, FfiOptOwnedPtr};

#[test_with_logger]
fn named_handle_reads_back_by_reference(logger: Logger) {
    install_demo_contracts().unwrap();
    let drops = drop_counter();

    let thing = make_demo("demo", drops).unwrap();
    let name = get_name(&thing).unwrap();
    log::info!(logger, "foreign object {:?} is named {}", thing, name);
    assert_eq!(name, "demo");
    assert_eq!(get_name(&thing).unwrap(), "demo");
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(thing);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test_with_logger]
fn shared_struct_of_handles_returns_squares(logger: Logger) {
    install_demo_contracts().unwrap();
    let r_drops = drop_counter();
    let c_drops = drop_counter();

    let state = SharedThing {
        z: 10,
        y: OpaqueHandle::new(ThingR::new(2020, "r", Some(r_drops))).unwrap(),
        x: make_demo("c", c_drops).unwrap(),
    };
    let squares = do_thing(state).unwrap();
    log::info!(logger, "do_thing returned {:?}", squares);

    assert_eq!(squares, vec![0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
    assert_eq!(r_drops.load(Ordering::SeqCst), 1);
    assert_eq!(c_drops.load(Ordering::SeqCst), 1);
}

#[test_with_logger]
fn empty_square_buffer(_logger: Logger) {
    install_demo_contracts().unwrap();
    let r_drops = drop_counter();
    let c_drops = drop_counter();

    let state = SharedThing {
        z: 0,
        y: OpaqueHandle::new(ThingR::new(1, "r", Some(r_drops))).unwrap(),
        x: make_demo("c", c_drops).unwrap(),
    };
    assert_eq!(do_thing(state).unwrap(), Vec::<u8>::new());
    assert_eq!(r_drops.load(Ordering::SeqCst), 1);
    assert_eq!(c_drops.load(Ordering::SeqCst), 1);
}

#[test_with_logger]
fn failed_call_still_destroys_transferred_handles_once(_logger: Logger) {
    install_demo_contracts().unwrap();
    let r_drops = drop_counter();
    let c_drops = drop_counter();

    let state = SharedThing {
        z: -1,
        y: OpaqueHandle::new(ThingR::new(3, "r", Some(r_drops))).unwrap(),
        x: make_demo("c", c_drops).unwrap(),
    };
    match do_thing(state) {
        Err(BridgeError::CalleeFailure { code, message }) => {
            assert_eq!(code, DEMO_ERROR_CODE_BAD_ARGUMENT);
            assert_eq!(message, "negative length");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(r_drops.load(Ordering::SeqCst), 1);
    assert_eq!(c_drops.load(Ordering::SeqCst), 1);
}

#[test_with_logger]
fn invalid_utf8_from_the_foreign_side(_logger: Logger) {
    install_demo_contracts().unwrap();
    let drops = drop_counter();

    let mut error = FfiOptOwnedPtr::null();
    let raw: RawHandle = mc_demo_thing_r_new(
        5,
        McStr::from_bytes(b"de\xffmo"),
        drops,
        FfiOptMutPtr::from(&mut error),
    );
    assert!(raw.is_null());
    let error = error.into_option().expect("an error was raised");
    assert!(matches!(
        BridgeError::from(&*error),
        BridgeError::EncodingFailure(_)
    ));
    assert_eq!(drops.load(Ordering::SeqCst), 0);
}

#[test_with_logger]
fn invalid_utf8_from_the_host_side(_logger: Logger) {
    install_demo_contracts().unwrap();
    let drops = drop_counter();

    let thing = make_demo_from_bytes(b"\xc3\x28", drops).unwrap();
    let name: Result<String, _> = get_name(&thing);
    assert!(matches!(name, Err(BridgeError::EncodingFailure(_))));

    drop(thing);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test_with_logger]
fn host_text_reaches_the_foreign_side_materialized(_logger: Logger) {
    install_demo_contracts().unwrap();
    let drops = drop_counter();
    let mut error = FfiOptOwnedPtr::null();

    let raw = mc_demo_thing_r_new(9, McStr::from("nine"), drops, FfiOptMutPtr::from(&mut error));
    assert!(error.is_null());
    let name: McString = mc_bridge_test_utils::mc_demo_thing_r_name(
        unsafe { mc_bridge::HandleRef::from_raw(raw) },
        FfiOptMutPtr::from(&mut error),
    );
    assert_eq!(name.as_str(), "nine");
    mc_bridge::common::mc_bridge_string_free(name);

    mc_bridge_test_utils::mc_demo_thing_r_free(raw);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test_with_logger]
fn shared_values_with_equal_fields_are_interchangeable(_logger: Logger) {
    install_demo_contracts().unwrap();
    let first = Sample {
        id: 42,
        weight: 1.5,
        flags: 0b101,
    };
    let second = Sample {
        id: 42,
        weight: 1.5,
        flags: 0b101,
    };

    assert_eq!(first, second);
    assert_eq!(
        sample_checksum(first).unwrap(),
        sample_checksum(second).unwrap()
    );
    assert_eq!(sample_echo(first).unwrap(), second);
    assert_ne!(
        sample_checksum(first).unwrap(),
        sample_checksum(Sample { flags: 0, ..first }).unwrap()
    );
}
