// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Callbacks, re-entrant calls and the contract table, seen from both sides.

use core::sync::atomic::Ordering;
use mc_bridge::{
    signature::{fingerprint_of, mc_bridge_abi_version, mc_bridge_contract_check},
    BridgeError, ContractTable, McStr, OpaqueHandle, ABI_VERSION,
};
use mc_bridge_test_utils::{
    apply, demo_descriptors, describe_r, drop_counter, foreign_view_of, install_demo_contracts,
    listen, sum_bytes, ThingR, DEMO_ERROR_CODE_OVERFLOW, DO_THING,
};
use mc_util_ffi::{FfiOptMutPtr, FfiOptOwnedPtr};

#[test]
fn callbacks_see_every_value_in_order() {
    install_demo_contracts().unwrap();
    let mut seen = Vec::new();
    apply(5, |i| {
        seen.push(i);
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[test]
fn callback_errors_stop_the_foreign_loop() {
    install_demo_contracts().unwrap();
    let mut calls = 0;
    let result = apply(10, |i| {
        calls += 1;
        if i == 3 {
            Err(BridgeError::EncodingFailure("three".into()))
        } else {
            Ok(())
        }
    });
    assert_eq!(result, Err(BridgeError::EncodingFailure("three".into())));
    assert_eq!(calls, 4);
}

#[test]
fn callback_panics_come_back_as_errors() {
    install_demo_contracts().unwrap();
    let result = apply(3, |i| {
        if i == 1 {
            panic!("callback gave up");
        }
        Ok(())
    });
    assert_eq!(result, Err(BridgeError::Panic("callback gave up".into())));
}

#[test]
fn callbacks_can_call_back_across_the_boundary() {
    install_demo_contracts().unwrap();
    let drops = drop_counter();
    let thing = OpaqueHandle::new(ThingR::new(7, "reentrant", Some(drops))).unwrap();

    let mut sums = Vec::new();
    apply(3, |i| {
        let bytes = vec![i as u8; (i + 1) as usize];
        sums.push(sum_bytes(&bytes)?);
        describe_r(&thing)
    })
    .unwrap();

    assert_eq!(sums, vec![0, 2, 6]);
    assert_eq!(thing.prints(), 6);
    drop(thing);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn retained_callbacks_are_released_once() {
    install_demo_contracts().unwrap();
    let total = drop_counter();
    let releases = drop_counter();

    let mut listener = listen(total, releases).unwrap();
    listener.invoke(2).unwrap();
    listener.invoke(40).unwrap();
    match listener.invoke(u32::MAX) {
        Err(BridgeError::CalleeFailure { code, .. }) => assert_eq!(code, DEMO_ERROR_CODE_OVERFLOW),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(total.load(Ordering::SeqCst), 42);
    assert_eq!(releases.load(Ordering::SeqCst), 0);

    drop(listener);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn the_foreign_side_checks_its_view_of_a_signature() {
    let table = install_demo_contracts().unwrap();
    assert_eq!(table.len(), demo_descriptors().len());

    let (symbol, fingerprint) = foreign_view_of(&DO_THING);
    let mut error = FfiOptOwnedPtr::null();
    assert!(mc_bridge_contract_check(
        McStr::from(symbol.as_str()),
        fingerprint,
        FfiOptMutPtr::from(&mut error)
    ));
    assert!(error.is_null());

    let stale = fingerprint_of("v1 foreign demo::do_thing(state: i32) -> foreign_vec<u8> fallible");
    assert!(!mc_bridge_contract_check(
        McStr::from(symbol.as_str()),
        stale,
        FfiOptMutPtr::from(&mut error)
    ));
    assert!(!mc_bridge_contract_check(
        McStr::from("mcbridge1$demo$missing"),
        fingerprint,
        FfiOptMutPtr::from(&mut error)
    ));
    assert!(error.is_null());

    assert!(!mc_bridge_contract_check(
        McStr::from_bytes(b"mcbridge1$\xff"),
        fingerprint,
        FfiOptMutPtr::from(&mut error)
    ));
    let error = error.into_option().expect("an error was raised");
    assert!(matches!(
        BridgeError::from(&*error),
        BridgeError::EncodingFailure(_)
    ));
}

#[test]
fn a_different_table_cannot_replace_the_installed_one() {
    install_demo_contracts().unwrap();
    assert!(install_demo_contracts().is_ok());
    assert!(matches!(
        ContractTable::new().install(),
        Err(BridgeError::ContractViolation(_))
    ));
}

#[test]
fn abi_version_is_exported() {
    assert_eq!(mc_bridge_abi_version(), ABI_VERSION);
}
