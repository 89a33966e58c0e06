// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Text and byte views crossing in both directions, and materialization into
//! collections either side owns.

use mc_bridge::{
    common::{mc_bridge_vec_u8_copy_to, mc_bridge_vec_u8_free, mc_bridge_vec_u8_view},
    BridgeError, McMutableBuffer, McString, McVec, NativeSequence,
};
use mc_bridge_test_utils::{copy_bytes, foreign_byte_vec, install_demo_contracts, sum_bytes};
use mc_util_ffi::{FfiMutPtr, FfiOptMutPtr, FfiOptOwnedPtr};
use mc_util_test_helper::{random_bytes_with_nul, random_str, run_with_several_seeds, Rng};

#[test]
fn bytes_with_nuls_survive_the_foreign_side() {
    install_demo_contracts().unwrap();
    run_with_several_seeds(|mut rng| {
        let len = rng.gen_range(3..512);
        let bytes = random_bytes_with_nul(len, &mut rng);

        let copy = copy_bytes(&bytes).unwrap();
        assert_eq!(copy.len(), bytes.len());
        assert_eq!(copy.to_vec().unwrap(), bytes);
        assert_eq!(
            sum_bytes(&bytes).unwrap(),
            bytes.iter().map(|byte| *byte as u64).sum::<u64>()
        );
    })
}

#[test]
fn empty_views_cross_as_empty() {
    install_demo_contracts().unwrap();
    assert_eq!(sum_bytes(&[]).unwrap(), 0);
    let copy = copy_bytes(&[]).unwrap();
    assert!(copy.is_empty());
    assert_eq!(copy.to_vec().unwrap(), Vec::<u8>::new());
}

#[test]
fn host_bytes_materialize_into_a_foreign_collection() {
    run_with_several_seeds(|mut rng| {
        let bytes = random_bytes_with_nul(64, &mut rng);
        let host = McVec::from(bytes.clone());

        let mut foreign = foreign_byte_vec().unwrap();
        host.copy_to(&mut foreign).unwrap();
        host.copy_to(&mut foreign).unwrap();

        let mut expected = bytes.clone();
        expected.extend_from_slice(&bytes);
        assert_eq!(foreign.to_vec().unwrap(), expected);
        assert_eq!(foreign.view().as_slice().unwrap(), &expected[..]);
    })
}

#[test]
fn foreign_bytes_materialize_into_a_host_collection() {
    install_demo_contracts().unwrap();
    let foreign = copy_bytes(b"\x00abc\x00").unwrap();
    let mut host = vec![9u8];
    host.extend_from_view(foreign.view()).unwrap();
    assert_eq!(host, b"\x09\x00abc\x00");
}

#[test]
fn host_vectors_seen_from_the_foreign_side() {
    run_with_several_seeds(|mut rng| {
        let bytes = random_bytes_with_nul(32, &mut rng);
        let vec = McVec::from(bytes.clone());

        let view = mc_bridge_vec_u8_view((&vec).into());
        assert_eq!(view.as_slice().unwrap(), &bytes[..]);

        let mut out = vec![0u8; 40];
        let mut buffer = McMutableBuffer::borrow(&mut out);
        let mut error = FfiOptOwnedPtr::null();
        let copied = mc_bridge_vec_u8_copy_to(
            (&vec).into(),
            FfiMutPtr::from(&mut buffer),
            FfiOptMutPtr::from(&mut error),
        );
        assert!(error.is_null());
        assert_eq!(copied, 32);
        assert_eq!(&out[..32], &bytes[..]);

        mc_bridge_vec_u8_free(vec);
    })
}

#[test]
fn short_caller_buffers_are_refused() {
    let vec = McVec::from(vec![1u8, 2, 3, 4]);
    let mut out = [0u8; 2];
    let mut buffer = McMutableBuffer::borrow(&mut out);
    let mut error = FfiOptOwnedPtr::null();
    let copied = mc_bridge_vec_u8_copy_to(
        (&vec).into(),
        FfiMutPtr::from(&mut buffer),
        FfiOptMutPtr::from(&mut error),
    );
    assert_eq!(copied, -1);
    let error = error.into_option().expect("an error was raised");
    assert!(matches!(
        BridgeError::from(&*error),
        BridgeError::InvalidInput(_)
    ));
    assert_eq!(out, [0, 0]);
}

#[test]
fn host_strings_round_trip_through_views() {
    run_with_several_seeds(|mut rng| {
        let text = random_str(48, &mut rng);
        let owned = McString::from(text.clone());
        assert_eq!(owned.as_view().materialize().unwrap(), text);
        assert_eq!(owned.as_view().as_buffer().materialize().unwrap(), text.as_bytes());
        assert_eq!(owned.into_string(), text);
    })
}
