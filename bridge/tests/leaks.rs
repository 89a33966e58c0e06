// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Registry totals after a full workload. Kept to a single test so nothing
//! else in the process touches the registries meanwhile.

use mc_bridge::{McStr, Opaque, OpaqueHandle};
use mc_bridge_test_utils::{
    apply, copy_bytes, describe_r, do_thing, drop_counter, get_name, install_demo_contracts,
    live_byte_vecs, make_demo, make_demo_rejecting, mc_demo_thing_r_free, mc_demo_thing_r_new,
    SharedThing, ThingC, ThingR,
};
use mc_common::logger::{log, test_with_logger, Logger};
use mc_util_ffi::{FfiOptMutPtr, FfiOptOwnedPtr};

#[test_with_logger]
fn every_object_is_destroyed_exactly_once(logger: Logger) {
    install_demo_contracts().unwrap();
    let drops = drop_counter();

    for round in 0..20 {
        let kept = OpaqueHandle::new(ThingR::new(round, "kept", Some(drops))).unwrap();
        describe_r(&kept).unwrap();

        let thing = make_demo("demo", drops).unwrap();
        assert_eq!(get_name(&thing).unwrap(), "demo");
        let state = SharedThing {
            z: round,
            y: OpaqueHandle::new(ThingR::new(round, "sent", Some(drops))).unwrap(),
            x: thing,
        };
        do_thing(state).unwrap();

        assert!(make_demo_rejecting("refused", drops).is_err());

        let mut error = FfiOptOwnedPtr::null();
        let raw = mc_demo_thing_r_new(round, McStr::from("foreign"), drops, FfiOptMutPtr::from(&mut error));
        mc_demo_thing_r_free(raw);

        let copy = copy_bytes(b"bytes").unwrap();
        assert_eq!(copy.len(), 5);

        apply(2, |_| describe_r(&kept)).unwrap();
    }

    let things_r = ThingR::registry().stats();
    let things_c = ThingC::registry().stats();
    log::info!(logger, "ThingR: {:?}, ThingC: {:?}", things_r, things_c);

    assert_eq!(things_r.live, 0);
    assert_eq!(things_r.created, 60);
    assert_eq!(things_r.destroyed, 60);
    assert_eq!(things_c.live, 0);
    assert_eq!(things_c.created, 20);
    assert_eq!(things_c.destroyed, 0);
    assert_eq!(things_c.released, 20);
    assert_eq!(live_byte_vecs(), 0);
    assert_eq!(drops.load(core::sync::atomic::Ordering::SeqCst), 100);
}
