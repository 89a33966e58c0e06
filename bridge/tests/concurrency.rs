// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Registries shared by many threads.

use core::sync::atomic::Ordering;
use mc_bridge::{McStr, OpaqueHandle};
use mc_bridge_test_utils::{
    do_thing, drop_counter, get_name, install_demo_contracts, make_demo, mc_demo_thing_r_free,
    mc_demo_thing_r_new, SharedThing, ThingR,
};
use mc_util_ffi::{FfiOptMutPtr, FfiOptOwnedPtr};
use std::{sync::Arc, thread};

const THREADS: usize = 8;
const ROUNDS: usize = 50;

#[test]
fn handles_from_many_threads_are_destroyed_once_each() {
    install_demo_contracts().unwrap();
    let r_drops = drop_counter();
    let c_drops = drop_counter();

    let workers = (0..THREADS)
        .map(|worker| {
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let name = format!("{}-{}", worker, round);
                    let thing = make_demo(&name, c_drops).unwrap();
                    assert_eq!(get_name(&thing).unwrap(), name);

                    let state = SharedThing {
                        z: (round % 16) as i32,
                        y: OpaqueHandle::new(ThingR::new(round as i32, name, Some(r_drops)))
                            .unwrap(),
                        x: thing,
                    };
                    assert_eq!(do_thing(state).unwrap().len(), round % 16);
                }
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(r_drops.load(Ordering::SeqCst), THREADS * ROUNDS);
    assert_eq!(c_drops.load(Ordering::SeqCst), THREADS * ROUNDS);
}

#[test]
fn foreign_side_frees_from_other_threads() {
    let drops = drop_counter();
    let raws = (0..THREADS * ROUNDS)
        .map(|i| {
            let mut error = FfiOptOwnedPtr::null();
            let raw = mc_demo_thing_r_new(
                i as i32,
                McStr::from("shared"),
                drops,
                FfiOptMutPtr::from(&mut error),
            );
            assert!(error.is_null());
            raw
        })
        .collect::<Vec<_>>();
    let raws = Arc::new(raws);

    let workers = (0..THREADS)
        .map(|worker| {
            let raws = raws.clone();
            thread::spawn(move || {
                for raw in raws.iter().skip(worker).step_by(THREADS) {
                    mc_demo_thing_r_free(*raw);
                }
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(drops.load(Ordering::SeqCst), THREADS * ROUNDS);
}
