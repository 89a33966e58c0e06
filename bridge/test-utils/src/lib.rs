// Copyright (c) 2018-2022 The MobileCoin Foundation

//! A two-sided demo of the bridge for tests: host types and wrappers in
//! [`host`], and a foreign side written against the C ABI in [`foreign`].

pub mod foreign;
pub mod host;

pub use crate::{
    foreign::{
        live_byte_vecs, SampleWire, SharedThingWire, DEMO_ERROR_CODE_BAD_ARGUMENT,
        DEMO_ERROR_CODE_OVERFLOW, DEMO_ERROR_CODE_REJECTED,
    },
    host::*,
};
