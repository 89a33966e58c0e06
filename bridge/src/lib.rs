// Copyright (c) 2018-2022 The MobileCoin Foundation

//! The core of a cross-language binding layer.
//!
//! Rust (the host side) and code reached through the C ABI (the foreign
//! side) exchange opaque objects, shared plain data, text and byte buffers,
//! and call each other, with a single rule for who frees what:
//!
//! * opaque objects live in per-type registries of generation-tagged slots
//!   ([`handle`]) and are destroyed exactly once, by whichever side holds
//!   them;
//! * shared structs have one canonical C layout, checked against the
//!   compiler's ([`layout`]);
//! * text and bytes cross as call-scoped views and are copied out
//!   ("materialized") to be kept ([`common`]);
//! * calls in both directions convert failures and panics into a single
//!   result representation at the boundary ([`call`], [`common`]), checked
//!   against a contract table of call signatures ([`signature`]).

pub mod call;
pub mod common;
pub mod config;
pub mod error;
pub mod handle;
pub mod layout;
pub mod signature;

pub use crate::{
    call::{invoke, CallFrame, McCallback, OutError, RetainedCallback, Transferred},
    common::{
        ffi_boundary, ffi_boundary_with_error, ForeignVec, ForeignVecVtable, IntoFfi, McBuffer,
        McError, McMutableBuffer, McSlice, McStr, McString, McVec, NativeSequence,
    },
    config::{BridgeConfig, RefCheck},
    error::BridgeError,
    handle::{HandleRef, HandleRegistry, Opaque, OpaqueHandle, RawHandle, Side},
    layout::{verify_layout, Atom, FieldKind, LayoutDescriptor, SharedField, SharedLayout},
    signature::{CallDescriptor, ContractTable, Transfer, ValueKind, ABI_VERSION},
};
