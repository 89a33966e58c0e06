// Copyright (c) 2018-2022 The MobileCoin Foundation

//! C-visible types and the helpers every `extern "C"` entry point is built
//! from.
//!
//! # Naming
//!
//! `McSlice`, `McStr`, `McVec`, `McString` and `McError` are represented as C
//! structs and are meant to be declared as such in the equivalent of a C
//! header. Their fields are guaranteed to be visible and accessible from
//! foreign code.
//!
//! # Memory Allocation
//!
//! All memory is released by the allocator that allocated it. An owned value
//! produced by Rust and handed to foreign code (`McVec`, `McString`,
//! `McError`, a transferred handle) is given back through the matching
//! `mc_bridge_*_free` function. A foreign collection handed to Rust
//! (`ForeignVec`) is released through its own vtable.
//!
//! `McSlice` and `McStr` are views. They never own their memory and are valid
//! only for the call that received them: Rust code must copy out
//! ("materialize") anything it needs to keep.

pub use boundary::*;
pub use error::*;
pub use into_ffi::*;
pub use slice::*;
pub use string::*;
pub use vec::*;

mod boundary;
mod error;
mod into_ffi;
mod slice;
mod string;
mod vec;
