// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Common types and methods shared by the bridge crates.

#![deny(missing_docs)]
#![warn(unused_extern_crates)]

cfg_if::cfg_if! {
    if #[cfg(feature = "log")] {
        pub mod logger;
    }
}
