// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Process-wide runtime checks.
//!
//! The configuration is read from the environment the first time it is
//! needed, or installed explicitly (once) by the embedding application before
//! the first bridged call. It never changes afterwards.

use crate::error::BridgeError;
use clap::{ArgAction, Parser, ValueEnum};
use mc_common::logger::global_log;
use std::sync::OnceLock;

static CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

/// When by-reference handles are checked against the loans of active calls.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum RefCheck {
    /// Never. Using a reference past its call is the caller's obligation.
    Off,
    /// In builds with debug assertions only.
    #[default]
    Debug,
    /// Always, at the cost of registry bookkeeping on every lend.
    Always,
}

impl RefCheck {
    pub fn enabled(self) -> bool {
        match self {
            RefCheck::Off => false,
            RefCheck::Debug => cfg!(debug_assertions),
            RefCheck::Always => true,
        }
    }
}

#[derive(Clone, Debug, Eq, Parser, PartialEq)]
#[clap(name = "mc-bridge", about = "Runtime checks for the cross-language bridge")]
pub struct BridgeConfig {
    /// Check every call descriptor against the installed contract table
    /// before the call runs.
    #[clap(
        long,
        env = "MC_BRIDGE_VERIFY_CONTRACTS",
        action = ArgAction::Set,
        default_value_t = cfg!(debug_assertions)
    )]
    pub verify_contracts: bool,

    /// When to check by-reference handles against active loans.
    #[clap(long, env = "MC_BRIDGE_REF_CHECK", value_enum, default_value_t = RefCheck::Debug)]
    pub ref_check: RefCheck,

    /// Log every bridged call at trace level.
    #[clap(long, env = "MC_BRIDGE_TRACE_CALLS", action = ArgAction::Set, default_value_t = false)]
    pub trace_calls: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            verify_contracts: cfg!(debug_assertions),
            ref_check: RefCheck::Debug,
            trace_calls: false,
        }
    }
}

impl BridgeConfig {
    /// Read the configuration from `MC_BRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse_from(["mc-bridge"])
    }

    /// Make `self` the process-wide configuration. Fails if a configuration
    /// was already installed or already read.
    pub fn install(self) -> Result<&'static BridgeConfig, BridgeError> {
        CONFIG.set(self).map_err(|_| {
            BridgeError::InvalidInput("bridge configuration is already initialized".into())
        })?;
        Ok(Self::current())
    }

    /// The process-wide configuration.
    pub fn current() -> &'static BridgeConfig {
        CONFIG.get_or_init(|| {
            Self::from_env().unwrap_or_else(|err| {
                global_log::warn!("Ignoring invalid MC_BRIDGE_* settings: {}", err);
                Self::default()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_build_profile() {
        let config = BridgeConfig::try_parse_from(["mc-bridge"]).unwrap();
        assert_eq!(config.ref_check, RefCheck::Debug);
        assert_eq!(config.ref_check.enabled(), cfg!(debug_assertions));
        assert_eq!(config.verify_contracts, cfg!(debug_assertions));
        assert!(!config.trace_calls);
    }

    #[test]
    fn flags_override_defaults() {
        let config = BridgeConfig::try_parse_from([
            "mc-bridge",
            "--ref-check",
            "always",
            "--verify-contracts",
            "false",
            "--trace-calls",
            "true",
        ])
        .unwrap();
        assert_eq!(config.ref_check, RefCheck::Always);
        assert!(config.ref_check.enabled());
        assert!(!config.verify_contracts);
        assert!(config.trace_calls);
    }

    #[test]
    fn rejects_unknown_policies() {
        assert!(BridgeConfig::try_parse_from(["mc-bridge", "--ref-check", "sometimes"]).is_err());
    }

    #[test]
    fn off_is_never_enabled() {
        assert!(!RefCheck::Off.enabled());
    }
}
