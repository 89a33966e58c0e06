// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Call descriptors and the process-wide contract table.
//!
//! Every bridged function has a [`CallDescriptor`]: its ordered argument
//! kinds, return kind, fallibility and callee side. Both sides derive the
//! same fingerprint from it. The host installs a read-only [`ContractTable`]
//! once at startup; the call bridge consults it before each call when
//! contract verification is enabled, and the foreign side can check its own
//! view of a signature with `mc_bridge_contract_check`.

use crate::{
    common::{ffi_boundary, ffi_boundary_with_error, McError, McStr},
    error::BridgeError,
    handle::{Opaque, Side},
    layout::{Atom, SharedLayout},
};
use core::fmt;
use mc_common::logger::global_log;
use mc_util_ffi::{FfiOptMutPtr, FfiOptOwnedPtr};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, sync::OnceLock};

/// Version of the boundary calling convention. Part of every link symbol.
pub const ABI_VERSION: u32 = 1;

static CONTRACTS: OnceLock<ContractTable> = OnceLock::new();

/// SHA-256 of `text`, truncated to its first 64 bits.
pub fn fingerprint_of(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// How a handle argument or result changes hands.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Transfer {
    ByValue,
    ByReference,
    ByOwnership,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transfer::ByValue => f.write_str("val"),
            Transfer::ByReference => f.write_str("ref"),
            Transfer::ByOwnership => f.write_str("own"),
        }
    }
}

/// The kind of one argument or result.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ValueKind {
    Unit,
    Atom(Atom),
    /// Borrowed text (`McStr`).
    Text,
    /// Borrowed bytes (`McBuffer`).
    Bytes,
    /// Host text transferred by ownership (`McString`).
    OwnedText,
    /// Host bytes transferred by ownership (`McVec<u8>`).
    OwnedBytes,
    /// Foreign bytes transferred by ownership (`ForeignVec<u8>`).
    ForeignBytes,
    Handle {
        type_name: String,
        transfer: Transfer,
    },
    Shared {
        name: String,
        fingerprint: u64,
    },
    Callback {
        args: Vec<ValueKind>,
    },
}

impl ValueKind {
    pub fn handle<T: Opaque>(transfer: Transfer) -> Self {
        ValueKind::Handle {
            type_name: T::registry().type_name().to_string(),
            transfer,
        }
    }

    pub fn shared<T: SharedLayout>() -> Result<Self, BridgeError> {
        let layout = T::layout()?;
        Ok(ValueKind::Shared {
            name: layout.name().to_string(),
            fingerprint: layout.fingerprint(),
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueKind::Unit => f.write_str("unit"),
            ValueKind::Atom(atom) => write!(f, "{}", atom),
            ValueKind::Text => f.write_str("text"),
            ValueKind::Bytes => f.write_str("bytes"),
            ValueKind::OwnedText => f.write_str("string"),
            ValueKind::OwnedBytes => f.write_str("vec<u8>"),
            ValueKind::ForeignBytes => f.write_str("foreign_vec<u8>"),
            ValueKind::Handle {
                type_name,
                transfer,
            } => write!(f, "{} handle<{}>", transfer, type_name),
            ValueKind::Shared { name, fingerprint } => {
                write!(f, "shared {}#{:016x}", name, fingerprint)
            }
            ValueKind::Callback { args } => {
                let args = args.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "fn({})", args.join(", "))
            }
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ArgDescriptor {
    pub name: String,
    pub kind: ValueKind,
}

/// The static contract of one bridged function.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CallDescriptor {
    namespace: String,
    name: String,
    callee: Side,
    args: Vec<ArgDescriptor>,
    returns: ValueKind,
    fallible: bool,
}

impl CallDescriptor {
    /// A function `namespace::name` implemented on the `callee` side, with
    /// no arguments, returning nothing, that cannot fail.
    pub fn new(namespace: &str, name: &str, callee: Side) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            callee,
            args: Vec::new(),
            returns: ValueKind::Unit,
            fallible: false,
        }
    }

    pub fn arg(mut self, name: &str, kind: ValueKind) -> Self {
        self.args.push(ArgDescriptor {
            name: name.to_string(),
            kind,
        });
        self
    }

    pub fn returns(mut self, kind: ValueKind) -> Self {
        self.returns = kind;
        self
    }

    pub fn fallible(mut self) -> Self {
        self.fallible = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn callee(&self) -> Side {
        self.callee
    }

    pub fn args(&self) -> &[ArgDescriptor] {
        &self.args
    }

    pub fn return_kind(&self) -> &ValueKind {
        &self.returns
    }

    pub fn is_fallible(&self) -> bool {
        self.fallible
    }

    /// The versioned link symbol, e.g. `mcbridge1$demo$do_thing`.
    pub fn symbol_name(&self) -> String {
        format!(
            "mcbridge{}${}${}",
            ABI_VERSION,
            self.namespace.replace("::", "$"),
            self.name
        )
    }

    /// The signature text both sides fingerprint.
    pub fn canonical(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|arg| format!("{}: {}", arg.name, arg.kind))
            .collect::<Vec<_>>();
        format!(
            "v{} {} {}::{}({}) -> {}{}",
            ABI_VERSION,
            self.callee,
            self.namespace,
            self.name,
            args.join(", "),
            self.returns,
            if self.fallible { " fallible" } else { "" }
        )
    }

    pub fn fingerprint(&self) -> u64 {
        fingerprint_of(&self.canonical())
    }
}

impl fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Fingerprints of every bridged function, by link symbol. Built once at
/// startup and never modified after [`ContractTable::install`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ContractTable {
    entries: BTreeMap<String, u64>,
}

impl ContractTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Registering the same signature twice is fine;
    /// registering two signatures under one symbol is not.
    pub fn register(&mut self, descriptor: &CallDescriptor) -> Result<(), BridgeError> {
        let symbol = descriptor.symbol_name();
        let fingerprint = descriptor.fingerprint();
        match self.entries.get(&symbol) {
            Some(existing) if *existing != fingerprint => Err(BridgeError::ContractViolation(
                format!("{} is registered with two different signatures", symbol),
            )),
            Some(_) => Ok(()),
            None => {
                self.entries.insert(symbol, fingerprint);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<u64> {
        self.entries.get(symbol).copied()
    }

    /// Make this the process-wide table. Installing an identical table again
    /// is a no-op; installing a different one is an error.
    pub fn install(self) -> Result<&'static ContractTable, BridgeError> {
        let mut candidate = Some(self);
        let installed = CONTRACTS.get_or_init(|| candidate.take().unwrap_or_default());
        match candidate {
            Some(table) if &table != installed => Err(BridgeError::ContractViolation(
                "a different contract table is already installed".into(),
            )),
            _ => {
                global_log::debug!("{} bridged functions in the contract table", installed.len());
                Ok(installed)
            }
        }
    }

    pub fn installed() -> Option<&'static ContractTable> {
        CONTRACTS.get()
    }

    pub fn verify(&self, descriptor: &CallDescriptor) -> Result<(), BridgeError> {
        self.verify_peer(&descriptor.symbol_name(), descriptor.fingerprint())
    }

    pub fn verify_peer(&self, symbol: &str, fingerprint: u64) -> Result<(), BridgeError> {
        match self.get(symbol) {
            None => Err(BridgeError::ContractViolation(format!(
                "{} is not in the contract table",
                symbol
            ))),
            Some(expected) if expected != fingerprint => {
                Err(BridgeError::ContractViolation(format!(
                    "{} has fingerprint {:016x}, expected {:016x}",
                    symbol, fingerprint, expected
                )))
            }
            Some(_) => Ok(()),
        }
    }
}

/// Check the foreign side's view of a bridged function against the installed
/// contract table.
///
/// # Returns
///
/// `true` if `symbol` is registered with `fingerprint`, `false` if it is
/// unknown or registered with another signature. The foreign side is expected
/// to refuse to run on `false`.
///
/// # Errors
///
/// * `BridgeError::EncodingFailure` - if `symbol` is not valid UTF-8.
/// * `BridgeError::InvalidInput` - if no contract table is installed.
#[no_mangle]
pub extern "C" fn mc_bridge_contract_check(
    symbol: McStr,
    fingerprint: u64,
    out_error: FfiOptMutPtr<FfiOptOwnedPtr<McError>>,
) -> bool {
    ffi_boundary_with_error(out_error, || {
        let symbol = symbol.to_str()?;
        let table = ContractTable::installed().ok_or_else(|| {
            BridgeError::InvalidInput("no contract table is installed".into())
        })?;
        match table.verify_peer(symbol, fingerprint) {
            Ok(()) => Ok(true),
            Err(err) => {
                global_log::warn!("foreign contract check failed: {}", err);
                Ok(false)
            }
        }
    })
}

#[no_mangle]
pub extern "C" fn mc_bridge_abi_version() -> u32 {
    ffi_boundary(|| ABI_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> CallDescriptor {
        CallDescriptor::new("store::blob", "lookup", Side::Foreign)
            .arg("key", ValueKind::Text)
            .arg("limit", ValueKind::Atom(Atom::U32))
            .returns(ValueKind::ForeignBytes)
            .fallible()
    }

    #[test]
    fn symbols_are_versioned() {
        assert_eq!(lookup().symbol_name(), "mcbridge1$store$blob$lookup");
    }

    #[test]
    fn canonical_text_is_stable() {
        assert_eq!(
            lookup().canonical(),
            "v1 foreign store::blob::lookup(key: text, limit: u32) -> foreign_vec<u8> fallible"
        );
    }

    #[test]
    fn fingerprints_see_every_part_of_the_signature() {
        let base = lookup().fingerprint();
        assert_eq!(base, lookup().fingerprint());

        let infallible = CallDescriptor::new("store::blob", "lookup", Side::Foreign)
            .arg("key", ValueKind::Text)
            .arg("limit", ValueKind::Atom(Atom::U32))
            .returns(ValueKind::ForeignBytes);
        assert_ne!(base, infallible.fingerprint());

        let wider = CallDescriptor::new("store::blob", "lookup", Side::Foreign)
            .arg("key", ValueKind::Text)
            .arg("limit", ValueKind::Atom(Atom::U64))
            .returns(ValueKind::ForeignBytes)
            .fallible();
        assert_ne!(base, wider.fingerprint());

        let host = CallDescriptor::new("store::blob", "lookup", Side::Host)
            .arg("key", ValueKind::Text)
            .arg("limit", ValueKind::Atom(Atom::U32))
            .returns(ValueKind::ForeignBytes)
            .fallible();
        assert_ne!(base, host.fingerprint());
    }

    #[test]
    fn tables_reject_conflicting_signatures() {
        let mut table = ContractTable::new();
        table.register(&lookup()).unwrap();
        table.register(&lookup()).unwrap();
        assert_eq!(table.len(), 1);

        let conflicting = CallDescriptor::new("store::blob", "lookup", Side::Foreign);
        assert!(matches!(
            table.register(&conflicting),
            Err(BridgeError::ContractViolation(_))
        ));

        assert!(table.verify(&lookup()).is_ok());
        assert!(table.verify(&conflicting).is_err());
        assert!(table
            .verify(&CallDescriptor::new("store::blob", "delete", Side::Foreign))
            .is_err());
    }

    #[test]
    fn callback_kinds_render_their_arguments() {
        let kind = ValueKind::Callback {
            args: vec![ValueKind::Atom(Atom::I32), ValueKind::Bytes],
        };
        assert_eq!(kind.to_string(), "fn(i32, bytes)");
        assert_eq!(
            ValueKind::Handle {
                type_name: "Blob".into(),
                transfer: Transfer::ByReference
            }
            .to_string(),
            "ref handle<Blob>"
        );
    }

    #[test]
    fn abi_version_is_exported() {
        assert_eq!(mc_bridge_abi_version(), ABI_VERSION);
    }
}
