// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Shared layout types: plain aggregates both sides read and write directly.
//!
//! A shared struct is declared once with [`shared_struct!`](crate::shared_struct).
//! Its canonical C layout ([`LayoutDescriptor`]) is computed from the field
//! list, and [`verify_layout`] checks it against what the Rust compiler
//! actually produced. The same descriptor renders the C declaration the
//! foreign side compiles against.

use crate::{
    error::BridgeError,
    handle::{Opaque, OpaqueHandle, RawHandle, Side},
    signature::fingerprint_of,
};
use core::{fmt, mem};
use std::collections::BTreeSet;

/// The primitive kinds that cross the boundary by value.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Atom {
    Bool,
    U8,
    U16,
    U32,
    U64,
    Usize,
    I8,
    I16,
    I32,
    I64,
    Isize,
    F32,
    F64,
}

impl Atom {
    pub const ALL: [Atom; 13] = [
        Atom::Bool,
        Atom::U8,
        Atom::U16,
        Atom::U32,
        Atom::U64,
        Atom::Usize,
        Atom::I8,
        Atom::I16,
        Atom::I32,
        Atom::I64,
        Atom::Isize,
        Atom::F32,
        Atom::F64,
    ];

    /// The name used in interface descriptions.
    pub fn name(self) -> &'static str {
        match self {
            Atom::Bool => "bool",
            Atom::U8 => "u8",
            Atom::U16 => "u16",
            Atom::U32 => "u32",
            Atom::U64 => "u64",
            Atom::Usize => "usize",
            Atom::I8 => "i8",
            Atom::I16 => "i16",
            Atom::I32 => "i32",
            Atom::I64 => "i64",
            Atom::Isize => "isize",
            Atom::F32 => "f32",
            Atom::F64 => "f64",
        }
    }

    pub fn from_name(name: &str) -> Option<Atom> {
        Atom::ALL.iter().copied().find(|atom| atom.name() == name)
    }

    /// The C type the foreign side declares.
    pub fn c_name(self) -> &'static str {
        match self {
            Atom::Bool => "bool",
            Atom::U8 => "uint8_t",
            Atom::U16 => "uint16_t",
            Atom::U32 => "uint32_t",
            Atom::U64 => "uint64_t",
            Atom::Usize => "size_t",
            Atom::I8 => "int8_t",
            Atom::I16 => "int16_t",
            Atom::I32 => "int32_t",
            Atom::I64 => "int64_t",
            Atom::Isize => "ssize_t",
            Atom::F32 => "float",
            Atom::F64 => "double",
        }
    }

    pub fn size(self) -> usize {
        match self {
            Atom::Bool => mem::size_of::<bool>(),
            Atom::U8 | Atom::I8 => 1,
            Atom::U16 | Atom::I16 => 2,
            Atom::U32 | Atom::I32 | Atom::F32 => 4,
            Atom::U64 | Atom::I64 | Atom::F64 => 8,
            Atom::Usize | Atom::Isize => mem::size_of::<usize>(),
        }
    }

    pub fn align(self) -> usize {
        match self {
            Atom::Bool => mem::align_of::<bool>(),
            Atom::U8 | Atom::I8 => 1,
            Atom::U16 => mem::align_of::<u16>(),
            Atom::I16 => mem::align_of::<i16>(),
            Atom::U32 => mem::align_of::<u32>(),
            Atom::I32 => mem::align_of::<i32>(),
            Atom::F32 => mem::align_of::<f32>(),
            Atom::U64 => mem::align_of::<u64>(),
            Atom::I64 => mem::align_of::<i64>(),
            Atom::F64 => mem::align_of::<f64>(),
            Atom::Usize | Atom::Isize => mem::align_of::<usize>(),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a field of a shared struct holds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Atom(Atom),
    /// A nested shared struct, stored inline.
    Shared(&'static LayoutDescriptor),
    /// An opaque handle, stored as a `RawHandle`.
    Handle { type_name: &'static str },
}

impl FieldKind {
    pub fn size(&self) -> usize {
        match self {
            FieldKind::Atom(atom) => atom.size(),
            FieldKind::Shared(layout) => layout.size(),
            FieldKind::Handle { .. } => mem::size_of::<RawHandle>(),
        }
    }

    pub fn align(&self) -> usize {
        match self {
            FieldKind::Atom(atom) => atom.align(),
            FieldKind::Shared(layout) => layout.align(),
            FieldKind::Handle { .. } => mem::align_of::<RawHandle>(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldKind::Atom(atom) => write!(f, "{}", atom),
            FieldKind::Shared(layout) => write!(f, "{}", layout.canonical()),
            FieldKind::Handle { type_name } => write!(f, "handle<{}>", type_name),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub kind: FieldKind,
    pub offset: usize,
    pub size: usize,
    pub align: usize,
}

/// The canonical C layout of a shared struct: fields in declaration order,
/// each at its natural alignment, with trailing padding up to the struct's
/// alignment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LayoutDescriptor {
    name: String,
    fields: Vec<FieldLayout>,
    size: usize,
    align: usize,
}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

impl LayoutDescriptor {
    pub fn define(name: &str, fields: &[(&str, FieldKind)]) -> Result<Self, BridgeError> {
        if name.is_empty() {
            return Err(BridgeError::ContractViolation(
                "shared struct with an empty name".into(),
            ));
        }
        if fields.is_empty() {
            return Err(BridgeError::ContractViolation(format!(
                "shared struct {} has no fields",
                name
            )));
        }

        let mut seen = BTreeSet::new();
        let mut layouts = Vec::with_capacity(fields.len());
        let mut offset = 0;
        let mut align = 1;
        for (field, kind) in fields {
            if field.is_empty() {
                return Err(BridgeError::ContractViolation(format!(
                    "shared struct {} has a field with an empty name",
                    name
                )));
            }
            if !seen.insert(*field) {
                return Err(BridgeError::ContractViolation(format!(
                    "shared struct {} declares field {} twice",
                    name, field
                )));
            }
            let field_align = kind.align();
            offset = align_up(offset, field_align);
            layouts.push(FieldLayout {
                name: field.to_string(),
                kind: *kind,
                offset,
                size: kind.size(),
                align: field_align,
            });
            offset += kind.size();
            align = align.max(field_align);
        }

        Ok(Self {
            name: name.to_string(),
            fields: layouts,
            size: align_up(offset, align),
            align,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// Check a compiled struct against this layout.
    pub fn verify_against(
        &self,
        size: usize,
        align: usize,
        offsets: &[usize],
    ) -> Result<(), BridgeError> {
        if size != self.size || align != self.align {
            return Err(BridgeError::ContractViolation(format!(
                "{} is {} bytes aligned to {}, expected {} bytes aligned to {}",
                self.name, size, align, self.size, self.align
            )));
        }
        if offsets.len() != self.fields.len() {
            return Err(BridgeError::ContractViolation(format!(
                "{} has {} fields, expected {}",
                self.name,
                offsets.len(),
                self.fields.len()
            )));
        }
        for (field, offset) in self.fields.iter().zip(offsets) {
            if field.offset != *offset {
                return Err(BridgeError::ContractViolation(format!(
                    "{}.{} is at offset {}, expected {}",
                    self.name, field.name, offset, field.offset
                )));
            }
        }
        Ok(())
    }

    /// `Name{field:kind,...}`, with nested structs expanded.
    pub fn canonical(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(|field| format!("{}:{}", field.name, field.kind))
            .collect::<Vec<_>>();
        format!("{}{{{}}}", self.name, fields.join(","))
    }

    pub fn fingerprint(&self) -> u64 {
        fingerprint_of(&self.canonical())
    }

    /// The C declaration of this struct.
    pub fn c_declaration(&self) -> String {
        let mut out = format!("typedef struct {} {{\n", self.name);
        for field in &self.fields {
            match field.kind {
                FieldKind::Atom(atom) => {
                    out += &format!("  {} {};\n", atom.c_name(), field.name);
                }
                FieldKind::Shared(layout) => {
                    out += &format!("  {} {};\n", layout.name(), field.name);
                }
                FieldKind::Handle { type_name } => {
                    out += &format!("  McRawHandle {}; /* {} */\n", field.name, type_name);
                }
            }
        }
        out += &format!("}} {};\n", self.name);
        out
    }
}

/// A type that can be a field of a shared struct.
pub trait SharedField {
    fn kind() -> Result<FieldKind, BridgeError>
    where
        Self: Sized;

    /// Hand destruction responsibility for any handles inside to `to`.
    fn release_to(&self, _to: Side) -> Result<(), BridgeError> {
        Ok(())
    }
}

macro_rules! impl_shared_field_for_atoms {
    ($($Type:ty => $Atom:ident),+) => {
        $(
            impl SharedField for $Type {
                fn kind() -> Result<FieldKind, BridgeError> {
                    Ok(FieldKind::Atom(Atom::$Atom))
                }
            }
        )+
    }
}

impl_shared_field_for_atoms![
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    f32 => F32,
    f64 => F64
];

impl<T: Opaque> SharedField for OpaqueHandle<T> {
    fn kind() -> Result<FieldKind, BridgeError> {
        Ok(FieldKind::Handle {
            type_name: T::registry().type_name(),
        })
    }

    fn release_to(&self, to: Side) -> Result<(), BridgeError> {
        T::registry().transfer(self.raw(), to.other(), to)
    }
}

/// Release every field to `to`. If one fails, the fields already released
/// are handed back before the error is returned.
pub fn release_fields(fields: &[&dyn SharedField], to: Side) -> Result<(), BridgeError> {
    for (done, field) in fields.iter().enumerate() {
        if let Err(err) = field.release_to(to) {
            for field in fields[..done].iter().rev() {
                // Undoing a transfer that just succeeded cannot fail.
                let _ = field.release_to(to.other());
            }
            return Err(err);
        }
    }
    Ok(())
}

/// A `#[repr(C)]` struct whose layout is described by a [`LayoutDescriptor`].
///
/// # Safety
///
/// `rust_offsets` and `fields` must list every field, in declaration order.
/// Implemented by [`shared_struct!`](crate::shared_struct).
pub unsafe trait SharedLayout: Sized {
    fn layout() -> Result<&'static LayoutDescriptor, BridgeError>;

    fn rust_offsets() -> Vec<usize>;

    fn fields(&self) -> Vec<&dyn SharedField>;
}

/// Compare the canonical layout of `T` against its compiled layout.
pub fn verify_layout<T: SharedLayout>() -> Result<&'static LayoutDescriptor, BridgeError> {
    let layout = T::layout()?;
    layout.verify_against(mem::size_of::<T>(), mem::align_of::<T>(), &T::rust_offsets())?;
    Ok(layout)
}

/// Declare a shared struct.
///
/// ```ignore
/// shared_struct! {
///     #[derive(Clone, Copy, Debug, PartialEq)]
///     pub struct Point {
///         pub x: i32,
///         pub y: i32,
///     }
/// }
/// ```
///
/// Fields are atoms, `OpaqueHandle`s, or other shared structs.
#[macro_export]
macro_rules! shared_struct {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$field_attr:meta])* $field_vis:vis $field:ident : $field_ty:ty ),+ $(,)?
        }
    ) => {
        $(#[$attr])*
        #[repr(C)]
        $vis struct $name {
            $( $(#[$field_attr])* $field_vis $field: $field_ty ),+
        }

        unsafe impl $crate::layout::SharedLayout for $name {
            fn layout() -> ::core::result::Result<
                &'static $crate::layout::LayoutDescriptor,
                $crate::error::BridgeError,
            > {
                static LAYOUT: ::std::sync::OnceLock<$crate::layout::LayoutDescriptor> =
                    ::std::sync::OnceLock::new();
                if let Some(layout) = LAYOUT.get() {
                    return Ok(layout);
                }
                let layout = $crate::layout::LayoutDescriptor::define(
                    stringify!($name),
                    &[$(
                        (
                            stringify!($field),
                            <$field_ty as $crate::layout::SharedField>::kind()?,
                        )
                    ),+],
                )?;
                Ok(LAYOUT.get_or_init(|| layout))
            }

            fn rust_offsets() -> ::std::vec::Vec<usize> {
                ::std::vec![$(::core::mem::offset_of!($name, $field)),+]
            }

            fn fields(&self) -> ::std::vec::Vec<&dyn $crate::layout::SharedField> {
                ::std::vec![$(&self.$field as &dyn $crate::layout::SharedField),+]
            }
        }

        impl $crate::layout::SharedField for $name {
            fn kind() -> ::core::result::Result<
                $crate::layout::FieldKind,
                $crate::error::BridgeError,
            > {
                Ok($crate::layout::FieldKind::Shared(
                    <Self as $crate::layout::SharedLayout>::layout()?,
                ))
            }

            fn release_to(
                &self,
                to: $crate::handle::Side,
            ) -> ::core::result::Result<(), $crate::error::BridgeError> {
                $crate::layout::release_fields(
                    &<Self as $crate::layout::SharedLayout>::fields(self),
                    to,
                )
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    shared_struct! {
        #[derive(Clone, Copy, Debug, Default, PartialEq)]
        struct Mixed {
            flag: bool,
            wide: u64,
            narrow: u16,
        }
    }

    shared_struct! {
        #[derive(Clone, Copy, Debug, Default, PartialEq)]
        struct Nested {
            tag: u8,
            inner: Mixed,
            ratio: f32,
        }
    }

    #[test]
    fn padding_follows_c_rules() {
        let layout = LayoutDescriptor::define(
            "Mixed",
            &[
                ("flag", FieldKind::Atom(Atom::Bool)),
                ("wide", FieldKind::Atom(Atom::U64)),
                ("narrow", FieldKind::Atom(Atom::U16)),
            ],
        )
        .unwrap();
        let offsets = layout.fields().iter().map(|f| f.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(layout.size(), 24);
        assert_eq!(layout.align(), 8);
    }

    #[test]
    fn declared_structs_match_the_compiler() {
        let mixed = verify_layout::<Mixed>().unwrap();
        assert_eq!(mixed.size(), mem::size_of::<Mixed>());
        let nested = verify_layout::<Nested>().unwrap();
        assert_eq!(nested.fields()[1].kind, FieldKind::Shared(mixed));
    }

    #[test]
    fn bad_definitions_are_contract_violations() {
        let duplicate = LayoutDescriptor::define(
            "Dup",
            &[
                ("a", FieldKind::Atom(Atom::U8)),
                ("a", FieldKind::Atom(Atom::U16)),
            ],
        );
        assert!(matches!(duplicate, Err(BridgeError::ContractViolation(_))));
        assert!(LayoutDescriptor::define("Empty", &[]).is_err());
        assert!(LayoutDescriptor::define("", &[("a", FieldKind::Atom(Atom::U8))]).is_err());
        assert!(LayoutDescriptor::define("Anon", &[("", FieldKind::Atom(Atom::U8))]).is_err());
    }

    #[test]
    fn mismatches_are_reported() {
        let layout = Mixed::layout().unwrap();
        assert!(layout.verify_against(24, 8, &[0, 8, 16]).is_ok());
        assert!(layout.verify_against(16, 8, &[0, 8, 16]).is_err());
        assert!(layout.verify_against(24, 8, &[0, 4, 16]).is_err());
        assert!(layout.verify_against(24, 8, &[0, 8]).is_err());
    }

    #[test]
    fn c_declaration_lists_fields_in_order() {
        let decl = Nested::layout().unwrap().c_declaration();
        assert_eq!(
            decl,
            "typedef struct Nested {\n  uint8_t tag;\n  Mixed inner;\n  float ratio;\n} Nested;\n"
        );
    }

    #[test]
    fn fingerprints_depend_on_structure() {
        let a = LayoutDescriptor::define("P", &[("x", FieldKind::Atom(Atom::I32))]).unwrap();
        let b = LayoutDescriptor::define("P", &[("x", FieldKind::Atom(Atom::I64))]).unwrap();
        let c = LayoutDescriptor::define("P", &[("x", FieldKind::Atom(Atom::I32))]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.canonical(), "P{x:i32}");
    }

    #[test]
    fn atoms_by_name() {
        for atom in Atom::ALL {
            assert_eq!(Atom::from_name(atom.name()), Some(atom));
        }
        assert_eq!(Atom::from_name("text"), None);
        assert_eq!(Atom::Usize.c_name(), "size_t");
    }
}
