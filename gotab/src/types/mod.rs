//! A value-level model of the Go types the analysis reasons about.
//!
//! This is not a full Go type checker: it covers exactly the queries the
//! scenario recognizer and refactorer perform (underlying types, structural
//! identity, basic-kind checks, struct field inspection) over types that
//! appear in test code.

pub mod resolve;

use std::collections::HashSet;
use std::fmt;

pub use resolve::{build_package_types, FnScope, Object, ObjectKind, PackageTypes, Typing};

/// The predeclared basic kinds, with aliases canonicalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
}

impl BasicKind {
    /// Map a predeclared type name (including the `byte` and `rune` aliases)
    /// to its kind.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => BasicKind::Bool,
            "int" => BasicKind::Int,
            "int8" => BasicKind::Int8,
            "int16" => BasicKind::Int16,
            "int32" | "rune" => BasicKind::Int32,
            "int64" => BasicKind::Int64,
            "uint" => BasicKind::Uint,
            "uint8" | "byte" => BasicKind::Uint8,
            "uint16" => BasicKind::Uint16,
            "uint32" => BasicKind::Uint32,
            "uint64" => BasicKind::Uint64,
            "uintptr" => BasicKind::Uintptr,
            "float32" => BasicKind::Float32,
            "float64" => BasicKind::Float64,
            "complex64" => BasicKind::Complex64,
            "complex128" => BasicKind::Complex128,
            "string" => BasicKind::String,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::String => "string",
        }
    }
}

/// One field of a [`StructType`].
#[derive(Clone, Debug, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: GoType,
    pub embedded: bool,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct StructType {
    pub fields: Vec<StructField>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct SignatureType {
    pub params: Vec<GoType>,
    pub results: Vec<GoType>,
}

/// A Go type as the analysis sees it.
#[derive(Clone, Debug, PartialEq)]
pub enum GoType {
    /// Unknown or untypeable.
    Invalid,
    Basic(BasicKind),
    Slice(Box<GoType>),
    Array(Option<u64>, Box<GoType>),
    Map(Box<GoType>, Box<GoType>),
    Pointer(Box<GoType>),
    Struct(StructType),
    Signature(SignatureType),
    Interface,
    Chan(Box<GoType>),
    /// A named type declared in the analyzed package; resolved through the
    /// package's [`TypeTable`].
    Named(String),
    /// A type from another package, kept opaque (e.g. `testing.T`).
    Foreign(String),
}

impl GoType {
    pub fn is_valid(&self) -> bool {
        !matches!(self, GoType::Invalid)
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            GoType::Struct(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for GoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoType::Invalid => write!(f, "<invalid>"),
            GoType::Basic(b) => write!(f, "{}", b.name()),
            GoType::Slice(e) => write!(f, "[]{e}"),
            GoType::Array(Some(n), e) => write!(f, "[{n}]{e}"),
            GoType::Array(None, e) => write!(f, "[...]{e}"),
            GoType::Map(k, v) => write!(f, "map[{k}]{v}"),
            GoType::Pointer(e) => write!(f, "*{e}"),
            GoType::Struct(s) => {
                write!(f, "struct{{")?;
                for (i, field) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    if field.embedded {
                        write!(f, "{}", field.ty)?;
                    } else {
                        write!(f, "{} {}", field.name, field.ty)?;
                    }
                }
                write!(f, "}}")
            }
            GoType::Signature(s) => {
                write!(f, "func(")?;
                for (i, p) in s.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")?;
                match s.results.len() {
                    0 => Ok(()),
                    1 => write!(f, " {}", s.results[0]),
                    _ => {
                        write!(f, " (")?;
                        for (i, r) in s.results.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{r}")?;
                        }
                        write!(f, ")")
                    }
                }
            }
            GoType::Interface => write!(f, "interface{{}}"),
            GoType::Chan(e) => write!(f, "chan {e}"),
            GoType::Named(n) => write!(f, "{n}"),
            GoType::Foreign(n) => write!(f, "{n}"),
        }
    }
}

/// The named types of one package.
#[derive(Clone, Debug, Default)]
pub struct TypeTable {
    defs: std::collections::HashMap<String, GoType>,
}

impl TypeTable {
    pub fn insert(&mut self, name: String, ty: GoType) {
        self.defs.insert(name, ty);
    }

    pub fn get(&self, name: &str) -> Option<&GoType> {
        self.defs.get(name)
    }

    /// The underlying type, resolving package-local named types with a
    /// cycle guard. Foreign types are their own underlying (opaque).
    pub fn underlying(&self, ty: &GoType) -> GoType {
        let mut current = ty.clone();
        let mut seen: HashSet<String> = HashSet::new();
        while let GoType::Named(name) = &current {
            if !seen.insert(name.clone()) {
                return GoType::Invalid;
            }
            match self.defs.get(name) {
                Some(def) => current = def.clone(),
                None => return GoType::Invalid,
            }
        }
        current
    }

    /// Returns `T` given `*T`; the identity for all other types.
    pub fn unpointer(&self, ty: &GoType) -> GoType {
        match self.underlying(ty) {
            GoType::Pointer(elem) => *elem,
            _ => ty.clone(),
        }
    }
}

/// Structural type identity, after `go/types.Identical`: named types match
/// by name, composite types match element-wise. Underlying types are not
/// consulted; resolve with [`TypeTable::underlying`] first where needed.
pub fn identical(a: &GoType, b: &GoType) -> bool {
    a == b
}

/// Whether a type is the basic type with the given kind, without resolving
/// named types.
pub fn is_basic(ty: &GoType, kind: BasicKind) -> bool {
    matches!(ty, GoType::Basic(k) if *k == kind)
}
