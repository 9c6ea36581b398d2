// dtype.rs — Element types for arguments and temporaries
//
// Names follow numpy spelling so kernel descriptions read the same as the
// arrays they describe (`float64`, `int32`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::diag::{codes, Diagnostic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ElementType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

/// Type of loop indices and index-valued intrinsics.
pub const INDEX_TYPE: ElementType = ElementType::Int32;

impl ElementType {
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Bool => "bool",
            ElementType::Int8 => "int8",
            ElementType::Int16 => "int16",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::UInt8 => "uint8",
            ElementType::UInt16 => "uint16",
            ElementType::UInt32 => "uint32",
            ElementType::UInt64 => "uint64",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
            ElementType::Complex64 => "complex64",
            ElementType::Complex128 => "complex128",
        }
    }
}

impl FromStr for ElementType {
    type Err = Diagnostic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.trim() {
            "bool" => ElementType::Bool,
            "int8" => ElementType::Int8,
            "int16" => ElementType::Int16,
            "int32" => ElementType::Int32,
            "int64" | "int" => ElementType::Int64,
            "uint8" => ElementType::UInt8,
            "uint16" => ElementType::UInt16,
            "uint32" => ElementType::UInt32,
            "uint64" => ElementType::UInt64,
            "float32" | "single" => ElementType::Float32,
            "float64" | "float" | "double" => ElementType::Float64,
            "complex64" => ElementType::Complex64,
            "complex128" | "complex" => ElementType::Complex128,
            other => {
                return Err(Diagnostic::new(
                    codes::E0108,
                    format!("unrecognized element type '{}'", other),
                ))
            }
        };
        Ok(ty)
    }
}

impl TryFrom<String> for ElementType {
    type Error = Diagnostic;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ElementType> for String {
    fn from(ty: ElementType) -> String {
        ty.name().to_string()
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of a variable that may still be awaiting inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeSpec {
    Explicit(ElementType),
    Deferred,
}

impl TypeSpec {
    /// Interpret an instruction's `<...>` annotation; empty means deferred.
    pub fn from_annotation(text: &str) -> Result<Self, Diagnostic> {
        if text.trim().is_empty() {
            Ok(TypeSpec::Deferred)
        } else {
            Ok(TypeSpec::Explicit(text.parse()?))
        }
    }

    pub fn explicit(self) -> Option<ElementType> {
        match self {
            TypeSpec::Explicit(ty) => Some(ty),
            TypeSpec::Deferred => None,
        }
    }
}

impl From<Option<ElementType>> for TypeSpec {
    fn from(ty: Option<ElementType>) -> Self {
        ty.map_or(TypeSpec::Deferred, TypeSpec::Explicit)
    }
}

impl TryFrom<String> for TypeSpec {
    type Error = Diagnostic;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "auto" {
            return Ok(TypeSpec::Deferred);
        }
        TypeSpec::from_annotation(&s)
    }
}

impl From<TypeSpec> for String {
    fn from(spec: TypeSpec) -> String {
        spec.to_string()
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Explicit(ty) => write!(f, "{}", ty),
            TypeSpec::Deferred => f.write_str("auto"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numpy_aliases() {
        assert_eq!("float".parse::<ElementType>().unwrap(), ElementType::Float64);
        assert_eq!("float32".parse::<ElementType>().unwrap(), ElementType::Float32);
        assert_eq!(" int32 ".parse::<ElementType>().unwrap(), ElementType::Int32);
    }

    #[test]
    fn unknown_type_is_parse_error() {
        let err = "quad".parse::<ElementType>().unwrap_err();
        assert_eq!(err.code, codes::E0108);
    }

    #[test]
    fn empty_annotation_defers() {
        assert_eq!(TypeSpec::from_annotation("").unwrap(), TypeSpec::Deferred);
        assert_eq!(
            TypeSpec::from_annotation("float64").unwrap(),
            TypeSpec::Explicit(ElementType::Float64)
        );
    }

    #[test]
    fn serde_uses_names() {
        let json = serde_json::to_string(&TypeSpec::Explicit(ElementType::UInt8)).unwrap();
        assert_eq!(json, "\"uint8\"");
        let spec: TypeSpec = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(spec, TypeSpec::Deferred);
    }
}
