//! Declared types of locals, fields, array elements and signatures

use serde::{Deserialize, Serialize};
use std::fmt;

/// A bytecode-level type as declared on a local slot or member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    /// Class or interface type, by binary name
    Reference(String),
    Array(Box<Type>),
    Void,
}

/// Coarse operand category used to filter what takes part in integer typing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandKind {
    /// boolean, byte, short, char and int
    Integer,
    /// long
    Wide,
    /// float and double
    Floating,
    /// class, interface and array references
    Reference,
}

impl Type {
    pub fn kind(&self) -> Option<OperandKind> {
        match self {
            Type::Boolean | Type::Byte | Type::Short | Type::Char | Type::Int => Some(OperandKind::Integer),
            Type::Long => Some(OperandKind::Wide),
            Type::Float | Type::Double => Some(OperandKind::Floating),
            Type::Reference(_) | Type::Array(_) => Some(OperandKind::Reference),
            Type::Void => None,
        }
    }

    /// True for the five types the verifier folds into a single `int` category
    pub fn is_integer_family(&self) -> bool {
        self.kind() == Some(OperandKind::Integer)
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Type::Reference(name.into())
    }

    pub fn array_of(element: Type) -> Self {
        Type::Array(Box::new(element))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => f.write_str("boolean"),
            Type::Byte => f.write_str("byte"),
            Type::Short => f.write_str("short"),
            Type::Char => f.write_str("char"),
            Type::Int => f.write_str("int"),
            Type::Long => f.write_str("long"),
            Type::Float => f.write_str("float"),
            Type::Double => f.write_str("double"),
            Type::Reference(name) => f.write_str(name),
            Type::Array(element) => write!(f, "{element}[]"),
            Type::Void => f.write_str("void"),
        }
    }
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperandKind::Integer => "integer",
            OperandKind::Wide => "wide",
            OperandKind::Floating => "floating",
            OperandKind::Reference => "reference",
        };
        f.write_str(name)
    }
}
