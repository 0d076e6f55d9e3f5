//! Statements and operands of a method body
//!
//! The statement set is closed: every consumer matches it exhaustively, so a
//! new kind cannot slip past the constraint collector unnoticed.

use super::body::LocalId;
use super::types::Type;
use serde::{Deserialize, Serialize};

/// An immediate operand: a local slot or a literal constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Local(LocalId),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    String(String),
}

impl From<LocalId> for Operand {
    fn from(id: LocalId) -> Self {
        Operand::Local(id)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Int(value)
    }
}

/// Two-operand arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl BinOp {
    /// `&`, `|` and `^` are defined on booleans as well as on integers
    pub fn is_bitwise(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or | BinOp::Xor)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr | BinOp::Ushr)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
        }
    }
}

/// Conditional-branch comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn is_equality(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// A field reference; `ty` is the declared field type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub ty: Type,
}

impl FieldRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, ty: Type) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            ty,
        }
    }
}

/// A method signature as seen from a call site
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
}

/// Right-hand side of an assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rvalue {
    Use(Operand),
    Binary {
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
    Neg(Operand),
    /// `arraylength`
    Length(Operand),
    InstanceOf {
        value: Operand,
        ty: Type,
    },
    /// `lcmp`, `fcmpl`, `dcmpg` and friends; yields -1, 0 or 1
    WideCompare {
        lhs: Operand,
        rhs: Operand,
    },
    NewArray {
        element: Type,
        size: Operand,
    },
    Invoke {
        method: MethodRef,
        receiver: Option<Operand>,
        args: Vec<Operand>,
    },
}

/// Where an identity statement takes its value from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Parameter { index: u16, ty: Type },
    This,
    CaughtException,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayAccess {
    Load {
        dest: LocalId,
        array: Operand,
        index: Operand,
        element: Type,
    },
    Store {
        array: Operand,
        index: Operand,
        value: Operand,
        element: Type,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAccess {
    /// Instance access when `base` is present, static otherwise
    Load {
        dest: LocalId,
        field: FieldRef,
        base: Option<Operand>,
    },
    Store {
        field: FieldRef,
        base: Option<Operand>,
        value: Operand,
    },
}

/// One IR statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    Assign { dest: LocalId, value: Rvalue },
    Identity { dest: LocalId, source: IdentitySource },
    Return { value: Option<Operand> },
    Throw { value: Operand },
    /// Condition of a conditional branch; the target is irrelevant to typing
    Compare { op: CmpOp, lhs: Operand, rhs: Operand },
    ArrayAccess { access: ArrayAccess },
    FieldAccess { access: FieldAccess },
    Cast { dest: LocalId, value: Operand, target: Type },
}

impl Stmt {
    pub fn assign(dest: LocalId, value: impl Into<Operand>) -> Self {
        Stmt::Assign {
            dest,
            value: Rvalue::Use(value.into()),
        }
    }

    pub fn binary(dest: LocalId, op: BinOp, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Self {
        Stmt::Assign {
            dest,
            value: Rvalue::Binary {
                op,
                lhs: lhs.into(),
                rhs: rhs.into(),
            },
        }
    }

    pub fn parameter(dest: LocalId, index: u16, ty: Type) -> Self {
        Stmt::Identity {
            dest,
            source: IdentitySource::Parameter { index, ty },
        }
    }

    pub fn compare(op: CmpOp, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Self {
        Stmt::Compare {
            op,
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }

    pub fn array_load(dest: LocalId, array: impl Into<Operand>, index: impl Into<Operand>, element: Type) -> Self {
        Stmt::ArrayAccess {
            access: ArrayAccess::Load {
                dest,
                array: array.into(),
                index: index.into(),
                element,
            },
        }
    }

    pub fn array_store(
        array: impl Into<Operand>,
        index: impl Into<Operand>,
        value: impl Into<Operand>,
        element: Type,
    ) -> Self {
        Stmt::ArrayAccess {
            access: ArrayAccess::Store {
                array: array.into(),
                index: index.into(),
                value: value.into(),
                element,
            },
        }
    }

    pub fn static_load(dest: LocalId, field: FieldRef) -> Self {
        Stmt::FieldAccess {
            access: FieldAccess::Load { dest, field, base: None },
        }
    }

    pub fn static_store(field: FieldRef, value: impl Into<Operand>) -> Self {
        Stmt::FieldAccess {
            access: FieldAccess::Store {
                field,
                base: None,
                value: value.into(),
            },
        }
    }

    pub fn cast(dest: LocalId, value: impl Into<Operand>, target: Type) -> Self {
        Stmt::Cast {
            dest,
            value: value.into(),
            target,
        }
    }

    pub fn ret(value: impl Into<Operand>) -> Self {
        Stmt::Return {
            value: Some(value.into()),
        }
    }
}
