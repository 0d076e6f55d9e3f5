//! Statement-form intermediate representation of method bodies
//!
//! Only what integer typing needs is modelled: local slots with declared
//! types, a closed set of statement kinds, and literal operands. Bodies are
//! plain data and (de)serialise with serde so they can be exchanged as JSON.

mod body;
mod stmt;
mod types;

pub use body::{Local, LocalId, MethodBody, Program};
pub use stmt::{ArrayAccess, BinOp, CmpOp, FieldAccess, FieldRef, IdentitySource, MethodRef, Operand, Rvalue, Stmt};
pub use types::{OperandKind, Type};
