//! Method bodies: ordered locals plus an ordered statement list

use super::stmt::{ArrayAccess, FieldAccess, IdentitySource, Operand, Rvalue, Stmt};
use super::types::{OperandKind, Type};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense index of a local slot within its method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub u32);

impl LocalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Local {
    pub name: String,
    pub ty: Type,
}

/// A method body in statement form.
///
/// Statement and local order are significant: resolution visits both in
/// declaration order, and identical bodies always resolve identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    pub name: String,
    pub return_type: Type,
    #[serde(default)]
    pub locals: Vec<Local>,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
}

impl MethodBody {
    pub fn new(name: impl Into<String>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            return_type,
            locals: Vec::new(),
            stmts: Vec::new(),
        }
    }

    /// Declare a new local and return its id
    pub fn add_local(&mut self, name: impl Into<String>, ty: Type) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(Local { name: name.into(), ty });
        id
    }

    /// Append a statement and return its index
    pub fn push(&mut self, stmt: Stmt) -> usize {
        self.stmts.push(stmt);
        self.stmts.len() - 1
    }

    pub fn local(&self, id: LocalId) -> Option<&Local> {
        self.locals.get(id.index())
    }

    pub fn local_type(&self, id: LocalId) -> Option<&Type> {
        self.local(id).map(|local| &local.ty)
    }

    pub fn local_name(&self, id: LocalId) -> String {
        self.local(id).map_or_else(|| id.to_string(), |local| local.name.clone())
    }

    /// Locals whose declared type is in the integer family, in declaration order
    pub fn integer_locals(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.locals
            .iter()
            .enumerate()
            .filter(|(_, local)| local.ty.is_integer_family())
            .map(|(index, _)| LocalId(index as u32))
    }

    pub fn set_local_type(&mut self, id: LocalId, ty: Type) {
        if let Some(local) = self.locals.get_mut(id.index()) {
            local.ty = ty;
        }
    }

    /// Coarse kind of an operand; `None` for a local id that does not exist
    pub fn operand_kind(&self, operand: &Operand) -> Option<OperandKind> {
        match operand {
            Operand::Local(id) => self.local_type(*id).and_then(Type::kind),
            Operand::Int(_) => Some(OperandKind::Integer),
            Operand::Long(_) => Some(OperandKind::Wide),
            Operand::Float(_) | Operand::Double(_) => Some(OperandKind::Floating),
            Operand::Null | Operand::String(_) => Some(OperandKind::Reference),
        }
    }

    /// Render statement `index` using local names
    pub fn display_stmt(&self, index: usize) -> String {
        match self.stmts.get(index) {
            Some(stmt) => StmtDisplay { body: self, stmt }.to_string(),
            None => format!("<statement {index}>"),
        }
    }
}

/// A batch of method bodies, as read by the command-line front end
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub methods: Vec<MethodBody>,
}

struct StmtDisplay<'a> {
    body: &'a MethodBody,
    stmt: &'a Stmt,
}

impl StmtDisplay<'_> {
    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Local(id) => self.body.local_name(*id),
            Operand::Int(v) => v.to_string(),
            Operand::Long(v) => format!("{v}L"),
            Operand::Float(v) => format!("{v}F"),
            Operand::Double(v) => v.to_string(),
            Operand::Null => "null".to_string(),
            Operand::String(s) => format!("{s:?}"),
        }
    }

    fn rvalue(&self, value: &Rvalue) -> String {
        match value {
            Rvalue::Use(op) => self.operand(op),
            Rvalue::Binary { op, lhs, rhs } => {
                format!("{} {} {}", self.operand(lhs), op.symbol(), self.operand(rhs))
            }
            Rvalue::Neg(op) => format!("neg {}", self.operand(op)),
            Rvalue::Length(op) => format!("lengthof {}", self.operand(op)),
            Rvalue::InstanceOf { value, ty } => format!("{} instanceof {ty}", self.operand(value)),
            Rvalue::WideCompare { lhs, rhs } => format!("{} cmp {}", self.operand(lhs), self.operand(rhs)),
            Rvalue::NewArray { element, size } => format!("newarray ({element})[{}]", self.operand(size)),
            Rvalue::Invoke { method, receiver, args } => {
                let args: Vec<String> = args.iter().map(|arg| self.operand(arg)).collect();
                match receiver {
                    Some(base) => format!("{}.{}({})", self.operand(base), method.name, args.join(", ")),
                    None => format!("{}.{}({})", method.owner, method.name, args.join(", ")),
                }
            }
        }
    }
}

impl fmt::Display for StmtDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |id: &LocalId| self.body.local_name(*id);
        match self.stmt {
            Stmt::Assign { dest, value } => write!(f, "{} = {}", name(dest), self.rvalue(value)),
            Stmt::Identity { dest, source } => match source {
                IdentitySource::Parameter { index, ty } => write!(f, "{} := @parameter{index}: {ty}", name(dest)),
                IdentitySource::This => write!(f, "{} := @this", name(dest)),
                IdentitySource::CaughtException => write!(f, "{} := @caughtexception", name(dest)),
            },
            Stmt::Return { value: Some(value) } => write!(f, "return {}", self.operand(value)),
            Stmt::Return { value: None } => f.write_str("return"),
            Stmt::Throw { value } => write!(f, "throw {}", self.operand(value)),
            Stmt::Compare { op, lhs, rhs } => {
                write!(f, "if {} {} {}", self.operand(lhs), op.symbol(), self.operand(rhs))
            }
            Stmt::ArrayAccess { access } => match access {
                ArrayAccess::Load {
                    dest, array, index, ..
                } => write!(f, "{} = {}[{}]", name(dest), self.operand(array), self.operand(index)),
                ArrayAccess::Store {
                    array, index, value, ..
                } => write!(f, "{}[{}] = {}", self.operand(array), self.operand(index), self.operand(value)),
            },
            Stmt::FieldAccess { access } => match access {
                FieldAccess::Load { dest, field, base } => match base {
                    Some(base) => write!(f, "{} = {}.{}", name(dest), self.operand(base), field.name),
                    None => write!(f, "{} = {}.{}", name(dest), field.owner, field.name),
                },
                FieldAccess::Store { field, base, value } => match base {
                    Some(base) => write!(f, "{}.{} = {}", self.operand(base), field.name, self.operand(value)),
                    None => write!(f, "{}.{} = {}", field.owner, field.name, self.operand(value)),
                },
            },
            Stmt::Cast { dest, value, target } => write!(f, "{} = ({target}) {}", name(dest), self.operand(value)),
        }
    }
}
