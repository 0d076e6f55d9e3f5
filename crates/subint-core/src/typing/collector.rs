//! Constraint derivation and collection
//!
//! Each statement is translated once into a short list of [`Constraint`]s
//! over [`Term`]s. The collector turns those into graph edges and the checker
//! evaluates the very same list against a candidate assignment, so the two
//! can never disagree about what a statement demands.

use super::lattice::TypeNode;
use super::variable::{TypeGraph, VarId};
use crate::error::MalformedStatement;
use crate::ir::{
    ArrayAccess, FieldAccess, IdentitySource, LocalId, MethodBody, Operand, OperandKind, Rvalue, Stmt, Type,
};
use smallvec::SmallVec;

/// How much of the derived constraint set reaches the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionMode {
    /// Optimistic pass: intermediate values only collect their operands and
    /// never flow back into them
    Permissive,
    /// Fallback pass: every derived constraint
    Full,
}

/// One side of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Local(LocalId),
    Node(TypeNode),
    /// Statement-local intermediate value, numbered within its statement
    Scratch(u8),
}

/// `sub ≤ sup`: the value of `sub` flows into `sup`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub sub: Term,
    pub sup: Term,
}

impl Constraint {
    pub fn new(sub: Term, sup: Term) -> Self {
        Self { sub, sup }
    }

    /// An intermediate value flowing back into an operand
    pub fn is_back_edge(&self) -> bool {
        matches!(self.sub, Term::Scratch(_))
    }

    pub fn included_in(&self, mode: CollectionMode) -> bool {
        mode == CollectionMode::Full || !self.is_back_edge()
    }
}

type StmtConstraints = SmallVec<[Constraint; 4]>;

/// Every constraint of a body, grouped by statement index
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    statements: Vec<StmtConstraints>,
}

impl ConstraintSet {
    /// Derive the constraints of every statement in order.
    ///
    /// Fails on the first statement whose operands do not fit the context
    /// they appear in.
    pub fn derive(body: &MethodBody) -> Result<Self, MalformedStatement> {
        let statements = body
            .stmts
            .iter()
            .enumerate()
            .map(|(index, stmt)| Deriver::new(body, index).derive(stmt))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { statements })
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Constraints of statement `index`
    pub fn statement(&self, index: usize) -> &[Constraint] {
        self.statements.get(index).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// `(statement index, constraint)` pairs that the given mode keeps
    pub fn iter(&self, mode: CollectionMode) -> impl Iterator<Item = (usize, &Constraint)> + '_ {
        self.statements
            .iter()
            .enumerate()
            .flat_map(|(index, list)| list.iter().map(move |c| (index, c)))
            .filter(move |(_, c)| c.included_in(mode))
    }
}

struct Deriver<'a> {
    body: &'a MethodBody,
    index: usize,
    out: StmtConstraints,
}

impl<'a> Deriver<'a> {
    fn new(body: &'a MethodBody, index: usize) -> Self {
        Self {
            body,
            index,
            out: SmallVec::new(),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> MalformedStatement {
        MalformedStatement {
            index: self.index,
            text: self.body.display_stmt(self.index),
            reason: reason.into(),
        }
    }

    /// Constants and declared types are fixed, so a node-to-node constraint
    /// carries no information for inference
    fn push(&mut self, sub: Term, sup: Term) {
        if matches!((sub, sup), (Term::Node(_), Term::Node(_))) {
            return;
        }
        self.out.push(Constraint::new(sub, sup));
    }

    fn local_kind(&self, id: LocalId) -> Result<OperandKind, MalformedStatement> {
        let ty = self
            .body
            .local_type(id)
            .ok_or_else(|| self.malformed(format!("unknown local {id}")))?;
        ty.kind()
            .ok_or_else(|| self.malformed(format!("local {} is declared void", self.body.local_name(id))))
    }

    fn operand_kind(&self, operand: &Operand) -> Result<OperandKind, MalformedStatement> {
        match operand {
            Operand::Local(id) => self.local_kind(*id),
            _ => self
                .body
                .operand_kind(operand)
                .ok_or_else(|| self.malformed("operand has no kind")),
        }
    }

    fn expect_kind(&self, operand: &Operand, expected: OperandKind) -> Result<(), MalformedStatement> {
        let found = self.operand_kind(operand)?;
        if found == expected {
            Ok(())
        } else {
            Err(self.malformed(format!("{found} operand where {expected} is expected")))
        }
    }

    /// Term for an operand used in an integer context
    fn integer(&self, operand: &Operand) -> Result<Term, MalformedStatement> {
        self.expect_kind(operand, OperandKind::Integer)?;
        Ok(match operand {
            Operand::Local(id) => Term::Local(*id),
            Operand::Int(value) => Term::Node(TypeNode::of_literal(*value)),
            _ => return Err(self.malformed("non-integer constant in integer context")),
        })
    }

    fn integer_dest(&self, dest: LocalId) -> Result<Term, MalformedStatement> {
        match self.local_kind(dest)? {
            OperandKind::Integer => Ok(Term::Local(dest)),
            other => Err(self.malformed(format!(
                "{} is {other} but receives an integer",
                self.body.local_name(dest)
            ))),
        }
    }

    /// Value of declared type `ty` flows into `dest`
    fn flow_type_into(&mut self, ty: &Type, dest: LocalId) -> Result<(), MalformedStatement> {
        match TypeNode::from_type(ty) {
            Some(node) => {
                let dest = self.integer_dest(dest)?;
                self.push(Term::Node(node), dest);
                Ok(())
            }
            None => self.expect_dest_kind(dest, ty),
        }
    }

    /// `operand` is stored into a slot of declared type `ty`
    fn flow_operand_into_type(&mut self, operand: &Operand, ty: &Type) -> Result<(), MalformedStatement> {
        match TypeNode::from_type(ty) {
            Some(node) => {
                let sub = self.integer(operand)?;
                self.push(sub, Term::Node(node));
                Ok(())
            }
            None => {
                let expected = ty.kind().ok_or_else(|| self.malformed("value stored into void"))?;
                self.expect_kind(operand, expected)
            }
        }
    }

    fn expect_dest_kind(&self, dest: LocalId, ty: &Type) -> Result<(), MalformedStatement> {
        let expected = ty.kind().ok_or_else(|| self.malformed("void value assigned"))?;
        let found = self.local_kind(dest)?;
        if found == expected {
            Ok(())
        } else {
            Err(self.malformed(format!(
                "{} is {found} but receives a {expected} value",
                self.body.local_name(dest)
            )))
        }
    }

    fn bounded_by_int(&mut self, operand: &Operand) -> Result<(), MalformedStatement> {
        let sub = self.integer(operand)?;
        self.push(sub, Term::Node(TypeNode::Int));
        Ok(())
    }

    fn derive(mut self, stmt: &Stmt) -> Result<StmtConstraints, MalformedStatement> {
        let body = self.body;
        match stmt {
            Stmt::Assign { dest, value } => self.assign(*dest, value)?,
            Stmt::Identity { dest, source } => match source {
                IdentitySource::Parameter { ty, .. } => self.flow_type_into(ty, *dest)?,
                IdentitySource::This | IdentitySource::CaughtException => {
                    if self.local_kind(*dest)? != OperandKind::Reference {
                        return Err(self.malformed("identity source is a reference"));
                    }
                }
            },
            Stmt::Return { value } => match (value, &body.return_type) {
                (None, Type::Void) => {}
                (None, ty) => return Err(self.malformed(format!("missing {ty} return value"))),
                (Some(_), Type::Void) => return Err(self.malformed("value returned from void method")),
                (Some(value), ty) => self.flow_operand_into_type(value, ty)?,
            },
            Stmt::Throw { value } => self.expect_kind(value, OperandKind::Reference)?,
            Stmt::Compare { op, lhs, rhs } => {
                let kind = self.operand_kind(lhs)?;
                self.expect_kind(rhs, kind)?;
                match kind {
                    OperandKind::Integer if op.is_equality() => self.equality(lhs, rhs)?,
                    OperandKind::Integer => {
                        self.bounded_by_int(lhs)?;
                        self.bounded_by_int(rhs)?;
                    }
                    OperandKind::Reference if op.is_equality() => {}
                    other => {
                        return Err(self.malformed(format!("`{}` on {other} operands", op.symbol())));
                    }
                }
            }
            Stmt::ArrayAccess { access } => match access {
                ArrayAccess::Load {
                    dest,
                    array,
                    index,
                    element,
                } => {
                    self.expect_kind(array, OperandKind::Reference)?;
                    self.bounded_by_int(index)?;
                    self.flow_type_into(element, *dest)?;
                }
                ArrayAccess::Store {
                    array,
                    index,
                    value,
                    element,
                } => {
                    self.expect_kind(array, OperandKind::Reference)?;
                    self.bounded_by_int(index)?;
                    self.flow_operand_into_type(value, element)?;
                }
            },
            Stmt::FieldAccess { access } => match access {
                FieldAccess::Load { dest, field, base } => {
                    if let Some(base) = base {
                        self.expect_kind(base, OperandKind::Reference)?;
                    }
                    self.flow_type_into(&field.ty, *dest)?;
                }
                FieldAccess::Store { field, base, value } => {
                    if let Some(base) = base {
                        self.expect_kind(base, OperandKind::Reference)?;
                    }
                    self.flow_operand_into_type(value, &field.ty)?;
                }
            },
            Stmt::Cast { dest, value, target } => {
                let kind = self.operand_kind(value)?;
                match (kind, target.kind()) {
                    (OperandKind::Reference, Some(OperandKind::Reference)) => {}
                    (OperandKind::Reference, _) | (_, Some(OperandKind::Reference)) => {
                        return Err(self.malformed("cast between reference and primitive"));
                    }
                    (OperandKind::Integer, _) => self.bounded_by_int(value)?,
                    _ => {}
                }
                self.flow_type_into(target, *dest)?;
            }
        }
        Ok(self.out)
    }

    fn assign(&mut self, dest: LocalId, value: &Rvalue) -> Result<(), MalformedStatement> {
        let dest_kind = self.local_kind(dest)?;
        let int = Term::Node(TypeNode::Int);
        match value {
            Rvalue::Use(operand) => {
                if dest_kind == OperandKind::Integer {
                    let sub = self.integer(operand)?;
                    self.push(sub, Term::Local(dest));
                } else {
                    self.expect_kind(operand, dest_kind)?;
                }
            }
            Rvalue::Binary { op, lhs, rhs } => match dest_kind {
                OperandKind::Integer if op.is_bitwise() => {
                    let lhs = self.integer(lhs)?;
                    let rhs = self.integer(rhs)?;
                    self.push(lhs, Term::Local(dest));
                    self.push(rhs, Term::Local(dest));
                }
                OperandKind::Integer => {
                    self.push(int, Term::Local(dest));
                    self.bounded_by_int(lhs)?;
                    self.bounded_by_int(rhs)?;
                }
                OperandKind::Wide | OperandKind::Floating => {
                    self.expect_kind(lhs, dest_kind)?;
                    if op.is_shift() {
                        self.bounded_by_int(rhs)?;
                    } else {
                        self.expect_kind(rhs, dest_kind)?;
                    }
                }
                OperandKind::Reference => {
                    return Err(self.malformed(format!("`{}` produces a primitive", op.symbol())));
                }
            },
            Rvalue::Neg(operand) => match dest_kind {
                OperandKind::Integer => {
                    self.push(int, Term::Local(dest));
                    self.bounded_by_int(operand)?;
                }
                OperandKind::Reference => return Err(self.malformed("negation produces a primitive")),
                _ => self.expect_kind(operand, dest_kind)?,
            },
            Rvalue::Length(array) => {
                self.expect_kind(array, OperandKind::Reference)?;
                let dest = self.integer_dest(dest)?;
                self.push(int, dest);
            }
            Rvalue::InstanceOf { value, .. } => {
                self.expect_kind(value, OperandKind::Reference)?;
                let dest = self.integer_dest(dest)?;
                self.push(Term::Node(TypeNode::Boolean), dest);
            }
            Rvalue::WideCompare { lhs, rhs } => {
                let kind = self.operand_kind(lhs)?;
                if !matches!(kind, OperandKind::Wide | OperandKind::Floating) {
                    return Err(self.malformed(format!("wide comparison of {kind} operands")));
                }
                self.expect_kind(rhs, kind)?;
                let dest = self.integer_dest(dest)?;
                self.push(Term::Node(TypeNode::Byte), dest);
            }
            Rvalue::NewArray { size, .. } => {
                if dest_kind != OperandKind::Reference {
                    return Err(self.malformed("new array assigned to a primitive"));
                }
                self.bounded_by_int(size)?;
            }
            Rvalue::Invoke { method, receiver, args } => {
                if let Some(receiver) = receiver {
                    self.expect_kind(receiver, OperandKind::Reference)?;
                }
                if args.len() != method.params.len() {
                    return Err(self.malformed(format!(
                        "{} arguments for {}.{} taking {}",
                        args.len(),
                        method.owner,
                        method.name,
                        method.params.len()
                    )));
                }
                for (arg, param) in args.iter().zip(&method.params) {
                    self.flow_operand_into_type(arg, param)?;
                }
                self.flow_type_into(&method.ret, dest)?;
            }
        }
        Ok(())
    }

    /// `==` / `!=` between integers: the operands must share a type.
    ///
    /// Two locals meet in an intermediate value that bounds both from above
    /// and, in the full set, from below as well.
    fn equality(&mut self, lhs: &Operand, rhs: &Operand) -> Result<(), MalformedStatement> {
        let lhs = self.integer(lhs)?;
        let rhs = self.integer(rhs)?;
        match (lhs, rhs) {
            (Term::Local(_), Term::Local(_)) => {
                self.push(lhs, Term::Scratch(0));
                self.push(rhs, Term::Scratch(0));
                self.push(Term::Scratch(0), lhs);
                self.push(Term::Scratch(0), rhs);
            }
            (Term::Node(_), Term::Local(_)) => self.push(lhs, rhs),
            (Term::Local(_), Term::Node(_)) => self.push(rhs, lhs),
            _ => {}
        }
        Ok(())
    }
}

/// Adds the edges of a [`ConstraintSet`] to a graph
pub struct ConstraintCollector<'g> {
    graph: &'g mut TypeGraph,
    mode: CollectionMode,
}

impl<'g> ConstraintCollector<'g> {
    pub fn new(graph: &'g mut TypeGraph, mode: CollectionMode) -> Self {
        Self { graph, mode }
    }

    /// Add every constraint the mode keeps; returns the number of constraints added
    pub fn collect(&mut self, set: &ConstraintSet) -> usize {
        let mut added = 0;
        for index in 0..set.len() {
            let mut scratch: SmallVec<[(u8, VarId); 2]> = SmallVec::new();
            for constraint in set.statement(index) {
                if !constraint.included_in(self.mode) {
                    continue;
                }
                let sub = self.var(constraint.sub, &mut scratch);
                let sup = self.var(constraint.sup, &mut scratch);
                self.graph.add_child(sup, sub);
                added += 1;
            }
        }
        added
    }

    fn var(&mut self, term: Term, scratch: &mut SmallVec<[(u8, VarId); 2]>) -> VarId {
        match term {
            Term::Local(id) => self.graph.local(id),
            Term::Node(node) => self.graph.node(node),
            Term::Scratch(n) => match scratch.iter().find(|(k, _)| *k == n) {
                Some((_, var)) => *var,
                None => {
                    let var = self.graph.fresh();
                    scratch.push((n, var));
                    var
                }
            },
        }
    }
}
