//! Replays derived constraints against a candidate assignment

use super::collector::{Constraint, ConstraintSet, Term};
use super::lattice::TypeNode;
use crate::error::FatalTypeError;
use crate::ir::{LocalId, MethodBody};
use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Candidate type of every integer-family local, in declaration order
pub type Assignment = IndexMap<LocalId, TypeNode>;

/// Longest strictly ascending chain of concrete types (`byte < short < int`)
const HEIGHT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Stop at the first violated constraint
    CheckOnly,
    /// Widen or narrow locals to satisfy constraints where possible
    CheckAndFix,
}

/// A constraint the assignment does not satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub statement: usize,
    pub local: Option<LocalId>,
    pub found: TypeNode,
    pub required: TypeNode,
    /// Statement whose coercion of the same local made this one fail
    pub conflicting: Option<usize>,
}

impl Violation {
    pub fn describe(&self, body: &MethodBody) -> String {
        let subject = self.local.map_or_else(|| "operand".to_string(), |l| body.local_name(l));
        format!(
            "statement {} (`{}`) requires {} but {subject} is {}",
            self.statement,
            body.display_stmt(self.statement),
            self.required,
            self.found
        )
    }

    pub fn into_fatal(self, body: &MethodBody) -> FatalTypeError {
        FatalTypeError {
            statement: self.statement,
            text: body.display_stmt(self.statement),
            local: self.local,
            local_name: self.local.map_or_else(|| "operand".to_string(), |l| body.local_name(l)),
            found: self.found,
            required: self.required,
            conflicting: self.conflicting.map(|index| (index, body.display_stmt(index))),
        }
    }
}

/// A local retyped by the fix-up pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coercion {
    pub statement: usize,
    pub local: LocalId,
    pub from: TypeNode,
    pub to: TypeNode,
}

impl fmt::Display for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "statement {}: {} {} -> {}",
            self.statement, self.local, self.from, self.to
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub sweeps: usize,
    pub coercions: Vec<Coercion>,
}

pub struct ConstraintChecker<'a> {
    constraints: &'a ConstraintSet,
    mode: CheckMode,
}

#[derive(Default)]
struct FixState {
    /// Last statement that retyped each local
    coerced_by: HashMap<LocalId, usize>,
    narrowed: HashSet<LocalId>,
    coercions: Vec<Coercion>,
}

impl<'a> ConstraintChecker<'a> {
    pub fn new(constraints: &'a ConstraintSet, mode: CheckMode) -> Self {
        Self { constraints, mode }
    }

    /// Check every statement in order.
    ///
    /// In fix mode the statements are swept until a sweep changes nothing;
    /// the assignment is updated in place and the coercions are reported.
    pub fn check(&self, assignment: &mut Assignment) -> Result<CheckReport, Violation> {
        let mut state = FixState::default();
        let fix = self.mode == CheckMode::CheckAndFix;
        let limit = 1 + assignment.len() * 2 * (HEIGHT + 1);
        let mut report = CheckReport::default();

        for _ in 0..limit {
            report.sweeps += 1;
            if !self.sweep(assignment, fix, &mut state)? {
                report.coercions = state.coercions;
                return Ok(report);
            }
        }
        // Widening and narrowing are bounded, so this only reports what is
        // still violated
        report.sweeps += 1;
        self.sweep(assignment, false, &mut state)?;
        report.coercions = state.coercions;
        Ok(report)
    }

    fn sweep(&self, assignment: &mut Assignment, fix: bool, state: &mut FixState) -> Result<bool, Violation> {
        let mut changed = false;
        for index in 0..self.constraints.len() {
            let list = self.constraints.statement(index);
            let mut scratch: SmallVec<[(u8, Term); 2]> = SmallVec::new();
            for constraint in list {
                match (constraint.sub, constraint.sup) {
                    // Covered by the common type of the operands
                    (Term::Scratch(_), _) => {}
                    (operand, Term::Scratch(n)) => match scratch.iter().find(|(k, _)| *k == n) {
                        Some(&(_, first)) => {
                            changed |= self.check_shared(assignment, index, (first, operand), fix, state)?;
                        }
                        None => scratch.push((n, operand)),
                    },
                    _ => changed |= self.check_one(assignment, index, constraint, fix, state)?,
                }
            }
        }
        Ok(changed)
    }

    fn check_one(
        &self,
        assignment: &mut Assignment,
        index: usize,
        constraint: &Constraint,
        fix: bool,
        state: &mut FixState,
    ) -> Result<bool, Violation> {
        let sub = eval(assignment, constraint.sub);
        let sup = eval(assignment, constraint.sup);
        if sub.leq(sup) {
            return Ok(false);
        }

        if fix {
            match (constraint.sub, constraint.sup) {
                // `local` already gave way to an upper bound, so the value
                // flowing into it follows instead of widening it back
                (Term::Local(from), Term::Local(local))
                    if state.narrowed.contains(&local) && !state.narrowed.contains(&from) && sup.is_concrete() =>
                {
                    state.narrowed.insert(from);
                    coerce(assignment, state, index, from, sup);
                    return Ok(true);
                }
                (_, Term::Local(local)) => {
                    if let Some(widened) = widen(sub, sup) {
                        coerce(assignment, state, index, local, widened);
                        return Ok(true);
                    }
                    if let Term::Local(from) = constraint.sub {
                        if sub == TypeNode::Boolean && sup.is_concrete() && !state.narrowed.contains(&from) {
                            coerce(assignment, state, index, from, sup);
                            return Ok(true);
                        }
                    }
                }
                (Term::Local(local), Term::Node(target))
                    if target.is_concrete() && !state.narrowed.contains(&local) =>
                {
                    state.narrowed.insert(local);
                    coerce(assignment, state, index, local, target);
                    return Ok(true);
                }
                _ => {}
            }
        }

        let (local, found, required) = match (constraint.sub, constraint.sup) {
            (_, Term::Local(local)) => (Some(local), sup, sub),
            (sub_term, _) => (local_of(sub_term), sub, sup),
        };
        Err(Violation {
            statement: index,
            local,
            found,
            required,
            conflicting: local.and_then(|l| state.coerced_by.get(&l).copied()),
        })
    }

    /// The two operands of an equality need a common type.
    ///
    /// In fix mode a boolean operand compared against a number is retyped
    /// to that number.
    fn check_shared(
        &self,
        assignment: &mut Assignment,
        index: usize,
        (first, second): (Term, Term),
        fix: bool,
        state: &mut FixState,
    ) -> Result<bool, Violation> {
        let (lhs, rhs) = (eval(assignment, first), eval(assignment, second));
        if lhs.join(rhs) != TypeNode::Top {
            return Ok(false);
        }

        if fix {
            for (term, value, other) in [(first, lhs, rhs), (second, rhs, lhs)] {
                if let Term::Local(local) = term {
                    if value == TypeNode::Boolean && other.is_concrete() && !state.narrowed.contains(&local) {
                        coerce(assignment, state, index, local, other);
                        return Ok(true);
                    }
                }
            }
        }

        let local = local_of(second);
        Err(Violation {
            statement: index,
            local,
            found: rhs,
            required: lhs,
            conflicting: local.and_then(|l| state.coerced_by.get(&l).copied()),
        })
    }
}

/// Smallest concrete type above both `sub` and the current type of a local.
/// A boolean local receiving a number becomes that number.
fn widen(sub: TypeNode, current: TypeNode) -> Option<TypeNode> {
    let joined = sub.join(current);
    if joined.is_concrete() {
        Some(joined)
    } else if current == TypeNode::Boolean {
        Some(sub).filter(|node| node.is_concrete()).or_else(|| sub.range_default())
    } else {
        None
    }
}

fn eval(assignment: &Assignment, term: Term) -> TypeNode {
    match term {
        Term::Local(local) => assignment.get(&local).copied().unwrap_or(TypeNode::Top),
        Term::Node(node) => node,
        Term::Scratch(_) => TypeNode::Top,
    }
}

fn local_of(term: Term) -> Option<LocalId> {
    match term {
        Term::Local(local) => Some(local),
        _ => None,
    }
}

fn coerce(assignment: &mut Assignment, state: &mut FixState, statement: usize, local: LocalId, to: TypeNode) {
    let from = assignment.insert(local, to).unwrap_or(TypeNode::Top);
    state.coerced_by.insert(local, statement);
    state.coercions.push(Coercion {
        statement,
        local,
        from,
        to,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CmpOp, FieldRef, Stmt, Type};

    fn assignment(pairs: &[(LocalId, TypeNode)]) -> Assignment {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_check_only_accepts_valid_assignment() {
        let mut body = MethodBody::new("m", Type::Void);
        let x = body.add_local("x", Type::Int);
        body.push(Stmt::assign(x, 1));
        body.push(Stmt::compare(CmpOp::Ne, x, 0));
        let set = ConstraintSet::derive(&body).unwrap();
        let mut types = assignment(&[(x, TypeNode::Boolean)]);
        let report = ConstraintChecker::new(&set, CheckMode::CheckOnly).check(&mut types).unwrap();
        assert_eq!(report.sweeps, 1);
        assert!(report.coercions.is_empty());
    }

    #[test]
    fn test_check_only_reports_first_violation() {
        let mut body = MethodBody::new("m", Type::Void);
        let x = body.add_local("x", Type::Int);
        body.push(Stmt::assign(x, 300));
        let set = ConstraintSet::derive(&body).unwrap();
        let mut types = assignment(&[(x, TypeNode::Byte)]);
        let violation = ConstraintChecker::new(&set, CheckMode::CheckOnly)
            .check(&mut types)
            .unwrap_err();
        assert_eq!(
            violation,
            Violation {
                statement: 0,
                local: Some(x),
                found: TypeNode::Byte,
                required: TypeNode::R0_32767,
                conflicting: None,
            }
        );
        assert_eq!(violation.describe(&body), "statement 0 (`x = 300`) requires [0..32767] but x is byte");
        assert_eq!(types[&x], TypeNode::Byte);
    }

    #[test]
    fn test_fix_widens_destination() {
        let mut body = MethodBody::new("m", Type::Void);
        let x = body.add_local("x", Type::Int);
        body.push(Stmt::assign(x, 300));
        let set = ConstraintSet::derive(&body).unwrap();
        let mut types = assignment(&[(x, TypeNode::Byte)]);
        let report = ConstraintChecker::new(&set, CheckMode::CheckAndFix)
            .check(&mut types)
            .unwrap();
        assert_eq!(types[&x], TypeNode::Short);
        assert_eq!(
            report.coercions,
            vec![Coercion {
                statement: 0,
                local: x,
                from: TypeNode::Byte,
                to: TypeNode::Short
            }]
        );
        assert_eq!(report.sweeps, 2);
        assert_eq!(report.coercions[0].to_string(), "statement 0: l0 byte -> short");
    }

    #[test]
    fn test_second_narrowing_is_fatal_and_names_the_first() {
        let mut body = MethodBody::new("m", Type::Void);
        let x = body.add_local("x", Type::Int);
        body.push(Stmt::assign(x, 5));
        body.push(Stmt::static_store(FieldRef::new("A", "c", Type::Char), x));
        body.push(Stmt::static_store(FieldRef::new("A", "s", Type::Short), x));
        let set = ConstraintSet::derive(&body).unwrap();
        let mut types = assignment(&[(x, TypeNode::Byte)]);
        let violation = ConstraintChecker::new(&set, CheckMode::CheckAndFix)
            .check(&mut types)
            .unwrap_err();
        assert_eq!(violation.statement, 2);
        assert_eq!(violation.conflicting, Some(1));
        assert_eq!((violation.found, violation.required), (TypeNode::Char, TypeNode::Short));

        let fatal = violation.into_fatal(&body);
        assert_eq!(fatal.conflicting, Some((1, "A.c = x".to_string())));
    }

    #[test]
    fn test_equality_retypes_boolean_operand() {
        let mut body = MethodBody::new("m", Type::Void);
        let x = body.add_local("x", Type::Int);
        let y = body.add_local("y", Type::Int);
        body.push(Stmt::compare(CmpOp::Eq, x, y));
        let set = ConstraintSet::derive(&body).unwrap();

        let mut types = assignment(&[(x, TypeNode::Short), (y, TypeNode::Char)]);
        assert!(ConstraintChecker::new(&set, CheckMode::CheckOnly)
            .check(&mut types)
            .is_ok());

        let mut types = assignment(&[(x, TypeNode::Boolean), (y, TypeNode::Int)]);
        let violation = ConstraintChecker::new(&set, CheckMode::CheckOnly)
            .check(&mut types)
            .unwrap_err();
        assert_eq!(violation.local, Some(y));
        assert_eq!((violation.found, violation.required), (TypeNode::Int, TypeNode::Boolean));

        let report = ConstraintChecker::new(&set, CheckMode::CheckAndFix)
            .check(&mut types)
            .unwrap();
        assert_eq!(types[&x], TypeNode::Int);
        assert_eq!(
            report.coercions,
            vec![Coercion {
                statement: 0,
                local: x,
                from: TypeNode::Boolean,
                to: TypeNode::Int
            }]
        );
    }

    #[test]
    fn test_equality_with_pinned_boolean_is_fatal() {
        let mut body = MethodBody::new("m", Type::Void);
        let x = body.add_local("x", Type::Int);
        let y = body.add_local("y", Type::Int);
        body.push(Stmt::static_store(FieldRef::new("A", "z", Type::Boolean), x));
        body.push(Stmt::assign(y, 300));
        body.push(Stmt::compare(CmpOp::Eq, x, y));
        let set = ConstraintSet::derive(&body).unwrap();

        let mut types = assignment(&[(x, TypeNode::Boolean), (y, TypeNode::Short)]);
        let violation = ConstraintChecker::new(&set, CheckMode::CheckAndFix)
            .check(&mut types)
            .unwrap_err();
        assert_eq!(violation.statement, 2);
        assert_eq!(violation.local, Some(y));
        assert_eq!((violation.found, violation.required), (TypeNode::Short, TypeNode::Boolean));
    }

    #[test]
    fn test_fix_widens_boolean_receiving_a_number() {
        let mut body = MethodBody::new("m", Type::Void);
        let x = body.add_local("x", Type::Int);
        body.push(Stmt::assign(x, 1));
        body.push(Stmt::assign(x, 100));
        let set = ConstraintSet::derive(&body).unwrap();

        let mut types = assignment(&[(x, TypeNode::Boolean)]);
        ConstraintChecker::new(&set, CheckMode::CheckAndFix)
            .check(&mut types)
            .unwrap();
        assert_eq!(types[&x], TypeNode::Byte);
    }

    #[test]
    fn test_narrowed_local_narrows_its_source() {
        let mut body = MethodBody::new("m", Type::Void);
        let a = body.add_local("a", Type::Int);
        let b = body.add_local("b", Type::Int);
        body.push(Stmt::assign(a, b));
        body.push(Stmt::assign(b, a));
        body.push(Stmt::static_store(FieldRef::new("A", "s", Type::Short), a));
        let set = ConstraintSet::derive(&body).unwrap();

        let mut types = assignment(&[(a, TypeNode::Int), (b, TypeNode::Int)]);
        let report = ConstraintChecker::new(&set, CheckMode::CheckAndFix)
            .check(&mut types)
            .unwrap();
        assert_eq!(types[&a], TypeNode::Short);
        assert_eq!(types[&b], TypeNode::Short);
        assert_eq!(
            report.coercions,
            vec![
                Coercion {
                    statement: 2,
                    local: a,
                    from: TypeNode::Int,
                    to: TypeNode::Short
                },
                Coercion {
                    statement: 0,
                    local: b,
                    from: TypeNode::Int,
                    to: TypeNode::Short
                },
            ]
        );
    }
}
