//! Type lattice for integer sub-type resolution
//!
//! Nine fixed nodes ordered by "values of the lower type are assignable to
//! the higher type":
//!
//! ```text
//!                    TOP
//!                 /       \
//!              INT       BOOLEAN
//!            /  |   \        |
//!        SHORT CHAR  |       |
//!          |  \  |   |       |
//!        BYTE  R0_32767      |
//!           \    |           |
//!            R0_127          |
//!                \          /
//!                   R0_1
//! ```
//!
//! The three `R0_*` nodes are literal-range markers: a value known to lie in
//! `[0, 1]`, `[0, 127]` or `[0, 32767]`. They order like types but are never
//! assigned to a local directly.

use crate::ir::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of the integer type lattice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeNode {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Top,
    R0_1,
    R0_127,
    R0_32767,
}

/// `ANCESTORS[a]` has bit `b` set when `a < b` (strictly)
const ANCESTORS: [u16; 9] = {
    const fn bits(nodes: &[TypeNode]) -> u16 {
        let mut mask = 0;
        let mut i = 0;
        while i < nodes.len() {
            mask |= 1 << nodes[i] as u16;
            i += 1;
        }
        mask
    }
    use TypeNode::*;
    [
        bits(&[Top]),
        bits(&[Short, Int, Top]),
        bits(&[Int, Top]),
        bits(&[Int, Top]),
        bits(&[Top]),
        bits(&[]),
        bits(&[Boolean, Byte, Short, Char, Int, Top, R0_127, R0_32767]),
        bits(&[Byte, Short, Char, Int, Top, R0_32767]),
        bits(&[Short, Char, Int, Top]),
    ]
};

impl TypeNode {
    pub const ALL: [TypeNode; 9] = [
        TypeNode::Boolean,
        TypeNode::Byte,
        TypeNode::Short,
        TypeNode::Char,
        TypeNode::Int,
        TypeNode::Top,
        TypeNode::R0_1,
        TypeNode::R0_127,
        TypeNode::R0_32767,
    ];

    /// Partial order: `self ≤ other`
    pub fn leq(self, other: TypeNode) -> bool {
        self == other || ANCESTORS[self as usize] & (1 << other as u16) != 0
    }

    /// Least upper bound; `Top` when the two share no informative bound
    pub fn join(self, other: TypeNode) -> TypeNode {
        let upper: Vec<TypeNode> = Self::ALL
            .into_iter()
            .filter(|c| self.leq(*c) && other.leq(*c))
            .collect();
        upper
            .iter()
            .copied()
            .find(|c| upper.iter().all(|u| c.leq(*u)))
            .unwrap_or(TypeNode::Top)
    }

    /// Greatest lower bound
    pub fn meet(self, other: TypeNode) -> TypeNode {
        let lower: Vec<TypeNode> = Self::ALL
            .into_iter()
            .filter(|c| c.leq(self) && c.leq(other))
            .collect();
        lower
            .iter()
            .copied()
            .find(|c| lower.iter().all(|l| l.leq(*c)))
            .unwrap_or(TypeNode::Top)
    }

    /// The five nodes that name a real primitive type
    pub fn is_concrete(self) -> bool {
        matches!(
            self,
            TypeNode::Boolean | TypeNode::Byte | TypeNode::Short | TypeNode::Char | TypeNode::Int
        )
    }

    pub fn is_range_marker(self) -> bool {
        matches!(self, TypeNode::R0_1 | TypeNode::R0_127 | TypeNode::R0_32767)
    }

    /// The declared type this node stands for, if it is concrete
    pub fn concrete_type(self) -> Option<Type> {
        match self {
            TypeNode::Boolean => Some(Type::Boolean),
            TypeNode::Byte => Some(Type::Byte),
            TypeNode::Short => Some(Type::Short),
            TypeNode::Char => Some(Type::Char),
            TypeNode::Int => Some(Type::Int),
            _ => None,
        }
    }

    pub fn from_type(ty: &Type) -> Option<TypeNode> {
        match ty {
            Type::Boolean => Some(TypeNode::Boolean),
            Type::Byte => Some(TypeNode::Byte),
            Type::Short => Some(TypeNode::Short),
            Type::Char => Some(TypeNode::Char),
            Type::Int => Some(TypeNode::Int),
            _ => None,
        }
    }

    /// Tightest node describing an `int` literal
    pub fn of_literal(value: i32) -> TypeNode {
        match value {
            i32::MIN..=-32769 => TypeNode::Int,
            -32768..=-129 => TypeNode::Short,
            -128..=-1 => TypeNode::Byte,
            0..=1 => TypeNode::R0_1,
            2..=127 => TypeNode::R0_127,
            128..=32767 => TypeNode::R0_32767,
            32768..=65535 => TypeNode::Char,
            _ => TypeNode::Int,
        }
    }

    /// Concrete type a range marker settles on when nothing else decides
    pub fn range_default(self) -> Option<TypeNode> {
        match self {
            TypeNode::R0_1 => Some(TypeNode::Boolean),
            TypeNode::R0_127 => Some(TypeNode::Byte),
            TypeNode::R0_32767 => Some(TypeNode::Short),
            _ => None,
        }
    }
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TypeNode::Boolean => "boolean",
            TypeNode::Byte => "byte",
            TypeNode::Short => "short",
            TypeNode::Char => "char",
            TypeNode::Int => "int",
            TypeNode::Top => "top",
            TypeNode::R0_1 => "[0..1]",
            TypeNode::R0_127 => "[0..127]",
            TypeNode::R0_32767 => "[0..32767]",
        };
        f.write_str(text)
    }
}

/// Render the order and the join/meet tables, one row per node
pub fn render_tables() -> String {
    let mut out = String::new();
    let width = 11;
    for (title, op) in [
        ("join", TypeNode::join as fn(TypeNode, TypeNode) -> TypeNode),
        ("meet", TypeNode::meet),
    ] {
        out.push_str(&format!("{title:<width$}"));
        for column in TypeNode::ALL {
            out.push_str(&format!("{:<width$}", column.to_string()));
        }
        out.push('\n');
        for row in TypeNode::ALL {
            out.push_str(&format!("{:<width$}", row.to_string()));
            for column in TypeNode::ALL {
                out.push_str(&format!("{:<width$}", op(row, column).to_string()));
            }
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str("order\n");
    for node in TypeNode::ALL {
        let above: Vec<String> = TypeNode::ALL
            .into_iter()
            .filter(|other| *other != node && node.leq(*other))
            .map(|other| other.to_string())
            .collect();
        out.push_str(&format!("{node} < {}\n", above.join(", ")).replace(" < \n", "\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use TypeNode::*;

    fn any_node() -> impl Strategy<Value = TypeNode> {
        prop::sample::select(TypeNode::ALL.to_vec())
    }

    #[test]
    fn test_join_of_integer_types() {
        assert_eq!(Byte.join(Char), Int);
        assert_eq!(Byte.join(Short), Short);
        assert_eq!(Short.join(Char), Int);
        assert_eq!(Boolean.join(Byte), Top);
        assert_eq!(Boolean.join(Int), Top);
    }

    #[test]
    fn test_join_with_range_markers() {
        assert_eq!(R0_1.join(Boolean), Boolean);
        assert_eq!(R0_127.join(Char), Char);
        assert_eq!(R0_32767.join(Byte), Short);
        assert_eq!(R0_1.join(R0_127), R0_127);
        assert_eq!(R0_127.join(Boolean), Top);
    }

    #[test]
    fn test_meet_of_integer_types() {
        assert_eq!(Short.meet(Char), R0_32767);
        assert_eq!(Byte.meet(Char), R0_127);
        assert_eq!(Boolean.meet(Byte), R0_1);
        assert_eq!(Int.meet(Short), Short);
        assert_eq!(Top.meet(Char), Char);
    }

    #[test]
    fn test_top_absorbs_join() {
        for node in TypeNode::ALL {
            assert_eq!(node.join(Top), Top);
            assert_eq!(node.meet(Top), node);
        }
    }

    #[test]
    fn test_literal_nodes() {
        assert_eq!(TypeNode::of_literal(0), R0_1);
        assert_eq!(TypeNode::of_literal(1), R0_1);
        assert_eq!(TypeNode::of_literal(2), R0_127);
        assert_eq!(TypeNode::of_literal(127), R0_127);
        assert_eq!(TypeNode::of_literal(128), R0_32767);
        assert_eq!(TypeNode::of_literal(32767), R0_32767);
        assert_eq!(TypeNode::of_literal(32768), Char);
        assert_eq!(TypeNode::of_literal(65535), Char);
        assert_eq!(TypeNode::of_literal(65536), Int);
        assert_eq!(TypeNode::of_literal(-1), Byte);
        assert_eq!(TypeNode::of_literal(-128), Byte);
        assert_eq!(TypeNode::of_literal(-129), Short);
        assert_eq!(TypeNode::of_literal(-32768), Short);
        assert_eq!(TypeNode::of_literal(-32769), Int);
    }

    #[test]
    fn test_concrete_round_trip_through_type() {
        for node in TypeNode::ALL {
            match node.concrete_type() {
                Some(ty) => assert_eq!(TypeNode::from_type(&ty), Some(node)),
                None => assert!(!node.is_concrete()),
            }
        }
    }

    #[test]
    fn test_render_tables_lists_order() {
        let rendered = render_tables();
        assert!(rendered.contains("top\n"));
        assert!(rendered.contains("byte < short, int, top\n"));
        assert!(rendered.starts_with("join"));
    }

    proptest! {
        #[test]
        fn prop_join_is_upper_bound(a in any_node(), b in any_node()) {
            let j = a.join(b);
            prop_assert!(a.leq(j) && b.leq(j));
        }

        #[test]
        fn prop_meet_is_lower_bound(a in any_node(), b in any_node()) {
            let m = a.meet(b);
            prop_assert!(m.leq(a) && m.leq(b));
        }

        #[test]
        fn prop_join_meet_commutative_idempotent(a in any_node(), b in any_node()) {
            prop_assert_eq!(a.join(b), b.join(a));
            prop_assert_eq!(a.meet(b), b.meet(a));
            prop_assert_eq!(a.join(a), a);
            prop_assert_eq!(a.meet(a), a);
        }

        #[test]
        fn prop_join_associative(a in any_node(), b in any_node(), c in any_node()) {
            prop_assert_eq!(a.join(b).join(c), a.join(b.join(c)));
            prop_assert_eq!(a.meet(b).meet(c), a.meet(b.meet(c)));
        }

        #[test]
        fn prop_order_is_antisymmetric(a in any_node(), b in any_node()) {
            if a.leq(b) && b.leq(a) {
                prop_assert_eq!(a, b);
            }
        }
    }
}
