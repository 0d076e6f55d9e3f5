//! Fixed-point reduction of the constraint graph to concrete types
//!
//! Each pass walks the unsolved variables in id order and stops at the
//! first rule tier that merges something; the next pass starts over with
//! fresh approximations. Every productive pass removes at least one unsolved
//! variable, so the loop terminates.

use super::lattice::TypeNode;
use super::trace::{Rule, TraceEvent, TraceSink};
use super::variable::{TypeGraph, VarId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimplifyStats {
    pub passes: usize,
    /// Merges performed by the rules, not counting the final `int` default
    pub merged: usize,
    /// Variables nothing decided, sent to `int`
    pub defaulted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Children,
    Parents,
}

pub struct Simplifier<'a, S: TraceSink> {
    graph: &'a mut TypeGraph,
    sink: &'a mut S,
    stats: SimplifyStats,
}

impl<'a, S: TraceSink> Simplifier<'a, S> {
    pub fn new(graph: &'a mut TypeGraph, sink: &'a mut S) -> Self {
        Self {
            graph,
            sink,
            stats: SimplifyStats::default(),
        }
    }

    /// Run passes until one changes nothing, then default the rest to `int`
    pub fn run(mut self) -> SimplifyStats {
        loop {
            self.graph.compute_approximations();
            self.stats.passes += 1;
            if !self.pass() {
                break;
            }
        }

        let int = self.graph.node(TypeNode::Int);
        for var in self.graph.unsolved() {
            self.merge(Rule::IntDefault, int, var);
            self.stats.defaulted += 1;
        }
        self.stats
    }

    fn pass(&mut self) -> bool {
        self.collapse_all(Side::Children)
            || self.collapse_all(Side::Parents)
            || self.resolve_all(Rule::InverseApprox, |graph, var| {
                graph.inv_approx(var).filter(|node| node.is_concrete())
            })
            || self.resolve_all(Rule::ForwardApprox, |graph, var| {
                graph.approx(var).filter(|node| node.is_concrete())
            })
            || self.resolve_all(Rule::RangeDefault, |graph, var| {
                (graph.approx(var) == Some(TypeNode::R0_32767)).then_some(TypeNode::Short)
            })
            || self.resolve_all(Rule::RangeDefault, |graph, var| {
                (graph.approx(var) == Some(TypeNode::R0_127)).then_some(TypeNode::Byte)
            })
            || self.boolean_default()
    }

    /// Union `absorbed` into `survivor` and report it
    fn merge(&mut self, rule: Rule, survivor: VarId, absorbed: VarId) -> VarId {
        let var = self.graph.find(absorbed);
        let into = self.graph.union(survivor, absorbed);
        if rule != Rule::IntDefault {
            self.stats.merged += 1;
        }
        self.sink.record(TraceEvent::RuleApplied { rule, var, into });
        into
    }

    fn collapse_all(&mut self, side: Side) -> bool {
        let mut modified = false;
        for var in self.graph.unsolved() {
            let var = self.graph.find(var);
            if self.graph.resolved(var).is_some() {
                continue;
            }
            modified |= self.collapse(var, side);
        }
        modified
    }

    /// Replace all resolved neighbours on one side by their join (children)
    /// or meet (parents), then merge with a lone neighbour when it is
    /// unsolved or a concrete type
    fn collapse(&mut self, var: VarId, side: Side) -> bool {
        let neighbours = match side {
            Side::Children => {
                self.graph.fix_children(var);
                self.graph.children(var)
            }
            Side::Parents => {
                self.graph.fix_parents(var);
                self.graph.parents(var)
            }
        };
        let typed: Vec<(VarId, TypeNode)> = neighbours
            .iter()
            .filter_map(|n| self.graph.resolved(*n).map(|t| (*n, t)))
            .collect();
        let bound = typed.iter().map(|(_, t)| *t).reduce(|a, b| match side {
            Side::Children => a.join(b),
            Side::Parents => a.meet(b),
        });

        if let Some(bound) = bound {
            let node = self.graph.node(bound);
            for (neighbour, _) in &typed {
                match side {
                    Side::Children => self.graph.remove_child(var, *neighbour),
                    Side::Parents => self.graph.remove_parent(var, *neighbour),
                }
            }
            match side {
                Side::Children => self.graph.add_child(var, node),
                Side::Parents => self.graph.add_parent(var, node),
            }
            if typed.len() > 1 {
                let rule = match side {
                    Side::Children => Rule::ChildJoin,
                    Side::Parents => Rule::ParentMeet,
                };
                self.sink.record(TraceEvent::RuleApplied { rule, var, into: node });
            }
        }

        let var = self.graph.find(var);
        let remaining = match side {
            Side::Children => self.graph.children(var),
            Side::Parents => self.graph.parents(var),
        };
        if let [single] = remaining.as_slice() {
            let single = *single;
            if self.graph.resolved(single).map_or(true, TypeNode::is_concrete) {
                let rule = match side {
                    Side::Children => Rule::SingleChild,
                    Side::Parents => Rule::SingleParent,
                };
                self.merge(rule, single, var);
                return true;
            }
        }
        false
    }

    /// Send every unsolved variable `pick` names a type for to that type
    fn resolve_all<F>(&mut self, rule: Rule, pick: F) -> bool
    where
        F: Fn(&TypeGraph, VarId) -> Option<TypeNode>,
    {
        let mut modified = false;
        for var in self.graph.unsolved() {
            let var = self.graph.find(var);
            if self.graph.resolved(var).is_some() {
                continue;
            }
            if let Some(target) = pick(self.graph, var) {
                let node = self.graph.node(target);
                self.merge(rule, node, var);
                modified = true;
            }
        }
        modified
    }

    /// Only the direct parents of the `[0..1]` node are considered, not
    /// every variable whose approximation is `[0..1]`
    fn boolean_default(&mut self) -> bool {
        let marker = self.graph.node(TypeNode::R0_1);
        let parents = self.graph.parents(marker);
        let boolean = self.graph.node(TypeNode::Boolean);
        let mut modified = false;
        for var in parents {
            let var = self.graph.find(var);
            if self.graph.resolved(var).is_none() && self.graph.approx(var) == Some(TypeNode::R0_1) {
                self.merge(Rule::RangeDefault, boolean, var);
                modified = true;
            }
        }
        modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::LocalId;
    use crate::typing::trace::RecordingSink;

    fn run(graph: &mut TypeGraph) -> (SimplifyStats, RecordingSink) {
        let mut sink = RecordingSink::new();
        let stats = Simplifier::new(graph, &mut sink).run();
        (stats, sink)
    }

    #[test]
    fn test_single_concrete_child_is_merged() {
        let mut graph = TypeGraph::new();
        let x = graph.local(LocalId(0));
        let byte = graph.node(TypeNode::Byte);
        graph.add_child(x, byte);
        let (stats, sink) = run(&mut graph);
        assert_eq!(graph.resolved(x), Some(TypeNode::Byte));
        assert_eq!(sink.rules(), vec![Rule::SingleChild]);
        assert_eq!(stats.merged, 1);
    }

    #[test]
    fn test_children_collapse_to_their_join() {
        let mut graph = TypeGraph::new();
        let x = graph.local(LocalId(0));
        let byte = graph.node(TypeNode::Byte);
        let char_ = graph.node(TypeNode::Char);
        graph.add_child(x, byte);
        graph.add_child(x, char_);
        let (_, sink) = run(&mut graph);
        assert_eq!(graph.resolved(x), Some(TypeNode::Int));
        assert_eq!(sink.rules(), vec![Rule::ChildJoin, Rule::SingleChild]);
    }

    #[test]
    fn test_parent_meet_then_byte_default() {
        let mut graph = TypeGraph::new();
        let x = graph.local(LocalId(0));
        let r127 = graph.node(TypeNode::R0_127);
        let short = graph.node(TypeNode::Short);
        let char_ = graph.node(TypeNode::Char);
        graph.add_child(x, r127);
        graph.add_parent(x, short);
        graph.add_parent(x, char_);
        let (_, sink) = run(&mut graph);
        assert_eq!(graph.resolved(x), Some(TypeNode::Byte));
        assert_eq!(sink.rules(), vec![Rule::ParentMeet, Rule::RangeDefault]);
    }

    #[test]
    fn test_short_default_for_wide_range() {
        let mut graph = TypeGraph::new();
        let x = graph.local(LocalId(0));
        let y = graph.local(LocalId(1));
        let r32767 = graph.node(TypeNode::R0_32767);
        let r127 = graph.node(TypeNode::R0_127);
        graph.add_child(x, r32767);
        graph.add_child(x, y);
        graph.add_child(y, r127);
        let (_, sink) = run(&mut graph);
        assert_eq!(graph.resolved(x), Some(TypeNode::Short));
        assert_eq!(graph.find(y), graph.find(x));
        assert_eq!(sink.rules(), vec![Rule::SingleParent, Rule::ChildJoin, Rule::RangeDefault]);
    }

    #[test]
    fn test_unconstrained_variable_defaults_to_int() {
        let mut graph = TypeGraph::new();
        let x = graph.local(LocalId(0));
        let (stats, sink) = run(&mut graph);
        assert_eq!(graph.resolved(x), Some(TypeNode::Int));
        assert_eq!(stats.defaulted, 1);
        assert_eq!(sink.rules(), vec![Rule::IntDefault]);
        assert!(graph.unsolved().is_empty());
    }

    /// `y` and `w` also approximate to `[0..1]` but are not parents of the
    /// marker, so the boolean default skips them; they only become boolean
    /// once their children have.
    #[test]
    fn test_boolean_default_only_considers_direct_range_parents() {
        let mut graph = TypeGraph::new();
        let x = graph.local(LocalId(0));
        let z = graph.local(LocalId(1));
        let y = graph.local(LocalId(2));
        let w = graph.local(LocalId(3));
        let r01 = graph.node(TypeNode::R0_1);
        for var in [x, z] {
            graph.add_child(var, r01);
            graph.add_parent(var, y);
            graph.add_parent(var, w);
        }
        let (_, sink) = run(&mut graph);

        let defaulted: Vec<VarId> = sink
            .events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::RuleApplied {
                    rule: Rule::RangeDefault,
                    var,
                    ..
                } => Some(*var),
                _ => None,
            })
            .collect();
        assert_eq!(defaulted, vec![x, z]);
        assert_eq!(
            sink.rules(),
            vec![Rule::RangeDefault, Rule::RangeDefault, Rule::SingleChild, Rule::SingleChild]
        );
        for var in [x, y, z, w] {
            assert_eq!(graph.resolved(var), Some(TypeNode::Boolean));
        }
    }
}
