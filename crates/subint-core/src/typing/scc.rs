//! Collapse constraint cycles into single variables
//!
//! `a ≤ b ≤ ... ≤ a` forces every member of the cycle to the same type, so
//! each strongly connected component is unioned into one representative.

use super::lattice::TypeNode;
use super::trace::{TraceEvent, TraceSink};
use super::variable::{TypeGraph, VarId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};

/// Outcome of one merge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Cycles collapsed into one variable
    pub merged: usize,
    /// Variables absorbed by a survivor
    pub absorbed: usize,
    /// Cycles left alone because their members already carry different types
    pub skipped: usize,
}

pub struct CycleMerger;

impl CycleMerger {
    /// Union every cycle of the graph.
    ///
    /// Components are processed in order of their smallest member. The
    /// survivor is the member with a resolved type, or the smallest id.
    pub fn merge<S: TraceSink>(graph: &mut TypeGraph, sink: &mut S) -> MergeStats {
        let mut stats = MergeStats::default();
        for members in Self::components(graph) {
            let types: BTreeSet<TypeNode> = members.iter().filter_map(|v| graph.resolved(*v)).collect();
            if types.len() > 1 {
                stats.skipped += 1;
                sink.record(TraceEvent::CycleSkipped {
                    members: members.len(),
                    types: types.into_iter().collect(),
                });
                continue;
            }

            let survivor = members
                .iter()
                .copied()
                .find(|v| graph.resolved(*v).is_some())
                .unwrap_or(members[0]);
            for member in &members {
                if *member != survivor {
                    graph.union(survivor, *member);
                    stats.absorbed += 1;
                }
            }
            stats.merged += 1;
            sink.record(TraceEvent::CycleMerged {
                survivor,
                members: members.len(),
            });
        }
        stats
    }

    /// Non-trivial strongly connected components, each sorted by id
    fn components(graph: &TypeGraph) -> Vec<Vec<VarId>> {
        let mut digraph: DiGraph<VarId, ()> = DiGraph::new();
        let mut index: HashMap<VarId, NodeIndex> = HashMap::new();
        for var in graph.representatives() {
            index.insert(var, digraph.add_node(var));
        }
        for (child, parent) in graph.edges() {
            digraph.add_edge(index[&child], index[&parent], ());
        }

        let mut components: Vec<Vec<VarId>> = tarjan_scc(&digraph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut members: Vec<VarId> = component.into_iter().map(|n| digraph[n]).collect();
                members.sort();
                members
            })
            .collect();
        components.sort();
        components
    }
}
