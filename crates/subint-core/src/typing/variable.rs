//! Type variables and the constraint graph they form
//!
//! Every local slot and every lattice node owns one variable. An edge
//! `child -> parent` records that the child's value flows into the parent,
//! so a valid assignment needs `type(child) ≤ type(parent)`.
//!
//! Variables are merged with a union-find forest. Merging redirects edges
//! onto the surviving representative, but neighbours may still hold stale ids
//! until [`TypeGraph::fix_children`] / [`TypeGraph::fix_parents`] canonicalise
//! them, so readers always go through [`TypeGraph::find`].

use super::lattice::TypeNode;
use crate::ir::LocalId;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;

/// Identity of a type variable; ids grow monotonically and order all worklists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// What a registry entry is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKey {
    Local(LocalId),
    Node(TypeNode),
}

/// A node of the constraint graph
#[derive(Debug, Clone)]
pub struct TypeVariable {
    id: VarId,
    rep: VarId,
    resolved: Option<TypeNode>,
    parents: BTreeSet<VarId>,
    children: BTreeSet<VarId>,
    approx: Option<TypeNode>,
    inv_approx: Option<TypeNode>,
}

impl TypeVariable {
    fn new(id: VarId, resolved: Option<TypeNode>) -> Self {
        Self {
            id,
            rep: id,
            resolved,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            approx: resolved,
            inv_approx: resolved,
        }
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn resolved(&self) -> Option<TypeNode> {
        self.resolved
    }

    pub fn approx(&self) -> Option<TypeNode> {
        self.approx
    }

    pub fn inv_approx(&self) -> Option<TypeNode> {
        self.inv_approx
    }
}

impl fmt::Display for TypeVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |node: Option<TypeNode>| node.map_or_else(|| "-".to_string(), |n| n.to_string());
        let list = |set: &BTreeSet<VarId>| set.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
        write!(
            f,
            "{} type={} approx={} inv={} parents=[{}] children=[{}]",
            self.id,
            show(self.resolved),
            show(self.approx),
            show(self.inv_approx),
            list(&self.parents),
            list(&self.children)
        )
    }
}

/// Registry of type variables for one method body.
///
/// Created empty apart from the nine lattice-node variables, filled lazily by
/// the collector and dropped when resolution of the body ends.
#[derive(Debug, Clone)]
pub struct TypeGraph {
    vars: Vec<TypeVariable>,
    keys: IndexMap<VarKey, VarId>,
}

impl TypeGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            vars: Vec::new(),
            keys: IndexMap::new(),
        };
        for node in TypeNode::ALL {
            graph.node(node);
        }
        graph
    }

    fn push(&mut self, resolved: Option<TypeNode>) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(TypeVariable::new(id, resolved));
        id
    }

    /// Variable for a lattice node, created on first use
    pub fn node(&mut self, node: TypeNode) -> VarId {
        let id = match self.keys.get(&VarKey::Node(node)) {
            Some(id) => *id,
            None => {
                let id = self.push(Some(node));
                self.keys.insert(VarKey::Node(node), id);
                id
            }
        };
        self.find(id)
    }

    /// Variable for a local slot, created on first use
    pub fn local(&mut self, local: LocalId) -> VarId {
        let id = match self.keys.get(&VarKey::Local(local)) {
            Some(id) => *id,
            None => {
                let id = self.push(None);
                self.keys.insert(VarKey::Local(local), id);
                id
            }
        };
        self.find(id)
    }

    /// A variable with no key, for intermediate values
    pub fn fresh(&mut self) -> VarId {
        self.push(None)
    }

    /// Representative of a registered key without creating it
    pub fn lookup(&self, key: VarKey) -> Option<VarId> {
        self.keys.get(&key).map(|id| self.representative(*id))
    }

    /// Representative with path compression
    pub fn find(&mut self, id: VarId) -> VarId {
        let root = self.representative(id);
        let mut cursor = id;
        while cursor != root {
            let next = self.vars[cursor.index()].rep;
            self.vars[cursor.index()].rep = root;
            cursor = next;
        }
        root
    }

    /// Representative without mutating the forest
    pub fn representative(&self, id: VarId) -> VarId {
        let mut cursor = id;
        loop {
            let rep = self.vars[cursor.index()].rep;
            if rep == cursor {
                return cursor;
            }
            cursor = rep;
        }
    }

    pub fn var(&self, id: VarId) -> &TypeVariable {
        &self.vars[self.representative(id).index()]
    }

    pub fn resolved(&self, id: VarId) -> Option<TypeNode> {
        self.var(id).resolved
    }

    pub fn approx(&self, id: VarId) -> Option<TypeNode> {
        self.var(id).approx
    }

    pub fn inv_approx(&self, id: VarId) -> Option<TypeNode> {
        self.var(id).inv_approx
    }

    /// Current parents of `id`, canonicalised and in id order
    pub fn parents(&self, id: VarId) -> Vec<VarId> {
        self.canonical(&self.var(id).parents, self.representative(id))
    }

    /// Current children of `id`, canonicalised and in id order
    pub fn children(&self, id: VarId) -> Vec<VarId> {
        self.canonical(&self.var(id).children, self.representative(id))
    }

    fn canonical(&self, set: &BTreeSet<VarId>, own: VarId) -> Vec<VarId> {
        let set: BTreeSet<VarId> = set
            .iter()
            .map(|v| self.representative(*v))
            .filter(|v| *v != own)
            .collect();
        set.into_iter().collect()
    }

    /// Record `child -> var`
    pub fn add_child(&mut self, var: VarId, child: VarId) {
        let var = self.find(var);
        let child = self.find(child);
        if var == child {
            return;
        }
        self.vars[var.index()].children.insert(child);
        self.vars[child.index()].parents.insert(var);
    }

    /// Record `var -> parent`
    pub fn add_parent(&mut self, var: VarId, parent: VarId) {
        self.add_child(parent, var);
    }

    pub fn remove_child(&mut self, var: VarId, child: VarId) {
        let var = self.find(var);
        let child = self.find(child);
        self.vars[var.index()].children.remove(&child);
        self.vars[child.index()].parents.remove(&var);
    }

    pub fn remove_parent(&mut self, var: VarId, parent: VarId) {
        self.remove_child(parent, var);
    }

    /// Replace merged-away child ids with their representatives
    pub fn fix_children(&mut self, id: VarId) {
        let id = self.find(id);
        let fixed = self.canonical(&self.vars[id.index()].children, id);
        self.vars[id.index()].children = fixed.into_iter().collect();
    }

    /// Replace merged-away parent ids with their representatives
    pub fn fix_parents(&mut self, id: VarId) {
        let id = self.find(id);
        let fixed = self.canonical(&self.vars[id.index()].parents, id);
        self.vars[id.index()].parents = fixed.into_iter().collect();
    }

    /// Merge `absorbed` into `survivor` and return the surviving representative.
    ///
    /// Edges of both sides end up on the survivor without duplicates or
    /// self-loops, and cached approximations of the survivor and its
    /// neighbours are cleared. The survivor inherits the absorbed side's
    /// resolved type when it has none of its own; callers never merge two
    /// variables resolved to different nodes.
    pub fn union(&mut self, survivor: VarId, absorbed: VarId) -> VarId {
        let survivor = self.find(survivor);
        let absorbed = self.find(absorbed);
        if survivor == absorbed {
            return survivor;
        }

        let taken = &mut self.vars[absorbed.index()];
        let parents = std::mem::take(&mut taken.parents);
        let children = std::mem::take(&mut taken.children);
        let absorbed_type = taken.resolved;
        taken.rep = survivor;
        taken.approx = None;
        taken.inv_approx = None;

        debug_assert!(
            absorbed_type.is_none()
                || self.vars[survivor.index()].resolved.is_none()
                || self.vars[survivor.index()].resolved == absorbed_type,
            "merging variables resolved to different nodes"
        );
        if self.vars[survivor.index()].resolved.is_none() {
            self.vars[survivor.index()].resolved = absorbed_type;
        }

        for parent in parents {
            let parent = self.find(parent);
            self.vars[parent.index()].children.remove(&absorbed);
            if parent != survivor {
                self.vars[parent.index()].children.insert(survivor);
                self.vars[survivor.index()].parents.insert(parent);
            }
        }
        for child in children {
            let child = self.find(child);
            self.vars[child.index()].parents.remove(&absorbed);
            if child != survivor {
                self.vars[child.index()].parents.insert(survivor);
                self.vars[survivor.index()].children.insert(child);
            }
        }
        let own = &mut self.vars[survivor.index()];
        own.parents.remove(&absorbed);
        own.children.remove(&absorbed);
        own.parents.remove(&survivor);
        own.children.remove(&survivor);

        self.invalidate_around(survivor);
        survivor
    }

    fn invalidate_around(&mut self, id: VarId) {
        let mut touched = self.parents(id);
        touched.extend(self.children(id));
        touched.push(id);
        for var in touched {
            let entry = &mut self.vars[var.index()];
            entry.approx = entry.resolved;
            entry.inv_approx = entry.resolved;
        }
    }

    /// All current representatives in id order
    pub fn representatives(&self) -> Vec<VarId> {
        self.vars.iter().filter(|v| v.rep == v.id).map(|v| v.id).collect()
    }

    /// Representatives without a resolved type, in id order
    pub fn unsolved(&self) -> Vec<VarId> {
        self.vars
            .iter()
            .filter(|v| v.rep == v.id && v.resolved.is_none())
            .map(|v| v.id)
            .collect()
    }

    /// Representatives with a resolved type, in id order
    pub fn solved(&self) -> Vec<VarId> {
        self.vars
            .iter()
            .filter(|v| v.rep == v.id && v.resolved.is_some())
            .map(|v| v.id)
            .collect()
    }

    /// Every edge between representatives as `(child, parent)`, sorted
    pub fn edges(&self) -> Vec<(VarId, VarId)> {
        let mut edges = BTreeSet::new();
        for var in self.representatives() {
            for parent in self.parents(var) {
                edges.insert((var, parent));
            }
            for child in self.children(var) {
                edges.insert((child, var));
            }
        }
        edges.into_iter().collect()
    }

    /// Recompute `approx` and `inv_approx` for the whole graph from the
    /// resolved variables outwards
    pub fn compute_approximations(&mut self) {
        for var in &mut self.vars {
            var.approx = var.resolved;
            var.inv_approx = var.resolved;
        }
        let seeds: BTreeSet<VarId> = self.solved().into_iter().collect();
        self.compute_approx(seeds.clone());
        self.compute_inv_approx(seeds);
    }

    /// Propagate joins from children to parents until nothing changes.
    ///
    /// The worklist is drained in id order so the result never depends on
    /// container iteration order.
    pub fn compute_approx(&mut self, mut worklist: BTreeSet<VarId>) {
        while let Some(var) = worklist.pop_first() {
            let Some(value) = self.approx(var) else { continue };
            for parent in self.parents(var) {
                if self.resolved(parent).is_some() {
                    continue;
                }
                let current = self.vars[parent.index()].approx;
                let next = current.map_or(value, |c| c.join(value));
                if current != Some(next) {
                    self.vars[parent.index()].approx = Some(next);
                    worklist.insert(parent);
                }
            }
        }
    }

    /// Propagate meets from parents to children until nothing changes
    pub fn compute_inv_approx(&mut self, mut worklist: BTreeSet<VarId>) {
        while let Some(var) = worklist.pop_first() {
            let Some(value) = self.inv_approx(var) else { continue };
            for child in self.children(var) {
                if self.resolved(child).is_some() {
                    continue;
                }
                let current = self.vars[child.index()].inv_approx;
                let next = current.map_or(value, |c| c.meet(value));
                if current != Some(next) {
                    self.vars[child.index()].inv_approx = Some(next);
                    worklist.insert(child);
                }
            }
        }
    }

    /// Approximate every variable and send the ones nothing reaches to `INT`
    pub fn approximate(&mut self) -> usize {
        self.compute_approximations();
        let int = self.node(TypeNode::Int);
        let unreached: Vec<VarId> = self
            .unsolved()
            .into_iter()
            .filter(|v| self.approx(*v).is_none())
            .collect();
        for var in &unreached {
            self.union(int, *var);
        }
        if !unreached.is_empty() {
            self.compute_approximations();
        }
        unreached.len()
    }

    /// One line per representative, for trace dumps
    pub fn dump(&self) -> Vec<String> {
        self.representatives()
            .into_iter()
            .map(|id| {
                let var = self.var(id);
                let mut line = var.to_string();
                if let Some((key, _)) = self.keys.iter().find(|(_, v)| self.representative(**v) == id) {
                    let label = match key {
                        VarKey::Local(local) => format!(" ({local})"),
                        VarKey::Node(node) => format!(" ({node})"),
                    };
                    line.push_str(&label);
                }
                line
            })
            .collect()
    }
}

impl Default for TypeGraph {
    fn default() -> Self {
        Self::new()
    }
}
