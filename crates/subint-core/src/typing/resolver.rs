//! Two-phase driver for one method body
//!
//! The optimistic pass collects the permissive constraint set, merges cycles
//! and simplifies the graph down to concrete types. If the checker rejects
//! the result, the graph is dropped and the fallback pass starts over with
//! the full constraint set, approximations only, and a checker allowed to
//! coerce locals. Local types are written to the body only on success.

use super::checker::{Assignment, CheckMode, Coercion, ConstraintChecker, Violation};
use super::collector::{CollectionMode, ConstraintCollector, ConstraintSet};
use super::lattice::TypeNode;
use super::scc::CycleMerger;
use super::simplifier::Simplifier;
use super::trace::{TraceEvent, TraceSink, TracingSink};
use super::variable::{TypeGraph, VarId};
use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result, RetryableInferenceFailure};
use crate::ir::{LocalId, MethodBody};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolverState {
    Unattempted,
    Phase1Running,
    Phase1Succeeded,
    Phase1Failed,
    Phase2Running,
    Phase2Succeeded,
    Fatal,
}

/// Which pass produced the types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Optimistic,
    Fallback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Optimistic => f.write_str("optimistic"),
            Phase::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalType {
    pub local: LocalId,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeNode,
}

/// Types chosen for the integer-family locals of one body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub method: String,
    pub phase: Phase,
    pub assignments: Vec<LocalType>,
    pub coercions: Vec<Coercion>,
    /// Why the optimistic pass was abandoned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryableInferenceFailure>,
}

impl Resolution {
    pub fn type_of(&self, local: LocalId) -> Option<TypeNode> {
        self.assignments.iter().find(|a| a.local == local).map(|a| a.ty)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.method, self.phase)?;
        for assignment in &self.assignments {
            write!(f, "\n  {}: {}", assignment.name, assignment.ty)?;
        }
        for coercion in &self.coercions {
            write!(f, "\n  coerced {coercion}")?;
        }
        if let Some(retry) = &self.retry {
            write!(f, "\n  retried: {retry}")?;
        }
        Ok(())
    }
}

/// Resolves integer local types of method bodies, one at a time.
///
/// Each call to [`IntegerTypeResolver::resolve`] builds and drops its own
/// graphs; only the trace sink and the last state outlive it.
pub struct IntegerTypeResolver<S: TraceSink = TracingSink> {
    config: ResolverConfig,
    sink: S,
    state: ResolverState,
}

impl IntegerTypeResolver<TracingSink> {
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_sink(config, TracingSink)
    }
}

impl Default for IntegerTypeResolver<TracingSink> {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl<S: TraceSink> IntegerTypeResolver<S> {
    pub fn with_sink(config: ResolverConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            state: ResolverState::Unattempted,
        }
    }

    /// State reached by the most recent resolution
    pub fn state(&self) -> ResolverState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn transition(&mut self, method: &str, to: ResolverState) {
        let from = self.state;
        self.state = to;
        self.sink.record(TraceEvent::StateChanged {
            method: method.to_string(),
            from,
            to,
        });
    }

    /// Type every integer-family local of `body`.
    ///
    /// On error the body is left exactly as it was.
    pub fn resolve(&mut self, body: &mut MethodBody) -> Result<Resolution> {
        self.state = ResolverState::Unattempted;
        let method = body.name.clone();
        let locals: Vec<LocalId> = body.integer_locals().collect();

        let constraints = match ConstraintSet::derive(body) {
            Ok(constraints) => constraints,
            Err(error) => {
                self.transition(&method, ResolverState::Fatal);
                return Err(ResolveError::Malformed { method, error });
            }
        };

        self.transition(&method, ResolverState::Phase1Running);
        let dump = self.config.dump_graph;
        let (_, optimistic) = solve_optimistic(body, &locals, &constraints, &mut self.sink, dump);
        let retry = match optimistic {
            Ok(assignment) => {
                self.transition(&method, ResolverState::Phase1Succeeded);
                return Ok(commit(body, Phase::Optimistic, assignment, Vec::new(), None));
            }
            Err(failure) => failure,
        };

        self.transition(&method, ResolverState::Phase1Failed);
        self.sink.record(TraceEvent::PhaseRejected {
            method: method.clone(),
            reason: retry.reason.clone(),
        });
        if !self.config.fallback {
            self.transition(&method, ResolverState::Fatal);
            return Err(ResolveError::Rejected { method, error: retry });
        }

        self.transition(&method, ResolverState::Phase2Running);
        match solve_fallback(&locals, &constraints) {
            Ok((assignment, coercions)) => {
                for coercion in &coercions {
                    self.sink.record(TraceEvent::Coerced(coercion.clone()));
                }
                self.transition(&method, ResolverState::Phase2Succeeded);
                Ok(commit(body, Phase::Fallback, assignment, coercions, Some(retry)))
            }
            Err(violation) => {
                self.transition(&method, ResolverState::Fatal);
                Err(ResolveError::Fatal {
                    method,
                    error: violation.into_fatal(body),
                })
            }
        }
    }
}

/// Resolve one body with the default configuration, tracing through `tracing`
pub fn resolve(body: &mut MethodBody) -> Result<Resolution> {
    IntegerTypeResolver::default().resolve(body)
}

fn commit(
    body: &mut MethodBody,
    phase: Phase,
    assignment: Assignment,
    coercions: Vec<Coercion>,
    retry: Option<RetryableInferenceFailure>,
) -> Resolution {
    let mut assignments = Vec::with_capacity(assignment.len());
    for (local, node) in assignment {
        if let Some(ty) = node.concrete_type() {
            body.set_local_type(local, ty);
        }
        assignments.push(LocalType {
            local,
            name: body.local_name(local),
            ty: node,
        });
    }
    Resolution {
        method: body.name.clone(),
        phase,
        assignments,
        coercions,
        retry,
    }
}

fn register_locals(graph: &mut TypeGraph, locals: &[LocalId]) {
    for local in locals {
        graph.local(*local);
    }
}

fn dump_graph<S: TraceSink>(sink: &mut S, enabled: bool, graph: &TypeGraph, label: &'static str) {
    if enabled && sink.wants_detail() {
        sink.record(TraceEvent::Graph {
            label,
            lines: graph.dump(),
        });
    }
}

/// Optimistic pass over a private graph.
///
/// The graph is returned alongside the outcome so its final edges can be
/// inspected; the resolver itself drops it.
pub fn solve_optimistic<S: TraceSink>(
    body: &MethodBody,
    locals: &[LocalId],
    constraints: &ConstraintSet,
    sink: &mut S,
    dump: bool,
) -> (TypeGraph, std::result::Result<Assignment, RetryableInferenceFailure>) {
    let mut graph = TypeGraph::new();
    register_locals(&mut graph, locals);
    ConstraintCollector::new(&mut graph, CollectionMode::Permissive).collect(constraints);
    dump_graph(sink, dump, &graph, "collection");

    graph.approximate();
    CycleMerger::merge(&mut graph, sink);
    dump_graph(sink, dump, &graph, "cycle merging");

    Simplifier::new(&mut graph, sink).run();
    dump_graph(sink, dump, &graph, "simplification");

    let mut assignment = Assignment::new();
    for local in locals {
        let var = graph.local(*local);
        match graph.resolved(var).filter(|node| node.is_concrete()) {
            Some(node) => {
                assignment.insert(*local, node);
            }
            None => {
                let failure = RetryableInferenceFailure {
                    statement: None,
                    reason: format!("{} has no concrete type", body.local_name(*local)),
                };
                return (graph, Err(failure));
            }
        }
    }

    let outcome = ConstraintChecker::new(constraints, CheckMode::CheckOnly)
        .check(&mut assignment)
        .map(|_| assignment)
        .map_err(|violation| RetryableInferenceFailure {
            statement: Some(violation.statement),
            reason: violation.describe(body),
        });
    (graph, outcome)
}

/// Fallback pass: approximations, defaulting, then check-and-fix
pub fn solve_fallback(
    locals: &[LocalId],
    constraints: &ConstraintSet,
) -> std::result::Result<(Assignment, Vec<Coercion>), Violation> {
    let mut graph = TypeGraph::new();
    register_locals(&mut graph, locals);
    ConstraintCollector::new(&mut graph, CollectionMode::Full).collect(constraints);
    graph.approximate();

    let mut assignment = Assignment::new();
    for local in locals {
        let var = graph.local(*local);
        assignment.insert(*local, fallback_type(&graph, var));
    }
    let report = ConstraintChecker::new(constraints, CheckMode::CheckAndFix).check(&mut assignment)?;
    Ok((assignment, report.coercions))
}

fn fallback_type(graph: &TypeGraph, var: VarId) -> TypeNode {
    let concrete = |node: Option<TypeNode>| node.filter(|n| n.is_concrete());
    concrete(graph.resolved(var))
        .or_else(|| concrete(graph.inv_approx(var)))
        .or_else(|| concrete(graph.approx(var)))
        .or_else(|| graph.approx(var).and_then(TypeNode::range_default))
        .unwrap_or(TypeNode::Int)
}
