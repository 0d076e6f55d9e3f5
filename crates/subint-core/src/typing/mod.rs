//! Constraint-based integer sub-type resolution
//!
//! This module recovers precise `boolean`/`byte`/`short`/`char`/`int` types
//! for local slots the bytecode verifier treats as plain integers:
//! - Type lattice with literal-range markers
//! - Union-find constraint graph with cached approximations
//! - Constraint derivation shared by collection and checking
//! - Strongly-connected-component merging
//! - Fixed-point simplification rules
//! - Two-phase driver with check-and-fix fallback

mod checker;
mod collector;
mod lattice;
mod resolver;
mod scc;
mod simplifier;
pub mod trace;
mod variable;

pub use checker::{Assignment, CheckMode, CheckReport, Coercion, ConstraintChecker, Violation};
pub use collector::{CollectionMode, Constraint, ConstraintCollector, ConstraintSet, Term};
pub use lattice::{render_tables, TypeNode};
pub use resolver::{
    resolve, solve_fallback, solve_optimistic, IntegerTypeResolver, LocalType, Phase, Resolution, ResolverState,
};
pub use scc::{CycleMerger, MergeStats};
pub use simplifier::{Simplifier, SimplifyStats};
pub use trace::{NullSink, RecordingSink, Rule, TraceEvent, TraceSink, TracingSink};
pub use variable::{TypeGraph, TypeVariable, VarId, VarKey};
