//! Per-resolution diagnostics.
//!
//! The resolver never writes to a shared stream. Everything worth seeing is
//! handed to the [`TraceSink`] owned by that resolution, so bodies resolved
//! on different threads never interleave their output.

use super::checker::Coercion;
use super::lattice::TypeNode;
use super::resolver::ResolverState;
use super::variable::VarId;
use std::fmt;

/// Simplifier rule that fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    ChildJoin,
    SingleChild,
    ParentMeet,
    SingleParent,
    InverseApprox,
    ForwardApprox,
    RangeDefault,
    IntDefault,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rule::ChildJoin => "child-join",
            Rule::SingleChild => "single-child",
            Rule::ParentMeet => "parent-meet",
            Rule::SingleParent => "single-parent",
            Rule::InverseApprox => "inverse-approx",
            Rule::ForwardApprox => "forward-approx",
            Rule::RangeDefault => "range-default",
            Rule::IntDefault => "int-default",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    StateChanged {
        method: String,
        from: ResolverState,
        to: ResolverState,
    },
    CycleMerged {
        survivor: VarId,
        members: usize,
    },
    /// A cycle joining incompatible concrete types is left for the checker
    CycleSkipped {
        members: usize,
        types: Vec<TypeNode>,
    },
    RuleApplied {
        rule: Rule,
        var: VarId,
        into: VarId,
    },
    PhaseRejected {
        method: String,
        reason: String,
    },
    Coerced(Coercion),
    Graph {
        label: &'static str,
        lines: Vec<String>,
    },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::StateChanged { method, from, to } => write!(f, "[{method}] {from:?} -> {to:?}"),
            TraceEvent::CycleMerged { survivor, members } => write!(f, "merged cycle of {members} into {survivor}"),
            TraceEvent::CycleSkipped { members, types } => {
                let types: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                write!(f, "kept cycle of {members} joining {}", types.join(", "))
            }
            TraceEvent::RuleApplied { rule, var, into } => write!(f, "{rule}: {var} -> {into}"),
            TraceEvent::PhaseRejected { method, reason } => write!(f, "[{method}] optimistic pass rejected: {reason}"),
            TraceEvent::Coerced(coercion) => write!(f, "{coercion}"),
            TraceEvent::Graph { label, lines } => {
                write!(f, "graph after {label}:")?;
                for line in lines {
                    write!(f, "\n  {line}")?;
                }
                Ok(())
            }
        }
    }
}

/// Receiver of diagnostics for a single resolution
pub trait TraceSink {
    fn record(&mut self, event: TraceEvent);

    /// Skip building expensive events (graph dumps) nobody will look at
    fn wants_detail(&self) -> bool {
        true
    }
}

impl<S: TraceSink + ?Sized> TraceSink for &mut S {
    fn record(&mut self, event: TraceEvent) {
        (**self).record(event);
    }

    fn wants_detail(&self) -> bool {
        (**self).wants_detail()
    }
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&mut self, _event: TraceEvent) {}

    fn wants_detail(&self) -> bool {
        false
    }
}

/// Forwards events to the `tracing` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&mut self, event: TraceEvent) {
        match &event {
            TraceEvent::StateChanged { .. } | TraceEvent::PhaseRejected { .. } => tracing::debug!("{event}"),
            TraceEvent::CycleSkipped { .. } => tracing::debug!("{event}"),
            _ => tracing::trace!("{event}"),
        }
    }

    fn wants_detail(&self) -> bool {
        tracing::enabled!(tracing::Level::TRACE)
    }
}

/// Keeps every event, in order
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub events: Vec<TraceEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<ResolverState> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::RuleApplied { rule, .. } => Some(*rule),
                _ => None,
            })
            .collect()
    }
}

impl TraceSink for RecordingSink {
    fn record(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announce(mut sink: impl TraceSink) {
        sink.record(TraceEvent::StateChanged {
            method: "m".into(),
            from: ResolverState::Unattempted,
            to: ResolverState::Phase1Running,
        });
    }

    #[test]
    fn test_recording_sink_through_mutable_reference() {
        let mut sink = RecordingSink::new();
        announce(&mut sink);
        assert_eq!(sink.states(), vec![ResolverState::Phase1Running]);
        assert_eq!(sink.events[0].to_string(), "[m] Unattempted -> Phase1Running");
    }

    #[test]
    fn test_null_sink_declines_detail() {
        assert!(!NullSink.wants_detail());
        assert!(RecordingSink::new().wants_detail());
    }
}
