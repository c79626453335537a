// citywalk/src/generators/mod.rs
//! Candidate sources: pluggable proposers of next-call candidates during
//! synthesis. Enumeration, random sampling, rule templates, and replay of
//! externally produced sequences all satisfy the same single-method
//! capability, so new strategies plug in without touching core invariants.

pub mod enumeration;
pub mod random;
pub mod replay;
pub mod rules;

pub use enumeration::EnumerationSource;
pub use random::RandomSource;
pub use replay::ReplaySource;
pub use rules::RulesSource;

use crate::catalog::{
    Catalog, LifecycleState, LiteralValue, OpCategory, OperationSpec, ParamKind, Precondition,
};
use crate::synthesis::Phase;
use crate::tracker::{ArgValue, HandleId, StateTracker};

/// One proposed call: an operation plus a full argument binding and a rank.
/// Higher rank is preferred; ranks only order proposals from the same source.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub op: String,
    pub args: Vec<ArgValue>,
    pub rank: f64,
}

/// Capability interface for next-call proposers.
///
/// Implementations may be stateful (cross-sequence diversity, replay cursors);
/// a stateful source shared across workers must serialize its own updates.
/// The synthesizer itself never shares one source between sequences.
pub trait CandidateSource {
    /// Ranked proposals appropriate to `phase` given the tracker's state.
    fn propose(
        &mut self,
        phase: Phase,
        tracker: &StateTracker,
        catalog: &Catalog,
    ) -> Vec<Proposal>;

    /// Feedback: the synthesizer committed this operation.
    fn accepted(&mut self, _op: &str) {}

    fn name(&self) -> &'static str;
}

/// Operation categories a phase admits.
pub fn phase_categories(phase: Phase) -> &'static [OpCategory] {
    match phase {
        Phase::Initialize => &[OpCategory::Allocate],
        Phase::Configure => &[OpCategory::Configure, OpCategory::Allocate],
        Phase::Operate => &[OpCategory::Operate, OpCategory::Duplicate, OpCategory::Allocate],
        Phase::Validate => &[OpCategory::Validate],
        Phase::Cleanup => &[OpCategory::Free],
    }
}

const ANY_LIVE: &[LifecycleState] = &[
    LifecycleState::Allocated,
    LifecycleState::Configured,
    LifecycleState::Attached,
    LifecycleState::Detached,
];

/// The state requirement an operation declares for one of its parameters.
fn required_states(spec: &OperationSpec, param: usize) -> &[LifecycleState] {
    for pre in &spec.pre {
        if let Precondition::InState { param: p, any_of } = pre {
            if *p == param {
                return any_of;
            }
        }
    }
    ANY_LIVE
}

/// Build a full argument binding for `spec` against the current state,
/// optionally pinning one parameter to a specific handle. Handle parameters
/// bind to tracked handles satisfying their declared state requirement,
/// avoiding reuse of one handle across parameters when alternatives exist.
/// Returns `None` if some handle parameter cannot be bound.
pub fn default_binding(
    spec: &OperationSpec,
    tracker: &StateTracker,
    pin: Option<(usize, HandleId)>,
) -> Option<Vec<ArgValue>> {
    let mut args = Vec::with_capacity(spec.params.len());
    let mut taken: Vec<HandleId> = Vec::new();

    for (i, param) in spec.params.iter().enumerate() {
        match param.kind {
            ParamKind::Primitive | ParamKind::Buffer => {
                let literal = param
                    .sample
                    .clone()
                    .unwrap_or(LiteralValue::Int(0));
                args.push(ArgValue::Literal(literal));
            }
            ParamKind::OwnedHandleOut => args.push(ArgValue::Out),
            ParamKind::OwnedHandleIn | ParamKind::BorrowedRef => {
                if let Some((pinned_param, handle)) = pin {
                    if pinned_param == i {
                        taken.push(handle);
                        args.push(ArgValue::Handle(handle));
                        continue;
                    }
                }
                let ty = param.ty.as_ref()?;
                let states = required_states(spec, i);
                let candidate = tracker
                    .handles_in_state(ty, states)
                    .find(|h| !taken.contains(&h.id))
                    .or_else(|| tracker.handles_in_state(ty, states).next())?;
                taken.push(candidate.id);
                args.push(ArgValue::Handle(candidate.id));
            }
        }
    }

    Some(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LibraryId;

    #[test]
    fn default_binding_prefers_distinct_handles() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let mut tracker = StateTracker::new();
        let create = catalog.lookup("cJSON_CreateObject").unwrap();
        let a = tracker.apply(create, &[]).unwrap().created[0];
        let b = tracker.apply(create, &[]).unwrap().created[0];

        let add = catalog.lookup("cJSON_AddItemToObject").unwrap();
        let args = default_binding(add, &tracker, None).unwrap();
        assert_eq!(args[0], ArgValue::Handle(a));
        assert_eq!(args[2], ArgValue::Handle(b));
        assert!(tracker.can_apply(add, &args).is_ok());
    }

    #[test]
    fn default_binding_fails_without_live_handles() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let tracker = StateTracker::new();
        let delete = catalog.lookup("cJSON_Delete").unwrap();
        assert!(default_binding(delete, &tracker, None).is_none());
    }

    #[test]
    fn pinned_parameter_is_respected() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let mut tracker = StateTracker::new();
        let create = catalog.lookup("cJSON_CreateObject").unwrap();
        let a = tracker.apply(create, &[]).unwrap().created[0];
        let _b = tracker.apply(create, &[]).unwrap().created[0];

        let delete = catalog.lookup("cJSON_Delete").unwrap();
        let args = default_binding(delete, &tracker, Some((0, a))).unwrap();
        assert_eq!(args, vec![ArgValue::Handle(a)]);
    }
}
