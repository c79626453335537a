// citywalk/src/synthesis/mod.rs
//! Sequence synthesizer: drives a candidate source and the state tracker to
//! assemble one complete, model-valid call sequence per request.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, LibraryId, OperationSpec, Postcondition, TypeTag};
use crate::constants::{
    DEFAULT_PHASE_BUDGET, DEFAULT_PROPOSAL_WIDTH, DEFAULT_STEP_BUDGET, DEFAULT_TIME_BUDGET_MS,
};
use crate::error::{Result, SynthError};
use crate::generators::CandidateSource;
use crate::tracker::{ArgValue, HandleId, Ownership, StateTracker};

/// Synthesis phases in their fixed order. Phase tags steer the candidate
/// sources; correctness rests on the tracker alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Initialize,
    Configure,
    Operate,
    Validate,
    Cleanup,
}

impl Phase {
    pub fn all() -> [Phase; 5] {
        [
            Phase::Initialize,
            Phase::Configure,
            Phase::Operate,
            Phase::Validate,
            Phase::Cleanup,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initialize => "initialize",
            Phase::Configure => "configure",
            Phase::Operate => "operate",
            Phase::Validate => "validate",
            Phase::Cleanup => "cleanup",
        }
    }
}

/// One call in a sequence with its bound arguments and committed effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    pub op: String,
    pub phase: Phase,
    pub args: Vec<ArgValue>,
    pub created: Vec<HandleId>,
    pub freed: Vec<HandleId>,
    pub critical: bool,
}

impl SequenceStep {
    /// A step as recorded by an external generator: effects unknown until
    /// replayed.
    pub fn recorded(op: &str, phase: Phase, args: Vec<ArgValue>) -> Self {
        Self {
            op: op.to_string(),
            phase,
            args,
            created: Vec::new(),
            freed: Vec::new(),
            critical: false,
        }
    }
}

/// An ordered list of steps under construction or evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSequence {
    pub library: LibraryId,
    pub steps: Vec<SequenceStep>,
}

impl CandidateSequence {
    pub fn new(library: LibraryId) -> Self {
        Self {
            library,
            steps: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Replay every step through a fresh tracker. Sequences produced by the
    /// synthesizer or repair engine replay without error by construction.
    pub fn replay(&self, catalog: &Catalog) -> Result<StateTracker> {
        let mut tracker = StateTracker::new();
        for step in &self.steps {
            let spec = catalog.lookup(&step.op)?;
            tracker.apply(spec, &step.args)?;
        }
        Ok(tracker)
    }

    /// Replay and additionally enforce the leak policy at sequence end.
    pub fn validate(&self, catalog: &Catalog, policy: LeakPolicy) -> Result<()> {
        let tracker = self.replay(catalog)?;
        if policy == LeakPolicy::Deny {
            let leaked = tracker.finalize();
            if !leaked.is_empty() {
                return Err(SynthError::InvalidTransition(format!(
                    "{} handle(s) still live at sequence end",
                    leaked.len()
                )));
            }
        }
        Ok(())
    }
}

/// Whether handles may intentionally be left live at sequence end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeakPolicy {
    Deny,
    Allow,
}

/// Budgets and policy for one synthesis run.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Maximum steps placed in a single phase.
    pub phase_budget: usize,
    /// Maximum steps in the whole sequence, cleanup included.
    pub step_budget: usize,
    /// Wall-clock guard for one run.
    pub time_budget: Duration,
    /// Proposals requested from the candidate source per step.
    pub proposal_width: usize,
    pub leak_policy: LeakPolicy,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            phase_budget: DEFAULT_PHASE_BUDGET,
            step_budget: DEFAULT_STEP_BUDGET,
            time_budget: Duration::from_millis(DEFAULT_TIME_BUDGET_MS),
            proposal_width: DEFAULT_PROPOSAL_WIDTH,
            leak_policy: LeakPolicy::Deny,
        }
    }
}

/// Produces one candidate sequence per request.
pub struct Synthesizer {
    config: SynthesisConfig,
}

impl Synthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    /// Build one complete sequence. Every returned sequence replays cleanly
    /// through a fresh tracker and satisfies the leak policy.
    pub fn synthesize(
        &self,
        catalog: &Catalog,
        source: &mut dyn CandidateSource,
    ) -> Result<CandidateSequence> {
        if catalog.is_empty() {
            return Err(SynthError::NoFeasibleOperation);
        }

        let start = Instant::now();
        let mut tracker = StateTracker::new();
        let mut sequence = CandidateSequence::new(catalog.library());
        let mut used_ops: HashSet<String> = HashSet::new();

        for phase in Phase::all() {
            let mut placed = 0;
            while placed < self.config.phase_budget
                && sequence.len() < self.config.step_budget
            {
                if start.elapsed() > self.config.time_budget {
                    return Err(SynthError::Exhausted);
                }

                let mut proposals = source.propose(phase, &tracker, catalog);
                proposals.truncate(self.config.proposal_width);

                // Feasibility filter, then rank with novelty as tiebreaker:
                // an operation not yet in the sequence wins over a repeat.
                // Under a no-leak policy, also reserve enough of the step
                // budget to free whatever would still be live afterwards.
                let reserve =
                    self.config.leak_policy == LeakPolicy::Deny && phase != Phase::Cleanup;
                let mut feasible: Vec<_> = proposals
                    .into_iter()
                    .filter(|p| {
                        let Ok(spec) = catalog.lookup(&p.op) else {
                            return false;
                        };
                        if tracker.can_apply(spec, &p.args).is_err() {
                            return false;
                        }
                        if reserve {
                            let projected = projected_live(&tracker, spec);
                            if sequence.len() + 1 + projected > self.config.step_budget {
                                return false;
                            }
                        }
                        true
                    })
                    .collect();
                if feasible.is_empty() {
                    break;
                }
                feasible.sort_by(|a, b| {
                    b.rank
                        .partial_cmp(&a.rank)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| used_ops.contains(&a.op).cmp(&used_ops.contains(&b.op)))
                });
                let pick = feasible.swap_remove(0);

                let spec = catalog.lookup(&pick.op)?;
                let effect = tracker.apply(spec, &pick.args)?;
                trace!(
                    "{}: placed {} in {} (+{} handles, -{})",
                    catalog.library(),
                    pick.op,
                    phase.as_str(),
                    effect.created.len(),
                    effect.freed.len()
                );
                source.accepted(&pick.op);
                used_ops.insert(pick.op.clone());
                sequence.steps.push(SequenceStep {
                    op: pick.op,
                    phase,
                    args: pick.args,
                    created: effect.created,
                    freed: effect.freed,
                    critical: spec.critical,
                });
                placed += 1;
            }

            if phase == Phase::Initialize && sequence.is_empty() {
                return Err(SynthError::NoFeasibleOperation);
            }
        }

        if self.config.leak_policy == LeakPolicy::Deny {
            self.drain_live_handles(catalog, &mut tracker, &mut sequence, start)?;
        }

        debug!(
            "synthesized {} sequence: {} steps via {}",
            catalog.library(),
            sequence.len(),
            source.name()
        );
        Ok(sequence)
    }

    /// Free everything still live after cleanup, in drain order. Attached
    /// handles are freed through their owner.
    fn drain_live_handles(
        &self,
        catalog: &Catalog,
        tracker: &mut StateTracker,
        sequence: &mut CandidateSequence,
        start: Instant,
    ) -> Result<()> {
        loop {
            if start.elapsed() > self.config.time_budget {
                return Err(SynthError::Exhausted);
            }
            let leaked = drain_order(catalog, tracker);
            if leaked.is_empty() {
                return Ok(());
            }

            let mut progressed = false;
            for (id, ty) in leaked {
                if sequence.len() >= self.config.step_budget {
                    return Err(SynthError::Exhausted);
                }
                let Some(free_op) = catalog.free_op_for(&ty) else {
                    return Err(SynthError::Exhausted);
                };
                let Some(pin) = freed_param(free_op) else {
                    return Err(SynthError::Exhausted);
                };
                let Some(args) =
                    crate::generators::default_binding(free_op, tracker, Some((pin, id)))
                else {
                    continue;
                };
                if tracker.can_apply(free_op, &args).is_err() {
                    continue;
                }
                let effect = tracker.apply(free_op, &args)?;
                sequence.steps.push(SequenceStep {
                    op: free_op.name.clone(),
                    phase: Phase::Cleanup,
                    args,
                    created: effect.created,
                    freed: effect.freed,
                    critical: free_op.critical,
                });
                progressed = true;
                break;
            }
            if !progressed {
                // Nothing frees the remainder; the sequence cannot satisfy a
                // no-leak policy within its budget.
                return Err(SynthError::Exhausted);
            }
        }
    }
}

/// Upper bound on independently owned handles still live after applying
/// `spec`: each one will cost a cleanup step. Cascaded frees are not counted,
/// so the estimate errs toward reserving too much.
fn projected_live(tracker: &StateTracker, spec: &OperationSpec) -> usize {
    let live = tracker
        .finalize()
        .into_iter()
        .filter(|h| matches!(h.owner, Ownership::Step(_)))
        .count();
    let mut projected = live;
    for post in &spec.post {
        match post {
            Postcondition::CreatesReturn { .. } | Postcondition::CreatesOut { .. } => {
                projected += 1
            }
            Postcondition::Frees { .. } | Postcondition::Attaches { .. } => {
                projected = projected.saturating_sub(1)
            }
            _ => {}
        }
    }
    projected
}

/// Index of the parameter a free-class operation releases.
pub(crate) fn freed_param(spec: &OperationSpec) -> Option<usize> {
    spec.post.iter().find_map(|p| match p {
        Postcondition::Frees { param } => Some(*param),
        _ => None,
    })
}

/// Independently owned live handles in the order cleanup should release
/// them: handles whose free operation needs other live handles first (their
/// dependencies must still be around), then latest-created first.
pub(crate) fn drain_order(catalog: &Catalog, tracker: &StateTracker) -> Vec<(HandleId, TypeTag)> {
    let mut leaked: Vec<_> = tracker
        .finalize()
        .into_iter()
        .filter(|h| matches!(h.owner, Ownership::Step(_)))
        .map(|h| {
            let aux = catalog
                .free_op_for(&h.ty)
                .map(|op| op.handle_params().count())
                .unwrap_or(0);
            (h.id, h.ty.clone(), h.created_at, aux)
        })
        .collect();
    leaked.sort_by(|a, b| b.3.cmp(&a.3).then(b.2.cmp(&a.2)));
    leaked.into_iter().map(|(id, ty, _, _)| (id, ty)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{LifecycleState, OpCategory, OperationSpec};
    use crate::generators::{EnumerationSource, RandomSource, RulesSource};

    /// The JSON-like scenario catalog: CreateObject / AddItem / Delete.
    fn scenario_catalog() -> Catalog {
        let mut c = Catalog::new(LibraryId::CJson);
        c.push(OperationSpec::new("CreateObject", OpCategory::Allocate).returns_handle("obj"));
        c.push(
            OperationSpec::new("AddItem", OpCategory::Configure)
                .handle_in("obj", "obj", &[LifecycleState::Allocated])
                .handle_in("item", "obj", &[LifecycleState::Allocated])
                .distinct(0, 1)
                .attaches(1, 0)
                .critical(),
        );
        c.push(
            OperationSpec::new("Delete", OpCategory::Free)
                .handle_in("obj", "obj", &[LifecycleState::Allocated])
                .frees(0),
        );
        c
    }

    #[test]
    fn scenario_budget_four_frees_every_created_handle_once() {
        let catalog = scenario_catalog();
        let config = SynthesisConfig {
            phase_budget: 2,
            step_budget: 4,
            ..Default::default()
        };
        let synthesizer = Synthesizer::new(config);
        let mut source = EnumerationSource::new();
        let sequence = synthesizer.synthesize(&catalog, &mut source).unwrap();
        assert!(sequence.len() <= 4);

        // Replaying from scratch never raises, and nothing stays live.
        let tracker = sequence.replay(&catalog).unwrap();
        assert!(tracker.finalize().is_empty());

        // Each handle freed at most once across the whole sequence.
        let mut freed = Vec::new();
        for step in &sequence.steps {
            for id in &step.freed {
                assert!(!freed.contains(id), "{id} freed twice");
                freed.push(*id);
            }
        }

        // Every Delete targets a handle that was live at that point; the
        // tracker already guarantees it, so just count creations vs frees.
        let created: usize = sequence.steps.iter().map(|s| s.created.len()).sum();
        assert_eq!(created, freed.len());
    }

    #[test]
    fn empty_catalog_yields_no_feasible_operation() {
        let catalog = Catalog::new(LibraryId::Zlib);
        let synthesizer = Synthesizer::new(SynthesisConfig::default());
        let mut source = EnumerationSource::new();
        let err = synthesizer.synthesize(&catalog, &mut source).unwrap_err();
        assert!(matches!(err, SynthError::NoFeasibleOperation));
    }

    #[test]
    fn builtin_catalogs_synthesize_valid_sequences() {
        for id in LibraryId::all() {
            let catalog = Catalog::load(id).unwrap();
            let synthesizer = Synthesizer::new(SynthesisConfig::default());
            let mut source = EnumerationSource::new();
            let sequence = synthesizer
                .synthesize(catalog, &mut source)
                .unwrap_or_else(|e| panic!("{id}: {e}"));
            assert!(!sequence.is_empty());
            sequence.validate(catalog, LeakPolicy::Deny).unwrap();
        }
    }

    #[test]
    fn random_source_output_is_still_model_valid() {
        let catalog = Catalog::load(LibraryId::Sqlite3).unwrap();
        let synthesizer = Synthesizer::new(SynthesisConfig::default());
        for seed in [1u64, 2, 3] {
            let mut source = RandomSource::new(seed);
            let sequence = synthesizer.synthesize(catalog, &mut source).unwrap();
            sequence.validate(catalog, LeakPolicy::Deny).unwrap();
        }
    }

    #[test]
    fn rules_source_output_is_still_model_valid() {
        let catalog = Catalog::load(LibraryId::Libpng).unwrap();
        let synthesizer = Synthesizer::new(SynthesisConfig::default());
        let mut source = RulesSource::new();
        let sequence = synthesizer.synthesize(catalog, &mut source).unwrap();
        sequence.validate(catalog, LeakPolicy::Deny).unwrap();
    }

    #[test]
    fn exhausted_when_no_free_operation_exists_under_deny() {
        // An allocator with no matching free op cannot satisfy a no-leak
        // policy; the run ends with the recoverable Exhausted error.
        let mut catalog = Catalog::new(LibraryId::Zlib);
        catalog.push(
            OperationSpec::new("leakyInit", OpCategory::Allocate).returns_handle("leaky"),
        );

        let synthesizer = Synthesizer::new(SynthesisConfig::default());
        let mut source = EnumerationSource::new();
        let err = synthesizer.synthesize(&catalog, &mut source).unwrap_err();
        assert!(matches!(err, SynthError::Exhausted));
        assert!(!err.is_fatal());

        // The same catalog is fine when leaks are allowed.
        let config = SynthesisConfig {
            leak_policy: LeakPolicy::Allow,
            ..Default::default()
        };
        let mut source = EnumerationSource::new();
        let sequence = Synthesizer::new(config)
            .synthesize(&catalog, &mut source)
            .unwrap();
        assert!(!sequence.is_empty());
    }

    #[test]
    fn leak_policy_allow_skips_appended_cleanup() {
        let catalog = scenario_catalog();
        let config = SynthesisConfig {
            phase_budget: 1,
            leak_policy: LeakPolicy::Allow,
            ..Default::default()
        };
        let synthesizer = Synthesizer::new(config);
        let mut source = EnumerationSource::new();
        let sequence = synthesizer.synthesize(&catalog, &mut source).unwrap();
        // Allow means validate(Deny) may fail but validate(Allow) must pass.
        sequence.validate(&catalog, LeakPolicy::Allow).unwrap();
    }

    #[test]
    fn freed_handles_are_never_reused() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let synthesizer = Synthesizer::new(SynthesisConfig::default());
        let mut source = EnumerationSource::new();
        let sequence = synthesizer.synthesize(catalog, &mut source).unwrap();

        let mut freed: Vec<_> = Vec::new();
        for step in &sequence.steps {
            for arg in &step.args {
                if let ArgValue::Handle(id) = arg {
                    assert!(!freed.contains(id), "step {} reuses freed {id}", step.op);
                }
            }
            freed.extend(step.freed.iter().copied());
        }
    }
}
