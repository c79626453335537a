// citywalk/src/repair/mod.rs
//! Repair engine: takes a sequence that fails replay and edits it into one
//! that replays cleanly, or gives up with `Irreparable`. Inputs typically come
//! from external, less-constrained producers whose handle references go stale
//! once steps are dropped or inserted, so each pass replays from scratch and
//! remaps old handle identifiers onto the fresh tracker's numbering.

use std::collections::HashMap;

use log::{debug, trace};

use crate::catalog::{Catalog, LifecycleState, OperationSpec, Postcondition, TypeTag};
use crate::constants::MAX_REPAIR_PASSES;
use crate::error::{Result, SynthError};
use crate::generators::default_binding;
use crate::synthesis::{drain_order, freed_param, CandidateSequence, LeakPolicy, Phase, SequenceStep};
use crate::tracker::{ArgValue, HandleId, StateTracker};

pub struct RepairEngine {
    max_passes: usize,
    leak_policy: LeakPolicy,
}

impl RepairEngine {
    pub fn new(leak_policy: LeakPolicy) -> Self {
        Self {
            max_passes: MAX_REPAIR_PASSES,
            leak_policy,
        }
    }

    /// Edit `sequence` until it replays cleanly under the leak policy.
    pub fn repair(
        &self,
        catalog: &Catalog,
        sequence: &CandidateSequence,
    ) -> Result<CandidateSequence> {
        let mut current = sequence.clone();
        for pass in 1..=self.max_passes {
            let repaired = self.repair_pass(catalog, &current)?;
            if repaired.validate(catalog, self.leak_policy).is_ok() {
                debug!(
                    "repaired {} sequence in {} pass(es): {} -> {} steps",
                    catalog.library(),
                    pass,
                    sequence.len(),
                    repaired.len()
                );
                return Ok(repaired);
            }
            current = repaired;
        }
        Err(SynthError::Irreparable(format!(
            "still invalid after {} passes",
            self.max_passes
        )))
    }

    /// One replay-and-edit pass. Produces a sequence whose every step applied
    /// cleanly against a fresh tracker; validation may still fail on leaks
    /// when a later pass has more to do.
    fn repair_pass(
        &self,
        catalog: &Catalog,
        sequence: &CandidateSequence,
    ) -> Result<CandidateSequence> {
        let mut tracker = StateTracker::new();
        let mut out = CandidateSequence::new(sequence.library);
        // Old identifier -> handle in the fresh tracker.
        let mut remap: HashMap<HandleId, HandleId> = HashMap::new();
        let mut alloc = IdAllocator::new();

        'steps: for step in &sequence.steps {
            let spec = catalog.lookup(&step.op)?;
            let old_created = alloc.created_by(step, spec);

            let mut args = step.args.clone();
            for (i, arg) in args.iter_mut().enumerate() {
                let ArgValue::Handle(old) = *arg else { continue };
                let mapped = remap.get(&old).copied();
                let live = mapped
                    .and_then(|id| tracker.handle(id))
                    .map(|h| h.state != LifecycleState::Freed)
                    .unwrap_or(false);
                if live {
                    *arg = ArgValue::Handle(mapped.unwrap_or(old));
                    continue;
                }
                // Stale reference. A later free of an already freed handle is
                // always dropped; non-critical offenders are dropped too.
                if spec.frees_handle() || !spec.critical {
                    trace!("dropping {}: stale handle {old} at arg {i}", step.op);
                    continue 'steps;
                }
                let ty = spec.params[i].ty.clone().ok_or_else(|| {
                    SynthError::Irreparable(format!("{}: untyped handle parameter {i}", step.op))
                })?;
                let fresh =
                    self.insert_duplicate(catalog, &mut tracker, &mut out, step.phase, &ty)?;
                *arg = ArgValue::Handle(fresh);
            }

            if let Err(infeasible) = tracker.can_apply(spec, &args) {
                if spec.critical {
                    return Err(SynthError::Irreparable(format!(
                        "critical step {}: {infeasible}",
                        step.op
                    )));
                }
                trace!("dropping infeasible {}", step.op);
                continue;
            }
            let effect = tracker.apply(spec, &args)?;
            for (old, new) in old_created.iter().zip(effect.created.iter()) {
                remap.insert(*old, *new);
            }
            out.steps.push(SequenceStep {
                op: step.op.clone(),
                phase: step.phase,
                args,
                created: effect.created,
                freed: effect.freed,
                critical: spec.critical,
            });
        }

        if self.leak_policy == LeakPolicy::Deny {
            self.append_frees(catalog, &mut tracker, &mut out)?;
        }
        Ok(out)
    }

    /// Place a duplicate-producing call for `ty` sourced from any live handle
    /// of that type, returning the new handle.
    fn insert_duplicate(
        &self,
        catalog: &Catalog,
        tracker: &mut StateTracker,
        out: &mut CandidateSequence,
        phase: Phase,
        ty: &TypeTag,
    ) -> Result<HandleId> {
        let dup = catalog.duplicate_op_for(ty).ok_or_else(|| {
            SynthError::Irreparable(format!("no duplicate operation for type {ty}"))
        })?;
        let args = default_binding(dup, tracker, None).ok_or_else(|| {
            SynthError::Irreparable(format!("no live {ty} handle to duplicate"))
        })?;
        tracker
            .can_apply(dup, &args)
            .map_err(|e| SynthError::Irreparable(format!("{}: {e}", dup.name)))?;
        let effect = tracker.apply(dup, &args)?;
        let fresh = *effect.created.first().ok_or_else(|| {
            SynthError::Irreparable(format!("{} created no handle", dup.name))
        })?;
        out.steps.push(SequenceStep {
            op: dup.name.clone(),
            phase,
            args,
            created: effect.created,
            freed: effect.freed,
            critical: dup.critical,
        });
        Ok(fresh)
    }

    /// Append a matching free for every handle still live, in drain order.
    /// Attached handles are released through their owner.
    fn append_frees(
        &self,
        catalog: &Catalog,
        tracker: &mut StateTracker,
        out: &mut CandidateSequence,
    ) -> Result<()> {
        loop {
            let leaked = drain_order(catalog, tracker);
            if leaked.is_empty() {
                return Ok(());
            }

            let mut progressed = false;
            for (id, ty) in leaked {
                let free_op = catalog.free_op_for(&ty).ok_or_else(|| {
                    SynthError::Irreparable(format!("no free operation for type {ty}"))
                })?;
                let pin = freed_param(free_op).ok_or_else(|| {
                    SynthError::Irreparable(format!("{} frees nothing", free_op.name))
                })?;
                let Some(args) = default_binding(free_op, tracker, Some((pin, id))) else {
                    continue;
                };
                if tracker.can_apply(free_op, &args).is_err() {
                    continue;
                }
                let effect = tracker.apply(free_op, &args)?;
                out.steps.push(SequenceStep {
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
                return Err(SynthError::Irreparable(
                    "remaining live handles cannot be freed".into(),
                ));
            }
        }
    }
}

/// Reconstructs the handle numbering the producer of a sequence used. Steps
/// recorded with their effects keep them; bare steps are assumed to have been
/// numbered sequentially per creation postcondition.
struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    fn new() -> Self {
        Self { next: 0 }
    }

    fn created_by(&mut self, step: &SequenceStep, spec: &OperationSpec) -> Vec<HandleId> {
        if !step.created.is_empty() {
            if let Some(max) = step.created.iter().map(|h| h.0).max() {
                self.next = self.next.max(max + 1);
            }
            return step.created.clone();
        }
        let count = spec
            .post
            .iter()
            .filter(|p| {
                matches!(
                    p,
                    Postcondition::CreatesReturn { .. } | Postcondition::CreatesOut { .. }
                )
            })
            .count();
        (0..count)
            .map(|_| {
                let id = HandleId(self.next);
                self.next += 1;
                id
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{LibraryId, LiteralValue};
    use crate::generators::EnumerationSource;
    use crate::synthesis::{Synthesizer, SynthesisConfig};

    fn recorded(op: &str, phase: Phase, args: Vec<ArgValue>) -> SequenceStep {
        SequenceStep::recorded(op, phase, args)
    }

    fn h(n: u32) -> ArgValue {
        ArgValue::Handle(HandleId(n))
    }

    #[test]
    fn double_free_drops_later_delete_and_keeps_prefix() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let mut seq = CandidateSequence::new(LibraryId::CJson);
        seq.steps.push(recorded("cJSON_CreateObject", Phase::Initialize, vec![]));
        seq.steps.push(recorded("cJSON_Delete", Phase::Cleanup, vec![h(0)]));
        seq.steps.push(recorded("cJSON_Delete", Phase::Cleanup, vec![h(0)]));
        assert!(seq.replay(catalog).is_err());

        let engine = RepairEngine::new(LeakPolicy::Deny);
        let repaired = engine.repair(catalog, &seq).unwrap();

        assert_eq!(repaired.len(), 2);
        assert_eq!(repaired.steps[0].op, "cJSON_CreateObject");
        assert_eq!(repaired.steps[1].op, "cJSON_Delete");
        assert_eq!(repaired.steps[1].args, vec![h(0)]);
        repaired.validate(catalog, LeakPolicy::Deny).unwrap();
    }

    #[test]
    fn stale_reference_in_noncritical_step_is_dropped() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let mut seq = CandidateSequence::new(LibraryId::CJson);
        seq.steps.push(recorded("cJSON_CreateObject", Phase::Initialize, vec![]));
        seq.steps.push(recorded("cJSON_Delete", Phase::Cleanup, vec![h(0)]));
        seq.steps.push(recorded("cJSON_Print", Phase::Validate, vec![h(0)]));

        let engine = RepairEngine::new(LeakPolicy::Deny);
        let repaired = engine.repair(catalog, &seq).unwrap();
        assert!(repaired.steps.iter().all(|s| s.op != "cJSON_Print"));
        repaired.validate(catalog, LeakPolicy::Deny).unwrap();
    }

    #[test]
    fn stale_reference_in_critical_step_gets_a_duplicate() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let mut seq = CandidateSequence::new(LibraryId::CJson);
        seq.steps.push(recorded("cJSON_CreateObject", Phase::Initialize, vec![]));
        seq.steps.push(recorded("cJSON_CreateObject", Phase::Initialize, vec![]));
        seq.steps.push(recorded("cJSON_Delete", Phase::Cleanup, vec![h(0)]));
        seq.steps.push(recorded(
            "cJSON_AddItemToObject",
            Phase::Configure,
            vec![
                h(1),
                ArgValue::Literal(LiteralValue::Str("field".into())),
                h(0),
            ],
        ));

        let engine = RepairEngine::new(LeakPolicy::Deny);
        let repaired = engine.repair(catalog, &seq).unwrap();
        assert!(repaired.steps.iter().any(|s| s.op == "cJSON_Duplicate"));
        assert!(repaired.steps.iter().any(|s| s.op == "cJSON_AddItemToObject"));
        repaired.validate(catalog, LeakPolicy::Deny).unwrap();
    }

    #[test]
    fn irreparable_without_a_live_duplication_source() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let mut seq = CandidateSequence::new(LibraryId::CJson);
        seq.steps.push(recorded("cJSON_CreateObject", Phase::Initialize, vec![]));
        seq.steps.push(recorded("cJSON_Delete", Phase::Cleanup, vec![h(0)]));
        seq.steps.push(recorded(
            "cJSON_AddItemToObject",
            Phase::Configure,
            vec![
                h(0),
                ArgValue::Literal(LiteralValue::Str("field".into())),
                h(0),
            ],
        ));

        let engine = RepairEngine::new(LeakPolicy::Deny);
        let err = engine.repair(catalog, &seq).unwrap_err();
        assert!(matches!(err, SynthError::Irreparable(_)));
    }

    #[test]
    fn leaked_handles_get_appended_frees() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let mut seq = CandidateSequence::new(LibraryId::CJson);
        seq.steps.push(recorded("cJSON_CreateObject", Phase::Initialize, vec![]));

        let engine = RepairEngine::new(LeakPolicy::Deny);
        let repaired = engine.repair(catalog, &seq).unwrap();
        assert_eq!(repaired.steps.last().map(|s| s.op.as_str()), Some("cJSON_Delete"));
        repaired.validate(catalog, LeakPolicy::Deny).unwrap();
    }

    #[test]
    fn leaks_are_kept_under_allow_policy() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let mut seq = CandidateSequence::new(LibraryId::CJson);
        seq.steps.push(recorded("cJSON_CreateObject", Phase::Initialize, vec![]));

        let engine = RepairEngine::new(LeakPolicy::Allow);
        let repaired = engine.repair(catalog, &seq).unwrap();
        assert_eq!(repaired.len(), 1);
    }

    #[test]
    fn valid_sequences_pass_through_unchanged() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let synthesizer = Synthesizer::new(SynthesisConfig::default());
        let mut source = EnumerationSource::new();
        let seq = synthesizer.synthesize(catalog, &mut source).unwrap();

        let engine = RepairEngine::new(LeakPolicy::Deny);
        let repaired = engine.repair(catalog, &seq).unwrap();
        let ops: Vec<_> = seq.steps.iter().map(|s| &s.op).collect();
        let repaired_ops: Vec<_> = repaired.steps.iter().map(|s| &s.op).collect();
        assert_eq!(ops, repaired_ops);
    }
}
