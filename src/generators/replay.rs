// citywalk/src/generators/replay.rs
//! Replay adapter: wraps an externally produced sequence (the `original`
//! strategy's LLM output) as a candidate source. Steps are proposed in their
//! recorded order; steps the tracker cannot admit are skipped, so driving the
//! synthesizer with this source normalizes the external sequence into a
//! model-valid one.

use std::collections::VecDeque;

use log::trace;

use crate::catalog::Catalog;
use crate::synthesis::{CandidateSequence, Phase};
use crate::tracker::{ArgValue, StateTracker};

use super::{CandidateSource, Proposal};

pub struct ReplaySource {
    pending: VecDeque<(String, Vec<ArgValue>)>,
}

impl ReplaySource {
    pub fn from_sequence(sequence: &CandidateSequence) -> Self {
        Self {
            pending: sequence
                .steps
                .iter()
                .map(|s| (s.op.clone(), s.args.clone()))
                .collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl CandidateSource for ReplaySource {
    fn propose(
        &mut self,
        _phase: Phase,
        tracker: &StateTracker,
        catalog: &Catalog,
    ) -> Vec<Proposal> {
        // Drop recorded steps that can no longer be admitted; the next
        // admissible step is the single proposal. Phases are ignored: the
        // recorded order is the external generator's phase structure.
        while let Some((op, args)) = self.pending.front() {
            let feasible = catalog
                .lookup(op)
                .ok()
                .map(|spec| tracker.can_apply(spec, args).is_ok())
                .unwrap_or(false);
            if feasible {
                return vec![Proposal {
                    op: op.clone(),
                    args: args.clone(),
                    rank: 1.0,
                }];
            }
            if let Some((dropped, _)) = self.pending.pop_front() {
                trace!("replay: skipping inadmissible step {dropped}");
            }
        }
        Vec::new()
    }

    fn accepted(&mut self, op: &str) {
        if self.pending.front().map(|(name, _)| name.as_str()) == Some(op) {
            self.pending.pop_front();
        }
    }

    fn name(&self) -> &'static str {
        "original"
    }
}
