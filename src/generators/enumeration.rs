// citywalk/src/generators/enumeration.rs
//! Deterministic enumeration over the catalog: the `full_coverage` strategy.
//! Proposes every phase-appropriate operation that can be bound right now,
//! in catalog order, and counts what it already proposed so uncovered
//! operations rank ahead of repeats.

use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::synthesis::Phase;
use crate::tracker::StateTracker;

use super::{default_binding, phase_categories, CandidateSource, Proposal};

#[derive(Debug, Default)]
pub struct EnumerationSource {
    accepted: HashMap<String, usize>,
}

impl EnumerationSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CandidateSource for EnumerationSource {
    fn propose(
        &mut self,
        phase: Phase,
        tracker: &StateTracker,
        catalog: &Catalog,
    ) -> Vec<Proposal> {
        let categories = phase_categories(phase);
        let mut proposals = Vec::new();
        for op in catalog.ops() {
            if !categories.contains(&op.category) {
                continue;
            }
            let Some(args) = default_binding(op, tracker, None) else {
                continue;
            };
            let uses = *self.accepted.get(&op.name).unwrap_or(&0);
            // Unused operations first, then catalog order.
            let rank = 1.0 / (1.0 + uses as f64);
            proposals.push(Proposal {
                op: op.name.clone(),
                args,
                rank,
            });
        }
        proposals
    }

    fn accepted(&mut self, op: &str) {
        *self.accepted.entry(op.to_string()).or_insert(0) += 1;
    }

    fn name(&self) -> &'static str {
        "full_coverage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LibraryId;

    #[test]
    fn initialize_phase_proposes_only_allocators() {
        let catalog = Catalog::load(LibraryId::Re2).unwrap();
        let tracker = StateTracker::new();
        let mut source = EnumerationSource::new();
        let proposals = source.propose(Phase::Initialize, &tracker, catalog);
        assert!(!proposals.is_empty());
        for p in &proposals {
            let spec = catalog.lookup(&p.op).unwrap();
            assert!(spec.creates_handle(), "{} allocates nothing", p.op);
        }
        // cre2_new needs a live options handle, so it is not yet proposable.
        assert!(proposals.iter().all(|p| p.op != "cre2_new"));
    }

    #[test]
    fn accepted_operations_rank_below_fresh_ones() {
        let catalog = Catalog::load(LibraryId::CJson).unwrap();
        let tracker = StateTracker::new();
        let mut source = EnumerationSource::new();
        source.accepted("cJSON_CreateObject");

        let proposals = source.propose(Phase::Initialize, &tracker, catalog);
        let used = proposals.iter().find(|p| p.op == "cJSON_CreateObject").unwrap();
        let fresh = proposals.iter().find(|p| p.op == "cJSON_CreateArray").unwrap();
        assert!(fresh.rank > used.rank);
    }
}
