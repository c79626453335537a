// citywalk/src/generators/rules.rs
//! Rule-template proposer: the `rules` ablation strategy.
//!
//! Encodes the usage pattern the harness corpus follows (allocate before
//! configure, configure before operate, validate on live objects, free last)
//! as rank weights instead of hard filters, plus a data-flow bonus for
//! operations whose inputs are already live.

use crate::catalog::{Catalog, OpCategory};
use crate::synthesis::Phase;
use crate::tracker::StateTracker;

use super::{default_binding, phase_categories, CandidateSource, Proposal};

/// Rank weight for an operation whose category exactly matches the phase's
/// primary verb, versus merely being admitted in that phase.
const PRIMARY_WEIGHT: f64 = 2.0;
const SECONDARY_WEIGHT: f64 = 1.0;
/// Bonus per handle parameter that is bindable right now: prefers calls that
/// consume data the sequence already produced.
const DATA_FLOW_BONUS: f64 = 0.25;

fn primary_category(phase: Phase) -> OpCategory {
    match phase {
        Phase::Initialize => OpCategory::Allocate,
        Phase::Configure => OpCategory::Configure,
        Phase::Operate => OpCategory::Operate,
        Phase::Validate => OpCategory::Validate,
        Phase::Cleanup => OpCategory::Free,
    }
}

#[derive(Debug, Default)]
pub struct RulesSource;

impl RulesSource {
    pub fn new() -> Self {
        Self
    }
}

impl CandidateSource for RulesSource {
    fn propose(
        &mut self,
        phase: Phase,
        tracker: &StateTracker,
        catalog: &Catalog,
    ) -> Vec<Proposal> {
        let categories = phase_categories(phase);
        let primary = primary_category(phase);
        let mut proposals = Vec::new();
        for op in catalog.ops() {
            if !categories.contains(&op.category) {
                continue;
            }
            let Some(args) = default_binding(op, tracker, None) else {
                continue;
            };
            let base = if op.category == primary {
                PRIMARY_WEIGHT
            } else {
                SECONDARY_WEIGHT
            };
            let flow = op.handle_params().count() as f64 * DATA_FLOW_BONUS;
            proposals.push(Proposal {
                op: op.name.clone(),
                args,
                rank: base + flow,
            });
        }
        proposals
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LibraryId;
    use crate::tracker::ArgValue;

    #[test]
    fn configure_phase_prefers_configuration_over_more_allocation() {
        let catalog = Catalog::load(LibraryId::Re2).unwrap();
        let mut tracker = StateTracker::new();
        let opt_new = catalog.lookup("cre2_opt_new").unwrap();
        tracker.apply(opt_new, &[]).unwrap();

        let mut source = RulesSource::new();
        let proposals = source.propose(Phase::Configure, &tracker, catalog);
        let set = proposals
            .iter()
            .find(|p| p.op == "cre2_opt_set_case_sensitive")
            .unwrap();
        let alloc = proposals.iter().find(|p| p.op == "cre2_opt_new").unwrap();
        assert!(set.rank > alloc.rank);
    }

    #[test]
    fn data_flow_bonus_prefers_consumers() {
        let catalog = Catalog::load(LibraryId::Libpcap).unwrap();
        let mut tracker = StateTracker::new();
        let open = catalog.lookup("pcap_open_dead").unwrap();
        let args = super::super::default_binding(open, &tracker, None).unwrap();
        assert!(matches!(args[0], ArgValue::Literal(_)));
        tracker.apply(open, &args).unwrap();

        let mut source = RulesSource::new();
        let proposals = source.propose(Phase::Operate, &tracker, catalog);
        // pcap_compile consumes the live pcap_t; bare allocation does not.
        let compile = proposals.iter().find(|p| p.op == "pcap_compile").unwrap();
        let open_again = proposals.iter().find(|p| p.op == "pcap_open_dead").unwrap();
        assert!(compile.rank > open_again.rank);
    }
}
