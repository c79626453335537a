// citywalk/src/scoring/mod.rs
//! Quality scoring. Coverage is an externally produced oracle; scoring a
//! sequence against it is a pure function so records are reproducible across
//! runs and comparable between generation strategies.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::catalog::LibraryId;
use crate::error::Result;
use crate::synthesis::CandidateSequence;

/// Opaque branch identifier from the coverage oracle.
pub type BranchId = u32;

/// The scored outcome of one sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRecord {
    /// Unique branches per call, clamped to `[0, 1]`.
    pub density: f64,
    pub unique_branches: BTreeSet<BranchId>,
    /// Operation names in call order.
    pub library_calls: Vec<String>,
    /// The critical subset of `library_calls`, in call order.
    pub critical_calls: Vec<String>,
    /// Whether the sequence reached any instrumented branch at all.
    pub visited: bool,
}

impl QualityRecord {
    /// Scalar ranking used for corpus filtering. Branch count dominates;
    /// density breaks ties toward shorter sequences with the same reach.
    pub fn score(&self) -> f64 {
        self.unique_branches.len() as f64 * (1.0 + self.density)
    }
}

/// Read-only mapping from `(library, operation)` to the branches that
/// operation can reach. Loaded once per generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageMap {
    branches: HashMap<String, HashMap<String, BTreeSet<BranchId>>>,
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let branches = serde_json::from_str(raw)?;
        Ok(Self { branches })
    }

    pub fn insert(&mut self, library: LibraryId, op: &str, ids: impl IntoIterator<Item = BranchId>) {
        self.branches
            .entry(library.as_str().to_string())
            .or_default()
            .entry(op.to_string())
            .or_default()
            .extend(ids);
    }

    pub fn branches_for(&self, library: LibraryId, op: &str) -> Option<&BTreeSet<BranchId>> {
        self.branches.get(library.as_str())?.get(op)
    }
}

/// Score a sequence against a coverage map. Same inputs, same record.
pub fn score(sequence: &CandidateSequence, coverage: &CoverageMap) -> QualityRecord {
    let mut library_calls = Vec::with_capacity(sequence.steps.len());
    let mut critical_calls = Vec::new();
    let mut unique_branches = BTreeSet::new();

    for step in &sequence.steps {
        library_calls.push(step.op.clone());
        if step.critical {
            critical_calls.push(step.op.clone());
        }
        if let Some(ids) = coverage.branches_for(sequence.library, &step.op) {
            unique_branches.extend(ids.iter().copied());
        }
    }

    let calls = library_calls.len().max(1);
    let density = (unique_branches.len() as f64 / calls as f64).min(1.0);
    let visited = !unique_branches.is_empty();

    QualityRecord {
        density,
        unique_branches,
        library_calls,
        critical_calls,
        visited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::{Phase, SequenceStep};
    use proptest::prelude::*;

    const OPS: &[&str] = &[
        "cJSON_CreateObject",
        "cJSON_Parse",
        "cJSON_AddItemToObject",
        "cJSON_Print",
        "cJSON_Delete",
    ];

    fn sequence_of(ops: &[(&str, bool)]) -> CandidateSequence {
        let mut seq = CandidateSequence::new(LibraryId::CJson);
        for (op, critical) in ops {
            let mut step = SequenceStep::recorded(op, Phase::Operate, vec![]);
            step.critical = *critical;
            seq.steps.push(step);
        }
        seq
    }

    #[test]
    fn empty_sequence_scores_zero_and_unvisited() {
        let seq = CandidateSequence::new(LibraryId::CJson);
        let record = score(&seq, &CoverageMap::new());
        assert_eq!(record.score(), 0.0);
        assert!(!record.visited);
        assert!(record.library_calls.is_empty());
    }

    #[test]
    fn branches_deduplicate_across_repeated_calls() {
        let mut map = CoverageMap::new();
        map.insert(LibraryId::CJson, "cJSON_Parse", [1, 2, 3]);
        let seq = sequence_of(&[("cJSON_Parse", false), ("cJSON_Parse", false)]);
        let record = score(&seq, &map);
        assert_eq!(record.unique_branches.len(), 3);
        assert_eq!(record.library_calls.len(), 2);
        assert!(record.visited);
    }

    #[test]
    fn map_entries_for_other_libraries_do_not_count() {
        let mut map = CoverageMap::new();
        map.insert(LibraryId::Zlib, "cJSON_Parse", [7]);
        let seq = sequence_of(&[("cJSON_Parse", false)]);
        let record = score(&seq, &map);
        assert!(record.unique_branches.is_empty());
        assert!(!record.visited);
    }

    #[test]
    fn coverage_map_round_trips_through_json() {
        let raw = r#"{"cJSON": {"cJSON_Parse": [3, 1, 1, 2]}}"#;
        let map = CoverageMap::from_json(raw).unwrap();
        let ids = map.branches_for(LibraryId::CJson, "cJSON_Parse").unwrap();
        assert_eq!(ids.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn malformed_coverage_json_is_an_error() {
        let err = CoverageMap::from_json("{\"cJSON\": [1, 2]}").unwrap_err();
        // The message must not blame the catalog for a bad coverage file.
        assert!(!err.to_string().contains("catalog"), "{err}");
    }

    fn arb_map() -> impl Strategy<Value = CoverageMap> {
        proptest::collection::hash_map(
            proptest::sample::select(OPS).prop_map(str::to_string),
            proptest::collection::btree_set(0u32..64, 0..8),
            0..OPS.len(),
        )
        .prop_map(|per_op| {
            let mut map = CoverageMap::new();
            for (op, ids) in per_op {
                map.insert(LibraryId::CJson, &op, ids);
            }
            map
        })
    }

    fn arb_sequence() -> impl Strategy<Value = CandidateSequence> {
        proptest::collection::vec(
            (proptest::sample::select(OPS), any::<bool>()),
            0..12,
        )
        .prop_map(|ops| {
            let owned: Vec<(&str, bool)> = ops.iter().map(|(o, c)| (*o, *c)).collect();
            sequence_of(&owned)
        })
    }

    proptest! {
        #[test]
        fn scoring_is_deterministic(seq in arb_sequence(), map in arb_map()) {
            let first = score(&seq, &map);
            let second = score(&seq, &map);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn density_stays_in_unit_interval(seq in arb_sequence(), map in arb_map()) {
            let record = score(&seq, &map);
            prop_assert!(record.density >= 0.0);
            prop_assert!(record.density <= 1.0);
        }

        #[test]
        fn critical_calls_are_a_subset_in_order(seq in arb_sequence(), map in arb_map()) {
            let record = score(&seq, &map);
            prop_assert!(record.critical_calls.len() <= record.library_calls.len());
            let mut calls = record.library_calls.iter();
            for c in &record.critical_calls {
                prop_assert!(calls.any(|op| op == c));
            }
        }
    }
}
