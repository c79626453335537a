// citywalk/src/corpus/mod.rs
//! Corpus manager: fans sequence generation out over a worker pool, scores
//! and filters the results, and reports per-unit failures without letting one
//! bad unit stop the rest of the run.

use std::sync::mpsc;
use std::thread;

use log::{error, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{Catalog, LibraryId};
use crate::error::{Result, SynthError};
use crate::generators::{
    CandidateSource, EnumerationSource, RandomSource, ReplaySource, RulesSource,
};
use crate::repair::RepairEngine;
use crate::scoring::{score, CoverageMap, QualityRecord};
use crate::synthesis::{CandidateSequence, SynthesisConfig, Synthesizer};

/// Generation strategies, named after the corpus variants they produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    FullCoverage,
    Random,
    Rules,
    Original,
    Repair,
}

impl Strategy {
    pub fn all() -> [Strategy; 5] {
        [
            Strategy::FullCoverage,
            Strategy::Random,
            Strategy::Rules,
            Strategy::Original,
            Strategy::Repair,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::FullCoverage => "full_coverage",
            Strategy::Random => "random",
            Strategy::Rules => "rules",
            Strategy::Original => "original",
            Strategy::Repair => "repair",
        }
    }

    /// Whether this strategy synthesizes from scratch or consumes externally
    /// supplied sequences.
    pub fn is_synthesizing(&self) -> bool {
        matches!(
            self,
            Strategy::FullCoverage | Strategy::Random | Strategy::Rules
        )
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(input: &str) -> std::result::Result<Strategy, String> {
        Strategy::all()
            .into_iter()
            .find(|s| s.as_str() == input)
            .ok_or_else(|| format!("unknown strategy '{input}'"))
    }
}

/// One accepted corpus entry with its corpus-local identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSequence {
    pub id: String,
    pub sequence: CandidateSequence,
    pub quality: QualityRecord,
    pub score: f64,
}

/// Outcome of one generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: Uuid,
    pub library: LibraryId,
    pub strategy: Strategy,
    /// Sequences accepted after scoring and filtering.
    pub produced: usize,
    pub sequences: Vec<ScoredSequence>,
    /// Human-readable reasons for units that failed or were filtered out.
    pub failures: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CorpusConfig {
    pub synthesis: SynthesisConfig,
    /// Minimum scalar score a sequence must reach to be kept.
    pub min_score: f64,
    pub workers: usize,
    pub seed: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            synthesis: SynthesisConfig::default(),
            min_score: 0.0,
            workers: 4,
            seed: crate::constants::DEFAULT_SEED,
        }
    }
}

pub struct CorpusManager {
    config: CorpusConfig,
    coverage: CoverageMap,
}

impl CorpusManager {
    pub fn new(config: CorpusConfig, coverage: CoverageMap) -> Self {
        Self { config, coverage }
    }

    /// Synthesize `count` sequences for `library` with a from-scratch
    /// strategy. Per-unit errors are collected, never propagated.
    pub fn generate_corpus(
        &self,
        library: LibraryId,
        strategy: Strategy,
        count: usize,
    ) -> Result<GenerationReport> {
        let catalog = Catalog::load(library)?;
        self.generate_with(catalog, strategy, count)
    }

    /// Like [`generate_corpus`](Self::generate_corpus), against an explicit
    /// catalog instead of the built-in one.
    pub fn generate_with(
        &self,
        catalog: &Catalog,
        strategy: Strategy,
        count: usize,
    ) -> Result<GenerationReport> {
        if !strategy.is_synthesizing() {
            return Err(SynthError::NoFeasibleOperation);
        }
        let results = self.run_pool(count, move |unit, config| {
            let mut source = make_source(strategy, config.seed + unit as u64);
            Synthesizer::new(config.synthesis.clone()).synthesize(catalog, source.as_mut())
        });
        self.assemble(catalog.library(), strategy, results)
    }

    /// Accept externally produced sequences. `original` inputs are normalized
    /// by replaying them through the synthesizer; everything else goes
    /// through the repair engine first.
    pub fn process_external(
        &self,
        library: LibraryId,
        strategy: Strategy,
        inputs: Vec<CandidateSequence>,
    ) -> Result<GenerationReport> {
        let catalog = Catalog::load(library)?;
        let count = inputs.len();
        let results = self.run_pool(count, move |unit, config| {
            let input = &inputs[unit];
            if strategy == Strategy::Original {
                let mut source = ReplaySource::from_sequence(input);
                Synthesizer::new(config.synthesis.clone()).synthesize(catalog, &mut source)
            } else {
                RepairEngine::new(config.synthesis.leak_policy).repair(catalog, input)
            }
        });
        self.assemble(library, strategy, results)
    }

    /// Run `count` independent units across the worker pool. Results come
    /// back tagged with their unit index so reports stay reproducible.
    fn run_pool<F>(&self, count: usize, work: F) -> Vec<(usize, Result<CandidateSequence>)>
    where
        F: Fn(usize, &CorpusConfig) -> Result<CandidateSequence> + Send + Sync,
    {
        let workers = self.config.workers.clamp(1, count.max(1));
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            for w in 0..workers {
                let tx = tx.clone();
                let work = &work;
                let config = &self.config;
                scope.spawn(move || {
                    for unit in (w..count).step_by(workers) {
                        let _ = tx.send((unit, work(unit, config)));
                    }
                });
            }
            drop(tx);
        });

        let mut results: Vec<_> = rx.into_iter().collect();
        results.sort_by_key(|(unit, _)| *unit);
        results
    }

    /// Score, filter, and identify completed units.
    fn assemble(
        &self,
        library: LibraryId,
        strategy: Strategy,
        results: Vec<(usize, Result<CandidateSequence>)>,
    ) -> Result<GenerationReport> {
        let mut sequences = Vec::new();
        let mut failures = Vec::new();

        for (unit, result) in results {
            match result {
                Ok(sequence) => {
                    let quality = score(&sequence, &self.coverage);
                    let scalar = quality.score();
                    if scalar < self.config.min_score {
                        failures.push(format!(
                            "unit {unit}: score {scalar:.2} below threshold {:.2}",
                            self.config.min_score
                        ));
                        continue;
                    }
                    sequences.push(ScoredSequence {
                        id: String::new(),
                        sequence,
                        quality,
                        score: scalar,
                    });
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err @ SynthError::InvalidTransition(_)) => {
                    error!("{library}/{strategy} unit {unit}: {err}");
                    failures.push(format!("unit {unit}: {err}"));
                }
                Err(err) => {
                    warn!("{library}/{strategy} unit {unit}: {err}");
                    failures.push(format!("unit {unit}: {err}"));
                }
            }
        }

        for (index, entry) in sequences.iter_mut().enumerate() {
            entry.id = format!("{}_{}_{index:04}", library.as_str(), strategy.as_str());
        }

        Ok(GenerationReport {
            run_id: Uuid::new_v4(),
            library,
            strategy,
            produced: sequences.len(),
            sequences,
            failures,
        })
    }
}

fn make_source(strategy: Strategy, seed: u64) -> Box<dyn CandidateSource> {
    match strategy {
        Strategy::FullCoverage => Box::new(EnumerationSource::new()),
        Strategy::Random => Box::new(RandomSource::new(seed)),
        Strategy::Rules => Box::new(RulesSource::new()),
        Strategy::Original | Strategy::Repair => Box::new(EnumerationSource::new()),
    }
}
