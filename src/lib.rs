// citywalk
// Stateful API-sequence synthesis and coverage-quality scoring.

pub mod constants;
pub mod error;

// Core modules
pub mod catalog;
pub mod corpus;
pub mod generators;
pub mod repair;
pub mod scoring;
pub mod synthesis;
pub mod tracker;

// Re-exports for convenience
pub use catalog::{Catalog, LibraryId, OperationSpec};
pub use corpus::{CorpusConfig, CorpusManager, GenerationReport, Strategy};
pub use error::{Result, SynthError};
pub use repair::RepairEngine;
pub use scoring::{score, CoverageMap, QualityRecord};
pub use synthesis::{CandidateSequence, LeakPolicy, SynthesisConfig, Synthesizer};
pub use tracker::StateTracker;

/// Initialize logging for generation binaries.
///
/// Respects `RUST_LOG`; defaults to `info`. Safe to call more than once.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
