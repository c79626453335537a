// citywalk/src/constants.rs
//! Default budgets and limits for sequence synthesis and repair.

/// Default number of steps a synthesizer may place in a single phase.
pub const DEFAULT_PHASE_BUDGET: usize = 6;

/// Default total step budget for one sequence. Leaves room for the appended
/// cleanup frees after every earlier phase runs to its own budget.
pub const DEFAULT_STEP_BUDGET: usize = 64;

/// Default wall-clock budget for one synthesis run, in milliseconds.
/// Synthesis is pure in-memory work, so this only guards pathological
/// candidate sources.
pub const DEFAULT_TIME_BUDGET_MS: u64 = 2_000;

/// Maximum number of replay/edit passes the repair engine attempts before
/// declaring a sequence irreparable.
pub const MAX_REPAIR_PASSES: usize = 4;

/// Default number of proposals requested from a candidate source per step.
pub const DEFAULT_PROPOSAL_WIDTH: usize = 16;

/// Default RNG seed for the random candidate source when none is supplied.
pub const DEFAULT_SEED: u64 = 42;
