//! Structured solve traces for compiler observability.
//!
//! These types capture step-by-step records of the solver's search,
//! enabling external tools to expose the solver's reasoning process.
//! All tracing is opt-in via `ConstraintSystem::enable_tracing()` — zero
//! overhead when disabled. The human-readable debug stream (the
//! `(trying t0 := Int` lines) is separate and goes through the injected
//! debug writer.

use serde::Serialize;

/// A single step in a solve trace.
#[derive(Debug, Clone, Serialize)]
pub struct SolveStep {
    /// Search depth at the time of the step.
    pub depth: usize,
    pub action: SolveAction,
    pub detail: String,
}

/// What the solver did at a trace step.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveAction {
    /// Speculatively bound a type variable to a candidate type.
    TryBinding,
    /// Assumed one alternative of a disjunction.
    Assume,
    /// Started solving one connected component.
    SolveComponent,
    /// A terminal state produced a solution.
    FoundSolution,
    /// A combination of component partial solutions survived.
    ComposedSolution,
    /// The branch was abandoned because its score exceeded the best known.
    Prune,
    /// A constraint simplified to an error and the branch failed.
    Fail,
}
