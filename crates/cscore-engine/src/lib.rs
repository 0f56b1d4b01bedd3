//! Calculation pipeline for CarbonScore: factor matching, scoped footprint
//! aggregation, peer benchmarking, action scoring, and scenario simulation.

pub mod actions;
pub mod benchmark;
pub mod calc;
pub mod matcher;
pub mod scenario;

pub const CRATE_NAME: &str = "cscore-engine";

pub use actions::{
    ActionCandidate, ActionCatalog, ActionError, ActionScorer, ApplicabilityPredicate, CostRange,
    EmissionSlice, ImpactFormula, ScoredAction, ScoringWeights,
};
pub use benchmark::{BenchmarkConfig, BenchmarkEngine, BenchmarkError};
pub use calc::{CalcError, CalculationEngine, CatalogDiffReport, LineDelta};
pub use matcher::{
    FactorMatcher, LexicalSimilarityProvider, MatchError, MatcherConfig, SimilarityProvider,
};
pub use scenario::{
    AppliedAction, ScenarioConfig, ScenarioError, ScenarioResult, ScenarioSimulator,
    SimulationState,
};
