pub mod importance;
pub mod objective;
pub mod pruner;
pub mod sampler;
pub mod space;
pub mod study;

pub use importance::param_importances;
pub use objective::Objective;
pub use pruner::{MedianPruner, PruningCallback};
pub use sampler::{RandomSampler, Sampler, TpeSampler};
pub use space::{IntRange, ParamDistribution, ParamValue, SearchLimits, SearchSpace};
pub use study::{Study, TrialOutcome, TrialResult, TrialState};
