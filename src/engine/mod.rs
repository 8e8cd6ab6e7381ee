//! Moteur de décision: correspondance des règles, priorité distante et bannissement

pub mod enforcer;
pub mod evaluator;
pub mod priority;

pub use enforcer::{BanEnforcer, BanOutcome};
pub use evaluator::{PatternCache, RuleEvaluator};
pub use priority::{allocate_priority, next_priority, FIRST_PRIORITY};
