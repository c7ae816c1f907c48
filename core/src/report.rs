//! Engine report — every stage's output in one serializable record.
//!
//! This is the hand-off to the dashboard and report collaborators.
//! It carries values only; rebuilding an engine from it is not supported.

use crate::{
    dataset::PriorityEntry,
    efficiency::EfficiencyScore,
    elasticity::ElasticityEstimate,
    error::EngineResult,
    monte_carlo::MonteCarloResult,
    optimizer::AllocationResult,
    planner::StrategyComparison,
    types::Year,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineReport {
    pub base_year:    Year,
    pub budget:       f64,
    pub seed:         u64,
    pub elasticities: Vec<ElasticityEstimate>,
    pub allocation:   AllocationResult,
    pub monte_carlo:  MonteCarloResult,
    pub strategies:   StrategyComparison,
    pub efficiency:   Vec<EfficiencyScore>,
    pub priorities:   Vec<PriorityEntry>,
}

impl EngineReport {
    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
