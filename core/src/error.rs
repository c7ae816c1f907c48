use crate::types::RegionCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Data error: {0}")]
    Data(String),

    #[error("Infeasible allocation: {0}")]
    Infeasible(String),

    #[error("Invalid bounds for region {region}: min {min} > max {max}")]
    UnboundedBounds { region: RegionCode, min: f64, max: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid weights: outcome {outcome_weight} + cost {cost_weight} must sum to 1")]
    InvalidWeight { outcome_weight: f64, cost_weight: f64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn is_infeasible(&self) -> bool {
        matches!(self, Self::Infeasible(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
