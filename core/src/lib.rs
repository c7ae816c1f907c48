//! Public-safety budget allocation engine.
//!
//! Stages, leaf first:
//!   dataset     -> validated per-region, per-year observations
//!   elasticity  -> spend sensitivity per region, with peer fallback
//!   optimizer   -> bounded LP allocation of a supplementary budget
//!   monte_carlo -> seeded uncertainty over the allocation
//!   planner     -> multi-year disbursement strategies
//!   efficiency  -> ratio-based ranking of regions
//!
//! `engine::AllocationEngine` wires them together from an `EngineConfig`.

pub mod config;
pub mod dataset;
pub mod efficiency;
pub mod elasticity;
pub mod engine;
pub mod error;
pub mod monte_carlo;
pub mod optimizer;
pub mod planner;
pub mod report;
pub mod rng;
pub mod types;

pub use error::{EngineError, EngineResult};
