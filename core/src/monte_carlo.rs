//! Monte Carlo uncertainty over the allocation.
//!
//! Every trial owns a TrialRng derived from (seed, trial_index) and
//! reads the same immutable request. Trials therefore produce the same
//! outcome whether they run sequentially or on a rayon pool, and the
//! outcome vector is always stored in trial-index order.
//!
//! Draw layout per trial (fixed, never reordered):
//!   1. one normal per region for elasticity, in request order
//!   2. one normal per region for baseline deaths, only when enabled
//!
//! Feasibility is checked once on the point request. A draw that pushes
//! a region's effect cap below its floor pins that region at the floor.

use crate::{
    config::{AllocationMode, PerturbationConfig},
    error::{EngineError, EngineResult},
    optimizer::{self, AllocationRequest, CapPolicy},
    rng::TrialRng,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const MAX_TRIALS: usize = 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonteCarloSummary {
    pub mean:     f64,
    pub std_dev:  f64,
    pub median:   f64,
    /// 2.5th percentile.
    pub ci_lower: f64,
    /// 97.5th percentile.
    pub ci_upper: f64,
    pub min:      f64,
    pub max:      f64,
}

impl MonteCarloSummary {
    pub fn from_outcomes(outcomes: &[f64]) -> Self {
        let n = outcomes.len();
        let mean = outcomes.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            let var = outcomes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };

        let mut sorted = outcomes.to_vec();
        sorted.sort_by(f64::total_cmp);

        Self {
            mean,
            std_dev,
            median:   percentile(&sorted, 50.0),
            ci_lower: percentile(&sorted, 2.5),
            ci_upper: percentile(&sorted, 97.5),
            min:      sorted[0],
            max:      sorted[n - 1],
        }
    }

    pub fn interval_width(&self) -> f64 {
        self.ci_upper - self.ci_lower
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonteCarloResult {
    pub seed:           u64,
    pub trial_count:    usize,
    pub mode:           AllocationMode,
    /// Lives saved with unperturbed parameters.
    pub point_estimate: f64,
    /// Lives saved per trial, in trial-index order.
    pub outcomes:       Vec<f64>,
    pub summary:        MonteCarloSummary,
}

/// Linear interpolation between order statistics. `sorted` must be
/// ascending and non-empty; `p` is in [0, 100].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Draw one trial's parameters from the point request.
pub fn perturb(
    request: &AllocationRequest,
    config:  &PerturbationConfig,
    rng:     &mut TrialRng,
) -> AllocationRequest {
    let mut trial = request.clone();

    for region in &mut trial.regions {
        let scale = region
            .elasticity_std_error
            .filter(|se| *se > 0.0)
            .unwrap_or(region.elasticity.abs());
        region.elasticity = rng.normal(region.elasticity, config.elasticity_spread * scale);
    }

    if config.baseline_deaths_spread > 0.0 {
        for region in &mut trial.regions {
            let factor = 1.0 + config.baseline_deaths_spread * rng.standard_normal();
            region.deaths = (region.deaths * factor).max(0.0);
        }
    }

    trial
}

pub fn simulate(
    request:     &AllocationRequest,
    config:      &PerturbationConfig,
    trial_count: usize,
    seed:        u64,
) -> EngineResult<MonteCarloResult> {
    if trial_count == 0 || trial_count > MAX_TRIALS {
        return Err(EngineError::InvalidConfig(format!(
            "trial_count must be in 1..={MAX_TRIALS}, got {trial_count}"
        )));
    }
    config.validate()?;

    let point = optimizer::optimize(request)?;
    let fixed: Option<Vec<f64>> = match config.mode {
        AllocationMode::Fixed => Some(point.allocations.iter().map(|a| a.investment).collect()),
        AllocationMode::Reoptimize => None,
    };

    let run_trial = |index: usize| -> EngineResult<f64> {
        let mut rng = TrialRng::new(seed, index as u64);
        let trial = perturb(request, config, &mut rng);
        let result = match &fixed {
            Some(investments) => optimizer::project(&trial, investments)?,
            None => optimizer::optimize_with(&trial, CapPolicy::FloorWins)?,
        };
        Ok(result.lives_saved)
    };

    let outcomes: Vec<f64> = if config.parallel {
        (0..trial_count)
            .into_par_iter()
            .map(run_trial)
            .collect::<EngineResult<Vec<_>>>()?
    } else {
        (0..trial_count)
            .map(run_trial)
            .collect::<EngineResult<Vec<_>>>()?
    };

    let summary = MonteCarloSummary::from_outcomes(&outcomes);
    log::info!(
        "monte_carlo: {trial_count} trials seed={seed} mean={:.2} ci=[{:.2}, {:.2}]",
        summary.mean,
        summary.ci_lower,
        summary.ci_upper
    );

    Ok(MonteCarloResult {
        seed,
        trial_count,
        mode: config.mode,
        point_estimate: point.lives_saved,
        outcomes,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_between_ranks() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 50.0), 3.0);
        assert_eq!(percentile(&sorted, 100.0), 5.0);
        assert!((percentile(&sorted, 2.5) - 1.1).abs() < 1e-12);
    }

    #[test]
    fn single_outcome_collapses_interval() {
        let s = MonteCarloSummary::from_outcomes(&[7.5]);
        assert_eq!(s.mean, 7.5);
        assert_eq!(s.ci_lower, 7.5);
        assert_eq!(s.ci_upper, 7.5);
        assert_eq!(s.std_dev, 0.0);
    }
}
