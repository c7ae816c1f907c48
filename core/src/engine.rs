//! The allocation engine — wires every stage from one config.
//!
//! STAGE ORDER (fixed, each consumes only earlier outputs):
//!   1. Elasticity estimation over observations up to the base year
//!   2. Request assembly from the base-year snapshot
//!   3. Point optimization
//!   4. Monte Carlo over the request
//!   5. Multi-period strategy comparison
//!   6. Efficiency ranking (dataset only)
//!
//! RULES:
//!   - The dataset is owned and never mutated after build().
//!   - All randomness comes from config.seed through TrialRng.
//!   - Every stage can also be called on its own.

use crate::{
    config::EngineConfig,
    dataset::RegionDataset,
    efficiency::{self, EfficiencyScore},
    elasticity::{ElasticityEstimate, ElasticityEstimator},
    error::{EngineError, EngineResult},
    monte_carlo::{self, MonteCarloResult},
    optimizer::{self, AllocationRequest, AllocationResult, InvestmentBounds, RegionState},
    planner::{MultiPeriodPlanner, MultiPeriodResult, Strategy, StrategyComparison},
    report::EngineReport,
    types::Year,
};

pub struct AllocationEngine {
    config:    EngineConfig,
    dataset:   RegionDataset,
    base_year: Year,
    estimates: Vec<ElasticityEstimate>,
    request:   AllocationRequest,
}

impl AllocationEngine {
    /// Validate config, estimate elasticities and assemble the request.
    pub fn build(dataset: RegionDataset, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let base_year = config
            .base_year
            .or_else(|| dataset.latest_year())
            .ok_or_else(|| EngineError::Data("dataset has no observations".into()))?;

        // Estimation sees only what was known at the base year.
        let estimator = ElasticityEstimator::new(config.elasticity.clone());
        let estimates = estimator.estimate_all(&dataset.up_to(base_year))?;
        let request = build_request(&dataset, &estimates, &config, base_year)?;

        log::info!(
            "engine: built for {} regions, base year {base_year}, budget {:.2}",
            request.regions.len(),
            request.budget
        );
        Ok(Self {
            config,
            dataset,
            base_year,
            estimates,
            request,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dataset(&self) -> &RegionDataset {
        &self.dataset
    }

    pub fn base_year(&self) -> Year {
        self.base_year
    }

    pub fn estimates(&self) -> &[ElasticityEstimate] {
        &self.estimates
    }

    pub fn request(&self) -> &AllocationRequest {
        &self.request
    }

    pub fn optimize(&self) -> EngineResult<AllocationResult> {
        let result = optimizer::optimize(&self.request)?;
        log::info!(
            "engine: allocated {:.2} of {:.2}, lives saved {:.2}",
            result.total_invested,
            result.budget,
            result.lives_saved
        );
        Ok(result)
    }

    pub fn simulate(&self) -> EngineResult<MonteCarloResult> {
        monte_carlo::simulate(
            &self.request,
            &self.config.perturbation,
            self.config.trial_count,
            self.config.seed,
        )
    }

    fn planner(&self) -> MultiPeriodPlanner<'_> {
        MultiPeriodPlanner::new(self.config.planner.clone()).with_dataset(&self.dataset, self.base_year)
    }

    pub fn plan(&self, strategy: Strategy) -> EngineResult<MultiPeriodResult> {
        self.planner().plan(&self.request, self.config.horizon_years, strategy)
    }

    pub fn plan_all(&self) -> EngineResult<StrategyComparison> {
        self.planner().plan_all(&self.request, self.config.horizon_years)
    }

    pub fn score(&self) -> EngineResult<Vec<EfficiencyScore>> {
        efficiency::score_year(&self.dataset, self.config.efficiency, Some(self.base_year))
    }

    /// Run every stage and bundle the outputs.
    pub fn run(&self) -> EngineResult<EngineReport> {
        Ok(EngineReport {
            base_year:    self.base_year,
            budget:       self.request.budget,
            seed:         self.config.seed,
            elasticities: self.estimates.clone(),
            allocation:   self.optimize()?,
            monte_carlo:  self.simulate()?,
            strategies:   self.plan_all()?,
            efficiency:   self.score()?,
            priorities:   self.dataset.priority_ranking(Some(self.base_year))?,
        })
    }
}

/// Assemble the optimizer's view of each region at `base_year`.
pub fn build_request(
    dataset:   &RegionDataset,
    estimates: &[ElasticityEstimate],
    config:    &EngineConfig,
    base_year: Year,
) -> EngineResult<AllocationRequest> {
    let regions = dataset
        .snapshot(Some(base_year))?
        .into_iter()
        .map(|(code, obs)| {
            let estimate = estimates
                .iter()
                .find(|e| e.code == code)
                .ok_or_else(|| EngineError::Data(format!("{code}: missing elasticity estimate")))?;
            if obs.spending < optimizer::SPENDING_FLOOR {
                log::warn!(
                    "engine: {code} reports spending {} in {}, optimizer uses a {} unit floor",
                    obs.spending,
                    obs.year,
                    optimizer::SPENDING_FLOOR
                );
            }
            let (min, max) = config.bounds.bounds_for(code, config.budget);
            Ok(RegionState {
                code,
                population:           obs.population,
                spending:             obs.spending,
                deaths:               obs.violent_deaths as f64,
                elasticity:           estimate.reduction_elasticity(),
                elasticity_std_error: estimate.std_error,
                bounds:               InvestmentBounds::new(min, max),
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    Ok(AllocationRequest::new(config.budget, regions))
}
