//! Multi-period planner — splits a total budget across a horizon.
//!
//! Each strategy is a normalized weight curve over the years. Year t
//! gets `total * w_t` and per-region bounds scaled by the same `w_t`,
//! then the optimizer runs against the state left by year t - 1.
//!
//! State carried between years:
//!   - deaths: the previous year's projected deaths, rescaled by the
//!     population ratio so the rate carries over
//!   - population, spending: the dataset's next-year observation when
//!     present, otherwise unchanged
//!
//! Lives saved in a year are measured against a no-intervention
//! trajectory that follows the same population path. Reductions persist,
//! so money spent early keeps paying off in later years.

use crate::{
    config::{PlannerConfig, TieBreak},
    dataset::RegionDataset,
    error::{EngineError, EngineResult},
    optimizer::{self, AllocationRequest, AllocationResult, CapPolicy, RegionState},
    types::Year,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const MAX_HORIZON: u32 = 50;

const RANK_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Uniform,
    Frontloaded,
    Backloaded,
    LinearIncreasing,
}

impl Strategy {
    /// Declaration order, also the last-resort tie order.
    pub const ALL: [Strategy; 4] = [
        Self::Uniform,
        Self::Frontloaded,
        Self::Backloaded,
        Self::LinearIncreasing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uniform          => "uniform",
            Self::Frontloaded      => "frontloaded",
            Self::Backloaded       => "backloaded",
            Self::LinearIncreasing => "linear-increasing",
        }
    }

    fn declaration_index(&self) -> usize {
        match self {
            Self::Uniform          => 0,
            Self::Frontloaded      => 1,
            Self::Backloaded       => 2,
            Self::LinearIncreasing => 3,
        }
    }

    /// Yearly weights summing to 1.
    ///
    /// Frontloaded is geometric, `decay^t`; Backloaded is its mirror.
    /// LinearIncreasing is proportional to `t + 1`.
    pub fn weights(&self, horizon: u32, decay: f64) -> Vec<f64> {
        let h = horizon as usize;
        let raw: Vec<f64> = match self {
            Self::Uniform => vec![1.0; h],
            Self::Frontloaded => (0..h).map(|t| decay.powi(t as i32)).collect(),
            Self::Backloaded => (0..h).rev().map(|t| decay.powi(t as i32)).collect(),
            Self::LinearIncreasing => (1..=h).map(|t| t as f64).collect(),
        };
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|w| w / total).collect()
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|st| st.name() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown strategy '{s}'"))
    }
}

/// Split `total` by `weights`; the last year absorbs rounding.
pub fn split_budget(total: f64, weights: &[f64]) -> Vec<f64> {
    let mut budgets: Vec<f64> = weights.iter().map(|w| total * w).collect();
    if let Some((last, head)) = budgets.split_last_mut() {
        let head_sum: f64 = head.iter().sum();
        *last = (total - head_sum).max(0.0);
    }
    budgets
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YearPlan {
    pub year_index:             u32,
    pub year:                   Option<Year>,
    pub weight:                 f64,
    pub sub_budget:             f64,
    pub allocation:             AllocationResult,
    /// Deaths had nothing been invested in any year.
    pub counterfactual_deaths:  f64,
    pub lives_saved:            f64,
    pub cumulative_lives_saved: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiPeriodResult {
    pub strategy:               Strategy,
    pub horizon_years:          u32,
    pub total_budget:           f64,
    pub years:                  Vec<YearPlan>,
    pub cumulative_lives_saved: f64,
}

impl MultiPeriodResult {
    pub fn sub_budget_total(&self) -> f64 {
        self.years.iter().map(|y| y.sub_budget).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyComparison {
    pub tie_break: TieBreak,
    /// Best strategy first.
    pub ranked:    Vec<MultiPeriodResult>,
}

impl StrategyComparison {
    pub fn best(&self) -> Option<&MultiPeriodResult> {
        self.ranked.first()
    }
}

pub struct MultiPeriodPlanner<'a> {
    config:  PlannerConfig,
    outlook: Option<(&'a RegionDataset, Year)>,
}

impl<'a> MultiPeriodPlanner<'a> {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config, outlook: None }
    }

    /// Take later years' population and spending from `dataset`,
    /// counting from `base_year` (the year of the request's state).
    pub fn with_dataset(mut self, dataset: &'a RegionDataset, base_year: Year) -> Self {
        self.outlook = Some((dataset, base_year));
        self
    }

    pub fn plan(
        &self,
        request:       &AllocationRequest,
        horizon_years: u32,
        strategy:      Strategy,
    ) -> EngineResult<MultiPeriodResult> {
        if horizon_years == 0 || horizon_years > MAX_HORIZON {
            return Err(EngineError::InvalidConfig(format!(
                "horizon_years must be in 1..={MAX_HORIZON}, got {horizon_years}"
            )));
        }
        self.config.validate()?;
        request.validate()?;

        let weights = strategy.weights(horizon_years, self.config.frontload_decay);
        let budgets = split_budget(request.budget, &weights);

        let mut state: Vec<RegionState> = request.regions.clone();
        let mut counterfactual: Vec<f64> = state.iter().map(|r| r.deaths).collect();
        let mut years = Vec::with_capacity(horizon_years as usize);
        let mut cumulative = 0.0;

        for t in 0..horizon_years {
            let calendar_year = self.calendar_year(t);
            if t > 0 {
                self.advance(&mut state, &mut counterfactual, calendar_year);
            }

            let w = weights[t as usize];
            let year_request = AllocationRequest::new(
                budgets[t as usize],
                state
                    .iter()
                    .zip(&request.regions)
                    .map(|(s, original)| RegionState {
                        bounds: original.bounds.scaled(w),
                        ..s.clone()
                    })
                    .collect(),
            );
            // Year 0 is the caller's state; later years are derived and may
            // have lost spending headroom.
            let policy = if t == 0 {
                CapPolicy::Strict
            } else {
                for r in &year_request.regions {
                    if r.bounds.min > r.effect_cap() {
                        log::warn!(
                            "planner: {} year {t} floor {:.2} above effect cap {:.2}, pinned at floor",
                            r.code,
                            r.bounds.min,
                            r.effect_cap()
                        );
                    }
                }
                CapPolicy::FloorWins
            };
            let allocation = optimizer::optimize_with(&year_request, policy)?;

            let counterfactual_deaths: f64 = counterfactual.iter().sum();
            let lives_saved = counterfactual_deaths - allocation.projected_deaths;
            cumulative += lives_saved;

            for (region, a) in state.iter_mut().zip(&allocation.allocations) {
                region.deaths = a.projected_deaths;
            }

            log::debug!(
                "planner: {} year {t} budget={:.2} saved={lives_saved:.2} cumulative={cumulative:.2}",
                strategy.name(),
                budgets[t as usize]
            );

            years.push(YearPlan {
                year_index: t,
                year: calendar_year,
                weight: w,
                sub_budget: budgets[t as usize],
                allocation,
                counterfactual_deaths,
                lives_saved,
                cumulative_lives_saved: cumulative,
            });
        }

        Ok(MultiPeriodResult {
            strategy,
            horizon_years,
            total_budget: request.budget,
            years,
            cumulative_lives_saved: cumulative,
        })
    }

    /// Run every strategy and rank them. Strategies are independent,
    /// so they may run in parallel; ranking does not depend on order.
    pub fn plan_all(
        &self,
        request:       &AllocationRequest,
        horizon_years: u32,
    ) -> EngineResult<StrategyComparison> {
        let results: Vec<MultiPeriodResult> = if self.config.parallel {
            Strategy::ALL
                .par_iter()
                .map(|s| self.plan(request, horizon_years, *s))
                .collect::<EngineResult<Vec<_>>>()?
        } else {
            Strategy::ALL
                .iter()
                .map(|s| self.plan(request, horizon_years, *s))
                .collect::<EngineResult<Vec<_>>>()?
        };

        let ranked = rank_strategies(results, self.config.tie_break);
        if let Some(best) = ranked.first() {
            log::info!(
                "planner: best strategy {} saves {:.2} over {horizon_years} years",
                best.strategy.name(),
                best.cumulative_lives_saved
            );
        }
        Ok(StrategyComparison {
            tie_break: self.config.tie_break,
            ranked,
        })
    }

    fn calendar_year(&self, offset: u32) -> Option<Year> {
        let (_, base) = self.outlook?;
        base.checked_add(Year::try_from(offset).ok()?)
    }

    fn advance(&self, state: &mut [RegionState], counterfactual: &mut [f64], year: Option<Year>) {
        let Some((dataset, _)) = self.outlook else {
            return;
        };
        let Some(year) = year else {
            return;
        };
        for (region, cf) in state.iter_mut().zip(counterfactual.iter_mut()) {
            let Some(obs) = dataset.series(region.code).and_then(|s| s.at(year)) else {
                continue;
            };
            let ratio = obs.population as f64 / region.population as f64;
            region.deaths *= ratio;
            *cf *= ratio;
            region.population = obs.population;
            region.spending = obs.spending;
        }
    }
}

/// Order by cumulative lives saved, best first, then by `tie_break`.
pub fn rank_strategies(mut results: Vec<MultiPeriodResult>, tie_break: TieBreak) -> Vec<MultiPeriodResult> {
    results.sort_by(|a, b| {
        let primary = compare_desc(a.cumulative_lives_saved, b.cumulative_lives_saved);
        if primary != Ordering::Equal {
            return primary;
        }
        let secondary = match tie_break {
            TieBreak::EarlierImpact => a
                .years
                .iter()
                .zip(&b.years)
                .map(|(ya, yb)| compare_desc(ya.cumulative_lives_saved, yb.cumulative_lives_saved))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal),
            TieBreak::DeclarationOrder => Ordering::Equal,
        };
        secondary.then(
            a.strategy
                .declaration_index()
                .cmp(&b.strategy.declaration_index()),
        )
    });
    results
}

/// Descending comparison that treats near-equal values as equal.
fn compare_desc(a: f64, b: f64) -> Ordering {
    let tol = RANK_TOLERANCE * a.abs().max(b.abs()).max(1.0);
    if (a - b).abs() <= tol {
        Ordering::Equal
    } else {
        b.total_cmp(&a)
    }
}
