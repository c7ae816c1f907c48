//! Allocation optimizer — bounded linear program over extra investment.
//!
//! minimize   sum_i d_i * (1 - e_i * x_i / s_i)
//! subject to sum_i x_i <= B
//!            min_i <= x_i <= max_i
//!            e_i * x_i / s_i <= 1          (no region below zero deaths)
//!
//! The last row is a pure bound on x_i once e_i and s_i are fixed, so
//! the program has box constraints plus a single coupling row. Its
//! optimum is reached by raising every variable to its floor and then
//! filling the remaining budget in descending order of the objective
//! coefficient d_i * e_i / s_i. At most one variable ends strictly
//! between its bounds, so the result is a basic feasible solution.
//! Ties go to the earlier variable in request order, which makes the
//! output a pure function of the request.
//!
//! A floor above the effect cap is `Infeasible` for a caller's request.
//! Derived solves (Monte Carlo trials, later planning years) use
//! `CapPolicy::FloorWins` instead: the region is pinned at its floor and
//! its projected deaths clamp at zero.

use crate::{
    error::{EngineError, EngineResult},
    types::RegionCode,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Spending below this is treated as this many currency units.
/// Keeps the reduction term and the effect cap finite.
pub const SPENDING_FLOOR: f64 = 1.0;

/// Absolute slack on budget comparisons, scaled by max(1, budget).
pub const BUDGET_TOLERANCE: f64 = 1e-9;

/// What to do when a region's floor lies above its effect cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapPolicy {
    /// Fail with `Infeasible`.
    #[default]
    Strict,
    /// Raise the cap to the floor.
    FloorWins,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct InvestmentBounds {
    pub min: f64,
    pub max: f64,
}

impl InvestmentBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            min: self.min * factor,
            max: self.max * factor,
        }
    }
}

/// Current state of one region as seen by the optimizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionState {
    pub code:                 RegionCode,
    pub population:           u64,
    pub spending:             f64,
    pub deaths:               f64,
    /// Reduction elasticity: fraction of deaths removed per unit x / spending.
    pub elasticity:           f64,
    pub elasticity_std_error: Option<f64>,
    pub bounds:               InvestmentBounds,
}

impl RegionState {
    pub fn effective_spending(&self) -> f64 {
        self.spending.max(SPENDING_FLOOR)
    }

    pub fn reduction_fraction(&self, investment: f64) -> f64 {
        self.elasticity * investment / self.effective_spending()
    }

    /// Deaths after investing `investment`, never below zero.
    pub fn projected_deaths(&self, investment: f64) -> f64 {
        (self.deaths * (1.0 - self.reduction_fraction(investment))).max(0.0)
    }

    /// Objective decrease per unit of investment.
    pub fn marginal_benefit(&self) -> f64 {
        self.deaths * self.elasticity / self.effective_spending()
    }

    /// Largest investment with reduction fraction <= 1.
    pub fn effect_cap(&self) -> f64 {
        if self.elasticity > 0.0 {
            self.effective_spending() / self.elasticity
        } else {
            f64::INFINITY
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationRequest {
    pub budget:  f64,
    /// Variable order for the solver.
    pub regions: Vec<RegionState>,
}

impl AllocationRequest {
    pub fn new(budget: f64, regions: Vec<RegionState>) -> Self {
        Self { budget, regions }
    }

    pub fn baseline_deaths(&self) -> f64 {
        self.regions.iter().map(|r| r.deaths).sum()
    }

    pub fn floor_total(&self) -> f64 {
        self.regions.iter().map(|r| r.bounds.min).sum()
    }

    fn tolerance(&self) -> f64 {
        BUDGET_TOLERANCE * self.budget.max(1.0)
    }

    /// Caller-input checks. Runs before any computation.
    pub fn validate(&self) -> EngineResult<()> {
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "budget must be finite and non-negative, got {}",
                self.budget
            )));
        }

        let mut seen = BTreeSet::new();
        for r in &self.regions {
            if !seen.insert(r.code) {
                return Err(EngineError::Data(format!("{}: region listed twice", r.code)));
            }
            let InvestmentBounds { min, max } = r.bounds;
            if !min.is_finite() || max.is_nan() || min < 0.0 || min > max {
                return Err(EngineError::UnboundedBounds { region: r.code, min, max });
            }
            if !r.spending.is_finite() || r.spending < 0.0 {
                return Err(EngineError::Data(format!(
                    "{}: spending must be finite and non-negative, got {}",
                    r.code, r.spending
                )));
            }
            if !r.deaths.is_finite() || r.deaths < 0.0 {
                return Err(EngineError::Data(format!(
                    "{}: deaths must be finite and non-negative, got {}",
                    r.code, r.deaths
                )));
            }
            if !r.elasticity.is_finite() {
                return Err(EngineError::Data(format!(
                    "{}: elasticity must be finite, got {}",
                    r.code, r.elasticity
                )));
            }
        }

        let floors = self.floor_total();
        if floors > self.budget + self.tolerance() {
            return Err(EngineError::Infeasible(format!(
                "floors require {floors:.2} but budget is {:.2}",
                self.budget
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionAllocation {
    pub code:             RegionCode,
    pub investment:       f64,
    pub baseline_deaths:  f64,
    pub projected_deaths: f64,
    pub lives_saved:      f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationResult {
    pub budget:           f64,
    pub total_invested:   f64,
    pub baseline_deaths:  f64,
    pub projected_deaths: f64,
    pub lives_saved:      f64,
    pub allocations:      Vec<RegionAllocation>,
}

impl AllocationResult {
    pub fn investment(&self, code: RegionCode) -> Option<f64> {
        self.allocations
            .iter()
            .find(|a| a.code == code)
            .map(|a| a.investment)
    }

    pub fn unspent(&self) -> f64 {
        (self.budget - self.total_invested).max(0.0)
    }
}

/// Solve the allocation program for `request`.
pub fn optimize(request: &AllocationRequest) -> EngineResult<AllocationResult> {
    optimize_with(request, CapPolicy::Strict)
}

/// Solve with an explicit policy for floors above the effect cap.
pub fn optimize_with(request: &AllocationRequest, policy: CapPolicy) -> EngineResult<AllocationResult> {
    request.validate()?;

    let lower: Vec<f64> = request.regions.iter().map(|r| r.bounds.min).collect();
    let mut upper = Vec::with_capacity(request.regions.len());
    for r in &request.regions {
        if r.spending < SPENDING_FLOOR && r.elasticity != 0.0 {
            log::debug!(
                "optimizer: {} spending {} below floor, using {SPENDING_FLOOR}",
                r.code,
                r.spending
            );
        }
        let cap = r.effect_cap();
        if r.bounds.min > cap + request.tolerance() {
            match policy {
                CapPolicy::Strict => {
                    return Err(EngineError::Infeasible(format!(
                        "{} floor {:.2} exceeds its effect cap {:.2}",
                        r.code, r.bounds.min, cap
                    )));
                }
                CapPolicy::FloorWins => log::debug!(
                    "optimizer: {} pinned at floor {:.2} above effect cap {:.2}",
                    r.code,
                    r.bounds.min,
                    cap
                ),
            }
        }
        upper.push(r.bounds.max.min(cap).max(r.bounds.min));
    }
    let benefit: Vec<f64> = request.regions.iter().map(RegionState::marginal_benefit).collect();

    let x = solve_bounded_lp(&benefit, &lower, &upper, request.budget, request.tolerance());
    Ok(assemble(request, &x))
}

/// Project deaths for a fixed allocation without optimizing.
/// `investments` follows the request's region order.
pub fn project(request: &AllocationRequest, investments: &[f64]) -> EngineResult<AllocationResult> {
    if investments.len() != request.regions.len() {
        return Err(EngineError::InvalidConfig(format!(
            "allocation has {} entries for {} regions",
            investments.len(),
            request.regions.len()
        )));
    }
    Ok(assemble(request, investments))
}

/// Maximize sum benefit_i * x_i with lower <= x <= upper and sum x <= budget.
/// Assumes sum lower <= budget and lower <= upper.
fn solve_bounded_lp(
    benefit: &[f64],
    lower:   &[f64],
    upper:   &[f64],
    budget:  f64,
    tolerance: f64,
) -> Vec<f64> {
    let mut x = lower.to_vec();
    let mut remaining = budget - lower.iter().sum::<f64>();
    if remaining <= tolerance {
        return x;
    }

    let mut order: Vec<usize> = (0..benefit.len()).filter(|&i| benefit[i] > 0.0).collect();
    // Stable sort keeps request order among equal coefficients.
    order.sort_by(|&a, &b| benefit[b].total_cmp(&benefit[a]));

    for i in order {
        if remaining <= 0.0 {
            break;
        }
        let room = upper[i] - x[i];
        if room <= 0.0 {
            continue;
        }
        let take = room.min(remaining);
        x[i] += take;
        remaining -= take;
    }
    x
}

fn assemble(request: &AllocationRequest, x: &[f64]) -> AllocationResult {
    let allocations: Vec<RegionAllocation> = request
        .regions
        .iter()
        .zip(x)
        .map(|(r, &investment)| {
            let projected = r.projected_deaths(investment);
            RegionAllocation {
                code:             r.code,
                investment,
                baseline_deaths:  r.deaths,
                projected_deaths: projected,
                lives_saved:      r.deaths - projected,
            }
        })
        .collect();

    let baseline_deaths = request.baseline_deaths();
    let projected_deaths: f64 = allocations.iter().map(|a| a.projected_deaths).sum();
    AllocationResult {
        budget: request.budget,
        total_invested: allocations.iter().map(|a| a.investment).sum(),
        baseline_deaths,
        projected_deaths,
        lives_saved: baseline_deaths - projected_deaths,
        allocations,
    }
}
