use crate::{
    error::{EngineError, EngineResult},
    types::{RegionCode, Year},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Allocation bounds ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundOverride {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundsConfig {
    #[serde(default)]
    pub default_min: f64,
    /// `None` means "up to the whole budget".
    #[serde(default)]
    pub default_max: Option<f64>,
    #[serde(default)]
    pub overrides: BTreeMap<RegionCode, BoundOverride>,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            default_min: 0.0,
            default_max: None,
            overrides:   BTreeMap::new(),
        }
    }
}

impl BoundsConfig {
    /// (min, max) for one region under a given budget.
    pub fn bounds_for(&self, code: RegionCode, budget: f64) -> (f64, f64) {
        match self.overrides.get(&code) {
            Some(o) => (o.min, o.max),
            None => (self.default_min, self.default_max.unwrap_or(budget)),
        }
    }
}

// ── Elasticity estimation ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElasticityConfig {
    /// Usable consecutive-year pairs needed before a slope is trusted.
    pub min_delta_pairs: usize,
}

impl Default for ElasticityConfig {
    fn default() -> Self {
        Self { min_delta_pairs: 1 }
    }
}

// ── Monte Carlo perturbation ───────────────────────────────────────

/// How each trial turns perturbed parameters into an outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationMode {
    /// Re-run the optimizer on every trial's parameters.
    #[default]
    Reoptimize,
    /// Keep the point-estimate allocation and only re-project deaths.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerturbationConfig {
    /// Std-dev multiplier on each region's elasticity uncertainty scale.
    pub elasticity_spread: f64,
    /// Relative std-dev of baseline deaths; 0 disables the draw.
    #[serde(default)]
    pub baseline_deaths_spread: f64,
    #[serde(default)]
    pub mode: AllocationMode,
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for PerturbationConfig {
    fn default() -> Self {
        Self {
            elasticity_spread:      0.25,
            baseline_deaths_spread: 0.0,
            mode:                   AllocationMode::Reoptimize,
            parallel:               true,
        }
    }
}

impl PerturbationConfig {
    pub fn validate(&self) -> EngineResult<()> {
        for (name, v) in [
            ("elasticity_spread", self.elasticity_spread),
            ("baseline_deaths_spread", self.baseline_deaths_spread),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {v}"
                )));
            }
        }
        Ok(())
    }
}

// ── Multi-period planning ──────────────────────────────────────────

/// How strategies with equal cumulative lives saved are ordered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Prefer the strategy whose savings arrive sooner.
    #[default]
    EarlierImpact,
    /// Keep the order strategies were declared in.
    DeclarationOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannerConfig {
    /// Geometric ratio of the front-loaded curve, in (0, 1).
    pub frontload_decay: f64,
    #[serde(default)]
    pub tie_break: TieBreak,
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            frontload_decay: 0.7,
            tie_break:       TieBreak::EarlierImpact,
            parallel:        true,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.frontload_decay > 0.0 && self.frontload_decay < 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "frontload_decay must lie in (0, 1), got {}",
                self.frontload_decay
            )));
        }
        Ok(())
    }
}

// ── Efficiency scoring ─────────────────────────────────────────────

pub const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EfficiencyWeights {
    pub outcome_weight: f64,
    pub cost_weight:    f64,
}

impl Default for EfficiencyWeights {
    fn default() -> Self {
        Self {
            outcome_weight: 0.75,
            cost_weight:    0.25,
        }
    }
}

impl EfficiencyWeights {
    pub fn new(outcome_weight: f64, cost_weight: f64) -> EngineResult<Self> {
        let w = Self { outcome_weight, cost_weight };
        w.validate()?;
        Ok(w)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        let sums_to_one = (self.outcome_weight + self.cost_weight - 1.0).abs() <= WEIGHT_TOLERANCE;
        if in_unit(self.outcome_weight) && in_unit(self.cost_weight) && sums_to_one {
            Ok(())
        } else {
            Err(EngineError::InvalidWeight {
                outcome_weight: self.outcome_weight,
                cost_weight:    self.cost_weight,
            })
        }
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub budget: f64,
    /// Snapshot year for the current state; latest available when absent.
    #[serde(default)]
    pub base_year: Option<Year>,
    #[serde(default)]
    pub bounds: BoundsConfig,
    #[serde(default)]
    pub elasticity: ElasticityConfig,
    #[serde(default)]
    pub perturbation: PerturbationConfig,
    #[serde(default = "default_trial_count")]
    pub trial_count: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_horizon")]
    pub horizon_years: u32,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub efficiency: EfficiencyWeights,
}

fn default_true() -> bool {
    true
}

fn default_trial_count() -> usize {
    1_000
}

fn default_horizon() -> u32 {
    4
}

impl EngineConfig {
    /// Load from a JSON file.
    /// In tests, use EngineConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on anything the stages would reject later.
    pub fn validate(&self) -> EngineResult<()> {
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "budget must be finite and non-negative, got {}",
                self.budget
            )));
        }
        if self.trial_count == 0 {
            return Err(EngineError::InvalidConfig("trial_count must be >= 1".into()));
        }
        if self.horizon_years == 0 {
            return Err(EngineError::InvalidConfig("horizon_years must be >= 1".into()));
        }
        if self.elasticity.min_delta_pairs == 0 {
            return Err(EngineError::InvalidConfig("min_delta_pairs must be >= 1".into()));
        }
        self.perturbation.validate()?;
        self.planner.validate()?;
        self.efficiency.validate()?;
        Ok(())
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            budget:        1_000_000.0,
            base_year:     None,
            bounds:        BoundsConfig::default(),
            elasticity:    ElasticityConfig::default(),
            perturbation:  PerturbationConfig {
                parallel: false,
                ..PerturbationConfig::default()
            },
            trial_count:   200,
            seed:          42,
            horizon_years: 4,
            planner:       PlannerConfig::default(),
            efficiency:    EfficiencyWeights::default(),
        }
    }
}
