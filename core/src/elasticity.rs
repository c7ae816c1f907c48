//! Elasticity estimation — how a region's violence rate responds to spend.
//!
//! For each pair of consecutive calendar years we take
//!   x = relative spending change  (s_t - s_{t-1}) / s_{t-1}
//!   y = relative rate change      (r_t - r_{t-1}) / r_{t-1}
//! and fit y = beta * x through the origin. beta is the coefficient:
//! a percent change in the rate per percent change in spend, expected
//! negative. The optimizer works with the reduction elasticity -beta.
//!
//! Fallback chain when a region cannot be regressed (too few usable
//! pairs, or spending never changed):
//!   1. mean coefficient of regressed regions in the same macro-region
//!   2. mean coefficient of all regressed regions
//!   3. calibrated prior from spend per capita (0.08 to 0.15)

use crate::{
    config::ElasticityConfig,
    dataset::{RegionDataset, RegionSeries},
    error::{EngineError, EngineResult},
    types::{PeerGroup, RegionCode},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reduction elasticity at the lowest spend per capita.
pub const PRIOR_BASE: f64 = 0.08;
/// Extra reduction elasticity granted to the lowest spender.
pub const PRIOR_SPAN: f64 = 0.07;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Regressed,
    GroupProxy,
    CalibratedPrior,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElasticityEstimate {
    pub code:        RegionCode,
    /// Regression slope; negative means spend lowers the rate.
    pub coefficient: f64,
    pub provenance:  Provenance,
    /// Standard error of the slope, or spread of the proxy inputs.
    pub std_error:   Option<f64>,
    /// Delta pairs (regressed) or peer coefficients (proxy) used.
    pub sample_size: usize,
}

impl ElasticityEstimate {
    /// Fractional death reduction per unit of x_i / spending_i.
    pub fn reduction_elasticity(&self) -> f64 {
        -self.coefficient
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeFit {
    pub slope:     f64,
    pub std_error: Option<f64>,
    pub points:    usize,
}

/// Relative (spend, rate) changes across consecutive calendar years.
/// Pairs with a zero starting rate or zero starting spend are skipped.
pub fn delta_pairs(series: &RegionSeries) -> Vec<(f64, f64)> {
    series
        .observations()
        .windows(2)
        .filter(|w| w[0].year.checked_add(1) == Some(w[1].year))
        .filter_map(|w| {
            let (prev, cur) = (&w[0], &w[1]);
            let prev_rate = prev.death_rate();
            if prev.spending <= 0.0 || prev_rate <= 0.0 {
                return None;
            }
            let dx = (cur.spending - prev.spending) / prev.spending;
            let dy = (cur.death_rate() - prev_rate) / prev_rate;
            Some((dx, dy))
        })
        .collect()
}

/// Through-origin least squares. `None` when x has no variation.
pub fn fit_through_origin(points: &[(f64, f64)]) -> Option<SlopeFit> {
    let sxx: f64 = points.iter().map(|(x, _)| x * x).sum();
    if points.is_empty() || sxx <= f64::EPSILON {
        return None;
    }
    let sxy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let slope = sxy / sxx;

    let n = points.len();
    let std_error = if n >= 2 {
        let rss: f64 = points.iter().map(|(x, y)| (y - slope * x).powi(2)).sum();
        Some((rss / (n - 1) as f64 / sxx).sqrt())
    } else {
        None
    };

    Some(SlopeFit { slope, std_error, points: n })
}

/// Regressed coefficients and calibrated priors the fallback draws from.
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    by_group: BTreeMap<PeerGroup, Vec<f64>>,
    national: Vec<f64>,
    priors:   BTreeMap<RegionCode, f64>,
}

impl PeerTable {
    pub fn build(estimator: &ElasticityEstimator, dataset: &RegionDataset) -> EngineResult<Self> {
        let mut table = Self::default();
        for series in dataset.iter() {
            if let Some(fit) = estimator.fit(series) {
                table
                    .by_group
                    .entry(series.code.peer_group())
                    .or_default()
                    .push(fit.slope);
                table.national.push(fit.slope);
            }
        }
        table.priors = calibrated_priors(dataset)?;
        Ok(table)
    }

    pub fn group(&self, group: PeerGroup) -> &[f64] {
        self.by_group.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn national(&self) -> &[f64] {
        &self.national
    }
}

/// Reduction elasticity prior per region from latest spend per capita:
/// PRIOR_BASE + PRIOR_SPAN * (1 - normalized spc). Lower spenders are
/// assumed to have more headroom. Returned as regression coefficients.
pub fn calibrated_priors(dataset: &RegionDataset) -> EngineResult<BTreeMap<RegionCode, f64>> {
    let snapshot = dataset.snapshot(None)?;
    let spc: Vec<(RegionCode, f64)> = snapshot
        .iter()
        .map(|(code, obs)| (*code, obs.spend_per_capita()))
        .collect();
    let lo = spc.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min);
    let hi = spc.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);
    let range = hi - lo;

    Ok(spc
        .into_iter()
        .map(|(code, v)| {
            let norm = if range > 0.0 { (v - lo) / range } else { 0.5 };
            (code, -(PRIOR_BASE + PRIOR_SPAN * (1.0 - norm)))
        })
        .collect())
}

pub struct ElasticityEstimator {
    config: ElasticityConfig,
}

impl ElasticityEstimator {
    pub fn new(config: ElasticityConfig) -> Self {
        Self { config }
    }

    /// Slope for one series, if it has enough usable variation.
    pub fn fit(&self, series: &RegionSeries) -> Option<SlopeFit> {
        let pairs = delta_pairs(series);
        if pairs.len() < self.config.min_delta_pairs {
            return None;
        }
        fit_through_origin(&pairs)
    }

    /// Estimate one region, falling back to its peers when needed.
    pub fn estimate(&self, series: &RegionSeries, peers: &PeerTable) -> EngineResult<ElasticityEstimate> {
        let code = series.code;
        if let Some(fit) = self.fit(series) {
            return Ok(ElasticityEstimate {
                code,
                coefficient: fit.slope,
                provenance:  Provenance::Regressed,
                std_error:   fit.std_error,
                sample_size: fit.points,
            });
        }

        let group = code.peer_group();
        let group_pool = peers.group(group);
        let pool = if !group_pool.is_empty() {
            log::warn!("elasticity: {code} lacks usable history, using {} peer mean", group.label());
            group_pool
        } else {
            if !peers.national().is_empty() {
                log::warn!("elasticity: {code} has no regressed peers, using national mean");
            }
            peers.national()
        };

        if !pool.is_empty() {
            let (mean, spread) = mean_and_spread(pool);
            return Ok(ElasticityEstimate {
                code,
                coefficient: mean,
                provenance:  Provenance::GroupProxy,
                std_error:   spread,
                sample_size: pool.len(),
            });
        }

        let prior = peers.priors.get(&code).copied().ok_or_else(|| {
            EngineError::Data(format!("{code}: no calibrated prior available"))
        })?;
        log::warn!("elasticity: {code} falls back to calibrated prior {:.4}", -prior);
        Ok(ElasticityEstimate {
            code,
            coefficient: prior,
            provenance:  Provenance::CalibratedPrior,
            std_error:   None,
            sample_size: 0,
        })
    }

    /// Estimates for every region in the dataset, in code order.
    pub fn estimate_all(&self, dataset: &RegionDataset) -> EngineResult<Vec<ElasticityEstimate>> {
        let peers = PeerTable::build(self, dataset)?;
        let estimates = dataset
            .iter()
            .map(|series| self.estimate(series, &peers))
            .collect::<EngineResult<Vec<_>>>()?;

        let regressed = estimates
            .iter()
            .filter(|e| e.provenance == Provenance::Regressed)
            .count();
        log::info!(
            "elasticity: {} regions estimated, {regressed} regressed, {} via fallback",
            estimates.len(),
            estimates.len() - regressed
        );
        Ok(estimates)
    }
}

fn mean_and_spread(values: &[f64]) -> (f64, Option<f64>) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let spread = if values.len() >= 2 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(var.sqrt())
    } else {
        None
    };
    (mean, spread)
}
