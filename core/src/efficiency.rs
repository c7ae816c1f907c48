//! Efficiency scoring — ratio to the best observed region.
//!
//! score = w_o * (min_rate / rate) + w_c * (min_spc / spc)
//!
//! Each ratio lies in [0, 1]; a region holding both minima scores
//! exactly w_o + w_c = 1. A zero rate or zero spend per capita is
//! itself the minimum and counts as ratio 1. Used for ranking only,
//! never for allocation.

use crate::{
    config::EfficiencyWeights,
    dataset::RegionDataset,
    error::EngineResult,
    types::{RegionCode, Year},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EfficiencyScore {
    pub code:              RegionCode,
    pub score:             f64,
    /// 1 is the most efficient.
    pub rank:              usize,
    pub outcome_component: f64,
    pub cost_component:    f64,
    pub death_rate:        f64,
    pub spend_per_capita:  f64,
    pub violent_deaths:    u64,
    pub weights:           EfficiencyWeights,
}

/// Score every region on its latest observation.
pub fn score(
    dataset:        &RegionDataset,
    outcome_weight: f64,
    cost_weight:    f64,
) -> EngineResult<Vec<EfficiencyScore>> {
    score_year(dataset, EfficiencyWeights::new(outcome_weight, cost_weight)?, None)
}

/// Score every region on its observation at or before `year`.
pub fn score_year(
    dataset: &RegionDataset,
    weights: EfficiencyWeights,
    year:    Option<Year>,
) -> EngineResult<Vec<EfficiencyScore>> {
    weights.validate()?;
    let snapshot = dataset.snapshot(year)?;

    let min_rate = snapshot
        .iter()
        .map(|(_, o)| o.death_rate())
        .fold(f64::INFINITY, f64::min);
    let min_spc = snapshot
        .iter()
        .map(|(_, o)| o.spend_per_capita())
        .fold(f64::INFINITY, f64::min);

    let mut scores: Vec<EfficiencyScore> = snapshot
        .into_iter()
        .map(|(code, obs)| {
            let rate = obs.death_rate();
            let spc = obs.spend_per_capita();
            let outcome_component = weights.outcome_weight * best_ratio(min_rate, rate);
            let cost_component = weights.cost_weight * best_ratio(min_spc, spc);
            EfficiencyScore {
                code,
                score: outcome_component + cost_component,
                rank: 0,
                outcome_component,
                cost_component,
                death_rate: rate,
                spend_per_capita: spc,
                violent_deaths: obs.violent_deaths,
                weights,
            }
        })
        .collect();

    scores.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.violent_deaths.cmp(&b.violent_deaths))
            .then(a.code.cmp(&b.code))
    });
    for (i, s) in scores.iter_mut().enumerate() {
        s.rank = i + 1;
    }

    if let Some(top) = scores.first() {
        log::info!("efficiency: {} regions scored, top {} at {:.4}", scores.len(), top.code, top.score);
    }
    Ok(scores)
}

fn best_ratio(best: f64, value: f64) -> f64 {
    if value <= 0.0 {
        1.0
    } else {
        best / value
    }
}
