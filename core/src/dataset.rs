//! Region dataset — validated per-region, per-year observations.
//!
//! This is the only input the engine trusts. Raw tabular sources are
//! parsed elsewhere and handed over as `DatasetRecord`s; everything
//! that reaches the optimizer has passed through `from_records`.
//!
//! The dataset is never mutated after construction. Later stages
//! derive their own state records from it.

use crate::{
    error::{EngineError, EngineResult},
    types::{RegionCode, Year, RATE_BASE},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row at the ingestion boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetRecord {
    pub region_code:    RegionCode,
    pub year:           Year,
    pub population:     u64,
    pub spending:       f64,
    pub violent_deaths: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub year:           Year,
    pub population:     u64,
    pub spending:       f64,
    pub violent_deaths: u64,
}

impl Observation {
    /// Violent deaths per 100k inhabitants.
    pub fn death_rate(&self) -> f64 {
        self.violent_deaths as f64 / self.population as f64 * RATE_BASE
    }

    pub fn spend_per_capita(&self) -> f64 {
        self.spending / self.population as f64
    }

    pub fn spending_millions(&self) -> f64 {
        self.spending / 1e6
    }

    /// High violence with low investment scores high.
    /// `None` when the region spends nothing (the ratio is unbounded).
    pub fn priority_index(&self) -> Option<f64> {
        let spc = self.spend_per_capita();
        if spc > 0.0 {
            Some(self.death_rate() / spc * 100.0)
        } else {
            None
        }
    }
}

/// All observations of one region, sorted by year, years unique.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegionSeries {
    pub code:         RegionCode,
    observations:     Vec<Observation>,
}

impl RegionSeries {
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Most recent observation. Series are never empty.
    pub fn latest(&self) -> &Observation {
        &self.observations[self.observations.len() - 1]
    }

    pub fn at(&self, year: Year) -> Option<&Observation> {
        self.observations
            .binary_search_by_key(&year, |o| o.year)
            .ok()
            .map(|i| &self.observations[i])
    }

    /// Latest observation at or before `year`.
    pub fn as_of(&self, year: Year) -> Option<&Observation> {
        self.observations.iter().rev().find(|o| o.year <= year)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorityEntry {
    pub code:             RegionCode,
    pub death_rate:       f64,
    pub spend_per_capita: f64,
    pub priority_index:   f64,
}

/// Only constructible through `from_records`, so it is not `Deserialize`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RegionDataset {
    regions: BTreeMap<RegionCode, RegionSeries>,
}

impl RegionDataset {
    /// Validate and group raw records. Fails on the first bad record.
    pub fn from_records<I>(records: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = DatasetRecord>,
    {
        let mut grouped: BTreeMap<RegionCode, BTreeMap<Year, Observation>> = BTreeMap::new();

        for rec in records {
            if rec.population == 0 {
                return Err(EngineError::Data(format!(
                    "{} {}: population must be positive",
                    rec.region_code, rec.year
                )));
            }
            if !rec.spending.is_finite() || rec.spending < 0.0 {
                return Err(EngineError::Data(format!(
                    "{} {}: spending must be finite and non-negative, got {}",
                    rec.region_code, rec.year, rec.spending
                )));
            }
            let years = grouped.entry(rec.region_code).or_default();
            if years.contains_key(&rec.year) {
                return Err(EngineError::Data(format!(
                    "{} {}: duplicate year",
                    rec.region_code, rec.year
                )));
            }
            years.insert(
                rec.year,
                Observation {
                    year:           rec.year,
                    population:     rec.population,
                    spending:       rec.spending,
                    violent_deaths: rec.violent_deaths,
                },
            );
        }

        let regions = grouped
            .into_iter()
            .map(|(code, years)| {
                let observations = years.into_values().collect();
                (code, RegionSeries { code, observations })
            })
            .collect::<BTreeMap<_, _>>();

        log::debug!("dataset: loaded {} regions", regions.len());
        Ok(Self { regions })
    }

    /// Parse a JSON array of records and validate it.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let records: Vec<DatasetRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// Copy holding only observations at or before `year`.
    /// Regions with nothing that early are left out.
    pub fn up_to(&self, year: Year) -> Self {
        let regions = self
            .regions
            .iter()
            .filter_map(|(code, series)| {
                let observations: Vec<Observation> = series
                    .observations
                    .iter()
                    .filter(|o| o.year <= year)
                    .copied()
                    .collect();
                (!observations.is_empty()).then(|| (*code, RegionSeries { code: *code, observations }))
            })
            .collect();
        Self { regions }
    }

    pub fn series(&self, code: RegionCode) -> Option<&RegionSeries> {
        self.regions.get(&code)
    }

    /// Regions in canonical code order.
    pub fn iter(&self) -> impl Iterator<Item = &RegionSeries> {
        self.regions.values()
    }

    pub fn codes(&self) -> impl Iterator<Item = RegionCode> + '_ {
        self.regions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Latest year observed by any region.
    pub fn latest_year(&self) -> Option<Year> {
        self.regions.values().map(|s| s.latest().year).max()
    }

    /// One observation per region: the latest at or before `year`,
    /// or the latest overall when `year` is `None`.
    pub fn snapshot(&self, year: Option<Year>) -> EngineResult<Vec<(RegionCode, Observation)>> {
        if self.regions.is_empty() {
            return Err(EngineError::Data("dataset has no regions".into()));
        }
        self.regions
            .values()
            .map(|s| {
                let obs = match year {
                    Some(y) => s.as_of(y).ok_or_else(|| {
                        EngineError::Data(format!("{}: no observation at or before {y}", s.code))
                    })?,
                    None => s.latest(),
                };
                Ok((s.code, *obs))
            })
            .collect()
    }

    /// Regions ordered by descending priority index for a year.
    /// Regions with zero spending are listed first (unbounded priority).
    pub fn priority_ranking(&self, year: Option<Year>) -> EngineResult<Vec<PriorityEntry>> {
        let mut entries: Vec<PriorityEntry> = self
            .snapshot(year)?
            .into_iter()
            .map(|(code, obs)| PriorityEntry {
                code,
                death_rate:       obs.death_rate(),
                spend_per_capita: obs.spend_per_capita(),
                priority_index:   obs.priority_index().unwrap_or(f64::INFINITY),
            })
            .collect();
        entries.sort_by(|a, b| {
            b.priority_index
                .total_cmp(&a.priority_index)
                .then(a.code.cmp(&b.code))
        });
        Ok(entries)
    }
}
