//! End-to-end engine tests — build, run every stage, config loading.

use safebudget_core::{
    config::{BoundOverride, EfficiencyWeights, EngineConfig},
    dataset::{DatasetRecord, RegionDataset},
    elasticity::Provenance,
    engine::AllocationEngine,
    planner::Strategy,
    types::{RegionCode, Year},
    EngineError,
};
use std::path::PathBuf;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn series(code: RegionCode, population: u64, rows: &[(Year, f64, u64)]) -> Vec<DatasetRecord> {
    rows.iter()
        .map(|&(year, spending, deaths)| DatasetRecord {
            region_code: code,
            year,
            population,
            spending,
            violent_deaths: deaths,
        })
        .collect()
}

/// Six regions over 2019-2022. PE has flat spending, AC a single year.
fn sample_records() -> Vec<DatasetRecord> {
    let mut records = Vec::new();
    records.extend(series(RegionCode::BA, 14_000_000, &[
        (2019, 3.0e9, 6_000),
        (2020, 3.3e9, 5_700),
        (2021, 3.5e9, 5_600),
        (2022, 3.9e9, 5_200),
    ]));
    records.extend(series(RegionCode::CE, 9_000_000, &[
        (2019, 1.8e9, 4_000),
        (2020, 2.0e9, 3_700),
        (2021, 2.1e9, 3_650),
        (2022, 2.2e9, 3_500),
    ]));
    records.extend(series(RegionCode::PE, 9_500_000, &[
        (2019, 2.5e9, 3_500),
        (2020, 2.5e9, 3_400),
        (2021, 2.5e9, 3_450),
        (2022, 2.5e9, 3_300),
    ]));
    records.extend(series(RegionCode::SP, 46_000_000, &[
        (2019, 12.0e9, 3_800),
        (2020, 12.5e9, 3_700),
        (2021, 13.0e9, 3_600),
        (2022, 13.4e9, 3_500),
    ]));
    records.extend(series(RegionCode::RJ, 17_000_000, &[
        (2019, 6.0e9, 5_000),
        (2020, 6.2e9, 4_800),
        (2021, 6.0e9, 4_900),
        (2022, 6.5e9, 4_500),
    ]));
    records.extend(series(RegionCode::AC, 900_000, &[(2019, 0.4e9, 350)]));
    records
}

fn sample_dataset() -> RegionDataset {
    RegionDataset::from_records(sample_records()).unwrap()
}

fn build_engine(config: EngineConfig) -> AllocationEngine {
    AllocationEngine::build(sample_dataset(), config).unwrap()
}

fn temp_file(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("safebudget-{name}-{}.json", std::process::id()));
    std::fs::write(&path, content).unwrap();
    path
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn full_run_covers_every_stage() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = EngineConfig::default_test();
    let engine = build_engine(config.clone());
    let report = engine.run().unwrap();

    assert_eq!(report.base_year, 2022);
    assert_eq!(report.seed, config.seed);
    assert_eq!(report.elasticities.len(), 6);

    assert!(report.allocation.total_invested <= config.budget * (1.0 + 1e-9));
    assert!(report.allocation.lives_saved >= 0.0);
    assert_eq!(report.allocation.allocations.len(), 6);

    assert_eq!(report.monte_carlo.trial_count, config.trial_count);
    assert_eq!(report.monte_carlo.outcomes.len(), config.trial_count);
    assert_eq!(report.monte_carlo.point_estimate, report.allocation.lives_saved);

    assert_eq!(report.strategies.ranked.len(), Strategy::ALL.len());
    for plan in &report.strategies.ranked {
        assert_eq!(plan.years.len(), config.horizon_years as usize);
    }

    let ranks: Vec<usize> = report.efficiency.iter().map(|s| s.rank).collect();
    assert_eq!(ranks, (1..=6).collect::<Vec<_>>());
    assert_eq!(report.priorities.len(), 6);
}

#[test]
fn elasticity_provenance_matches_available_history() {
    let engine = build_engine(EngineConfig::default_test());
    let provenance = |code| {
        engine
            .estimates()
            .iter()
            .find(|e| e.code == code)
            .map(|e| e.provenance)
            .unwrap()
    };
    assert_eq!(provenance(RegionCode::BA), Provenance::Regressed);
    assert_eq!(provenance(RegionCode::SP), Provenance::Regressed);
    assert_eq!(provenance(RegionCode::PE), Provenance::GroupProxy);
    assert_eq!(provenance(RegionCode::AC), Provenance::GroupProxy);
}

#[test]
fn repeated_runs_are_identical() {
    let config = EngineConfig::default_test();
    let a = build_engine(config.clone()).run().unwrap();
    let b = build_engine(config).run().unwrap();
    assert_eq!(a, b);
}

#[test]
fn report_serializes_to_json() {
    let report = build_engine(EngineConfig::default_test()).run().unwrap();
    let json = report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    for key in ["allocation", "monte_carlo", "strategies", "efficiency", "elasticities"] {
        assert!(value.get(key).is_some(), "report JSON missing {key}");
    }
    assert_eq!(value["base_year"], 2022);
    assert!(report.to_json_pretty().unwrap().contains('\n'));
}

#[test]
fn explicit_base_year_uses_that_snapshot() {
    let config = EngineConfig {
        base_year: Some(2021),
        ..EngineConfig::default_test()
    };
    let engine = build_engine(config);
    assert_eq!(engine.base_year(), 2021);

    let ba = engine
        .request()
        .regions
        .iter()
        .find(|r| r.code == RegionCode::BA)
        .unwrap();
    assert_eq!(ba.deaths, 5_600.0);

    let plan = engine.plan(Strategy::Uniform).unwrap();
    let years: Vec<Option<Year>> = plan.years.iter().map(|y| y.year).collect();
    assert_eq!(years, vec![Some(2021), Some(2022), Some(2023), Some(2024)]);
}

/// BA's 2021 and 2022 rows must not feed a 2020 estimate.
#[test]
fn estimation_ignores_years_after_base_year() {
    let config = EngineConfig {
        base_year: Some(2020),
        ..EngineConfig::default_test()
    };
    let engine = build_engine(config);
    let ba = engine
        .estimates()
        .iter()
        .find(|e| e.code == RegionCode::BA)
        .unwrap();

    // Only 2019 -> 2020: spend +10%, rate -5%.
    assert_eq!(ba.provenance, Provenance::Regressed);
    assert_eq!(ba.sample_size, 1);
    assert!((ba.coefficient + 0.5).abs() < 1e-9, "coefficient {}", ba.coefficient);

    let latest = build_engine(EngineConfig::default_test());
    let ba_latest = latest.estimates().iter().find(|e| e.code == RegionCode::BA).unwrap();
    assert_eq!(ba_latest.sample_size, 3);
}

#[test]
fn bound_overrides_reach_the_optimizer() {
    let mut config = EngineConfig::default_test();
    config
        .bounds
        .overrides
        .insert(RegionCode::SP, BoundOverride { min: 100_000.0, max: 150_000.0 });
    let result = build_engine(config).optimize().unwrap();

    let sp = result.investment(RegionCode::SP).unwrap();
    assert!((100_000.0..=150_000.0).contains(&sp), "SP got {sp}");
}

#[test]
fn infeasible_floors_surface_at_optimize() {
    let mut config = EngineConfig::default_test();
    config
        .bounds
        .overrides
        .insert(RegionCode::RJ, BoundOverride { min: 2_000_000.0, max: 3_000_000.0 });
    let engine = build_engine(config);
    assert!(engine.optimize().unwrap_err().is_infeasible());
    assert!(engine.run().unwrap_err().is_infeasible());
}

#[test]
fn invalid_config_fails_at_build() {
    let config = EngineConfig {
        efficiency: EfficiencyWeights { outcome_weight: 0.9, cost_weight: 0.9 },
        ..EngineConfig::default_test()
    };
    assert!(matches!(
        AllocationEngine::build(sample_dataset(), config),
        Err(EngineError::InvalidWeight { .. })
    ));

    let config = EngineConfig {
        trial_count: 0,
        ..EngineConfig::default_test()
    };
    assert!(matches!(
        AllocationEngine::build(sample_dataset(), config),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn empty_dataset_cannot_build() {
    let empty = RegionDataset::from_records(Vec::new()).unwrap();
    assert!(matches!(
        AllocationEngine::build(empty, EngineConfig::default_test()),
        Err(EngineError::Data(_))
    ));
}

#[test]
fn config_loads_from_json_file_with_defaults() {
    let path = temp_file(
        "config-ok",
        r#"{
            "budget": 5000000,
            "seed": 7,
            "bounds": { "overrides": { "SP": { "min": 1000, "max": 2000 } } },
            "planner": { "frontload_decay": 0.6, "tie_break": "declaration-order" }
        }"#,
    );
    let config = EngineConfig::load(path.to_str().unwrap()).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.budget, 5_000_000.0);
    assert_eq!(config.seed, 7);
    assert_eq!(config.trial_count, 1_000);
    assert_eq!(config.horizon_years, 4);
    assert_eq!(config.planner.frontload_decay, 0.6);
    assert_eq!(config.bounds.bounds_for(RegionCode::SP, config.budget), (1_000.0, 2_000.0));
    assert_eq!(config.bounds.bounds_for(RegionCode::RJ, config.budget), (0.0, 5_000_000.0));
}

#[test]
fn config_load_rejects_bad_files() {
    let negative = temp_file("config-negative", r#"{ "budget": -1 }"#);
    assert!(EngineConfig::load(negative.to_str().unwrap()).is_err());
    std::fs::remove_file(&negative).ok();

    let malformed = temp_file("config-malformed", "{ budget: ");
    assert!(EngineConfig::load(malformed.to_str().unwrap()).is_err());
    std::fs::remove_file(&malformed).ok();

    assert!(EngineConfig::load("/nonexistent/safebudget/engine.json").is_err());
}

#[test]
fn dataset_json_rejects_bad_records() {
    let unknown = r#"[{"region_code":"XX","year":2022,"population":10,"spending":1.0,"violent_deaths":1}]"#;
    assert!(matches!(
        RegionDataset::from_json(unknown),
        Err(EngineError::Serialization(_))
    ));

    let duplicate = r#"[
        {"region_code":"BA","year":2022,"population":10,"spending":1.0,"violent_deaths":1},
        {"region_code":"BA","year":2022,"population":12,"spending":2.0,"violent_deaths":1}
    ]"#;
    assert!(matches!(RegionDataset::from_json(duplicate), Err(EngineError::Data(_))));

    let zero_pop = r#"[{"region_code":"CE","year":2022,"population":0,"spending":1.0,"violent_deaths":1}]"#;
    assert!(matches!(RegionDataset::from_json(zero_pop), Err(EngineError::Data(_))));

    let ok = r#"[{"region_code":"CE","year":2022,"population":5,"spending":1.0,"violent_deaths":1}]"#;
    assert_eq!(RegionDataset::from_json(ok).unwrap().len(), 1);
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/engine.json");
    let config = EngineConfig::load(path).unwrap();
    assert_eq!(config.bounds.bounds_for(RegionCode::SP, config.budget), (5_000_000.0, 60_000_000.0));
    assert_eq!(config.bounds.bounds_for(RegionCode::BA, config.budget), (0.0, 120_000_000.0));
}
