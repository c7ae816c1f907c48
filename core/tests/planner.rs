//! Multi-period planner tests — budget split, state carry-over, ranking.

use safebudget_core::{
    config::{EngineConfig, PlannerConfig, TieBreak},
    dataset::{DatasetRecord, RegionDataset},
    elasticity::ElasticityEstimator,
    engine::build_request,
    optimizer::{optimize, AllocationRequest, AllocationResult, InvestmentBounds, RegionState},
    planner::{rank_strategies, MultiPeriodPlanner, MultiPeriodResult, Strategy, YearPlan},
    types::RegionCode,
    EngineError,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn sequential() -> PlannerConfig {
    PlannerConfig {
        parallel: false,
        ..PlannerConfig::default()
    }
}

/// One region, a = e / s = 0.001 and no binding cap over the horizon.
fn single_region_request(budget: f64) -> AllocationRequest {
    AllocationRequest::new(
        budget,
        vec![RegionState {
            code:                 RegionCode::PA,
            population:           8_000_000,
            spending:             500.0,
            deaths:               100.0,
            elasticity:           0.5,
            elasticity_std_error: None,
            bounds:               InvestmentBounds::new(0.0, budget),
        }],
    )
}

fn mixed_request() -> AllocationRequest {
    let mk = |code, deaths, e, spending, min, max| RegionState {
        code,
        population: 4_000_000,
        spending,
        deaths,
        elasticity: e,
        elasticity_std_error: None,
        bounds: InvestmentBounds::new(min, max),
    };
    AllocationRequest::new(
        900.0,
        vec![
            mk(RegionCode::AM, 300.0, 0.3, 20_000.0, 60.0, 500.0),
            mk(RegionCode::PA, 500.0, 0.2, 30_000.0, 0.0, 500.0),
            mk(RegionCode::TO, 90.0, 0.6, 5_000.0, 30.0, 200.0),
        ],
    )
}

fn synthetic_result(strategy: Strategy, cumulative_by_year: &[f64]) -> MultiPeriodResult {
    let empty = AllocationResult {
        budget:           0.0,
        total_invested:   0.0,
        baseline_deaths:  0.0,
        projected_deaths: 0.0,
        lives_saved:      0.0,
        allocations:      vec![],
    };
    let years = cumulative_by_year
        .iter()
        .enumerate()
        .map(|(t, &c)| YearPlan {
            year_index:             t as u32,
            year:                   None,
            weight:                 0.5,
            sub_budget:             0.0,
            allocation:             empty.clone(),
            counterfactual_deaths:  0.0,
            lives_saved:            0.0,
            cumulative_lives_saved: c,
        })
        .collect();
    MultiPeriodResult {
        strategy,
        horizon_years: cumulative_by_year.len() as u32,
        total_budget: 0.0,
        years,
        cumulative_lives_saved: *cumulative_by_year.last().unwrap(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn sub_budgets_sum_to_total_for_every_strategy() {
    let planner = MultiPeriodPlanner::new(sequential());
    let request = mixed_request();
    for strategy in Strategy::ALL {
        for horizon in [1, 2, 5, 9] {
            let plan = planner.plan(&request, horizon, strategy).unwrap();
            assert_eq!(plan.years.len(), horizon as usize);
            assert!(
                (plan.sub_budget_total() - request.budget).abs() < 1e-9,
                "{} h={horizon}: sub-budgets sum to {}",
                strategy.name(),
                plan.sub_budget_total()
            );
            for y in &plan.years {
                assert!(y.allocation.total_invested <= y.sub_budget + 1e-9);
            }
        }
    }
}

#[test]
fn one_year_horizon_matches_single_optimization() {
    let request = mixed_request();
    let direct = optimize(&request).unwrap();
    for strategy in Strategy::ALL {
        let plan = MultiPeriodPlanner::new(sequential())
            .plan(&request, 1, strategy)
            .unwrap();
        assert_eq!(plan.years[0].allocation, direct);
        assert!((plan.cumulative_lives_saved - direct.lives_saved).abs() < 1e-9);
    }
}

#[test]
fn cumulative_is_running_sum_of_yearly_savings() {
    let plan = MultiPeriodPlanner::new(sequential())
        .plan(&mixed_request(), 5, Strategy::LinearIncreasing)
        .unwrap();
    let mut running = 0.0;
    for y in &plan.years {
        running += y.lives_saved;
        assert!((y.cumulative_lives_saved - running).abs() < 1e-9);
    }
    assert!((plan.cumulative_lives_saved - running).abs() < 1e-9);
}

/// Deaths reductions persist, so each year starts from the last one's
/// projection while the counterfactual stays at baseline.
#[test]
fn state_carries_reductions_forward() {
    let request = single_region_request(300.0);
    let plan = MultiPeriodPlanner::new(sequential())
        .plan(&request, 3, Strategy::Uniform)
        .unwrap();

    // 100 investment per year, factor 0.9 each year.
    let expected_deaths = [90.0, 81.0, 72.9];
    for (y, expected) in plan.years.iter().zip(expected_deaths) {
        assert!((y.counterfactual_deaths - 100.0).abs() < 1e-9);
        assert!((y.allocation.projected_deaths - expected).abs() < 1e-9,
            "year {}: projected {}", y.year_index, y.allocation.projected_deaths);
    }
    assert!((plan.cumulative_lives_saved - 56.1).abs() < 1e-9);
}

#[test]
fn frontloading_wins_when_effects_persist() {
    let comparison = MultiPeriodPlanner::new(sequential())
        .plan_all(&single_region_request(300.0), 3)
        .unwrap();

    assert_eq!(comparison.ranked.len(), 4);
    assert_eq!(comparison.best().map(|r| r.strategy), Some(Strategy::Frontloaded));
    for pair in comparison.ranked.windows(2) {
        assert!(pair[0].cumulative_lives_saved >= pair[1].cumulative_lives_saved);
    }
}

#[test]
fn parallel_and_sequential_comparisons_agree() {
    let request = mixed_request();
    let seq = MultiPeriodPlanner::new(sequential()).plan_all(&request, 6).unwrap();
    let par = MultiPeriodPlanner::new(PlannerConfig::default())
        .plan_all(&request, 6)
        .unwrap();
    assert_eq!(seq, par);
}

#[test]
fn ties_prefer_earlier_impact_by_default() {
    let results = vec![
        synthetic_result(Strategy::Uniform, &[0.0, 10.0]),
        synthetic_result(Strategy::LinearIncreasing, &[8.0, 10.0]),
    ];

    let earlier = rank_strategies(results.clone(), TieBreak::EarlierImpact);
    assert_eq!(earlier[0].strategy, Strategy::LinearIncreasing);

    let declared = rank_strategies(results, TieBreak::DeclarationOrder);
    assert_eq!(declared[0].strategy, Strategy::Uniform);
}

#[test]
fn horizon_out_of_range_is_invalid() {
    let planner = MultiPeriodPlanner::new(sequential());
    for horizon in [0, 51] {
        assert!(matches!(
            planner.plan(&mixed_request(), horizon, Strategy::Uniform),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}

#[test]
fn bad_decay_is_invalid() {
    let planner = MultiPeriodPlanner::new(PlannerConfig {
        frontload_decay: 1.5,
        ..sequential()
    });
    assert!(matches!(
        planner.plan(&mixed_request(), 3, Strategy::Frontloaded),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn infeasible_request_fails_up_front() {
    let mut request = mixed_request();
    request.budget = 50.0;
    let err = MultiPeriodPlanner::new(sequential())
        .plan(&request, 3, Strategy::Uniform)
        .unwrap_err();
    assert!(err.is_infeasible());
}

/// Spending falls 1000 -> 200 in year two, so the cap s / e = 400 drops
/// below that year's floor of 750. The region is held at its floor.
#[test]
fn spending_drop_pins_region_at_floor() {
    let records = vec![
        DatasetRecord {
            region_code:    RegionCode::AC,
            year:           2020,
            population:     900_000,
            spending:       1_000.0,
            violent_deaths: 300,
        },
        DatasetRecord {
            region_code:    RegionCode::AC,
            year:           2021,
            population:     900_000,
            spending:       200.0,
            violent_deaths: 280,
        },
    ];
    let dataset = RegionDataset::from_records(records).unwrap();
    let request = AllocationRequest::new(
        1_600.0,
        vec![RegionState {
            code:                 RegionCode::AC,
            population:           900_000,
            spending:             1_000.0,
            deaths:               300.0,
            elasticity:           0.5,
            elasticity_std_error: None,
            bounds:               InvestmentBounds::new(1_500.0, 1_600.0),
        }],
    );

    let plan = MultiPeriodPlanner::new(sequential())
        .with_dataset(&dataset, 2020)
        .plan(&request, 2, Strategy::Uniform)
        .expect("later years resolve their own caps");

    assert_eq!(plan.years[0].allocation.total_invested, 800.0);
    assert!((plan.years[1].allocation.total_invested - 750.0).abs() < 1e-9);
    assert_eq!(plan.years[1].allocation.projected_deaths, 0.0);
    assert!((plan.sub_budget_total() - 1_600.0).abs() < 1e-9);
}

/// Later years pick population and spending from the dataset; deaths
/// follow the population so the rate carries over.
#[test]
fn dataset_outlook_rescales_population() {
    let records = vec![
        DatasetRecord {
            region_code:    RegionCode::BA,
            year:           2020,
            population:     1_000_000,
            spending:       1_000_000.0,
            violent_deaths: 100,
        },
        DatasetRecord {
            region_code:    RegionCode::BA,
            year:           2021,
            population:     2_000_000,
            spending:       2_000_000.0,
            violent_deaths: 500,
        },
    ];
    let dataset = RegionDataset::from_records(records).unwrap();
    let config = EngineConfig {
        budget: 0.0,
        ..EngineConfig::default_test()
    };
    let estimates = ElasticityEstimator::new(config.elasticity.clone())
        .estimate_all(&dataset)
        .unwrap();
    let request = build_request(&dataset, &estimates, &config, 2020).unwrap();

    let plan = MultiPeriodPlanner::new(sequential())
        .with_dataset(&dataset, 2020)
        .plan(&request, 3, Strategy::Uniform)
        .unwrap();

    let years: Vec<Option<u16>> = plan.years.iter().map(|y| y.year).collect();
    assert_eq!(years, vec![Some(2020), Some(2021), Some(2022)]);
    assert!((plan.years[0].counterfactual_deaths - 100.0).abs() < 1e-9);
    assert!((plan.years[1].counterfactual_deaths - 200.0).abs() < 1e-9);
    // 2022 is missing: population carried forward unchanged.
    assert!((plan.years[2].counterfactual_deaths - 200.0).abs() < 1e-9);
    assert!(plan.cumulative_lives_saved.abs() < 1e-9, "zero budget saves nothing");
}
