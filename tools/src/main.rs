//! alloc-runner: headless runner for the public-safety allocation engine.
//!
//! Usage:
//!   alloc-runner --data records.json --config engine.json
//!   alloc-runner --data records.json --seed 7 --trials 5000 --horizon 6 --json

use anyhow::{Context, Result};
use safebudget_core::{
    config::EngineConfig, dataset::RegionDataset, engine::AllocationEngine, report::EngineReport,
};
use std::env;

#[derive(serde::Serialize)]
struct RunEnvelope<'a> {
    run_id:       String,
    generated_at: chrono::DateTime<chrono::Utc>,
    version:      &'static str,
    report:       &'a EngineReport,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let json_mode = args.iter().any(|a| a == "--json");
    let data_path = string_arg(&args, "--data")
        .context("--data <records.json> is required")?;

    let mut config = match string_arg(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default_test(),
    };
    config.seed = parse_arg(&args, "--seed", config.seed)?;
    config.trial_count = parse_arg(&args, "--trials", config.trial_count)?;
    config.horizon_years = parse_arg(&args, "--horizon", config.horizon_years)?;
    config.validate()?;

    let raw = std::fs::read_to_string(data_path)
        .with_context(|| format!("Cannot read {data_path}"))?;
    let dataset = RegionDataset::from_json(&raw)?;

    if !json_mode {
        let codes: Vec<&str> = dataset.codes().map(|c| c.code()).collect();
        let spending_millions: f64 = dataset
            .snapshot(config.base_year)?
            .iter()
            .map(|(_, obs)| obs.spending_millions())
            .sum();
        println!("alloc-runner");
        println!("  data:      {data_path}");
        println!("  regions:   {} ({})", dataset.len(), codes.join(" "));
        println!("  spending:  R$ {spending_millions:.1} mi");
        println!("  budget:    {:.2}", config.budget);
        println!("  seed:      {}", config.seed);
        println!("  trials:    {}", config.trial_count);
        println!("  horizon:   {}", config.horizon_years);
        println!();
    }

    let engine = AllocationEngine::build(dataset, config)?;
    let report = engine.run()?;
    log::info!(
        "alloc-runner: finished, {} regions, lives saved {:.2}",
        report.allocation.allocations.len(),
        report.allocation.lives_saved
    );

    if json_mode {
        let envelope = RunEnvelope {
            run_id:       uuid::Uuid::new_v4().to_string(),
            generated_at: chrono::Utc::now(),
            version:      env!("CARGO_PKG_VERSION"),
            report:       &report,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &EngineReport) {
    let alloc = &report.allocation;
    println!("=== ALLOCATION (base year {}) ===", report.base_year);
    println!("  invested:       {:.2} of {:.2}", alloc.total_invested, alloc.budget);
    println!("  baseline deaths:{:.1}", alloc.baseline_deaths);
    println!("  projected:      {:.1}", alloc.projected_deaths);
    println!("  lives saved:    {:.1}", alloc.lives_saved);
    for a in alloc.allocations.iter().filter(|a| a.investment > 0.0) {
        println!(
            "    {} | invest {:>14.2} | saved {:>8.1}",
            a.code, a.investment, a.lives_saved
        );
    }

    let mc = &report.monte_carlo;
    println!();
    println!("=== UNCERTAINTY ({} trials, seed {}) ===", mc.trial_count, mc.seed);
    println!("  point estimate: {:.1}", mc.point_estimate);
    println!("  mean:           {:.1} (sd {:.1})", mc.summary.mean, mc.summary.std_dev);
    println!("  95% interval:   [{:.1}, {:.1}]", mc.summary.ci_lower, mc.summary.ci_upper);

    println!();
    println!("=== STRATEGIES ===");
    for (i, s) in report.strategies.ranked.iter().enumerate() {
        println!(
            "  {}. {:<18} cumulative saved {:.1}",
            i + 1,
            s.strategy.name(),
            s.cumulative_lives_saved
        );
    }

    println!();
    println!("=== EFFICIENCY (top 5) ===");
    for s in report.efficiency.iter().take(5) {
        println!(
            "  {}. {} | score {:.3} | rate {:.1}/100k | R$ {:.2}/capita",
            s.rank, s.code, s.score, s.death_rate, s.spend_per_capita
        );
    }
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T>(args: &[String], flag: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match string_arg(args, flag) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value for {flag}: '{raw}'")),
        None => Ok(default),
    }
}
