//! analysis-runner: headless runner for the acquisition-channel analysis.
//!
//! Usage:
//!   analysis-runner
//!   analysis-runner --offline --data-dir ./data --db runs.db
//!   analysis-runner --config analysis.json --json report.json
//!   analysis-runner --synthetic 12345

use adsource_core::{
    config::AnalysisConfig,
    loader::{LoadOrigin, LoadedTables},
    pipeline::{new_run_id, AnalysisPipeline},
    report::AnalysisReport,
    store::ReportStore,
    synth::{self, SynthConfig},
};
use anyhow::Result;
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut config = match flag_value(&args, "--config") {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(url) = flag_value(&args, "--url") {
        config.primary_url = Some(url.to_string());
    }
    if let Some(dir) = flag_value(&args, "--data-dir") {
        config.fallback_dir = dir.to_string();
    }
    if args.iter().any(|a| a == "--offline") {
        config.primary_url = None;
    }
    let synthetic_seed = synthetic_seed(&args)?;
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let json_out = flag_value(&args, "--json");

    println!("Acquisition-channel analysis: analysis-runner");
    match synthetic_seed {
        Some(seed) => println!("  data:      synthetic (seed {seed})"),
        None => {
            println!("  primary:   {}", config.primary_url.as_deref().unwrap_or("(none)"));
            println!("  fallback:  {}", config.fallback_dir);
        }
    }
    println!("  alpha:     {}", config.alpha);
    println!("  db:        {db}");
    println!();

    let store = if db == ":memory:" { ReportStore::in_memory()? } else { ReportStore::open(db)? };
    store.migrate()?;

    let run_id = new_run_id();
    let mut pipeline = AnalysisPipeline::new(run_id, config, store)?;

    let report = match synthetic_seed {
        Some(seed) => {
            let tables = synth::generate(&SynthConfig { seed, ..SynthConfig::default() });
            pipeline.run_loaded(LoadedTables {
                tables,
                origin: LoadOrigin::Synthetic,
                location: format!("synthetic:{seed}"),
            })?
        }
        None => pipeline.run()?,
    };

    print!("{}", report.render_text());

    if let Some(path) = json_out {
        write_json(&report, path)?;
        println!();
        println!("JSON report written to {path}");
    }

    let stages = pipeline.store_stage_events()?;
    log::info!("{} stage event(s) recorded for {}", stages.len(), pipeline.run_id);
    Ok(())
}

fn write_json(report: &AnalysisReport, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).map_err(|e| anyhow::anyhow!("Cannot write {path}: {e}"))?;
    Ok(())
}

/// Seed given to `--synthetic`. A value that is not a u64 is an error.
fn synthetic_seed(args: &[String]) -> Result<Option<u64>> {
    if args.last().is_some_and(|a| a == "--synthetic") {
        anyhow::bail!("--synthetic needs a seed");
    }
    flag_value(args, "--synthetic")
        .map(|s| {
            s.parse::<u64>()
                .map_err(|e| anyhow::anyhow!("Invalid --synthetic seed '{s}': {e}"))
        })
        .transpose()
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
