//! trackfind Simulator CLI
//!
//! Run deterministic track finding scenarios against simulated truth.

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use trackfind_core::TrackFinderConfig;
use trackfind_sim::scenarios::ScenarioId;
use trackfind_sim::{ScenarioResult, ScenarioRunner};

/// trackfind Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "trackfind-sim")]
#[command(about = "Run deterministic track finding scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Events per scenario
    #[arg(short, long, default_value = "10")]
    events: usize,

    /// Scenario to run (single_track, multi_track, high_background, back_to_back, low_momentum, empty, dense),
    /// `standard` for all but the stress scenarios, or `all`
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Track finder configuration (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the first event of the scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if !args.json {
        info!("trackfind Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else if args.scenario == "standard" {
        ScenarioId::standard()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
            eprintln!("Available scenarios: {}, standard, all", names.join(", "));
            std::process::exit(1);
        })]
    };

    let config = match &args.config {
        Some(path) => TrackFinderConfig::from_path(path).unwrap_or_else(|e| {
            eprintln!("Error: cannot load {}: {}", path, e);
            std::process::exit(1);
        }),
        None => TrackFinderConfig::default(),
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario");
            std::process::exit(1);
        }
        let runner = ScenarioRunner::new(base_seed).with_config(config);
        let written = runner
            .export_first_event(scenarios[0])
            .and_then(|export| export.write_to_file(export_path).map_err(|e| e.to_string()));
        match written {
            Ok(()) => info!("Exported {} (seed={}) to {}", scenarios[0].name(), base_seed, export_path),
            Err(e) => {
                error!("Failed to export {}: {}", scenarios[0].name(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_events(args.events)
            .with_config(config.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "events": r.events,
                    "efficiency": r.efficiency,
                    "purity": r.purity,
                    "fake_rate": r.fake_rate,
                    "clone_rate": r.clone_rate,
                    "tracks": r.metrics.totals.tracks,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: cannot serialize summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
