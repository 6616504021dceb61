//! ThreatGlobe Simulator CLI
//!
//! Run deterministic feed scenarios against the globe engine.

use clap::Parser;
use threatglobe_sim::scenarios::ScenarioId;
use threatglobe_sim::{ScenarioResult, ScenarioRunner};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// ThreatGlobe Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "threatglobe-sim")]
#[command(about = "Run deterministic feed simulations for ThreatGlobe", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (steady, burst, mixed, malformed, analysis, filter_reset, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Feed duration in seconds, before draining
    #[arg(short, long, default_value = "30")]
    duration: f64,

    /// Render tick rate in Hz
    #[arg(long, default_value = "60")]
    tick_rate: u32,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-second frames to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Watch a single scenario live in the terminal dashboard
    #[cfg(feature = "dashboard")]
    #[arg(long)]
    dashboard: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("ThreatGlobe Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: steady, burst, mixed, malformed, analysis, filter_reset, all");
            std::process::exit(1);
        })]
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if (args.export.is_some() || dashboard_requested(&args)) && scenarios.len() > 1 {
        eprintln!("Error: --export and --dashboard only support a single scenario, not 'all'");
        std::process::exit(1);
    }

    #[cfg(feature = "dashboard")]
    if args.dashboard {
        let passed = run_dashboard(&args, base_seed, scenarios[0]);
        std::process::exit(if passed { 0 } else { 1 });
    }

    // Handle --export mode
    if let Some(export_path) = &args.export {
        let runner = ScenarioRunner::new(base_seed)
            .with_duration(args.duration)
            .with_tick_rate(args.tick_rate);
        let (result, export) = runner.run_with_export(scenarios[0]);

        if let Err(e) = export.write_to_file(export_path) {
            error!("Failed to write export: {:?}", e);
        } else {
            info!("Exported {} frames to {}", export.frames.len(), export_path);
        }
        report(&result, args.json);
        if !result.passed {
            std::process::exit(1);
        }
        return;
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_tick_rate(args.tick_rate);

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result, false);
            }
            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            // List failed seeds
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

fn report(result: &ScenarioResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(out) => println!("{}", out),
            Err(e) => error!("Failed to serialize result: {}", e),
        }
    } else if result.passed {
        info!("✓ {} (seed={}) PASSED", result.scenario.name(), result.seed);
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

#[cfg(feature = "dashboard")]
fn dashboard_requested(args: &Args) -> bool {
    args.dashboard
}

#[cfg(not(feature = "dashboard"))]
fn dashboard_requested(_args: &Args) -> bool {
    false
}

/// Runs the scenario at wall-clock speed on a worker thread and shows it
/// in the dashboard until the user quits.
#[cfg(feature = "dashboard")]
fn run_dashboard(args: &Args, seed: u64, scenario: ScenarioId) -> bool {
    use threatglobe_core::dashboard::GlobeDashboard;

    let (tx, rx) = crossbeam::channel::bounded(64);
    let runner = ScenarioRunner::new(seed)
        .with_duration(args.duration)
        .with_tick_rate(args.tick_rate)
        .with_realtime(true)
        .with_snapshot_feed(tx);
    let worker = std::thread::spawn(move || runner.run(scenario));

    let mut dashboard = GlobeDashboard::new(rx, format!("ThreatGlobe sim: {}", scenario.name()));
    if let Err(e) = dashboard.run() {
        error!("Dashboard error: {}", e);
    }

    if !worker.is_finished() {
        info!("Dashboard closed before {} finished", scenario.name());
        return true;
    }
    match worker.join() {
        Ok(result) => {
            report(&result, false);
            result.passed
        }
        Err(_) => {
            error!("Simulation thread panicked");
            false
        }
    }
}
