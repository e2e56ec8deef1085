//! # Butterfly-scenario CLI
//!
//! Command-line interface for the butterfly-scenario library.
//! Compiles OSRM scenarios, serves them for ad-hoc querying, and compares
//! travel times between a baseline and a variant scenario.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::error;

use butterfly_scenario::{
    Algorithm, BehaviorProfile, BuildOptions, ComparisonEngine, Environment, MapDataset,
    ParallelGroup, PointSet, Scenario, ServeOptions,
};

mod cli;

/// Command-line interface for butterfly-scenario
#[derive(Parser)]
#[command(name = "butterfly-scenario")]
#[command(about = "OSRM scenario orchestration and route comparison")]
#[command(long_about = "Compiles and queries OSRM routing scenarios:
  butterfly-scenario build --map region.osm.pbf --profile walk.lua
  butterfly-scenario serve --map region.osm.pbf --profile walk.lua
  butterfly-scenario compare --map region.osm.pbf \\
      --baseline walk_normal.lua --variant walk_flood.lua \\
      --origins homesteads.geojson --destinations schools.geojson

The OSRM toolchain (osrm-extract, osrm-contract, osrm-partition,
osrm-customize, osrm-routed) must be on PATH.")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging and mirror toolchain output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a servable routing dataset
    Build(ScenarioArgs),
    /// Compile if needed, then serve queries until interrupted
    Serve(ServeArgs),
    /// Compare travel times between a baseline and a variant scenario
    Compare(CompareArgs),
}

/// One scenario: a map extract plus a behavior profile
#[derive(Args)]
struct ScenarioArgs {
    /// OSM extract (.osm.pbf, .osm.xml, or .osm)
    #[arg(long)]
    map: PathBuf,

    /// Routing behavior profile (Lua)
    #[arg(long)]
    profile: PathBuf,

    /// Routing algorithm: ch (contraction) or mld (multi-level)
    #[arg(long, default_value = "ch")]
    algorithm: Algorithm,

    /// Scenario name; defaults to "{map}_{profile}"
    #[arg(long)]
    name: Option<String>,

    /// Directory for compiled datasets
    #[arg(long, default_value = "./scenarios")]
    work_dir: PathBuf,

    /// Rebuild even if a cached dataset exists
    #[arg(long)]
    overwrite: bool,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    /// Largest origin x destination table the server will answer
    #[arg(long, default_value_t = 100)]
    max_table_size: usize,

    /// Seconds to wait for the server to report readiness
    #[arg(long, default_value_t = 60)]
    startup_timeout: u64,
}

#[derive(Args)]
struct CompareArgs {
    /// OSM extract shared by both scenarios
    #[arg(long)]
    map: PathBuf,

    /// Baseline behavior profile (Lua)
    #[arg(long)]
    baseline: PathBuf,

    /// Variant behavior profile (Lua)
    #[arg(long)]
    variant: PathBuf,

    /// Origin points (GeoJSON FeatureCollection of Points)
    #[arg(long)]
    origins: PathBuf,

    /// Destination points (GeoJSON FeatureCollection of Points)
    #[arg(long)]
    destinations: PathBuf,

    /// Routing algorithm: ch (contraction) or mld (multi-level)
    #[arg(long, default_value = "ch")]
    algorithm: Algorithm,

    /// Directory for compiled datasets
    #[arg(long, default_value = "./scenarios")]
    work_dir: PathBuf,

    /// Rebuild even if cached datasets exist
    #[arg(long)]
    overwrite: bool,

    /// Also fetch route geometries for the differing pairs
    #[arg(long)]
    routes: bool,
}

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            error!("❌ Error: {e}");
            1
        }
    };
    // Leave no orphaned toolchain processes behind
    butterfly_scenario::terminate_all().await;
    std::process::exit(exit_code);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    if cli.verbose {
        eprintln!(
            "🦋 Butterfly-scenario v{} starting...",
            env!("CARGO_PKG_VERSION")
        );
    }

    match cli.command {
        Command::Build(args) => build(args, cli.verbose).await,
        Command::Serve(args) => serve(args, cli.verbose).await,
        Command::Compare(args) => compare(args, cli.verbose).await,
    }
}

fn make_scenario(args: &ScenarioArgs, verbose: bool) -> anyhow::Result<Scenario> {
    let env = Environment::new(&args.work_dir)
        .with_overwrite(args.overwrite)
        .with_verbose(verbose);
    let map = MapDataset::new(&args.map)?;
    let profile = BehaviorProfile::new(&args.profile)?;

    let mut scenario = Scenario::new(&env, map, profile).with_algorithm(args.algorithm)?;
    if let Some(name) = &args.name {
        scenario = scenario.with_name(name);
    }
    Ok(scenario.with_build_options(BuildOptions {
        overwrite: args.overwrite,
        ..Default::default()
    }))
}

/// Compile a dataset and print its path
async fn build(args: ScenarioArgs, verbose: bool) -> anyhow::Result<()> {
    let mut scenario = make_scenario(&args, verbose)?;

    eprintln!(
        "🔨 Building scenario '{}' ({})",
        scenario.name(),
        scenario.algorithm()
    );
    let path = scenario.compile().await?;
    eprintln!("✅ Dataset ready: {}", path.display());
    println!("{}", path.display());
    Ok(())
}

/// Serve a scenario until Ctrl-C
async fn serve(args: ServeArgs, verbose: bool) -> anyhow::Result<()> {
    let mut scenario = make_scenario(&args.scenario, verbose)?.with_serve_options(ServeOptions {
        max_table_size: args.max_table_size,
        verbose,
        startup_timeout: Duration::from_secs(args.startup_timeout),
        ..Default::default()
    });

    let client = scenario.serve().await?;
    eprintln!("🚀 Serving '{}' at {}", scenario.name(), client.base_url());
    eprintln!("   Press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    eprintln!("🛑 Stopping '{}'", scenario.name());
    scenario.stop().await;
    Ok(())
}

/// Run both scenarios side by side and print differing pairs as JSON
async fn compare(args: CompareArgs, verbose: bool) -> anyhow::Result<()> {
    let origins = PointSet::from_geojson_file(&args.origins, "origins")?;
    let dests = PointSet::from_geojson_file(&args.destinations, "destinations")?;
    let table_size = origins.len() * dests.len();

    let env = Environment::new(&args.work_dir)
        .with_overwrite(args.overwrite)
        .with_verbose(verbose);
    let map = MapDataset::new(&args.map)?;
    let serve_opts = ServeOptions {
        max_table_size: table_size.max(100),
        verbose,
        ..Default::default()
    };

    let mut baseline = Scenario::new(&env, map.clone(), BehaviorProfile::new(&args.baseline)?)
        .with_algorithm(args.algorithm)?
        .with_serve_options(serve_opts.clone());
    let mut variant = Scenario::new(&env, map, BehaviorProfile::new(&args.variant)?)
        .with_algorithm(args.algorithm)?
        .with_serve_options(serve_opts);
    let baseline_name = baseline.name().to_string();
    let variant_name = variant.name().to_string();

    eprintln!(
        "🧮 Comparing '{}' vs '{}' over {} x {} pairs",
        baseline_name,
        variant_name,
        origins.len(),
        dests.len()
    );

    let mut group = ParallelGroup::new(vec![&mut baseline, &mut variant])?;
    let report = group
        .with_servers(|clients: HashMap<String, _>| {
            let baseline_name = baseline_name.clone();
            let variant_name = variant_name.clone();
            let want_routes = args.routes;
            async move {
                let mut engine = ComparisonEngine::new(origins, dests, clients);
                let diff = engine.difference(&baseline_name, &variant_name).await?;

                let mut rows = Vec::with_capacity(diff.rows.len());
                if want_routes && !diff.rows.is_empty() {
                    let pairs: Vec<_> = diff
                        .rows
                        .iter()
                        .map(|row| {
                            butterfly_scenario::ODPair::new(
                                row.origin_id.clone(),
                                row.dest_id.clone(),
                            )
                        })
                        .collect();

                    let progress = cli::ProgressManager::new(
                        pairs.len() as u64,
                        "🗺️  Fetching variant routes for differing pairs",
                    );
                    let mut records = Vec::with_capacity(pairs.len());
                    for chunk in pairs.chunks(8) {
                        records.extend(engine.routes(&variant_name, Some(chunk)).await?);
                        progress.pb.inc(chunk.len() as u64);
                    }
                    progress.finish("✅ Routes fetched");

                    for (row, record) in diff.rows.iter().zip(records) {
                        rows.push(serde_json::json!({
                            "origin_id": row.origin_id,
                            "dest_id": row.dest_id,
                            "baseline_duration": row.durations[0],
                            "variant_duration": row.durations[1],
                            "variant_distance": record.distance,
                            "variant_geometry": record.geometry,
                        }));
                    }
                } else {
                    for row in &diff.rows {
                        rows.push(serde_json::json!({
                            "origin_id": row.origin_id,
                            "dest_id": row.dest_id,
                            "baseline_duration": row.durations[0],
                            "variant_duration": row.durations[1],
                        }));
                    }
                }

                Ok(serde_json::json!({
                    "baseline": baseline_name,
                    "variant": variant_name,
                    "pairs_total": table_size,
                    "pairs_differing": rows.len(),
                    "differences": rows,
                }))
            }
        })
        .await?;

    eprintln!(
        "✅ {} of {} pairs differ",
        report["pairs_differing"], report["pairs_total"]
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
