use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use antenna_track::config::Config;
use antenna_track::hardware::{Antenna, SimulatedAntenna};
use antenna_track::predict::{load_tle_file, Sgp4Propagator, TleSet};
use antenna_track::protocol::{ProtocolFramer, TrackingDataCache};
use antenna_track::scheduler::{ControlRunner, ReferenceClock};
use antenna_track::tracker::Actuator;
use antenna_track::trajectory::{
    KeyholeAnalyzer, TrajectoryGenerator, TrajectoryStore, VariantSelector,
};
use antenna_track::web::{self, AppState};

#[derive(Parser)]
#[command(name = "antenna-track")]
#[command(about = "Satellite tracking antenna control")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate { config: String },
    /// Generate trajectories and print the pass plan
    Plan {
        #[arg(long)]
        config: String,
        #[arg(long)]
        tle: String,
        /// Start of the window (RFC3339), defaults to now
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        days: Option<u32>,
    },
    /// Generate, queue every pass and run the control loop with the HTTP API
    /// against the simulated antenna
    Serve {
        #[arg(long)]
        config: String,
        #[arg(long)]
        tle: String,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Plan {
            config,
            tle,
            start,
            days,
        } => plan(&config, &tle, start.as_deref(), days),
        Commands::Serve { config, tle } => serve(&config, &tle),
    }
}

fn validate(path: &str) -> ExitCode {
    match Config::from_file(path) {
        Ok(config) => {
            println!(
                "Configuration is valid (station {}, tilt {}°, keyhole threshold {}°/s)",
                config.station.name.as_deref().unwrap_or("unnamed"),
                config.antenna.tilt_angle_deg,
                config.keyhole.azimuth_velocity_threshold_deg_s
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_inputs(config_path: &str, tle_path: &str) -> Option<(Config, Vec<TleSet>)> {
    let config = match Config::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return None;
        }
    };
    let tles = match load_tle_file(Path::new(tle_path)) {
        Ok(t) if !t.is_empty() => t,
        Ok(_) => {
            eprintln!("No TLE sets in {}", tle_path);
            return None;
        }
        Err(e) => {
            eprintln!("Error reading TLE file: {}", e);
            return None;
        }
    };
    Some((config, tles))
}

fn generator(config: &Config, store: &Arc<TrajectoryStore>) -> TrajectoryGenerator {
    TrajectoryGenerator::new(
        store.clone(),
        KeyholeAnalyzer::from_config(config),
        Arc::new(Sgp4Propagator),
        config.generation.workers,
    )
}

fn plan(config_path: &str, tle_path: &str, start: Option<&str>, days: Option<u32>) -> ExitCode {
    let Some((config, tles)) = load_inputs(config_path, tle_path) else {
        return ExitCode::FAILURE;
    };
    let start = match start.map(DateTime::parse_from_rfc3339) {
        None => Utc::now(),
        Some(Ok(t)) => t.with_timezone(&Utc),
        Some(Err(e)) => {
            eprintln!("Invalid start time: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let days = days.unwrap_or(config.generation.duration_days);

    let store = Arc::new(TrajectoryStore::new());
    let generator = generator(&config, &store);
    for request in config.schedule_requests(&tles, start, days) {
        if let Err(e) = generator.generate(&request) {
            log::warn!("Skipping satellite: {}", e);
        }
    }

    let selector = VariantSelector::new(store);
    let mut passes: Vec<_> = selector
        .store()
        .pass_ids()
        .into_iter()
        .filter_map(|id| selector.select_operational(id))
        .collect();
    passes.sort_by_key(|(_, m)| m.start);

    println!(
        "{:>5}  {:<24} {:<20} {:>7} {:>7} {:>9} {:>7}  {}",
        "id", "satellite", "aos", "dur s", "max el", "az rate", "train", "variant"
    );
    for (variant, m) in &passes {
        println!(
            "{:>5}  {:<24} {:<20} {:>7.1} {:>7.1} {:>9.2} {:>7.1}  {}{}",
            m.pass_id,
            m.satellite,
            m.start.format("%Y-%m-%d %H:%M:%S"),
            (m.end - m.start).num_milliseconds() as f64 / 1000.0,
            m.metrics.max_elevation_deg,
            m.metrics.max_az_rate,
            m.train_angle_deg,
            variant,
            if m.is_keyhole { " (keyhole)" } else { "" }
        );
    }
    println!("{} passes", passes.len());
    ExitCode::SUCCESS
}

fn serve(config_path: &str, tle_path: &str) -> ExitCode {
    let Some((config, tles)) = load_inputs(config_path, tle_path) else {
        return ExitCode::FAILURE;
    };
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run_station(config, tles))
}

async fn run_station(config: Config, tles: Vec<TleSet>) -> ExitCode {
    let store = Arc::new(TrajectoryStore::new());
    let generator = generator(&config, &store);
    let ids = generator
        .generate_all(config.schedule_requests(&tles, Utc::now(), config.generation.duration_days))
        .await;

    let selector = VariantSelector::new(store);
    let framer = ProtocolFramer::new(
        selector.clone(),
        Arc::new(TrackingDataCache::new(config.cache.ttl)),
    );
    let sim = Arc::new(SimulatedAntenna::from_config(&config.antenna));
    sim.spawn_motion(config.tracking.tick);
    let actuator = Actuator::new(Antenna::simulated(&sim), framer.clone(), &config.antenna);

    let (runner, control) = ControlRunner::new(
        config.tracking.clone(),
        selector.clone(),
        actuator,
        ReferenceClock::new(),
    );
    tokio::spawn(runner.run());

    match control.load_queue(ids).await {
        Ok(n) => log::info!("Tracking {} upcoming passes", n),
        Err(e) => log::warn!("Nothing queued: {}", e),
    }

    let state = AppState {
        config: Arc::new(config),
        selector,
        framer,
        control,
        generator,
        tles: Arc::from(tles),
    };
    match web::run_server(state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
