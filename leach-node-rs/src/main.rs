//! LEACH Node - network simulator
//!
//! Runs one master and its members in a single process. Status lines for
//! the monitoring GUI go to stdout, logs go to stderr.

mod medium;
mod sensors;
mod sim;
mod topology;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::sim::Simulation;
use crate::topology::Topology;

/// LEACH wireless sensor network simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Topology file (JSON)
    topology: PathBuf,

    /// Simulated run length in seconds, overrides the topology file
    #[arg(short, long)]
    duration: Option<u64>,

    /// Simulated seconds per real second
    #[arg(short, long, default_value = "1.0")]
    speed: f64,

    /// Write a JSON summary here when the run ends
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if !(args.speed.is_finite() && args.speed > 0.0) {
        anyhow::bail!("speed must be a positive number, got {}", args.speed);
    }

    let topology = Topology::load(&args.topology)?;
    let duration = Duration::from_secs(args.duration.unwrap_or(topology.duration_s));
    info!(
        master = %topology.master,
        members = topology.members.len(),
        links = topology.links.len(),
        duration_s = duration.as_secs(),
        speed = args.speed,
        "LEACH simulation starting"
    );

    let mut sim = Simulation::new(&topology);
    let print = |event: &leach_core::StatusEvent| println!("{event}");
    tokio::select! {
        _ = sim.run(duration, args.speed, print) => {}
        _ = tokio::signal::ctrl_c() => warn!("interrupted"),
    }
    let stats = sim.stats();

    info!(
        sent = stats.sent,
        delivered = stats.delivered,
        rejected = stats.rejected,
        errors = stats.errors,
        resets = stats.resets,
        converged = sim.converged(),
        "run complete"
    );

    if let Some(path) = args.summary {
        let master = sim.master();
        let election = master.election();
        let summary = serde_json::json!({
            "master": topology.master,
            "state": master.state().to_string(),
            "known_nodes": master.liveness().known_count(),
            "converged": sim.converged(),
            "epoch": election.map(|e| e.epoch),
            "grade": election.map(|e| e.grade),
            "heads": election.map(|e| e.heads.iter().copied().collect::<Vec<_>>()),
            "stats": stats,
        });
        std::fs::write(&path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("writing summary {}", path.display()))?;
        info!("Summary written to: {}", path.display());
    }

    Ok(())
}
