//! resilience-core daemon.
//!
//! Runs the resilience layer as a standalone process: probes configured
//! dependencies under their retry policies and serves the admin API for
//! statistics, breaker states and health.
//!
//! ```text
//!   config.toml ──▶ loader ──▶ Resilience (global) ◀── watcher (hot reload)
//!                                   │
//!           ┌───────────────────────┼───────────────────────┐
//!           ▼                       ▼                       ▼
//!     ProbeMonitor            BreakerRegistry          StatsCollector
//!   (GET deps on tick)     (per-policy breakers)     (counters, rates)
//!                                   │                       │
//!                                   └──────────┬────────────┘
//!                                              ▼
//!                                   Admin API (/admin/*)
//! ```

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "resilience-core")]
#[command(about = "Retry, circuit breaking and error statistics daemon", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    resilience_core::lifecycle::startup::run(args.config).await?;
    Ok(())
}
