//! netmoded - network mode daemon
//!
//! `start` arbitrates once and then keeps watching the wired link;
//! `stop` tears down client and hotspot state; `test` prints what was
//! last published.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use netmode_common::{DaemonPaths, EnvParameters, NetworkDecision, StatusPublisher};
use netmoded::{logging, Arbitrator, EthernetWatcher, Interfaces, Platform, SystemPlatform, Timings};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "netmoded")]
#[command(about = "Network mode arbitration daemon", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full arbitration and keep watching the wired link
    Start,
    /// Tear down client and hotspot state
    Stop,
    /// Print the published decision and wired link status
    Test,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = DaemonPaths::default();
    let env = EnvParameters::load(&paths.env_file);
    logging::init(&paths.log_file, env.debug)?;

    match cli.command {
        Commands::Start => start(paths, env).await,
        Commands::Stop => stop(paths, env).await,
        Commands::Test => test(&paths),
    }
}

fn arbitrator(paths: DaemonPaths, env: &EnvParameters) -> Arbitrator {
    let timings = Timings::default();
    let platform: Arc<dyn Platform> = Arc::new(SystemPlatform::new(paths.clone(), timings.clone()));
    Arbitrator::new(
        platform,
        paths,
        timings,
        Interfaces::default(),
        env.single_network_mode,
    )
}

async fn start(paths: DaemonPaths, env: EnvParameters) -> Result<()> {
    info!("netmoded v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Single Network Mode: {}",
        if env.single_network_mode { "enabled" } else { "disabled" }
    );

    let arbitrator = arbitrator(paths.clone(), &env);
    let wlan = arbitrator.interfaces().wlan.clone();
    if !arbitrator.inspector().exists(&wlan) {
        error!("WIRELESS: No wireless interface {} found, publishing offline", wlan);
        StatusPublisher::new(paths).publish(NetworkDecision::Offline, false);
        bail!("wireless interface {} not present", wlan);
    }

    let watcher = EthernetWatcher::new(arbitrator.clone());
    let watch = match watcher.start().await {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Ethernet watcher unavailable: {:#}", e);
            None
        }
    };

    if let Some(settlement) = arbitrator.run().await {
        info!("Arbitration settled: {:?}", settlement);
    }

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = term.recv() => info!("Received SIGTERM"),
    }

    if let Some(handle) = watch {
        handle.abort();
    }
    info!("Shutting down gracefully");
    Ok(())
}

async fn stop(paths: DaemonPaths, env: EnvParameters) -> Result<()> {
    info!("Stopping wireless networking");
    arbitrator(paths, &env).stop().await;
    Ok(())
}

fn test(paths: &DaemonPaths) -> Result<()> {
    let publisher = StatusPublisher::new(paths.clone());
    let decision = publisher
        .read_decision()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let wired = publisher
        .read_wired_status()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("network decision: {}", decision);
    println!("wired link:       {}", wired);
    Ok(())
}
