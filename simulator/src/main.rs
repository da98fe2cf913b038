use anyhow::{Context, Result};
use clap::Parser;
use commonware_utils::hex;
use encwars_simulator::{Api, Simulator, SimulatorConfig, DEFAULT_LEDGER_NAME};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Name the ledger address is derived from.
    #[arg(long, default_value = DEFAULT_LEDGER_NAME)]
    ledger_name: String,

    /// Seed for the simulated coprocessor (optional).
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Accepted clock skew for grant issue times, in seconds.
    #[arg(long)]
    max_clock_skew_secs: Option<u64>,
}

fn build_config(args: &Args) -> Result<SimulatorConfig> {
    let defaults = SimulatorConfig::default();
    if args.ledger_name.trim().is_empty() {
        anyhow::bail!("ledger_name must not be empty");
    }
    Ok(SimulatorConfig {
        ledger_name: args.ledger_name.clone(),
        seed: args.seed.unwrap_or(defaults.seed),
        max_clock_skew_secs: args
            .max_clock_skew_secs
            .unwrap_or(defaults.max_clock_skew_secs),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let config = build_config(&args)?;
    let simulator = Arc::new(Simulator::new(config));
    info!(
        address = %hex(simulator.address().as_ref()),
        seed = simulator.config().seed,
        "simulator ledger ready"
    );
    let api = Api::new(simulator);
    let app = api.router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}
