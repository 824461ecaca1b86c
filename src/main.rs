use clap::Parser;
use dispersion_monitor::cli::{Cli, Commands};
use dispersion_monitor::config::Config;
use dispersion_monitor::instruments::InstrumentSet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        toml::from_str(include_str!("../config.toml.example")).expect("Invalid default config")
    });

    // Initialize telemetry
    dispersion_monitor::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting dispersion monitor");
            args.execute(&config).await?;
        }
        Commands::Constituents => {
            let set = InstrumentSet::banknifty();
            println!("{:<12} {:>9} {:>8} {:>9}", "SYMBOL", "TOKEN", "WEIGHT", "LOT SIZE");
            for instrument in set.all() {
                println!(
                    "{:<12} {:>9} {:>7}% {:>9}",
                    instrument.symbol, instrument.token, instrument.weight, instrument.lot_size
                );
            }
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Broker: {} (credentials {})",
                config.broker.api_base_url,
                if config.broker.credentials().is_some() {
                    "configured"
                } else {
                    "absent, synthetic data"
                }
            );
            println!("  Reference value: {}", config.portfolio.reference_value);
            println!(
                "  Polling: every {}s, pool {}, timeout {}ms",
                config.polling.interval().as_secs(),
                config.polling.worker_pool_size,
                config.polling.fetch_timeout_ms
            );
            println!(
                "  Push: {} attempts, {}s delay",
                config.push.reconnect_attempts, config.push.reconnect_delay_secs
            );
            println!("  Cache TTL: {}s", config.cache.ttl_secs);
        }
    }

    Ok(())
}
