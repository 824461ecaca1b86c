//! Run command implementation

use crate::config::Config;
use crate::service::DispersionService;
use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Compute one calculation, print it as JSON and exit
    #[arg(long)]
    pub once: bool,

    /// OTM levels to include alongside the ATM calculation (max 3)
    #[arg(long)]
    pub otm: Option<u32>,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let service = DispersionService::from_config(config);

        if self.once {
            // One refresh straight through the pipeline, no source loop
            let response = service.dispersion_data().await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if let Some(levels) = self.otm {
                let otm = service.otm_levels(Some(levels)).await?;
                println!("{}", serde_json::to_string_pretty(&otm)?);
            }
            return Ok(());
        }

        service.start().await;
        service.aggregator().subscribe(Box::new(|snapshot| {
            let valid = snapshot.constituents.len() - snapshot.failed_count();
            tracing::info!(
                constituents = valid,
                failed = snapshot.failed_count(),
                "Snapshot published"
            );
            Ok(())
        }));

        tracing::info!("Monitor running, Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;

        tracing::info!("Shutting down");
        service.stop().await;
        Ok(())
    }
}
