use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use resilience_core::{
    app_context::AppBuilder,
    cli::{Cli, Commands},
    config::AppConfig,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load environment variables from .env file
    dotenv().ok();

    // Initialize tracing with environment filter using CLI log level
    let log_level = format!("resilience_core={},info", cli.log_level);
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => {
            let config = AppConfig::from_run_args(&args, &cli.log_level)?;
            let context = AppBuilder::new().with_config(config).build()?;
            context.run().await
        }
        Commands::Health(args) => {
            let config = AppConfig::from_run_args(&args, &cli.log_level)?;
            let context = AppBuilder::new().with_config(config).build()?;
            let summary = context.health_snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::ShowConfig(args) => {
            let config = AppConfig::from_run_args(&args, &cli.log_level)?;
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}
