use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "resilience-core")]
#[command(about = "Task lifecycle, retry and health monitoring runtime for long-lived services")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start health monitoring and block until SIGINT/SIGTERM
    Run(RunArgs),

    /// Run every configured probe once and print the summary as JSON
    Health(RunArgs),

    /// Print the effective configuration as YAML
    ShowConfig(RunArgs),
}

#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "RESILIENCE_CONFIG")]
    pub config: Option<String>,

    /// Database address probed with a TCP connect (host:port)
    #[arg(long, env = "DATABASE_ADDR")]
    pub database_addr: Option<String>,

    /// API health endpoint probed with HTTP GET
    #[arg(long, env = "API_HEALTH_URL")]
    pub api_url: Option<String>,

    /// ML service health endpoint probed with HTTP GET
    #[arg(long, env = "ML_HEALTH_URL")]
    pub ml_url: Option<String>,

    /// Cache address probed with a TCP connect (host:port)
    #[arg(long, env = "CACHE_ADDR")]
    pub cache_addr: Option<String>,

    /// Skip the system resource probe
    #[arg(long)]
    pub no_system_probe: bool,

    /// Shutdown timeout in seconds (overrides the config file)
    #[arg(long)]
    pub shutdown_timeout_secs: Option<u64>,
}
