//! ferrosnmp agent daemon

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use ferrosnmp::{config::EngineConfig, core::SnmpEngine, utils::setup_logging, Result};

#[derive(Parser)]
#[command(name = "ferrosnmp")]
#[command(about = "Multi-version SNMP engine (agent and manager)")]
#[command(version = ferrosnmp::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine
    Start,
    /// Validate configuration
    ValidateConfig,
    /// Generate default configuration
    GenerateConfig {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_configuration(&cli)?;
    setup_logging(&config.logging)?;

    info!("Starting {} v{}", ferrosnmp::NAME, ferrosnmp::VERSION);

    match &cli.command {
        Some(Commands::Start) | None => run_engine(config).await,
        Some(Commands::ValidateConfig) => validate_configuration(&config),
        Some(Commands::GenerateConfig { output }) => generate_default_config(output.clone()),
    }
}

fn load_configuration(cli: &Cli) -> Result<EngineConfig> {
    let config = if let Some(config_path) = &cli.config {
        EngineConfig::load_from_file(config_path)?
    } else {
        match EngineConfig::load_from_env() {
            Ok(config) => config,
            Err(_) => EngineConfig::default_config(),
        }
    };

    config.validate()?;
    Ok(config)
}

async fn run_engine(config: EngineConfig) -> Result<()> {
    let mut engine = SnmpEngine::new(config)?;
    engine.start().await?;

    // surface received notifications in the log when the receiver role
    // is on
    if let Some(mut notifications) = engine.take_notification_receiver() {
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                match &notification.trap_oid {
                    Some(oid) => info!(
                        source = %notification.source,
                        trap = %oid,
                        informed = notification.informed,
                        "notification received"
                    ),
                    None => warn!(
                        source = %notification.source,
                        "notification without snmpTrapOID.0"
                    ),
                }
            }
        });
    }

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down gracefully");
            engine.stop().await?;
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
            engine.stop().await?;
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn validate_configuration(config: &EngineConfig) -> Result<()> {
    config.validate()?;

    println!("✓ Configuration is valid");
    println!("  Engine name: {}", config.general.name);
    println!(
        "  Listen: {}:{}",
        config.transport.bind_address, config.transport.port
    );
    println!("  Agent enabled: {}", config.agent.enabled);
    println!("  Communities: {}", config.communities.len());
    println!("  USM users: {}", config.usm_users.len());
    println!("  Targets: {}", config.targets.len());

    Ok(())
}

fn generate_default_config(output_path: Option<PathBuf>) -> Result<()> {
    let config = EngineConfig::default_config();
    let toml_content = toml::to_string_pretty(&config)
        .map_err(|e| ferrosnmp::Error::internal(format!("Failed to serialize config: {}", e)))?;

    match output_path {
        Some(path) => {
            std::fs::write(&path, toml_content)?;
            println!("✓ Default configuration written to: {}", path.display());
        }
        None => {
            println!("{}", toml_content);
        }
    }

    Ok(())
}
