//! Nautilus CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memory_cache::MemoryCache;
use nautilus_config::{load_and_merge, Config, LoggingConfig};
use nautilus_extension_runtime::{ExtensionRegistry, OperationResult};
use nautilus_health::HealthSupervisor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "nautilus")]
#[command(about = "Nautilus extension runtime", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and activate the bundled extensions, then supervise them
    Run {
        /// Configuration files, merged in order
        #[arg(short, long, default_value = "nautilus.yaml", env = "NAUTILUS_CONFIG")]
        config: Vec<PathBuf>,

        /// Override the configured log level
        #[arg(short, long)]
        log_level: Option<String>,
    },

    /// Validate configuration files
    Validate {
        /// Configuration files, merged in order
        #[arg(short, long, default_value = "nautilus.yaml")]
        config: Vec<PathBuf>,
    },

    /// Activate everything once and print the health report as JSON
    Health {
        /// Configuration files, merged in order
        #[arg(short, long, default_value = "nautilus.yaml")]
        config: Vec<PathBuf>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, log_level } => {
            let config = load(&config)?;
            init_tracing(&config.logging, log_level.as_deref())?;

            tracing::info!(
                extensions = config.extensions.len(),
                health = config.health.enabled,
                "Configuration loaded"
            );

            let registry = start(config).await?;
            let supervisor = HealthSupervisor::from_registry(registry.clone());
            let handle = supervisor.start();

            tracing::info!("Runtime started, press Ctrl+C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;

            tracing::info!("Shutdown signal received");
            handle.stop().await;
            registry.shutdown().await;

            tracing::info!("Runtime stopped");
            Ok(())
        }

        Commands::Validate { config } => {
            tracing_subscriber::fmt().with_target(false).init();

            tracing::info!(files = config.len(), "Validating configuration");

            match load_and_merge(config) {
                Ok(cfg) => {
                    tracing::info!("✓ Configuration is valid");
                    tracing::info!("  Operation timeout: {:?}", cfg.runtime.operation_timeout);
                    tracing::info!("  Health interval: {:?}", cfg.health.interval);
                    tracing::info!("  Extensions: {}", cfg.extensions.len());
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Health { config } => {
            let config = load(&config)?;
            init_tracing(&LoggingConfig::default(), Some("warn"))?;

            let registry = start(config).await?;
            let supervisor = HealthSupervisor::from_registry(registry.clone());
            let report = supervisor.get_system_health_report().await;
            registry.shutdown().await;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.healthy {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Version => {
            println!("Nautilus extension runtime");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

fn load(paths: &[PathBuf]) -> Result<Config> {
    load_and_merge(paths.to_vec()).with_context(|| {
        let names: Vec<_> = paths.iter().map(|p| p.display().to_string()).collect();
        format!("failed to load configuration from {}", names.join(", "))
    })
}

/// Build the registry from `config` and bring every enabled extension up
async fn start(config: Config) -> Result<Arc<ExtensionRegistry>> {
    let registry = ExtensionRegistry::builder()
        .host_config(Arc::new(config))
        .build();

    registry
        .register(Arc::new(MemoryCache::new()), None)
        .await
        .context("failed to register memory cache")?;

    let results = registry.activate_all().await;
    report_failures(&results);

    Ok(registry)
}

fn report_failures(results: &[OperationResult]) {
    for result in results.iter().filter(|r| !r.success) {
        tracing::warn!(
            extension = %result.extension_id,
            code = result.error_code().map(|c| c.as_str()).unwrap_or("UNKNOWN"),
            "Extension failed to activate"
        );
    }
}

fn init_tracing(logging: &LoggingConfig, level: Option<&str>) -> Result<()> {
    let level = level.unwrap_or(&logging.level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level: {level}"))?;

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true),
            )
            .init();
    }

    Ok(())
}
