use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use switchyard::config::{Config, ConfigError, SourceConfig};
use switchyard::routing::{Router, StoreKind};
use switchyard::utils::{abbreviate_key, format_duration};
use switchyard::{InstanceRegistry, TcpBackend, TcpBackendFactory};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "A multi-role backend router for relational and cache stores")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every configured source, print its routing table, then close it
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/dev.toml")]
        config: PathBuf,
    },
    /// Generate example configuration files
    Config {
        /// Store kind (relational or cache)
        #[arg(short, long)]
        kind: String,
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            check_sources(config).await?;
        }
        Commands::Config { kind, output } => {
            generate_config(kind, output)?;
        }
        Commands::Validate { config } => {
            validate_config(config)?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}

async fn check_sources(config_path: PathBuf) -> anyhow::Result<()> {
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        path = ?config_path,
        sources = config.sources.len(),
        "checking sources"
    );

    // the identity key does not cover the probe protocol, so kinds never share
    let relational = InstanceRegistry::new();
    let cache = InstanceRegistry::new();
    let mut failed = 0;

    for source in &config.sources {
        let factory = TcpBackendFactory::new(source.kind);
        let registry = match source.kind {
            StoreKind::Relational => &relational,
            StoreKind::Cache => &cache,
        };
        let router = Router::from_config(source, &factory, registry).await;

        print_routing_table(source, &router).await;
        if let Some(e) = router.error().await {
            failed += 1;
            println!("  ✗ {}", e);
        } else {
            println!("  ✓ ready");
        }

        if let Err(e) = router.close().await {
            eprintln!("  close failed: {}", e);
        }
        println!();
    }

    if failed > 0 {
        bail!("{} of {} sources failed", failed, config.sources.len());
    }

    Ok(())
}

async fn print_routing_table(source: &SourceConfig, router: &Router<TcpBackend>) {
    println!("{} ({}, {:?} pooler)", source.name, source.kind, source.pooler);
    println!(
        "  lifetime window: {}, slow threshold: {}",
        format_duration(Duration::from_secs(source.tuning.lifetime_window_sec)),
        format_duration(Duration::from_millis(source.tuning.slow_threshold_ms)),
    );

    for role in source.kind.roles() {
        let members = router.members(*role).await;
        println!("  {}: {} backend(s)", source.kind.role_name(*role), members.len());
        for handle in members.iter() {
            println!(
                "    {} -> {}  [{}]",
                handle.name(),
                handle.connection().addr,
                abbreviate_key(handle.key().as_str(), 12)
            );
        }
    }
}

fn generate_config(kind: String, output: PathBuf) -> anyhow::Result<()> {
    println!("Generating {} configuration file: {:?}", kind, output);

    Config::create_example_config(&output, &kind).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  switchyard check --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid");
            println!("  Log level: {} ({})", config.logging.level, config.logging.format);
            println!("  Sources: {}", config.sources.len());

            for source in &config.sources {
                println!("  {} ({}):", source.name, source.kind);
                for role in source.kind.roles() {
                    let endpoints = source.endpoints(*role);
                    if endpoints.is_empty() {
                        continue;
                    }
                    println!(
                        "    {}: {} endpoint(s)",
                        source.kind.role_name(*role),
                        endpoints.len()
                    );
                    for (i, endpoint) in endpoints.iter().enumerate() {
                        println!("      {}: {} {}", i + 1, endpoint.name, endpoint.address);
                    }
                }
            }
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            return Err(e.into());
        }
    }

    Ok(())
}

fn show_version() {
    println!("switchyard v{}", env!("CARGO_PKG_VERSION"));
    println!("A multi-role backend router for relational and cache stores");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!();
    println!("Features:");
    println!("  • Read/write splitting with shadow and gray traffic");
    println!("  • Deduplicated backend construction");
    println!("  • Hot membership swaps with delayed retirement");
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    }
    .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!(level = %config.logging.level, format = %config.logging.format, "logging initialized");
    Ok(())
}
