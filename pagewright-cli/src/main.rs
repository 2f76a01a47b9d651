//! Pagewright CLI - Webhook service and tooling for Pagewright
//!
//! Receives task briefs over HTTP, generates static web apps, and publishes
//! them as public repositories with live sites.

mod commands;
mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pagewright_core::config::CliOverrides;
use pagewright_core::{Config, Secrets};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{RegistryArgs, ServeArgs};

/// Pagewright: turn task briefs into published static sites
#[derive(Parser, Debug)]
#[command(name = "pagewright")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (overrides ~/.config/pagewright/config.toml)
    #[arg(long, global = true, env = "PAGEWRIGHT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Run the webhook service
    #[command(visible_alias = "s")]
    Serve(ServeArgs),

    /// Show the task to repository mapping
    Registry(RegistryArgs),

    /// Show current configuration
    Config,

    /// Create a secrets file template
    InitSecrets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let overrides = match &cli.command {
        Some(Commands::Serve(args)) => args.overrides(),
        _ => CliOverrides::default(),
    };

    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.config.as_deref(), overrides)?;

    if cli.verbose {
        tracing::info!(
            bind = %config.server.bind,
            provider = ?config.provider.kind,
            workspace = %config.storage.workspace_dir.display(),
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("pagewright {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve(args)) => {
            let secrets = Secrets::load()?;
            args.execute(&config, &secrets).await?;
        }
        Some(Commands::Registry(args)) => {
            args.execute(&config)?;
        }
        Some(Commands::Config) => {
            println!("Pagewright Configuration");
            println!("========================");
            println!();
            println!("{}", toml::to_string_pretty(&config)?);
            if let Some(path) = cli.config.clone().or_else(Config::default_config_path) {
                println!("Config file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - using defaults)");
                }
            }
            if let Some(path) = Secrets::default_secrets_path() {
                println!("Secrets file: {}", path.display());
            }
        }
        Some(Commands::InitSecrets) => {
            let path = Secrets::create_template()?;
            println!("Created secrets template at {}", path.display());
            println!("Fill in the values, then keep the file mode at 0600.");
        }
        None => {
            println!("Pagewright - Static site generation and publishing service");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
