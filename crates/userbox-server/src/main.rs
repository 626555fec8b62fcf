//! userboxd - per-user container lifecycle manager

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use userbox_config::ManagerConfig;
use userbox_core::ContainerManager;
use userbox_provider::{create_runtime, ProviderType};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "userboxd")]
#[command(author, version, about = "Per-user container lifecycle manager", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Config file (default: ~/.config/userbox/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control API server (default)
    Serve {
        /// Address to listen on, overriding the config file
        #[arg(short, long)]
        listen: Option<String>,

        /// Override the container runtime (docker or podman)
        #[arg(long, value_parser = ["docker", "podman"])]
        provider: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration to the config file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => ManagerConfig::config_path()?,
    };

    match cli.command {
        Some(Commands::Config { init, force }) => show_config(&config_path, init, force),
        Some(Commands::Serve { listen, provider }) => {
            serve(&cli.config, &config_path, listen, provider).await
        }
        None => serve(&cli.config, &config_path, None, None).await,
    }
}

fn show_config(path: &Path, init: bool, force: bool) -> anyhow::Result<()> {
    if init {
        if path.exists() && !force {
            anyhow::bail!(
                "Config file {} already exists (use --force to overwrite)",
                path.display()
            );
        }
        ManagerConfig::default().save_to(path)?;
        println!("Created default config at {}", path.display());
        return Ok(());
    }

    let config = ManagerConfig::load_from(path)?;
    if path.exists() {
        println!("# Config file: {}\n", path.display());
    } else {
        println!("# Config file: {} (not created yet)\n", path.display());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn serve(
    explicit_config: &Option<PathBuf>,
    config_path: &Path,
    listen: Option<String>,
    provider: Option<String>,
) -> anyhow::Result<()> {
    // A config file named on the command line must exist
    let mut config = match explicit_config {
        Some(_) => ManagerConfig::load_required(config_path)?,
        None => ManagerConfig::load_from(config_path)?,
    };
    if let Some(listen) = listen {
        config.server.listen = listen;
    }
    config.validate()?;

    let provider_override = provider
        .as_deref()
        .map(str::parse::<ProviderType>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let runtime = create_runtime(&config.runtime, provider_override)?;

    let data_dir = config.provisioner.data_dir_path()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let script = config.provisioner.script_path()?;
    if !script.exists() {
        tracing::warn!(
            "Provisioning script {} not found; create requests will fail",
            script.display()
        );
    }

    let manager = ContainerManager::from_config(&config, runtime)?;
    let info = manager.runtime_info();
    if manager.ping().await {
        tracing::info!("Connected to {} via '{}'", info.provider_type, info.command);
    } else {
        tracing::warn!(
            "Container runtime '{}' is not responding; requests will fail until it is",
            info.command
        );
    }

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    tracing::info!(
        "Listening on {} (users 1..={}, data in {})",
        listener.local_addr()?,
        manager.naming().max_users(),
        data_dir.display()
    );

    userbox_server::serve(listener, Arc::new(manager)).await?;
    Ok(())
}
