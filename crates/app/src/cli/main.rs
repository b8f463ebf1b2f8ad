//! Gainstage CLI Application

mod session;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gainstage_core::domain::audio::{AudioEnumerator, DeviceInfo};
use gainstage_core::domain::config::{ConfigManager, GainstageConfig};
use gainstage_core::domain::params::Command as ParamCommand;
use gainstage_infra::CpalEnumerator;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gainstage")]
#[command(about = "Real-time gain, soft clipping and peak metering", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices
    Devices,

    /// Stream input to output through the gain stage
    Run(RunArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Linear gain (0.0 to 1.0) or decibels such as -6db
    #[arg(long, value_parser = parse_gain, allow_hyphen_values = true)]
    gain: Option<f32>,

    /// Enable tanh soft clipping
    #[arg(long)]
    clip: bool,

    /// Start bypassed
    #[arg(long)]
    bypass: bool,

    /// Configuration file (defaults to the user config)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print meter readings as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the factory default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the active configuration
    Show,
    /// Print the configuration file location
    Path,
}

fn parse_gain(value: &str) -> Result<f32, String> {
    match format!("gain {value}").parse::<ParamCommand>() {
        Ok(ParamCommand::SetGain(gain)) => Ok(gain),
        Ok(_) => Err(format!("invalid gain: {value}")),
        Err(e) => Err(e.to_string()),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Run(args) => {
            let config = load_config(args.config.as_deref()).await?;
            session::run(config, &args).await
        }
        Commands::Config { action } => manage_config(action).await,
    }
}

/// Load from an explicit path, or the user config with default fallback
async fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<GainstageConfig> {
    match path {
        Some(path) => GainstageConfig::load_from_file(path)
            .await
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(ConfigManager::with_default_dir()?.load().await),
    }
}

fn print_device(device: &DeviceInfo) {
    let rate = device
        .default_sample_rate
        .map(|rate| format!("{rate} Hz"))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {:<40} {:>9}  channels {:?}",
        device.name, rate, device.channel_counts
    );
}

fn list_devices() -> anyhow::Result<()> {
    let enumerator = CpalEnumerator::new();

    println!("Input devices:");
    for device in enumerator.input_devices()? {
        print_device(&device);
    }

    println!("Output devices:");
    for device in enumerator.output_devices()? {
        print_device(&device);
    }

    if let Ok(device) = enumerator.default_input_device() {
        println!("Default input:  {}", device.name);
    }
    if let Ok(device) = enumerator.default_output_device() {
        println!("Default output: {}", device.name);
    }

    Ok(())
}

async fn manage_config(action: ConfigAction) -> anyhow::Result<()> {
    let manager = ConfigManager::with_default_dir()?;

    match action {
        ConfigAction::Init { force } => {
            if manager.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    manager.config_path().display()
                );
            }
            manager.save(&GainstageConfig::factory_default()).await?;
            println!("Wrote {}", manager.config_path().display());
        }
        ConfigAction::Show => {
            let config = manager.load().await;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => println!("{}", manager.config_path().display()),
    }

    Ok(())
}
