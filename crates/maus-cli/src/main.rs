use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use maus_core::AppConfig;

mod commands;

#[derive(Parser)]
#[command(name = "maus")]
#[command(author, version, about = "Trackpad-like inertial scrolling for mechanical mouse wheels")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Background daemon that owns the scroll engine
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Turn smooth scrolling on
    Enable,
    /// Turn smooth scrolling off
    Disable,
    /// Show engine status and the permission indicator
    Status {
        /// Print the raw status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Accessibility permission
    Permission {
        #[command(subcommand)]
        action: PermissionAction,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the daemon in the foreground
    Start,
    /// Stop the background daemon
    Stop,
    /// Check daemon status
    Status,
}

#[derive(Subcommand)]
enum PermissionAction {
    /// Ask macOS to prompt for Accessibility access for the daemon
    Request,
    /// Open the Accessibility pane of System Settings
    OpenSettings,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Handle commands
    match cli.command {
        Commands::Daemon { action } => match action {
            DaemonAction::Start => commands::daemon::start(config).await,
            DaemonAction::Stop => commands::daemon::stop(&config).await,
            DaemonAction::Status => commands::daemon::status(&config).await,
        },
        Commands::Enable => commands::engine::enable(&config).await,
        Commands::Disable => commands::engine::disable(&config).await,
        Commands::Status { json } => commands::engine::status(&config, json).await,
        Commands::Permission { action } => match action {
            PermissionAction::Request => commands::permission::request(&config).await,
            PermissionAction::OpenSettings => commands::permission::open_settings(),
        },
        Commands::Config { action } => match action {
            ConfigAction::Path => commands::config::path(),
            ConfigAction::Show => commands::config::show(&config),
        },
    }
}
