use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::info;

use super::demo::build_demo_app;
use crate::config::ServerConfig;
use crate::logging::{init_logging_with_config, LogConfig};
use crate::runtime_config::RuntimeConfig;
use crate::server::HttpServer;

/// Command-line interface for brrtkit
#[derive(Parser)]
#[command(name = "brrtkit")]
#[command(about = "brrtkit demo server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the demo server until SIGINT or SIGTERM
    Serve {
        /// YAML configuration file
        #[arg(short, long, env = "BRRTKIT_CONFIG")]
        config: Option<PathBuf>,

        /// Address to bind, overrides the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Print the demo route table
    Routes {
        #[arg(short, long, env = "BRRTKIT_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Configuration file (or defaults), then environment overrides, then validation.
pub fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config, bind } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            init_logging_with_config(&LogConfig::from_env())?;
            RuntimeConfig::from_env().apply();

            let (app, _metrics) = build_demo_app(&config)?;
            let handle = HttpServer(app.build())
                .start(config.bind.as_str())
                .with_context(|| format!("failed to bind {}", config.bind))?;
            info!(addr = %handle.local_addr(), "brrtkit serving");

            wait_for_shutdown()?;
            info!("Shutdown signal received");
            handle.stop();
            Ok(())
        }
        Commands::Routes { config } => {
            let config = load_config(config.as_ref())?;
            let (app, _metrics) = build_demo_app(&config)?;
            app.routes().dump_routes();
            Ok(())
        }
    }
}

#[cfg(unix)]
fn wait_for_shutdown() -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Signal received");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown() -> anyhow::Result<()> {
    loop {
        std::thread::park();
    }
}
