//! Process Freezer - suspend and resume processes from the tray
//!
//! Registered processes are frozen and resumed through an external suspend
//! tool, optionally hiding their windows while frozen. A global hotkey
//! toggles the process list.

mod cli;
mod config;
mod error;
mod events;
mod hider;
mod hotkey;
mod logging;
mod orchestrator;
mod process_table;
mod registry;
mod settings_watcher;
mod suspend;
mod utils;

#[cfg(windows)]
mod app;
#[cfg(windows)]
mod platform;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::{Cli, Command};
use crate::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = cli.paths();

    let config = Config::load_or_default(&paths.settings_path())?;
    logging::init(&config.logging, Some(&paths.log_path()));

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_app(paths, config),
        command => {
            let stdout = std::io::stdout();
            cli::execute(&command, &paths, &config, &mut stdout.lock())
        }
    }
}

#[cfg(windows)]
fn run_app(paths: config::Paths, config: Config) -> Result<()> {
    info!("Starting Process Freezer v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", paths.data_dir());

    let mut app = app::Application::new(paths, config)?;
    app.run()?;

    info!("Process Freezer shutting down gracefully");
    Ok(())
}

#[cfg(not(windows))]
fn run_app(_paths: config::Paths, _config: Config) -> Result<()> {
    info!("Tray application requested on an unsupported platform");
    anyhow::bail!("the tray application requires Windows; use the list/add/toggle commands instead")
}
