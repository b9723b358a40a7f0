//! Command line interface
//!
//! `run` starts the tray application; every other command works directly on
//! the registry and exits. CLI freezes never hide windows: snapshots live
//! only as long as the process that took them.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{Config, Paths};
use crate::error::{FreezerError, FreezerResult};
use crate::hider::{WindowHandle, WindowHider, WindowSystem};
use crate::orchestrator::{FreezeOrchestrator, FreezeState};
use crate::process_table::{display_name_for, SysinfoProcessTable};
use crate::registry::ProcessStore;
use crate::suspend::ExternalTool;

#[derive(Parser, Debug)]
#[command(
    name = "process-freezer",
    version,
    about = "Suspend and resume processes from the tray or the command line"
)]
pub struct Cli {
    /// Directory holding processes.json, settings.toml and the log file
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the tray application (default)
    Run,
    /// Show registered processes and their state
    List,
    /// Register a process by image name or pid
    Add {
        identifier: String,
        /// Display name; derived from the image name when omitted
        #[arg(long)]
        name: Option<String>,
    },
    /// Forget a process (it is not resumed)
    Remove { identifier: String },
    /// Freeze a running process or resume a frozen one
    Toggle { identifier: String },
    /// Suspend a registered process
    Freeze { identifier: String },
    /// Resume a registered process
    Resume { identifier: String },
    /// Print the settings file location and contents
    Settings,
}

impl Cli {
    pub fn paths(&self) -> Paths {
        match &self.data_dir {
            Some(dir) => Paths::new(dir),
            None => Paths::default_location(),
        }
    }
}

/// Window system for CLI runs: sees no windows, so nothing is hidden
struct NoWindows;

impl WindowSystem for NoWindows {
    fn visible_windows(&self, _pid: u32) -> FreezerResult<Vec<WindowHandle>> {
        Ok(Vec::new())
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        None
    }

    fn hide(&self, _window: WindowHandle) -> FreezerResult<()> {
        Ok(())
    }

    fn show(&self, _window: WindowHandle) -> FreezerResult<()> {
        Ok(())
    }

    fn set_foreground(&self, _window: WindowHandle) -> FreezerResult<()> {
        Ok(())
    }
}

fn orchestrator(paths: &Paths, config: &Config) -> FreezeOrchestrator {
    let store = ProcessStore::load(paths.registry_path()).into_shared();
    let processes = Arc::new(SysinfoProcessTable::new());
    let hider = Arc::new(WindowHider::new(Arc::new(NoWindows), processes.clone()));
    FreezeOrchestrator::new(
        store,
        hider,
        Arc::new(ExternalTool::from_config(&config.suspend)),
        config.clone().into_shared(),
        processes,
    )
}

fn user_error(e: FreezerError) -> anyhow::Error {
    anyhow!(e.user_message())
}

/// Run a non-GUI command, writing human-readable output to `out`
pub fn execute(
    command: &Command,
    paths: &Paths,
    config: &Config,
    out: &mut dyn Write,
) -> Result<()> {
    let orchestrator = orchestrator(paths, config);

    match command {
        Command::Run => Err(anyhow!("`run` is handled by the application entry point")),
        Command::List => {
            let status = orchestrator.status();
            if status.is_empty() {
                writeln!(out, "No processes registered.")?;
                return Ok(());
            }
            writeln!(out, "{:<8} {:<8} {:<32} NAME", "STATE", "RUNNING", "IDENTIFIER")?;
            for s in status {
                writeln!(
                    out,
                    "{:<8} {:<8} {:<32} {}",
                    s.state.label(),
                    if s.running { "yes" } else { "no" },
                    s.identifier,
                    s.display_name
                )?;
            }
            Ok(())
        }
        Command::Add { identifier, name } => {
            let name = name
                .clone()
                .unwrap_or_else(|| display_name_for(identifier.trim()));
            orchestrator.add(identifier, &name).map_err(user_error)?;
            writeln!(out, "Added {} ({})", identifier.trim(), name)?;
            Ok(())
        }
        Command::Remove { identifier } => {
            if orchestrator.remove(identifier).map_err(user_error)? {
                writeln!(out, "Removed {}", identifier)?;
            } else {
                writeln!(out, "{} is not registered", identifier)?;
            }
            Ok(())
        }
        Command::Toggle { identifier } => {
            let state = orchestrator.toggle(identifier).map_err(user_error)?;
            report_state(out, identifier, state)
        }
        Command::Freeze { identifier } => {
            let state = orchestrator.freeze(identifier).map_err(user_error)?;
            report_state(out, identifier, state)
        }
        Command::Resume { identifier } => {
            let state = orchestrator.resume(identifier).map_err(user_error)?;
            report_state(out, identifier, state)
        }
        Command::Settings => {
            let path = paths.settings_path();
            writeln!(out, "# {}", path.display())?;
            let content = toml::to_string_pretty(config).context("Failed to render settings")?;
            write!(out, "{}", content)?;
            Ok(())
        }
    }
}

fn report_state(out: &mut dyn Write, identifier: &str, state: FreezeState) -> Result<()> {
    writeln!(out, "{} is {}", identifier, state.label().to_lowercase())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn run(command: Command, paths: &Paths, config: &Config) -> Result<String> {
        let mut out = Vec::new();
        execute(&command, paths, config, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn parses_commands() {
        let cli = Cli::try_parse_from(["process-freezer"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from([
            "process-freezer",
            "add",
            "notepad.exe",
            "--name",
            "Notepad",
            "--data-dir",
            "/tmp/pf",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Add {
                identifier: "notepad.exe".into(),
                name: Some("Notepad".into())
            })
        );
        assert!(cli.paths().registry_path().starts_with("/tmp/pf"));

        assert!(Cli::try_parse_from(["process-freezer", "toggle"]).is_err());
    }

    #[test]
    fn add_list_remove() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let config = Config::default();

        let out = run(
            Command::Add {
                identifier: "notepad.exe".into(),
                name: None,
            },
            &paths,
            &config,
        )
        .unwrap();
        assert_eq!(out, "Added notepad.exe (Notepad)\n");

        let out = run(Command::List, &paths, &config).unwrap();
        assert!(out.contains("notepad.exe"));
        assert!(out.contains("Running"));

        let out = run(
            Command::Remove {
                identifier: "notepad.exe".into(),
            },
            &paths,
            &config,
        )
        .unwrap();
        assert_eq!(out, "Removed notepad.exe\n");
        assert_eq!(
            run(Command::List, &paths, &config).unwrap(),
            "No processes registered.\n"
        );
    }

    #[test]
    fn toggle_unknown_process_fails() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let err = run(
            Command::Toggle {
                identifier: "ghost.exe".into(),
            },
            &paths,
            &Config::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("ghost.exe"));
    }

    #[cfg(unix)]
    #[test]
    fn freeze_and_resume_through_configured_tool() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut config = Config::default();
        config.suspend.executable = "true".into();
        config.suspend.resume_flag = String::new();

        run(
            Command::Add {
                identifier: "notepad.exe".into(),
                name: Some("Notepad".into()),
            },
            &paths,
            &config,
        )
        .unwrap();

        let freeze = Command::Freeze {
            identifier: "notepad.exe".into(),
        };
        assert_eq!(run(freeze, &paths, &config).unwrap(), "notepad.exe is frozen\n");
        assert!(ProcessStore::load(paths.registry_path())
            .get("notepad.exe")
            .unwrap()
            .desired_frozen);

        let toggle = Command::Toggle {
            identifier: "notepad.exe".into(),
        };
        assert_eq!(run(toggle, &paths, &config).unwrap(), "notepad.exe is running\n");
    }

    #[cfg(unix)]
    #[test]
    fn tool_diagnostic_is_reported() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut config = Config::default();
        config.suspend.executable = "false".into();

        run(
            Command::Add {
                identifier: "notepad.exe".into(),
                name: None,
            },
            &paths,
            &config,
        )
        .unwrap();
        let err = run(
            Command::Toggle {
                identifier: "notepad.exe".into(),
            },
            &paths,
            &config,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "exit code 1");
    }

    #[test]
    fn settings_prints_path_and_toml() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let out = run(Command::Settings, &paths, &Config::default()).unwrap();
        assert!(out.starts_with("# "));
        assert!(out.contains("toggle_hotkey = \"ctrl+alt+f\""));
    }
}
