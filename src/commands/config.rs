use clap::{Args, Subcommand};
use serde::Serialize;

use sshdbg::config::{self, SshdbgConfig};
use sshdbg::paths;

use super::{read_json_spec_to_string, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Display configuration (built-in defaults merged with sshdbg.json)
    Show {
        /// Show only built-in defaults (ignore sshdbg.json)
        #[arg(long)]
        builtin: bool,
    },
    /// Deep-merge a JSON object into sshdbg.json (`null` removes a key)
    Set {
        /// JSON object, @file or - for stdin
        /// (e.g. '{"ssh":{"host":"raspberrypi.local"}}')
        spec: String,
    },
    /// Reset configuration to built-in defaults (deletes sshdbg.json)
    Reset,
    /// Show the path to sshdbg.json
    Path,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<SshdbgConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<bool>,
}

impl ConfigOutput {
    fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            config: None,
            path: None,
            exists: None,
            deleted: None,
        }
    }
}

pub fn run(args: ConfigArgs, _global: &GlobalArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show { builtin } => show(builtin),
        ConfigCommand::Set { spec } => set(&spec),
        ConfigCommand::Reset => reset(),
        ConfigCommand::Path => path(),
    }
}

fn show(builtin: bool) -> CmdResult<ConfigOutput> {
    let config = if builtin {
        SshdbgConfig::default()
    } else {
        config::load()?
    };

    Ok((
        ConfigOutput {
            config: Some(config),
            ..ConfigOutput::new("config.show")
        },
        0,
    ))
}

fn set(spec: &str) -> CmdResult<ConfigOutput> {
    let raw = read_json_spec_to_string(spec)?;
    let config = config::merge(&raw)?;

    Ok((
        ConfigOutput {
            config: Some(config),
            path: Some(paths::sshdbg_json()?.display().to_string()),
            ..ConfigOutput::new("config.set")
        },
        0,
    ))
}

fn reset() -> CmdResult<ConfigOutput> {
    let deleted = config::reset()?;

    Ok((
        ConfigOutput {
            config: Some(SshdbgConfig::default()),
            path: Some(paths::sshdbg_json()?.display().to_string()),
            deleted: Some(deleted),
            ..ConfigOutput::new("config.reset")
        },
        0,
    ))
}

fn path() -> CmdResult<ConfigOutput> {
    let path = paths::sshdbg_json()?;

    Ok((
        ConfigOutput {
            exists: Some(path.exists()),
            path: Some(path.display().to_string()),
            ..ConfigOutput::new("config.path")
        },
        0,
    ))
}
