//! Debug launch document and the launcher it is handed to.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::{LauncherConfig, SshdbgConfig};
use crate::error::{Error, Result};
use crate::progress::ProgressSink;
use crate::project::ProjectInfo;
use crate::shell;
use crate::ssh::RemoteTarget;

pub const LAUNCH_SPEC_VERSION: &str = "0.2.0";
pub const LAUNCH_JSON_PLACEHOLDER: &str = "{launchJson}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugLaunchSpec {
    pub version: String,
    pub adapter: String,
    pub adapter_args: String,
    pub configurations: Vec<LaunchConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfiguration {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub request: String,
    pub project: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub stop_at_entry: bool,
    pub console: String,
}

fn adapter_key_arg(key: &Path) -> String {
    let key = key.display().to_string();
    if key.contains(char::is_whitespace) {
        format!("\"{}\"", key)
    } else {
        key
    }
}

pub fn build_launch_spec(
    config: &SshdbgConfig,
    target: &RemoteTarget,
    project: &ProjectInfo,
) -> DebugLaunchSpec {
    let paths = config.remote_paths();
    let adapter_args = format!(
        "-i {} -p {} {} {} --interpreter=vscode",
        adapter_key_arg(&target.private_key),
        target.port,
        target.destination(),
        paths.debugger_program(&config.debugger.executable)
    );

    DebugLaunchSpec {
        version: LAUNCH_SPEC_VERSION.to_string(),
        adapter: config.debugger.adapter.clone(),
        adapter_args,
        configurations: vec![LaunchConfiguration {
            name: ".NET Remote Launch - Framework-dependent".to_string(),
            kind: "coreclr".to_string(),
            request: "launch".to_string(),
            project: "default".to_string(),
            program: paths.runtime_program(&config.runtime.executable),
            args: vec![format!("./{}.dll", project.assembly_name)],
            cwd: paths.deployment_dir(&project.name),
            stop_at_entry: false,
            console: "internalConsole".to_string(),
        }],
    }
}

/// Consumes a launch document path. `Ok(false)` means the launcher declined.
pub trait DebugLauncher {
    fn launch(&self, launch_json: &Path) -> Result<bool>;
}

/// Runs a shell command template with `{launchJson}` replaced by the quoted path.
pub struct CommandLauncher {
    template: String,
}

impl CommandLauncher {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn command_line(&self, launch_json: &Path) -> String {
        self.template.replace(
            LAUNCH_JSON_PLACEHOLDER,
            &shell::quote_path(&launch_json.to_string_lossy()),
        )
    }
}

impl DebugLauncher for CommandLauncher {
    fn launch(&self, launch_json: &Path) -> Result<bool> {
        let command_line = self.command_line(launch_json);
        log_status!("launch", "{}", command_line);

        let status = Command::new("sh")
            .args(["-c", command_line.as_str()])
            .status()
            .map_err(|e| Error::launcher_failed(format!("{}: {}", command_line, e)))?;
        Ok(status.success())
    }
}

/// Without a configured command the document is written to the run log.
pub struct EchoLauncher<'a> {
    progress: &'a dyn ProgressSink,
}

impl<'a> EchoLauncher<'a> {
    pub fn new(progress: &'a dyn ProgressSink) -> Self {
        Self { progress }
    }
}

impl DebugLauncher for EchoLauncher<'_> {
    fn launch(&self, launch_json: &Path) -> Result<bool> {
        let content = std::fs::read_to_string(launch_json).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", launch_json.display())))
        })?;
        self.progress.write_line(&content);
        Ok(true)
    }
}

pub fn launcher_for<'a>(
    config: &LauncherConfig,
    progress: &'a dyn ProgressSink,
) -> Box<dyn DebugLauncher + 'a> {
    match config.command.as_deref().map(str::trim) {
        Some(template) if !template.is_empty() => Box::new(CommandLauncher::new(template)),
        _ => Box::new(EchoLauncher::new(progress)),
    }
}

/// The serialized document on disk. Deleted when launched or dropped.
pub struct LaunchFile {
    file: tempfile::NamedTempFile,
}

impl LaunchFile {
    pub fn write(spec: &DebugLaunchSpec) -> Result<Self> {
        let json = serde_json::to_string_pretty(spec)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize launch.json".to_string())))?;

        let mut file = tempfile::Builder::new()
            .prefix("launch-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create launch.json".to_string())))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| Error::internal_io(e.to_string(), Some("write launch.json".to_string())))?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Hand the file to `launcher`, then delete it whatever the launcher did.
    pub fn launch_with(self, launcher: &dyn DebugLauncher) -> Result<()> {
        let path: PathBuf = self.file.path().to_path_buf();
        let launched = launcher.launch(&path);
        let removed = self.file.close();

        if !launched? {
            return Err(Error::launcher_failed(format!(
                "launcher declined {}",
                path.display()
            )));
        }
        removed.map_err(|e| Error::internal_io(e.to_string(), Some(format!("remove {}", path.display()))))
    }
}
