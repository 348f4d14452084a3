use clap::Args;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};

use sshdbg::cancel::CancellationToken;
use sshdbg::config::SshdbgConfig;
use sshdbg::pipeline::{PipelineReport, RunStatus};
use sshdbg::progress::ConsoleProgress;
use sshdbg::project::ProjectInfo;
use sshdbg::ssh::RemoteTarget;

use crate::output::EXIT_CANCELLED;

pub type CmdResult<T> = sshdbg::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    pub quiet: bool,
}

/// Which project to deploy or debug.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project file or a directory containing one
    #[arg(long, short = 'p', default_value = ".")]
    pub project: PathBuf,

    /// Build configuration
    #[arg(long, short = 'c', default_value = "Debug")]
    pub configuration: String,

    /// Target framework (read from the project file when omitted)
    #[arg(long, short = 'f')]
    pub framework: Option<String>,
}

/// Everything a pipeline run needs, resolved before any step starts.
pub(crate) struct RunContext {
    pub config: SshdbgConfig,
    pub target: RemoteTarget,
    pub project: ProjectInfo,
    pub progress: ConsoleProgress,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn prepare(args: &ProjectArgs, global: &GlobalArgs) -> sshdbg::Result<Self> {
        let config = sshdbg::config::load()?;
        let project = ProjectInfo::discover(
            &args.project,
            &args.configuration,
            args.framework.as_deref(),
        )?;
        let target = config.remote_target()?;

        let cancel = CancellationToken::new();
        cancel.install_ctrlc_handler()?;

        Ok(Self {
            config,
            target,
            project,
            progress: ConsoleProgress::new(global.quiet),
            cancel,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub command: String,
    pub project: ProjectInfo,
    #[serde(flatten)]
    pub report: PipelineReport,
}

/// Failed runs become errors carrying the report; cancelled runs are not errors.
pub(crate) fn report_result(
    command: &str,
    project: ProjectInfo,
    report: PipelineReport,
) -> CmdResult<RunOutput> {
    let exit_code = match report.status {
        RunStatus::Succeeded => 0,
        RunStatus::Cancelled => EXIT_CANCELLED,
        RunStatus::Failed => return Err(report.into_error()),
    };

    Ok((
        RunOutput {
            command: command.to_string(),
            project,
            report,
        },
        exit_code,
    ))
}

/// Read JSON spec from string, file (@path), or stdin (-).
pub(crate) fn read_json_spec_to_string(spec: &str) -> sshdbg::Result<String> {
    use std::io::IsTerminal;

    if spec.trim() == "-" {
        let mut buf = String::new();
        let mut stdin = std::io::stdin();
        if stdin.is_terminal() {
            return Err(sshdbg::Error::validation_invalid_argument(
                "json",
                "Cannot read JSON from stdin when stdin is a TTY",
                None,
            ));
        }
        stdin.read_to_string(&mut buf).map_err(|e| {
            sshdbg::Error::internal_io(e.to_string(), Some("read stdin".to_string()))
        })?;
        return Ok(buf);
    }

    if let Some(path) = spec.strip_prefix('@') {
        if path.trim().is_empty() {
            return Err(sshdbg::Error::validation_invalid_argument(
                "json",
                "Invalid JSON spec '@' (missing file path)",
                None,
            ));
        }
        return std::fs::read_to_string(Path::new(path)).map_err(|e| {
            sshdbg::Error::internal_io(e.to_string(), Some(format!("read {}", path)))
        });
    }

    Ok(spec.to_string())
}

pub mod config;
pub mod debug;
pub mod deploy;
pub mod key;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (sshdbg::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Debug(args) => dispatch!(args, global, debug),
        crate::Commands::Config(args) => dispatch!(args, global, config),
        crate::Commands::Key(args) => dispatch!(args, global, key),
    }
}
