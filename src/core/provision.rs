//! Remote environment provisioning.
//!
//! The remote installers are idempotent and print their own status, so the
//! outcome of each install is classified from the tail of its output rather
//! than tracked locally. The phrases live in [`InstallMarkers`].

use crate::config::{DebuggerConfig, InstallMarkers, RuntimeConfig};
use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::progress::ProgressSink;
use crate::shell;
use crate::ssh::{CommandOutput, Session};

/// Which shared runtime the deployed project needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Web,
    Generic,
}

impl RuntimeKind {
    pub fn for_project(is_web: bool) -> Self {
        if is_web {
            RuntimeKind::Web
        } else {
            RuntimeKind::Generic
        }
    }

    /// Value of the installer's `--runtime` flag.
    pub fn installer_flag(&self) -> &'static str {
        match self {
            RuntimeKind::Web => "aspnetcore",
            RuntimeKind::Generic => "dotnet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Installed,
    AlreadyPresent,
}

pub fn runtime_install_command(runtime: &RuntimeConfig, kind: RuntimeKind) -> String {
    format!(
        "curl -sSL {} | bash /dev/stdin --channel {} --runtime {} --install-dir {}",
        runtime.installer_url,
        runtime.channel,
        kind.installer_flag(),
        shell::quote_remote_path(&runtime.install_dir)
    )
}

/// Dumps `dotnet --info` with the fresh install first on PATH.
pub fn runtime_info_command(runtime: &RuntimeConfig) -> String {
    let dir = shell::quote_remote_path(runtime.install_dir.trim_end_matches('/'));
    format!(
        "export DOTNET_ROOT={dir}; export PATH=$DOTNET_ROOT:$PATH; {dir}/{exe} --info",
        dir = dir,
        exe = runtime.executable
    )
}

pub fn debugger_install_command(debugger: &DebuggerConfig) -> String {
    format!(
        "curl -sSL {} | bash /dev/stdin -v {} -l {}",
        debugger.installer_url,
        debugger.version,
        shell::quote_remote_path(&debugger.install_dir)
    )
}

pub fn classify_runtime_output(output: &str, markers: &InstallMarkers) -> Option<ProvisionOutcome> {
    if output.ends_with(&markers.runtime_installed) {
        Some(ProvisionOutcome::Installed)
    } else if output.ends_with(&markers.runtime_already_installed) {
        Some(ProvisionOutcome::AlreadyPresent)
    } else {
        None
    }
}

pub fn classify_debugger_output(output: &str, markers: &InstallMarkers) -> Option<ProvisionOutcome> {
    if output.contains(&markers.debugger_installed) {
        Some(ProvisionOutcome::Installed)
    } else if output.ends_with(&markers.debugger_skipped) {
        Some(ProvisionOutcome::AlreadyPresent)
    } else {
        None
    }
}

pub struct Provisioner<'a> {
    runtime: &'a RuntimeConfig,
    debugger: &'a DebuggerConfig,
    markers: &'a InstallMarkers,
    progress: &'a dyn ProgressSink,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        runtime: &'a RuntimeConfig,
        debugger: &'a DebuggerConfig,
        markers: &'a InstallMarkers,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            runtime,
            debugger,
            markers,
            progress,
        }
    }

    pub fn ensure_runtime(&self, session: &mut Session, kind: RuntimeKind) -> Result<ProvisionOutcome> {
        let command = runtime_install_command(self.runtime, kind);
        let output = session.run(&command)?;

        let outcome = classify_runtime_output(&output.stdout, self.markers)
            .ok_or_else(|| self.failure(session, "provision_runtime", &command, output.clone()))?;
        self.progress.write_line(&output.stdout);

        let info = session.run_command(&runtime_info_command(self.runtime))?;
        self.progress.write_line(&info);

        Ok(outcome)
    }

    pub fn ensure_debugger(&self, session: &mut Session) -> Result<ProvisionOutcome> {
        let command = debugger_install_command(self.debugger);
        let output = session.run(&command)?;

        let outcome = classify_debugger_output(&output.stdout, self.markers)
            .ok_or_else(|| self.failure(session, "provision_debug_agent", &command, output.clone()))?;
        self.progress.write_line(&output.stdout);

        Ok(outcome)
    }

    /// The error message is the installer's stdout. When that is empty the
    /// only diagnostic is stderr, which goes to the run log.
    fn failure(&self, session: &Session, step: &str, command: &str, output: CommandOutput) -> Error {
        let stderr = output.stderr.trim();
        if output.stdout.trim().is_empty() && !stderr.is_empty() {
            self.progress.write_line(stderr);
        }

        Error::remote_command_failed(RemoteCommandFailedDetails {
            step: step.to_string(),
            command: command.to_string(),
            output: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            target: session.target().details(),
        })
    }
}
