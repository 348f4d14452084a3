use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use super::client::SessionDir;
use super::{RemoteTarget, TransferChannel};
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::process::isolate_from_terminal_signals;
use crate::shell;

/// Transfer connection: one `scp` process per upload, with its own
/// timeout and keep-alive policy. The process exiting is the disconnect.
pub struct ScpTransfer {
    target: RemoteTarget,
    policy: TransportConfig,
    session_dir: Arc<SessionDir>,
}

impl ScpTransfer {
    pub(super) fn new(
        target: RemoteTarget,
        policy: TransportConfig,
        session_dir: Arc<SessionDir>,
    ) -> Self {
        Self {
            target,
            policy,
            session_dir,
        }
    }

    fn build_args(&self, sources: &[PathBuf], remote_dir: &str) -> Vec<String> {
        let mut args: Vec<String> = self.policy.scp_flags.clone();
        args.push("-r".to_string());
        args.extend(self.session_dir.identity_args(&self.target));
        args.extend([
            "-P".to_string(),
            self.target.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.policy.transfer_timeout_secs),
            "-o".to_string(),
            format!(
                "ServerAliveInterval={}",
                self.policy.transfer_alive_interval_secs
            ),
            "-o".to_string(),
            "ServerAliveCountMax=1".to_string(),
        ]);
        args.extend(sources.iter().map(|p| p.to_string_lossy().to_string()));
        args.push(format!(
            "{}:{}/",
            self.target.destination(),
            shell::quote_path(remote_dir.trim_end_matches('/'))
        ));
        args
    }
}

/// Top-level entries of `local_dir`, sorted so uploads are deterministic.
fn list_sources(local_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(local_dir).map_err(|e| {
        Error::transfer_upload_failed(
            local_dir.display().to_string(),
            "",
            format!("Cannot read {}: {}", local_dir.display(), e),
        )
    })?;

    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", local_dir.display())))
        })?;
        sources.push(entry.path());
    }
    sources.sort();
    Ok(sources)
}

impl TransferChannel for ScpTransfer {
    fn upload_tree(&self, local_dir: &Path, remote_dir: &str) -> Result<()> {
        if remote_dir.starts_with('~') {
            return Err(Error::validation_invalid_argument(
                "remoteDir",
                "Transfer paths must be absolute; expand '~' first",
                Some(remote_dir.to_string()),
            ));
        }

        let sources = list_sources(local_dir)?;
        if sources.is_empty() {
            log_status!("scp", "Nothing to upload from {}", local_dir.display());
            return Ok(());
        }

        log_status!(
            "scp",
            "Uploading {} entries: {} -> {}:{}",
            sources.len(),
            local_dir.display(),
            self.target.destination(),
            remote_dir
        );

        let mut cmd = Command::new("scp");
        isolate_from_terminal_signals(&mut cmd)
            .args(self.build_args(&sources, remote_dir))
            .stdin(Stdio::null());
        self.session_dir.apply_credentials(&mut cmd, &self.target);

        let output = cmd.output().map_err(|e| {
            Error::transfer_upload_failed(
                local_dir.display().to_string(),
                remote_dir,
                format!("SCP error: {}", e),
            )
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("scp exited with {}", output.status.code().unwrap_or(-1))
        } else {
            stderr
        };
        Err(Error::transfer_upload_failed(
            local_dir.display().to_string(),
            remote_dir,
            message,
        ))
    }
}
