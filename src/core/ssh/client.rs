use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tempfile::TempDir;

use super::key::{self, apply_passphrase};
use super::transfer::ScpTransfer;
use super::{CommandChannel, CommandOutput, RemoteTarget, Session, Transport};
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::process::isolate_from_terminal_signals;

/// Exit status OpenSSH reserves for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// Scratch directory shared by the command and transfer connections of one
/// session: the control socket and the askpass helper live here.
pub(super) struct SessionDir {
    dir: TempDir,
    askpass: Option<PathBuf>,
}

impl SessionDir {
    pub(super) fn create(target: &RemoteTarget) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sshdbg-")
            .tempdir()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create session dir".to_string())))?;

        let askpass = match &target.passphrase {
            Some(_) => Some(key::write_askpass_script(dir.path())?),
            None => None,
        };

        Ok(Self { dir, askpass })
    }

    fn control_socket(&self) -> PathBuf {
        self.dir.path().join("ctl.sock")
    }

    fn connect_log(&self) -> PathBuf {
        self.dir.path().join("connect.log")
    }

    /// Options shared by every OpenSSH process of the session.
    pub(super) fn identity_args(&self, target: &RemoteTarget) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            target.private_key.to_string_lossy().to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
        ];
        // BatchMode would also suppress the askpass helper.
        if target.passphrase.is_none() {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }
        args
    }

    pub(super) fn apply_credentials(&self, cmd: &mut Command, target: &RemoteTarget) {
        if let (Some(askpass), Some(passphrase)) = (&self.askpass, &target.passphrase) {
            apply_passphrase(cmd, askpass, passphrase);
        }
    }
}

/// Command connection: a background OpenSSH control master that every
/// remote command is multiplexed over.
pub struct ControlMaster {
    target: RemoteTarget,
    session_dir: Arc<SessionDir>,
    connect_timeout_secs: u64,
    connected: bool,
}

impl ControlMaster {
    fn connect(
        target: &RemoteTarget,
        policy: &TransportConfig,
        session_dir: Arc<SessionDir>,
    ) -> Result<Self> {
        let mut args = session_dir.identity_args(target);
        args.extend([
            "-M".to_string(),
            "-S".to_string(),
            session_dir.control_socket().to_string_lossy().to_string(),
            "-f".to_string(),
            "-N".to_string(),
            "-p".to_string(),
            target.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", policy.connect_timeout_secs),
            "-o".to_string(),
            format!("ServerAliveInterval={}", policy.server_alive_interval_secs),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
            "-o".to_string(),
            "ControlPersist=no".to_string(),
            target.destination(),
        ]);

        // The forked master keeps inherited pipes open, so stderr goes to a file.
        let log_path = session_dir.connect_log();
        let log = File::create(&log_path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create {}", log_path.display())))
        })?;

        let mut cmd = Command::new("ssh");
        isolate_from_terminal_signals(&mut cmd)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(log);
        session_dir.apply_credentials(&mut cmd, target);

        log_status!("ssh", "Connecting to {}:{}", target.destination(), target.port);
        let status = cmd
            .status()
            .map_err(|e| Error::ssh_connect_failed(target.details(), format!("SSH error: {}", e)))?;

        if !status.success() {
            let message = std::fs::read_to_string(&log_path)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            let message = if message.is_empty() {
                format!("ssh exited with {}", status.code().unwrap_or(-1))
            } else {
                message
            };
            return Err(Error::ssh_connect_failed(target.details(), message));
        }

        Ok(Self {
            target: target.clone(),
            session_dir,
            connect_timeout_secs: policy.connect_timeout_secs,
            connected: true,
        })
    }

    /// Arguments for commands multiplexed over the master. Should the socket
    /// vanish, ssh falls back to a direct connection; batch mode and the
    /// session key make that fail fast instead of prompting or trying other keys.
    fn control_args(&self) -> Vec<String> {
        vec![
            "-S".to_string(),
            self.session_dir.control_socket().to_string_lossy().to_string(),
            "-o".to_string(),
            "ControlMaster=no".to_string(),
            "-i".to_string(),
            self.target.private_key.to_string_lossy().to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-p".to_string(),
            self.target.port.to_string(),
        ]
    }

    fn ssh(&self) -> Command {
        let mut cmd = Command::new("ssh");
        isolate_from_terminal_signals(&mut cmd)
            .args(self.control_args())
            .stdin(Stdio::null());
        cmd
    }
}

/// Separate the ssh client failing from the remote command's own result.
/// Exit 255 with nothing on stdout, or death by signal, is a transport error.
fn command_result(target: &RemoteTarget, output: CommandOutput) -> Result<CommandOutput> {
    let client_failed = match output.exit_code {
        Some(code) => code == SSH_CLIENT_FAILURE && output.stdout.is_empty(),
        None => true,
    };
    if !client_failed {
        return Ok(output);
    }

    let stderr = output.stderr.trim();
    let message = if stderr.is_empty() {
        match output.exit_code {
            Some(code) => format!("ssh exited with {}", code),
            None => "ssh terminated by signal".to_string(),
        }
    } else {
        stderr.to_string()
    };
    Err(Error::ssh_connect_failed(target.details(), message))
}

impl CommandChannel for ControlMaster {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        if !self.connected {
            return Err(Error::ssh_connect_failed(
                self.target.details(),
                "SSH session is not connected",
            ));
        }

        let output = self
            .ssh()
            .arg(self.target.destination())
            .arg(command)
            .output()
            .map_err(|e| {
                Error::ssh_connect_failed(self.target.details(), format!("SSH error: {}", e))
            })?;

        command_result(
            &self.target,
            CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code(),
            },
        )
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;

        let output = self
            .ssh()
            .args(["-O", "exit"])
            .arg(self.target.destination())
            .output()
            .map_err(|e| Error::internal_io(e.to_string(), Some("ssh -O exit".to_string())))?;

        if !output.status.success() {
            return Err(Error::internal_unexpected(format!(
                "Failed to close SSH control master: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        log_status!("ssh", "Disconnected from {}", self.target.destination());
        Ok(())
    }
}

/// Transport backed by the system OpenSSH client (`ssh`, `scp`, `ssh-keygen`).
pub struct OpenSshTransport {
    policy: TransportConfig,
}

impl OpenSshTransport {
    pub fn new(policy: TransportConfig) -> Self {
        Self { policy }
    }
}

impl Transport for OpenSshTransport {
    fn validate_key(&self, target: &RemoteTarget) -> Result<()> {
        key::validate_private_key(target)
    }

    fn open(&self, target: &RemoteTarget) -> Result<Session> {
        let session_dir = Arc::new(SessionDir::create(target)?);
        let master = ControlMaster::connect(target, &self.policy, Arc::clone(&session_dir))?;
        let transfer = ScpTransfer::new(target.clone(), self.policy.clone(), session_dir);
        Ok(Session::new(target.clone(), Box::new(master), Box::new(transfer)))
    }
}
