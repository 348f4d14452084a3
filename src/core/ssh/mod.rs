//! Transport session: one authenticated command connection plus an
//! independently configured transfer connection to the same host.

mod client;
mod key;
mod transfer;

pub use client::{ControlMaster, OpenSshTransport};
pub use key::validate_private_key;
pub use transfer::ScpTransfer;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result, TargetDetails};

/// Connection probe sent right after connecting; the reply must be exactly this.
pub const PROBE_COMMAND: &str = "echo ping";
pub const PROBE_REPLY: &str = "ping";

/// Who to connect to and with which key. Immutable for the life of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub private_key: PathBuf,
    pub passphrase: Option<String>,
}

impl RemoteTarget {
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    pub fn details(&self) -> TargetDetails {
        TargetDetails {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
        }
    }
}

/// Raw result of one remote command. Exit status is informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

pub trait CommandChannel: Send {
    /// Run one command to completion and capture its output.
    fn run(&mut self, command: &str) -> Result<CommandOutput>;
    fn is_connected(&self) -> bool;
    fn disconnect(&mut self) -> Result<()>;
}

pub trait TransferChannel: Send {
    /// Connect, copy the contents of `local_dir` into `remote_dir`, disconnect.
    /// `remote_dir` must already be absolute.
    fn upload_tree(&self, local_dir: &Path, remote_dir: &str) -> Result<()>;
}

pub trait Transport {
    /// Check the private key locally. Must not touch the network.
    fn validate_key(&self, target: &RemoteTarget) -> Result<()>;
    fn open(&self, target: &RemoteTarget) -> Result<Session>;
}

pub struct Session {
    target: RemoteTarget,
    command: Box<dyn CommandChannel>,
    transfer: Box<dyn TransferChannel>,
}

impl Session {
    pub fn new(
        target: RemoteTarget,
        command: Box<dyn CommandChannel>,
        transfer: Box<dyn TransferChannel>,
    ) -> Self {
        Self {
            target,
            command,
            transfer,
        }
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    pub fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let mut output = self.command.run(command)?;
        output.stdout = trim_line_endings(&output.stdout).to_string();
        Ok(output)
    }

    /// Run a command and return stdout with trailing line terminators stripped.
    pub fn run_command(&mut self, command: &str) -> Result<String> {
        Ok(self.run(command)?.stdout)
    }

    /// Send the ping probe; anything but `ping` means the connection is not usable.
    pub fn probe(&mut self) -> Result<()> {
        let reply = self.run_command(PROBE_COMMAND)?;
        if reply != PROBE_REPLY {
            return Err(Error::ssh_probe_failed(self.target.details(), reply));
        }
        Ok(())
    }

    pub fn upload_tree(&self, local_dir: &Path, remote_dir: &str) -> Result<()> {
        self.transfer.upload_tree(local_dir, remote_dir)
    }

    pub fn is_connected(&self) -> bool {
        self.command.is_connected()
    }

    /// Idempotent: disconnects only while connected.
    pub fn close(&mut self) -> Result<()> {
        if self.command.is_connected() {
            self.command.disconnect()?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log_status!("ssh", "Disconnect failed: {}", err);
        }
    }
}

pub fn trim_line_endings(output: &str) -> &str {
    output.trim_end_matches(&['\r', '\n'][..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        commands: Vec<String>,
        disconnects: usize,
    }

    struct FakeChannel {
        reply: String,
        connected: bool,
        log: Arc<Mutex<Recorder>>,
    }

    impl CommandChannel for FakeChannel {
        fn run(&mut self, command: &str) -> Result<CommandOutput> {
            self.log.lock().unwrap().commands.push(command.to_string());
            Ok(CommandOutput {
                stdout: self.reply.clone(),
                ..CommandOutput::default()
            })
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn disconnect(&mut self) -> Result<()> {
            self.connected = false;
            self.log.lock().unwrap().disconnects += 1;
            Ok(())
        }
    }

    struct NoTransfer;

    impl TransferChannel for NoTransfer {
        fn upload_tree(&self, _local_dir: &Path, _remote_dir: &str) -> Result<()> {
            Ok(())
        }
    }

    fn target() -> RemoteTarget {
        RemoteTarget {
            host: "raspberrypi.local".to_string(),
            port: 22,
            user: "pi".to_string(),
            private_key: PathBuf::from("/home/dev/.ssh/id_ecdsa"),
            passphrase: None,
        }
    }

    fn session(reply: &str) -> (Session, Arc<Mutex<Recorder>>) {
        let log = Arc::new(Mutex::new(Recorder::default()));
        let channel = FakeChannel {
            reply: reply.to_string(),
            connected: true,
            log: Arc::clone(&log),
        };
        (
            Session::new(target(), Box::new(channel), Box::new(NoTransfer)),
            log,
        )
    }

    #[test]
    fn run_command_strips_trailing_line_endings_only() {
        let (mut session, _) = session("  hello world \r\n\n");
        assert_eq!(session.run_command("echo").unwrap(), "  hello world ");
    }

    #[test]
    fn probe_accepts_ping() {
        let (mut session, log) = session("ping\n");
        session.probe().unwrap();
        assert_eq!(log.lock().unwrap().commands, vec!["echo ping"]);
    }

    #[test]
    fn probe_rejects_anything_else() {
        let (mut session, _) = session("Welcome to the jungle\nping");
        let err = session.probe().unwrap_err();
        assert_eq!(err.code.as_str(), "ssh.probe_failed");
        assert_eq!(err.details["output"], "Welcome to the jungle\nping");
    }

    #[test]
    fn close_is_idempotent() {
        let (mut session, log) = session("");
        session.close().unwrap();
        session.close().unwrap();
        drop(session);
        assert_eq!(log.lock().unwrap().disconnects, 1);
    }

    #[test]
    fn drop_disconnects_open_session() {
        let (session, log) = session("");
        drop(session);
        assert_eq!(log.lock().unwrap().disconnects, 1);
    }

    #[test]
    fn destination_joins_user_and_host() {
        assert_eq!(target().destination(), "pi@raspberrypi.local");
    }
}
