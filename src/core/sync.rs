//! Deployment synchronizer: a clean remote directory, then the publish tree.

use std::path::Path;

use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::shell;
use crate::ssh::Session;

/// Create `dir` when missing, otherwise delete everything inside it.
/// Errors are folded into stdout so an empty reply means success.
pub fn target_dir_command(dir: &str) -> String {
    let dir = shell::quote_remote_path(dir.trim_end_matches('/'));
    format!(
        "if [ -d {dir} ]; then find {dir} -mindepth 1 -maxdepth 1 -exec rm -rf {{}} + 2>&1; else mkdir -p {dir} 2>&1; fi",
        dir = dir
    )
}

/// Leaves `deploy_dir` existing and empty. Any output is the error message.
pub fn prepare_target_dir(session: &mut Session, deploy_dir: &str) -> Result<()> {
    let command = target_dir_command(deploy_dir);
    let output = session.run(&command)?;
    if output.stdout.is_empty() {
        return Ok(());
    }

    Err(Error::remote_command_failed(RemoteCommandFailedDetails {
        step: "manage_target_dir".to_string(),
        command,
        output: output.stdout,
        stderr: output.stderr,
        exit_code: output.exit_code,
        target: session.target().details(),
    }))
}

/// Upload the publish output into `deploy_dir`. Returns the absolute remote path used.
pub fn upload(session: &Session, publish_dir: &Path, deploy_dir: &str) -> Result<String> {
    let remote = shell::expand_remote_home(deploy_dir, &session.target().user);
    session.upload_tree(publish_dir, &remote)?;
    Ok(remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TargetDetails;
    use crate::ssh::{CommandChannel, CommandOutput, RemoteTarget, TransferChannel};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        commands: Vec<String>,
        uploads: Vec<(PathBuf, String)>,
    }

    struct Channel {
        reply: Option<String>,
        log: Arc<Mutex<Log>>,
    }

    impl CommandChannel for Channel {
        fn run(&mut self, command: &str) -> Result<CommandOutput> {
            self.log.lock().unwrap().commands.push(command.to_string());
            match &self.reply {
                Some(reply) => Ok(CommandOutput {
                    stdout: reply.clone(),
                    ..Default::default()
                }),
                None => Err(Error::ssh_connect_failed(
                    TargetDetails {
                        host: "raspberrypi.local".to_string(),
                        port: 22,
                        user: "pi".to_string(),
                    },
                    "Connection closed by 10.0.0.7 port 22",
                )),
            }
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct Transfer(Arc<Mutex<Log>>);

    impl TransferChannel for Transfer {
        fn upload_tree(&self, local_dir: &Path, remote_dir: &str) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .uploads
                .push((local_dir.to_path_buf(), remote_dir.to_string()));
            Ok(())
        }
    }

    fn session(reply: &str) -> (Session, Arc<Mutex<Log>>) {
        session_with(Some(reply))
    }

    fn session_with(reply: Option<&str>) -> (Session, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let target = RemoteTarget {
            host: "raspberrypi.local".to_string(),
            port: 22,
            user: "pi".to_string(),
            private_key: PathBuf::from("/home/dev/.ssh/id_ecdsa"),
            passphrase: None,
        };
        let session = Session::new(
            target,
            Box::new(Channel {
                reply: reply.map(str::to_string),
                log: log.clone(),
            }),
            Box::new(Transfer(log.clone())),
        );
        (session, log)
    }

    #[test]
    fn command_clears_or_creates_with_tilde_left_expandable() {
        assert_eq!(
            target_dir_command("~/apps/Blinky/"),
            "if [ -d ~/'apps/Blinky' ]; then find ~/'apps/Blinky' -mindepth 1 -maxdepth 1 -exec rm -rf {} + 2>&1; else mkdir -p ~/'apps/Blinky' 2>&1; fi"
        );
    }

    #[test]
    fn empty_reply_prepares_directory() {
        let (mut session, log) = session("");
        prepare_target_dir(&mut session, "~/apps/Blinky").unwrap();
        assert_eq!(log.lock().unwrap().commands.len(), 1);
    }

    #[test]
    fn any_reply_is_the_error_message() {
        let (mut session, _log) = session("rm: cannot remove 'x': Permission denied");
        let err = prepare_target_dir(&mut session, "~/apps/Blinky").unwrap_err();
        assert_eq!(err.code.as_str(), "remote.command_failed");
        assert_eq!(err.message, "rm: cannot remove 'x': Permission denied");
        assert_eq!(err.details["step"], "manage_target_dir");
    }

    #[test]
    fn lost_connection_is_not_an_empty_reply() {
        let (mut session, log) = session_with(None);
        let err = prepare_target_dir(&mut session, "~/apps/Blinky").unwrap_err();
        assert_eq!(err.code.as_str(), "ssh.connect_failed");
        assert_eq!(log.lock().unwrap().commands.len(), 1);
    }

    #[test]
    fn upload_expands_home_shorthand() {
        let (session, log) = session("");
        let remote = upload(&session, Path::new("/tmp/publish"), "~/apps/Blinky").unwrap();
        assert_eq!(remote, "/home/pi/apps/Blinky");
        assert_eq!(
            log.lock().unwrap().uploads,
            vec![(PathBuf::from("/tmp/publish"), "/home/pi/apps/Blinky".to_string())]
        );
    }
}
