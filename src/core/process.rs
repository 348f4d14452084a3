//! Local child processes that race their exit against cancellation.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::progress::ProgressSink;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exit code, `None` when killed by a signal.
    Exited(Option<i32>),
    Cancelled,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        matches!(self, ProcessExit::Exited(Some(0)))
    }
}

/// Put the child in its own process group so a terminal Ctrl-C reaches only
/// sshdbg. Cancellation then stops children explicitly, or not at all for
/// remote commands already in flight.
pub fn isolate_from_terminal_signals(cmd: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

/// Human-readable form of a command line for logs and error details.
pub fn display_command(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

fn forward_lines<R: Read + Send + 'static>(reader: R, tx: mpsc::Sender<String>) {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

/// Run `cmd` to completion, streaming its output into the progress sink.
/// When the token is cancelled the child is killed and `Cancelled` returned.
pub fn run_cancellable(
    mut cmd: Command,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
) -> Result<ProcessExit> {
    let display = display_command(&cmd);
    let mut child = isolate_from_terminal_signals(&mut cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::internal_io(format!("Failed to run {}: {}", display, e), Some(display.clone())))?;

    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, tx);
    }
    // Sender halves live in the reader threads only.

    loop {
        while let Ok(line) = rx.try_recv() {
            progress.write_line(&line);
        }

        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(ProcessExit::Cancelled);
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                // Build servers can inherit the pipes and keep them open.
                while let Ok(line) = rx.recv_timeout(DRAIN_TIMEOUT) {
                    progress.write_line(&line);
                }
                return Ok(ProcessExit::Exited(status.code()));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                return Err(Error::internal_io(e.to_string(), Some(format!("wait for {}", display))));
            }
        }
    }
}
