use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::TempDir;

use super::RemoteTarget;
use crate::error::{Error, Result};
use crate::process::isolate_from_terminal_signals;

/// Environment variable the askpass helper echoes back to OpenSSH.
pub(super) const PASSPHRASE_ENV: &str = "SSHDBG_KEY_PASSPHRASE";

/// Parse the private key locally with `ssh-keygen -y`, which fails on a
/// malformed key or a wrong passphrase. Never opens a network connection.
pub fn validate_private_key(target: &RemoteTarget) -> Result<()> {
    let key_path = target.private_key.to_string_lossy().to_string();
    if !target.private_key.is_file() {
        return Err(Error::ssh_identity_file_not_found(key_path));
    }

    // Keeps the askpass helper alive until ssh-keygen exits.
    let scratch = match &target.passphrase {
        Some(_) => Some(TempDir::new().map_err(|e| {
            Error::internal_io(e.to_string(), Some("create askpass dir".to_string()))
        })?),
        None => None,
    };
    let askpass = match &scratch {
        Some(dir) => Some(write_askpass_script(dir.path())?),
        None => None,
    };

    let output = keygen_command(target, askpass.as_deref())
        .output()
        .map_err(|e| {
            Error::ssh_key_invalid(&key_path, format!("could not run ssh-keygen: {}", e))
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let reason = if stderr.is_empty() {
        format!(
            "ssh-keygen exited with {}",
            output.status.code().unwrap_or(-1)
        )
    } else {
        stderr
    };
    Err(Error::ssh_key_invalid(key_path, reason))
}

/// `ssh-keygen -y` for the target key. An encrypted key is unlocked through
/// the askpass helper so the passphrase stays out of the argument list; an
/// empty `-P` keeps ssh-keygen from prompting for an unencrypted one.
fn keygen_command(target: &RemoteTarget, askpass: Option<&Path>) -> Command {
    let mut cmd = Command::new("ssh-keygen");
    isolate_from_terminal_signals(&mut cmd)
        .arg("-y")
        .stdin(Stdio::null());

    match (askpass, &target.passphrase) {
        (Some(askpass), Some(passphrase)) => apply_passphrase(&mut cmd, askpass, passphrase),
        _ => {
            cmd.args(["-P", ""]);
        }
    }

    cmd.arg("-f").arg(&target.private_key);
    cmd
}

/// Write an askpass helper into `dir` that prints the passphrase from the
/// environment, so the secret itself never touches the disk.
pub(super) fn write_askpass_script(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("askpass.sh");
    let script = format!("#!/bin/sh\nprintf '%s\\n' \"${}\"\n", PASSPHRASE_ENV);
    fs::write(&path, script).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("write {}", path.display())))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o700)).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("chmod {}", path.display())))
        })?;
    }

    Ok(path)
}

/// Point an OpenSSH child process at the askpass helper.
pub(super) fn apply_passphrase(cmd: &mut Command, askpass: &Path, passphrase: &str) {
    cmd.env("SSH_ASKPASS", askpass)
        .env("SSH_ASKPASS_REQUIRE", "force")
        .env(PASSPHRASE_ENV, passphrase);
    if std::env::var_os("DISPLAY").is_none() {
        cmd.env("DISPLAY", "sshdbg:0");
    }
}
