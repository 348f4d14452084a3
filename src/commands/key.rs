use clap::{Args, Subcommand};
use serde::Serialize;

use sshdbg::ssh;
use sshdbg::{config, keychain};

use super::{CmdResult, GlobalArgs};
use crate::tty;

#[derive(Args)]
pub struct KeyArgs {
    #[command(subcommand)]
    command: KeyCommand,
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Store the private key passphrase in the OS keychain
    SetPassphrase {
        /// Passphrase (prompted for, or read from stdin, when omitted)
        #[arg(long)]
        passphrase: Option<String>,
    },
    /// Remove the stored passphrase from the OS keychain
    ClearPassphrase,
    /// Check that the configured private key parses, without connecting
    Check,
}

#[derive(Debug, Serialize)]
pub struct KeyOutput {
    command: String,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    has_passphrase: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stored: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid: Option<bool>,
}

impl KeyOutput {
    fn new(command: &str, user: &str, host: &str) -> Self {
        Self {
            command: command.to_string(),
            target: format!("{}@{}", user, host),
            identity_file: None,
            has_passphrase: None,
            stored: None,
            deleted: None,
            valid: None,
        }
    }
}

pub fn run(args: KeyArgs, _global: &GlobalArgs) -> CmdResult<KeyOutput> {
    match args.command {
        KeyCommand::SetPassphrase { passphrase } => set_passphrase(passphrase),
        KeyCommand::ClearPassphrase => clear_passphrase(),
        KeyCommand::Check => check(),
    }
}

#[derive(Debug, PartialEq)]
enum PassphraseSource {
    Argument(String),
    /// Typed at the terminal with echo off.
    HiddenPrompt,
    /// First line of piped stdin.
    Stdin,
}

fn passphrase_source(given: Option<String>, interactive: bool) -> PassphraseSource {
    match given {
        Some(p) => PassphraseSource::Argument(p),
        None if interactive => PassphraseSource::HiddenPrompt,
        None => PassphraseSource::Stdin,
    }
}

fn read_passphrase(given: Option<String>) -> sshdbg::Result<String> {
    let passphrase = match passphrase_source(given, tty::is_stdin_tty()) {
        PassphraseSource::Argument(p) => p,
        PassphraseSource::HiddenPrompt => tty::prompt_password("Key passphrase: ")?,
        PassphraseSource::Stdin => tty::read_stdin_line()?,
    };

    if passphrase.is_empty() {
        return Err(sshdbg::Error::validation_invalid_argument(
            "passphrase",
            "Passphrase cannot be empty",
            None,
        ));
    }
    Ok(passphrase)
}

fn set_passphrase(given: Option<String>) -> CmdResult<KeyOutput> {
    let cfg = config::load()?;
    let passphrase = read_passphrase(given)?;

    keychain::store_passphrase(&cfg.ssh.user, &cfg.ssh.host, &passphrase)?;
    config::merge(r#"{"ssh":{"passphraseFromKeychain":true,"privateKeyPassphrase":null}}"#)?;

    Ok((
        KeyOutput {
            stored: Some(true),
            ..KeyOutput::new("key.set-passphrase", &cfg.ssh.user, &cfg.ssh.host)
        },
        0,
    ))
}

fn clear_passphrase() -> CmdResult<KeyOutput> {
    let cfg = config::load()?;
    let deleted = keychain::delete_passphrase(&cfg.ssh.user, &cfg.ssh.host)?;
    if cfg.ssh.passphrase_from_keychain {
        config::merge(r#"{"ssh":{"passphraseFromKeychain":false}}"#)?;
    }

    Ok((
        KeyOutput {
            deleted: Some(deleted),
            ..KeyOutput::new("key.clear-passphrase", &cfg.ssh.user, &cfg.ssh.host)
        },
        0,
    ))
}

fn check() -> CmdResult<KeyOutput> {
    let cfg = config::load()?;
    let target = cfg.remote_target()?;
    ssh::validate_private_key(&target)?;

    Ok((
        KeyOutput {
            identity_file: Some(target.private_key.display().to_string()),
            has_passphrase: Some(target.passphrase.is_some()),
            valid: Some(true),
            ..KeyOutput::new("key.check", &target.user, &target.host)
        },
        0,
    ))
}
