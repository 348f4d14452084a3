//! Terminal I/O utilities for CLI.
//!
//! Provides TTY detection and user prompting.

use std::io::{self, BufRead, IsTerminal};

pub fn is_stdin_tty() -> bool {
    io::stdin().is_terminal()
}

fn read_line() -> sshdbg::Result<String> {
    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line).map_err(|e| {
        sshdbg::Error::new(
            sshdbg::ErrorCode::InternalIoError,
            format!("Failed to read input: {}", e),
            serde_json::Value::Null,
        )
    })?;

    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

/// Prompt without echoing what is typed.
pub fn prompt_password(message: &str) -> sshdbg::Result<String> {
    rpassword::prompt_password(message).map_err(|e| {
        sshdbg::Error::new(
            sshdbg::ErrorCode::InternalIoError,
            format!("Failed to read input: {}", e),
            serde_json::Value::Null,
        )
    })
}

/// One line from piped stdin, without prompting.
pub fn read_stdin_line() -> sshdbg::Result<String> {
    read_line()
}

/// Print status message to stderr if running in a terminal.
pub fn status(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message);
    }
}

// log_status! macro is defined in lib.rs (#[macro_export]) and available crate-wide.
