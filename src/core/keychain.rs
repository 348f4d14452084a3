//! Keychain storage for the SSH private key passphrase.
//!
//! Uses the system keychain (macOS Keychain, Linux Secret Service, Windows Credential Manager)
//! so the passphrase does not have to sit in sshdbg.json.

use crate::error::{Error, ErrorCode, Result};
use keyring::Entry;
use serde_json::Value;

const SERVICE_NAME: &str = "sshdbg";

fn keyring_error(e: keyring::Error) -> Error {
    Error::new(
        ErrorCode::InternalUnexpected,
        format!("Keychain error: {}", e),
        Value::Null,
    )
}

/// Key format: `<user>@<host>:passphrase`
fn entry_key(user: &str, host: &str) -> String {
    format!("{}@{}:passphrase", user, host)
}

fn entry(user: &str, host: &str) -> Result<Entry> {
    Entry::new(SERVICE_NAME, &entry_key(user, host)).map_err(keyring_error)
}

pub fn store_passphrase(user: &str, host: &str, passphrase: &str) -> Result<()> {
    entry(user, host)?
        .set_password(passphrase)
        .map_err(keyring_error)
}

/// Returns `None` if no passphrase is stored for this target.
pub fn get_passphrase(user: &str, host: &str) -> Result<Option<String>> {
    match entry(user, host)?.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keyring_error(e)),
    }
}

/// Returns whether an entry was removed.
pub fn delete_passphrase(user: &str, host: &str) -> Result<bool> {
    match entry(user, host)?.delete_credential() {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => Err(keyring_error(e)),
    }
}
