use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base sshdbg config directory (~/.config/sshdbg/, %APPDATA%\sshdbg on Windows)
pub fn sshdbg() -> Result<PathBuf> {
    if let Ok(dir) = env::var("SSHDBG_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected("APPDATA environment variable not set on Windows")
        })?;
        Ok(PathBuf::from(appdata).join("sshdbg"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected("HOME environment variable not set on Unix-like system")
        })?;
        Ok(PathBuf::from(home).join(".config").join("sshdbg"))
    }
}

/// Global sshdbg.json config file path
pub fn sshdbg_json() -> Result<PathBuf> {
    Ok(sshdbg()?.join("sshdbg.json"))
}
