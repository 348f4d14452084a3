use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::keychain;
use crate::paths;
use crate::ssh::RemoteTarget;

/// Root configuration structure for sshdbg.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SshdbgConfig {
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub debugger: DebuggerConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub markers: InstallMarkers,
    #[serde(default)]
    pub launcher: LauncherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SshConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    /// Use ssh-keygen -t ecdsa -m PEM to create it.
    #[serde(default = "default_private_key")]
    pub private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_passphrase: Option<String>,
    #[serde(default)]
    pub passphrase_from_keychain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default = "default_runtime_dir")]
    pub install_dir: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_runtime_installer")]
    pub installer_url: String,
    #[serde(default = "default_runtime_executable")]
    pub executable: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DebuggerConfig {
    #[serde(default = "default_debugger_dir")]
    pub install_dir: String,
    #[serde(default = "default_debugger_version")]
    pub version: String,
    #[serde(default = "default_debugger_installer")]
    pub installer_url: String,
    #[serde(default = "default_debugger_executable")]
    pub executable: String,
    /// SSH client the debug adapter host spawns to reach the agent.
    #[serde(default = "default_adapter")]
    pub adapter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(default = "default_deploy_root")]
    pub root_dir: String,
}

/// Command and transfer connections keep separate liveness policies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_alive_interval")]
    pub server_alive_interval_secs: u64,
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,
    #[serde(default = "default_alive_interval")]
    pub transfer_alive_interval_secs: u64,
    #[serde(default = "default_scp_flags")]
    pub scp_flags: Vec<String>,
}

/// Installer phrases used to classify provisioning output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstallMarkers {
    #[serde(default = "default_runtime_installed")]
    pub runtime_installed: String,
    #[serde(default = "default_runtime_already_installed")]
    pub runtime_already_installed: String,
    #[serde(default = "default_debugger_installed")]
    pub debugger_installed: String,
    #[serde(default = "default_debugger_skipped")]
    pub debugger_skipped: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LauncherConfig {
    /// Shell command template; `{launchJson}` is replaced with the document path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Remote locations, possibly in `~` shorthand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePaths {
    pub runtime_dir: String,
    pub debugger_dir: String,
    pub deploy_root: String,
}

impl RemotePaths {
    pub fn deployment_dir(&self, project_name: &str) -> String {
        format!("{}/{}", self.deploy_root.trim_end_matches('/'), project_name)
    }

    pub fn runtime_program(&self, executable: &str) -> String {
        format!("{}/{}", self.runtime_dir.trim_end_matches('/'), executable)
    }

    pub fn debugger_program(&self, executable: &str) -> String {
        format!("{}/{}", self.debugger_dir.trim_end_matches('/'), executable)
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "pi".to_string()
}

fn default_private_key() -> String {
    "~/.ssh/id_ecdsa".to_string()
}

fn default_runtime_dir() -> String {
    "~/.dotnet".to_string()
}

fn default_channel() -> String {
    "Current".to_string()
}

fn default_runtime_installer() -> String {
    "https://dot.net/v1/dotnet-install.sh".to_string()
}

fn default_runtime_executable() -> String {
    "dotnet".to_string()
}

fn default_debugger_dir() -> String {
    "~/.vsdbg".to_string()
}

fn default_debugger_version() -> String {
    "latest".to_string()
}

fn default_debugger_installer() -> String {
    "https://aka.ms/getvsdbgsh".to_string()
}

fn default_debugger_executable() -> String {
    "vsdbg".to_string()
}

fn default_adapter() -> String {
    "ssh".to_string()
}

fn default_deploy_root() -> String {
    "~/apps".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_alive_interval() -> u64 {
    15
}

fn default_transfer_timeout() -> u64 {
    15
}

fn default_scp_flags() -> Vec<String> {
    vec!["-O".to_string()]
}

fn default_runtime_installed() -> String {
    "dotnet-install: Installation finished successfully.".to_string()
}

fn default_runtime_already_installed() -> String {
    "is already installed.".to_string()
}

fn default_debugger_installed() -> String {
    "Info: Successfully installed vsdbg".to_string()
}

fn default_debugger_skipped() -> String {
    "Info: Skipping downloads".to_string()
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            private_key: default_private_key(),
            private_key_passphrase: None,
            passphrase_from_keychain: false,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            install_dir: default_runtime_dir(),
            channel: default_channel(),
            installer_url: default_runtime_installer(),
            executable: default_runtime_executable(),
        }
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            install_dir: default_debugger_dir(),
            version: default_debugger_version(),
            installer_url: default_debugger_installer(),
            executable: default_debugger_executable(),
            adapter: default_adapter(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            root_dir: default_deploy_root(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            server_alive_interval_secs: default_alive_interval(),
            transfer_timeout_secs: default_transfer_timeout(),
            transfer_alive_interval_secs: default_alive_interval(),
            scp_flags: default_scp_flags(),
        }
    }
}

impl Default for InstallMarkers {
    fn default() -> Self {
        Self {
            runtime_installed: default_runtime_installed(),
            runtime_already_installed: default_runtime_already_installed(),
            debugger_installed: default_debugger_installed(),
            debugger_skipped: default_debugger_skipped(),
        }
    }
}

impl SshdbgConfig {
    pub fn remote_paths(&self) -> RemotePaths {
        RemotePaths {
            runtime_dir: self.runtime.install_dir.clone(),
            debugger_dir: self.debugger.install_dir.clone(),
            deploy_root: self.deploy.root_dir.clone(),
        }
    }

    /// Reject values that would only fail later, mid-pipeline.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("ssh.host", &self.ssh.host),
            ("ssh.user", &self.ssh.user),
            ("ssh.privateKey", &self.ssh.private_key),
            ("runtime.installDir", &self.runtime.install_dir),
            ("debugger.installDir", &self.debugger.install_dir),
            ("deploy.rootDir", &self.deploy.root_dir),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(Error::config_missing_key(key, config_path_display()));
            }
        }

        if self.ssh.port == 0 {
            return Err(Error::config_invalid_value(
                "ssh.port",
                Some("0".to_string()),
                "SSH port must be between 1 and 65535",
            ));
        }

        Ok(())
    }

    /// Build the connection target, resolving the passphrase from the keychain when asked to.
    pub fn remote_target(&self) -> Result<RemoteTarget> {
        self.validate()?;

        let passphrase = if self.ssh.passphrase_from_keychain {
            keychain::get_passphrase(&self.ssh.user, &self.ssh.host)?
        } else {
            self.ssh
                .private_key_passphrase
                .clone()
                .filter(|p| !p.trim().is_empty())
        };

        Ok(RemoteTarget {
            host: self.ssh.host.clone(),
            port: self.ssh.port,
            user: self.ssh.user.clone(),
            private_key: PathBuf::from(shellexpand::tilde(&self.ssh.private_key).to_string()),
            passphrase,
        })
    }
}

fn config_path_display() -> Option<String> {
    paths::sshdbg_json().ok().map(|p| p.display().to_string())
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load sshdbg.json, falling back to built-in defaults when the file is absent.
pub fn load() -> Result<SshdbgConfig> {
    load_from(&paths::sshdbg_json()?)
}

pub fn load_from(path: &Path) -> Result<SshdbgConfig> {
    if !path.exists() {
        return Ok(SshdbgConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

pub fn save(config: &SshdbgConfig) -> Result<()> {
    save_to(&paths::sshdbg_json()?, config)
}

/// Save config to the given file (creates parent directories if missing).
pub fn save_to(path: &Path, config: &SshdbgConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create {}", parent.display())))
        })?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize sshdbg.json".to_string())))?;

    fs::write(path, content).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("write {}", path.display())))
    })
}

/// Deep-merge a JSON patch into the stored config and persist it.
pub fn merge_into(path: &Path, json_spec: &str) -> Result<SshdbgConfig> {
    let patch: Value = serde_json::from_str(json_spec)
        .map_err(|e| Error::config_invalid_json("<argument>", e))?;
    if !patch.is_object() {
        return Err(Error::validation_invalid_argument(
            "json",
            "Config patch must be a JSON object",
            None,
        ));
    }

    let current = load_from(path)?;
    let mut merged = serde_json::to_value(&current)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize config".to_string())))?;
    merge_json(&mut merged, patch);

    let updated: SshdbgConfig = serde_json::from_value(merged)
        .map_err(|e| Error::config_invalid_json("<merged>", e))?;
    updated.validate()?;
    save_to(path, &updated)?;
    Ok(updated)
}

pub fn merge(json_spec: &str) -> Result<SshdbgConfig> {
    merge_into(&paths::sshdbg_json()?, json_spec)
}

/// Delete sshdbg.json (reset to defaults). Returns whether a file was removed.
pub fn reset() -> Result<bool> {
    let path = paths::sshdbg_json()?;

    if path.exists() {
        fs::remove_file(&path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("delete {}", path.display())))
        })?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Objects merge key by key; anything else (arrays included) replaces. `null` clears.
fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                if value.is_null() {
                    base_map.remove(&key);
                    continue;
                }
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_from(&dir.path().join("sshdbg.json")).unwrap();
        assert_eq!(config, SshdbgConfig::default());
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.runtime.install_dir, "~/.dotnet");
        assert_eq!(config.markers.debugger_skipped, "Info: Skipping downloads");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sshdbg.json");
        fs::write(&path, r#"{"ssh": {"host": "10.0.0.7", "user": "deploy"}}"#).unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.ssh.host, "10.0.0.7");
        assert_eq!(config.ssh.user, "deploy");
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.deploy.root_dir, "~/apps");
    }

    #[test]
    fn invalid_json_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sshdbg.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_from(&path).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_json");
    }

    #[test]
    fn merge_updates_nested_keys_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sshdbg.json");

        merge_into(&path, r#"{"ssh": {"port": 2222}}"#).unwrap();
        let updated = merge_into(&path, r#"{"deploy": {"rootDir": "/srv/apps"}}"#).unwrap();

        assert_eq!(updated.ssh.port, 2222);
        assert_eq!(updated.deploy.root_dir, "/srv/apps");
        assert_eq!(load_from(&path).unwrap(), updated);
    }

    #[test]
    fn merge_rejects_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sshdbg.json");

        let err = merge_into(&path, r#"{"ssh": {"hostname": "x"}}"#).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_json");
        assert!(!path.exists());
    }

    #[test]
    fn validate_rejects_empty_host() {
        let mut config = SshdbgConfig::default();
        config.ssh.host = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
    }

    #[test]
    fn remote_paths_join_without_double_slash() {
        let mut config = SshdbgConfig::default();
        config.deploy.root_dir = "~/apps/".to_string();
        let paths = config.remote_paths();
        assert_eq!(paths.deployment_dir("Blinky"), "~/apps/Blinky");
        assert_eq!(paths.runtime_program("dotnet"), "~/.dotnet/dotnet");
        assert_eq!(paths.debugger_program("vsdbg"), "~/.vsdbg/vsdbg");
    }

    #[test]
    fn blank_passphrase_counts_as_none() {
        let mut config = SshdbgConfig::default();
        config.ssh.private_key_passphrase = Some("   ".to_string());
        let target = config.remote_target().unwrap();
        assert!(target.passphrase.is_none());
    }
}
