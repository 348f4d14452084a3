use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    ProjectNoActive,
    ProjectUnsupported,
    ProjectNotBuilt,

    SshIdentityFileNotFound,
    SshKeyInvalid,
    SshConnectFailed,
    SshProbeFailed,

    RemoteCommandFailed,
    TransferUploadFailed,

    LocalBuildFailed,
    LocalPublishFailed,

    LauncherFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::ProjectNoActive => "project.no_active",
            ErrorCode::ProjectUnsupported => "project.unsupported",
            ErrorCode::ProjectNotBuilt => "project.not_built",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",
            ErrorCode::SshKeyInvalid => "ssh.key_invalid",
            ErrorCode::SshConnectFailed => "ssh.connect_failed",
            ErrorCode::SshProbeFailed => "ssh.probe_failed",

            ErrorCode::RemoteCommandFailed => "remote.command_failed",
            ErrorCode::TransferUploadFailed => "transfer.upload_failed",

            ErrorCode::LocalBuildFailed => "local.build_failed",
            ErrorCode::LocalPublishFailed => "local.publish_failed",

            ErrorCode::LauncherFailed => "launcher.failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetails {
    pub host: String,
    pub port: u16,
    pub user: String,
}

/// Remote output is kept verbatim: the installers are the source of truth.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub step: String,
    pub command: String,
    pub output: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub target: TargetDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalProcessFailedDetails {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
        });
        Self::new(ErrorCode::ValidationInvalidArgument, problem, details)
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        let message = format!("Missing required configuration key '{}'", key);
        let details = to_details(ConfigMissingKeyDetails { key, path });
        Self::new(ErrorCode::ConfigMissingKey, message, details)
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let details = to_details(ConfigInvalidJsonDetails {
            path: path.into(),
            error: err.to_string(),
        });
        Self::new(
            ErrorCode::ConfigInvalidJson,
            format!("Invalid JSON in configuration: {}", err),
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.clone(),
        });
        Self::new(ErrorCode::ConfigInvalidValue, problem, details)
    }

    pub fn project_no_active(searched: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ProjectNoActive,
            "A startup project is not set or no project is currently active",
            serde_json::json!({ "searched": searched.into() }),
        )
        .with_hint("Pass --project <path to .csproj or its directory>")
    }

    pub fn project_unsupported(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::ProjectUnsupported,
            format!("Project {} is not .NET", name),
            serde_json::json!({ "project": name }),
        )
    }

    pub fn project_not_built(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::ProjectNotBuilt,
            format!("Project is not built:- {}", name),
            serde_json::json!({ "project": name }),
        )
        .with_hint("Run 'sshdbg deploy' first")
    }

    pub fn ssh_identity_file_not_found(identity_file: impl Into<String>) -> Self {
        let identity_file = identity_file.into();
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            format!("SSH private key not found: {}", identity_file),
            serde_json::json!({ "identityFile": identity_file }),
        )
        .with_hint("Try using ssh-keygen -t ecdsa -m PEM to create one")
    }

    pub fn ssh_key_invalid(identity_file: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ErrorCode::SshKeyInvalid,
            format!("SSH: Failed :- {}", reason),
            serde_json::json!({ "identityFile": identity_file.into(), "error": reason }),
        )
        .with_hint("Try using ssh-keygen -t ecdsa -m PEM to create one")
    }

    pub fn ssh_connect_failed(target: TargetDetails, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::SshConnectFailed,
            message.clone(),
            serde_json::json!({ "target": to_details(target), "error": message }),
        )
    }

    pub fn ssh_probe_failed(target: TargetDetails, output: impl Into<String>) -> Self {
        let output = output.into();
        Self::new(
            ErrorCode::SshProbeFailed,
            format!("SSH: Connect failed:- {}", output),
            serde_json::json!({ "target": to_details(target), "output": output }),
        )
    }

    /// The message is the raw remote output so it reaches the log unchanged.
    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        let message = details.output.clone();
        Self::new(ErrorCode::RemoteCommandFailed, message, to_details(details))
    }

    pub fn transfer_upload_failed(
        local: impl Into<String>,
        remote: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::TransferUploadFailed,
            error.clone(),
            serde_json::json!({
                "local": local.into(),
                "remote": remote.into(),
                "error": error,
            }),
        )
    }

    pub fn local_build_failed(command: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::new(
            ErrorCode::LocalBuildFailed,
            "Build failed, check the compiler output",
            to_details(LocalProcessFailedDetails {
                command: command.into(),
                exit_code,
            }),
        )
    }

    pub fn local_publish_failed(command: impl Into<String>, exit_code: Option<i32>) -> Self {
        let message = match exit_code {
            Some(code) => format!("exitCode = {}", code),
            None => "process terminated by signal".to_string(),
        };
        Self::new(
            ErrorCode::LocalPublishFailed,
            message,
            to_details(LocalProcessFailedDetails {
                command: command.into(),
                exit_code,
            }),
        )
    }

    pub fn launcher_failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ErrorCode::LauncherFailed,
            format!("Failed to launch the debugger: {}", reason),
            serde_json::json!({ "error": reason }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let message = match &context {
            Some(ctx) => format!("IO error ({}): {}", ctx, error),
            None => format!("IO error: {}", error),
        };
        let details = to_details(InternalIoErrorDetails { error, context });
        Self::new(ErrorCode::InternalIoError, message, details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalUnexpected,
            format!("Unexpected error: {}", error),
            serde_json::json!({ "error": error }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}
