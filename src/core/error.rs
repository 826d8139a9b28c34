use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalid,
    ConfigExists,

    ValidationInvalidArgument,

    PipelineNotFound,
    PipelineNoServers,
    ServerNotFound,
    TaskNotFound,

    SshKeyUnreadable,
    SshKeyInvalid,
    SshConnectFailed,
    SshSessionFailed,
    SshSessionCloseFailed,
    SshCloseFailed,

    CommandFailed,
    CommandSpawnFailed,

    InternalIoError,
    InternalJsonError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalid => "config.invalid",
            ErrorCode::ConfigExists => "config.exists",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::PipelineNotFound => "pipeline.not_found",
            ErrorCode::PipelineNoServers => "pipeline.no_servers",
            ErrorCode::ServerNotFound => "server.not_found",
            ErrorCode::TaskNotFound => "task.not_found",

            ErrorCode::SshKeyUnreadable => "ssh.key_unreadable",
            ErrorCode::SshKeyInvalid => "ssh.key_invalid",
            ErrorCode::SshConnectFailed => "ssh.connect_failed",
            ErrorCode::SshSessionFailed => "ssh.session_failed",
            ErrorCode::SshSessionCloseFailed => "ssh.session_close_failed",
            ErrorCode::SshCloseFailed => "ssh.close_failed",

            ErrorCode::CommandFailed => "command.failed",
            ErrorCode::CommandSpawnFailed => "command.spawn_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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
pub struct NotFoundDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyDetails {
    pub server_id: String,
    pub private_key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl TargetDetails {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn server(server_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            server_id: Some(server_id.into()),
            host: Some(host.into()),
        }
    }

    fn describe(&self) -> String {
        match (&self.server_id, &self.host) {
            (Some(id), Some(host)) => format!("server {} ({})", id, host),
            (Some(id), None) => format!("server {}", id),
            _ => "local shell".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshTransportDetails {
    pub target: TargetDetails,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub output: String,
    pub target: TargetDetails,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
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

    // Lookup

    pub fn pipeline_not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::PipelineNotFound,
            format!("pipeline {} is not defined", id),
            to_details(NotFoundDetails { id, pipeline: None }),
        )
        .with_hint("Run 'ploy check' to list the pipelines in the configuration")
    }

    pub fn pipeline_no_servers(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::PipelineNoServers,
            format!("pipeline {} has no servers", id),
            to_details(NotFoundDetails { id, pipeline: None }),
        )
        .with_hint("Add servers to the pipeline or run it with --local")
    }

    pub fn server_not_found(id: impl Into<String>, pipeline: Option<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::ServerNotFound,
            format!("server {} does not exist", id),
            to_details(NotFoundDetails { id, pipeline }),
        )
        .with_hint("Run 'ploy check' to find dangling server references")
    }

    pub fn task_not_found(id: impl Into<String>, pipeline: Option<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::TaskNotFound,
            format!("task {} is not defined", id),
            to_details(NotFoundDetails { id, pipeline }),
        )
        .with_hint("Run 'ploy check' to find dangling task references")
    }

    // Credentials

    pub fn ssh_key_unreadable(
        server_id: impl Into<String>,
        private_key: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let details = SshKeyDetails {
            server_id: server_id.into(),
            private_key: private_key.into(),
            error: error.into(),
        };
        Self::new(
            ErrorCode::SshKeyUnreadable,
            format!(
                "error reading private key ({}): {}",
                details.private_key, details.error
            ),
            to_details(details),
        )
    }

    pub fn ssh_key_invalid(
        server_id: impl Into<String>,
        private_key: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let details = SshKeyDetails {
            server_id: server_id.into(),
            private_key: private_key.into(),
            error: error.into(),
        };
        Self::new(
            ErrorCode::SshKeyInvalid,
            format!(
                "error parsing private key ({}): {}",
                details.private_key, details.error
            ),
            to_details(details),
        )
        .with_hint("Only unencrypted OpenSSH or PEM private keys are supported")
    }

    // Transport

    pub fn ssh_connect_failed(target: TargetDetails, error: impl Into<String>) -> Self {
        let error = error.into();
        let message = format!("error dialing SSH server ({}): {}", target.describe(), error);
        let mut err = Self::new(
            ErrorCode::SshConnectFailed,
            message,
            to_details(SshTransportDetails {
                target,
                error,
                command: None,
            }),
        );
        err.retryable = Some(true);
        err
    }

    pub fn ssh_session_failed(
        target: TargetDetails,
        command: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        let message = format!("error creating SSH session on {}: {}", target.describe(), error);
        Self::new(
            ErrorCode::SshSessionFailed,
            message,
            to_details(SshTransportDetails {
                target,
                error,
                command,
            }),
        )
    }

    pub fn ssh_session_close_failed(target: TargetDetails, error: impl Into<String>) -> Self {
        let error = error.into();
        let message = format!("error closing SSH session on {}: {}", target.describe(), error);
        Self::new(
            ErrorCode::SshSessionCloseFailed,
            message,
            to_details(SshTransportDetails {
                target,
                error,
                command: None,
            }),
        )
    }

    pub fn ssh_close_failed(target: TargetDetails, error: impl Into<String>) -> Self {
        let error = error.into();
        let message = format!("error closing SSH client for {}: {}", target.describe(), error);
        Self::new(
            ErrorCode::SshCloseFailed,
            message,
            to_details(SshTransportDetails {
                target,
                error,
                command: None,
            }),
        )
    }

    // Execution

    pub fn command_failed(details: CommandFailedDetails) -> Self {
        let message = format!(
            "error running command ({}) on {}: exit status {}",
            details.command,
            details.target.describe(),
            details.exit_code
        );
        Self::new(ErrorCode::CommandFailed, message, to_details(details))
    }

    pub fn command_spawn_failed(
        command: impl Into<String>,
        target: TargetDetails,
        error: impl Into<String>,
    ) -> Self {
        let command = command.into();
        let error = error.into();
        Self::new(
            ErrorCode::CommandSpawnFailed,
            format!("error starting command ({}): {}", command, error),
            serde_json::json!({
                "command": command,
                "error": error,
                "target": target,
            }),
        )
    }

    // Config / validation

    pub fn config_invalid(path: impl Into<String>, error: impl Into<String>) -> Self {
        let details = ConfigInvalidDetails {
            path: path.into(),
            error: error.into(),
        };
        Self::new(
            ErrorCode::ConfigInvalid,
            format!("invalid configuration ({}): {}", details.path, details.error),
            to_details(details),
        )
    }

    pub fn config_exists(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigExists,
            format!("configuration {} already exists", path),
            serde_json::json!({ "path": path }),
        )
        .with_hint("Pass --force to overwrite it")
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        let details = InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            value,
        };
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            format!("invalid {}: {}", details.field, details.problem),
            to_details(details),
        )
    }

    // Internal

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Attach `value` under `key` in the details object.
    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        if !self.details.is_object() {
            let mut map = serde_json::Map::new();
            if !self.details.is_null() {
                map.insert("value".to_string(), self.details.take());
            }
            self.details = Value::Object(map);
        }
        if let Some(map) = self.details.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_messages_name_the_missing_entity() {
        assert_eq!(
            Error::pipeline_not_found("deploy").message,
            "pipeline deploy is not defined"
        );
        assert_eq!(
            Error::server_not_found("web", None).message,
            "server web does not exist"
        );
        assert_eq!(
            Error::task_not_found("build", Some("deploy".to_string())).message,
            "task build is not defined"
        );
        assert_eq!(
            Error::pipeline_no_servers("deploy").message,
            "pipeline deploy has no servers"
        );
    }

    #[test]
    fn task_not_found_records_pipeline_in_details() {
        let err = Error::task_not_found("build", Some("deploy".to_string()));
        assert_eq!(err.code.as_str(), "task.not_found");
        assert_eq!(err.details["id"], "build");
        assert_eq!(err.details["pipeline"], "deploy");
    }

    #[test]
    fn command_failed_message_names_command_and_target() {
        let err = Error::command_failed(CommandFailedDetails {
            command: "false".to_string(),
            exit_code: 1,
            output: String::new(),
            target: TargetDetails::server("web", "10.0.0.1"),
        });
        assert!(err.message.contains("(false)"));
        assert!(err.message.contains("server web (10.0.0.1)"));
        assert_eq!(err.details["exitCode"], 1);
    }

    #[test]
    fn key_errors_include_path() {
        let err = Error::ssh_key_unreadable("web", "/nope/id_rsa", "No such file");
        assert!(err.message.contains("/nope/id_rsa"));
        assert_eq!(err.details["serverId"], "web");
    }

    #[test]
    fn with_detail_extends_object_details() {
        let err = Error::pipeline_not_found("deploy").with_detail("extra", Value::from(3));
        assert_eq!(err.details["id"], "deploy");
        assert_eq!(err.details["extra"], 3);

        let mut bare = Error::pipeline_not_found("deploy");
        bare.details = Value::from("raw");
        let bare = bare.with_detail("extra", Value::Bool(true));
        assert_eq!(bare.details["value"], "raw");
        assert_eq!(bare.details["extra"], true);
    }
}
