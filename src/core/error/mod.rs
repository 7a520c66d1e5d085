use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    DependencyMissing,
    DependencyVersionMismatch,

    CommandSpawnFailed,
    CommandFailed,
    CommandTimeout,

    LoginFailed,
    DownloadFailed,
    NamespaceCreateFailed,
    PanelNameUnavailable,
    DeployFailed,
    OutputParseFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::DependencyMissing => "dependency.missing",
            ErrorCode::DependencyVersionMismatch => "dependency.version_mismatch",

            ErrorCode::CommandSpawnFailed => "command.spawn_failed",
            ErrorCode::CommandFailed => "command.failed",
            ErrorCode::CommandTimeout => "command.timeout",

            ErrorCode::LoginFailed => "login.failed",
            ErrorCode::DownloadFailed => "download.failed",
            ErrorCode::NamespaceCreateFailed => "namespace.create_failed",
            ErrorCode::PanelNameUnavailable => "panel.name_unavailable",
            ErrorCode::DeployFailed => "deploy.failed",
            ErrorCode::OutputParseFailed => "output.parse_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDetails {
    pub tool: String,
    pub required: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
}

/// Everything known about a failed external command.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub output: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFailedDetails {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputParseFailedDetails {
    pub expected: String,
    pub output: String,
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
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
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

fn details_value<T: Serialize>(details: T) -> Value {
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

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = details_value(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let details = details_value(ConfigInvalidJsonDetails {
            path: path.into(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = details_value(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn dependency_missing(
        tool: impl Into<String>,
        required: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        let tool = tool.into();
        let required = required.into();
        let message = format!("{} {} or newer is required", tool, required);
        let details = details_value(DependencyDetails {
            tool,
            required,
            found: None,
            output: output.into(),
        });

        Self::new(ErrorCode::DependencyMissing, message, details)
    }

    pub fn dependency_version_mismatch(
        tool: impl Into<String>,
        required: impl Into<String>,
        found: Option<String>,
        output: impl Into<String>,
    ) -> Self {
        let tool = tool.into();
        let required = required.into();
        let message = match &found {
            Some(found) => format!("{} {} found, {} required", tool, found, required),
            None => format!("Could not determine {} version, {} required", tool, required),
        };
        let details = details_value(DependencyDetails {
            tool,
            required,
            found,
            output: output.into(),
        });

        Self::new(ErrorCode::DependencyVersionMismatch, message, details)
    }

    /// Installing a pinned tool version failed.
    pub fn dependency_install_failed(
        tool: &str,
        required: &str,
        details: CommandFailedDetails,
    ) -> Self {
        let reason = details.error.clone().unwrap_or_else(|| "failed".to_string());
        Self::new(
            ErrorCode::DependencyMissing,
            format!("Installing {}@{} failed: {}", tool, required, reason),
            details_value(details),
        )
        .with_hint(format!("Try 'npm install -g {}@{}' manually", tool, required))
    }

    pub fn command_spawn_failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        let command = command.into();
        let error = error.into();
        let message = format!("Failed to start '{}': {}", command, error);
        let details = details_value(CommandFailedDetails {
            command,
            error: Some(error),
            ..Default::default()
        });

        Self::new(ErrorCode::CommandSpawnFailed, message, details)
    }

    /// Command ran but did not succeed. Timeouts get their own code.
    pub fn command_failed(message: impl Into<String>, details: CommandFailedDetails) -> Self {
        let code = if details.timed_out {
            ErrorCode::CommandTimeout
        } else {
            ErrorCode::CommandFailed
        };
        Self::new(code, message, details_value(details))
    }

    pub fn login_failed(message: impl Into<String>, cause: Option<&Error>) -> Self {
        let details = match cause {
            Some(cause) => serde_json::json!({ "cause": cause.summary() }),
            None => Value::Object(serde_json::Map::new()),
        };

        Self::new(ErrorCode::LoginFailed, message, details)
            .with_hint("Run 'npx wrangler login' manually to check the Cloudflare session")
    }

    pub fn download_failed(
        url: impl Into<String>,
        status: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let message = match status {
            Some(status) => format!("Download of {} failed with HTTP {}", url, status),
            None => format!("Download of {} failed", url),
        };
        let details = details_value(DownloadFailedDetails {
            url,
            status,
            error: error.into(),
        });

        Self::new(ErrorCode::DownloadFailed, message, details)
    }

    pub fn namespace_create_failed(name: &str, details: CommandFailedDetails) -> Self {
        Self::new(
            ErrorCode::NamespaceCreateFailed,
            format!("Failed to create KV namespace '{}'", name),
            details_value(details),
        )
    }

    pub fn panel_name_unavailable(attempts: u32) -> Self {
        Self::new(
            ErrorCode::PanelNameUnavailable,
            format!("No available project name found after {} attempts", attempts),
            serde_json::json!({ "attempts": attempts }),
        )
        .with_hint("Raise or remove defaults.panel.nameAttemptLimit in wizard.json")
    }

    pub fn deploy_failed(message: impl Into<String>, details: CommandFailedDetails) -> Self {
        Self::new(ErrorCode::DeployFailed, message, details_value(details))
    }

    pub fn output_parse_failed(expected: impl Into<String>, output: impl Into<String>) -> Self {
        let expected = expected.into();
        let message = format!("Could not find {} in command output", expected);
        let details = details_value(OutputParseFailedDetails {
            expected,
            output: output.into(),
        });

        Self::new(ErrorCode::OutputParseFailed, message, details)
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = details_value(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = details_value(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    /// Compact JSON view used when one error is nested inside another.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "code": self.code.as_str(),
            "message": self.message,
            "details": self.details,
        })
    }
}
