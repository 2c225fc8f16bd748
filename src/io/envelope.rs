//! JSON output envelope shared by every command.
//!
//! ```json
//! {"status": "success", "code": "OK", "count": 2, "data": [...]}
//! {"status": "error", "code": "LANGUAGE_NOT_FOUND", "message": "Language not recognized: cobol"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ArgusError;
use crate::plugins::PluginError;

/// Operation outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Operation succeeded with results
    Success,
    /// Operation succeeded but found nothing
    NotFound,
    /// Operation failed
    Error,
}

/// Machine-readable result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Ok,
    NotFound,
    WorkspaceInvalid,
    LanguageNotFound,
    NotReady,
    ConfigError,
    NoTestRunner,
    PluginError,
    IoError,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "NOT_FOUND",
            Self::WorkspaceInvalid => "WORKSPACE_INVALID",
            Self::LanguageNotFound => "LANGUAGE_NOT_FOUND",
            Self::NotReady => "NOT_READY",
            Self::ConfigError => "CONFIG_ERROR",
            Self::NoTestRunner => "NO_TEST_RUNNER",
            Self::PluginError => "PLUGIN_ERROR",
            Self::IoError => "IO_ERROR",
        }
    }

    /// Process exit status for this outcome. An empty result is still a
    /// successful run.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ok | Self::NotFound => 0,
            Self::WorkspaceInvalid | Self::ConfigError => 2,
            Self::LanguageNotFound => 3,
            Self::NotReady => 4,
            Self::NoTestRunner => 5,
            Self::PluginError | Self::IoError => 6,
        }
    }
}

impl From<&ArgusError> for ResultCode {
    fn from(error: &ArgusError) -> Self {
        match error {
            ArgusError::WorkspaceInvalid { .. } => Self::WorkspaceInvalid,
            ArgusError::LanguageNotFound { .. } => Self::LanguageNotFound,
            ArgusError::NotReady => Self::NotReady,
            ArgusError::Config(_) => Self::ConfigError,
            ArgusError::Plugin(
                PluginError::ManifestMissing { .. }
                | PluginError::NoTestScript { .. }
                | PluginError::NoTestRunner { .. },
            ) => Self::NoTestRunner,
            ArgusError::Plugin(_) => Self::PluginError,
            ArgusError::Io(_) => Self::IoError,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    pub status: Status,

    pub code: ResultCode,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Result payload, absent on error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Number of items in `data` when it is a list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            code: ResultCode::Ok,
            message: None,
            data: Some(data),
            count: None,
        }
    }

    /// A list result; an empty list reports `not_found`.
    pub fn list(data: T, count: usize) -> Self {
        let mut envelope = Self::success(data).with_count(count);
        if count == 0 {
            envelope.status = Status::NotFound;
            envelope.code = ResultCode::NotFound;
        }
        envelope
    }

    pub fn error(error: &ArgusError) -> Self {
        Self {
            status: Status::Error,
            code: ResultCode::from(error),
            message: Some(error.to_string()),
            data: None,
            count: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Process exit status.
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let envelope = Envelope::list(vec!["python"], 1);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"status": "success", "code": "OK", "data": ["python"], "count": 1})
        );
        assert_eq!(envelope.exit_code(), 0);
    }

    #[test]
    fn test_empty_list_is_not_found() {
        let envelope = Envelope::list(Vec::<String>::new(), 0);
        assert_eq!(envelope.status, Status::NotFound);
        assert_eq!(envelope.code.as_str(), "NOT_FOUND");
        assert_eq!(envelope.exit_code(), 0);
        assert_eq!(ResultCode::NotFound.exit_code(), ResultCode::Ok.exit_code());
    }

    #[test]
    fn test_error_shape() {
        let error = ArgusError::LanguageNotFound {
            name: "cobol".to_string(),
        };
        let envelope: Envelope = Envelope::error(&error);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["code"], "LANGUAGE_NOT_FOUND");
        assert_eq!(value["message"], "Language not recognized: cobol");
        assert!(value.get("data").is_none());
        assert_eq!(envelope.exit_code(), 3);
    }
}
