use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 审查流程中除上游调用以外的错误
///
/// 上游 HTTP 调用的失败由 [`crate::ai::providers::ProviderError`] 表示，
/// 并且总是以数据形式写入单个模型的审查结果，不会经过这里。
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReviewError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Artifact not found: {path}")]
    ArtifactNotFound { path: String },

    #[error("Artifact unreadable: {path} ({message})")]
    ArtifactUnreadable { path: String, message: String },

    #[error("Unknown model: {model}")]
    UnknownModel { model: String },

    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },
}

impl ReviewError {
    /// 创建配置错误
    pub fn config(message: impl Into<String>) -> Self {
        ReviewError::Configuration {
            message: message.into(),
        }
    }

    /// 创建工件不存在错误
    pub fn artifact_not_found(path: impl Into<String>) -> Self {
        ReviewError::ArtifactNotFound { path: path.into() }
    }

    /// 创建工件不可读错误
    pub fn artifact_unreadable(path: impl Into<String>, message: impl Into<String>) -> Self {
        ReviewError::ArtifactUnreadable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 创建未知模型错误
    pub fn unknown_model(model: impl Into<String>) -> Self {
        ReviewError::UnknownModel {
            model: model.into(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>, field: Option<String>) -> Self {
        ReviewError::Validation {
            message: message.into(),
            field,
        }
    }
}

impl From<serde_yaml::Error> for ReviewError {
    fn from(err: serde_yaml::Error) -> Self {
        ReviewError::config(format!("invalid YAML: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_message() {
        let err = ReviewError::unknown_model("nonexistent-model");
        assert_eq!(err.to_string(), "Unknown model: nonexistent-model");
    }

    #[test]
    fn test_artifact_error_messages() {
        let err = ReviewError::artifact_not_found("docs/brief.md");
        assert_eq!(err.to_string(), "Artifact not found: docs/brief.md");

        let err = ReviewError::artifact_unreadable("docs/brief.md", "invalid UTF-8");
        assert!(err.to_string().contains("invalid UTF-8"));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<Vec<String>>("{ not: [a list").unwrap_err();
        let err: ReviewError = yaml_err.into();
        assert!(matches!(err, ReviewError::Configuration { .. }));
        assert!(err.to_string().contains("invalid YAML"));
    }
}
