use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ai::retry::RetryPolicy;
use crate::config::{ExecutionSettings, ModelConfig, ProviderKind, ReviewSettings};
use crate::review::result::{ReviewResponse, TokensUsed};

pub mod google;
pub mod openai_compat;

pub use google::GoogleProvider;
pub use openai_compat::OpenAiCompatProvider;

/// 错误信息中保留的响应体长度
const MAX_ERROR_BODY_CHARS: usize = 500;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 发往单个模型的审查请求
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRequest {
    /// 工件内容
    pub content: String,
    /// 审查提示词
    pub prompt: String,
    /// 上游使用的模型名
    pub model_name: String,
    /// 超时与重试的覆盖设置
    pub settings: ReviewSettings,
    /// 附加生成参数，覆盖提供商默认值
    pub extra_params: Map<String, Value>,
}

impl ReviewRequest {
    pub fn new(
        content: impl Into<String>,
        prompt: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            prompt: prompt.into(),
            model_name: model_name.into(),
            settings: ReviewSettings::default(),
            extra_params: Map::new(),
        }
    }

    pub fn with_settings(mut self, settings: ReviewSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_extra_params(mut self, extra_params: Map<String, Value>) -> Self {
        self.extra_params = extra_params;
        self
    }
}

/// 上游成功返回的内容
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub text: String,
    pub tokens_used: Option<TokensUsed>,
}

/// 单次上游调用的失败
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        ProviderError::Http {
            status: status.as_u16(),
            body: truncate_text(body.trim(), MAX_ERROR_BODY_CHARS),
        }
    }

    pub fn timed_out_after(timeout: Duration) -> Self {
        ProviderError::Timeout(format!("no response within {}s", timeout.as_secs_f64()))
    }

    /// 认证失败 (401/403) 和无法解析的响应不重试；
    /// 429、超时、网络错误以及其他非 2xx 状态都可以重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => !matches!(status, 401 | 403),
            ProviderError::Timeout(_) => true,
            ProviderError::Transport(_) => true,
            ProviderError::MalformedResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// 模型提供商 trait，每种上游 API 一个实现
#[async_trait]
pub trait ReviewProvider: Send + Sync {
    /// 获取提供商名称
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// 发起一次上游调用，不做任何重试
    async fn send_review(&self, request: &ReviewRequest) -> Result<ProviderReply, ProviderError>;

    /// 带重试和超时的完整审查调用，所有失败都写入返回值
    async fn review(&self, request: &ReviewRequest, defaults: &ExecutionSettings) -> ReviewResponse {
        let policy = RetryPolicy::from_settings(&defaults.apply(&request.settings));
        policy.execute(self, request).await
    }
}

/// 根据模型配置创建提供商实例
pub trait ProviderFactory: Send + Sync {
    fn create(&self, config: &ModelConfig) -> Arc<dyn ReviewProvider>;
}

/// 默认工厂，创建真实的 HTTP 提供商
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProviderFactory;

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, config: &ModelConfig) -> Arc<dyn ReviewProvider> {
        create_provider(config)
    }
}

pub fn create_provider(config: &ModelConfig) -> Arc<dyn ReviewProvider> {
    match config.provider {
        ProviderKind::OpenAiCompat => Arc::new(OpenAiCompatProvider::new(
            config.endpoint.clone(),
            config.api_key.clone(),
        )),
        ProviderKind::Google => Arc::new(GoogleProvider::new(
            config.endpoint.clone(),
            config.api_key.clone(),
        )),
    }
}

/// 每次调用单独创建 HTTP 客户端，不在并发调用之间共享连接
pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Transport(format!("failed to create HTTP client: {}", e)))
}

/// 把附加参数合并进 `target`，附加参数覆盖同名默认值；`reserved` 中的字段不允许覆盖
pub(crate) fn merge_params(target: &mut Map<String, Value>, extra: &Map<String, Value>, reserved: &[&str]) {
    for (key, value) in extra {
        if reserved.contains(&key.as_str()) {
            tracing::warn!(param = %key, "Ignoring extra parameter that would replace the request payload");
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

/// 读取响应：非 2xx 转为 `Http` 错误，成功时返回响应体文本
pub(crate) async fn read_body(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::from_status(status, &body));
    }
    Ok(body)
}

pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

pub(crate) fn join_url(endpoint: &str, path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_errors_are_terminal() {
        let unauthorized = ProviderError::Http { status: 401, body: "Unauthorized".into() };
        let forbidden = ProviderError::Http { status: 403, body: "Forbidden".into() };
        assert!(!unauthorized.is_retryable());
        assert!(!forbidden.is_retryable());
        assert!(unauthorized.to_string().contains("401"));
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(ProviderError::Http { status: 429, body: String::new() }.is_retryable());
        assert!(ProviderError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(ProviderError::Http { status: 400, body: String::new() }.is_retryable());
        assert!(ProviderError::Timeout("deadline".into()).is_retryable());
        assert!(ProviderError::Transport("connection refused".into()).is_retryable());
        assert!(!ProviderError::MalformedResponse("missing choices".into()).is_retryable());
    }

    #[test]
    fn test_timeout_message() {
        let err = ProviderError::timed_out_after(Duration::from_millis(1500));
        assert!(err.to_string().to_lowercase().contains("timed out"));
        assert!(err.to_string().contains("1.5s"));
    }

    #[test]
    fn test_error_body_is_truncated() {
        let body = "x".repeat(2000);
        let err = ProviderError::from_status(reqwest::StatusCode::BAD_GATEWAY, &body);
        match err {
            ProviderError::Http { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.chars().count(), MAX_ERROR_BODY_CHARS + 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_merge_params_respects_reserved_keys() {
        let mut target = Map::new();
        target.insert("model".into(), json!("a-v1"));
        target.insert("temperature".into(), json!(0.3));

        let mut extra = Map::new();
        extra.insert("temperature".into(), json!(0.9));
        extra.insert("model".into(), json!("other"));
        extra.insert("top_k".into(), json!(50));

        merge_params(&mut target, &extra, &["model"]);
        assert_eq!(target["model"], json!("a-v1"));
        assert_eq!(target["temperature"], json!(0.9));
        assert_eq!(target["top_k"], json!(50));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://api.example.com/v1/", "chat/completions"), "https://api.example.com/v1/chat/completions");
        assert_eq!(join_url("https://api.example.com/v1", "/chat/completions"), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_factory_creates_matching_provider() {
        let openai = ModelConfig::new("a", ProviderKind::OpenAiCompat, "https://api.a.com/v1", "a-v1", "sk");
        let google = ModelConfig::new("b", ProviderKind::Google, "https://api.b.com/v1beta", "b-v1", "sk");

        let factory = HttpProviderFactory;
        assert_eq!(factory.create(&openai).kind(), ProviderKind::OpenAiCompat);
        assert_eq!(factory.create(&google).kind(), ProviderKind::Google);
        assert_eq!(factory.create(&google).name(), "google");
    }
}
