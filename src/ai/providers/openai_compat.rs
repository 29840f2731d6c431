use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    http_client, join_url, merge_params, read_body, ProviderError, ProviderReply, ReviewProvider,
    ReviewRequest,
};
use crate::config::ProviderKind;
use crate::review::result::TokensUsed;

const DEFAULT_TEMPERATURE: f64 = 0.3;
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// OpenAI 兼容接口的提供商（OpenAI、DeepSeek、SiliconFlow、OpenRouter 等）
pub struct OpenAiCompatProvider {
    endpoint: String,
    api_key: String,
}

/// chat completions 消息结构
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// chat completions 响应结构
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiCompatProvider {
    /// `endpoint` 是 API 根路径，例如 `https://api.openai.com/v1`
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn completions_url(&self) -> String {
        join_url(&self.endpoint, "chat/completions")
    }

    /// 构建请求体：提示词作为 system 消息，工件作为 user 消息，
    /// 附加参数放在顶层并覆盖默认生成参数
    fn build_body(&self, request: &ReviewRequest) -> Value {
        let messages = vec![
            ChatMessage {
                role: "system",
                content: &request.prompt,
            },
            ChatMessage {
                role: "user",
                content: &request.content,
            },
        ];

        let mut body = Map::new();
        body.insert("model".to_string(), Value::from(request.model_name.as_str()));
        body.insert(
            "messages".to_string(),
            serde_json::to_value(&messages).unwrap_or_default(),
        );
        body.insert("temperature".to_string(), Value::from(DEFAULT_TEMPERATURE));
        body.insert("max_tokens".to_string(), Value::from(DEFAULT_MAX_TOKENS));

        merge_params(&mut body, &request.extra_params, &["model", "messages"]);
        Value::Object(body)
    }

    fn parse_reply(body: &str) -> Result<ProviderReply, ProviderError> {
        let parsed: ChatCompletionResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::MalformedResponse(format!("invalid chat completion JSON: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse("no choices[0].message.content in response".to_string()))?;

        let tokens_used = parsed.usage.map(|usage| TokensUsed {
            input: usage.prompt_tokens,
            output: usage.completion_tokens,
        });

        Ok(ProviderReply { text, tokens_used })
    }
}

#[async_trait]
impl ReviewProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiCompat
    }

    async fn send_review(&self, request: &ReviewRequest) -> Result<ProviderReply, ProviderError> {
        let body = self.build_body(request);
        let url = self.completions_url();

        tracing::debug!(url = %url, model = %request.model_name, "Sending chat completion request");

        let response = http_client()?
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let body = read_body(response).await?;
        Self::parse_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_provider() -> OpenAiCompatProvider {
        OpenAiCompatProvider::new("https://api.example.com/v1/", "sk-test")
    }

    #[test]
    fn test_completions_url() {
        let provider = create_test_provider();
        assert_eq!(provider.completions_url(), "https://api.example.com/v1/chat/completions");
        assert_eq!(provider.name(), "openai_compat");
    }

    #[test]
    fn test_build_body_defaults() {
        let provider = create_test_provider();
        let request = ReviewRequest::new("# Brief", "Review this.", "gpt-4o");

        let body = provider.build_body(&request);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "Review this."}));
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "# Brief"}));
        assert_eq!(body["temperature"], json!(0.3));
        assert_eq!(body["max_tokens"], json!(4096));
    }

    #[test]
    fn test_extra_params_at_top_level() {
        let provider = create_test_provider();
        let mut extra = Map::new();
        extra.insert("min_p".into(), json!(0.01));
        extra.insert("top_k".into(), json!(50));
        extra.insert("temperature".into(), json!(0.8));
        let request = ReviewRequest::new("content", "prompt", "m").with_extra_params(extra);

        let body = provider.build_body(&request);
        assert_eq!(body["min_p"], json!(0.01));
        assert_eq!(body["top_k"], json!(50));
        assert_eq!(body["temperature"], json!(0.8));
    }

    #[test]
    fn test_parse_reply() {
        let body = r###"{
            "id": "chatcmpl-123",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "## Review Feedback\nLooks good."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150}
        }"###;

        let reply = OpenAiCompatProvider::parse_reply(body).unwrap();
        assert!(reply.text.contains("Review Feedback"));
        assert_eq!(reply.tokens_used, Some(TokensUsed { input: 100, output: 50 }));
    }

    #[test]
    fn test_parse_reply_without_usage() {
        let body = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
        let reply = OpenAiCompatProvider::parse_reply(body).unwrap();
        assert_eq!(reply.text, "ok");
        assert!(reply.tokens_used.is_none());
    }

    #[test]
    fn test_parse_reply_malformed() {
        let err = OpenAiCompatProvider::parse_reply(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));

        let err = OpenAiCompatProvider::parse_reply("<html>gateway</html>").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }
}
