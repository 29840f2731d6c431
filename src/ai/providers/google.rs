use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{
    http_client, join_url, merge_params, read_body, ProviderError, ProviderReply, ReviewProvider,
    ReviewRequest,
};
use crate::config::ProviderKind;
use crate::review::result::TokensUsed;

const DEFAULT_TEMPERATURE: f64 = 0.3;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Google generative language 接口 (Gemini) 的提供商
pub struct GoogleProvider {
    endpoint: String,
    api_key: String,
}

/// generateContent 响应结构
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GoogleProvider {
    /// `endpoint` 是 API 根路径，例如 `https://generativelanguage.googleapis.com/v1beta`
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn generate_url(&self, model_name: &str) -> String {
        join_url(&self.endpoint, &format!("models/{}:generateContent", model_name))
    }

    /// 构建请求体：提示词和工件拼接为一条 user 消息，
    /// 附加参数合并进 `generationConfig` 而不是顶层
    fn build_body(&self, request: &ReviewRequest) -> Value {
        let mut generation_config = Map::new();
        generation_config.insert("temperature".to_string(), Value::from(DEFAULT_TEMPERATURE));
        generation_config.insert("maxOutputTokens".to_string(), Value::from(DEFAULT_MAX_OUTPUT_TOKENS));
        merge_params(&mut generation_config, &request.extra_params, &[]);

        json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{"text": format!("{}\n\n{}", request.prompt, request.content)}]
                }
            ],
            "generationConfig": Value::Object(generation_config),
        })
    }

    fn parse_reply(body: &str) -> Result<ProviderReply, ProviderError> {
        let parsed: GenerateContentResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::MalformedResponse(format!("invalid generateContent JSON: {}", e)))?;

        if parsed.candidates.is_empty() {
            if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(ProviderError::MalformedResponse(format!("prompt blocked: {}", reason)));
            }
        }

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or_else(|| {
                ProviderError::MalformedResponse("no candidates[0].content.parts[0].text in response".to_string())
            })?;

        let tokens_used = parsed.usage_metadata.map(|usage| TokensUsed {
            input: usage.prompt_token_count,
            output: usage.candidates_token_count,
        });

        Ok(ProviderReply { text, tokens_used })
    }
}

#[async_trait]
impl ReviewProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn send_review(&self, request: &ReviewRequest) -> Result<ProviderReply, ProviderError> {
        let body = self.build_body(request);
        let url = self.generate_url(&request.model_name);

        tracing::debug!(url = %url, model = %request.model_name, "Sending generateContent request");

        let response = http_client()?
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let body = read_body(response).await?;
        Self::parse_reply(&body)
    }
}
