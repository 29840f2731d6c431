use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 审查状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Success,
    Error,
}

/// Token 使用情况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokensUsed {
    /// 输入 token 数
    pub input: u64,
    /// 输出 token 数
    pub output: u64,
}

/// 单个模型对一次审查请求的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub status: ReviewStatus,

    /// 审查文本，仅在成功时存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// 错误信息，仅在失败时存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<TokensUsed>,

    /// 包含所有重试和等待的总耗时（毫秒）
    pub latency_ms: u64,

    #[serde(default)]
    pub retries_attempted: u32,
}

impl ReviewResponse {
    pub fn success(
        response: impl Into<String>,
        tokens_used: Option<TokensUsed>,
        latency: Duration,
        retries_attempted: u32,
    ) -> Self {
        Self {
            status: ReviewStatus::Success,
            response: Some(response.into()),
            error: None,
            tokens_used,
            latency_ms: duration_ms(latency),
            retries_attempted,
        }
    }

    pub fn failure(error: impl Into<String>, latency: Duration, retries_attempted: u32) -> Self {
        Self {
            status: ReviewStatus::Error,
            response: None,
            error: Some(error.into()),
            tokens_used: None,
            latency_ms: duration_ms(latency),
            retries_attempted,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReviewStatus::Success
    }
}

/// 带模型标识的审查结果，序列化时字段被展开
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReview {
    pub model: String,
    #[serde(flatten)]
    pub response: ReviewResponse,
}

impl ModelReview {
    pub fn new(model: impl Into<String>, response: ReviewResponse) -> Self {
        Self {
            model: model.into(),
            response,
        }
    }

    /// 未发起任何请求就失败的结果（例如未知模型）
    pub fn failed(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(model, ReviewResponse::failure(error, Duration::ZERO, 0))
    }
}

/// 一次 review 调用的汇总结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// 按请求顺序排列的审查结果
    pub reviews: Vec<ModelReview>,
    pub models_called: Vec<String>,
    pub parallel: bool,
    pub total_latency_ms: u64,
    /// 整个批次无法执行时的错误（此时 `reviews` 为空）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AggregateResult {
    /// 批次级失败，不包含任何模型结果
    pub fn failed(error: impl Into<String>, parallel: bool, total_latency: Duration) -> Self {
        Self {
            reviews: Vec::new(),
            models_called: Vec::new(),
            parallel,
            total_latency_ms: duration_ms(total_latency),
            error: Some(error.into()),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn success_count(&self) -> usize {
        self.reviews.iter().filter(|r| r.response.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.reviews.len() - self.success_count()
    }

    pub fn get(&self, model: &str) -> Option<&ModelReview> {
        self.reviews.iter().find(|r| r.model == model)
    }
}

/// 汇总各模型结果
///
/// 纯函数：保持传入顺序，`models_called` 与 `reviews` 一一对应。
pub fn aggregate(outcomes: Vec<ModelReview>, parallel: bool, total_latency: Duration) -> AggregateResult {
    let models_called = outcomes.iter().map(|r| r.model.clone()).collect();

    AggregateResult {
        reviews: outcomes,
        models_called,
        parallel,
        total_latency_ms: duration_ms(total_latency),
        error: None,
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
