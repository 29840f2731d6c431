use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 执行设置的覆盖层
///
/// 每个字段都是可选的，只有出现的字段才会覆盖下层设置。
/// 模型文件的 `settings`、技能配置的 `execution`、单个模型的 `settings`
/// 以及调用方传入的设置都使用这个结构。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawReviewSettings")]
pub struct ReviewSettings {
    /// 单次请求超时时间（秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// 首次请求之后允许的额外重试次数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,

    /// 多个模型是否并行执行
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    /// 第一次重试前的等待时间（毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_initial_ms: Option<u64>,

    /// 重试等待时间上限（毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_max_ms: Option<u64>,
}

/// 配置文件和调用参数中的原始字段
///
/// `_retry_attempts` 与 `retry_attempts` 可以同时出现，前者优先。
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReviewSettings {
    timeout_seconds: Option<u64>,
    retry_attempts: Option<u32>,
    #[serde(rename = "_retry_attempts")]
    private_retry_attempts: Option<u32>,
    parallel: Option<bool>,
    backoff_initial_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
}

impl From<RawReviewSettings> for ReviewSettings {
    fn from(raw: RawReviewSettings) -> Self {
        ReviewSettings {
            timeout_seconds: raw.timeout_seconds,
            retry_attempts: raw.private_retry_attempts.or(raw.retry_attempts),
            parallel: raw.parallel,
            backoff_initial_ms: raw.backoff_initial_ms,
            backoff_max_ms: raw.backoff_max_ms,
        }
    }
}

impl ReviewSettings {
    /// 以 `self` 为底，叠加 `overrides` 中出现的字段
    pub fn merged_with(&self, overrides: &ReviewSettings) -> ReviewSettings {
        ReviewSettings {
            timeout_seconds: overrides.timeout_seconds.or(self.timeout_seconds),
            retry_attempts: overrides.retry_attempts.or(self.retry_attempts),
            parallel: overrides.parallel.or(self.parallel),
            backoff_initial_ms: overrides.backoff_initial_ms.or(self.backoff_initial_ms),
            backoff_max_ms: overrides.backoff_max_ms.or(self.backoff_max_ms),
        }
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = Some(retry_attempts);
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == ReviewSettings::default()
    }
}

/// 完全解析后的执行设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub parallel: bool,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
}

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 1;
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            parallel: true,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl ExecutionSettings {
    /// 叠加一层覆盖设置，返回新的执行设置
    pub fn apply(&self, overrides: &ReviewSettings) -> ExecutionSettings {
        ExecutionSettings {
            timeout_seconds: overrides.timeout_seconds.unwrap_or(self.timeout_seconds),
            retry_attempts: overrides.retry_attempts.unwrap_or(self.retry_attempts),
            parallel: overrides.parallel.unwrap_or(self.parallel),
            backoff_initial_ms: overrides.backoff_initial_ms.unwrap_or(self.backoff_initial_ms),
            backoff_max_ms: overrides.backoff_max_ms.unwrap_or(self.backoff_max_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }

    /// 单次请求的超时时间，最少一秒
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_defaults() {
        let settings = ExecutionSettings::default();
        assert_eq!(settings.timeout_seconds, 60);
        assert_eq!(settings.retry_attempts, 1);
        assert!(settings.parallel);
        assert_eq!(settings.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_override_wins_over_default() {
        let base = ExecutionSettings::default();
        let overrides = ReviewSettings::default()
            .with_retry_attempts(3)
            .with_parallel(false);

        let applied = base.apply(&overrides);
        assert_eq!(applied.retry_attempts, 3);
        assert!(!applied.parallel);
        // 未出现的字段保持原值
        assert_eq!(applied.timeout_seconds, 60);
    }

    #[test]
    fn test_merged_with_prefers_overrides() {
        let model_settings = ReviewSettings::default()
            .with_retry_attempts(2)
            .with_timeout_seconds(30);
        let call_settings = ReviewSettings::default().with_retry_attempts(0);

        let merged = model_settings.merged_with(&call_settings);
        assert_eq!(merged.retry_attempts, Some(0));
        assert_eq!(merged.timeout_seconds, Some(30));
        assert_eq!(merged.parallel, None);
    }

    #[test]
    fn test_legacy_retry_key_is_accepted() {
        let settings: ReviewSettings = serde_json::from_str(r#"{"_retry_attempts": 2}"#).unwrap();
        assert_eq!(settings.retry_attempts, Some(2));

        let settings: ReviewSettings = serde_yaml::from_str("retry_attempts: 4\nparallel: false\n").unwrap();
        assert_eq!(settings.retry_attempts, Some(4));
        assert_eq!(settings.parallel, Some(false));
    }

    #[test]
    fn test_both_retry_keys_prefer_private_key() {
        let settings: ReviewSettings =
            serde_yaml::from_str("retry_attempts: 4
_retry_attempts: 0
timeout_seconds: 30
").unwrap();
        assert_eq!(settings.retry_attempts, Some(0));
        assert_eq!(settings.timeout_seconds, Some(30));

        let settings: ReviewSettings =
            serde_json::from_str(r#"{"_retry_attempts": 3, "retry_attempts": 1}"#).unwrap();
        assert_eq!(settings.retry_attempts, Some(3));
    }

    #[test]
    fn test_serialized_settings_round_trip() {
        let settings = ReviewSettings::default().with_retry_attempts(2).with_parallel(false);
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json, serde_json::json!({"retry_attempts": 2, "parallel": false}));

        let back: ReviewSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let settings = ExecutionSettings::default().apply(&ReviewSettings::default().with_timeout_seconds(0));
        assert_eq!(settings.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_empty_settings() {
        assert!(ReviewSettings::default().is_empty());
        assert!(!ReviewSettings::default().with_parallel(true).is_empty());
    }
}
