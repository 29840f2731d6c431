use std::time::{Duration, Instant};

use crate::ai::providers::{ProviderError, ReviewProvider, ReviewRequest};
use crate::config::ExecutionSettings;
use crate::review::result::ReviewResponse;

/// 指数退避
///
/// 第 k 次重试（从 0 开始）前等待 `min(initial_delay * multiplier^k, max_delay)`，
/// 延迟序列单调不减，不加抖动。
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// 计算第 `retry` 次重试前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        // 小于 1 的倍数会让延迟递减
        let multiplier = self.multiplier.max(1.0);
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base_ms = self.initial_delay.as_millis() as f64 * multiplier.powi(exponent);
        let max_ms = self.max_delay.max(self.initial_delay).as_millis() as f64;

        Duration::from_millis(base_ms.min(max_ms) as u64)
    }
}

/// 单个模型调用的重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 首次请求之后最多再尝试的次数
    pub retry_attempts: u32,
    /// 单次请求的超时时间
    pub timeout: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&ExecutionSettings::default())
    }
}

impl RetryPolicy {
    pub fn new(retry_attempts: u32, timeout: Duration, backoff: Backoff) -> Self {
        Self {
            retry_attempts,
            timeout,
            backoff,
        }
    }

    pub fn from_settings(settings: &ExecutionSettings) -> Self {
        Self {
            retry_attempts: settings.retry_attempts,
            timeout: settings.timeout(),
            backoff: Backoff::new(
                Duration::from_millis(settings.backoff_initial_ms.max(1)),
                Duration::from_millis(settings.backoff_max_ms),
                settings.backoff_multiplier,
            ),
        }
    }

    /// 最多发起的请求次数
    pub fn max_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }

    /// 执行带重试的审查请求
    ///
    /// 遇到第一次成功或第一个不可重试的错误就停止；重试次数用完后返回最后一次的错误。
    /// 返回的 `latency_ms` 覆盖从第一次请求开始到最终结果的全部时间。
    pub async fn execute<P>(&self, provider: &P, request: &ReviewRequest) -> ReviewResponse
    where
        P: ReviewProvider + ?Sized,
    {
        let started = Instant::now();
        let mut retries = 0u32;

        loop {
            let outcome = match tokio::time::timeout(self.timeout, provider.send_review(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::timed_out_after(self.timeout)),
            };

            let error = match outcome {
                Ok(reply) => {
                    tracing::debug!(
                        provider = provider.name(),
                        model = %request.model_name,
                        retries,
                        "Review request succeeded"
                    );
                    return ReviewResponse::success(reply.text, reply.tokens_used, started.elapsed(), retries);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                tracing::error!(
                    provider = provider.name(),
                    model = %request.model_name,
                    error = %error,
                    "Review request failed with a non-retryable error"
                );
                return ReviewResponse::failure(error.to_string(), started.elapsed(), retries);
            }

            if retries >= self.retry_attempts {
                tracing::error!(
                    provider = provider.name(),
                    model = %request.model_name,
                    attempts = retries + 1,
                    error = %error,
                    "Review request failed after exhausting retries"
                );
                return ReviewResponse::failure(error.to_string(), started.elapsed(), retries);
            }

            let delay = self.backoff.delay_for(retries);
            retries += 1;

            tracing::warn!(
                provider = provider.name(),
                model = %request.model_name,
                attempt = retries,
                max_attempts = self.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Review request failed, retrying"
            );

            tokio::time::sleep(delay).await;
        }
    }
}
