use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ai::providers::{HttpProviderFactory, ProviderFactory, ReviewProvider, ReviewRequest};
use crate::ai::retry::RetryPolicy;
use crate::config::{ModelConfig, ProviderKind, ReviewConfig, ReviewSettings};
use crate::infrastructure::error::ReviewError;

use super::artifact::{ArtifactSource, FsArtifactSource};
use super::result::{aggregate, AggregateResult, ModelReview};

/// `list_models` 的返回结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelListing {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: ProviderKind,
    pub model: String,
    pub available: bool,
}

/// 单个模型的待执行任务
enum ReviewJob {
    Ready {
        model_id: String,
        provider: Arc<dyn ReviewProvider>,
        request: ReviewRequest,
        policy: RetryPolicy,
    },
    Unknown {
        model_id: String,
    },
}

impl ReviewJob {
    fn model_id(&self) -> &str {
        match self {
            ReviewJob::Ready { model_id, .. } => model_id,
            ReviewJob::Unknown { model_id } => model_id,
        }
    }

    async fn run(self) -> ModelReview {
        match self {
            ReviewJob::Ready {
                model_id,
                provider,
                request,
                policy,
            } => {
                let response = policy.execute(provider.as_ref(), &request).await;
                ModelReview::new(model_id, response)
            }
            ReviewJob::Unknown { model_id } => {
                let error = ReviewError::unknown_model(&model_id);
                ModelReview::failed(model_id, error.to_string())
            }
        }
    }
}

/// 审查编排器
///
/// 把工件和提示词发给多个模型，每个模型独立重试，最后按请求顺序汇总结果。
/// 单个模型的失败只体现在它自己的结果里，不会影响其他模型。
pub struct ReviewOrchestrator {
    config: Arc<ReviewConfig>,
    factory: Arc<dyn ProviderFactory>,
    artifacts: Arc<dyn ArtifactSource>,
}

impl ReviewOrchestrator {
    /// 使用真实 HTTP 提供商和本地文件系统创建编排器
    pub fn new(config: ReviewConfig) -> Self {
        Self {
            config: Arc::new(config),
            factory: Arc::new(HttpProviderFactory),
            artifacts: Arc::new(FsArtifactSource::new()),
        }
    }

    pub fn with_provider_factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_artifact_source(mut self, artifacts: Arc<dyn ArtifactSource>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// 列出注册表中的模型及其可用性
    pub fn list_models(&self) -> ModelListing {
        ModelListing {
            models: self
                .config
                .registry
                .iter()
                .map(|model| ModelInfo {
                    id: model.id.clone(),
                    provider: model.provider,
                    model: model.model.clone(),
                    available: model.is_available(),
                })
                .collect(),
        }
    }

    /// 执行一次审查
    ///
    /// 只有工件无法读取或没有任何模型可用时才返回批次级错误；
    /// 其余情况下每个请求的模型都有一条结果，顺序与请求一致。
    pub async fn review(
        &self,
        models: &[String],
        artifact_path: &str,
        prompt: &str,
        settings: Option<ReviewSettings>,
        extra_params: Option<Map<String, Value>>,
    ) -> AggregateResult {
        let started = Instant::now();
        let call_settings = settings.unwrap_or_default();
        let parallel = self.config.execution.apply(&call_settings).parallel;

        let requested = self.requested_models(models);
        if requested.is_empty() {
            tracing::warn!("Review called without models and no default_models configured");
            return AggregateResult::failed("No models requested", parallel, started.elapsed());
        }

        let content = match self.artifacts.read(artifact_path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = artifact_path, error = %e, "Artifact could not be read");
                return AggregateResult::failed(e.to_string(), parallel, started.elapsed());
            }
        };

        let jobs: Vec<ReviewJob> = requested
            .into_iter()
            .map(|model_id| {
                self.prepare_job(model_id, &content, prompt, &call_settings, extra_params.as_ref())
            })
            .collect();

        tracing::info!(
            models = jobs.len(),
            parallel,
            "Dispatching review requests"
        );

        let outcomes = if parallel {
            self.dispatch_parallel(jobs).await
        } else {
            self.dispatch_sequential(jobs).await
        };

        let result = aggregate(outcomes, parallel, started.elapsed());
        tracing::info!(
            succeeded = result.success_count(),
            failed = result.failure_count(),
            total_latency_ms = result.total_latency_ms,
            "Review finished"
        );
        result
    }

    /// 去重并在未指定模型时回退到默认模型列表
    fn requested_models(&self, models: &[String]) -> Vec<String> {
        let source = if models.is_empty() {
            self.config.registry.default_models()
        } else {
            models
        };

        let mut seen = HashSet::new();
        source
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .filter(|id| seen.insert(id.to_string()))
            .map(str::to_string)
            .collect()
    }

    fn prepare_job(
        &self,
        model_id: String,
        content: &str,
        prompt: &str,
        call_settings: &ReviewSettings,
        extra_params: Option<&Map<String, Value>>,
    ) -> ReviewJob {
        let Some(model) = self.config.registry.get(&model_id) else {
            tracing::warn!(model = %model_id, "Unknown model requested");
            return ReviewJob::Unknown { model_id };
        };

        let settings = model.settings.merged_with(call_settings);
        let policy = RetryPolicy::from_settings(&self.config.execution.apply(&settings));
        let request = self.build_request(model, content, prompt, settings, extra_params);

        ReviewJob::Ready {
            model_id,
            provider: self.factory.create(model),
            request,
            policy,
        }
    }

    fn build_request(
        &self,
        model: &ModelConfig,
        content: &str,
        prompt: &str,
        settings: ReviewSettings,
        extra_params: Option<&Map<String, Value>>,
    ) -> ReviewRequest {
        ReviewRequest::new(content, prompt, model.model.clone())
            .with_settings(settings)
            .with_extra_params(model.merged_extra_params(extra_params))
    }

    /// 每个模型一个任务，等待全部完成；任何一个失败都不会取消其他任务
    async fn dispatch_parallel(&self, jobs: Vec<ReviewJob>) -> Vec<ModelReview> {
        let model_ids: Vec<String> = jobs.iter().map(|job| job.model_id().to_string()).collect();
        let handles = jobs.into_iter().map(|job| tokio::spawn(job.run()));

        join_all(handles)
            .await
            .into_iter()
            .zip(model_ids)
            .map(|(joined, model_id)| match joined {
                Ok(review) => review,
                Err(e) => {
                    tracing::error!(model = %model_id, error = %e, "Review task failed");
                    ModelReview::failed(model_id, format!("Review task failed: {}", e))
                }
            })
            .collect()
    }

    /// 按请求顺序逐个执行
    async fn dispatch_sequential(&self, jobs: Vec<ReviewJob>) -> Vec<ModelReview> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(job.run().await);
        }
        results
    }
}
