use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::settings::ReviewSettings;

static ENV_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env reference pattern")
});

/// 上游 API 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// OpenAI 兼容的 chat completions 接口
    #[serde(rename = "openai_compat", alias = "openai")]
    OpenAiCompat,
    /// Google generative language 接口 (Gemini)
    #[serde(rename = "google", alias = "gemini")]
    Google,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAiCompat => "openai_compat",
            ProviderKind::Google => "google",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个模型的配置，加载后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    /// 注册表中的唯一标识
    pub id: String,
    pub provider: ProviderKind,
    pub endpoint: String,
    /// 上游使用的模型名
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// 默认附加参数，调用方的附加参数会覆盖同名字段
    pub extra_params: Map<String, Value>,
    pub settings: ReviewSettings,
}

impl ModelConfig {
    pub fn new(
        id: impl Into<String>,
        provider: ProviderKind,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            provider,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            extra_params: Map::new(),
            settings: ReviewSettings::default(),
        }
    }

    pub fn with_extra_params(mut self, extra_params: Map<String, Value>) -> Self {
        self.extra_params = extra_params;
        self
    }

    pub fn with_settings(mut self, settings: ReviewSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 配置结构是否完整：端点是合法的绝对 URL，并且模型名和 API key 都不为空
    pub fn is_available(&self) -> bool {
        let endpoint_ok = !self.endpoint.trim().is_empty()
            && url::Url::parse(self.endpoint.trim())
                .map(|url| url.has_host())
                .unwrap_or(false);

        endpoint_ok && !self.model.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    /// 合并模型默认附加参数与调用方附加参数，调用方优先
    pub fn merged_extra_params(&self, overrides: Option<&Map<String, Value>>) -> Map<String, Value> {
        let mut merged = self.extra_params.clone();
        if let Some(overrides) = overrides {
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

/// 模型文件中的单个条目
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelEntry {
    pub provider: ProviderKind,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub extra_params: Option<Map<String, Value>>,
    #[serde(default)]
    pub settings: Option<ReviewSettings>,
}

impl ModelEntry {
    pub(crate) fn into_config(self, id: String) -> ModelConfig {
        ModelConfig {
            id,
            provider: self.provider,
            endpoint: self.endpoint,
            model: self.model,
            api_key: expand_env_references(&self.api_key),
            extra_params: self.extra_params.unwrap_or_default(),
            settings: self.settings.unwrap_or_default(),
        }
    }
}

/// 展开 `${VAR}` 形式的环境变量引用，未设置的变量替换为空字符串
pub fn expand_env_references(value: &str) -> String {
    ENV_REFERENCE
        .replace_all(value, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// 模型注册表
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelConfig>,
    default_models: Vec<String>,
}

impl ModelRegistry {
    pub fn new(models: impl IntoIterator<Item = ModelConfig>) -> Self {
        Self {
            models: models
                .into_iter()
                .map(|model| (model.id.clone(), model))
                .collect(),
            default_models: Vec::new(),
        }
    }

    pub fn with_default_models(mut self, default_models: Vec<String>) -> Self {
        self.default_models = default_models;
        self
    }

    pub fn get(&self, id: &str) -> Option<&ModelConfig> {
        self.models.get(id)
    }

    /// 按标识排序遍历
    pub fn iter(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.values()
    }

    /// 调用方未指定模型时使用的模型列表
    pub fn default_models(&self) -> &[String] {
        &self.default_models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
