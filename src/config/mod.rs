use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::infrastructure::error::{Result, ReviewError};

pub mod models;
pub mod settings;

pub use models::{expand_env_references, ModelConfig, ModelRegistry, ProviderKind};
pub use settings::{ExecutionSettings, ReviewSettings};

use models::ModelEntry;

pub const MODELS_PATH_ENV: &str = "EXTERNAL_REVIEW_MODELS";
pub const SKILL_CONFIG_PATH_ENV: &str = "EXTERNAL_REVIEW_CONFIG";
const DEFAULT_MODELS_FILE: &str = "models.yaml";
const DEFAULT_SKILL_CONFIG_FILE: &str = "config.yaml";

/// models.yaml 文件结构
#[derive(Debug, Deserialize)]
struct ModelsFile {
    #[serde(default)]
    models: Option<BTreeMap<String, ModelEntry>>,
    #[serde(default)]
    default_models: Option<Vec<String>>,
    #[serde(default)]
    settings: Option<ReviewSettings>,
}

/// 技能配置文件结构 (config.yaml)
#[derive(Debug, Deserialize)]
struct SkillConfigFile {
    #[serde(default)]
    #[allow(dead_code)]
    version: Option<String>,
    #[serde(default)]
    execution: Option<ReviewSettings>,
}

/// 已加载的审查配置：模型注册表加全局执行设置
#[derive(Debug, Clone, Default)]
pub struct ReviewConfig {
    pub registry: ModelRegistry,
    pub execution: ExecutionSettings,
}

impl ReviewConfig {
    pub fn new(registry: ModelRegistry, execution: ExecutionSettings) -> Self {
        Self { registry, execution }
    }

    /// 从文件加载配置，技能配置文件可选
    pub fn load(models_path: &Path, skill_config_path: Option<&Path>) -> Result<Self> {
        let models_yaml = std::fs::read_to_string(models_path).map_err(|e| {
            ReviewError::config(format!(
                "failed to read models file {}: {}",
                models_path.display(),
                e
            ))
        })?;

        let skill_yaml = match skill_config_path {
            Some(path) if path.exists() => Some(std::fs::read_to_string(path).map_err(|e| {
                ReviewError::config(format!(
                    "failed to read skill config {}: {}",
                    path.display(),
                    e
                ))
            })?),
            Some(path) => {
                tracing::debug!("Skill config {} not found, using defaults", path.display());
                None
            }
            None => None,
        };

        let config = Self::from_yaml(&models_yaml, skill_yaml.as_deref())?;
        tracing::info!(
            models = config.registry.len(),
            path = %models_path.display(),
            "Loaded model registry"
        );
        Ok(config)
    }

    /// 从 YAML 文本解析配置
    ///
    /// 设置的优先级（从低到高）：内置默认值、models.yaml 的 `settings`、
    /// 技能配置的 `execution`。
    pub fn from_yaml(models_yaml: &str, skill_yaml: Option<&str>) -> Result<Self> {
        let models_file: ModelsFile = serde_yaml::from_str(models_yaml)?;

        let mut execution = ExecutionSettings::default();
        if let Some(settings) = &models_file.settings {
            execution = execution.apply(settings);
        }

        if let Some(skill_yaml) = skill_yaml {
            let skill: SkillConfigFile = serde_yaml::from_str(skill_yaml)?;
            if let Some(settings) = &skill.execution {
                execution = execution.apply(settings);
            }
        }

        let models = models_file
            .models
            .unwrap_or_default()
            .into_iter()
            .map(|(id, entry)| entry.into_config(id));

        let registry = ModelRegistry::new(models)
            .with_default_models(models_file.default_models.unwrap_or_default());

        let config = Self::new(registry, execution);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.timeout_seconds == 0 {
            return Err(ReviewError::validation(
                "timeout_seconds must be greater than zero",
                Some("timeout_seconds".to_string()),
            ));
        }
        if self.execution.backoff_initial_ms == 0 {
            return Err(ReviewError::validation(
                "backoff_initial_ms must be greater than zero",
                Some("backoff_initial_ms".to_string()),
            ));
        }

        for model in self.registry.iter() {
            if !model.is_available() {
                tracing::warn!(
                    model = %model.id,
                    "Model configuration is incomplete (endpoint, model name or API key missing)"
                );
            }
        }
        Ok(())
    }
}

/// 配置文件路径
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigPaths {
    pub models: PathBuf,
    pub skill_config: PathBuf,
}

impl ConfigPaths {
    /// 命令行参数优先，其次是环境变量，最后使用当前目录下的默认文件名
    pub fn resolve(models: Option<PathBuf>, skill_config: Option<PathBuf>) -> Self {
        let models = models
            .or_else(|| env::var(MODELS_PATH_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_FILE));
        let skill_config = skill_config
            .or_else(|| env::var(SKILL_CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SKILL_CONFIG_FILE));

        Self { models, skill_config }
    }
}

/// 加载 .env 文件，已存在的环境变量不会被覆盖
pub fn load_env_files() {
    // 尝试从用户主目录加载
    if let Ok(home) = env::var("HOME") {
        let user_env_path = PathBuf::from(home).join(".external-review").join(".env");
        if user_env_path.exists() {
            dotenvy::from_path(user_env_path).ok();
        }
    }

    // 尝试从当前目录加载
    dotenvy::dotenv().ok();
}
