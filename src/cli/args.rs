use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};

use crate::config::ReviewSettings;

#[derive(Parser, Debug)]
#[command(
    name = "external-review",
    version,
    about = "把文档发给多个外部大模型做独立审查，并汇总每个模型的结果",
    long_about = "external-review 读取模型注册表 (models.yaml) 和可选的执行配置 (config.yaml)，把同一个工件和提示词并发发给多个模型，每个模型独立重试和超时，最后输出汇总的 JSON 或文本结果。"
)]
pub struct Args {
    /// 模型注册表文件路径（默认读取 EXTERNAL_REVIEW_MODELS 或 ./models.yaml）
    #[arg(long = "models", id = "models_file", global = true, value_name = "PATH")]
    pub models_file: Option<PathBuf>,

    /// 执行配置文件路径（默认读取 EXTERNAL_REVIEW_CONFIG 或 ./config.yaml）
    #[arg(long = "config", id = "config_file", global = true, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 列出已配置的模型及其可用性
    ListModels {
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// 对工件执行多模型审查
    Review(ReviewArgs),
}

#[derive(clap::Args, Debug)]
pub struct ReviewArgs {
    /// 要调用的模型标识，可重复；不指定时使用 default_models
    #[arg(short, long = "model", id = "model", value_name = "ID")]
    pub models: Vec<String>,

    /// 待审查的工件路径
    #[arg(short, long, value_name = "PATH")]
    pub artifact: String,

    /// 审查提示词
    #[arg(short, long, conflicts_with = "prompt_file", required_unless_present = "prompt_file")]
    pub prompt: Option<String>,

    /// 从文件读取审查提示词
    #[arg(long, value_name = "PATH")]
    pub prompt_file: Option<PathBuf>,

    /// 每个模型的重试次数
    #[arg(long, value_name = "N")]
    pub retry_attempts: Option<u32>,

    /// 单次请求超时（秒）
    #[arg(long, value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// 逐个调用模型而不是并发
    #[arg(long, default_value_t = false)]
    pub sequential: bool,

    /// 附加请求参数，例如 --param top_k=50，值能解析为 JSON 时按 JSON 处理
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// 把结果写入文件而不是标准输出
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
}

impl ReviewArgs {
    /// 读取提示词，`--prompt-file` 的内容去掉首尾空白
    pub fn resolve_prompt(&self) -> anyhow::Result<String> {
        let prompt = match (&self.prompt, &self.prompt_file) {
            (Some(prompt), _) => prompt.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read prompt file {}", path.display()))?
                .trim()
                .to_string(),
            (None, None) => return Err(anyhow!("either --prompt or --prompt-file is required")),
        };

        if prompt.trim().is_empty() {
            return Err(anyhow!("prompt must not be empty"));
        }
        Ok(prompt)
    }

    /// 命令行上的调用级设置，只包含显式给出的字段
    pub fn settings(&self) -> ReviewSettings {
        let mut settings = ReviewSettings::default();
        if let Some(retry_attempts) = self.retry_attempts {
            settings = settings.with_retry_attempts(retry_attempts);
        }
        if let Some(timeout_seconds) = self.timeout_seconds {
            settings = settings.with_timeout_seconds(timeout_seconds);
        }
        if self.sequential {
            settings = settings.with_parallel(false);
        }
        settings
    }

    pub fn extra_params(&self) -> Option<Map<String, Value>> {
        if self.params.is_empty() {
            return None;
        }
        Some(self.params.iter().cloned().collect())
    }
}

/// 解析 `KEY=VALUE`，值优先按 JSON 解析，失败时作为字符串
pub fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter name is empty in '{}'", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
