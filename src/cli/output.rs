use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use super::args::OutputFormat;
use crate::review::{AggregateResult, ModelListing};

/// 结果的退出码：批次没有错误并且至少一个模型成功时为 0
pub fn exit_code(result: &AggregateResult) -> u8 {
    if !result.has_error() && result.success_count() > 0 {
        0
    } else {
        1
    }
}

pub fn render_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize output")
}

pub fn render_review(result: &AggregateResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => render_json(result),
        OutputFormat::Text => Ok(format_review_as_text(result)),
    }
}

pub fn render_models(listing: &ModelListing, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => render_json(listing),
        OutputFormat::Text => Ok(format_models_as_text(listing)),
    }
}

/// 写入文件或标准输出
pub fn emit(rendered: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => std::fs::write(path, format!("{}\n", rendered))
            .with_context(|| format!("failed to write output to {}", path.display())),
        None => {
            println!("{}", rendered);
            Ok(())
        }
    }
}

fn format_review_as_text(result: &AggregateResult) -> String {
    let mut out = String::new();

    if let Some(error) = &result.error {
        let _ = writeln!(out, "Review failed: {}", error);
        return out;
    }

    let mode = if result.parallel { "parallel" } else { "sequential" };
    let _ = writeln!(
        out,
        "Reviewed by {} model(s) ({}), {} succeeded, {} failed, {} ms total",
        result.reviews.len(),
        mode,
        result.success_count(),
        result.failure_count(),
        result.total_latency_ms
    );

    for review in &result.reviews {
        let response = &review.response;
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", review.model);
        let _ = write!(
            out,
            "status: {}, latency: {} ms, retries: {}",
            if response.is_success() { "success" } else { "error" },
            response.latency_ms,
            response.retries_attempted
        );
        if let Some(tokens) = &response.tokens_used {
            let _ = write!(out, ", tokens: {} in / {} out", tokens.input, tokens.output);
        }
        let _ = writeln!(out);
        let _ = writeln!(out);

        match (&response.response, &response.error) {
            (Some(text), _) => {
                let _ = writeln!(out, "{}", text.trim_end());
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "Error: {}", error);
            }
            (None, None) => {}
        }
    }

    out
}

fn format_models_as_text(listing: &ModelListing) -> String {
    if listing.models.is_empty() {
        return "No models configured".to_string();
    }

    let id_width = listing.models.iter().map(|m| m.id.len()).max().unwrap_or(0).max(2);
    let provider_width = listing
        .models
        .iter()
        .map(|m| m.provider.as_str().len())
        .max()
        .unwrap_or(0)
        .max(8);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<provider_width$}  {:<9}  MODEL",
        "ID", "PROVIDER", "AVAILABLE"
    );
    for model in &listing.models {
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<provider_width$}  {:<9}  {}",
            model.id,
            model.provider.as_str(),
            if model.available { "yes" } else { "no" },
            model.model
        );
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::review::{aggregate, ModelInfo, ModelReview, ReviewResponse, TokensUsed};
    use std::time::Duration;

    fn sample_result() -> AggregateResult {
        aggregate(
            vec![
                ModelReview::new(
                    "model-a",
                    ReviewResponse::success(
                        "## Review\nLooks good.",
                        Some(TokensUsed { input: 100, output: 50 }),
                        Duration::from_millis(1200),
                        0,
                    ),
                ),
                ModelReview::new(
                    "model-b",
                    ReviewResponse::failure("HTTP 401: Unauthorized", Duration::from_millis(80), 0),
                ),
            ],
            true,
            Duration::from_millis(1250),
        )
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&sample_result()), 0);
        assert_eq!(exit_code(&AggregateResult::failed("Artifact not found: x", true, Duration::ZERO)), 1);

        let all_failed = aggregate(
            vec![ModelReview::failed("model-x", "Unknown model: model-x")],
            true,
            Duration::ZERO,
        );
        assert_eq!(exit_code(&all_failed), 1);
    }

    #[test]
    fn test_render_review_json_shape() {
        let json = render_review(&sample_result(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["models_called"], serde_json::json!(["model-a", "model-b"]));
        assert_eq!(value["reviews"][0]["model"], "model-a");
        assert_eq!(value["reviews"][0]["status"], "success");
        assert_eq!(value["reviews"][0]["tokens_used"]["input"], 100);
        assert_eq!(value["reviews"][1]["status"], "error");
        assert!(value["reviews"][1]["error"].as_str().unwrap().contains("401"));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_render_review_text() {
        let text = render_review(&sample_result(), OutputFormat::Text).unwrap();
        assert!(text.contains("1 succeeded, 1 failed"));
        assert!(text.contains("## model-a"));
        assert!(text.contains("tokens: 100 in / 50 out"));
        assert!(text.contains("Error: HTTP 401: Unauthorized"));

        let failed = AggregateResult::failed("No models requested", true, Duration::ZERO);
        assert_eq!(
            render_review(&failed, OutputFormat::Text).unwrap().trim(),
            "Review failed: No models requested"
        );
    }

    #[test]
    fn test_render_models_text() {
        let listing = ModelListing {
            models: vec![
                ModelInfo {
                    id: "gemini-flash".into(),
                    provider: ProviderKind::Google,
                    model: "gemini-2.0-flash".into(),
                    available: true,
                },
                ModelInfo {
                    id: "kimi".into(),
                    provider: ProviderKind::OpenAiCompat,
                    model: "kimi-k2".into(),
                    available: false,
                },
            ],
        };

        let text = render_models(&listing, OutputFormat::Text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].contains("gemini-2.0-flash") && lines[1].contains("yes"));
        assert!(lines[2].contains("openai_compat") && lines[2].contains("no"));

        let empty = ModelListing { models: vec![] };
        assert_eq!(render_models(&empty, OutputFormat::Text).unwrap(), "No models configured");
    }

    #[test]
    fn test_emit_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        emit("{}", Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}\n");
    }
}
