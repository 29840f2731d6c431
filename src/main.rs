use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use external_review::cli::args::{Args, Command, ReviewArgs};
use external_review::cli::output;
use external_review::config::{load_env_files, ConfigPaths, ReviewConfig};
use external_review::infrastructure::logging::{setup_logging, LoggingConfig};
use external_review::review::ReviewOrchestrator;

fn load_config(args: &Args) -> anyhow::Result<ReviewConfig> {
    let paths = ConfigPaths::resolve(args.models_file.clone(), args.config_file.clone());
    tracing::debug!(
        models = %paths.models.display(),
        skill_config = %paths.skill_config.display(),
        "Loading configuration"
    );

    let config = ReviewConfig::load(&paths.models, Some(&paths.skill_config))
        .with_context(|| format!("failed to load configuration from {}", paths.models.display()))?;
    Ok(config)
}

async fn handle_review(orchestrator: &ReviewOrchestrator, review: &ReviewArgs) -> anyhow::Result<ExitCode> {
    let prompt = review.resolve_prompt()?;

    let result = orchestrator
        .review(
            &review.models,
            &review.artifact,
            &prompt,
            Some(review.settings()),
            review.extra_params(),
        )
        .await;

    let rendered = output::render_review(&result, review.format)?;
    output::emit(&rendered, review.output.as_deref())?;

    Ok(ExitCode::from(output::exit_code(&result)))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    setup_logging(LoggingConfig::for_cli(args.verbose))?;

    // API key 中的 ${VAR} 在加载配置时展开，.env 需要先加载
    load_env_files();

    let config = load_config(&args)?;
    let orchestrator = ReviewOrchestrator::new(config);

    match &args.command {
        Command::ListModels { format } => {
            let rendered = output::render_models(&orchestrator.list_models(), *format)?;
            output::emit(&rendered, None)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Review(review) => handle_review(&orchestrator, review).await,
    }
}
