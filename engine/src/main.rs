// Quill editorial pipeline
// Main entry point for the quill binary

use clap::Parser;
use quill_engine::analytics::Engagement;
use quill_engine::cli::{Cli, Command};
use quill_engine::config::{Config, Overrides};
use quill_engine::handlers::{
    handle_comments, handle_history, handle_record, handle_refresh, handle_rules, handle_run,
    handle_stats, OutputFormat,
};
use quill_engine::telemetry::init_telemetry_with_level;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let mut config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    if let Some(level) = &cli.log {
        config.core.log_level = level.to_lowercase();
    }

    if let Command::Run {
        persona,
        max_retries,
        no_image,
        ..
    } = &cli.command
    {
        config.apply_overrides(&Overrides {
            persona: *persona,
            max_retries: *max_retries,
            no_image: *no_image,
        })?;
    }

    // RUST_LOG still takes priority over the configured level
    init_telemetry_with_level(&config.core.log_level);

    tracing::debug!(
        "Quill v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    match cli.command {
        Command::Run { topic, .. } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, cancelling run");
                    on_signal.cancel();
                }
            });

            let published = handle_run(&config, topic, format, cancel).await?;
            if !published {
                std::process::exit(1);
            }
            Ok(())
        }

        Command::Stats => handle_stats(&config, format),

        Command::History { limit } => handle_history(limit, &config, format),

        Command::Rules => handle_rules(&config, format),

        Command::Comments => handle_comments(&config, format),

        Command::Record {
            urn,
            views,
            likes,
            comments,
        } => handle_record(
            &urn,
            Engagement {
                views,
                likes,
                comments,
            },
            &config,
            format,
        ),

        Command::Refresh => handle_refresh(&config, format).await,
    }
}
