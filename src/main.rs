use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod config;
mod llm;
mod loader;
mod ops;
mod pipeline;
mod processor;
mod rag;

use pipeline::RunOutcome;

#[derive(Parser)]
#[command(name = "esgrag")]
#[command(version = "1.0")]
#[command(about = "ESG diversity metric extraction from sustainability reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Process every PDF waiting in the input directory (default)
    Run,
    /// Process a single PDF
    Extract { path: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = config::Config::load();
    config.ensure_dirs()?;

    // Full detail goes to the log file; the console stays at info unless
    // RUST_LOG says otherwise.
    let file_appender = tracing_appender::rolling::never(&config.output_dir, "esgrag.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(EnvFilter::new("debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                ),
        )
        .init();

    if config.api_key().is_none() && config.llm_provider == config::LlmProvider::OpenAi {
        tracing::warn!("OPENAI_API_KEY is not set; API calls will fail");
    }

    let taxonomy = config::load_taxonomy(&config.taxonomy_path)?;
    tracing::info!("Loaded taxonomy with {} indicators", taxonomy.len());

    let pipeline = pipeline::DocumentPipeline::new(&config, taxonomy);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let processed = ops::run_batch(&config, &pipeline).await?;
            tracing::info!("Batch finished: {} documents processed", processed);
        }
        Commands::Extract { path } => match pipeline.run(Path::new(&path)).await? {
            RunOutcome::Processed => tracing::info!("Done: {}", path),
            RunOutcome::Skipped => tracing::warn!("No relevant content in {}", path),
        },
    }

    drop(_guard);
    Ok(())
}
