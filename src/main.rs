// Persona - behavioral profiling pipeline and adaptive prompt service
//
// The service ingests flat conversation-message records through a chunked
// job boundary, reconstructs conversations and per-user rolling aggregates,
// derives per-dimension behavioral scores through a classification call, and
// deterministically maps those scores into the system prompt used by the
// live chat boundary.
//
// Architecture:
// - Coordinator: job lifecycle and chunk submission (one writer per job)
// - Builder: conversation/message normalization + aggregate merges
// - Extractor: transcript sampling + provider classification + score rows
// - Composer: pure score-to-directive mapping feeding the chat boundary
// - Store (SQLite/WAL) and the provider client are the only collaborators

mod agent;
mod api;
mod cli;
mod config;
mod error;
mod llm;
mod pipeline;
mod records;
mod scoring;
mod server;
mod startup;
mod store;
mod util;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::{Config, LogRotation};
use pipeline::IngestCoordinator;
use std::path::PathBuf;
use std::sync::Arc;
use store::JobStatus;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config management needs no runtime; handle and exit early
    if let Some(Commands::Config { show, reset, path }) = &cli.command {
        cli::handle_config(*show, *reset, *path);
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();
    let config = Config::from_env();

    // The guard must stay alive for the duration of the program so file
    // logs flush
    let _file_guard = init_tracing(&config);

    // Wire the components; every boundary shares the same store handle
    let store = Arc::new(store::Store::open(&config.db_path)?);
    let llm: Arc<dyn llm::LanguageModel> = Arc::new(llm::HttpLanguageModel::new(&config.llm)?);
    let coordinator = Arc::new(IngestCoordinator::new(
        store.clone(),
        config.ingest.stale_job_window(),
    ));
    let extractor = Arc::new(scoring::ScoreExtractor::new(
        store.clone(),
        llm.clone(),
        config.ingest.sample_limit,
        config.ingest.max_message_chars,
    ));
    let agent = Arc::new(agent::LiveAgent::new(
        agent::PromptComposer::new(store.clone()),
        llm.clone(),
    ));

    match cli.command {
        None => {
            startup::print_startup(&config);
            let state = api::AppState {
                store,
                coordinator,
                extractor,
                agent,
            };
            server::serve(&config, state).await
        }
        Some(Commands::Ingest {
            file,
            job_name,
            chunk_size,
        }) => run_ingest(&config, &coordinator, file, job_name, chunk_size).await,
        Some(Commands::Score { user }) => {
            let scores = extractor.generate_scores(&user).await?;
            println!("{}", serde_json::to_string_pretty(&scores)?);
            Ok(())
        }
        Some(Commands::Prompt { user }) => {
            println!("{}", agent.composer().compose_for_user(&user)?);
            Ok(())
        }
        Some(Commands::Config { .. }) => Ok(()), // handled above
    }
}

/// Initialize tracing/logging
///
/// Precedence: RUST_LOG env var > config file level > default "info".
/// File logging is opt-in: a non-blocking rotating appender layered on top
/// of stdout, JSON-formatted for structured log parsing.
fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_filter = format!("persona={}", config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    if !config.logging.file_enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&config.logging.file_dir) {
        eprintln!(
            "Warning: Could not create log directory {:?}: {}",
            config.logging.file_dir, e
        );
        // Fall back to stdout-only logging
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return None;
    }

    let file_appender = match config.logging.file_rotation {
        LogRotation::Hourly => tracing_appender::rolling::hourly(
            &config.logging.file_dir,
            &config.logging.file_prefix,
        ),
        LogRotation::Daily => tracing_appender::rolling::daily(
            &config.logging.file_dir,
            &config.logging.file_prefix,
        ),
        LogRotation::Never => tracing_appender::rolling::never(
            &config.logging.file_dir,
            &config.logging.file_prefix,
        ),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();
    Some(guard)
}

/// Client-side driver of the chunked job boundary.
///
/// Reads the dataset, creates a job sized to the parsed record count, then
/// submits fixed-size chunks strictly sequentially. The first chunk failure
/// marks the job failed with the cumulative progress and stops the loop;
/// already persisted chunks stay in place.
async fn run_ingest(
    config: &Config,
    coordinator: &IngestCoordinator,
    file: PathBuf,
    job_name: Option<String>,
    chunk_size: Option<usize>,
) -> Result<()> {
    let records = records::read_ndjson(&file)?;
    if records.is_empty() {
        anyhow::bail!("{} contains no records", file.display());
    }

    let filename = job_name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string())
    });
    let chunk_size = chunk_size.unwrap_or(config.ingest.chunk_size).max(1);

    let job = coordinator.create_job(&filename, records.len() as i64)?;
    tracing::info!(
        "Ingesting {} record(s) from {} in chunks of {}",
        records.len(),
        file.display(),
        chunk_size
    );

    let mut processed = 0usize;
    for (index, chunk) in records.chunks(chunk_size).enumerate() {
        match coordinator.submit_chunk(&job.id, chunk).await {
            Ok(outcome) => {
                processed += outcome.processed;
                tracing::info!(
                    "Chunk {}: {} record(s), {} conversation(s), {} user(s) ({}/{} done)",
                    index + 1,
                    outcome.processed,
                    outcome.conversations,
                    outcome.users,
                    processed,
                    records.len()
                );
            }
            Err(e) => {
                coordinator.update_job_status(
                    &job.id,
                    JobStatus::Failed,
                    Some(processed as i64),
                    Some(&e.to_string()),
                )?;
                anyhow::bail!("chunk {} failed: {e}", index + 1);
            }
        }
    }

    let job = coordinator.update_job_status(
        &job.id,
        JobStatus::Completed,
        Some(processed as i64),
        None,
    )?;
    println!(
        "Job {} completed: {}/{} record(s) ingested",
        job.id, job.processed_records, job.total_records
    );
    Ok(())
}
