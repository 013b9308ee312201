//! # paperbase-cli
//!
//! Nightly batch entry point. Collects new documents, runs the enrichment
//! pipeline, and reports the run summary. Exit codes: 0 for a completed run
//! (per-document failures are counted, not fatal), 1 for configuration
//! errors, 2 for unrecoverable system errors.

use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use paperbase::attribution::AttributionTracker;
use paperbase::config::PipelineConfig;
use paperbase::errors::StoreError;
use paperbase::ingest::{DocumentSource, LocalFolderSource, SourceDocument};
use paperbase::notestore::client::NotionPromptSource;
use paperbase::notestore::{NoteStore, NotionClient};
use paperbase::pipeline::{CancellationFlag, Pipeline, RunStats};
use paperbase::prompt_store::PromptStore;
use paperbase::providers::ai::{create_provider, LmClient};
use paperbase::retry::RetryPolicy;

#[derive(Parser, Debug)]
#[command(name = "paperbase", version, about = "Batch content-enrichment pipeline")]
struct Cli {
    /// Enable the local download-folder ingestion phase.
    #[arg(long)]
    process_local: bool,

    /// Run only ingestion; leave new pages as Inbox.
    #[arg(long)]
    skip_enrichment: bool,

    /// Restrict processing to the listed source identifiers.
    #[arg(long, value_delimiter = ',')]
    drive_file_ids: Option<Vec<String>>,

    /// Plan and log all actions but issue no writes.
    #[arg(long)]
    dry_run: bool,
}

/// Error classes mapped to exit codes.
enum AppError {
    Config(anyhow::Error),
    System(anyhow::Error),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let subscriber = fmt::Subscriber::builder()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install the log subscriber");
        std::process::exit(2);
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(stats) => {
            println!(
                "✅ Run complete: {} scanned, {} skipped (duplicate), {} enriched, {} failed, {} inbox, {} not attempted",
                stats.scanned,
                stats.skipped_duplicate,
                stats.enriched,
                stats.failed,
                stats.inbox_created,
                stats.not_attempted
            );
            std::process::exit(0);
        }
        Err(AppError::Config(e)) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
        Err(AppError::System(e)) => {
            eprintln!("Unrecoverable error: {e}");
            std::process::exit(2);
        }
    }
}

async fn run(cli: Cli) -> Result<RunStats, AppError> {
    let mut config = PipelineConfig::from_env().map_err(|e| AppError::Config(e.into()))?;
    config.dry_run = cli.dry_run;
    config.skip_enrichment = cli.skip_enrichment;

    // Destination store, with the startup schema check.
    let store = Arc::new(
        NotionClient::new(
            &config.notion_token,
            &config.notion_version,
            &config.sources_db_id,
            config.rate_limit_delay,
            config.store_timeout,
        )
        .map_err(|e| AppError::Config(anyhow!(e)))?,
    );
    match store.verify_schema().await {
        Ok(()) => info!("destination schema verified"),
        Err(e @ StoreError::SchemaMismatch(_)) => return Err(AppError::Config(anyhow!(e))),
        Err(e) => return Err(AppError::System(anyhow!(e))),
    }

    // Prompt store: remote rows over the local file over built-ins.
    let mut prompts = PromptStore::builtin_only();
    if let Some(path) = &config.local_prompts_path {
        prompts = prompts
            .with_local_file(path)
            .map_err(|e| AppError::Config(anyhow!(e)))?;
    }
    if let Some(prompts_db) = &config.prompts_db_id {
        prompts = prompts.with_remote(Box::new(NotionPromptSource::new(
            store.clone(),
            prompts_db,
        )));
    }
    let prompts = Arc::new(prompts);
    if let Err(e) = prompts.refresh().await {
        // Local defaults keep the run alive when the remote store is down.
        warn!("prompt refresh failed, continuing with local prompts: {e}");
    }

    let provider = create_provider(&config).map_err(|e| AppError::Config(e.into()))?;
    let lm = Arc::new(LmClient::new(
        provider,
        RetryPolicy::provider(),
        config.provider_delay,
    ));

    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing the current document");
                cancel.cancel();
            }
        });
    }

    let documents = collect_documents(&cli, &config).await?;
    if documents.is_empty() {
        info!("no new documents to process");
    }

    let tracker = Arc::new(AttributionTracker::new());
    let pipeline = Pipeline::new(
        config,
        store as Arc<dyn NoteStore>,
        prompts,
        lm,
        tracker,
        cancel,
    );
    Ok(pipeline.run(documents).await)
}

/// Gathers documents from the enabled sources, applying the id filter.
async fn collect_documents(
    cli: &Cli,
    config: &PipelineConfig,
) -> Result<Vec<SourceDocument>, AppError> {
    let mut documents = Vec::new();

    if cli.process_local {
        let source = LocalFolderSource::new(config.download_dir.clone());
        match source.collect().await {
            Ok(mut docs) => {
                info!(count = docs.len(), "collected local documents");
                documents.append(&mut docs);
            }
            Err(e) => {
                error!("local ingestion failed: {e}");
                return Err(AppError::System(anyhow!(e)));
            }
        }
    }

    if let Some(ids) = &cli.drive_file_ids {
        documents.retain(|doc| {
            ids.iter().any(|id| {
                doc.fingerprint == *id
                    || doc.display_name.contains(id.as_str())
                    || doc
                        .origin
                        .drive_url()
                        .map(|url| url.contains(id.as_str()))
                        .unwrap_or(false)
            })
        });
        info!(count = documents.len(), "restricted to requested file ids");
    }

    Ok(documents)
}
