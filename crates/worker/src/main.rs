//! Batch runner.
//!
//! Reads a batch description from a JSON file, runs it through the
//! orchestrator against the configured provider endpoints, and exits
//! non-zero if nothing succeeded. Results go to Postgres when
//! `DATABASE_URL` is set, otherwise they stay in memory for the run.

use std::sync::Arc;

use serde::Deserialize;
use storyforge_core::batch::{BatchSpec, TaskSeed};
use storyforge_core::config::OrchestratorConfig;
use storyforge_events::TaskEvent;
use storyforge_orchestrator::Orchestrator;
use storyforge_providers::{ImageClient, JobClient, SpeechClient, TextClient, VideoClient};
use storyforge_store::{MemoryStore, PgResultStore, ResultStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// On-disk batch description.
///
/// ```json
/// {
///   "batch_ref": "project-7/panels",
///   "tasks": [
///     {"kind": "image", "parameters": {"prompt": "castle at dawn"}},
///     {"kind": "video", "parameters": {"motion": "pan"}, "depends_on_previous": true}
///   ]
/// }
/// ```
#[derive(Debug, Deserialize)]
struct BatchFile {
    batch_ref: String,
    tasks: Vec<TaskSeed>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "storyforge_worker=debug,storyforge_orchestrator=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = OrchestratorConfig::from_env();
    config.validate().expect("Invalid orchestrator configuration");
    tracing::info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        max_retries = config.max_retries,
        "Loaded orchestrator configuration",
    );

    // --- Batch file ---
    let path = std::env::args()
        .nth(1)
        .expect("Usage: storyforge-worker <batch.json>");
    let raw = std::fs::read_to_string(&path).expect("Failed to read batch file");
    let batch: BatchFile = serde_json::from_str(&raw).expect("Failed to parse batch file");
    tracing::info!(
        batch_ref = %batch.batch_ref,
        task_count = batch.tasks.len(),
        "Loaded batch description",
    );

    // --- Result store ---
    let store: Arc<dyn ResultStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = storyforge_store::create_pool(&url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Using Postgres result store");
            Arc::new(PgResultStore::new(pool))
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set, keeping results in memory");
            Arc::new(MemoryStore::new())
        }
    };

    // --- Orchestrator + providers ---
    let mut orchestrator =
        Orchestrator::new(config, store).expect("Invalid orchestrator configuration");
    let http = reqwest::Client::new();
    if let Ok(url) = std::env::var("IMAGE_API_URL") {
        orchestrator
            .register_client(Arc::new(ImageClient::with_client(http.clone(), url))
                as Arc<dyn JobClient>);
    }
    if let Ok(url) = std::env::var("VIDEO_API_URL") {
        orchestrator
            .register_client(Arc::new(VideoClient::with_client(http.clone(), url))
                as Arc<dyn JobClient>);
    }
    if let Ok(url) = std::env::var("TEXT_API_URL") {
        orchestrator.register_client(
            Arc::new(TextClient::with_client(http.clone(), url)) as Arc<dyn JobClient>
        );
    }
    if let Ok(url) = std::env::var("SPEECH_API_URL") {
        orchestrator
            .register_client(Arc::new(SpeechClient::with_client(http.clone(), url))
                as Arc<dyn JobClient>);
    }

    // --- Progress logging ---
    let mut rx = orchestrator.subscribe();
    let event_logger = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                TaskEvent::TaskAdmitted {
                    task_id,
                    sequence_index,
                    ..
                } => tracing::info!(%task_id, sequence_index, "Task admitted"),
                TaskEvent::TaskProgress {
                    task_id, progress, ..
                } => tracing::info!(%task_id, progress, "Progress"),
                TaskEvent::TaskRetrying {
                    task_id, message, ..
                } => tracing::warn!(%task_id, %message, "Retrying"),
                TaskEvent::TaskTerminal {
                    task_id,
                    status,
                    error,
                    ..
                } => tracing::info!(
                    %task_id,
                    status = %status,
                    error = error.as_deref().unwrap_or(""),
                    "Task settled",
                ),
                TaskEvent::BatchFinished {
                    status, summary, ..
                } => tracing::info!(status = status.as_str(), %summary, "Batch finished"),
            }
        }
    });

    // --- Run the batch ---
    let handle = orchestrator
        .start_batch(batch.batch_ref.clone(), BatchSpec { tasks: batch.tasks })
        .expect("Invalid batch description");
    handle.join().await;

    let summary = handle.summary();
    let records = orchestrator
        .load_completed(&batch.batch_ref)
        .await
        .expect("Failed to load persisted results");
    for record in &records {
        tracing::info!(
            sequence_index = record.sequence_index,
            kind = record.kind.as_str(),
            "Stored result",
        );
    }

    orchestrator.shutdown().await;
    event_logger.abort();

    tracing::info!(%summary, "Run complete");
    if records.is_empty() {
        std::process::exit(1);
    }
}
