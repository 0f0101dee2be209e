//! The orchestrator facade.
//!
//! [`Orchestrator`] wires the registry, event bus, result store, and
//! job clients together, and spawns one [`BatchSequencer`] task per
//! started batch. Batches are independent: each sequencer owns its own
//! cursor and cancellation token (a child of the orchestrator's master
//! token), so concurrent batches never constrain each other.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use storyforge_core::batch::{validate_batch_spec, BatchSpec, BatchStatus};
use storyforge_core::config::OrchestratorConfig;
use storyforge_core::error::CoreError;
use storyforge_core::task::{TaskOutput, TaskRecord, TaskStatus};
use storyforge_core::types::{BatchId, TaskId};
use storyforge_events::{EventBus, TaskEvent};
use storyforge_providers::JobClient;
use storyforge_store::{GenerationRecord, ResultStore};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;
use crate::registry::TaskRegistry;
use crate::sequencer::{BatchSequencer, BatchState, ClientSet};
use crate::sync::PersistenceSync;

/// How long shutdown waits for each batch to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// BatchHandle
// ---------------------------------------------------------------------------

/// Handle to a running (or finished) batch.
///
/// Cheap to share; cancellation and status queries go through here.
pub struct BatchHandle {
    batch_id: BatchId,
    batch_ref: String,
    task_ids: Vec<TaskId>,
    state: Arc<RwLock<BatchState>>,
    cancel: CancellationToken,
    join: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BatchHandle {
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn batch_ref(&self) -> &str {
        &self.batch_ref
    }

    /// Task ids in sequence order.
    pub fn task_ids(&self) -> &[TaskId] {
        &self.task_ids
    }

    /// Stop the batch: no further admissions, and the in-flight task's
    /// poll loop is torn down. Already-terminal results are untouched.
    /// Safe to call any number of times.
    pub fn cancel(&self) {
        self.state.write().unwrap().cancelled = true;
        self.cancel.cancel();
    }

    /// Derived batch status.
    pub fn status(&self) -> BatchStatus {
        self.state.read().unwrap().derived_status()
    }

    /// Per-task statuses in sequence order. Tasks interrupted by
    /// cancellation stay non-terminal -- they are surfaced as incomplete
    /// rather than silently resolved.
    pub fn task_statuses(&self) -> Vec<TaskStatus> {
        self.state.read().unwrap().statuses.clone()
    }

    /// Index of the currently admitted task, if any.
    pub fn cursor(&self) -> Option<usize> {
        self.state.read().unwrap().cursor
    }

    /// Partial-completion summary, e.g. `"3 of 5 succeeded"`.
    pub fn summary(&self) -> String {
        storyforge_core::batch::completion_summary(&self.state.read().unwrap().statuses)
    }

    /// Wait for the sequencer task to exit.
    pub async fn join(&self) {
        let handle = self.join.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Entry point for running generation batches.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<TaskRegistry>,
    bus: Arc<EventBus>,
    store: Arc<dyn ResultStore>,
    clients: ClientSet,
    cancel: CancellationToken,
    batches: Mutex<Vec<Arc<BatchHandle>>>,
}

impl Orchestrator {
    /// Create an orchestrator over the given result store.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn ResultStore>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: Arc::new(TaskRegistry::new()),
            bus: Arc::new(EventBus::default()),
            store,
            clients: ClientSet::new(),
            cancel: CancellationToken::new(),
            batches: Mutex::new(Vec::new()),
        })
    }

    /// Register a job client; its [`JobClient::kind`] decides which
    /// tasks it serves.
    pub fn register_client(&mut self, client: Arc<dyn JobClient>) {
        self.clients.insert(client);
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.bus.subscribe()
    }

    /// Snapshot one live task record. Finalized tasks are gone from
    /// transient tracking; their outcomes live in the result store.
    pub fn task(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.registry.get(task_id)
    }

    /// The shared task registry (observability and tests).
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Validate a batch spec, create its task records in `Pending`, and
    /// spawn a sequencer to run them in order.
    ///
    /// `batch_ref` names the owning application context (e.g.
    /// `"project-7/panels"`) and keys the persisted records.
    pub fn start_batch(
        &self,
        batch_ref: impl Into<String>,
        spec: BatchSpec,
    ) -> Result<Arc<BatchHandle>, OrchestratorError> {
        validate_batch_spec(&spec)?;
        let batch_ref = batch_ref.into();
        let batch_id = uuid::Uuid::new_v4();

        let mut task_ids = Vec::with_capacity(spec.tasks.len());
        let mut previous: Option<TaskId> = None;
        for (index, seed) in spec.tasks.into_iter().enumerate() {
            let mut record = TaskRecord::new(seed.kind, seed.parameters, index);
            if seed.depends_on_previous {
                // Validated: only the first task can lack a predecessor.
                if let Some(previous) = previous {
                    record = record.with_dependency(previous);
                }
            }
            previous = Some(record.id);
            task_ids.push(record.id);
            self.registry.insert(record);
        }

        let state = Arc::new(RwLock::new(BatchState::new(task_ids.len())));
        let cancel = self.cancel.child_token();

        let sequencer = BatchSequencer {
            batch_id,
            batch_ref: batch_ref.clone(),
            task_ids: task_ids.clone(),
            clients: Arc::new(self.clients.clone()),
            registry: Arc::clone(&self.registry),
            bus: Arc::clone(&self.bus),
            sync: PersistenceSync::new(
                Arc::clone(&self.store),
                Arc::clone(&self.registry),
                Arc::clone(&self.bus),
            ),
            config: self.config.clone(),
            cancel: cancel.clone(),
            state: Arc::clone(&state),
        };

        let join = tokio::spawn(sequencer.run());

        let handle = Arc::new(BatchHandle {
            batch_id,
            batch_ref,
            task_ids,
            state,
            cancel,
            join: Mutex::new(Some(join)),
        });
        self.batches.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle)
    }

    /// Reload a batch context's persisted results, in sequence order.
    /// Nothing is re-generated; mid-flight work lost to a restart stays
    /// lost until the user resubmits it.
    pub async fn load_completed(
        &self,
        batch_ref: &str,
    ) -> Result<Vec<GenerationRecord>, OrchestratorError> {
        Ok(self.store.list_by_batch(batch_ref).await?)
    }

    /// Replace a persisted record's output in place (e.g. after the
    /// user regenerates a single item).
    pub async fn replace_output(
        &self,
        task_id: TaskId,
        output: &TaskOutput,
    ) -> Result<(), OrchestratorError> {
        Ok(self.store.update_record(task_id, output).await?)
    }

    /// Remove a persisted record the user explicitly discarded.
    pub async fn discard_record(&self, task_id: TaskId) -> Result<(), OrchestratorError> {
        Ok(self.store.delete_record(task_id).await?)
    }

    /// Cancel every batch and wait briefly for sequencers to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down orchestrator");
        self.cancel.cancel();

        let handles: Vec<Arc<BatchHandle>> = self.batches.lock().unwrap().drain(..).collect();
        for handle in handles {
            {
                // Batches that already settled keep their status; only
                // still-running ones are marked cancelled.
                let mut state = handle.state.write().unwrap();
                if state.derived_status() == BatchStatus::Running {
                    state.cancelled = true;
                }
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, handle.join()).await.is_err() {
                tracing::warn!(
                    batch_id = %handle.batch_id(),
                    "Batch did not wind down within the shutdown grace period",
                );
            }
        }

        tracing::info!("Orchestrator shut down complete");
    }
}
