//! Asynchronous generation task orchestration.
//!
//! The generation providers only answer to polling, so every submitted
//! job needs a tracked lifecycle: submit with bounded retries, poll on
//! a fixed cadence under a hard deadline, and reconcile the terminal
//! outcome into durable storage. Batches admit their tasks strictly one
//! at a time because downstream tasks routinely consume the previous
//! task's output.
//!
//! - [`Orchestrator`] -- facade; spawns one sequencer per batch.
//! - [`BatchSequencer`](sequencer::BatchSequencer) -- sequential
//!   admission, dependency resolution, cursor bookkeeping.
//! - [`StatusPoller`](poller::StatusPoller) -- per-task poll loop and
//!   timeout clock.
//! - [`run_with_retry`](retry::run_with_retry) -- the retry governor.
//! - [`PersistenceSync`](sync::PersistenceSync) -- exactly-once durable
//!   writes and transient-state eviction.
//! - [`TaskRegistry`](registry::TaskRegistry) -- live records plus the
//!   per-task cancellation tokens that stand in for timers.

pub mod error;
pub mod manager;
pub mod poller;
pub mod registry;
pub mod retry;
pub mod sequencer;
pub mod sync;

pub use error::OrchestratorError;
pub use manager::{BatchHandle, Orchestrator};
pub use registry::TaskRegistry;
pub use retry::{RetryPolicy, RetryOutcome};
pub use sequencer::ClientSet;
pub use sync::PersistenceSync;
