//! Scripted [`JobClient`] for driving batch scenarios without a network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use storyforge_core::task::{TaskKind, TaskOutput};
use storyforge_providers::{JobClient, PollResponse, ProviderError, RemoteStatus};

/// Scripted outcome of one `submit` call.
pub enum SubmitStep {
    /// Succeed with a generated sequential job id.
    Ok,
    /// Fail with a retryable error.
    Transient,
    /// Fail with a permanent content rejection.
    Rejected(String),
}

/// Scripted outcome of one `poll` call.
#[derive(Clone)]
pub enum PollStep {
    Queued,
    Running(f64),
    Succeeded(TaskOutput),
    Failed(String),
    Transient,
}

/// A provider whose answers are scripted per call.
///
/// Submission steps are consumed from a queue (an empty queue means
/// every submit succeeds). Each successful submit assigns the next
/// queued poll plan to the new job; a job with an exhausted (or absent)
/// plan keeps answering "queued", which is how scripts model a job that
/// never finishes. The client also tracks how many jobs were ever in
/// flight at once, which must never exceed one within a batch.
pub struct ScriptedClient {
    kind: TaskKind,
    submit_steps: Mutex<VecDeque<SubmitStep>>,
    job_plans: Mutex<VecDeque<Vec<PollStep>>>,
    poll_scripts: Mutex<HashMap<String, VecDeque<PollStep>>>,
    in_flight: Mutex<HashSet<String>>,
    next_job: AtomicUsize,
    submit_calls: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            submit_steps: Mutex::new(VecDeque::new()),
            job_plans: Mutex::new(VecDeque::new()),
            poll_scripts: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            next_job: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Queue an outcome for the next `submit` call.
    pub fn queue_submit(&self, step: SubmitStep) {
        self.submit_steps.lock().unwrap().push_back(step);
    }

    /// Queue the poll plan handed to the next successfully submitted job.
    pub fn queue_job(&self, polls: Vec<PollStep>) {
        self.job_plans.lock().unwrap().push_back(polls);
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Highest number of jobs simultaneously in flight.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobClient for ScriptedClient {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn submit(&self, _parameters: &serde_json::Value) -> Result<String, ProviderError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);

        let step = self
            .submit_steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitStep::Ok);

        match step {
            SubmitStep::Ok => {
                let job_id = format!("job-{}", self.next_job.fetch_add(1, Ordering::SeqCst));
                let plan = self
                    .job_plans
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_default();
                self.poll_scripts
                    .lock()
                    .unwrap()
                    .insert(job_id.clone(), plan.into());

                let mut in_flight = self.in_flight.lock().unwrap();
                in_flight.insert(job_id.clone());
                self.max_in_flight
                    .fetch_max(in_flight.len(), Ordering::SeqCst);

                Ok(job_id)
            }
            SubmitStep::Transient => Err(ProviderError::Api {
                status: 503,
                body: "service unavailable".into(),
            }),
            SubmitStep::Rejected(reason) => Err(ProviderError::Rejected(reason)),
        }
    }

    async fn poll(&self, external_job_id: &str) -> Result<PollResponse, ProviderError> {
        let step = self
            .poll_scripts
            .lock()
            .unwrap()
            .get_mut(external_job_id)
            .and_then(|plan| plan.pop_front())
            .unwrap_or(PollStep::Queued);

        let response = match step {
            PollStep::Queued => PollResponse {
                status: RemoteStatus::Queued,
                progress: None,
                output: None,
                error: None,
            },
            PollStep::Running(progress) => PollResponse {
                status: RemoteStatus::Running,
                progress: Some(progress),
                output: None,
                error: None,
            },
            PollStep::Succeeded(output) => {
                self.in_flight.lock().unwrap().remove(external_job_id);
                PollResponse {
                    status: RemoteStatus::Succeeded,
                    progress: Some(1.0),
                    output: Some(output),
                    error: None,
                }
            }
            PollStep::Failed(reason) => {
                self.in_flight.lock().unwrap().remove(external_job_id);
                PollResponse {
                    status: RemoteStatus::Failed,
                    progress: None,
                    output: None,
                    error: Some(reason),
                }
            }
            PollStep::Transient => {
                return Err(ProviderError::Api {
                    status: 502,
                    body: "bad gateway".into(),
                })
            }
        };

        Ok(response)
    }
}
