//! In-process worker runtime.
//!
//! Workers are plain records. Each launched worker replays a script of
//! samples, one per `inspect` call, so verification can be driven
//! deterministically. Used by tests and by the `fake` dry-run backend.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::runtime::{ActiveJobView, WorkerHandle, WorkerRuntime, WorkerState};
use crate::verifier::SUCCESS_MARKER;

/// Observable state of a fake worker at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub running: bool,
    pub output: String,
}

impl Sample {
    /// Running, with the reservation found.
    pub fn checked_in() -> Self {
        Self {
            running: true,
            output: format!("Looking up reservation...\n{SUCCESS_MARKER}\n"),
        }
    }

    /// Running, without the success marker yet.
    pub fn pending(output: impl Into<String>) -> Self {
        Self {
            running: true,
            output: output.into(),
        }
    }

    /// No longer running.
    pub fn exited(output: impl Into<String>) -> Self {
        Self {
            running: false,
            output: output.into(),
        }
    }
}

#[derive(Debug)]
struct FakeWorker {
    id: String,
    args: String,
    running: bool,
    output: String,
    script: VecDeque<Sample>,
}

impl FakeWorker {
    fn apply_next(&mut self) {
        if let Some(sample) = self.script.pop_front() {
            self.running = sample.running;
            self.output = sample.output;
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState {
            running: self.running,
            status: if self.running { "running" } else { "exited" }.to_string(),
        }
    }
}

#[derive(Debug)]
struct FakeState {
    workers: Vec<FakeWorker>,
    launch_script: Vec<Sample>,
    launch_failure: Option<String>,
    launches: Vec<(String, String)>,
    inspections: usize,
}

/// Scriptable in-memory runtime.
#[derive(Debug)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    /// Launched workers keep running and report the reservation as found.
    pub fn new() -> Self {
        Self::with_launch_script(vec![Sample::checked_in()])
    }

    /// Launched workers replay `script`, one sample per inspect; the last one sticks.
    pub fn with_launch_script(script: Vec<Sample>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                workers: Vec::new(),
                launch_script: script,
                launch_failure: None,
                launches: Vec::new(),
                inspections: 0,
            }),
        }
    }

    /// Make every subsequent `run` fail as if the runtime were down.
    pub async fn fail_launches(&self, reason: impl Into<String>) {
        self.state.lock().await.launch_failure = Some(reason.into());
    }

    /// Seed a worker that is already running with the given invocation.
    pub async fn add_running(
        &self,
        id: impl Into<String>,
        args: impl Into<String>,
        output: impl Into<String>,
    ) {
        self.state.lock().await.workers.push(FakeWorker {
            id: id.into(),
            args: args.into(),
            running: true,
            output: output.into(),
            script: VecDeque::new(),
        });
    }

    /// Mark a worker as exited.
    pub async fn stop(&self, id: &str) {
        if let Some(worker) = self.state.lock().await.workers.iter_mut().find(|w| w.id == id) {
            worker.running = false;
            worker.script.clear();
        }
    }

    /// `(image, arg)` of every accepted launch, in order.
    pub async fn launches(&self) -> Vec<(String, String)> {
        self.state.lock().await.launches.clone()
    }

    /// Number of `inspect` calls so far.
    pub async fn inspections(&self) -> usize {
        self.state.lock().await.inspections
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_running(&self) -> Result<Vec<ActiveJobView>, RuntimeError> {
        let state = self.state.lock().await;
        Ok(state
            .workers
            .iter()
            .filter(|w| w.running)
            .map(|w| ActiveJobView {
                id: w.id.clone(),
                args: w.args.clone(),
            })
            .collect())
    }

    async fn run(&self, image: &str, arg: &str) -> Result<WorkerHandle, RuntimeError> {
        let mut state = self.state.lock().await;
        if let Some(reason) = &state.launch_failure {
            return Err(RuntimeError::Unavailable(reason.clone()));
        }

        let id = Uuid::new_v4().simple().to_string();
        let script = state.launch_script.iter().cloned().collect();
        state.workers.push(FakeWorker {
            id: id.clone(),
            args: arg.to_string(),
            running: true,
            output: String::new(),
            script,
        });
        state.launches.push((image.to_string(), arg.to_string()));

        Ok(WorkerHandle {
            id,
            started_at: Utc::now(),
        })
    }

    async fn inspect(&self, id: &str) -> Result<WorkerState, RuntimeError> {
        let mut state = self.state.lock().await;
        state.inspections += 1;
        let worker = state
            .workers
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| RuntimeError::NotFound { id: id.to_string() })?;
        worker.apply_next();
        Ok(worker.state())
    }

    async fn fetch_output(&self, id: &str) -> Result<Vec<u8>, RuntimeError> {
        let state = self.state.lock().await;
        state
            .workers
            .iter()
            .find(|w| w.id == id || w.id.starts_with(id))
            .map(|w| w.output.clone().into_bytes())
            .ok_or_else(|| RuntimeError::NotFound { id: id.to_string() })
    }
}
