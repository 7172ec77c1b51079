//! Worker runtime abstraction.
//!
//! The runtime owns the set of running workers; nothing here caches it.
//! - `docker`: drives the `docker` CLI
//! - `fake`: in-process runtime for tests and dry runs

pub mod docker;
pub mod fake;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RuntimeError;

pub use docker::DockerCli;
pub use fake::FakeRuntime;

/// Length of the abbreviated worker id shown to callers.
pub const SHORT_ID_LEN: usize = 12;

/// Abbreviate a worker id for display.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Handle to a launched worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    /// Full runtime id.
    pub id: String,
    /// When the runtime accepted the worker.
    pub started_at: DateTime<Utc>,
}

impl WorkerHandle {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Snapshot of one running worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJobView {
    pub id: String,
    /// The worker's invocation arguments joined by spaces.
    pub args: String,
}

impl ActiveJobView {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Current runtime state of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerState {
    pub running: bool,
    /// Runtime status word (`running`, `exited`, ...).
    pub status: String,
}

/// The external runtime that hosts workers.
#[async_trait]
pub trait WorkerRuntime: Send + Sync {
    /// Runtime name, for logs.
    fn name(&self) -> &str;

    /// All currently running workers.
    async fn list_running(&self) -> Result<Vec<ActiveJobView>, RuntimeError>;

    /// Start a detached worker from `image` with a single argument.
    async fn run(&self, image: &str, arg: &str) -> Result<WorkerHandle, RuntimeError>;

    /// Re-fetch a worker's state by id.
    async fn inspect(&self, id: &str) -> Result<WorkerState, RuntimeError>;

    /// Accumulated output (stdout and stderr) of a worker.
    async fn fetch_output(&self, id: &str) -> Result<Vec<u8>, RuntimeError>;
}
