//! Worker launching.

use std::sync::Arc;

use crate::command::CheckinRequest;
use crate::error::RuntimeError;
use crate::runtime::{WorkerHandle, WorkerRuntime};

/// Starts detached check-in workers from a fixed image.
#[derive(Clone)]
pub struct WorkerLauncher {
    runtime: Arc<dyn WorkerRuntime>,
    image: String,
}

impl WorkerLauncher {
    pub fn new(runtime: Arc<dyn WorkerRuntime>, image: impl Into<String>) -> Self {
        Self {
            runtime,
            image: image.into(),
        }
    }

    /// Launch a worker for `request` and return as soon as the runtime accepts it.
    ///
    /// The worker receives the original message text verbatim as its only
    /// argument, which is also what duplicate detection compares against.
    /// Start failures are returned as-is; nothing is retried.
    pub async fn launch(&self, request: &CheckinRequest) -> Result<WorkerHandle, RuntimeError> {
        let handle = self.runtime.run(&self.image, request.raw()).await?;
        tracing::info!(
            runtime = self.runtime.name(),
            image = %self.image,
            worker = handle.short_id(),
            "Launched check-in worker"
        );
        Ok(handle)
    }
}
