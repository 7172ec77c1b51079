//! Views over the runtime's running workers.
//!
//! Every query goes to the runtime; the set of workers changes outside our
//! control so nothing is cached.

use std::sync::Arc;

use crate::command::JobKey;
use crate::error::RuntimeError;
use crate::runtime::{ActiveJobView, WorkerRuntime};

/// Maximum worker output returned to a `logs` caller (64KB).
const MAX_LOG_SIZE: usize = 64 * 1024;

/// Duplicate detection, listing and log retrieval for running workers.
#[derive(Clone)]
pub struct JobRegistry {
    runtime: Arc<dyn WorkerRuntime>,
}

impl JobRegistry {
    pub fn new(runtime: Arc<dyn WorkerRuntime>) -> Self {
        Self { runtime }
    }

    /// True when a running worker was invoked with text that normalizes to `key`.
    pub async fn is_duplicate(&self, key: &JobKey) -> Result<bool, RuntimeError> {
        let running = self.runtime.list_running().await?;
        Ok(running
            .iter()
            .any(|job| JobKey::normalize(&job.args) == *key))
    }

    /// Snapshot of all running workers.
    pub async fn list_active(&self) -> Result<Vec<ActiveJobView>, RuntimeError> {
        self.runtime.list_running().await
    }

    /// Output of a worker by (full or short) id, head and tail kept when oversized.
    pub async fn get_logs(&self, job_id: &str) -> Result<Vec<u8>, RuntimeError> {
        let output = self.runtime.fetch_output(job_id).await?;
        Ok(truncate_output(output))
    }
}

/// Keep the head and tail of oversized output.
fn truncate_output(bytes: Vec<u8>) -> Vec<u8> {
    if bytes.len() <= MAX_LOG_SIZE {
        return bytes;
    }
    let half = MAX_LOG_SIZE / 2;
    let mut out = Vec::with_capacity(MAX_LOG_SIZE + 64);
    out.extend_from_slice(&bytes[..half]);
    out.extend_from_slice(
        format!("\n\n... [truncated {} bytes] ...\n\n", bytes.len() - MAX_LOG_SIZE).as_bytes(),
    );
    out.extend_from_slice(&bytes[bytes.len() - half..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeRuntime;

    async fn registry_with(workers: &[(&str, &str)]) -> (JobRegistry, Arc<FakeRuntime>) {
        let runtime = Arc::new(FakeRuntime::new());
        for (id, args) in workers {
            runtime.add_running(*id, *args, "").await;
        }
        (JobRegistry::new(runtime.clone()), runtime)
    }

    #[tokio::test]
    async fn empty_runtime_has_no_duplicates() {
        let (registry, _) = registry_with(&[]).await;
        let key = JobKey::normalize("ABC123 Jane Doe");
        assert!(!registry.is_duplicate(&key).await.unwrap());
    }

    #[tokio::test]
    async fn matching_invocation_is_duplicate_regardless_of_case_and_spacing() {
        let (registry, _) = registry_with(&[("w1", "abc123   jane doe ")]).await;
        let key = JobKey::normalize("ABC123 Jane Doe");
        assert!(registry.is_duplicate(&key).await.unwrap());
    }

    #[tokio::test]
    async fn different_invocation_is_not_duplicate() {
        let (registry, _) = registry_with(&[("w1", "XYZ999 Jane Doe")]).await;
        let key = JobKey::normalize("ABC123 Jane Doe");
        assert!(!registry.is_duplicate(&key).await.unwrap());
    }

    #[tokio::test]
    async fn stopped_workers_do_not_count() {
        let (registry, runtime) = registry_with(&[("w1", "ABC123 Jane Doe")]).await;
        runtime.stop("w1").await;
        let key = JobKey::normalize("ABC123 Jane Doe");
        assert!(!registry.is_duplicate(&key).await.unwrap());
        assert!(registry.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_active_returns_every_running_worker() {
        let (registry, _) = registry_with(&[("w1", "A"), ("w2", "B")]).await;
        let ids: Vec<String> = registry
            .list_active()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec!["w1", "w2"]);
    }

    #[tokio::test]
    async fn oversized_logs_are_truncated() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime
            .add_running("w1", "A", "x".repeat(MAX_LOG_SIZE + 1000))
            .await;
        let registry = JobRegistry::new(runtime);

        let logs = registry.get_logs("w1").await.unwrap();
        assert!(logs.len() <= MAX_LOG_SIZE + 64);
        assert!(String::from_utf8_lossy(&logs).contains("[truncated 1000 bytes]"));
    }

    #[test]
    fn small_output_is_untouched() {
        assert_eq!(truncate_output(b"hello".to_vec()), b"hello".to_vec());
    }

    #[tokio::test]
    async fn unknown_logs_are_not_found() {
        let (registry, _) = registry_with(&[]).await;
        assert!(matches!(
            registry.get_logs("deadbeefcafe").await,
            Err(RuntimeError::NotFound { .. })
        ));
    }
}
