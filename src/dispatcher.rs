//! End-to-end command handling.
//!
//! `handle` runs one command and returns either reply text or a typed
//! failure. `reply` is the boundary: it turns every failure into the text
//! the sender should see, or into no reply at all for unauthorized callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::auth::{AuthorizationGate, Scope};
use crate::command::{AdminCommand, CheckinRequest, Command, CommandParser, JobKey};
use crate::config::DispatchConfig;
use crate::error::{DispatchError, GENERIC_APOLOGY};
use crate::launcher::WorkerLauncher;
use crate::registry::JobRegistry;
use crate::runtime::WorkerRuntime;
use crate::verifier::{Outcome, OutcomeVerifier, VerifyPolicy};

/// Reply for `ls` when nothing is running.
const NO_ACTIVE_JOBS: &str = "No active check-ins.";

/// Per-key mutual exclusion held across duplicate check and launch.
///
/// Only covers this process; the runtime stays the source of truth.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: Mutex<HashMap<JobKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &JobKey) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        KeyGuard {
            owner: self,
            key: key.clone(),
            _guard: guard,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: JobKey,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in this guard; anything more is a waiter.
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.key);
        }
    }
}

/// Routes commands through authorization, the registry, the launcher and the verifier.
pub struct Dispatcher {
    gate: AuthorizationGate,
    registry: JobRegistry,
    launcher: WorkerLauncher,
    verifier: OutcomeVerifier,
    locks: KeyLocks,
}

impl Dispatcher {
    pub fn new(
        gate: AuthorizationGate,
        runtime: Arc<dyn WorkerRuntime>,
        image: impl Into<String>,
        policy: VerifyPolicy,
    ) -> Self {
        Self {
            gate,
            registry: JobRegistry::new(Arc::clone(&runtime)),
            launcher: WorkerLauncher::new(Arc::clone(&runtime), image),
            verifier: OutcomeVerifier::new(runtime, policy),
            locks: KeyLocks::default(),
        }
    }

    /// Build a dispatcher from configuration and a runtime.
    pub fn from_config(config: &DispatchConfig, runtime: Arc<dyn WorkerRuntime>) -> Self {
        Self::new(
            AuthorizationGate::new(&config.user_whitelist, &config.admin_whitelist),
            runtime,
            config.worker_image.clone(),
            config.verify,
        )
    }

    /// Handle one message and produce the text to send back, if any.
    ///
    /// `None` means the sender must get no reply at all.
    pub async fn reply(&self, identity: &str, raw: &str) -> Option<String> {
        tracing::info!(%identity, message = %raw, "Message came in");

        match self.handle(identity, raw).await {
            Ok(text) => Some(text),
            Err(DispatchError::Unauthorized { .. }) => None,
            Err(
                e @ (DispatchError::InvalidFormat
                | DispatchError::DuplicateCheckin
                | DispatchError::FailedCheckin),
            ) => Some(e.to_string()),
            Err(DispatchError::Runtime(e)) => {
                tracing::error!(%identity, message = %raw, error = %e, "Dispatch failed");
                Some(GENERIC_APOLOGY.to_string())
            }
        }
    }

    /// Run one command for `identity`.
    pub async fn handle(&self, identity: &str, raw: &str) -> Result<String, DispatchError> {
        let command = match CommandParser::parse(raw) {
            Ok(command) => command,
            Err(e) => {
                // Unlisted senders get silence, not a usage hint.
                self.gate.authorize(identity, Scope::User).await?;
                tracing::warn!(%identity, "Invalid check-in string");
                return Err(e);
            }
        };

        match command {
            Command::Admin(AdminCommand::Logs { job_id }) => {
                self.gate.authorize(identity, Scope::Admin).await?;
                let logs = self.registry.get_logs(&job_id).await?;
                Ok(String::from_utf8_lossy(&logs).into_owned())
            }
            Command::Admin(AdminCommand::List) => {
                self.gate.authorize(identity, Scope::Admin).await?;
                let jobs = self.registry.list_active().await?;
                if jobs.is_empty() {
                    return Ok(NO_ACTIVE_JOBS.to_string());
                }
                Ok(jobs
                    .iter()
                    .map(|job| format!("{} {}", job.short_id(), job.args))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Command::Checkin(request) => {
                self.gate.authorize(identity, Scope::User).await?;
                self.schedule_checkin(&request).await
            }
        }
    }

    async fn schedule_checkin(&self, request: &CheckinRequest) -> Result<String, DispatchError> {
        tracing::info!(request = %request.raw(), "Attempting scheduled check-in");
        let key = request.job_key();

        let handle = {
            let _guard = self.locks.acquire(&key).await;
            if self.registry.is_duplicate(&key).await? {
                tracing::warn!(%key, "Duplicate check-in detected");
                return Err(DispatchError::DuplicateCheckin);
            }
            self.launcher.launch(request).await?
        };

        match self.verifier.verify(&handle).await? {
            Outcome::Success { job_id } => {
                tracing::info!(worker = %job_id, "Check-in scheduled");
                Ok(format!("Check-in successful! Check-in ID: {job_id}"))
            }
            Outcome::NotFound | Outcome::StillPending { .. } => Err(DispatchError::FailedCheckin),
        }
    }
}
