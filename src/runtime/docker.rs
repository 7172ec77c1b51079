//! Docker runtime driving the local `docker` CLI.
//!
//! Every call is a fresh subprocess round-trip, so the daemon stays the
//! single source of truth for which workers are running.

use std::process::{Output, Stdio};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::RuntimeError;
use crate::runtime::{ActiveJobView, WorkerHandle, WorkerRuntime, WorkerState};

/// Subset of `docker inspect` output we rely on.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectRecord {
    id: String,
    #[serde(default)]
    config: InspectConfig,
    #[serde(default)]
    state: InspectState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    cmd: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    running: bool,
    #[serde(default)]
    status: String,
}

impl From<InspectRecord> for ActiveJobView {
    fn from(record: InspectRecord) -> Self {
        Self {
            args: record.config.cmd.unwrap_or_default().join(" "),
            id: record.id,
        }
    }
}

impl From<InspectRecord> for WorkerState {
    fn from(record: InspectRecord) -> Self {
        Self {
            running: record.state.running,
            status: record.state.status,
        }
    }
}

/// Worker runtime backed by the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: String,
}

impl DockerCli {
    /// Use `docker` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use a specific docker-compatible binary (e.g. `podman`).
    pub fn with_binary(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run the client with `args`, returning its raw output whatever the exit status.
    async fn exec(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        tracing::debug!(bin = %self.bin, ?args, "Running docker command");
        Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("failed to spawn {}: {e}", self.bin)))
    }

    /// Run the client and require a zero exit status.
    async fn exec_checked(
        &self,
        args: &[&str],
        subject: Option<&str>,
    ) -> Result<Output, RuntimeError> {
        let output = self.exec(args).await?;
        if output.status.success() {
            return Ok(output);
        }
        Err(classify_failure(
            &format!("{} {}", self.bin, args.join(" ")),
            &String::from_utf8_lossy(&output.stderr),
            subject,
        ))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerRuntime for DockerCli {
    fn name(&self) -> &str {
        "docker"
    }

    async fn list_running(&self) -> Result<Vec<ActiveJobView>, RuntimeError> {
        let ps = self.exec_checked(&["ps", "-q", "--no-trunc"], None).await?;
        let stdout = String::from_utf8_lossy(&ps.stdout);
        let ids: Vec<&str> = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["inspect"];
        args.extend(ids.iter().copied());
        let output = self.exec(&args).await?;

        // A worker that exits between `ps` and `inspect` makes the exit status
        // non-zero while the rest are still printed.
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            if output.status.success() {
                return Ok(Vec::new());
            }
            return Err(classify_failure(
                "docker inspect",
                &String::from_utf8_lossy(&output.stderr),
                None,
            ));
        }

        Ok(parse_inspect(&output.stdout)?
            .into_iter()
            .filter(|r| r.state.running)
            .map(ActiveJobView::from)
            .collect())
    }

    /// The check-in text becomes the container command, one argument per word.
    async fn run(&self, image: &str, arg: &str) -> Result<WorkerHandle, RuntimeError> {
        let mut args = vec!["run", "-d", image];
        args.extend(arg.split_whitespace());
        let output = self.exec_checked(&args, None).await?;
        let id = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                RuntimeError::InvalidOutput("docker run printed no container id".into())
            })?;

        Ok(WorkerHandle {
            id,
            started_at: Utc::now(),
        })
    }

    async fn inspect(&self, id: &str) -> Result<WorkerState, RuntimeError> {
        let output = self.exec_checked(&["inspect", id], Some(id)).await?;
        parse_inspect(&output.stdout)?
            .into_iter()
            .next()
            .map(WorkerState::from)
            .ok_or_else(|| RuntimeError::NotFound { id: id.to_string() })
    }

    async fn fetch_output(&self, id: &str) -> Result<Vec<u8>, RuntimeError> {
        let output = self.exec_checked(&["logs", id], Some(id)).await?;
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Ok(combined)
    }
}

fn parse_inspect(stdout: &[u8]) -> Result<Vec<InspectRecord>, RuntimeError> {
    Ok(serde_json::from_slice(stdout)?)
}

/// Map a failed docker invocation to a runtime error.
fn classify_failure(command: &str, stderr: &str, subject: Option<&str>) -> RuntimeError {
    let stderr = stderr.trim();
    if let Some(id) = subject
        && (stderr.contains("No such container") || stderr.contains("No such object"))
    {
        return RuntimeError::NotFound { id: id.to_string() };
    }
    if stderr.contains("Cannot connect to the Docker daemon") {
        return RuntimeError::Unavailable(stderr.to_string());
    }
    RuntimeError::CommandFailed {
        command: command.to_string(),
        reason: stderr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSPECT_JSON: &str = r#"[
        {
            "Id": "4f1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e",
            "Config": { "Cmd": ["ABC123", "Jane", "Doe"], "Image": "worker:1" },
            "State": { "Status": "running", "Running": true }
        },
        {
            "Id": "deadbeefcafe00000000",
            "Config": { "Cmd": null },
            "State": { "Status": "exited", "Running": false }
        }
    ]"#;

    #[test]
    fn inspect_json_maps_to_views() {
        let views: Vec<ActiveJobView> = parse_inspect(INSPECT_JSON.as_bytes())
            .unwrap()
            .into_iter()
            .map(ActiveJobView::from)
            .collect();
        assert_eq!(views[0].args, "ABC123 Jane Doe");
        assert_eq!(views[0].short_id(), "4f1c2d3e4f5a");
        assert_eq!(views[1].args, "");
    }

    #[test]
    fn inspect_json_maps_to_state() {
        let mut records = parse_inspect(INSPECT_JSON.as_bytes()).unwrap().into_iter();
        let running = WorkerState::from(records.next().unwrap());
        let exited = WorkerState::from(records.next().unwrap());
        assert!(running.running);
        assert_eq!(running.status, "running");
        assert!(!exited.running);
        assert_eq!(exited.status, "exited");
    }

    #[test]
    fn malformed_inspect_output_is_invalid() {
        assert!(matches!(
            parse_inspect(b"not json"),
            Err(RuntimeError::InvalidOutput(_))
        ));
    }

    #[test]
    fn missing_container_is_not_found() {
        let err = classify_failure(
            "docker logs abc",
            "Error response from daemon: No such container: abc\n",
            Some("abc"),
        );
        assert!(matches!(err, RuntimeError::NotFound { ref id } if id == "abc"));
    }

    #[test]
    fn daemon_down_is_unavailable() {
        let err = classify_failure(
            "docker ps",
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock.",
            None,
        );
        assert!(matches!(err, RuntimeError::Unavailable(_)));
    }

    #[test]
    fn other_failures_keep_stderr() {
        let err = classify_failure("docker run -d img x", "pull access denied", None);
        match err {
            RuntimeError::CommandFailed { command, reason } => {
                assert_eq!(command, "docker run -d img x");
                assert_eq!(reason, "pull access denied");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let docker = DockerCli::with_binary("/nonexistent/checkin-dispatch-docker");
        let err = docker.list_running().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unavailable(_)));
    }

    /// Write a fake docker client that records its argv, one `[arg]` per line.
    #[cfg(unix)]
    fn recording_client(dir: &std::path::Path) -> (DockerCli, std::path::PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let argv_file = dir.join("argv.txt");
        let script = dir.join("docker");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nfor a in \"$@\"; do printf '[%s]\\n' \"$a\"; done > '{}'\necho 4f1c2d3e4f5a6b7c\n",
                argv_file.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (DockerCli::with_binary(script.display().to_string()), argv_file)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_passes_each_word_as_its_own_argument() {
        let dir = tempfile::TempDir::new().unwrap();
        let (docker, argv_file) = recording_client(dir.path());

        let handle = docker
            .run("pyro2927/southwestcheckin:latest", "ABC123  Jane Doe ")
            .await
            .unwrap();

        assert_eq!(handle.id, "4f1c2d3e4f5a6b7c");
        assert_eq!(
            std::fs::read_to_string(&argv_file).unwrap(),
            "[run]\n[-d]\n[pyro2927/southwestcheckin:latest]\n[ABC123]\n[Jane]\n[Doe]\n"
        );
    }
}
