//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::verifier::VerifyPolicy;

/// Worker image launched for every check-in.
pub const DEFAULT_WORKER_IMAGE: &str = "pyro2927/southwestcheckin:latest";

/// Which worker runtime backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeBackend {
    /// Drive the local `docker` CLI.
    Docker,
    /// In-process fake runtime, for dry runs.
    Fake,
}

impl FromStr for RuntimeBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "fake" => Ok(Self::Fake),
            other => Err(format!("unknown runtime '{other}' (expected docker or fake)")),
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Port the webhook listens on.
    pub port: u16,
    /// Versioned worker image reference.
    pub worker_image: String,
    /// Allow-list file for check-in commands.
    pub user_whitelist: PathBuf,
    /// Allow-list file for admin commands (`ls`, `logs`).
    pub admin_whitelist: PathBuf,
    /// How a launched worker is verified.
    pub verify: VerifyPolicy,
    /// Runtime backend.
    pub runtime: RuntimeBackend,
    /// Path or name of the docker binary.
    pub docker_bin: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            worker_image: DEFAULT_WORKER_IMAGE.to_string(),
            user_whitelist: PathBuf::from("user_whitelist.txt"),
            admin_whitelist: PathBuf::from("admin_whitelist.txt"),
            verify: VerifyPolicy::default(),
            runtime: RuntimeBackend::Docker,
            docker_bin: "docker".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Build config from `CHECKIN_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = parse_var(&lookup, "CHECKIN_PORT")?.unwrap_or(defaults.port);
        let worker_image = lookup("CHECKIN_WORKER_IMAGE").unwrap_or(defaults.worker_image);
        let user_whitelist = lookup("CHECKIN_USER_WHITELIST")
            .map(PathBuf::from)
            .unwrap_or(defaults.user_whitelist);
        let admin_whitelist = lookup("CHECKIN_ADMIN_WHITELIST")
            .map(PathBuf::from)
            .unwrap_or(defaults.admin_whitelist);
        let runtime = parse_var(&lookup, "CHECKIN_RUNTIME")?.unwrap_or(defaults.runtime);
        let docker_bin = lookup("CHECKIN_DOCKER_BIN").unwrap_or(defaults.docker_bin);

        let grace = parse_var::<u64, _>(&lookup, "CHECKIN_GRACE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(VerifyPolicy::DEFAULT_GRACE);
        let verify = match lookup("CHECKIN_VERIFY_MODE").as_deref().map(str::trim) {
            None | Some("single") => VerifyPolicy::SingleSample { grace },
            Some("poll") => {
                let timeout = parse_var::<u64, _>(&lookup, "CHECKIN_POLL_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(Duration::from_secs(30));
                let interval = parse_var::<u64, _>(&lookup, "CHECKIN_POLL_INTERVAL_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::from_millis(500));
                if interval.is_zero() {
                    return Err(ConfigError::InvalidValue {
                        key: "CHECKIN_POLL_INTERVAL_MS".into(),
                        message: "must be greater than zero".into(),
                    });
                }
                VerifyPolicy::Poll {
                    grace,
                    interval,
                    timeout,
                }
            }
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "CHECKIN_VERIFY_MODE".into(),
                    message: format!("expected 'single' or 'poll', got '{other}'"),
                });
            }
        };

        Ok(Self {
            port,
            worker_image,
            user_whitelist,
            admin_whitelist,
            verify,
            runtime,
            docker_bin,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}
