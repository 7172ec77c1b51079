//! Caller authorization against per-scope allow-lists.
//!
//! Each scope has a plain text file with one identity per line. A missing or
//! unreadable file means the scope is open to everyone.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::DispatchError;

/// Which allow-list a command is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Check-in requests.
    User,
    /// `ls` and `logs`.
    Admin,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Checks caller identities against the allow-list files.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    user_list: PathBuf,
    admin_list: PathBuf,
}

impl AuthorizationGate {
    pub fn new(user_list: impl Into<PathBuf>, admin_list: impl Into<PathBuf>) -> Self {
        Self {
            user_list: user_list.into(),
            admin_list: admin_list.into(),
        }
    }

    fn list_path(&self, scope: Scope) -> &Path {
        match scope {
            Scope::User => &self.user_list,
            Scope::Admin => &self.admin_list,
        }
    }

    /// Allow or deny `identity` for `scope`.
    ///
    /// The list is read on every call so edits apply without a restart.
    pub async fn authorize(&self, identity: &str, scope: Scope) -> Result<(), DispatchError> {
        let path = self.list_path(scope);
        let Some(allowed) = load_allow_list(path).await else {
            tracing::debug!(%scope, path = %path.display(), "No allow-list; scope is open");
            return Ok(());
        };

        if allowed.contains(identity) {
            Ok(())
        } else {
            tracing::warn!(%identity, %scope, "Unauthorized attempt");
            Err(DispatchError::Unauthorized {
                identity: identity.to_string(),
            })
        }
    }
}

/// Read an allow-list; `None` when the file cannot be read.
async fn load_allow_list(path: &Path) -> Option<HashSet<String>> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    Some(parse_allow_list(&contents))
}

fn parse_allow_list(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
