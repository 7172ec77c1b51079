//! Inbound command parsing.
//!
//! Turns raw message text into either an admin command (`ls`, `logs <id>`)
//! or a structured check-in request. Pure string handling, no I/O.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::DispatchError;

/// Check-in grammar: a 6 character confirmation code followed by one or more
/// name tokens and optional trailing whitespace.
static CHECKIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<code>[A-Za-z0-9_]{6})\s+(?P<names>\S+(?:\s+\S+)*)\s*$")
        .expect("check-in pattern is valid")
});

/// A parsed inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Admin-scoped introspection.
    Admin(AdminCommand),
    /// User-scoped check-in request.
    Checkin(CheckinRequest),
}

/// Admin commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// `logs <jobId>`: fetch a worker's output.
    Logs { job_id: String },
    /// `ls`: list running workers.
    List,
}

/// A validated check-in request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinRequest {
    confirmation_code: String,
    first_name: String,
    last_name: String,
    raw: String,
}

impl CheckinRequest {
    /// Six character confirmation code.
    pub fn confirmation_code(&self) -> &str {
        &self.confirmation_code
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    /// Remaining name tokens joined by single spaces; may be empty.
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// The message text exactly as received. This is what the worker is given.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Duplicate-detection key for this request.
    pub fn job_key(&self) -> JobKey {
        JobKey::normalize(&self.raw)
    }
}

/// Normalized identity of a check-in, used only for duplicate detection.
///
/// Lowercased, trimmed, with internal whitespace collapsed to single spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey(String);

impl JobKey {
    /// Normalize arbitrary text (a request or a worker's invocation) into a key.
    pub fn normalize(text: &str) -> Self {
        let collapsed = text
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        Self(collapsed)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses message text into a [`Command`].
pub struct CommandParser;

impl CommandParser {
    /// Parse raw message text.
    ///
    /// Admin forms are matched case-insensitively on the trimmed text; anything
    /// else must satisfy the check-in grammar or fails with `InvalidFormat`.
    pub fn parse(raw: &str) -> Result<Command, DispatchError> {
        let trimmed = raw.trim();
        let lower = trimmed.to_lowercase();

        if lower == "ls" {
            return Ok(Command::Admin(AdminCommand::List));
        }
        if lower.split_whitespace().next() == Some("logs") {
            return parse_logs(&lower).map(Command::Admin);
        }

        parse_checkin(raw).map(Command::Checkin)
    }
}

/// `logs <jobId>`; the id is the second token.
fn parse_logs(lower: &str) -> Result<AdminCommand, DispatchError> {
    let job_id = lower
        .split_whitespace()
        .nth(1)
        .ok_or(DispatchError::InvalidFormat)?;
    Ok(AdminCommand::Logs {
        job_id: job_id.to_string(),
    })
}

fn parse_checkin(raw: &str) -> Result<CheckinRequest, DispatchError> {
    let caps = CHECKIN_PATTERN
        .captures(raw)
        .ok_or(DispatchError::InvalidFormat)?;

    let mut names = caps["names"].split_whitespace();
    let first_name = names.next().ok_or(DispatchError::InvalidFormat)?;
    let last_name = names.collect::<Vec<_>>().join(" ");

    Ok(CheckinRequest {
        confirmation_code: caps["code"].to_string(),
        first_name: first_name.to_string(),
        last_name,
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkin(raw: &str) -> CheckinRequest {
        match CommandParser::parse(raw) {
            Ok(Command::Checkin(req)) => req,
            other => panic!("expected check-in for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_full_checkin() {
        let req = checkin("ABC123 Jane Doe");
        assert_eq!(req.confirmation_code(), "ABC123");
        assert_eq!(req.first_name(), "Jane");
        assert_eq!(req.last_name(), "Doe");
        assert_eq!(req.raw(), "ABC123 Jane Doe");
    }

    #[test]
    fn last_name_is_optional() {
        let req = checkin("abc_12 Cher");
        assert_eq!(req.first_name(), "Cher");
        assert_eq!(req.last_name(), "");
    }

    #[test]
    fn extra_tokens_join_into_last_name() {
        let req = checkin("ZZ9PLZ Mary Ann   van Dyke  ");
        assert_eq!(req.first_name(), "Mary");
        assert_eq!(req.last_name(), "Ann van Dyke");
    }

    #[test]
    fn trailing_whitespace_is_allowed() {
        let req = checkin("ABC123 Jane Doe \n");
        assert_eq!(req.last_name(), "Doe");
    }

    #[test]
    fn rejects_malformed_text() {
        for raw in [
            "bad input",
            "",
            "   ",
            "ABC12 Jane Doe",
            "ABC1234 Jane Doe",
            "ABC-23 Jane Doe",
            "ABC123",
            "ABC123 ",
            " ABC123 Jane Doe",
        ] {
            assert!(
                matches!(CommandParser::parse(raw), Err(DispatchError::InvalidFormat)),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn invalid_format_carries_usage_hint() {
        let err = CommandParser::parse("bad input").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Checkin message should be of form: CONFIRMATION_NUMBER FIRST_NAME LAST_NAME"
        );
    }

    #[test]
    fn parses_admin_commands_case_insensitively() {
        assert_eq!(
            CommandParser::parse("  LS ").unwrap(),
            Command::Admin(AdminCommand::List)
        );
        assert_eq!(
            CommandParser::parse("Logs DEADBEEFCAFE").unwrap(),
            Command::Admin(AdminCommand::Logs {
                job_id: "deadbeefcafe".into()
            })
        );
    }

    #[test]
    fn bare_logs_is_invalid() {
        assert!(matches!(
            CommandParser::parse("logs"),
            Err(DispatchError::InvalidFormat)
        ));
    }

    #[test]
    fn code_starting_with_logs_is_a_checkin() {
        let req = checkin("LOGS12 Jane Doe");
        assert_eq!(req.confirmation_code(), "LOGS12");
    }

    #[test]
    fn ls_must_match_exactly() {
        assert!(matches!(
            CommandParser::parse("lsof"),
            Err(DispatchError::InvalidFormat)
        ));
    }

    #[test]
    fn job_key_ignores_case_and_whitespace() {
        let a = checkin("ABC123 John Doe").job_key();
        let b = checkin("abc123  john   doe").job_key();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "abc123 john doe");
    }

    #[test]
    fn job_key_distinguishes_different_requests() {
        assert_ne!(
            checkin("ABC123 John Doe").job_key(),
            checkin("ABC124 John Doe").job_key()
        );
    }
}
