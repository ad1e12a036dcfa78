//! Failure classification.
//!
//! `categorize` maps an exit code plus an optional hint onto an
//! [`ErrorCategory`]. It is a pure function: identical inputs always yield
//! the same category.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Closed classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Flaky network or rate limiting; trying again is usually enough.
    Transient,
    /// Needs an ownership or permission fix before retrying.
    RecoverablePermission,
    /// Needs disk or memory freed before retrying.
    RecoverableResource,
    /// Manual intervention or rollback required. Never retried.
    Critical,
    /// Process terminated by a signal. Never retried.
    Fatal,
    /// Unclassified.
    Unknown,
}

impl ErrorCategory {
    /// Whether the operator may be offered a retry at all.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorCategory::Critical | ErrorCategory::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::RecoverablePermission => "recoverable-permission",
            ErrorCategory::RecoverableResource => "recoverable-resource",
            ErrorCategory::Critical => "critical",
            ErrorCategory::Fatal => "fatal",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied (or output-detected) signal about the nature of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureHint {
    Permission,
    Resource,
    Transient,
    Critical,
}

static PERMISSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)permission denied|operation not permitted|\beacces\b|\beperm\b|access denied")
        .expect("permission pattern is a valid static regex")
});

static RESOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)no space left on device|\benospc\b|disk quota exceeded|out of memory|cannot allocate memory|\benomem\b|heap out of memory",
    )
    .expect("resource pattern is a valid static regex")
});

static TRANSIENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)connection (reset|refused|timed out)|\beconnreset\b|\betimedout\b|\beai_again\b|could not resolve host|temporary failure in name resolution|rate limit|too many requests|\b429\b|\b503 service unavailable\b|tls handshake timeout",
    )
    .expect("transient pattern is a valid static regex")
});

impl FailureHint {
    /// Scan failure output for a recognizable cause.
    ///
    /// Permission wins over resource, which wins over transient, so that a
    /// log mentioning both "permission denied" and a retried connection is
    /// treated as needing operator action.
    pub fn detect(text: &str) -> Option<FailureHint> {
        if PERMISSION_RE.is_match(text) {
            Some(FailureHint::Permission)
        } else if RESOURCE_RE.is_match(text) {
            Some(FailureHint::Resource)
        } else if TRANSIENT_RE.is_match(text) {
            Some(FailureHint::Transient)
        } else {
            None
        }
    }
}

/// Exit codes in this range mean "terminated by signal N" (128 + N).
const SIGNAL_EXIT_CODES: std::ops::RangeInclusive<i32> = 129..=192;

/// Command found but not executable.
const EXIT_NOT_EXECUTABLE: i32 = 126;
/// sysexits `EX_NOPERM`.
const EXIT_NOPERM: i32 = 77;
/// sysexits `EX_TEMPFAIL`.
const EXIT_TEMPFAIL: i32 = 75;

/// Derive the category of a failure.
///
/// `exit_code` is `None` when the unit was killed by a signal without
/// producing an exit status.
pub fn categorize(exit_code: Option<i32>, hint: Option<FailureHint>) -> ErrorCategory {
    let code = match exit_code {
        None => return ErrorCategory::Fatal,
        Some(code) if SIGNAL_EXIT_CODES.contains(&code) => return ErrorCategory::Fatal,
        Some(code) => code,
    };

    if let Some(hint) = hint {
        return match hint {
            FailureHint::Permission => ErrorCategory::RecoverablePermission,
            FailureHint::Resource => ErrorCategory::RecoverableResource,
            FailureHint::Transient => ErrorCategory::Transient,
            FailureHint::Critical => ErrorCategory::Critical,
        };
    }

    match code {
        EXIT_NOT_EXECUTABLE | EXIT_NOPERM => ErrorCategory::RecoverablePermission,
        EXIT_TEMPFAIL => ErrorCategory::Transient,
        _ => ErrorCategory::Unknown,
    }
}
