//! Application-wide error type.
//!
//! Every remote step of the bulk load pipeline maps to its own variant so a
//! caller can tell "job never created" apart from "job created but upload
//! failed" apart from "job created, uploaded, but never reached a terminal
//! state". Mid-flight variants carry the job id so operators can inspect the
//! remote job directly.

use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for display.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "refresh_token",
    "access_token",
    "client_secret",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
pub(crate) fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth / credentials ────────────────────────────────────────────────────
    #[error("Not authenticated: {0}")]
    Auth(String),

    // ── Pre-flight (nothing remote touched) ───────────────────────────────────
    #[error("Invalid job spec: {0}")]
    InvalidJobSpec(String),

    #[error("Payload is empty")]
    EmptyPayload,

    #[error("Connection check failed: {0}")]
    ConnectionFailed(String),

    #[error("Object {object} is not available for bulk load: {message}")]
    InvalidTarget { object: String, message: String },

    // ── Mid-flight (remote job may exist in a partial state) ──────────────────
    #[error("Job creation rejected: {0}")]
    JobCreation(String),

    #[error("Upload failed for job {job_id}: {message}")]
    Upload { job_id: String, message: String },

    #[error("Close failed for job {job_id}: {message}")]
    Close { job_id: String, message: String },

    #[error("Status poll failed for job {job_id}: {message}")]
    Poll { job_id: String, message: String },

    #[error("Job {job_id} did not reach a terminal state after {attempts} status checks; it is still running remotely")]
    PollTimeout { job_id: String, attempts: u32 },

    // ── Transport / API ───────────────────────────────────────────────────────
    #[error("Salesforce error: {0}")]
    Salesforce(String),

    #[error("Rate limited{}", match .retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Not found: {0}")]
    NotFound(String),

    // ── Local I/O ─────────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// The remote job id this error refers to, when one exists.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            AppError::Upload { job_id, .. }
            | AppError::Close { job_id, .. }
            | AppError::Poll { job_id, .. }
            | AppError::PollTimeout { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// True when the failure happened before any remote job was created.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            AppError::InvalidJobSpec(_)
                | AppError::EmptyPayload
                | AppError::ConnectionFailed(_)
                | AppError::InvalidTarget { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_present_on_midflight_variants() {
        let errs = vec![
            AppError::Upload {
                job_id: "750xx1".into(),
                message: "boom".into(),
            },
            AppError::Close {
                job_id: "750xx1".into(),
                message: "boom".into(),
            },
            AppError::Poll {
                job_id: "750xx1".into(),
                message: "boom".into(),
            },
            AppError::PollTimeout {
                job_id: "750xx1".into(),
                attempts: 60,
            },
        ];
        for e in errs {
            assert_eq!(e.job_id(), Some("750xx1"), "missing job id on {:?}", e);
        }
    }

    #[test]
    fn job_id_absent_on_preflight_variants() {
        let errs = vec![
            AppError::EmptyPayload,
            AppError::ConnectionFailed("down".into()),
            AppError::InvalidTarget {
                object: "Contact".into(),
                message: "no describe".into(),
            },
            AppError::JobCreation("bad combo".into()),
        ];
        for e in errs {
            assert_eq!(e.job_id(), None);
        }
    }

    #[test]
    fn preflight_classification() {
        assert!(AppError::EmptyPayload.is_preflight());
        assert!(AppError::ConnectionFailed("x".into()).is_preflight());
        assert!(!AppError::JobCreation("x".into()).is_preflight());
        assert!(!AppError::PollTimeout {
            job_id: "750".into(),
            attempts: 1
        }
        .is_preflight());
    }

    #[test]
    fn rate_limited_display_includes_retry_hint() {
        let with_hint = AppError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(with_hint.to_string(), "Rate limited (retry after 30s)");

        let without_hint = AppError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(without_hint.to_string(), "Rate limited");
    }

    #[test]
    fn sensitive_pattern_detection() {
        assert!(contains_sensitive("Authorization: Bearer abc"));
        assert!(contains_sensitive("leaked access_token=xyz"));
        assert!(!contains_sensitive("plain status message"));
    }
}
