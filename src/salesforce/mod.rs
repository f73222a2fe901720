//! Salesforce HTTP client and API interaction layer.
//!
//! - `auth` resolves org credentials (sf CLI subprocess or environment)
//! - `client` is the authenticated reqwest wrapper (probe, describe)
//! - `bulk_ingest` speaks the Bulk API v2 ingest endpoints
//!
//! Credentials are wrapped in `secrecy::SecretString`; logging never includes
//! tokens or raw CSV payloads, only HTTP method, path, and status codes.

pub mod auth;
pub mod bulk_ingest;
pub mod client;

use serde::{Deserialize, Serialize};

pub use auth::OrgCredentials;
pub use bulk_ingest::BulkIngestClient;
pub use client::SalesforceClient;

/// API version used when the credential source does not report one.
pub const DEFAULT_API_VERSION: &str = "v61.0";

/// State of a Bulk API v2 ingest job.
///
/// The client only ever sets `UploadComplete` (closing) itself; every other
/// value is reported by Salesforce and treated as opaque. States unknown to
/// this client map to `Unknown` rather than failing deserialization, so a
/// newer API version cannot wedge the poll loop into a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkJobState {
    /// Job created; accepting data uploads.
    Open,
    /// Upload finished; queued for processing.
    UploadComplete,
    /// Queued server-side, not yet picked up.
    Queued,
    /// Salesforce is processing the records.
    InProgress,
    /// All records processed (some may still have row-level errors).
    JobComplete,
    /// Job was aborted.
    Aborted,
    /// Job failed outright.
    Failed,
    /// A state this client does not recognize.
    #[serde(other)]
    Unknown,
}

impl BulkJobState {
    /// True once no further remote-side processing will occur.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BulkJobState::JobComplete | BulkJobState::Aborted | BulkJobState::Failed
        )
    }

    /// Position in the job lifecycle, used to detect state regression.
    /// Terminal states share the highest rank; `Unknown` ranks with the
    /// in-flight states so it neither trips the regression check nor ends
    /// the poll loop.
    pub fn rank(self) -> u8 {
        match self {
            BulkJobState::Open => 0,
            BulkJobState::UploadComplete => 1,
            BulkJobState::Queued | BulkJobState::InProgress | BulkJobState::Unknown => 2,
            BulkJobState::JobComplete | BulkJobState::Aborted | BulkJobState::Failed => 3,
        }
    }
}

impl std::fmt::Display for BulkJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BulkJobState::Open => "Open",
            BulkJobState::UploadComplete => "UploadComplete",
            BulkJobState::Queued => "Queued",
            BulkJobState::InProgress => "InProgress",
            BulkJobState::JobComplete => "JobComplete",
            BulkJobState::Aborted => "Aborted",
            BulkJobState::Failed => "Failed",
            BulkJobState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}
