//! `sfbulk` — a command-line Salesforce Bulk API v2 loader.
//!
//! The crate drives one ingest job end to end: create the job, upload a CSV
//! payload, close the job, poll until a terminal state, then collect the
//! accepted and rejected result sets. See [`bulk::run_job`] for the entry
//! point and [`bulk::IngestTransport`] for the remote-call seam.

pub mod bulk;
pub mod cli;
pub mod error;
pub mod salesforce;

pub use error::AppError;
