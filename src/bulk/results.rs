//! Result retrieval and parsing for finished ingest jobs.
//!
//! Salesforce produces two per-outcome record sets after a job finishes:
//! `successfulResults` and `failedResults`. Both are CSV with a header row
//! mirroring the uploaded columns plus the server-added status/id/error
//! columns. Cell values stay as text; coercing the org's typed fields here
//! would risk silent precision loss.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::bulk::IngestTransport;
use crate::error::AppError;

/// One parsed result row: column name → cell value.
pub type ResultRow = HashMap<String, String>;

/// A parsed result set with its header preserved in order.
///
/// Duplicate column names are a caller error; rows keep the last occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    /// Column names in file order.
    pub columns: Vec<String>,
    /// Data rows.
    pub rows: Vec<ResultRow>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Both outcome record sets for one job, plus any partial-failure notes.
#[derive(Debug, Clone, Default)]
pub struct JobResults {
    /// Records Salesforce accepted.
    pub accepted: ResultSet,
    /// Records Salesforce rejected, with the server's error column.
    pub rejected: ResultSet,
    /// Diagnostics for endpoints that could not be fetched or parsed.
    pub warnings: Vec<String>,
}

/// Parses one result-set body from delimited text.
///
/// The first line defines column names; each subsequent line becomes a row
/// mapping. An empty body (after trimming whitespace) parses to an empty set.
///
/// # Errors
///
/// `AppError::Internal` on malformed CSV (e.g., a row with a different column
/// count than the header).
pub fn parse_result_csv(body: &str) -> Result<ResultSet, AppError> {
    if body.trim().is_empty() {
        return Ok(ResultSet::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(body.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::Internal(format!("bad result header: {}", e)))?
        .iter()
        .map(String::from)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AppError::Internal(format!("bad result row: {}", e)))?;
        let row: ResultRow = columns
            .iter()
            .cloned()
            .zip(record.iter().map(String::from))
            .collect();
        rows.push(row);
    }

    Ok(ResultSet { columns, rows })
}

/// Retrieves and parses both outcome record sets for a terminal job.
///
/// The two fetches are independent: a failure (fetch or parse) on one
/// endpoint yields an empty set for that endpoint plus a recorded warning,
/// and never aborts the other. This function is infallible by design; the
/// job's final status is the primary deliverable and is already in hand.
pub async fn fetch_outcome<T: IngestTransport + ?Sized>(
    transport: &T,
    job_id: &str,
) -> JobResults {
    let mut results = JobResults::default();

    match transport.get_successful_results(job_id).await {
        Ok(body) => match parse_result_csv(&body) {
            Ok(set) => results.accepted = set,
            Err(e) => results.record_warning("accepted", e),
        },
        Err(e) => results.record_warning("accepted", e),
    }

    match transport.get_failed_results(job_id).await {
        Ok(body) => match parse_result_csv(&body) {
            Ok(set) => results.rejected = set,
            Err(e) => results.record_warning("rejected", e),
        },
        Err(e) => results.record_warning("rejected", e),
    }

    info!(
        "result sets for job: {} accepted, {} rejected",
        results.accepted.len(),
        results.rejected.len()
    );
    results
}

impl JobResults {
    fn record_warning(&mut self, which: &str, err: AppError) {
        let note = format!("{} result set unavailable: {}", which, err);
        warn!("{}", note);
        self.warnings.push(note);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
