//! Bulk ingest job orchestration.
//!
//! Drives one job through the strict sequence create → upload → close → poll
//! → fetch results. Nothing here is retried: the ingest endpoints are not
//! idempotent at the HTTP layer for non-GET verbs, so re-uploading or
//! re-closing risks duplicate or conflicting remote state. Each step failure
//! maps to its own [`AppError`] variant carrying the job id once one exists,
//! and recovery decisions are left to the operator.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bulk::results::{fetch_outcome, ResultSet};
use crate::bulk::IngestTransport;
use crate::error::AppError;
use crate::salesforce::bulk_ingest::{BulkOperation, CreateIngestJobRequest};
use crate::salesforce::BulkJobState;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed delay between status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Hard ceiling on status polls (with the default interval, about 5 minutes).
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Upload timeout, sized for large payloads.
const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Close timeout; the close request carries no body to speak of.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// JobSpec
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-supplied description of one bulk load.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// API name of the target object.
    pub object: String,
    /// The write operation to perform.
    pub operation: BulkOperation,
    /// External ID field; present iff `operation` is `Upsert`.
    pub external_id_field_name: Option<String>,
    /// Raw CSV payload: header row plus data rows.
    pub payload: String,
}

impl JobSpec {
    /// Validates and constructs a job spec.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidJobSpec` - external ID field supplied for a
    ///   non-upsert operation, or missing for an upsert
    /// - `AppError::EmptyPayload` - payload empty after trimming
    pub fn new(
        object: impl Into<String>,
        operation: BulkOperation,
        external_id_field_name: Option<String>,
        payload: impl Into<String>,
    ) -> Result<Self, AppError> {
        let payload = payload.into();
        if payload.trim().is_empty() {
            return Err(AppError::EmptyPayload);
        }

        match (operation, &external_id_field_name) {
            (BulkOperation::Upsert, None) => {
                return Err(AppError::InvalidJobSpec(
                    "upsert requires an external ID field".to_string(),
                ))
            }
            (BulkOperation::Upsert, Some(_)) => {}
            (op, Some(field)) => {
                return Err(AppError::InvalidJobSpec(format!(
                    "external ID field '{}' is only valid for upsert, not {}",
                    field, op
                )))
            }
            (_, None) => {}
        }

        Ok(Self {
            object: object.into(),
            operation,
            external_id_field_name,
            payload,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for one orchestration run.
///
/// Timeouts are per-step, not global: worst-case wall time is
/// `max_poll_attempts * poll_interval` plus the per-call timeouts.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Hard ceiling on status polls before giving up on waiting.
    pub max_poll_attempts: u32,
    /// Timeout for the payload upload.
    pub upload_timeout: Duration,
    /// Timeout for the close request.
    pub close_timeout: Duration,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JobOutcome
// ─────────────────────────────────────────────────────────────────────────────

/// Final status of a finished (terminal) job, plus its result sets.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// The remote job id.
    pub job_id: String,
    /// Terminal state the job finished in.
    pub state: BulkJobState,
    /// Records Salesforce processed.
    pub records_processed: u64,
    /// Records Salesforce rejected.
    pub records_failed: u64,
    /// Remote-reported processing time, passed through untouched.
    pub processing_time_ms: Option<u64>,
    /// Remote-reported failure message, if any.
    pub error_message: Option<String>,
    /// Accepted records; empty when result fetch was skipped or failed.
    pub accepted: ResultSet,
    /// Rejected records; empty when result fetch was skipped or failed.
    pub rejected: ResultSet,
    /// Partial-failure notes from result fetching.
    pub warnings: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// run_job
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one bulk ingest job to a terminal state and collects its results.
///
/// Step order is strict; the first failing step aborts everything after it.
/// On `PollTimeout` the remote job is left running — no abort is attempted,
/// and checking back later (`get_job_status`) is the caller's job.
///
/// # Errors
///
/// One variant per step, per the taxonomy on [`AppError`]. Result-fetch
/// failures are not errors; they surface as empty sets plus `warnings`.
pub async fn run_job(
    transport: &dyn IngestTransport,
    spec: &JobSpec,
    config: &BulkConfig,
) -> Result<JobOutcome, AppError> {
    // Defensive re-checks; JobSpec::new already enforces both.
    if spec.payload.trim().is_empty() {
        return Err(AppError::EmptyPayload);
    }
    if (spec.operation == BulkOperation::Upsert) != spec.external_id_field_name.is_some() {
        return Err(AppError::InvalidJobSpec(
            "external ID field is required for upsert and forbidden otherwise".to_string(),
        ));
    }

    // Pre-flight: fail fast before creating anything remote.
    transport.probe().await?;

    let describe = transport
        .describe(&spec.object)
        .await
        .map_err(|e| AppError::InvalidTarget {
            object: spec.object.clone(),
            message: e.to_string(),
        })?;
    debug!(
        "target {} describeable (createable={})",
        describe.name, describe.createable
    );

    // Step 1: create.
    let req = CreateIngestJobRequest::new(
        spec.object.clone(),
        spec.operation,
        spec.external_id_field_name.clone(),
    );
    let job_id = transport
        .create_ingest_job(req)
        .await
        .map_err(|e| AppError::JobCreation(e.to_string()))?;
    info!("created {} job for {}", spec.operation, spec.object);

    // Step 2: upload.
    transport
        .upload_job_data(&job_id, &spec.payload, config.upload_timeout)
        .await
        .map_err(|e| AppError::Upload {
            job_id: job_id.clone(),
            message: e.to_string(),
        })?;

    // Step 3: close.
    transport
        .close_job(&job_id, config.close_timeout)
        .await
        .map_err(|e| AppError::Close {
            job_id: job_id.clone(),
            message: e.to_string(),
        })?;

    // Step 4: poll until terminal, bounded by attempt count.
    let info = poll_until_terminal(transport, &job_id, config).await?;

    let records_processed = info.records_processed.unwrap_or(0);
    let records_failed = info.records_failed.unwrap_or(0);
    info!(
        "job {} in {}: {} processed, {} failed",
        job_id, info.state, records_processed, records_failed
    );

    // Step 5: fetch results, gated. A job that fails outright with nothing
    // processed has nothing to fetch.
    let should_fetch = info.state == BulkJobState::JobComplete
        || records_processed > 0
        || records_failed > 0;

    let results = if should_fetch {
        fetch_outcome(transport, &job_id).await
    } else {
        debug!("skipping result fetch for job {} ({})", job_id, info.state);
        Default::default()
    };

    Ok(JobOutcome {
        job_id,
        state: info.state,
        records_processed,
        records_failed,
        processing_time_ms: info.total_processing_time_ms,
        error_message: info.error_message,
        accepted: results.accepted,
        rejected: results.rejected,
        warnings: results.warnings,
    })
}

/// Polls job status at a fixed interval until a terminal state, up to the
/// configured ceiling. A transport failure during polling is fatal; so is
/// exhausting the ceiling, in which case the job is simply left running.
async fn poll_until_terminal(
    transport: &dyn IngestTransport,
    job_id: &str,
    config: &BulkConfig,
) -> Result<crate::salesforce::bulk_ingest::BulkIngestJobInfo, AppError> {
    let mut last_rank = BulkJobState::Open.rank();

    for attempt in 1..=config.max_poll_attempts {
        let info = transport
            .get_job_status(job_id)
            .await
            .map_err(|e| AppError::Poll {
                job_id: job_id.to_string(),
                message: e.to_string(),
            })?;

        // States only ever advance; a regression means the remote reported
        // something out of order and is worth flagging.
        if info.state.rank() < last_rank {
            warn!(
                "job {} reported out-of-order state {} (attempt {})",
                job_id, info.state, attempt
            );
        }
        last_rank = last_rank.max(info.state.rank());

        if info.state.is_terminal() {
            return Ok(info);
        }

        debug!(
            "job {} still {} (attempt {}/{})",
            job_id, info.state, attempt, config.max_poll_attempts
        );
        // No point sleeping after the last attempt; report the timeout now.
        if attempt < config.max_poll_attempts {
            tokio::time::sleep(config.poll_interval).await;
        }
    }

    Err(AppError::PollTimeout {
        job_id: job_id.to_string(),
        attempts: config.max_poll_attempts,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
