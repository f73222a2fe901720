//! Flag-driven command-line front end.
//!
//! Two subcommands: `load` runs one bulk job end to end; `status` is the
//! follow-up check for a job that outlived the poll ceiling (the loader never
//! aborts a slow job, it just stops waiting).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::warn;

use crate::bulk::{run_job, BulkConfig, JobOutcome, JobSpec, ResultSet};
use crate::error::AppError;
use crate::salesforce::bulk_ingest::BulkOperation;
use crate::salesforce::{auth, BulkIngestClient, SalesforceClient};

/// Salesforce Bulk API v2 loader.
#[derive(Debug, Parser)]
#[command(name = "sfbulk", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one bulk load: create, upload, close, poll, collect results.
    Load(LoadArgs),
    /// Check the status of an existing job.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Target object API name (e.g., Contact).
    #[arg(long)]
    pub object: String,

    /// Write operation: insert, update, upsert, or delete.
    #[arg(long)]
    pub operation: BulkOperation,

    /// CSV file to upload (header row plus data rows).
    #[arg(long)]
    pub file: PathBuf,

    /// External ID field; required for upsert, forbidden otherwise.
    #[arg(long)]
    pub external_id: Option<String>,

    /// Write accepted records to this CSV file.
    #[arg(long)]
    pub accepted_out: Option<PathBuf>,

    /// Write rejected records to this CSV file.
    #[arg(long)]
    pub rejected_out: Option<PathBuf>,

    /// Seconds between status polls.
    #[arg(long, default_value_t = 5)]
    pub poll_interval_secs: u64,

    /// Hard ceiling on status polls before giving up on waiting.
    #[arg(long, default_value_t = 60)]
    pub max_polls: u32,

    /// Org alias or username for the sf CLI credential lookup.
    #[arg(long)]
    pub org: Option<String>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// The job id to check.
    #[arg(long)]
    pub job_id: String,

    /// Org alias or username for the sf CLI credential lookup.
    #[arg(long)]
    pub org: Option<String>,
}

/// Runs the parsed command to completion.
pub async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Load(args) => run_load(args).await,
        Command::Status(args) => run_status(args).await,
    }
}

async fn connect(org: Option<&str>) -> Result<BulkIngestClient, AppError> {
    let creds = auth::resolve(org).await?;
    let client = SalesforceClient::new(creds)?;
    Ok(BulkIngestClient::new(client))
}

async fn run_load(args: LoadArgs) -> Result<(), AppError> {
    let payload = tokio::fs::read_to_string(&args.file).await?;
    let spec = JobSpec::new(args.object, args.operation, args.external_id, payload)?;

    let config = BulkConfig {
        poll_interval: Duration::from_secs(args.poll_interval_secs),
        max_poll_attempts: args.max_polls,
        ..BulkConfig::default()
    };

    let transport = connect(args.org.as_deref()).await?;
    let outcome = run_job(&transport, &spec, &config).await?;

    print_summary(&outcome);

    if let Some(path) = args.accepted_out {
        if write_result_csv(&path, &outcome.accepted)? {
            println!("accepted records written to {}", path.display());
        } else {
            println!("no accepted result set to write");
        }
    }
    if let Some(path) = args.rejected_out {
        if write_result_csv(&path, &outcome.rejected)? {
            println!("rejected records written to {}", path.display());
        } else {
            println!("no rejected result set to write");
        }
    }

    // Row-level rejections are an exit-code-worthy outcome for scripting.
    if outcome.records_failed > 0 {
        return Err(AppError::Salesforce(format!(
            "{} of {} records were rejected",
            outcome.records_failed, outcome.records_processed
        )));
    }
    Ok(())
}

async fn run_status(args: StatusArgs) -> Result<(), AppError> {
    let transport = connect(args.org.as_deref()).await?;
    let info = transport.get_job_status(&args.job_id).await?;

    println!("job:       {}", info.id);
    println!("state:     {}", info.state);
    println!("processed: {}", info.records_processed.unwrap_or(0));
    println!("failed:    {}", info.records_failed.unwrap_or(0));
    if let Some(ms) = info.total_processing_time_ms {
        println!("time:      {} ms", ms);
    }
    if let Some(msg) = info.error_message {
        println!("error:     {}", msg);
    }
    Ok(())
}

fn print_summary(outcome: &JobOutcome) {
    println!("job:       {}", outcome.job_id);
    println!("state:     {}", outcome.state);
    println!("processed: {}", outcome.records_processed);
    println!("failed:    {}", outcome.records_failed);
    if let Some(ms) = outcome.processing_time_ms {
        println!("time:      {} ms", ms);
    }
    if let Some(msg) = &outcome.error_message {
        println!("error:     {}", msg);
    }
    for note in &outcome.warnings {
        warn!("{}", note);
    }
}

/// Writes a parsed result set back out as CSV, header first.
///
/// A set with no header (result fetch skipped or failed) writes nothing and
/// returns `false`; an empty file with a blank header row would not be a
/// usable CSV.
fn write_result_csv(path: &std::path::Path, set: &ResultSet) -> Result<bool, AppError> {
    if set.columns.is_empty() {
        return Ok(false);
    }

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::Internal(format!("failed to open {}: {}", path.display(), e)))?;

    writer
        .write_record(&set.columns)
        .map_err(|e| AppError::Internal(format!("failed to write header: {}", e)))?;
    for row in &set.rows {
        let record: Vec<&str> = set
            .columns
            .iter()
            .map(|c| row.get(c).map(String::as_str).unwrap_or(""))
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| AppError::Internal(format!("failed to write row: {}", e)))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::Internal(format!("failed to flush {}: {}", path.display(), e)))?;
    Ok(true)
}
