//! Bulk load core: job orchestration and result retrieval.
//!
//! [`orchestrator`] drives one ingest job from creation to a terminal state;
//! [`results`] turns the two per-outcome result sets into tabular rows. Both
//! talk to Salesforce exclusively through the [`IngestTransport`] trait so
//! tests can substitute a scripted fake for the HTTP client.

pub mod orchestrator;
pub mod results;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::AppError;
use crate::salesforce::bulk_ingest::{BulkIngestJobInfo, CreateIngestJobRequest};
use crate::salesforce::client::ObjectDescribe;
use crate::salesforce::BulkIngestClient;

pub use orchestrator::{run_job, BulkConfig, JobOutcome, JobSpec};
pub use results::{fetch_outcome, JobResults, ResultSet};

/// The remote calls a bulk load depends on.
///
/// Implemented by [`BulkIngestClient`] for real traffic and by test fakes for
/// orchestration tests. All calls carry the org's bearer credential
/// implicitly; the orchestrator never sees raw credentials.
pub trait IngestTransport: Send + Sync {
    /// Cheap liveness check against the org.
    fn probe(&self) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + '_>>;

    /// Fetches the schema description for an object.
    fn describe<'a>(
        &'a self,
        object: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectDescribe, AppError>> + Send + 'a>>;

    /// Creates an ingest job; returns the job id.
    fn create_ingest_job(
        &self,
        req: CreateIngestJobRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + '_>>;

    /// Uploads the CSV payload as the job's content body.
    fn upload_job_data<'a>(
        &'a self,
        job_id: &'a str,
        payload: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Transitions the job to `UploadComplete`.
    fn close_job<'a>(
        &'a self,
        job_id: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Fetches the job's current status.
    fn get_job_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<BulkIngestJobInfo, AppError>> + Send + 'a>>;

    /// Downloads the accepted-records result set as CSV text.
    fn get_successful_results<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>>;

    /// Downloads the rejected-records result set as CSV text.
    fn get_failed_results<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>>;
}

impl IngestTransport for BulkIngestClient {
    fn probe(&self) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + '_>> {
        Box::pin(self.connection().probe())
    }

    fn describe<'a>(
        &'a self,
        object: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectDescribe, AppError>> + Send + 'a>> {
        Box::pin(self.connection().describe(object))
    }

    fn create_ingest_job(
        &self,
        req: CreateIngestJobRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + '_>> {
        Box::pin(async move { BulkIngestClient::create_ingest_job(self, &req).await })
    }

    fn upload_job_data<'a>(
        &'a self,
        job_id: &'a str,
        payload: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(BulkIngestClient::upload_job_data(self, job_id, payload, timeout))
    }

    fn close_job<'a>(
        &'a self,
        job_id: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(BulkIngestClient::close_job(self, job_id, timeout))
    }

    fn get_job_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<BulkIngestJobInfo, AppError>> + Send + 'a>> {
        Box::pin(BulkIngestClient::get_job_status(self, job_id))
    }

    fn get_successful_results<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>> {
        Box::pin(BulkIngestClient::get_successful_results(self, job_id))
    }

    fn get_failed_results<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>> {
        Box::pin(BulkIngestClient::get_failed_results(self, job_id))
    }
}
