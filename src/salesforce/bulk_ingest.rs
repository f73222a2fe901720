//! Bulk API v2 ingest endpoints.
//!
//! Wire-level wrappers for the five remote calls a bulk load needs: create a
//! job, upload the CSV body, close the job, poll status, and download the two
//! per-outcome result sets. Sequencing, timeouts-as-policy, and terminal-state
//! decisions live in [`crate::bulk::orchestrator`]; this module only speaks
//! HTTP.
//!
//! Raw CSV contents and auth headers are never logged; only method, path, and
//! status codes are.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::AppError;
use crate::salesforce::client::{parse_error_response, redact_id, SalesforceClient};
use crate::salesforce::BulkJobState;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Bulk ingest operation type.
///
/// Serialized lowercase to match the API ("insert", "update", "upsert",
/// "delete").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
    /// Insert new records.
    Insert,
    /// Update existing records by ID.
    Update,
    /// Insert or update records matched on an external ID field.
    Upsert,
    /// Delete records by ID.
    Delete,
}

impl std::fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BulkOperation::Insert => "insert",
            BulkOperation::Update => "update",
            BulkOperation::Upsert => "upsert",
            BulkOperation::Delete => "delete",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for BulkOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(BulkOperation::Insert),
            "update" => Ok(BulkOperation::Update),
            "upsert" => Ok(BulkOperation::Upsert),
            "delete" => Ok(BulkOperation::Delete),
            other => Err(format!(
                "unknown operation '{}' (expected insert, update, upsert, or delete)",
                other
            )),
        }
    }
}

/// Request body for creating an ingest job.
///
/// `external_id_field_name` skips serialization when `None` because the API
/// rejects a null value for it on non-upsert operations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIngestJobRequest {
    /// The object API name (e.g., "Account", "Contact").
    pub object: String,
    /// The operation to perform.
    pub operation: BulkOperation,
    /// External ID field name (required for upsert operations).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id_field_name: Option<String>,
    /// Always "CSV"; the only content type this client produces.
    pub content_type: &'static str,
    /// Line ending of the uploaded payload. Payloads are normalized to LF.
    pub line_ending: &'static str,
}

impl CreateIngestJobRequest {
    pub fn new(
        object: String,
        operation: BulkOperation,
        external_id_field_name: Option<String>,
    ) -> Self {
        Self {
            object,
            operation,
            external_id_field_name,
            content_type: "CSV",
            line_ending: "LF",
        }
    }
}

/// Status of a Bulk API v2 ingest job as reported by Salesforce.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIngestJobInfo {
    /// Unique identifier for the job.
    pub id: String,
    /// Current state of the job.
    pub state: BulkJobState,
    /// Number of records processed so far.
    #[serde(default, rename = "numberRecordsProcessed")]
    pub records_processed: Option<u64>,
    /// Number of records that failed processing.
    #[serde(default, rename = "numberRecordsFailed")]
    pub records_failed: Option<u64>,
    /// Remote-reported processing time in milliseconds.
    #[serde(default, rename = "totalProcessingTime")]
    pub total_processing_time_ms: Option<u64>,
    /// Error message if the job failed.
    #[serde(default)]
    pub error_message: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for transitioning job state (close).
#[derive(Debug, Serialize)]
struct UpdateJobStateRequest {
    state: &'static str,
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkIngestClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for Bulk API v2 ingest operations against one org.
#[derive(Clone)]
pub struct BulkIngestClient {
    client: SalesforceClient,
}

impl BulkIngestClient {
    /// Wraps an authenticated Salesforce client.
    pub fn new(client: SalesforceClient) -> Self {
        Self { client }
    }

    /// The wrapped connection client, for pre-flight reads.
    pub fn connection(&self) -> &SalesforceClient {
        &self.client
    }

    /// Creates a new bulk ingest job.
    ///
    /// # Returns
    ///
    /// The job ID. The job starts in state `Open`.
    ///
    /// # Errors
    ///
    /// - `AppError::Salesforce` - the endpoint rejected the spec (e.g., an
    ///   unsupported operation/object combination)
    /// - `AppError::RateLimited` - rate limit exceeded
    /// - `AppError::ConnectionFailed` - network error
    pub async fn create_ingest_job(
        &self,
        req: &CreateIngestJobRequest,
    ) -> Result<String, AppError> {
        let url = self.jobs_url(None)?;

        info!(
            "POST /jobs/ingest (creating {} job for {})",
            req.operation, req.object
        );

        let response = self
            .client
            .http()
            .post(url)
            .bearer_auth(self.client.bearer())
            .json(req)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("job creation failed: {}", e)))?;

        let status = response.status();
        info!("POST /jobs/ingest -> {}", status.as_u16());

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        let job_info: BulkIngestJobInfo = response.json().await.map_err(|e| {
            AppError::Salesforce(format!("failed to parse job creation response: {}", e))
        })?;

        Ok(job_info.id)
    }

    /// Uploads the CSV payload as the job's content body.
    ///
    /// The payload is sent verbatim; a long `timeout` should be supplied for
    /// large payloads.
    ///
    /// # Errors
    ///
    /// - `AppError::Salesforce` - API error
    /// - `AppError::ConnectionFailed` - network error or timeout
    pub async fn upload_job_data(
        &self,
        job_id: &str,
        payload: &str,
        timeout: Duration,
    ) -> Result<(), AppError> {
        let url = self.jobs_url(Some(&format!("{}/batches", job_id)))?;

        info!(
            "PUT /jobs/ingest/{}/batches ({} bytes)",
            redact_id(job_id),
            payload.len()
        );

        let response = self
            .client
            .http()
            .put(url)
            .bearer_auth(self.client.bearer())
            .header("Content-Type", "text/csv")
            .timeout(timeout)
            .body(payload.to_owned())
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("CSV upload failed: {}", e)))?;

        let status = response.status();
        info!(
            "PUT /jobs/ingest/{}/batches -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }
        Ok(())
    }

    /// Marks the upload complete so Salesforce starts processing.
    ///
    /// # Errors
    ///
    /// - `AppError::Salesforce` - API error
    /// - `AppError::ConnectionFailed` - network error or timeout
    pub async fn close_job(&self, job_id: &str, timeout: Duration) -> Result<(), AppError> {
        let url = self.jobs_url(Some(job_id))?;
        let body = UpdateJobStateRequest {
            state: "UploadComplete",
        };

        info!("PATCH /jobs/ingest/{} (closing)", redact_id(job_id));

        let response = self
            .client
            .http()
            .patch(url)
            .bearer_auth(self.client.bearer())
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("job close failed: {}", e)))?;

        let status = response.status();
        info!(
            "PATCH /jobs/ingest/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }
        Ok(())
    }

    /// Fetches the current status of a job.
    ///
    /// A `Failed` or `Aborted` state is returned as data, not as an error;
    /// whether it is fatal is the orchestrator's decision.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` - job does not exist
    /// - `AppError::Salesforce` - API error
    /// - `AppError::ConnectionFailed` - network error
    pub async fn get_job_status(&self, job_id: &str) -> Result<BulkIngestJobInfo, AppError> {
        let url = self.jobs_url(Some(job_id))?;

        let response = self
            .client
            .http()
            .get(url)
            .bearer_auth(self.client.bearer())
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("status check failed: {}", e)))?;

        let status = response.status();
        info!(
            "GET /jobs/ingest/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Salesforce(format!("failed to parse job status: {}", e)))
    }

    /// Downloads the accepted-records result set as CSV text.
    pub async fn get_successful_results(&self, job_id: &str) -> Result<String, AppError> {
        self.download_results(job_id, "successfulResults").await
    }

    /// Downloads the rejected-records result set as CSV text.
    pub async fn get_failed_results(&self, job_id: &str) -> Result<String, AppError> {
        self.download_results(job_id, "failedResults").await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn download_results(&self, job_id: &str, result_type: &str) -> Result<String, AppError> {
        let url = self.jobs_url(Some(&format!("{}/{}", job_id, result_type)))?;

        let response = self
            .client
            .http()
            .get(url)
            .bearer_auth(self.client.bearer())
            .send()
            .await
            .map_err(|e| {
                AppError::ConnectionFailed(format!("{} download failed: {}", result_type, e))
            })?;

        let status = response.status();
        info!(
            "GET /jobs/ingest/{}/{} -> {}",
            redact_id(job_id),
            result_type,
            status.as_u16()
        );

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        let body = response.text().await.map_err(|e| {
            AppError::ConnectionFailed(format!("error reading {} body: {}", result_type, e))
        })?;

        info!(
            "{} download complete for job {}: {} bytes",
            result_type,
            redact_id(job_id),
            body.len()
        );
        Ok(body)
    }

    /// Builds `/services/data/{v}/jobs/ingest[/{suffix}]`.
    fn jobs_url(&self, suffix: Option<&str>) -> Result<Url, AppError> {
        match suffix {
            Some(s) => self.client.api_url(&format!("jobs/ingest/{}", s)),
            None => self.client.api_url("jobs/ingest"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::salesforce::OrgCredentials;
    use secrecy::SecretString;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(mock_url: &str) -> BulkIngestClient {
        let client = SalesforceClient::new(OrgCredentials {
            instance_url: Url::parse(mock_url).unwrap(),
            access_token: SecretString::new("test_token".to_string()),
            api_version: "v61.0".to_string(),
        })
        .unwrap();
        BulkIngestClient::new(client)
    }

    #[tokio::test]
    async fn create_job_returns_id() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        let response_body = serde_json::json!({
            "id": "750xx000000001ABC",
            "state": "Open",
            "numberRecordsProcessed": 0,
            "numberRecordsFailed": 0
        });

        Mock::given(method("POST"))
            .and(path("/services/data/v61.0/jobs/ingest"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let req = CreateIngestJobRequest::new("Account".to_string(), BulkOperation::Insert, None);
        let job_id = client.create_ingest_job(&req).await.unwrap();
        assert_eq!(job_id, "750xx000000001ABC");
    }

    #[tokio::test]
    async fn create_job_body_omits_external_id_for_insert() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        let expected_body = serde_json::json!({
            "object": "Contact",
            "operation": "insert",
            "contentType": "CSV",
            "lineEnding": "LF"
        });

        Mock::given(method("POST"))
            .and(path("/services/data/v61.0/jobs/ingest"))
            .and(body_json(&expected_body))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "750xx000000002DEF",
                "state": "Open"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let req = CreateIngestJobRequest::new("Contact".to_string(), BulkOperation::Insert, None);
        assert!(client.create_ingest_job(&req).await.is_ok());
    }

    #[tokio::test]
    async fn create_upsert_job_includes_external_id() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        let expected_body = serde_json::json!({
            "object": "Contact",
            "operation": "upsert",
            "externalIdFieldName": "Email__c",
            "contentType": "CSV",
            "lineEnding": "LF"
        });

        Mock::given(method("POST"))
            .and(path("/services/data/v61.0/jobs/ingest"))
            .and(body_json(&expected_body))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "750xx000000003GHI",
                "state": "Open"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let req = CreateIngestJobRequest::new(
            "Contact".to_string(),
            BulkOperation::Upsert,
            Some("Email__c".to_string()),
        );
        assert!(client.create_ingest_job(&req).await.is_ok());
    }

    #[tokio::test]
    async fn upload_sends_payload_verbatim_as_csv() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        let payload = "Email__c,Name\na@x.com,Alice\n";

        Mock::given(method("PUT"))
            .and(path(
                "/services/data/v61.0/jobs/ingest/750xx000000001ABC/batches",
            ))
            .and(header("Content-Type", "text/csv"))
            .and(body_string(payload))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        client
            .upload_job_data("750xx000000001ABC", payload, Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn close_job_patches_upload_complete() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("PATCH"))
            .and(path("/services/data/v61.0/jobs/ingest/750xx000000001ABC"))
            .and(body_json(serde_json::json!({ "state": "UploadComplete" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "750xx000000001ABC",
                "state": "UploadComplete"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        client
            .close_job("750xx000000001ABC", Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn status_returns_failed_state_as_data() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/services/data/v61.0/jobs/ingest/750xx000000001ABC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "750xx000000001ABC",
                "state": "Failed",
                "numberRecordsProcessed": 0,
                "numberRecordsFailed": 0,
                "errorMessage": "InvalidBatch : Field name not found"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let info = client.get_job_status("750xx000000001ABC").await.unwrap();
        assert_eq!(info.state, BulkJobState::Failed);
        assert_eq!(info.records_processed, Some(0));
        assert!(info.error_message.unwrap().contains("InvalidBatch"));
    }

    #[tokio::test]
    async fn status_parses_counts_and_processing_time() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/services/data/v61.0/jobs/ingest/750xx000000001ABC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "750xx000000001ABC",
                "state": "JobComplete",
                "numberRecordsProcessed": 1000,
                "numberRecordsFailed": 5,
                "totalProcessingTime": 4200
            })))
            .mount(&mock_server)
            .await;

        let info = client.get_job_status("750xx000000001ABC").await.unwrap();
        assert_eq!(info.state, BulkJobState::JobComplete);
        assert_eq!(info.records_processed, Some(1000));
        assert_eq!(info.records_failed, Some(5));
        assert_eq!(info.total_processing_time_ms, Some(4200));
    }

    #[tokio::test]
    async fn result_downloads_return_raw_text() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        let success_csv = "sf__Id,sf__Created,Email__c,Name\n003xx1,true,a@x.com,Alice\n";
        let failed_csv = "sf__Id,sf__Error,Email__c,Name\n,REQUIRED_FIELD_MISSING,b@x.com,\n";

        Mock::given(method("GET"))
            .and(path(
                "/services/data/v61.0/jobs/ingest/750xx000000001ABC/successfulResults",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(success_csv))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path(
                "/services/data/v61.0/jobs/ingest/750xx000000001ABC/failedResults",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(failed_csv))
            .expect(1)
            .mount(&mock_server)
            .await;

        let ok = client
            .get_successful_results("750xx000000001ABC")
            .await
            .unwrap();
        let bad = client
            .get_failed_results("750xx000000001ABC")
            .await
            .unwrap();
        assert_eq!(ok, success_csv);
        assert_eq!(bad, failed_csv);
    }

    #[tokio::test]
    async fn create_job_maps_error_array() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        let error_body = serde_json::json!([{
            "errorCode": "INVALIDJOB",
            "message": "Unable to find object: Bogus__c"
        }]);

        Mock::given(method("POST"))
            .and(path("/services/data/v61.0/jobs/ingest"))
            .respond_with(ResponseTemplate::new(400).set_body_json(&error_body))
            .mount(&mock_server)
            .await;

        let req = CreateIngestJobRequest::new("Bogus__c".to_string(), BulkOperation::Insert, None);
        match client.create_ingest_job(&req).await {
            Err(AppError::Salesforce(msg)) => {
                assert!(msg.contains("INVALIDJOB"));
                assert!(msg.contains("Unable to find object"));
            }
            other => panic!("expected Salesforce error, got {:?}", other),
        }
    }

    #[test]
    fn operation_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&BulkOperation::Upsert).unwrap(),
            r#""upsert""#
        );
        assert_eq!(
            serde_json::to_string(&BulkOperation::Delete).unwrap(),
            r#""delete""#
        );
    }

    #[test]
    fn operation_parses_from_cli_text() {
        assert_eq!("Insert".parse::<BulkOperation>(), Ok(BulkOperation::Insert));
        assert_eq!("upsert".parse::<BulkOperation>(), Ok(BulkOperation::Upsert));
        assert!("merge".parse::<BulkOperation>().is_err());
    }
}
