//! Authenticated Salesforce HTTP client: connection probe, object describe,
//! and the error-response mapping shared by every endpoint wrapper.
//!
//! # Security
//!
//! URLs are logged path-only (never query strings, which can carry session
//! material); tokens live in `SecretString` and are attached per-request.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::error::AppError;
use crate::salesforce::OrgCredentials;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all Salesforce API requests.
const CLIENT_USER_AGENT: &str = concat!("sfbulk/", env!("CARGO_PKG_VERSION"));

/// Connect timeout for the shared HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trivial read against a well-known object, used as a liveness probe.
const PROBE_SOQL: &str = "SELECT Id FROM Account LIMIT 1";

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Salesforce API error response entry. Errors arrive as a JSON array.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSalesforceError {
    message: String,
    error_code: String,
}

/// Minimal slice of a describe response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescribe {
    /// API name of the object.
    pub name: String,
    /// Human-readable label.
    #[serde(default)]
    pub label: String,
    /// Whether records can be created through the API.
    #[serde(default)]
    pub createable: bool,
    /// Whether records can be updated through the API.
    #[serde(default)]
    pub updateable: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// SalesforceClient
// ─────────────────────────────────────────────────────────────────────────────

/// Authenticated HTTP client for one Salesforce org.
///
/// One bulk load runs against exactly one org, so credentials are immutable
/// for the client's lifetime; there is no token refresh here.
#[derive(Clone)]
pub struct SalesforceClient {
    http: reqwest::Client,
    instance_url: Url,
    access_token: SecretString,
    api_version: String,
}

impl SalesforceClient {
    /// Creates a client from resolved org credentials.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(creds: OrgCredentials) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            instance_url: creds.instance_url,
            access_token: creds.access_token,
            api_version: creds.api_version,
        })
    }

    /// The underlying reqwest client, shared with endpoint wrappers.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The bearer token for request authentication.
    pub(crate) fn bearer(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// Builds an absolute URL under `/services/data/{version}/`.
    pub(crate) fn api_url(&self, suffix: &str) -> Result<Url, AppError> {
        let path = format!("/services/data/{}/{}", self.api_version, suffix);
        self.instance_url
            .join(&path)
            .map_err(|e| AppError::Internal(format!("failed to build URL for {}: {}", suffix, e)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pre-flight reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Cheap liveness check: one trivial query against a well-known object.
    ///
    /// # Errors
    ///
    /// `AppError::ConnectionFailed` for any failure, network or API; the probe
    /// exists only to distinguish "org unreachable" from later step errors.
    pub async fn probe(&self) -> Result<(), AppError> {
        let url = self.api_url("query")?;

        info!("GET /query (probe)");
        let response = self
            .http
            .get(url)
            .query(&[("q", PROBE_SOQL)])
            .bearer_auth(self.bearer())
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("probe request failed: {}", e)))?;

        let status = response.status();
        info!("GET /query (probe) -> {}", status.as_u16());

        if !status.is_success() {
            return Err(AppError::ConnectionFailed(format!(
                "probe returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }

    /// Fetches the schema description for an object.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` - no such object
    /// - `AppError::Salesforce` / `AppError::RateLimited` - API error
    /// - `AppError::ConnectionFailed` - network error
    pub async fn describe(&self, object: &str) -> Result<ObjectDescribe, AppError> {
        let url = self.api_url(&format!("sobjects/{}/describe", object))?;

        info!("GET /sobjects/{}/describe", object);
        let response = self
            .http
            .get(url)
            .bearer_auth(self.bearer())
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("describe request failed: {}", e)))?;

        let status = response.status();
        info!("GET /sobjects/{}/describe -> {}", object, status.as_u16());

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response.json().await.map_err(|e| {
            AppError::Salesforce(format!("failed to parse describe response: {}", e))
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling
// ─────────────────────────────────────────────────────────────────────────────

/// Maps a non-success response to an `AppError`, reading the Salesforce error
/// array body when present.
pub(crate) async fn parse_error_response(
    response: reqwest::Response,
    status: reqwest::StatusCode,
) -> AppError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        return AppError::NotFound("resource not found".to_string());
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("unable to read error body"));

    if let Ok(errors) = serde_json::from_str::<Vec<WireSalesforceError>>(&body) {
        if let Some(first) = errors.first() {
            if first.error_code == "REQUEST_LIMIT_EXCEEDED" {
                return AppError::RateLimited {
                    retry_after_secs: None,
                };
            }
            // Never echo a body that carries auth material.
            let detail = if crate::error::contains_sensitive(&first.message) {
                "message withheld (contains sensitive material)"
            } else {
                first.message.as_str()
            };
            return AppError::Salesforce(format!("[{}] {}", first.error_code, detail));
        }
    }

    AppError::Salesforce(format!(
        "HTTP {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("unknown error")
    ))
}

/// Shortens a record or job id for logging (first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    if id.len() > 8 {
        format!("{}...", &id[..8])
    } else {
        id.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(mock_url: &str) -> SalesforceClient {
        SalesforceClient::new(OrgCredentials {
            instance_url: Url::parse(mock_url).unwrap(),
            access_token: SecretString::new("test_token".to_string()),
            api_version: "v61.0".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn probe_succeeds_on_query_ok() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/services/data/v61.0/query"))
            .and(query_param("q", PROBE_SOQL))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalSize": 1, "done": true, "records": []
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        assert!(client.probe().await.is_ok());
    }

    #[tokio::test]
    async fn probe_maps_failure_to_connection_error() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/services/data/v61.0/query"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        match client.probe().await {
            Err(AppError::ConnectionFailed(msg)) => assert!(msg.contains("500")),
            other => panic!("expected ConnectionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn describe_parses_object_metadata() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/services/data/v61.0/sobjects/Contact/describe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Contact",
                "label": "Contact",
                "createable": true,
                "updateable": true,
                "fields": []
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let describe = client.describe("Contact").await.unwrap();
        assert_eq!(describe.name, "Contact");
        assert!(describe.createable);
    }

    #[tokio::test]
    async fn describe_unknown_object_is_not_found() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/services/data/v61.0/sobjects/Bogus__c/describe"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        match client.describe("Bogus__c").await {
            Err(AppError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_array_body_is_parsed() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        let error_body = serde_json::json!([{
            "errorCode": "INVALID_TYPE",
            "message": "sObject type 'Bogus' is not supported"
        }]);

        Mock::given(method("GET"))
            .and(path("/services/data/v61.0/sobjects/Bogus/describe"))
            .respond_with(ResponseTemplate::new(400).set_body_json(&error_body))
            .mount(&mock_server)
            .await;

        match client.describe("Bogus").await {
            Err(AppError::Salesforce(msg)) => {
                assert!(msg.contains("INVALID_TYPE"));
                assert!(msg.contains("not supported"));
            }
            other => panic!("expected Salesforce error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rate_limit_maps_with_retry_after() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/services/data/v61.0/sobjects/Account/describe"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&mock_server)
            .await;

        match client.describe("Account").await {
            Err(AppError::RateLimited { retry_after_secs }) => {
                assert_eq!(retry_after_secs, Some(30));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn redact_id_shortens_long_ids() {
        assert_eq!(redact_id("750xx000000001ABC"), "750xx000...");
        assert_eq!(redact_id("short"), "short");
    }
}
