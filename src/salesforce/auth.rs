//! Org credential resolution.
//!
//! The loader never runs an OAuth flow of its own. Credentials come from one
//! of two providers, tried in the order the user asked for:
//!
//! - the locally installed Salesforce CLI (`sf org display --json`), located
//!   on PATH via `which` and run as a subprocess
//! - the `SFBULK_INSTANCE_URL` / `SFBULK_ACCESS_TOKEN` environment variables
//!
//! Whatever the source, the result is an [`OrgCredentials`] value: bearer
//! token, instance URL, and API version. The token is wrapped in
//! `SecretString` so it cannot leak through `Debug` or logging.

use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::AppError;
use crate::salesforce::DEFAULT_API_VERSION;

/// Environment variable names for the explicit credential provider.
const ENV_INSTANCE_URL: &str = "SFBULK_INSTANCE_URL";
const ENV_ACCESS_TOKEN: &str = "SFBULK_ACCESS_TOKEN";
const ENV_API_VERSION: &str = "SFBULK_API_VERSION";

// ─────────────────────────────────────────────────────────────────────────────
// OrgCredentials
// ─────────────────────────────────────────────────────────────────────────────

/// Credentials for one Salesforce org.
#[derive(Clone)]
pub struct OrgCredentials {
    /// Instance URL (e.g., "https://na1.salesforce.com").
    pub instance_url: Url,
    /// Bearer token (wrapped for security).
    pub access_token: SecretString,
    /// API version with leading "v" (e.g., "v61.0").
    pub api_version: String,
}

impl std::fmt::Debug for OrgCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrgCredentials")
            .field("instance_url", &self.instance_url.as_str())
            .field("access_token", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// sf CLI provider
// ─────────────────────────────────────────────────────────────────────────────

/// Shape of `sf org display --json` output (only the fields we read).
#[derive(Debug, Deserialize)]
struct SfCliEnvelope {
    status: i64,
    result: Option<SfCliOrgInfo>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SfCliOrgInfo {
    access_token: String,
    instance_url: String,
    /// Reported without the leading "v" (e.g., "61.0").
    api_version: Option<String>,
}

/// Resolves credentials by shelling out to the Salesforce CLI.
///
/// # Arguments
///
/// * `org` - Optional org alias or username to pass as `--target-org`
///
/// # Errors
///
/// - `AppError::Auth` - CLI not installed, exited non-zero, or reported no org
/// - `AppError::Internal` - unparseable CLI output
pub async fn from_sf_cli(org: Option<&str>) -> Result<OrgCredentials, AppError> {
    let sf = which::which("sf")
        .map_err(|_| AppError::Auth("Salesforce CLI (sf) not found on PATH".to_string()))?;
    debug!("using Salesforce CLI at {}", sf.display());

    let mut cmd = tokio::process::Command::new(sf);
    cmd.arg("org").arg("display").arg("--json");
    if let Some(alias) = org {
        cmd.arg("--target-org").arg(alias);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| AppError::Auth(format!("failed to run sf CLI: {}", e)))?;

    // The CLI writes its JSON envelope to stdout even on failure.
    parse_sf_cli_output(&output.stdout)
}

/// Parses the JSON envelope printed by `sf org display --json`.
fn parse_sf_cli_output(stdout: &[u8]) -> Result<OrgCredentials, AppError> {
    let envelope: SfCliEnvelope = serde_json::from_slice(stdout)
        .map_err(|e| AppError::Internal(format!("unexpected sf CLI output: {}", e)))?;

    if envelope.status != 0 {
        return Err(AppError::Auth(
            envelope
                .message
                .unwrap_or_else(|| "sf org display failed; run `sf org login web` first".into()),
        ));
    }

    let info = envelope
        .result
        .ok_or_else(|| AppError::Auth("sf org display returned no org info".to_string()))?;

    let instance_url = Url::parse(&info.instance_url)
        .map_err(|e| AppError::Internal(format!("bad instance URL from sf CLI: {}", e)))?;

    let api_version = match info.api_version {
        Some(v) if v.starts_with('v') => v,
        Some(v) => format!("v{}", v),
        None => DEFAULT_API_VERSION.to_string(),
    };

    info!("resolved credentials from sf CLI for {}", instance_url);
    Ok(OrgCredentials {
        instance_url,
        access_token: SecretString::new(info.access_token),
        api_version,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Environment provider
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves credentials from environment variables.
///
/// Returns `Ok(None)` when the variables are not set, so callers can fall
/// through to the sf CLI provider.
pub fn from_env() -> Result<Option<OrgCredentials>, AppError> {
    let (url, token) = match (
        std::env::var(ENV_INSTANCE_URL),
        std::env::var(ENV_ACCESS_TOKEN),
    ) {
        (Ok(url), Ok(token)) => (url, token),
        _ => return Ok(None),
    };

    let instance_url = Url::parse(&url)
        .map_err(|e| AppError::Auth(format!("bad {}: {}", ENV_INSTANCE_URL, e)))?;
    let api_version =
        std::env::var(ENV_API_VERSION).unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());

    info!("resolved credentials from environment for {}", instance_url);
    Ok(Some(OrgCredentials {
        instance_url,
        access_token: SecretString::new(token),
        api_version,
    }))
}

/// Resolves credentials: environment first, then the sf CLI.
pub async fn resolve(org: Option<&str>) -> Result<OrgCredentials, AppError> {
    if let Some(creds) = from_env()? {
        return Ok(creds);
    }
    from_sf_cli(org).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_successful_cli_output() {
        let out = br#"{
            "status": 0,
            "result": {
                "accessToken": "00Dxx!secret",
                "instanceUrl": "https://na1.salesforce.com",
                "apiVersion": "61.0",
                "username": "user@example.com"
            }
        }"#;

        let creds = parse_sf_cli_output(out).unwrap();
        assert_eq!(creds.instance_url.as_str(), "https://na1.salesforce.com/");
        assert_eq!(creds.api_version, "v61.0");
    }

    #[test]
    fn keeps_version_prefix_when_already_present() {
        let out = br#"{
            "status": 0,
            "result": {
                "accessToken": "tok",
                "instanceUrl": "https://na1.salesforce.com",
                "apiVersion": "v60.0"
            }
        }"#;

        let creds = parse_sf_cli_output(out).unwrap();
        assert_eq!(creds.api_version, "v60.0");
    }

    #[test]
    fn defaults_api_version_when_missing() {
        let out = br#"{
            "status": 0,
            "result": {
                "accessToken": "tok",
                "instanceUrl": "https://na1.salesforce.com"
            }
        }"#;

        let creds = parse_sf_cli_output(out).unwrap();
        assert_eq!(creds.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn nonzero_status_maps_to_auth_error() {
        let out = br#"{"status": 1, "message": "No authorized orgs found"}"#;

        match parse_sf_cli_output(out) {
            Err(AppError::Auth(msg)) => assert!(msg.contains("No authorized orgs")),
            other => panic!("expected Auth error, got {:?}", other),
        }
    }

    #[test]
    fn garbage_output_maps_to_internal_error() {
        match parse_sf_cli_output(b"not json at all") {
            Err(AppError::Internal(_)) => {}
            other => panic!("expected Internal error, got {:?}", other),
        }
    }

    #[test]
    fn debug_never_prints_token() {
        let creds = OrgCredentials {
            instance_url: Url::parse("https://na1.salesforce.com").unwrap(),
            access_token: SecretString::new("super-secret".to_string()),
            api_version: "v61.0".to_string(),
        };
        let dbg = format!("{:?}", creds);
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
