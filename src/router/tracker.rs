//! HTTP client for the remote vehicle-tracking service.

use serde::Deserialize;
use std::future::Future;
use tracing::debug;

/// Request timeout. A slow tracker is treated the same as a failed one.
const LOOKUP_TIMEOUT_SECS: u64 = 10;

/// Structured record returned by the tracking service. Every field is
/// optional; the resolver fills in the gaps.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackedVehicle {
    pub make: Option<String>,
    pub model: Option<String>,
    pub current_location: Option<String>,
    pub next_stop: Option<String>,
    pub departure: Option<String>,
    pub arrival: Option<String>,
}

/// Remote lookup seam. `Ok(None)` means the backend knows nothing about
/// this VIN; any I/O, timeout, or protocol error is `Err`.
pub trait Tracker: Send + Sync {
    fn lookup(
        &self,
        vin: &str,
    ) -> impl Future<Output = Result<Option<TrackedVehicle>, String>> + Send;
}

pub struct TrackerClient {
    endpoint: String,
    api_token: String,
    client: reqwest::Client,
}

impl TrackerClient {
    pub fn new(endpoint: String, api_token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_token,
            client,
        }
    }
}

impl Tracker for TrackerClient {
    async fn lookup(&self, vin: &str) -> Result<Option<TrackedVehicle>, String> {
        let url = format!("{}/vehicles/{}", self.endpoint, vin);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("Tracker has no record for {vin}");
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {e}"))?;

        if !status.is_success() {
            return Err(format!("Tracker error {status}: {body}"));
        }

        let vehicle: TrackedVehicle =
            serde_json::from_str(&body).map_err(|e| format!("Failed to parse response: {e}"))?;

        debug!("Tracker hit for {vin}");
        Ok(Some(vehicle))
    }
}
