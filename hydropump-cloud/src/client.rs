//! HTTP client for the pump document data API.

use crate::config::CloudConfig;
use crate::error::{CloudError, Result};
use crate::types::{FindOneResponse, RemoteConfig};
use std::time::Duration;
use tracing::{debug, trace};

/// Longest response excerpt kept in [`CloudError::Status`] messages.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Fetches pump documents from the configured data API.
///
/// Cheap to share behind an `Arc`; the inner [`reqwest::Client`] pools
/// connections across pumps.
///
/// # Example
///
/// ```rust,no_run
/// use hydropump_cloud::{CloudConfig, DataApiClient};
///
/// # async fn example() -> hydropump_cloud::Result<()> {
/// let client = DataApiClient::new(CloudConfig::default())?;
/// let remote = client.fetch_config("#03").await?;
/// println!("pulse {} ms", remote.pulse_duration);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DataApiClient {
    config: CloudConfig,
    client: reqwest::Client,
}

impl DataApiClient {
    /// Build a client for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::Config`] if the configuration is invalid and
    /// [`CloudError::Http`] if the HTTP client cannot be constructed.
    pub fn new(config: CloudConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CloudError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    /// Fetch the document for one pump.
    ///
    /// # Errors
    ///
    /// - [`CloudError::Timeout`] / [`CloudError::Http`] on transport failure
    /// - [`CloudError::Status`] on a non-success response
    /// - [`CloudError::Parse`] if the body is not a pump document
    /// - [`CloudError::NotFound`] if the API has no document for `pump_code`
    pub async fn fetch_config(&self, pump_code: &str) -> Result<RemoteConfig> {
        let body = self.request_body(pump_code);
        trace!(pump = pump_code, "requesting pump document");

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&body);
        if !self.config.api_key.is_empty() {
            request = request.header("api-key", &self.config.api_key);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        let text = response.text().await.map_err(classify_reqwest_error)?;
        debug!(pump = pump_code, status = status.as_u16(), "data API responded");

        if !status.is_success() {
            let message = if text.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                text.chars().take(MAX_ERROR_BODY_CHARS).collect()
            };
            return Err(CloudError::Status {
                status: status.as_u16(),
                message,
            });
        }

        parse_find_one(pump_code, &text)
    }

    fn request_body(&self, pump_code: &str) -> serde_json::Value {
        let mut filter = serde_json::Map::new();
        filter.insert(
            self.config.filter_field.clone(),
            serde_json::Value::String(pump_code.to_owned()),
        );
        serde_json::json!({
            "dataSource": self.config.data_source,
            "database": self.config.database,
            "collection": self.config.collection,
            "filter": filter,
        })
    }
}

fn parse_find_one(pump_code: &str, body: &str) -> Result<RemoteConfig> {
    let envelope: FindOneResponse =
        serde_json::from_str(body).map_err(|e| CloudError::Parse(e.to_string()))?;
    envelope
        .document
        .ok_or_else(|| CloudError::NotFound(pump_code.to_owned()))
}

fn classify_reqwest_error(e: reqwest::Error) -> CloudError {
    if e.is_timeout() {
        CloudError::Timeout(e.to_string())
    } else {
        CloudError::Http(e.to_string())
    }
}
