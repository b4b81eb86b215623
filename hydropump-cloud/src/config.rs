//! Data API client configuration with sensible defaults.
//!
//! [`CloudConfig`] names the endpoint, the credentials and the collection
//! that holds one document per pump.

use crate::error::CloudError;
use serde::{Deserialize, Serialize};

/// Configuration for the remote schedule provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Full URL of the data API `findOne` action.
    pub endpoint: String,
    /// API key sent in the `api-key` header. Empty disables the header.
    pub api_key: String,
    /// Cluster name of the hosted database.
    pub data_source: String,
    /// Database that holds the pump documents.
    pub database: String,
    /// Collection that holds the pump documents.
    pub collection: String,
    /// Document field matched against the pump code.
    pub filter_field: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://data.mongodb-api.com/app/data-api/endpoint/data/v1/action/findOne"
                .to_owned(),
            api_key: String::new(),
            data_source: "Tomatoes".to_owned(),
            database: "first-api".to_owned(),
            collection: "sensors".to_owned(),
            filter_field: "pumperCode".to_owned(),
            timeout_seconds: 8,
        }
    }
}

impl CloudConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `endpoint` must be an absolute `http` or `https` URL
    /// - `timeout_seconds` must be greater than 0
    /// - `database`, `collection` and `filter_field` must not be empty
    pub fn validate(&self) -> Result<(), CloudError> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| CloudError::Config(format!("invalid endpoint: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CloudError::Config(format!(
                "endpoint scheme must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(CloudError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.database.is_empty() || self.collection.is_empty() {
            return Err(CloudError::Config(
                "database and collection must be set".into(),
            ));
        }
        if self.filter_field.is_empty() {
            return Err(CloudError::Config("filter_field must be set".into()));
        }
        Ok(())
    }
}
