//! Remote configuration seam.

use crate::error::Result;
use async_trait::async_trait;
use hydropump_cloud::{DataApiClient, RemoteConfig};

/// Fetches the irrigation document of one pump by code.
#[async_trait]
pub trait ConfigProvider: Send + Sync + 'static {
    /// Fetch the current remote configuration for `pump_code`.
    ///
    /// # Errors
    ///
    /// [`PumpError::Transport`](crate::PumpError::Transport) when the provider
    /// cannot be reached, [`PumpError::MalformedConfig`](crate::PumpError::MalformedConfig)
    /// when the document is missing or unusable.
    async fn fetch_config(&self, pump_code: &str) -> Result<RemoteConfig>;
}

#[async_trait]
impl ConfigProvider for DataApiClient {
    async fn fetch_config(&self, pump_code: &str) -> Result<RemoteConfig> {
        Ok(DataApiClient::fetch_config(self, pump_code).await?)
    }
}
