//! HTTP client for the device bridge.
//!
//! The bridge is the service that owns the device plugins. This module talks to
//! its REST API both to read spaces and devices and to write properties.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spaces_core::{Device, DeviceId, Space, SpaceId};

use crate::directory::SpaceDirectory;
use crate::error::{OrchestratorError, Result};
use crate::platform::{DevicePlatform, PropertyCommand};

/// HTTP client for the device bridge.
#[derive(Debug, Clone)]
pub struct HttpDeviceBridge {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDeviceBridge {
    /// Create a new bridge client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the bridge (e.g., "http://bridge:8080")
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Config` if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| OrchestratorError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a new bridge client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL of the bridge.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| OrchestratorError::Platform(format!("Bridge request failed: {e}")))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| OrchestratorError::Platform(format!("Failed to parse response: {e}")))
    }

    async fn error_from(response: reqwest::Response) -> OrchestratorError {
        let status = response.status();
        let error = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| format!("Bridge returned status {status}"));

        OrchestratorError::Platform(format!("Bridge error: {error}"))
    }
}

/// Request body for a property batch.
#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    commands: &'a [PropertyCommand],
}

/// Response body for a property batch.
#[derive(Debug, Deserialize)]
struct BatchResponse {
    success: bool,
}

/// Error response from the bridge.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[async_trait]
impl DevicePlatform for HttpDeviceBridge {
    async fn process_batch(&self, commands: &[PropertyCommand]) -> Result<bool> {
        let url = format!("{}/v1/properties/batch", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&BatchRequest { commands })
            .send()
            .await
            .map_err(|e| OrchestratorError::Platform(format!("Bridge request failed: {e}")))?;

        if response.status().is_success() {
            let body: BatchResponse = Self::parse(response).await?;
            tracing::debug!(
                commands = commands.len(),
                success = body.success,
                "Dispatched property batch"
            );
            Ok(body.success)
        } else {
            let status = response.status();
            let error = Self::error_from(response).await;

            tracing::error!(
                status = %status,
                error = %error,
                commands = commands.len(),
                "Failed to dispatch property batch"
            );

            Err(error)
        }
    }
}

#[async_trait]
impl SpaceDirectory for HttpDeviceBridge {
    async fn get_space(&self, space_id: &SpaceId) -> Result<Option<Space>> {
        let url = format!("{}/v1/spaces/{space_id}", self.base_url);
        let response = self.get(&url).await?;

        if response.status().is_success() {
            Self::parse(response).await.map(Some)
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn devices_in_space(&self, space_id: &SpaceId) -> Result<Vec<Device>> {
        let url = format!("{}/v1/spaces/{space_id}/devices", self.base_url);
        let response = self.get(&url).await?;

        if response.status().is_success() {
            Self::parse(response).await
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            Err(OrchestratorError::SpaceNotFound(*space_id))
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn devices_by_ids(&self, device_ids: &[DeviceId]) -> Result<Vec<Device>> {
        if device_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = device_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/v1/devices?ids={ids}", self.base_url);
        let response = self.get(&url).await?;

        if response.status().is_success() {
            Self::parse(response).await
        } else {
            Err(Self::error_from(response).await)
        }
    }
}
