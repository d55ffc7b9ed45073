//! ARM Client
//!
//! Main client for the Azure Resource Manager control plane, combining
//! authentication and HTTP functionality.

use super::auth::ArmCredentials;
use super::http::{ArmHttpClient, RawResponse};
use crate::error::{ApplyError, PollingError};
use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

/// Public Azure cloud endpoint
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    pub credentials: ArmCredentials,
    pub http: ArmHttpClient,
    endpoint: Url,
}

impl ArmClient {
    /// Create a client for the public Azure cloud
    pub fn new(credentials: ArmCredentials) -> Result<Self> {
        Self::with_endpoint(credentials, DEFAULT_ENDPOINT)
    }

    /// Create a client for another cloud or a test server
    pub fn with_endpoint(credentials: ArmCredentials, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid ARM endpoint '{}'", endpoint))?;
        let http = ArmHttpClient::new().context("Failed to create HTTP client")?;

        Ok(Self {
            credentials,
            http,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `<endpoint><resource_id>?api-version=<api_version>`
    pub fn resource_url(&self, resource_id: &str, api_version: &str) -> Result<Url, ApplyError> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        let raw = format!("{base}{resource_id}");
        let mut url = match Url::parse(&raw) {
            Ok(url) => url,
            Err(source) => return Err(ApplyError::InvalidUrl { url: raw, source }),
        };
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    /// Create or update a resource
    pub async fn put(&self, url: &Url, body: &Value) -> Result<RawResponse, ApplyError> {
        let token = self
            .credentials
            .get_token()
            .await
            .map_err(ApplyError::Credential)?;

        self.http
            .put_json(url.as_str(), &token, body)
            .await
            .map_err(|source| ApplyError::Transport {
                url: url.to_string(),
                source,
            })
    }

    /// GET an absolute URL, such as an operation status monitor
    pub async fn get(&self, url: &str) -> Result<RawResponse, PollingError> {
        let token = self
            .credentials
            .get_token()
            .await
            .map_err(PollingError::Credential)?;

        self.http
            .get(url, &token)
            .await
            .map_err(|source| PollingError::Transport {
                url: url.to_string(),
                source,
            })
    }
}
