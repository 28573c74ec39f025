//! reqwest-backed reputation service.

use std::time::Duration;

use url::Url;

use crate::config::{endpoint, endpoint_url, GuardConfig};
use crate::error::{ConfigError, GuardError};
use crate::reputation::{BoxFuture, ReputationService};

/// Talks to the reputation service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpReputationService {
    client: reqwest::Client,
    base: Url,
}

impl HttpReputationService {
    /// Build a service for `base` with a per-request timeout.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, GuardError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client, base })
    }

    pub fn from_config(config: &GuardConfig) -> Result<Self, ConfigError> {
        let base = config.service_base()?;
        Self::new(base, config.request_timeout())
            .map_err(|_| ConfigError::InvalidBaseUrl(config.service_url.clone()))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, GuardError> {
        log::trace!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(GuardError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

impl ReputationService for HttpReputationService {
    fn insert_history<'a>(&'a self, hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>> {
        Box::pin(async move {
            let url = endpoint_url(&self.base, endpoint::INSERT_HISTORY, Some(hostname));
            let body = self.get(url).await?.bytes().await.map_err(map_reqwest_error)?;
            log::debug!("Insert history for {} returned {} bytes", hostname, body.len());
            Ok(())
        })
    }

    fn query_index(&self) -> BoxFuture<'_, Result<Vec<u8>, GuardError>> {
        Box::pin(async move {
            let url = endpoint_url(&self.base, endpoint::QUERY, None);
            let body = self.get(url).await?.bytes().await.map_err(map_reqwest_error)?;
            Ok(body.to_vec())
        })
    }

    fn lookup<'a>(&'a self, hostname: &'a str) -> BoxFuture<'a, Result<(), GuardError>> {
        Box::pin(async move {
            let url = endpoint_url(&self.base, endpoint::LOOKUP, Some(hostname));
            self.get(url).await?;
            Ok(())
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GuardError {
    if e.is_timeout() {
        GuardError::Timeout
    } else if let Some(status) = e.status() {
        GuardError::Status(status.as_u16())
    } else {
        GuardError::Network(e.to_string())
    }
}
