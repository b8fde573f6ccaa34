//! Gradient computation service.

use async_trait::async_trait;
use market_map_gradient_models::GradientRequest;

use crate::GradientError;

/// Backend that runs the spatial comparison for a gradient request.
///
/// Implementations return the raw response body; parsing and validation
/// of its groups happen in the engine.
#[async_trait]
pub trait GradientService: Send + Sync {
    /// Sends `request` and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns [`GradientError`] if the request fails.
    async fn compute(&self, request: &GradientRequest) -> Result<serde_json::Value, GradientError>;
}

/// [`GradientService`] that POSTs the request as JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpGradientService {
    client: reqwest::Client,
    url: String,
}

impl HttpGradientService {
    /// Creates a service posting to `url` with a fresh client.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Creates a service posting to `url` through an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Endpoint requests are sent to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl GradientService for HttpGradientService {
    async fn compute(&self, request: &GradientRequest) -> Result<serde_json::Value, GradientError> {
        log::debug!("POST {} for layer '{}'", self.url, request.change_lyr_id);

        let resp = self.client.post(&self.url).json(request).send().await?;

        if !resp.status().is_success() {
            return Err(GradientError::MalformedResponse {
                message: format!("gradient service returned status {}", resp.status()),
            });
        }

        Ok(resp.json().await?)
    }
}
