//!
//! Gemini upstream client.
//!
//! Builds request URLs for the Generative Language API and sends the
//! translated bodies with the selected API key. Non-success answers are
//! returned as [`ProxyError::Upstream`] carrying the original status and body
//! so the server can pass them through unchanged.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// HTTP client bound to one Gemini endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    /** base URL without trailing slash */
    base_url: String,
    api_version: String,
}

///
/// Upstream operations addressed by URL suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Generate,
    StreamGenerate,
    BatchEmbed,
}

/* --- constants ------------------------------------------------------------------------------ */

/** header carrying the API key */
const API_KEY_HEADER: &str = "x-goog-api-key";

/** client identification header */
const API_CLIENT_HEADER: &str = "x-goog-api-client";

/* --- start of code -------------------------------------------------------------------------- */

impl Method {
    fn suffix(self) -> &'static str {
        match self {
            Method::Generate => ":generateContent",
            Method::StreamGenerate => ":streamGenerateContent?alt=sse",
            Method::BatchEmbed => ":batchEmbedContents",
        }
    }
}

impl GeminiClient {
    ///
    /// Create a client from the upstream configuration.
    ///
    /// # Arguments
    ///  * `config` - upstream section of the configuration
    ///
    /// # Returns
    ///  * Configured client
    ///  * `ProxyError::Http` if the HTTP client cannot be built
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProxyError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        })
    }

    /// URL of a model operation.
    pub fn model_url(&self, model: &str, method: Method) -> String {
        format!("{}/{}/models/{}{}", self.base_url, self.api_version, model, method.suffix())
    }

    /// URL of the model listing.
    pub fn models_url(&self) -> String {
        format!("{}/{}/models", self.base_url, self.api_version)
    }

    ///
    /// POST a JSON body to a model operation.
    ///
    /// # Arguments
    ///  * `model` - upstream model id
    ///  * `method` - operation to call
    ///  * `api_key` - key sent in `x-goog-api-key`
    ///  * `body` - request body
    ///
    /// # Returns
    ///  * successful response, body not yet read
    ///  * `ProxyError::Upstream` for non-success statuses
    ///  * `ProxyError::Transport` for network failures and timeouts
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        model: &str,
        method: Method,
        api_key: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let url = self.model_url(model, method);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .header(API_CLIENT_HEADER, client_header())
            .json(body)
            .send()
            .await?;

        check_status(response).await
    }

    /// POST and read the full response body.
    pub async fn post_bytes<B: Serialize + ?Sized>(
        &self,
        model: &str,
        method: Method,
        api_key: &str,
        body: &B,
    ) -> Result<Bytes> {
        Ok(self.post(model, method, api_key, body).await?.bytes().await?)
    }

    ///
    /// Fetch the upstream model listing.
    ///
    /// # Returns
    ///  * raw listing body
    pub async fn list_models(&self, api_key: &str) -> Result<Bytes> {
        let response = self
            .http
            .get(self.models_url())
            .header(API_KEY_HEADER, api_key)
            .header(API_CLIENT_HEADER, client_header())
            .send()
            .await?;

        Ok(check_status(response).await?.bytes().await?)
    }
}

/* --- utility functions ---------------------------------------------------------------------- */

fn client_header() -> String {
    format!("keyrelay/{}", env!("CARGO_PKG_VERSION"))
}

///
/// Turn a non-success response into [`ProxyError::Upstream`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to read Gemini error body for status {}: {}", status, e);
            String::new()
        }
    };
    error!("Gemini returned {}: {}", status, body);
    Err(ProxyError::Upstream { status: status.as_u16(), body })
}

/* --- tests ------------------------------------------------------------------------------- */
