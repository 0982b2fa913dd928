//! HTTP access to the signage backend.
//!
//! Every request of the player goes through [`Transport`]: the layout of a
//! screen, field content feeds, the screen status feed, and resource
//! preloads. The session only sees parsed documents and preload outcomes.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::EXPIRES;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use signage_proto::config::NetworkConfig;
use signage_proto::feed::{ContentFeed, ScreenLayout, StatusFeed};
use tracing::{debug, warn};

use crate::cache::PreloadOutcome;
use crate::error::{PlayerError, Result};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_layout(&self, url: &Url) -> Result<ScreenLayout>;
    async fn fetch_contents(&self, url: &Url) -> Result<ContentFeed>;
    async fn fetch_status(&self, url: &Url) -> Result<StatusFeed>;
    /// Fetch `url` in full and classify the response. Never fails: errors
    /// become [`PreloadOutcome::Failed`].
    async fn preload(&self, url: &Url) -> PreloadOutcome;
}

pub struct HttpTransport {
    client: Client,
    request_timeout: Option<Duration>,
    preload_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            // Backends sit behind SSO redirects; keep the cookie they hand out.
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10));
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            request_timeout: config.request_timeout(),
            preload_timeout: config.preload_timeout(),
        })
    }

    fn get(&self, url: &Url, timeout: Option<Duration>) -> reqwest::RequestBuilder {
        let request = self.client.get(url.clone());
        match timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let response = self.get(url, self.request_timeout).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(PlayerError::Unauthorized);
        }
        if !status.is_success() {
            return Err(PlayerError::Status {
                url: url.to_string(),
                status,
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| PlayerError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_layout(&self, url: &Url) -> Result<ScreenLayout> {
        self.get_json(url).await
    }

    async fn fetch_contents(&self, url: &Url) -> Result<ContentFeed> {
        self.get_json(url).await
    }

    async fn fetch_status(&self, url: &Url) -> Result<StatusFeed> {
        self.get_json(url).await
    }

    async fn preload(&self, url: &Url) -> PreloadOutcome {
        let response = match self.get(url, self.preload_timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%url, "preload failed: {}", e);
                return PreloadOutcome::Failed(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "preload rejected");
            return PreloadOutcome::Failed(status.to_string());
        }

        let has_expiry = response
            .headers()
            .get(EXPIRES)
            .map(|v| !v.as_bytes().is_empty())
            .unwrap_or(false);

        // Pull the whole body through so every cache on the way keeps it;
        // videos are large, so never buffer them in memory.
        let mut bytes = 0usize;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => bytes += chunk.len(),
                Err(e) => {
                    warn!(%url, bytes, "preload interrupted: {}", e);
                    return PreloadOutcome::Failed(e.to_string());
                }
            }
        }
        debug!(%url, bytes, has_expiry, "preload complete");

        if has_expiry {
            PreloadOutcome::Cached
        } else {
            PreloadOutcome::NoExpiryInfo
        }
    }
}

/// Resolve `reference` against `base`, the way a browser resolves a link on
/// the page found at `base`.
pub fn resolve_url(base: &Url, reference: &str) -> Result<Url> {
    base.join(reference).map_err(|e| PlayerError::InvalidUrl {
        url: reference.to_string(),
        reason: e.to_string(),
    })
}
