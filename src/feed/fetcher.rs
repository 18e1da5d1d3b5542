use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::article::Article;
use super::parser::{parse_feed, ParseError};
use crate::config::Config;
use crate::registry::FeedSource;

/// Browser-like User-Agent; some feed hosts reject obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

const MAX_REDIRECTS: usize = 3;

/// Failure of a single attempt through one intermediary.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Attempt exceeded the configured request timeout
    #[error("Request timed out")]
    Timeout,
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Proxy answered with a non-2xx status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Proxy answered, but reports that its own fetch of the feed failed
    #[error("Upstream feed returned status {0}")]
    UpstreamStatus(u16),
    /// Response body does not have the expected envelope shape
    #[error("Malformed proxy response: {0}")]
    MalformedEnvelope(String),
    /// Envelope parsed but carries no feed text
    #[error("Proxy returned an empty payload")]
    EmptyPayload,
    /// Response body exceeded the configured size cap
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Both intermediaries failed for one source.
#[derive(Debug, Error)]
#[error("Failed to fetch {source_label}: {reason}")]
pub struct FetchError {
    pub source_label: String,
    /// Failure of the last attempt (the fallback proxy).
    #[source]
    pub reason: ProxyError,
}

/// Per-source outcome of a fetch-and-parse pass.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Response shape of an intermediary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Envelope {
    /// JSON object whose `contents` field holds the feed text, with an
    /// optional `status.http_code` for the proxied request.
    JsonContents,
    /// Body is the feed text itself.
    Raw,
}

/// One intermediary: the feed URL is url-encoded and appended to `base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub base_url: String,
    pub envelope: Envelope,
}

impl ProxyConfig {
    pub fn new(base_url: impl Into<String>, envelope: Envelope) -> Self {
        Self {
            base_url: base_url.into(),
            envelope,
        }
    }

    /// api.allorigins.win, JSON envelope.
    pub fn allorigins() -> Self {
        Self::new("https://api.allorigins.win/get?url=", Envelope::JsonContents)
    }

    /// corsproxy.io, raw body.
    pub fn corsproxy() -> Self {
        Self::new("https://corsproxy.io/?url=", Envelope::Raw)
    }

    /// `<base_url><url-encoded feed URL>`
    pub fn request_url(&self, feed_url: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(feed_url.as_bytes()).collect();
        format!("{}{}", self.base_url, encoded)
    }
}

#[derive(Deserialize)]
struct ContentsEnvelope {
    contents: Option<String>,
    #[serde(default)]
    status: Option<EnvelopeStatus>,
}

#[derive(Deserialize)]
struct EnvelopeStatus {
    http_code: Option<u16>,
}

impl Envelope {
    /// Normalises a response body to the raw feed text.
    fn extract(self, body: &[u8]) -> Result<String, ProxyError> {
        let text = match self {
            Envelope::Raw => String::from_utf8_lossy(body).into_owned(),
            Envelope::JsonContents => {
                let envelope: ContentsEnvelope = serde_json::from_slice(body)
                    .map_err(|e| ProxyError::MalformedEnvelope(e.to_string()))?;
                if let Some(code) = envelope.status.and_then(|s| s.http_code) {
                    if !(200..300).contains(&code) {
                        return Err(ProxyError::UpstreamStatus(code));
                    }
                }
                envelope.contents.ok_or_else(|| {
                    ProxyError::MalformedEnvelope("missing `contents` field".to_string())
                })?
            }
        };

        if text.trim().is_empty() {
            return Err(ProxyError::EmptyPayload);
        }
        Ok(text)
    }
}

/// Builds the shared HTTP client used for every proxy attempt.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect_policy())
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }
        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }
        tracing::debug!(to = %url, hop = attempt.previous().len() + 1, "Following redirect");
        attempt.follow()
    })
}

/// Fetches feed text through a primary intermediary with one fallback.
///
/// Each call is independent: no caching, no backoff. The orchestrator
/// retries on its next cycle.
#[derive(Debug, Clone)]
pub struct ProxyFetcher {
    client: reqwest::Client,
    primary: ProxyConfig,
    fallback: ProxyConfig,
    timeout: Duration,
    max_bytes: usize,
}

impl ProxyFetcher {
    pub fn new(
        client: reqwest::Client,
        primary: ProxyConfig,
        fallback: ProxyConfig,
        timeout: Duration,
        max_bytes: usize,
    ) -> Self {
        Self {
            client,
            primary,
            fallback,
            timeout,
            max_bytes,
        }
    }

    /// Fetcher wired from configuration with a fresh HTTP client.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            build_http_client()?,
            config.primary_proxy.clone(),
            config.fallback_proxy.clone(),
            config.request_timeout(),
            config.max_feed_bytes,
        ))
    }

    /// Raw feed text for `source`, trying the primary proxy then the fallback.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] naming the source when both attempts fail; it
    /// carries the fallback's failure reason.
    pub async fn fetch_text(&self, source: &FeedSource) -> Result<String, FetchError> {
        match self.attempt(&self.primary, &source.url).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                tracing::warn!(
                    source = %source.id,
                    proxy = %self.primary.base_url,
                    error = %e,
                    "Primary proxy failed, trying fallback"
                );
            }
        }

        self.attempt(&self.fallback, &source.url)
            .await
            .map_err(|reason| FetchError {
                source_label: source.label.clone(),
                reason,
            })
    }

    /// Fetches and parses `source`. A parse failure does not trigger the
    /// fallback proxy; only transport and envelope failures do.
    pub async fn fetch_articles(
        &self,
        source: &FeedSource,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<Article>, SourceError> {
        let xml = self.fetch_text(source).await?;
        Ok(parse_feed(&xml, source, fetched_at)?)
    }

    async fn attempt(&self, proxy: &ProxyConfig, feed_url: &str) -> Result<String, ProxyError> {
        let request_url = proxy.request_url(feed_url);
        tokio::time::timeout(self.timeout, self.request(proxy, &request_url))
            .await
            .map_err(|_| ProxyError::Timeout)?
    }

    async fn request(&self, proxy: &ProxyConfig, request_url: &str) -> Result<String, ProxyError> {
        let response = self.client.get(request_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::HttpStatus(status.as_u16()));
        }

        let body = read_limited_bytes(response, self.max_bytes).await?;
        proxy.envelope.extract(&body)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ProxyError> {
    // Fast path: Content-Length already over the cap
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(ProxyError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ProxyError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
