//! HTTP fetch capability used by the downloader.
//!
//! A [`SessionProvider`] hands out one [`HttpFetch`] session per download
//! worker. The reqwest implementation gives every session its own client, so
//! a worker keeps its pooled connections and its request headers for all of
//! its jobs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use rand::seq::IndexedRandom;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Error types for HTTP fetches
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Body read error: {0}")]
    Body(String),

    #[error("Client error: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether repeating the request may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::Client(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_builder() {
            FetchError::Client(err.to_string())
        } else if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Connect(err.to_string())
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Response body as a stream of chunks.
pub type ByteStream = BoxStream<'static, FetchResult<Vec<u8>>>;

/// Status line and streaming body of a GET.
pub struct FetchResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// One HTTP session.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str) -> FetchResult<FetchResponse>;
}

/// Opens sessions for download workers.
pub trait SessionProvider: Send + Sync {
    fn open_session(&self) -> FetchResult<Box<dyn HttpFetch>>;
}

const DEFAULT_USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

const DEFAULT_ACCEPT_LANGUAGES: [&str; 4] = [
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9,en-US;q=0.8",
    "zh-TW,zh;q=0.9,en-US;q=0.8,en;q=0.7",
    "ja-JP,ja;q=0.9,en-US;q=0.8,en;q=0.7",
];

const MEDIA_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,video/*,*/*;q=0.8";

/// Pools the per-session user agent and accept-language are drawn from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderProfiles {
    pub user_agents: Vec<String>,
    pub accept_languages: Vec<String>,
}

impl Default for HeaderProfiles {
    fn default() -> Self {
        Self {
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            accept_languages: DEFAULT_ACCEPT_LANGUAGES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HeaderProfiles {
    /// Browser-like headers with a randomly chosen user agent and language.
    ///
    /// Empty pools fall back to the built-in defaults.
    pub fn random_headers(&self) -> FetchResult<HeaderMap> {
        let mut rng = rand::rng();
        let user_agent = self
            .user_agents
            .choose(&mut rng)
            .map(String::as_str)
            .or_else(|| DEFAULT_USER_AGENTS.choose(&mut rng).copied())
            .unwrap_or(DEFAULT_USER_AGENTS[0]);
        let language = self
            .accept_languages
            .choose(&mut rng)
            .map(String::as_str)
            .or_else(|| DEFAULT_ACCEPT_LANGUAGES.choose(&mut rng).copied())
            .unwrap_or(DEFAULT_ACCEPT_LANGUAGES[0]);

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(user_agent)?);
        headers.insert(ACCEPT_LANGUAGE, header_value(language)?);
        headers.insert(ACCEPT, HeaderValue::from_static(MEDIA_ACCEPT));
        let fixed = [
            ("sec-fetch-dest", "image"),
            ("sec-fetch-mode", "no-cors"),
            ("sec-fetch-site", "cross-site"),
            ("sec-ch-ua", "\"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\""),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"Windows\""),
            ("dnt", "1"),
            ("cache-control", "no-cache"),
            ("pragma", "no-cache"),
        ];
        for (name, value) in fixed {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        Ok(headers)
    }
}

fn header_value(value: &str) -> FetchResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| FetchError::Client(format!("invalid header value {value:?}: {e}")))
}

/// Transport settings of a reqwest session.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub tcp_keepalive: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            pool_max_idle_per_host: 20,
            pool_idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(60),
        }
    }
}

/// Session provider backed by one reqwest client per session.
#[derive(Debug, Clone, Default)]
pub struct ReqwestSessionProvider {
    config: HttpConfig,
    profiles: HeaderProfiles,
}

impl ReqwestSessionProvider {
    pub fn new(config: HttpConfig, profiles: HeaderProfiles) -> Self {
        Self { config, profiles }
    }

    fn build_client(&self) -> FetchResult<Client> {
        let headers = self.profiles.random_headers()?;
        Client::builder()
            .default_headers(headers)
            .connect_timeout(self.config.connect_timeout)
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .pool_idle_timeout(self.config.pool_idle_timeout)
            .tcp_keepalive(self.config.tcp_keepalive)
            .tcp_nodelay(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))
    }
}

impl SessionProvider for ReqwestSessionProvider {
    fn open_session(&self) -> FetchResult<Box<dyn HttpFetch>> {
        let client = self.build_client()?;
        debug!("Opened HTTP session");
        Ok(Box::new(ReqwestSession { client }))
    }
}

struct ReqwestSession {
    client: Client,
}

#[async_trait]
impl HttpFetch for ReqwestSession {
    async fn get(&self, url: &str) -> FetchResult<FetchResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(FetchError::from))
            .boxed();
        Ok(FetchResponse { status, body })
    }
}
