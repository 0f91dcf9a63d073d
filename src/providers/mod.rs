//! Provider clients and the HTTP seam they share.
//!
//! Every client turns one provider's JSON into [`ImageRecord`]s. Network and
//! parse failures surface as [`ProviderError`] from `fetch_page`, but callers
//! in the session go through [`ProviderClient::fetch`], which logs the error
//! and degrades to an empty page.

pub mod nekos_moe;
pub mod waifu_im;
pub mod waifu_pics;
pub mod wallhaven;

use crate::record::{ImageRecord, Source};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {message}")]
    Json { url: String, message: String },
}

/// A single outgoing request. POST when a body is present, GET otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            body: Some(body),
            ..Default::default()
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn is_post(&self) -> bool {
        self.body.is_some()
    }

    /// First query parameter with this key
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Blocking HTTP boundary. Provider clients and the image cache only talk
/// to the network through this trait.
pub trait HttpTransport: Send + Sync {
    fn send_json(&self, request: &Request) -> Result<Value, ProviderError>;
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send_json(&self, request: &Request) -> Result<Value, ProviderError> {
        let mut builder = match &request.body {
            Some(body) => self.client.post(&request.url).json(body),
            None => self.client.get(&request.url),
        };
        builder = builder.query(&request.query);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        debug!(url = %request.url, query = ?request.query, post = request.is_post(), "provider request");

        let response = builder.send().map_err(|source| ProviderError::Http {
            url: request.url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let text = response.text().map_err(|source| ProviderError::Http {
            url: request.url.clone(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|e| ProviderError::Json {
            url: request.url.clone(),
            message: e.to_string(),
        })
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| ProviderError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().map_err(|source| ProviderError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

/// Coordinates of one page request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageQuery {
    /// 1-based
    pub page: u32,
    /// Server-side search text
    pub query: String,
    pub tag: String,
    /// Random-sort seed from an earlier page of the same listing
    pub seed: Option<String>,
}

#[cfg(test)]
impl PageQuery {
    pub fn first(query: &str, tag: &str) -> Self {
        Self {
            page: 1,
            query: query.to_string(),
            tag: tag.to_string(),
            seed: None,
        }
    }
}

/// One page of normalized results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<ImageRecord>,
    /// No further pages are available for this listing
    pub exhausted: bool,
    pub seed: Option<String>,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            exhausted: true,
            seed: None,
        }
    }
}

pub trait ProviderClient: Send + Sync {
    fn source(&self) -> Source;

    /// Fetch and normalize one page. Partial failures inside a multi-request
    /// page are absorbed here; only a failure of the whole page is an error.
    fn fetch_page(&self, query: &PageQuery) -> Result<Page, ProviderError>;

    /// Infallible boundary used by the session: errors become an empty page.
    fn fetch(&self, query: &PageQuery) -> Page {
        match self.fetch_page(query) {
            Ok(mut page) => {
                if page.records.is_empty() {
                    page.exhausted = true;
                }
                debug!(
                    source = %self.source(),
                    page = query.page,
                    count = page.records.len(),
                    exhausted = page.exhausted,
                    "page fetched"
                );
                page
            }
            Err(e) => {
                warn!(source = %self.source(), page = query.page, "fetch failed: {}", e);
                Page::empty()
            }
        }
    }
}

/// Client construction options, taken from the `[providers]` config section
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub wallhaven_api_key: Option<String>,
    pub wallhaven_sorting: String,
    pub waifu_im_delay: Duration,
}

/// Registry of clients keyed by source
#[derive(Clone, Default)]
pub struct Providers {
    clients: HashMap<Source, Arc<dyn ProviderClient>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four clients sharing one transport
    pub fn standard(transport: Arc<dyn HttpTransport>, settings: &ProviderSettings) -> Self {
        let mut providers = Self::new();
        providers.register(Arc::new(wallhaven::WallhavenClient::new(
            transport.clone(),
            settings.wallhaven_api_key.clone(),
            &settings.wallhaven_sorting,
        )));
        providers.register(Arc::new(waifu_im::WaifuImClient::new(
            transport.clone(),
            settings.waifu_im_delay,
        )));
        providers.register(Arc::new(waifu_pics::WaifuPicsClient::new(transport.clone())));
        providers.register(Arc::new(nekos_moe::NekosMoeClient::new(transport)));
        providers
    }

    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.source(), client);
    }

    pub fn get(&self, source: Source) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&source).cloned()
    }
}

/// Deserialize a typed response, mapping failures to [`ProviderError::Json`]
pub(crate) fn decode<T: serde::de::DeserializeOwned>(url: &str, value: Value) -> Result<T, ProviderError> {
    serde_json::from_value(value).map_err(|e| ProviderError::Json {
        url: url.to_string(),
        message: e.to_string(),
    })
}
