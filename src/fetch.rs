//! Fetching documents.
//!
//! Scrapers only see the [`Fetch`] trait. [`HttpFetcher`] is the production
//! implementation on top of `reqwest`; tests use an in-memory map.

use crate::error::ScrapeError;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};
use url::Url;

/// Default cap on response bodies.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// A fetched document and its transfer statistics.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: String,
    /// Bytes received over the wire.
    pub bytes: usize,
    pub elapsed: Duration,
}

/// Something that can GET a URL.
pub trait Fetch {
    /// Fetch `url`. A pure read as far as callers are concerned.
    async fn fetch(&self, url: &Url) -> Result<Fetched, ScrapeError>;
}

/// HTTP GET via a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Build a client with the given user agent and request timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            max_body_bytes: MAX_BODY_BYTES,
        })
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    fn too_large(&self, url: &Url, size: impl std::fmt::Display) -> ScrapeError {
        ScrapeError::Fetch {
            url: url.to_string(),
            message: format!("body of {} bytes exceeds {}", size, self.max_body_bytes),
        }
    }
}

impl Fetch for HttpFetcher {
    /// Reads the body chunk by chunk and gives up as soon as it passes the
    /// cap. The body is decoded by the charset of its `Content-Type`.
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<Fetched, ScrapeError> {
        let t0 = Instant::now();
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        if let Some(len) = response.content_length().filter(|len| *len > self.max_body_bytes as u64) {
            return Err(self.too_large(url, len));
        }
        let charset = charset(response.headers());

        let mut buf = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if buf.len() + chunk.len() > self.max_body_bytes {
                return Err(self.too_large(url, format!("more than {}", buf.len() + chunk.len())));
            }
            buf.extend_from_slice(&chunk);
        }
        let elapsed = t0.elapsed();
        info!(bytes = buf.len(), millis = elapsed.as_millis() as u64, %url, "GET");
        Ok(Fetched {
            body: decode_body(charset.as_deref(), &buf),
            bytes: buf.len(),
            elapsed,
        })
    }
}

/// `charset` parameter of the `Content-Type` header.
fn charset(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Decode `bytes` in `charset`, UTF-8 when absent or unknown. A byte order
/// mark wins over the label.
pub fn decode_body(charset: Option<&str>, bytes: &[u8]) -> String {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(encoding = used.name(), "Replaced malformed byte sequences");
    }
    text.into_owned()
}
