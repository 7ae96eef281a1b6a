//! HTTP fetching with a body-size cap and charset-aware decoding.
//!
//! [`Fetcher`] is built once and shared by every check so connections are
//! pooled. A fetch fails before the body is read when the declared length is
//! over the cap, and while streaming when the body grows past it.

use std::sync::LazyLock;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use futures_util::StreamExt;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};

use super::constants::{
    CHARSET_SNIFF_BYTES, CONNECT_TIMEOUT_SECS, MAX_CONTENT_BYTES, REQUEST_TIMEOUT_SECS,
};
use super::error::CheckError;
use crate::model::HeaderMap;
use crate::user_agent;

static META_CHARSET: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_\-:.]+)"#).ok()
});

/// Timeouts and size cap for a [`Fetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetcherOptions {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Total request timeout, body included.
    pub request_timeout: Duration,
    /// Largest accepted body in bytes.
    pub max_content_bytes: u64,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            max_content_bytes: MAX_CONTENT_BYTES,
        }
    }
}

/// A fetched and decoded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Effective URL after redirects.
    pub url: String,
    /// Decoded body text.
    pub body: String,
}

/// Reusable HTTP client for page fetches.
///
/// # Example
///
/// ```no_run
/// use sitewatch_core::check::Fetcher;
/// use sitewatch_core::model::HeaderMap;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = Fetcher::new()?;
/// let page = fetcher.fetch("https://example.com/news", &HeaderMap::new()).await?;
/// println!("{} bytes from {}", page.body.len(), page.url);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_content_bytes: u64,
}

impl Fetcher {
    /// Creates a fetcher with default timeouts and size cap.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Transport`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, CheckError> {
        Self::with_options(FetcherOptions::default())
    }

    /// Creates a fetcher with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Transport`] if the HTTP client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_options(options: FetcherOptions) -> Result<Self, CheckError> {
        let client = Client::builder()
            .user_agent(user_agent::default_user_agent())
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .gzip(true)
            .build()
            .map_err(|e| CheckError::transport(&e))?;

        Ok(Self {
            client,
            max_content_bytes: options.max_content_bytes,
        })
    }

    /// Returns the configured body-size cap.
    #[must_use]
    pub fn max_content_bytes(&self) -> u64 {
        self.max_content_bytes
    }

    /// Fetches `url` with `headers` and returns the effective URL and decoded body.
    ///
    /// # Errors
    ///
    /// - [`CheckError::Transport`] for network failures, timeouts and invalid headers
    /// - [`CheckError::SizeLimitExceeded`] when the body is over the cap
    /// - [`CheckError::HttpStatus`] for any status other than 200
    #[instrument(skip(self, headers), fields(url = %url))]
    pub async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<FetchedPage, CheckError> {
        let request_headers = build_request_headers(headers)?;

        let response = self
            .client
            .get(url)
            .headers(request_headers)
            .send()
            .await
            .map_err(|e| {
                debug!(error = %e, "request failed");
                CheckError::transport(&e)
            })?;

        if let Some(declared) = response.content_length()
            && declared > self.max_content_bytes
        {
            debug!(declared, limit = self.max_content_bytes, "declared size over limit");
            return Err(CheckError::size_limit(self.max_content_bytes, declared));
        }

        let status = response.status();
        let effective_url = response.url().to_string();
        if status != StatusCode::OK {
            debug!(status = status.as_u16(), "unexpected status");
            return Err(CheckError::http_status(status, &effective_url));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let bytes = read_capped(response, self.max_content_bytes).await?;
        let body = decode_body(&bytes, content_type.as_deref());
        debug!(bytes = bytes.len(), effective_url = %effective_url, "page fetched");

        Ok(FetchedPage {
            url: effective_url,
            body,
        })
    }
}

fn build_request_headers(headers: &HeaderMap) -> Result<reqwest::header::HeaderMap, CheckError> {
    let mut request_headers = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            CheckError::transport_message(format!("invalid header name {name:?}: {e}"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            CheckError::transport_message(format!("invalid header value for {name:?}: {e}"))
        })?;
        request_headers.insert(header_name, header_value);
    }
    Ok(request_headers)
}

async fn read_capped(response: Response, limit: u64) -> Result<Vec<u8>, CheckError> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CheckError::transport(&e))?;
        let observed = (body.len() + chunk.len()) as u64;
        if observed > limit {
            debug!(observed, limit, "streamed size over limit");
            return Err(CheckError::size_limit(limit, observed));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

/// Decodes `bytes` to text.
///
/// Encoding is taken from the Content-Type charset, then a byte-order mark,
/// then a `<meta charset>` near the top of the document, else UTF-8.
/// Undecodable sequences become U+FFFD.
pub(crate) fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| Encoding::for_bom(bytes).map(|(encoding, _)| encoding))
        .or_else(|| sniff_meta_charset(bytes))
        .unwrap_or(UTF_8);

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(encoding = encoding.name(), "body had undecodable bytes");
    }
    text.into_owned()
}

fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\''))
            .filter(|label| !label.is_empty())
    })
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(CHARSET_SNIFF_BYTES)];
    let head = String::from_utf8_lossy(head);
    let regex = META_CHARSET.as_ref()?;
    let label = regex.captures(&head)?.get(1)?.as_str();
    Encoding::for_label(label.as_bytes())
}
