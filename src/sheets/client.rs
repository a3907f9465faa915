use crate::config::{Config, SourceConfig};
use crate::sheets::normalize::Cell;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_RETRIES: u32 = 3;
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Env var holding the Sheets API key; wins over the config file.
pub const API_KEY_ENV: &str = "GROCER_SHEETS_API_KEY";

/// Errors raised while retrieving the raw grid.
///
/// Any of these leaves the current catalog in place and surfaces as the
/// catalog's error status.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Sheets API request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Sheets API error: status {0}")]
    HttpStatus(u16),
    #[error("Sheets API request timed out")]
    Timeout,
    #[error("Sheets API rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Sheets API response too large")]
    ResponseTooLarge,
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body was not a `values` range
    #[error("Could not parse Sheets response: {0}")]
    Parse(String),
    #[error("Invalid Sheets base URL: {0}")]
    InvalidUrl(String),
    #[error("Insecure Sheets base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("No sheet configuration found for key: {0}")]
    UnknownSource(String),
}

/// Anything that can hand back a raw grid of cells.
///
/// [`SheetsClient`] is the production source; tests substitute in-memory
/// fakes.
pub trait GridSource {
    fn fetch_grid(&self) -> impl Future<Output = Result<Vec<Vec<Cell>>, IngestionError>> + Send;
}

/// Shape of a `spreadsheets.values.get` response. `values` is omitted by the
/// API when the range holds no data.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Option<Vec<Vec<Cell>>>,
}

/// Client for a single configured sheet range.
///
/// Cheap to clone: `reqwest::Client` is reference counted.
#[derive(Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    url: Url,
    api_key: Option<SecretString>,
    timeout: Duration,
    backoff_base: Duration,
}

impl std::fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsClient")
            .field("url", &self.url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SheetsClient {
    /// Build a client for the named source in `config`.
    ///
    /// The API key comes from `GROCER_SHEETS_API_KEY` if set, else from the
    /// source table.
    pub fn from_config(
        http: reqwest::Client,
        config: &Config,
        source_name: &str,
    ) -> Result<Self, IngestionError> {
        let source = config
            .sources
            .get(source_name)
            .ok_or_else(|| IngestionError::UnknownSource(source_name.to_string()))?;

        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| source.api_key.clone())
            .map(SecretString::from);

        let mut client = Self::new(http, source, api_key)?;
        client.timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        Ok(client)
    }

    pub fn new(
        http: reqwest::Client,
        source: &SourceConfig,
        api_key: Option<SecretString>,
    ) -> Result<Self, IngestionError> {
        let url = build_values_url(source)?;
        Ok(Self {
            http,
            url,
            api_key,
            timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Override the retry backoff unit (delays are `base * 2^retry`).
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// The request URL without the API key.
    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<Vec<Cell>>, IngestionError> {
        let mut url = self.url.clone();
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("key", key.expose_secret());
        }

        let mut retry_count = 0;
        let bytes = loop {
            let response = tokio::time::timeout(self.timeout, self.http.get(url.clone()).send())
                .await
                .map_err(|_| IngestionError::Timeout)?
                .map_err(IngestionError::Network)?;

            let status = response.status();
            let retryable =
                status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

            if retryable {
                if retry_count >= MAX_RETRIES {
                    return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        IngestionError::RateLimited(MAX_RETRIES)
                    } else {
                        IngestionError::HttpStatus(status.as_u16())
                    });
                }

                let delay = self.backoff_base * 2u32.pow(retry_count);
                tracing::warn!(
                    endpoint = %self.url,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Sheets request failed, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                return Err(IngestionError::HttpStatus(status.as_u16()));
            }

            break read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        };

        parse_value_range(&bytes)
    }
}

impl GridSource for SheetsClient {
    fn fetch_grid(&self) -> impl Future<Output = Result<Vec<Vec<Cell>>, IngestionError>> + Send {
        self.fetch()
    }
}

/// Decode a `values` range body. An empty body or a missing `values` field
/// means the range is empty.
fn parse_value_range(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, IngestionError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        tracing::warn!("Sheets response body is empty");
        return Ok(Vec::new());
    }

    let range: ValueRange =
        serde_json::from_slice(bytes).map_err(|e| IngestionError::Parse(e.to_string()))?;

    match range.values {
        Some(values) => Ok(values),
        None => {
            tracing::warn!("Sheets response is missing values");
            Ok(Vec::new())
        }
    }
}

/// `{base}{sheet_id}/values/{sheet_name[!range]}` with every segment
/// percent-encoded.
fn build_values_url(source: &SourceConfig) -> Result<Url, IngestionError> {
    let base = source.base_url.trim();

    if !base.starts_with("https://") {
        let is_localhost =
            base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
        if !is_localhost {
            tracing::error!(base_url = %base, "Rejecting non-HTTPS Sheets base URL");
            return Err(IngestionError::InsecureBaseUrl);
        }
        tracing::warn!(base_url = %base, "Using non-HTTPS Sheets base URL (localhost only)");
    }

    let mut url = Url::parse(base).map_err(|e| IngestionError::InvalidUrl(e.to_string()))?;

    let range = match source.range.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => format!("{}!{}", source.sheet_name, r),
        _ => source.sheet_name.clone(),
    };

    url.path_segments_mut()
        .map_err(|_| IngestionError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .push(&source.sheet_id)
        .push("values")
        .push(&range);
    url.set_query(None);

    Ok(url)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, IngestionError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(IngestionError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(IngestionError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(IngestionError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(IngestionError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
