use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{LogError, Result};
use crate::range::ByteRange;
use crate::source::{BufferedBody, RangeBody, RangeSource};

/// Range fetcher for a file served over HTTP.
pub struct HttpRangeSource {
    client: Client,
    url: String,
}

impl HttpRangeSource {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        Ok(Self::with_client(build_client(timeout)?, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn request_error(&self, status: StatusCode, reason: &str) -> LogError {
        request_error(&self.url, status, reason)
    }

    fn error(
        &self,
        range: ByteRange,
        status: Option<StatusCode>,
        reason: impl Into<String>,
    ) -> LogError {
        LogError::fetch(
            &self.url,
            range.begin(),
            range.last(),
            status.map(|s| s.as_u16()),
            reason,
        )
    }
}

fn request_error(url: &str, status: StatusCode, reason: &str) -> LogError {
    LogError::Request {
        resource: url.to_string(),
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or(reason).to_string(),
    }
}

pub fn build_client(timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Downloads and parses a JSON document, e.g. a suite result file.
pub async fn fetch_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    debug!(url, "fetching json");
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(request_error(url, response.status(), "request failed"));
    }
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    fn resource(&self) -> &str {
        &self.url
    }

    async fn size(&self) -> Result<u64> {
        let response = self.client.head(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.request_error(status, "request failed"));
        }
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| LogError::Request {
                resource: self.url.clone(),
                status: status.as_u16(),
                reason: "missing Content-Length".to_string(),
            })
    }

    async fn open(&self, range: ByteRange) -> Result<Box<dyn RangeBody>> {
        if range.is_empty() {
            return Ok(Box::new(BufferedBody::new(&[], 1)));
        }

        let response = self
            .client
            .get(&self.url)
            .header(RANGE, range.header_value())
            .send()
            .await
            .map_err(|e| self.error(range, None, e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::PARTIAL_CONTENT => {}
            // The server ignored the Range header and sends the whole file.
            // When the window starts at 0 its bytes are a prefix of that
            // body; the rest is cut off below.
            StatusCode::OK if range.begin() == 0 => {
                warn!(url = %self.url, range = %range.header_value(), "server ignored range request");
            }
            _ => {
                let reason = if status.is_success() {
                    "range request not honoured"
                } else {
                    status.canonical_reason().unwrap_or("request failed")
                };
                return Err(self.error(range, Some(status), reason));
            }
        }

        Ok(Box::new(HttpBody {
            response,
            url: self.url.clone(),
            range,
            remaining: range.len(),
        }))
    }
}

struct HttpBody {
    response: Response,
    url: String,
    range: ByteRange,
    remaining: u64,
}

#[async_trait]
impl RangeBody for HttpBody {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let chunk = self.response.chunk().await.map_err(|e| {
            LogError::fetch(
                &self.url,
                self.range.begin(),
                self.range.last(),
                None,
                e.to_string(),
            )
        })?;
        Ok(chunk.map(|bytes| {
            let take = (bytes.len() as u64).min(self.remaining) as usize;
            self.remaining -= take as u64;
            bytes[..take].to_vec()
        }))
    }
}
