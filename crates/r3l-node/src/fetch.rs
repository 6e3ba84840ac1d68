//! Remote page fetching for URL attestations.

use std::time::Duration;

use r3l_core::{ProvenanceError, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::debug;

const USER_AGENT: &str = "R3L-Attester/1.0";

/// MIME type assumed when the server sends none.
pub const DEFAULT_PAGE_MIME: &str = "text/html";

/// Bytes of a fetched page and the MIME type the server declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// HTTP GET with redirects followed, a whole-request timeout and a body cap.
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    timeout: Duration,
    max_bytes: u64,
}

/// `text/html; charset=utf-8` -> `text/html`
pub fn essence(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    (!essence.is_empty()).then_some(essence)
}

impl PageFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }

    fn failed(&self, err: reqwest::Error) -> ProvenanceError {
        if err.is_timeout() {
            ProvenanceError::timeout("url fetch", self.timeout.as_secs())
        } else {
            ProvenanceError::Validation(format!("failed to fetch URL: {err}"))
        }
    }

    fn too_large(&self) -> ProvenanceError {
        ProvenanceError::Validation(format!("page too large (max {} bytes)", self.max_bytes))
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let parsed = Url::parse(url).map_err(|e| ProvenanceError::Validation(format!("invalid URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProvenanceError::Validation(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        let mut response = self.client.get(parsed).send().await.map_err(|e| self.failed(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProvenanceError::Validation(format!("URL returned {}", status.as_u16())));
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(self.too_large());
        }

        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(essence)
            .unwrap_or_else(|| DEFAULT_PAGE_MIME.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.failed(e))? {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(self.too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        debug!(%url, %mime, size = bytes.len(), "fetched page");
        Ok(FetchedPage { bytes, mime })
    }
}
