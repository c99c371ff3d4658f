//! Remote archives over HTTP.
//!
//! When the server answers `Accept-Ranges: bytes` the archive is read through
//! [`HttpRangeReader`], one Range request per read, so a listing only costs
//! the trailer and the central directory. Other servers get a single plain
//! GET and the archive is served from memory.

use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{MemoryReader, ReadAt};
use anyhow::{Context, Result, bail};

/// Attempts per request before a connection error is reported.
const MAX_RETRY: u32 = 10;

/// Client used by [`RemoteSource::open`].
///
/// Timeouts apply to connecting and to each read from the socket, not to a
/// whole transfer, so large bodies are not cut off.
pub fn default_client() -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .read_timeout(Duration::from_secs(30))
        .build()?)
}

/// An opened remote archive
pub enum RemoteSource {
    /// Server supports byte ranges; reads go over the network on demand.
    Ranged(HttpRangeReader),
    /// Server does not; the whole archive was downloaded up front.
    Downloaded(MemoryReader),
}

impl RemoteSource {
    pub async fn open(url: String) -> Result<Self> {
        Self::open_with(default_client()?, url).await
    }

    /// Probe `url` with a HEAD request and pick the cheapest way to read it.
    pub async fn open_with(client: Client, url: String) -> Result<Self> {
        let resp = with_retry("HEAD", || client.head(&url).send()).await?;

        let ranged_size = if resp.status().is_success() {
            content_length(resp.headers()).filter(|_| supports_ranges(resp.headers()))
        } else {
            debug!(status = %resp.status(), "HEAD request rejected");
            None
        };

        match ranged_size {
            Some(size) => {
                debug!(url = %url, size, "remote archive supports Range requests");
                Ok(Self::Ranged(HttpRangeReader {
                    client,
                    url,
                    size,
                    transferred_bytes: AtomicU64::new(0),
                }))
            }
            None => {
                info!(url = %url, "server does not serve byte ranges, downloading the whole archive");
                let data = with_retry("GET", || get_all(&client, &url))
                    .await
                    .with_context(|| format!("Cannot download {}", url))?;
                Ok(Self::Downloaded(MemoryReader::new(data)))
            }
        }
    }
}

/// HTTP Range reader for remote ZIP files
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
}

impl HttpRangeReader {
    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    async fn get_range(&self, range: &str) -> reqwest::Result<Result<Vec<u8>, StatusCode>> {
        let resp = self.client.get(&self.url).header(RANGE, range).send().await?;
        if resp.status() != StatusCode::PARTIAL_CONTENT {
            return Ok(Err(resp.status()));
        }
        Ok(Ok(resp.bytes().await?.to_vec()))
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = offset + buf.len() as u64 - 1;
        let end = end.min(self.size - 1);
        let expected_size = (end - offset + 1) as usize;

        let mut received = 0;
        while received < expected_size {
            let range = format!("bytes={}-{}", offset + received as u64, end);
            let bytes = match with_retry(&range, || self.get_range(&range)).await? {
                Ok(bytes) => bytes,
                Err(status) => bail!("HTTP request for {} failed with status: {}", range, status),
            };
            if bytes.is_empty() {
                bail!("Server returned an empty range for {}", range);
            }

            let chunk_len = bytes.len().min(expected_size - received);
            buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
            received += chunk_len;

            self.transferred_bytes
                .fetch_add(chunk_len as u64, Ordering::Relaxed);
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

async fn get_all(client: &Client, url: &str) -> reqwest::Result<Vec<u8>> {
    let resp = client.get(url).send().await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Run `attempt` until it succeeds, retrying connection errors and timeouts
/// with a linear backoff.
async fn with_retry<T, F, Fut>(what: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = reqwest::Result<T>>,
{
    let mut retry_count = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_timeout() || e.is_connect() || e.is_body() => {
                retry_count += 1;
                if retry_count >= MAX_RETRY {
                    return Err(anyhow::Error::new(e).context(format!("Max retries exceeded for {}", what)));
                }
                warn!(
                    "Connection error on {}, retry {}/{}: {}",
                    what, retry_count, MAX_RETRY, e
                );
                tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn supports_ranges(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("bytes"))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_supports_ranges() {
        let mut headers = HeaderMap::new();
        assert!(!supports_ranges(&headers));

        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("none"));
        assert!(!supports_ranges(&headers));

        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        assert!(supports_ranges(&headers));
    }

    #[test]
    fn test_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1234"));
        assert_eq!(content_length(&headers), Some(1234));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(content_length(&headers), None);
    }
}
