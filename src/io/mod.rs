mod http;
mod local;

pub use http::{HttpRangeReader, RemoteSource};
pub use local::{LocalFileReader, LocalFileSink};

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// Read exactly `len` bytes starting at `offset`.
///
/// Sources may return short reads, so this keeps asking until the range is
/// filled and fails if the source ends first.
pub async fn read_exact_at<R: ReadAt + ?Sized>(reader: &R, offset: u64, len: usize) -> Result<Vec<u8>> {
    let end = offset.saturating_add(len as u64);
    if end > reader.size() {
        bail!(
            "Range {}..{} is past the end of a {} byte source",
            offset,
            end,
            reader.size()
        );
    }

    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = reader
            .read_at(offset + filled as u64, &mut buf[filled..])
            .await?;
        if n == 0 {
            bail!("Source ended after {} of {} bytes at offset {}", filled, len, offset);
        }
        filled += n;
    }

    Ok(buf)
}

/// Archive bytes that are already in memory
pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Some(rest) = usize::try_from(offset).ok().and_then(|at| self.data.get(at..)) else {
            return Ok(0);
        };
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
