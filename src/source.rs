use async_trait::async_trait;

use crate::error::{LogError, Result};
use crate::range::ByteRange;

/// Response body of a ranged request, delivered in transport-sized chunks.
#[async_trait]
pub trait RangeBody: Send {
    /// Returns the next chunk, or `None` once the body is complete.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Something that can serve byte windows of a single resource.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Display name used in logs and error messages
    fn resource(&self) -> &str;

    /// Total size of the resource in bytes
    async fn size(&self) -> Result<u64>;

    /// Starts a request for the given absolute window.
    async fn open(&self, range: ByteRange) -> Result<Box<dyn RangeBody>>;

    /// Fetches the whole window into one buffer.
    async fn fetch(&self, range: ByteRange) -> Result<Vec<u8>> {
        let mut body = self.open(range).await?;
        let mut data = Vec::with_capacity(range.len() as usize);
        while let Some(chunk) = body.next_chunk().await? {
            data.extend_from_slice(&chunk);
        }
        if (data.len() as u64) < range.len() {
            return Err(LogError::fetch(
                self.resource(),
                range.begin(),
                range.last(),
                None,
                format!("short read: got {} of {} bytes", data.len(), range.len()),
            ));
        }
        data.truncate(range.len() as usize);
        Ok(data)
    }
}

#[async_trait]
impl<S: RangeSource + ?Sized> RangeSource for &S {
    fn resource(&self) -> &str {
        (**self).resource()
    }

    async fn size(&self) -> Result<u64> {
        (**self).size().await
    }

    async fn open(&self, range: ByteRange) -> Result<Box<dyn RangeBody>> {
        (**self).open(range).await
    }
}

/// Body over chunks that are already in memory.
pub struct BufferedBody {
    chunks: std::collections::VecDeque<Vec<u8>>,
}

impl BufferedBody {
    /// Splits `data` into chunks of at most `chunk_size` bytes.
    pub fn new(data: &[u8], chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunks: data.chunks(chunk_size).map(|c| c.to_vec()).collect(),
        }
    }
}

#[async_trait]
impl RangeBody for BufferedBody {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.chunks.pop_front())
    }
}
