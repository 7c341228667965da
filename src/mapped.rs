use std::fs::File;
use std::path::Path;

use async_trait::async_trait;
use memmap2::Mmap;
use reqwest::StatusCode;

use crate::error::{LogError, Result};
use crate::range::ByteRange;
use crate::source::{BufferedBody, RangeBody, RangeSource};

/// Body chunk size used when serving windows of a mapped file.
const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// Range fetcher over a local file, for logs already on disk.
pub struct MappedSource {
    name: String,
    // Empty files cannot be mapped.
    mmap: Option<Mmap>,
}

impl MappedSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            name: path.display().to_string(),
            mmap,
        })
    }

    fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

#[async_trait]
impl RangeSource for MappedSource {
    fn resource(&self) -> &str {
        &self.name
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.data().len() as u64)
    }

    async fn open(&self, range: ByteRange) -> Result<Box<dyn RangeBody>> {
        let data = self.data();
        if range.end() > data.len() as u64 {
            let status = StatusCode::RANGE_NOT_SATISFIABLE;
            return Err(LogError::fetch(
                &self.name,
                range.begin(),
                range.last(),
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or("range not satisfiable"),
            ));
        }
        let window = &data[range.begin() as usize..range.end() as usize];
        Ok(Box::new(BufferedBody::new(window, BODY_CHUNK_SIZE)))
    }
}
