use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};

/// Half-open byte interval `[begin, end)` of a remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct ByteRange {
    begin: u64,
    end: u64,
}

#[derive(Deserialize)]
struct RawRange {
    begin: u64,
    end: u64,
}

impl TryFrom<RawRange> for ByteRange {
    type Error = LogError;

    fn try_from(raw: RawRange) -> Result<Self> {
        ByteRange::new(raw.begin, raw.end)
    }
}

impl ByteRange {
    pub fn new(begin: u64, end: u64) -> Result<Self> {
        if begin > end {
            return Err(LogError::InvalidRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    /// Range covering the first `len` bytes.
    pub fn whole(len: u64) -> Self {
        Self { begin: 0, end: len }
    }

    pub fn begin(&self) -> u64 {
        self.begin
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Translates a window given in range-local coordinates into absolute
    /// file offsets. The window is clamped to this range.
    pub fn window(&self, start: u64, end: u64) -> ByteRange {
        let len = self.len();
        let start = start.min(len);
        let end = end.clamp(start, len);
        ByteRange {
            begin: self.begin + start,
            end: self.begin + end,
        }
    }

    /// Inclusive last byte position, as used by HTTP. Only meaningful for
    /// non-empty ranges.
    pub fn last(&self) -> u64 {
        self.end.saturating_sub(1).max(self.begin)
    }

    /// Value of the HTTP `Range` request header for this range.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.begin, self.last())
    }
}
