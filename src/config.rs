use std::time::Duration;

/// Size of each ranged request issued while scanning lines.
pub const DEFAULT_CHUNK_SIZE: u64 = 256 * 1024;

/// Default limit on how far the head and tail passes read into the range.
pub const DEFAULT_MAX_BYTES_PER_SIDE: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub chunk_size: u64,
    /// `None` means the passes are limited by line count only.
    pub max_bytes_per_side: Option<u64>,
    /// Fail on malformed UTF-8 instead of substituting U+FFFD.
    pub strict_utf8: bool,
    /// Drop a whitespace-only last line from the tail window.
    pub skip_trailing_empty_line: bool,
    /// Per-request transport timeout. `None` leaves it to the transport.
    pub timeout: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_bytes_per_side: Some(DEFAULT_MAX_BYTES_PER_SIDE),
            strict_utf8: false,
            skip_trailing_empty_line: false,
            timeout: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_chunk_size(mut self, size: u64) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_max_bytes_per_side(mut self, max: Option<u64>) -> Self {
        self.max_bytes_per_side = max;
        self
    }

    pub fn with_strict_utf8(mut self, strict: bool) -> Self {
        self.strict_utf8 = strict;
        self
    }

    pub fn with_skip_trailing_empty_line(mut self, skip: bool) -> Self {
        self.skip_trailing_empty_line = skip;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}
