//! Backward line decoding.
//!
//! Input arrives in decreasing-offset order: every pushed chunk ends where
//! the previously pushed one began. All bytes live in one buffer that keeps
//! its free space at the front, so a prepend is a copy into that headroom
//! and only an occasional reallocation moves the live bytes.

use crate::error::{LogError, Result};

#[derive(Debug)]
pub struct ReverseDecoder {
    buf: Vec<u8>,
    /// Index of the first received byte in `buf`.
    head: usize,
    /// Index one past the last byte not yet returned as part of a line.
    cursor: usize,
    /// Range-local offset of `buf[head]`; the next chunk must end here.
    input: u64,
    /// Range-local offset of `buf[cursor]`.
    output: u64,
    floor: u64,
    strict: bool,
}

impl ReverseDecoder {
    /// Creates a decoder reading `[floor, length)` backward. `floor` must be
    /// the start of a line (0, or the end of an already decoded line).
    pub fn new(length: u64, floor: u64, strict: bool) -> Self {
        let floor = floor.min(length);
        Self {
            buf: Vec::new(),
            head: 0,
            cursor: 0,
            input: length,
            output: length,
            floor,
            strict,
        }
    }

    /// Offset at which the next pushed chunk must end.
    pub fn input_position(&self) -> u64 {
        self.input
    }

    /// Start offset of the most recently decoded line.
    pub fn output_position(&self) -> u64 {
        self.output
    }

    pub fn is_exhausted(&self) -> bool {
        self.output <= self.floor
    }

    /// Prepends a chunk that ends at `input_position()`. Bytes that would
    /// fall below the floor are dropped.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        let room = (self.input - self.floor) as usize;
        let chunk = if chunk.len() > room {
            &chunk[chunk.len() - room..]
        } else {
            chunk
        };
        if chunk.is_empty() {
            return;
        }
        if self.head < chunk.len() {
            self.grow(chunk.len());
        }
        self.head -= chunk.len();
        self.buf[self.head..self.head + chunk.len()].copy_from_slice(chunk);
        self.input -= chunk.len() as u64;
    }

    fn grow(&mut self, needed: usize) {
        let live = self.cursor - self.head;
        let headroom = needed.max(live).saturating_mul(2);
        let mut buf = vec![0u8; headroom + live];
        buf[headroom..].copy_from_slice(&self.buf[self.head..self.cursor]);
        self.buf = buf;
        self.head = headroom;
        self.cursor = headroom + live;
    }

    /// Returns the line ending at the cursor, or `None` when more input is
    /// needed or the floor has been reached.
    pub fn decode(&mut self) -> Result<Option<String>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        let data = &self.buf[self.head..self.cursor];
        let Some((_, before_last)) = data.split_last() else {
            return Ok(None);
        };
        let start = match memchr::memrchr(b'\n', before_last) {
            Some(nl) => nl + 1,
            None if self.input == self.floor => 0,
            None => return Ok(None),
        };

        let line_bytes = &data[start..];
        let line_start = self.output - line_bytes.len() as u64;
        let line = if self.strict {
            std::str::from_utf8(line_bytes)
                .map_err(|e| LogError::Decode {
                    position: line_start + e.valid_up_to() as u64,
                    message: e.to_string(),
                })?
                .to_string()
        } else {
            String::from_utf8_lossy(line_bytes).into_owned()
        };

        self.cursor = self.head + start;
        self.output = line_start;
        Ok(Some(line))
    }
}
