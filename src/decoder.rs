use std::collections::VecDeque;

use crate::error::{LogError, Result};

/// Incremental UTF-8 decoder. Multi-byte sequences split across `push`
/// calls are carried over until the rest of the sequence arrives.
#[derive(Debug, Default)]
pub struct Utf8Stream {
    pending: Vec<u8>,
    position: u64,
    strict: bool,
}

impl Utf8Stream {
    pub fn new(strict: bool) -> Self {
        Self {
            pending: Vec::with_capacity(4),
            position: 0,
            strict,
        }
    }

    /// Number of input bytes decoded so far, excluding carried-over bytes.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn push(&mut self, mut bytes: &[u8], out: &mut String) -> Result<()> {
        while !self.pending.is_empty() {
            let Some((&byte, rest)) = bytes.split_first() else {
                return Ok(());
            };
            self.pending.push(byte);
            bytes = rest;
            match std::str::from_utf8(&self.pending) {
                Err(e) if e.error_len().is_none() => continue,
                _ => {
                    let pending = std::mem::take(&mut self.pending);
                    self.decode_slice(&pending, out)?;
                }
            }
        }
        self.decode_slice(bytes, out)
    }

    /// Flushes the stream. A sequence still incomplete at this point is invalid.
    pub fn finish(&mut self, out: &mut String) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let len = self.pending.len() as u64;
        self.pending.clear();
        self.invalid(out, "truncated multi-byte sequence")?;
        self.position += len;
        Ok(())
    }

    fn decode_slice(&mut self, mut bytes: &[u8], out: &mut String) -> Result<()> {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    out.push_str(text);
                    self.position += bytes.len() as u64;
                    return Ok(());
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&bytes[..valid]));
                    self.position += valid as u64;
                    match e.error_len() {
                        Some(bad) => {
                            self.invalid(out, "invalid byte sequence")?;
                            self.position += bad as u64;
                            bytes = &bytes[valid + bad..];
                        }
                        None => {
                            self.pending.extend_from_slice(&bytes[valid..]);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn invalid(&self, out: &mut String, message: &str) -> Result<()> {
        if self.strict {
            return Err(LogError::Decode {
                position: self.position,
                message: message.to_string(),
            });
        }
        out.push(char::REPLACEMENT_CHARACTER);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStep {
    /// One line, including its `\n` terminator unless it is the final
    /// unterminated line.
    Line(String),
    NeedMoreInput,
    Eof,
}

/// Splits bytes arriving in file order into lines.
#[derive(Debug)]
pub struct LineDecoder {
    length: u64,
    remaining: u64,
    queue: VecDeque<Vec<u8>>,
    offset: usize,
    input: u64,
    text: String,
    utf8: Utf8Stream,
    flushed: bool,
}

impl LineDecoder {
    /// Creates a decoder for `length` bytes of input. Bytes pushed beyond
    /// that are ignored.
    pub fn new(length: u64, strict: bool) -> Self {
        Self {
            length,
            remaining: length,
            queue: VecDeque::new(),
            offset: 0,
            input: 0,
            text: String::new(),
            utf8: Utf8Stream::new(strict),
            flushed: false,
        }
    }

    pub fn input_position(&self) -> u64 {
        self.input
    }

    /// Number of input bytes turned into output so far.
    pub fn output_position(&self) -> u64 {
        self.length - self.remaining
    }

    pub fn at_eof(&self) -> bool {
        self.remaining == 0
    }

    pub fn push_bytes(&mut self, chunk: Vec<u8>) {
        self.input += chunk.len() as u64;
        self.queue.push_back(chunk);
    }

    pub fn decode(&mut self) -> Result<DecodeStep> {
        while !self.at_eof() {
            let Some(buf) = self.queue.front() else {
                return Ok(DecodeStep::NeedMoreInput);
            };
            let buf_len = buf.len();
            let avail = &buf[self.offset..];
            let limit = (avail.len() as u64).min(self.remaining) as usize;
            let window = &avail[..limit];

            if let Some(nl) = memchr::memchr(b'\n', window) {
                self.utf8.push(&window[..=nl], &mut self.text)?;
                self.remaining -= (nl + 1) as u64;
                self.offset += nl + 1;
                if self.offset == buf_len {
                    self.queue.pop_front();
                    self.offset = 0;
                }
                if self.at_eof() {
                    self.queue.clear();
                }
                return Ok(DecodeStep::Line(std::mem::take(&mut self.text)));
            }

            // No newline, the whole window belongs to the unfinished line.
            self.utf8.push(window, &mut self.text)?;
            self.remaining -= limit as u64;
            self.queue.pop_front();
            self.offset = 0;
        }

        self.queue.clear();
        if !self.flushed {
            self.flushed = true;
            self.utf8.finish(&mut self.text)?;
            if !self.text.is_empty() {
                return Ok(DecodeStep::Line(std::mem::take(&mut self.text)));
            }
        }
        Ok(DecodeStep::Eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(dec: &mut LineDecoder) -> Vec<String> {
        let mut lines = Vec::new();
        while let DecodeStep::Line(line) = dec.decode().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_utf8_stream_split_sequence() {
        // U+20AC EURO SIGN is E2 82 AC.
        let mut stream = Utf8Stream::new(true);
        let mut out = String::new();
        stream.push(b"a\xE2", &mut out).unwrap();
        assert_eq!(out, "a");
        stream.push(b"\x82", &mut out).unwrap();
        assert_eq!(out, "a");
        stream.push(b"\xACb", &mut out).unwrap();
        stream.finish(&mut out).unwrap();
        assert_eq!(out, "a\u{20AC}b");
        assert_eq!(stream.position(), 5);
    }

    #[test]
    fn test_utf8_stream_lossy_replacement() {
        let mut stream = Utf8Stream::new(false);
        let mut out = String::new();
        stream.push(b"x\xFFy\xE2", &mut out).unwrap();
        stream.push(b"A", &mut out).unwrap();
        stream.push(b"\xF0\x9F", &mut out).unwrap();
        stream.finish(&mut out).unwrap();
        assert_eq!(out, "x\u{FFFD}y\u{FFFD}A\u{FFFD}");
    }

    #[test]
    fn test_utf8_stream_strict_rejects() {
        let mut stream = Utf8Stream::new(true);
        let mut out = String::new();
        let err = stream.push(b"ok\xFF", &mut out).unwrap_err();
        assert!(matches!(err, LogError::Decode { position: 2, .. }));
    }

    #[test]
    fn test_lines_across_chunks() {
        let mut dec = LineDecoder::new(14, false);
        assert_eq!(dec.decode().unwrap(), DecodeStep::NeedMoreInput);

        dec.push_bytes(b"first\nsec".to_vec());
        assert_eq!(dec.decode().unwrap(), DecodeStep::Line("first\n".into()));
        assert_eq!(dec.output_position(), 6);
        assert_eq!(dec.decode().unwrap(), DecodeStep::NeedMoreInput);

        dec.push_bytes(b"ond\n".to_vec());
        assert_eq!(dec.input_position(), 13);
        assert_eq!(dec.decode().unwrap(), DecodeStep::Line("second\n".into()));
        assert!(!dec.at_eof());

        dec.push_bytes(b"x".to_vec());
        assert_eq!(dec.decode().unwrap(), DecodeStep::Line("x".into()));
        assert!(dec.at_eof());
        assert_eq!(dec.decode().unwrap(), DecodeStep::Eof);
    }

    #[test]
    fn test_trailing_newline_has_no_empty_line() {
        let mut dec = LineDecoder::new(4, false);
        dec.push_bytes(b"a\nb\n".to_vec());
        assert_eq!(decode_all(&mut dec), vec!["a\n", "b\n"]);
        assert_eq!(dec.decode().unwrap(), DecodeStep::Eof);
    }

    #[test]
    fn test_ignores_input_past_declared_length() {
        let mut dec = LineDecoder::new(5, false);
        dec.push_bytes(b"abc\nde\nzzz".to_vec());
        assert_eq!(decode_all(&mut dec), vec!["abc\n", "d"]);
        assert_eq!(dec.output_position(), 5);
    }

    #[test]
    fn test_multibyte_char_split_between_chunks() {
        let text = "\u{20AC}uro\n";
        let bytes = text.as_bytes();
        let mut dec = LineDecoder::new(bytes.len() as u64, true);
        dec.push_bytes(bytes[..1].to_vec());
        assert_eq!(dec.decode().unwrap(), DecodeStep::NeedMoreInput);
        dec.push_bytes(bytes[1..].to_vec());
        assert_eq!(decode_all(&mut dec), vec![text]);
    }

    #[test]
    fn test_arbitrary_chunking_reconstructs_input() {
        let text = "alpha\n\nbeta \u{00E9}t\u{00E9}\n\u{1F600} gamma\nlast line";
        let bytes = text.as_bytes();
        for size in 1..=bytes.len() {
            let mut dec = LineDecoder::new(bytes.len() as u64, true);
            let mut lines = Vec::new();
            let mut chunks = bytes.chunks(size);
            loop {
                match dec.decode().unwrap() {
                    DecodeStep::Line(line) => lines.push(line),
                    DecodeStep::NeedMoreInput => {
                        dec.push_bytes(chunks.next().unwrap().to_vec());
                    }
                    DecodeStep::Eof => break,
                }
            }
            assert_eq!(lines.concat(), text, "chunk size {}", size);
            assert_eq!(lines.len(), 5, "chunk size {}", size);
        }
    }
}
