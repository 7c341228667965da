//! Incremental access to a byte range of a remote log file.
//!
//! `LogLoader` reads a range in fixed-size ranged requests, one at a time,
//! and only as far as the caller needs: the head of the range, its tail, or
//! the full text. Any failed request aborts the whole operation.

use std::ops::ControlFlow;

use tracing::{debug, info};

use crate::config::{LoaderConfig, DEFAULT_CHUNK_SIZE};
use crate::decoder::{DecodeStep, LineDecoder, Utf8Stream};
use crate::error::{LogError, Result};
use crate::range::ByteRange;
use crate::reverse::ReverseDecoder;
use crate::source::RangeSource;
use crate::window::LineWindow;

pub struct LogLoader<S> {
    source: S,
    range: ByteRange,
    config: LoaderConfig,
}

impl<S: RangeSource> LogLoader<S> {
    pub fn new(source: S, range: ByteRange, config: LoaderConfig) -> Self {
        Self {
            source,
            range,
            config,
        }
    }

    /// Loader over the whole resource.
    pub async fn whole(source: S, config: LoaderConfig) -> Result<Self> {
        let size = source.size().await?;
        Ok(Self::new(source, ByteRange::whole(size), config))
    }

    pub fn resource(&self) -> &str {
        self.source.resource()
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn len(&self) -> u64 {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetches the entire range as one string. `progress` receives
    /// `(bytes_received, total_bytes)` before the request and after every
    /// chunk of the response body.
    pub async fn text<F>(&self, mut progress: F) -> Result<String>
    where
        F: FnMut(u64, u64),
    {
        let total = self.len();
        progress(0, total);
        if total == 0 {
            return Ok(String::new());
        }

        let window = self.range.window(0, total);
        debug!(resource = self.resource(), range = %window.header_value(), "fetching");
        let mut body = self.source.open(window).await?;

        let mut utf8 = Utf8Stream::new(self.config.strict_utf8);
        // The range length comes from the caller; the body may be shorter.
        let mut text = String::with_capacity(total.min(DEFAULT_CHUNK_SIZE) as usize);
        let mut received = 0u64;
        while received < total {
            let Some(chunk) = body.next_chunk().await? else {
                break;
            };
            let take = (chunk.len() as u64).min(total - received) as usize;
            utf8.push(&chunk[..take], &mut text)?;
            received += take as u64;
            progress(received, total);
        }
        if received < total {
            return Err(LogError::fetch(
                self.resource(),
                window.begin(),
                window.last(),
                None,
                format!("short read: got {} of {} bytes", received, total),
            ));
        }
        utf8.finish(&mut text)?;
        Ok(text)
    }

    /// Reads lines from the start of the range and hands each one to
    /// `visitor` together with the range-local position just after it.
    /// Returns `true` if the end of the range was reached.
    pub async fn iter_lines<F>(&self, mut visitor: F) -> Result<bool>
    where
        F: FnMut(&str, u64) -> ControlFlow<()>,
    {
        let mut dec = LineDecoder::new(self.len(), self.config.strict_utf8);
        self.read_forward(&mut dec, self.len(), |line, pos| visitor(&line, pos))
            .await
    }

    /// `head_and_tail_lines` with the configured byte budget.
    pub async fn head_and_tail(&self, max_lines: usize) -> Result<LineWindow> {
        self.head_and_tail_lines(max_lines, self.config.max_bytes_per_side)
            .await
    }

    /// Returns up to `max_lines` lines from the beginning and the end of
    /// the range. Neither side reads more than `max_bytes` bytes into the
    /// range. When the two sides meet, all lines are returned in `head`.
    ///
    /// Lines between the two sides are counted by reading at most
    /// `max_bytes` more bytes. If the gap is larger than that, the count is
    /// extrapolated and `hidden_lines_exact` is `false`.
    pub async fn head_and_tail_lines(
        &self,
        max_lines: usize,
        max_bytes: Option<u64>,
    ) -> Result<LineWindow> {
        let len = self.len();
        if max_lines == 0 {
            let (hidden_lines, hidden_lines_exact) = self.count_lines(0, len, max_bytes).await?;
            return Ok(LineWindow {
                hidden_lines,
                hidden_lines_exact,
                hidden_bytes: len,
                ..LineWindow::default()
            });
        }
        let budget = max_bytes.unwrap_or(u64::MAX);

        // Head pass.
        let mut head = Vec::new();
        let mut head_end = 0;
        let mut dec = LineDecoder::new(len, self.config.strict_utf8);
        let eof = self
            .read_forward(&mut dec, len.min(budget), |line, pos| {
                head.push(line);
                head_end = pos;
                if head.len() < max_lines {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            })
            .await?;
        if eof {
            debug!(resource = self.resource(), lines = head.len(), "range fits in head");
            return Ok(LineWindow::complete(head));
        }

        // Tail pass. It never reads below the head, nor further back than
        // the byte budget plus one byte, which tells whether a line starts
        // exactly at the budget boundary.
        let lower = head_end.max(len.saturating_sub(budget));
        let fetch_floor = if lower > head_end { lower - 1 } else { lower };
        let mut rev = ReverseDecoder::new(len, head_end, self.config.strict_utf8);
        let mut tail = Vec::new();
        let mut first = true;
        while tail.len() < max_lines {
            match rev.decode()? {
                Some(line) => {
                    let skip = first
                        && self.config.skip_trailing_empty_line
                        && line.trim().is_empty();
                    first = false;
                    if !skip {
                        tail.push(line);
                    }
                }
                None if rev.is_exhausted() => break,
                None => {
                    let end = rev.input_position();
                    if end <= fetch_floor {
                        break;
                    }
                    let start = end.saturating_sub(self.chunk_size()).max(fetch_floor);
                    let data = self.fetch_window(start, end).await?;
                    rev.push_bytes(&data);
                }
            }
        }
        tail.reverse();
        let tail_start = rev.output_position();

        if tail_start <= head_end {
            head.append(&mut tail);
            debug!(resource = self.resource(), lines = head.len(), "head and tail meet");
            return Ok(LineWindow::complete(head));
        }

        let (hidden_lines, hidden_lines_exact) =
            self.count_lines(head_end, tail_start, max_bytes).await?;
        info!(
            resource = self.resource(),
            head = head.len(),
            tail = tail.len(),
            hidden_lines,
            hidden_lines_exact,
            "loaded head and tail"
        );
        Ok(LineWindow {
            head,
            tail,
            hidden_lines,
            hidden_lines_exact,
            hidden_bytes: tail_start - head_end,
        })
    }

    /// Drives `dec` until `visitor` breaks, input is exhausted, or the next
    /// request would have to read at or past `ceiling`. Returns `true` when
    /// no lines remain in the range.
    async fn read_forward<F>(
        &self,
        dec: &mut LineDecoder,
        ceiling: u64,
        mut visitor: F,
    ) -> Result<bool>
    where
        F: FnMut(String, u64) -> ControlFlow<()>,
    {
        loop {
            match dec.decode()? {
                DecodeStep::Line(line) => {
                    if visitor(line, dec.output_position()).is_break() {
                        return Ok(dec.at_eof());
                    }
                }
                DecodeStep::NeedMoreInput => {
                    let start = dec.input_position();
                    if start >= ceiling {
                        return Ok(false);
                    }
                    let end = start.saturating_add(self.chunk_size()).min(ceiling);
                    dec.push_bytes(self.fetch_window(start, end).await?);
                }
                DecodeStep::Eof => return Ok(true),
            }
        }
    }

    /// Counts the lines in `[start, end)` without keeping their text,
    /// reading at most `limit` bytes. Returns the count and whether it is
    /// exact; past the limit the count is scaled up from the part read.
    async fn count_lines(
        &self,
        start: u64,
        end: u64,
        limit: Option<u64>,
    ) -> Result<(u64, bool)> {
        let scan_end = match limit {
            Some(limit) => end.min(start.saturating_add(limit)),
            None => end,
        };
        let mut newlines = 0u64;
        let mut last = b'\n';
        let mut pos = start;
        while pos < scan_end {
            let next = pos.saturating_add(self.chunk_size()).min(scan_end);
            let data = self.fetch_window(pos, next).await?;
            newlines += memchr::memchr_iter(b'\n', &data).count() as u64;
            if let Some(&byte) = data.last() {
                last = byte;
            }
            pos = next;
        }

        if scan_end == end {
            let partial = u64::from(last != b'\n');
            return Ok((newlines + partial, true));
        }
        let scanned = scan_end - start;
        if scanned == 0 {
            return Ok((1, false));
        }
        let estimate =
            (u128::from(newlines) * u128::from(end - start)).div_ceil(u128::from(scanned));
        let estimate = u64::try_from(estimate).unwrap_or(u64::MAX).max(1);
        debug!(
            resource = self.resource(),
            scanned,
            gap = end - start,
            estimate,
            "hidden line count extrapolated"
        );
        Ok((estimate, false))
    }

    fn chunk_size(&self) -> u64 {
        self.config.chunk_size.max(1)
    }

    async fn fetch_window(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let window = self.range.window(start, end);
        debug!(resource = self.resource(), range = %window.header_value(), "fetching");
        self.source.fetch(window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::MemorySource;
    use crate::window::split_head_tail;

    fn numbered(count: usize) -> String {
        (1..=count).map(|i| format!("line {:03}\n", i)).collect()
    }

    fn config(chunk: u64) -> LoaderConfig {
        LoaderConfig::default()
            .with_chunk_size(chunk)
            .with_max_bytes_per_side(None)
    }

    fn loader(source: &MemorySource, chunk: u64) -> LogLoader<&MemorySource> {
        let len = source.data_len();
        LogLoader::new(source, ByteRange::whole(len), config(chunk))
    }

    #[tokio::test]
    async fn test_iter_lines_reconstructs_content() {
        let text = "first\n\u{00E4}\u{00F6}\u{00FC}\n\u{1F600}\n\nno newline at end";
        for chunk in [1, 2, 3, 5, 64] {
            let source = MemorySource::new(text).with_body_chunk(2);
            let loader = loader(&source, chunk);
            let mut lines = Vec::new();
            let mut positions = Vec::new();
            let eof = loader
                .iter_lines(|line, pos| {
                    lines.push(line.to_string());
                    positions.push(pos);
                    ControlFlow::Continue(())
                })
                .await
                .unwrap();
            assert!(eof);
            assert_eq!(lines.concat(), text, "chunk {}", chunk);
            assert_eq!(lines.len(), 5);
            assert_eq!(*positions.last().unwrap(), text.len() as u64);
        }
    }

    #[tokio::test]
    async fn test_iter_lines_stops_early() {
        let source = MemorySource::new(numbered(100));
        let loader = loader(&source, 64);
        let mut seen = 0;
        let eof = loader
            .iter_lines(|line, _| {
                seen += 1;
                if line.starts_with("line 010") {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await
            .unwrap();
        assert!(!eof);
        assert_eq!(seen, 10);
        // Only the first two 64-byte windows were needed.
        assert_eq!(source.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_head_and_tail_with_gap() {
        let text = numbered(100);
        let source = MemorySource::new(text.clone());
        let loader = loader(&source, 50);
        let window = loader.head_and_tail_lines(10, None).await.unwrap();

        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        assert_eq!(window.head, lines[..10]);
        assert_eq!(window.tail, lines[90..]);
        assert_eq!(window.hidden_lines, 80);
        assert!(window.hidden_lines_exact);
        assert_eq!(window.hidden_bytes, 80 * 9);
        assert_eq!(window, split_head_tail(&text, 10));
    }

    #[tokio::test]
    async fn test_small_file_is_merged() {
        for count in [0, 1, 5, 7, 8] {
            let text = numbered(count);
            let source = MemorySource::new(text.clone());
            let loader = loader(&source, 16);
            let window = loader.head_and_tail_lines(4, None).await.unwrap();
            assert_eq!(window.head.concat(), text, "{} lines", count);
            assert!(window.tail.is_empty());
            assert_eq!(window.hidden_lines, 0);
        }
    }

    #[tokio::test]
    async fn test_unterminated_last_line_in_tail() {
        let text = format!("{}tail without newline", numbered(20));
        let source = MemorySource::new(text.clone());
        let window = loader(&source, 32).head_and_tail_lines(3, None).await.unwrap();
        assert_eq!(
            window.tail,
            vec!["line 019\n", "line 020\n", "tail without newline"]
        );
        assert_eq!(window.hidden_lines, 15);
        assert_eq!(window, split_head_tail(&text, 3));
    }

    #[tokio::test]
    async fn test_byte_budget_limits_both_passes() {
        // 50 lines of 9 bytes.
        let text = numbered(50);
        let len = text.len() as u64;
        let source = MemorySource::new(text);
        let loader = loader(&source, 16);
        let window = loader.head_and_tail_lines(100, Some(30)).await.unwrap();

        assert_eq!(window.head, vec!["line 001\n", "line 002\n", "line 003\n"]);
        assert_eq!(window.tail, vec!["line 048\n", "line 049\n", "line 050\n"]);
        // 3 newlines in the first 30 bytes of a 396-byte gap.
        assert_eq!(window.hidden_lines, 40);
        assert!(!window.hidden_lines_exact);
        assert_eq!(window.hidden_bytes, 396);

        let passes: Vec<(u64, u64)> = source
            .requested()
            .iter()
            .map(|r| (r.begin(), r.end()))
            .collect();
        assert_eq!(
            passes,
            vec![
                (0, 16),
                (16, 30),
                (len - 16, len),
                (len - 31, len - 16),
                (27, 43),
                (43, 57),
            ]
        );
    }

    #[tokio::test]
    async fn test_large_gap_is_not_downloaded() {
        let text = numbered(900);
        let source = MemorySource::new(text);
        let window = loader(&source, 256)
            .head_and_tail_lines(5, Some(1000))
            .await
            .unwrap();
        assert_eq!(window.head.len(), 5);
        assert_eq!(window.tail.last().map(String::as_str), Some("line 900\n"));
        assert!(!window.hidden_lines_exact);
        assert_eq!(window.hidden_lines, 890);

        let fetched: u64 = source.requested().iter().map(|r| r.len()).sum();
        assert!(fetched <= 3 * 1000, "fetched {} bytes", fetched);
    }

    #[tokio::test]
    async fn test_gap_within_budget_is_counted_exactly() {
        let source = MemorySource::new(numbered(30));
        let window = loader(&source, 16)
            .head_and_tail_lines(2, Some(1000))
            .await
            .unwrap();
        assert_eq!(window.hidden_lines, 26);
        assert!(window.hidden_lines_exact);
    }

    #[tokio::test]
    async fn test_tail_line_starting_at_budget_boundary() {
        // 50 lines of 9 bytes; line 048 starts exactly 27 bytes before the end.
        let text = numbered(50);
        let len = text.len() as u64;
        let source = MemorySource::new(text);
        let window = loader(&source, 16)
            .head_and_tail_lines(100, Some(27))
            .await
            .unwrap();
        assert_eq!(window.head, vec!["line 001\n", "line 002\n", "line 003\n"]);
        assert_eq!(window.tail, vec!["line 048\n", "line 049\n", "line 050\n"]);
        assert_eq!(window.hidden_lines, 44);

        let passes: Vec<(u64, u64)> = source.requested()[..4]
            .iter()
            .map(|r| (r.begin(), r.end()))
            .collect();
        assert_eq!(
            passes,
            vec![(0, 16), (16, 27), (len - 16, len), (len - 28, len - 16)]
        );
    }

    #[tokio::test]
    async fn test_huge_chunk_size() {
        let text = numbered(3);
        let source = MemorySource::new(text.clone());
        let loader = LogLoader::new(
            &source,
            ByteRange::whole(text.len() as u64),
            config(1).with_chunk_size(u64::MAX),
        );
        let window = loader.head_and_tail_lines(1, None).await.unwrap();
        assert_eq!(window.head, vec!["line 001\n"]);
        assert_eq!(window.tail, vec!["line 003\n"]);
        assert_eq!(window.hidden_lines, 1);

        let mut lines = 0;
        let eof = loader
            .iter_lines(|_, _| {
                lines += 1;
                ControlFlow::Continue(())
            })
            .await
            .unwrap();
        assert!(eof);
        assert_eq!(lines, 3);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_field_is_treated_as_one() {
        let text = numbered(5);
        let source = MemorySource::new(text.clone());
        let mut config = config(4);
        config.chunk_size = 0;
        let loader = LogLoader::new(&source, ByteRange::whole(text.len() as u64), config);
        let window = loader.head_and_tail_lines(1, None).await.unwrap();
        assert_eq!(window.head, vec!["line 001\n"]);
        assert_eq!(window.tail, vec!["line 005\n"]);
        assert_eq!(window.hidden_lines, 3);
        assert!(source.requested().iter().all(|r| r.len() == 1));
    }

    #[tokio::test]
    async fn test_budget_smaller_than_first_line() {
        let text = format!("{}\nshort\n", "x".repeat(100));
        let source = MemorySource::new(text);
        let window = loader(&source, 16)
            .head_and_tail_lines(5, Some(10))
            .await
            .unwrap();
        assert!(window.head.is_empty());
        assert_eq!(window.tail, vec!["short\n"]);
        assert_eq!(window.hidden_lines, 1);
        assert!(source.max_requested_end() <= 107);
    }

    #[tokio::test]
    async fn test_skip_trailing_empty_line() {
        let text = format!("{}\n", numbered(10));
        let source = MemorySource::new(text.clone());
        let config = config(8).with_skip_trailing_empty_line(true);
        let loader = LogLoader::new(&source, ByteRange::whole(text.len() as u64), config);
        let window = loader.head_and_tail_lines(2, None).await.unwrap();
        assert_eq!(window.tail, vec!["line 009\n", "line 010\n"]);

        let plain = loader_default_tail(&text).await;
        assert_eq!(plain, vec!["line 010\n", "\n"]);
    }

    async fn loader_default_tail(text: &str) -> Vec<String> {
        let source = MemorySource::new(text);
        let window = loader(&source, 8).head_and_tail_lines(2, None).await.unwrap();
        window.tail
    }

    #[tokio::test]
    async fn test_sub_range_uses_absolute_offsets() {
        let text = "---\ntest-a\nA1\nA2\n---\ntest-b\nB1\n";
        let begin = text.find("A1").unwrap() as u64;
        let end = text.find("---\ntest-b").unwrap() as u64;
        let source = MemorySource::new(text);
        let loader = LogLoader::new(&source, ByteRange::new(begin, end).unwrap(), config(4));
        assert_eq!(loader.len(), 6);

        let window = loader.head_and_tail_lines(5, None).await.unwrap();
        assert_eq!(window.head, vec!["A1\n", "A2\n"]);
        for r in source.requested() {
            assert!(r.begin() >= begin && r.end() <= end, "{:?}", r);
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts() {
        let text = numbered(100);
        let source = MemorySource::new(text).failing_at(850, 503);
        let loader = loader(&source, 64);
        let err = loader.head_and_tail_lines(5, None).await.unwrap_err();
        match err {
            LogError::Fetch {
                resource, status, ..
            } => {
                assert_eq!(resource, "memory.log");
                assert_eq!(status, Some(503));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_text_reports_progress() {
        let text = "h\u{00E9}llo\nw\u{00F6}rld\n".repeat(10);
        let source = MemorySource::new(text.clone()).with_body_chunk(5);
        let loader = loader(&source, 64);
        let mut calls = Vec::new();
        let got = loader.text(|done, total| calls.push((done, total))).await.unwrap();
        assert_eq!(got, text);
        let total = text.len() as u64;
        assert_eq!(calls.first(), Some(&(0, total)));
        assert_eq!(calls.last(), Some(&(total, total)));
        assert!(calls.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(source.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_text_range_past_end_is_short_read() {
        let source = MemorySource::new("data\n");
        let loader = LogLoader::new(&source, ByteRange::new(0, 1 << 40).unwrap(), config(64));
        let err = loader.text(|_, _| {}).await.unwrap_err();
        assert!(err.to_string().contains("short read: got 5 of"), "{}", err);
    }

    #[tokio::test]
    async fn test_empty_range_does_no_io() {
        let source = MemorySource::new("data\n");
        let loader = LogLoader::new(&source, ByteRange::new(3, 3).unwrap(), config(4));
        let window = loader.head_and_tail_lines(5, None).await.unwrap();
        assert_eq!(window, LineWindow::default());
        assert_eq!(loader.text(|_, _| {}).await.unwrap(), "");
        assert!(source.requested().is_empty());
    }

    #[tokio::test]
    async fn test_zero_lines_counts_everything_hidden() {
        let source = MemorySource::new(numbered(12));
        let window = loader(&source, 10).head_and_tail_lines(0, None).await.unwrap();
        assert_eq!(window.hidden_lines, 12);
        assert!(window.head.is_empty() && window.tail.is_empty());
    }

    #[tokio::test]
    async fn test_whole_uses_source_size() {
        let source = MemorySource::new(numbered(3));
        let loader = LogLoader::whole(&source, LoaderConfig::default()).await.unwrap();
        assert_eq!(loader.len(), 27);
    }
}
