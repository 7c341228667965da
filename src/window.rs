use serde::Serialize;

/// Excerpt of a log: lines from its start and end, and what lies between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineWindow {
    pub head: Vec<String>,
    pub tail: Vec<String>,
    pub hidden_lines: u64,
    /// `false` when `hidden_lines` was extrapolated from part of the gap.
    pub hidden_lines_exact: bool,
    pub hidden_bytes: u64,
}

impl Default for LineWindow {
    fn default() -> Self {
        Self {
            head: Vec::new(),
            tail: Vec::new(),
            hidden_lines: 0,
            hidden_lines_exact: true,
            hidden_bytes: 0,
        }
    }
}

impl LineWindow {
    /// Window holding every line of the content; nothing is hidden.
    pub fn complete(lines: Vec<String>) -> Self {
        Self {
            head: lines,
            ..Self::default()
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.hidden_lines > 0
    }

    /// 1-based number of the first tail line. Approximate unless
    /// `hidden_lines_exact`.
    pub fn tail_first_line(&self) -> u64 {
        self.head.len() as u64 + self.hidden_lines + 1
    }
}

/// Splits in-memory text into at most `max_lines` lines from each end.
pub fn split_head_tail(text: &str, max_lines: usize) -> LineWindow {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    if lines.len() <= max_lines.saturating_mul(2) {
        return LineWindow::complete(lines.into_iter().map(str::to_string).collect());
    }

    let tail_start = lines.len() - max_lines;
    let hidden = &lines[max_lines..tail_start];
    LineWindow {
        head: lines[..max_lines].iter().map(|l| l.to_string()).collect(),
        tail: lines[tail_start..].iter().map(|l| l.to_string()).collect(),
        hidden_lines: hidden.len() as u64,
        hidden_lines_exact: true,
        hidden_bytes: hidden.iter().map(|l| l.len() as u64).sum(),
    }
}
