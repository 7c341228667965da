use std::ops::ControlFlow;

use regex::Regex;

use crate::error::Result;
use crate::loader::LogLoader;
use crate::source::RangeSource;

/// Lines matching this are shown as errors.
pub const ERROR_PATTERN: &str = r"(ERROR|FAIL|Error)(:)?.*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub line_num: usize,  // 1-based
    pub start_col: usize, // byte column, 0-based
    pub end_col: usize,   // exclusive
}

/// A matching line found while streaming a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub line_num: usize,
    /// Range-local offset just past the line.
    pub end_offset: u64,
    pub text: String,
    pub matches: Vec<SearchMatch>,
}

pub fn error_pattern() -> Result<Regex> {
    Ok(Regex::new(ERROR_PATTERN)?)
}

pub fn search_lines(pattern: &Regex, lines: &[(usize, String)]) -> Vec<SearchMatch> {
    let mut matches = Vec::new();
    for (line_num, text) in lines {
        matches.extend(find_in_line(pattern, *line_num, text));
    }
    matches
}

fn find_in_line(pattern: &Regex, line_num: usize, text: &str) -> Vec<SearchMatch> {
    let text = text.strip_suffix('\n').unwrap_or(text);
    pattern
        .find_iter(text)
        .map(|mat| SearchMatch {
            line_num,
            start_col: mat.start(),
            end_col: mat.end(),
        })
        .collect()
}

/// Streams the log from its start and collects lines matching `pattern`,
/// stopping once `max_matches` lines were found.
pub async fn scan<S: RangeSource>(
    loader: &LogLoader<S>,
    pattern: &Regex,
    max_matches: usize,
) -> Result<Vec<LineMatch>> {
    let mut found = Vec::new();
    let mut line_num = 0;
    if max_matches == 0 {
        return Ok(found);
    }
    loader
        .iter_lines(|line, end_offset| {
            line_num += 1;
            let matches = find_in_line(pattern, line_num, line);
            if matches.is_empty() {
                return ControlFlow::Continue(());
            }
            found.push(LineMatch {
                line_num,
                end_offset,
                text: line.to_string(),
                matches,
            });
            if found.len() < max_matches {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            }
        })
        .await?;
    Ok(found)
}
