use std::fmt;
use std::io;

#[derive(Debug)]
pub enum LogError {
    InvalidRange {
        begin: u64,
        end: u64,
    },
    /// A ranged request failed. `begin`/`end` are the absolute, inclusive
    /// byte positions that were requested.
    Fetch {
        resource: String,
        begin: u64,
        end: u64,
        status: Option<u16>,
        reason: String,
    },
    /// A plain request for a whole resource failed.
    Request {
        resource: String,
        status: u16,
        reason: String,
    },
    Decode {
        position: u64,
        message: String,
    },
    Io(io::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    Pattern(regex::Error),
    TestNotFound {
        suite: String,
        test: String,
    },
}

impl LogError {
    pub(crate) fn fetch(
        resource: &str,
        begin: u64,
        end: u64,
        status: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        LogError::Fetch {
            resource: resource.to_string(),
            begin,
            end,
            status,
            reason: reason.into(),
        }
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LogError::Io(e) => Some(e),
            LogError::Json(e) => Some(e),
            LogError::Http(e) => Some(e),
            LogError::Pattern(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::InvalidRange { begin, end } => {
                write!(f, "invalid offsets: {} > {}", begin, end)
            }
            LogError::Fetch {
                resource,
                begin,
                end,
                status,
                reason,
            } => match status {
                Some(code) => write!(
                    f,
                    "load {} (range {}-{}) failed: {} {}",
                    resource, begin, end, code, reason
                ),
                None => write!(
                    f,
                    "load {} (range {}-{}) failed: {}",
                    resource, begin, end, reason
                ),
            },
            LogError::Request {
                resource,
                status,
                reason,
            } => write!(f, "load {} failed: {} {}", resource, status, reason),
            LogError::Decode { position, message } => {
                write!(f, "UTF-8 decode error at byte {}: {}", position, message)
            }
            LogError::Io(e) => write!(f, "I/O error: {}", e),
            LogError::Json(e) => write!(f, "JSON error: {}", e),
            LogError::Http(e) => write!(f, "HTTP error: {}", e),
            LogError::Pattern(e) => write!(f, "invalid regex: {}", e),
            LogError::TestNotFound { suite, test } => {
                write!(f, "test {} not found in suite {}", test, suite)
            }
        }
    }
}

impl From<io::Error> for LogError {
    fn from(err: io::Error) -> Self {
        LogError::Io(err)
    }
}

impl From<serde_json::Error> for LogError {
    fn from(err: serde_json::Error) -> Self {
        LogError::Json(err)
    }
}

impl From<reqwest::Error> for LogError {
    fn from(err: reqwest::Error) -> Self {
        LogError::Http(err)
    }
}

impl From<regex::Error> for LogError {
    fn from(err: regex::Error) -> Self {
        LogError::Pattern(err)
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
