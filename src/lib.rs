//! Head/tail access to large test logs over HTTP range requests.
//!
//! A [`LogLoader`] reads one byte range of a log file through a
//! [`RangeSource`], fetching fixed-size windows only as far as needed to
//! produce the first and last lines of the range, the full text, or a
//! stream of lines.

pub mod config;
pub mod decoder;
pub mod error;
pub mod http;
pub mod loader;
pub mod mapped;
pub mod range;
pub mod reverse;
pub mod search;
pub mod source;
pub mod suite;
pub mod window;

pub use config::LoaderConfig;
pub use error::{LogError, Result};
pub use http::HttpRangeSource;
pub use loader::LogLoader;
pub use mapped::MappedSource;
pub use range::ByteRange;
pub use source::{RangeBody, RangeSource};
pub use window::LineWindow;
