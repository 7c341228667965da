//! Suite result files.
//!
//! A suite file is a JSON document describing one run of a test suite. Test
//! output is either stored inline in `summaryResult.details`, or moved to a
//! shared log file next to the suite file, in which case `logOffsets` gives
//! the byte range of the test's output in that file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};
use crate::range::ByteRange;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub test_cases: BTreeMap<String, TestCase>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub summary_result: TestResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_offsets: Option<ByteRange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(default)]
    pub pass: bool,
    #[serde(default)]
    pub details: String,
}

/// Where the output of a test case can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestLog {
    Inline(String),
    Range { location: String, range: ByteRange },
}

impl TestSuite {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn test(&self, id: &str) -> Option<&TestCase> {
        self.test_cases.get(id)
    }
}

/// Location of the shared test log belonging to a suite file.
pub fn testlog_location(suite_location: &str) -> String {
    format!("{}-testlog.txt", suite_location)
}

/// Resolves where the output of test `id` lives.
pub fn test_log(suite: &TestSuite, suite_location: &str, id: &str) -> Result<TestLog> {
    let test = suite.test(id).ok_or_else(|| LogError::TestNotFound {
        suite: suite_location.to_string(),
        test: id.to_string(),
    })?;
    Ok(match test.log_offsets {
        Some(range) => TestLog::Range {
            location: testlog_location(suite_location),
            range,
        },
        None => TestLog::Inline(test.summary_result.details.clone()),
    })
}
