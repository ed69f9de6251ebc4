pub mod engine;
pub mod request;

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::Serialize;

use crate::catalog::RequestClassification;
use crate::validators::ValidationResult;

/// Everything the validators may look at from one HTTP exchange.
#[derive(Debug, Clone)]
pub struct ResponseCapture {
    pub status_code: u16,
    pub status_text: String,
    /// Case-insensitive, multi-value (reqwest header map semantics).
    pub headers: HeaderMap,
    pub body_bytes: Vec<u8>,
    pub elapsed: Duration,
}

impl ResponseCapture {
    /// First value of a header, when it is representable as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The body as text, when it is valid UTF-8.
    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body_bytes).ok()
    }
}

/// What happened to a single request: status, timing, every validation
/// failure, and the state map after the savers ran.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    pub request_name: String,
    pub classification: RequestClassification,
    /// Absent when the exchange never produced a response.
    pub status_code: Option<u16>,
    pub elapsed_ms: u128,
    pub validation_failures: Vec<ValidationResult>,
    pub state_after: BTreeMap<String, String>,
}

impl RequestOutcome {
    pub fn failed(&self) -> bool {
        self.validation_failures.iter().any(|r| !r.is_ok())
    }

    pub fn failure_messages(&self) -> impl Iterator<Item = &str> {
        self.validation_failures
            .iter()
            .flat_map(|r| r.failures.iter())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaseStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub case_name: String,
    pub group_name: String,
    pub status: CaseStatus,
    pub request_outcomes: Vec<RequestOutcome>,
    pub final_fail_message: Option<String>,
}
