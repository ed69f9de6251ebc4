pub mod json;
pub mod savers;

use serde::Serialize;

use crate::executor::ResponseCapture;
use crate::resources::ResourceManager;
use crate::state::StateMap;
use self::json::JsonPropertyValidator;

/// Outcome of one validator: success, or the diagnostics it collected.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub failures: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ValidationResult {
            failures: vec![message.into()],
        }
    }

    pub fn from_failures(failures: Vec<String>) -> Self {
        ValidationResult { failures }
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

// ============================================================================
// Validator algebra
// ============================================================================

/// A pluggable predicate over a captured response. Validators are
/// side-effect free; writing state is the separate state-saver family.
#[derive(Debug, Clone)]
pub enum Validator {
    ResponseCode(ResponseCodeValidator),
    ResponseContent(ResponseContentValidator),
    ResponseHeader(ResponseHeaderValidator),
    LockMismatch(LockMismatchValidator),
    JsonContent(JsonContentValidator),
}

impl Validator {
    pub fn validate(
        &self,
        response: &ResponseCapture,
        resources: &ResourceManager,
        state: &StateMap,
    ) -> ValidationResult {
        match self {
            Validator::ResponseCode(v) => v.validate(response),
            Validator::ResponseContent(v) => v.validate(response, resources, state),
            Validator::ResponseHeader(v) => v.validate(response, state),
            Validator::LockMismatch(v) => v.validate(response, state),
            Validator::JsonContent(v) => v.validate(response, state),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseCodeValidator {
    pub expected: u16,
}

impl ResponseCodeValidator {
    fn validate(&self, response: &ResponseCapture) -> ValidationResult {
        if response.status_code == self.expected {
            ValidationResult::ok()
        } else {
            ValidationResult::fail(format!(
                "Expected code {}, got {}",
                self.expected, response.status_code
            ))
        }
    }
}

/// Compares the body bytes with a named resource or a saved state value.
#[derive(Debug, Clone)]
pub struct ResponseContentValidator {
    pub expected_resource_id: Option<String>,
    pub expected_state_key: Option<String>,
}

impl ResponseContentValidator {
    fn validate(
        &self,
        response: &ResponseCapture,
        resources: &ResourceManager,
        state: &StateMap,
    ) -> ValidationResult {
        let expected: Vec<u8> = if let Some(id) = &self.expected_resource_id {
            match resources.contents(id) {
                Ok(bytes) => bytes.to_vec(),
                Err(e) => return ValidationResult::fail(e.to_string()),
            }
        } else if let Some(key) = &self.expected_state_key {
            match state.get(key) {
                Some(value) => value.as_bytes().to_vec(),
                None => {
                    return ValidationResult::fail(format!(
                        "No saved state value under '{}' to compare the body against",
                        key
                    ))
                }
            }
        } else {
            return ValidationResult::fail(
                "ResponseContentValidator needs an expected resource or state key",
            );
        };

        if response.body_bytes == expected {
            ValidationResult::ok()
        } else {
            ValidationResult::fail(format!(
                "Response body ({} bytes) does not match expected content ({} bytes)",
                response.body_bytes.len(),
                expected.len()
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub enum HeaderExpectation {
    Absent,
    Present,
    EqualsLiteral(String),
    EqualsState(String),
    AbsoluteUrl { must_include_access_token: bool },
}

/// Asserts on a single response header; lookup is case-insensitive.
#[derive(Debug, Clone)]
pub struct ResponseHeaderValidator {
    pub header: String,
    pub expectation: HeaderExpectation,
}

impl ResponseHeaderValidator {
    fn validate(&self, response: &ResponseCapture, state: &StateMap) -> ValidationResult {
        let actual = response.header(&self.header);
        match &self.expectation {
            HeaderExpectation::Absent => match actual {
                None => ValidationResult::ok(),
                Some(value) => ValidationResult::fail(format!(
                    "Header {} should be absent, got '{}'",
                    self.header, value
                )),
            },
            HeaderExpectation::Present => match actual {
                Some(_) => ValidationResult::ok(),
                None => ValidationResult::fail(format!("Missing header {}", self.header)),
            },
            HeaderExpectation::EqualsLiteral(expected) => {
                self.check_equals(actual, expected.as_str())
            }
            HeaderExpectation::EqualsState(key) => match state.get(key) {
                Some(expected) => self.check_equals(actual, expected),
                None => ValidationResult::fail(format!(
                    "No saved state value under '{}' to compare header {} against",
                    key, self.header
                )),
            },
            HeaderExpectation::AbsoluteUrl {
                must_include_access_token,
            } => match actual {
                None => ValidationResult::fail(format!("Missing header {}", self.header)),
                Some(value) => check_absolute_url(&self.header, value, *must_include_access_token),
            },
        }
    }

    fn check_equals(&self, actual: Option<&str>, expected: &str) -> ValidationResult {
        match actual {
            Some(value) if value == expected => ValidationResult::ok(),
            Some(value) => ValidationResult::fail(format!(
                "Header {}: expected '{}', got '{}'",
                self.header, expected, value
            )),
            None => ValidationResult::fail(format!("Missing header {}", self.header)),
        }
    }
}

fn check_absolute_url(label: &str, value: &str, must_include_access_token: bool) -> ValidationResult {
    let url = match reqwest::Url::parse(value) {
        Ok(url) => url,
        Err(e) => {
            return ValidationResult::fail(format!(
                "{}: '{}' is not an absolute URL: {}",
                label, value, e
            ))
        }
    };
    if must_include_access_token
        && !url
            .query_pairs()
            .any(|(k, _)| k == crate::config::ACCESS_TOKEN_QUERY_PARAM)
    {
        return ValidationResult::fail(format!(
            "{}: URL '{}' is missing the access_token query parameter",
            label, value
        ));
    }
    ValidationResult::ok()
}

/// Specialized for the 409 conflict response: `X-WOPI-Lock` must equal a
/// literal or a saved state value. A missing header passes when the lock
/// is not required.
#[derive(Debug, Clone)]
pub struct LockMismatchValidator {
    pub expected_value: Option<String>,
    pub expected_state_key: Option<String>,
    pub is_required: bool,
}

impl LockMismatchValidator {
    fn validate(&self, response: &ResponseCapture, state: &StateMap) -> ValidationResult {
        let actual = match response.header(crate::config::HDR_WOPI_LOCK) {
            Some(value) => value,
            None => {
                return if self.is_required {
                    ValidationResult::fail(format!(
                        "Missing header {}",
                        crate::config::HDR_WOPI_LOCK
                    ))
                } else {
                    ValidationResult::ok()
                }
            }
        };

        let expected = match (&self.expected_state_key, &self.expected_value) {
            (Some(key), _) => match state.get(key) {
                Some(value) => value.to_string(),
                None => {
                    return ValidationResult::fail(format!(
                        "No saved state value under '{}' to compare the lock against",
                        key
                    ))
                }
            },
            (None, Some(literal)) => literal.clone(),
            (None, None) => return ValidationResult::ok(),
        };

        if actual == expected {
            ValidationResult::ok()
        } else {
            ValidationResult::fail(format!(
                "Expected {} '{}', got '{}'",
                crate::config::HDR_WOPI_LOCK,
                expected,
                actual
            ))
        }
    }
}

/// Parses the body as JSON and applies property validators to selected
/// tokens, aggregating every failure in declaration order.
#[derive(Debug, Clone)]
pub struct JsonContentValidator {
    pub properties: Vec<JsonPropertyValidator>,
}

impl JsonContentValidator {
    fn validate(&self, response: &ResponseCapture, state: &StateMap) -> ValidationResult {
        let text = match response.body_text() {
            Some(text) => text,
            None => return ValidationResult::fail("Response body is not UTF-8 text"),
        };
        let root: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return ValidationResult::fail(format!("JSON parse error: {}", e)),
        };

        let mut failures = Vec::new();
        for property in &self.properties {
            if let Some(message) = property.check(&root, state) {
                failures.push(message);
            }
        }
        ValidationResult::from_failures(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};
    use std::time::Duration;

    fn capture(status: u16, headers: &[(&'static str, &str)], body: &[u8]) -> ResponseCapture {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        ResponseCapture {
            status_code: status,
            status_text: String::new(),
            headers: map,
            body_bytes: body.to_vec(),
            elapsed: Duration::from_millis(1),
        }
    }

    fn no_resources() -> ResourceManager {
        ResourceManager::from_resources(vec![])
    }

    #[test]
    fn response_code_mismatch_message() {
        let v = Validator::ResponseCode(ResponseCodeValidator { expected: 409 });
        let result = v.validate(&capture(200, &[], b""), &no_resources(), &StateMap::new());
        assert_eq!(result.failures, vec!["Expected code 409, got 200".to_string()]);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let v = Validator::ResponseHeader(ResponseHeaderValidator {
            header: "X-WOPI-ItemVersion".to_string(),
            expectation: HeaderExpectation::EqualsLiteral("1".to_string()),
        });
        let response = capture(200, &[("x-wopi-itemversion", "1")], b"");
        assert!(v.validate(&response, &no_resources(), &StateMap::new()).is_ok());
    }

    #[test]
    fn header_absence_expectation() {
        let v = Validator::ResponseHeader(ResponseHeaderValidator {
            header: "X-WOPI-Lock".to_string(),
            expectation: HeaderExpectation::Absent,
        });
        assert!(v
            .validate(&capture(200, &[], b""), &no_resources(), &StateMap::new())
            .is_ok());
        assert!(!v
            .validate(
                &capture(200, &[("x-wopi-lock", "L1")], b""),
                &no_resources(),
                &StateMap::new()
            )
            .is_ok());
    }

    #[test]
    fn header_equals_saved_state() {
        let v = Validator::ResponseHeader(ResponseHeaderValidator {
            header: "X-WOPI-Lock".to_string(),
            expectation: HeaderExpectation::EqualsState("OrigLock".to_string()),
        });
        let mut state = StateMap::new();
        state.set("OrigLock", "L1");
        let response = capture(409, &[("x-wopi-lock", "L1")], b"");
        assert!(v.validate(&response, &no_resources(), &state).is_ok());
    }

    #[test]
    fn lock_mismatch_tolerates_missing_header_when_optional() {
        let optional = Validator::LockMismatch(LockMismatchValidator {
            expected_value: Some("L1".to_string()),
            expected_state_key: None,
            is_required: false,
        });
        assert!(optional
            .validate(&capture(409, &[], b""), &no_resources(), &StateMap::new())
            .is_ok());

        let required = Validator::LockMismatch(LockMismatchValidator {
            expected_value: Some("L1".to_string()),
            expected_state_key: None,
            is_required: true,
        });
        assert!(!required
            .validate(&capture(409, &[], b""), &no_resources(), &StateMap::new())
            .is_ok());
    }

    #[test]
    fn content_validator_compares_resource_bytes() {
        let resources = ResourceManager::from_resources(vec![crate::resources::Resource {
            id: "Doc".to_string(),
            file_name: "doc.wopitest".to_string(),
            bytes: b"expected bytes".to_vec(),
        }]);
        let v = Validator::ResponseContent(ResponseContentValidator {
            expected_resource_id: Some("Doc".to_string()),
            expected_state_key: None,
        });
        assert!(v
            .validate(
                &capture(200, &[], b"expected bytes"),
                &resources,
                &StateMap::new()
            )
            .is_ok());
        assert!(!v
            .validate(&capture(200, &[], b"other"), &resources, &StateMap::new())
            .is_ok());
    }

    #[test]
    fn json_parse_error_is_a_single_failure() {
        let v = Validator::JsonContent(JsonContentValidator {
            properties: Vec::new(),
        });
        let result = v.validate(
            &capture(200, &[], b"not json"),
            &no_resources(),
            &StateMap::new(),
        );
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].starts_with("JSON parse error"));
    }
}
