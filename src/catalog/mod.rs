pub mod filter;
pub mod parser;

use serde::Serialize;

use crate::error::ValidatorError;
use crate::resources::ResourceDecl;
use crate::validators::savers::StateSaver;
use crate::validators::Validator;

// ============================================================================
// Catalog data model — immutable after parse
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestCategory {
    WopiCore,
    OfficeNativeClient,
    OfficeOnline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCaseType {
    Default,
    Prerequisite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestClassification {
    Standard,
    Cleanup,
    Prerequisite,
}

/// Request body template: inline text (subject to variable expansion) or
/// the raw bytes of a declared resource.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Text(String),
    Resource(String),
}

/// A single HTTP exchange description.
#[derive(Debug, Clone)]
pub struct Request {
    pub name: String,
    pub classification: RequestClassification,
    pub method: reqwest::Method,
    pub url_template: String,
    /// Ordered so headers go on the wire in declaration order.
    pub header_templates: Vec<(String, String)>,
    pub body_template: Option<RequestBody>,
    pub expected_code: Option<u16>,
    pub expected_status_text: Option<String>,
    pub requires_proof_key: bool,
    pub validators: Vec<Validator>,
    pub state_savers: Vec<StateSaver>,
    pub followup_prerequisite: Option<String>,
    pub always_run_cleanup: bool,
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub description: String,
    pub category: TestCategory,
    pub case_type: TestCaseType,
    pub resource_id: String,
    pub upload_document_on_setup: bool,
    pub delete_document_on_tear_down: bool,
    pub requests: Vec<Request>,
    pub cleanup_requests: Vec<Request>,
    pub fail_message: Option<String>,
    pub documentation_link: Option<String>,
    pub ui_screenshot: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TestGroup {
    pub name: String,
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub resources: Vec<ResourceDecl>,
    pub prereq_cases: Vec<TestCase>,
    pub groups: Vec<TestGroup>,
}

impl Catalog {
    pub fn prerequisite(&self, name: &str) -> Option<&TestCase> {
        self.prereq_cases.iter().find(|c| c.name == name)
    }

    fn cases(&self) -> impl Iterator<Item = &TestCase> {
        self.prereq_cases
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.cases.iter()))
    }

    /// Structural checks that must hold before any request is issued:
    /// unique case names, at least one standard request per case, resource
    /// and prerequisite references resolve.
    pub fn validate(&self) -> Result<(), ValidatorError> {
        let mut seen = std::collections::HashSet::new();
        for case in self.cases() {
            if !seen.insert(case.name.as_str()) {
                return Err(ValidatorError::Configuration(format!(
                    "duplicate test case name '{}'",
                    case.name
                )));
            }
            if case.requests.is_empty() {
                return Err(ValidatorError::Configuration(format!(
                    "test case '{}' declares no requests",
                    case.name
                )));
            }
            if case.resource_id.is_empty() {
                return Err(ValidatorError::Configuration(format!(
                    "test case '{}' has no resource id",
                    case.name
                )));
            }
            if !self.resources.iter().any(|r| r.id == case.resource_id) {
                return Err(ValidatorError::Configuration(format!(
                    "test case '{}' references unknown resource '{}'",
                    case.name, case.resource_id
                )));
            }
            for request in case.requests.iter().chain(case.cleanup_requests.iter()) {
                if let Some(prereq) = &request.followup_prerequisite {
                    if self.prerequisite(prereq).is_none() {
                        return Err(ValidatorError::Configuration(format!(
                            "request '{}' of case '{}' references unknown prerequisite '{}'",
                            request.name, case.name, prereq
                        )));
                    }
                }
                if let Some(RequestBody::Resource(id)) = &request.body_template {
                    if !self.resources.iter().any(|r| &r.id == id) {
                        return Err(ValidatorError::Configuration(format!(
                            "request '{}' of case '{}' references unknown resource '{}'",
                            request.name, case.name, id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
