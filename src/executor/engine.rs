use tracing::{info, warn};

use super::request::{execute_request, RequestContext};
use super::{CaseResult, CaseStatus, RequestOutcome};
use crate::catalog::filter::TestExecutionData;
use crate::catalog::{
    Catalog, Request, RequestBody, RequestClassification, TestCase,
};
use crate::config::{
    ValidatorConfig, HDR_WOPI_OVERRIDE, STATE_BASE_FILE_NAME, STATE_FILE, STATE_FILE_EXTENSION,
};
use crate::proof_key::ProofKeys;
use crate::resources::ResourceManager;
use crate::state::StateMap;
use crate::validators::ValidationResult;

/// Runs test cases strictly in sequence: one case at a time, one request
/// at a time within a case.
pub struct CaseRunner<'a> {
    pub catalog: &'a Catalog,
    pub resources: &'a ResourceManager,
    pub proof_keys: &'a ProofKeys,
    pub config: &'a ValidatorConfig,
    pub client: &'a reqwest::Client,
}

impl CaseRunner<'_> {
    pub async fn run_all(&self, selection: &[TestExecutionData<'_>]) -> Vec<CaseResult> {
        let mut results = Vec::with_capacity(selection.len());
        for (i, data) in selection.iter().enumerate() {
            info!(
                "Case {}/{}: {} (group {})",
                i + 1,
                selection.len(),
                data.case.name,
                data.group_name
            );
            let result = self.run_case(data.group_name, data.case).await;
            match result.status {
                CaseStatus::Pass => info!("  {} — pass", result.case_name),
                CaseStatus::Skipped => warn!("  {} — skipped", result.case_name),
                CaseStatus::Fail => {
                    warn!("  {} — fail", result.case_name);
                    for outcome in &result.request_outcomes {
                        for message in outcome.failure_messages() {
                            warn!("    {}: {}", outcome.request_name, message);
                        }
                    }
                }
            }
            results.push(result);
        }
        results
    }

    pub async fn run_case(&self, group_name: &str, case: &TestCase) -> CaseResult {
        self.run_case_at(group_name, case, true).await
    }

    /// State machine per case: Init → Setup? → RunRequests → Cleanup? →
    /// Report. `allow_followups` is false when the case itself runs as a
    /// prerequisite, so prerequisites never nest.
    async fn run_case_at(
        &self,
        group_name: &str,
        case: &TestCase,
        allow_followups: bool,
    ) -> CaseResult {
        let mut state = StateMap::seeded(self.config);
        let mut outcomes: Vec<RequestOutcome> = Vec::new();
        let mut skip_reason: Option<String> = None;

        match self.resources.file_name(&case.resource_id) {
            Ok(file_name) => {
                state.set(STATE_FILE, file_name);
                match file_name.rfind('.') {
                    Some(dot) => {
                        state.set(STATE_BASE_FILE_NAME, &file_name[..dot]);
                        state.set(STATE_FILE_EXTENSION, &file_name[dot..]);
                    }
                    None => {
                        state.set(STATE_BASE_FILE_NAME, file_name);
                    }
                }
            }
            Err(e) => {
                // Catalog validation makes this unreachable in a normal
                // run; still report it as a failed case, not a panic.
                return CaseResult {
                    case_name: case.name.clone(),
                    group_name: group_name.to_string(),
                    status: CaseStatus::Fail,
                    request_outcomes: vec![RequestOutcome {
                        request_name: "Setup".to_string(),
                        classification: RequestClassification::Standard,
                        status_code: None,
                        elapsed_ms: 0,
                        validation_failures: vec![ValidationResult::fail(e.to_string())],
                        state_after: state.snapshot(),
                    }],
                    final_fail_message: case.fail_message.clone(),
                };
            }
        }

        let ctx = RequestContext {
            client: self.client,
            resources: self.resources,
            proof_keys: self.proof_keys,
            category: case.category,
        };

        if case.upload_document_on_setup {
            let setup = setup_put_file(&case.resource_id);
            let outcome = execute_request(&ctx, &setup, &mut state).await;
            outcomes.push(outcome);
        }

        // Requests keep running after a failure: the suite exists to
        // collect as many diagnostics per case as possible.
        for request in &case.requests {
            let outcome = execute_request(&ctx, request, &mut state).await;
            outcomes.push(outcome);

            if let (true, Some(prereq_name)) = (allow_followups, &request.followup_prerequisite) {
                let Some(prereq) = self.catalog.prerequisite(prereq_name) else {
                    skip_reason = Some(format!("Unknown prerequisite '{}'", prereq_name));
                    break;
                };
                info!(
                    "  Prerequisite '{}' gating case '{}'",
                    prereq_name, case.name
                );
                let gate =
                    Box::pin(self.run_case_at(group_name, prereq, false)).await;
                if gate.status != CaseStatus::Pass {
                    skip_reason = Some(format!("Prerequisite '{}' failed", prereq_name));
                    break;
                }
            }
        }

        let run_cleanup = case.delete_document_on_tear_down
            || case.requests.iter().any(|r| r.always_run_cleanup);
        if run_cleanup {
            for request in &case.cleanup_requests {
                let outcome = execute_request(&ctx, request, &mut state).await;
                if outcome.failed() {
                    warn!(
                        "  Cleanup request '{}' failed for case '{}'",
                        request.name, case.name
                    );
                }
                outcomes.push(outcome);
            }
        }

        let failed = outcomes
            .iter()
            .any(|o| o.classification != RequestClassification::Cleanup && o.failed());
        let (status, final_fail_message) = if let Some(reason) = skip_reason {
            (CaseStatus::Skipped, Some(reason))
        } else if failed {
            (CaseStatus::Fail, case.fail_message.clone())
        } else {
            (CaseStatus::Pass, None)
        };

        CaseResult {
            case_name: case.name.clone(),
            group_name: group_name.to_string(),
            status,
            request_outcomes: outcomes,
            final_fail_message,
        }
    }
}

/// The synthesized setup upload: put the fixture bytes to the document so
/// the case starts from known content.
fn setup_put_file(resource_id: &str) -> Request {
    Request {
        name: "Setup.PutFile".to_string(),
        classification: RequestClassification::Standard,
        method: reqwest::Method::POST,
        url_template: "{WopiEndpoint}/contents".to_string(),
        header_templates: vec![(HDR_WOPI_OVERRIDE.to_string(), "PUT".to_string())],
        body_template: Some(RequestBody::Resource(resource_id.to_string())),
        expected_code: Some(200),
        expected_status_text: None,
        requires_proof_key: false,
        validators: Vec::new(),
        state_savers: Vec::new(),
        followup_prerequisite: None,
        always_run_cleanup: false,
    }
}
