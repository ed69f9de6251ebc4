use std::time::Instant;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use super::{RequestOutcome, ResponseCapture};
use crate::catalog::{Request, RequestBody, TestCategory};
use crate::config::{
    ACCESS_TOKEN_QUERY_PARAM, DEFAULT_USER_AGENT, HDR_WOPI_PROOF, HDR_WOPI_PROOF_OLD,
    HDR_WOPI_TIMESTAMP, OFFICE_NATIVE_USER_AGENT, STATE_ACCESS_TOKEN,
};
use crate::proof_key::{canonical_payload, wopi_timestamp, ProofKeys};
use crate::resources::ResourceManager;
use crate::state::StateMap;
use crate::validators::ValidationResult;

/// Everything a request execution borrows from its surrounding case.
pub struct RequestContext<'a> {
    pub client: &'a reqwest::Client,
    pub resources: &'a ResourceManager,
    pub proof_keys: &'a ProofKeys,
    pub category: TestCategory,
}

/// Drive one catalog request to a `RequestOutcome`.
///
/// Failures never propagate as errors from here: an unbound variable, a
/// signing failure or a transport error all land as validation failures on
/// the outcome so the case can keep collecting diagnostics.
pub async fn execute_request(
    ctx: &RequestContext<'_>,
    request: &Request,
    state: &mut StateMap,
) -> RequestOutcome {
    let started = Instant::now();

    let capture = match send(ctx, request, state).await {
        Ok(capture) => capture,
        Err(message) => {
            return RequestOutcome {
                request_name: request.name.clone(),
                classification: request.classification,
                status_code: None,
                elapsed_ms: started.elapsed().as_millis(),
                validation_failures: vec![ValidationResult::fail(message)],
                state_after: state.snapshot(),
            }
        }
    };

    let mut failures = Vec::new();
    if let Some(expected) = request.expected_code {
        if capture.status_code != expected {
            failures.push(ValidationResult::fail(format!(
                "Expected code {}, got {}",
                expected, capture.status_code
            )));
        }
    }
    if let Some(expected) = &request.expected_status_text {
        if &capture.status_text != expected {
            failures.push(ValidationResult::fail(format!(
                "Expected status text '{}', got '{}'",
                expected, capture.status_text
            )));
        }
    }
    for validator in &request.validators {
        let result = validator.validate(&capture, ctx.resources, state);
        if !result.is_ok() {
            failures.push(result);
        }
    }

    // Savers run after the validators, in declaration order, whether or
    // not anything failed.
    for saver in &request.state_savers {
        saver.apply(&capture, state);
    }

    RequestOutcome {
        request_name: request.name.clone(),
        classification: request.classification,
        status_code: Some(capture.status_code),
        elapsed_ms: capture.elapsed.as_millis(),
        validation_failures: failures,
        state_after: state.snapshot(),
    }
}

/// Expand, sign, issue and capture. Any failure comes back as the message
/// that will be attached to the outcome.
async fn send(
    ctx: &RequestContext<'_>,
    request: &Request,
    state: &StateMap,
) -> Result<ResponseCapture, String> {
    let expanded = state
        .expand(&request.url_template)
        .map_err(|e| e.to_string())?;
    let mut url = reqwest::Url::parse(&expanded)
        .map_err(|e| format!("Invalid request URL '{}': {}", expanded, e))?;

    // Every WOPI request authenticates; add the token unless the template
    // already carries one.
    let has_token = url
        .query_pairs()
        .any(|(k, _)| k == ACCESS_TOKEN_QUERY_PARAM);
    if !has_token {
        let token = state.get(STATE_ACCESS_TOKEN).unwrap_or_default().to_string();
        url.query_pairs_mut()
            .append_pair(ACCESS_TOKEN_QUERY_PARAM, &token);
    }

    let mut headers = HeaderMap::new();
    for (name, template) in &request.header_templates {
        let value = state.expand(template).map_err(|e| e.to_string())?;
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("Invalid header name '{}': {}", name, e))?;
        let header_value = HeaderValue::from_str(&value)
            .map_err(|e| format!("Invalid value for header '{}': {}", name, e))?;
        headers.append(header_name, header_value);
    }

    let body: Option<Vec<u8>> = match &request.body_template {
        None => None,
        Some(RequestBody::Text(template)) => Some(
            state
                .expand(template)
                .map_err(|e| e.to_string())?
                .into_bytes(),
        ),
        Some(RequestBody::Resource(id)) => Some(
            ctx.resources
                .contents(id)
                .map_err(|e| e.to_string())?
                .to_vec(),
        ),
    };

    if request.requires_proof_key {
        let token = state.get(STATE_ACCESS_TOKEN).unwrap_or_default();
        let timestamp = wopi_timestamp(Utc::now());
        // A signing failure mid-run is handled like a transport error.
        let payload = canonical_payload(token, url.as_str(), timestamp)
            .map_err(|e| format!("Transport error: {}", e))?;
        insert_header(&mut headers, HDR_WOPI_TIMESTAMP, &timestamp.to_string())?;
        insert_header(&mut headers, HDR_WOPI_PROOF, &ctx.proof_keys.sign_current(&payload))?;
        insert_header(
            &mut headers,
            HDR_WOPI_PROOF_OLD,
            &ctx.proof_keys.sign_old(&payload),
        )?;
    }

    let user_agent = if ctx.category == TestCategory::OfficeNativeClient {
        OFFICE_NATIVE_USER_AGENT
    } else {
        DEFAULT_USER_AGENT
    };
    insert_header(&mut headers, reqwest::header::USER_AGENT.as_str(), user_agent)?;

    debug!("{} {}", request.method, url);
    let mut builder = ctx
        .client
        .request(request.method.clone(), url)
        .headers(headers);
    if let Some(bytes) = body {
        builder = builder.body(bytes);
    }

    let started = Instant::now();
    let response = builder
        .send()
        .await
        .map_err(|e| format!("Transport error: {}", e))?;

    let status = response.status();
    let response_headers = response.headers().clone();
    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| format!("Transport error: {}", e))?;

    Ok(ResponseCapture {
        status_code: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers: response_headers,
        body_bytes: body_bytes.to_vec(),
        elapsed: started.elapsed(),
    })
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), String> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| format!("Invalid header name '{}': {}", name, e))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| format!("Invalid value for header '{}': {}", name, e))?;
    headers.insert(header_name, header_value);
    Ok(())
}
