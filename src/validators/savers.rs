use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::warn;

use super::json::select_token;
use crate::executor::ResponseCapture;
use crate::state::StateMap;

/// Extracts a value from a captured response into the case state map.
///
/// Savers are not validators: they write state and never fail the request
/// on their own. A source that is absent is logged and skipped, so later
/// templates referencing the key surface the real diagnostic.
#[derive(Debug, Clone)]
pub enum StateSaver {
    /// Copy a response header value.
    ResponseHeader { header: String, save_as: String },
    /// Copy the textual form of a JSON-path-selected body token.
    JsonProperty { path: String, save_as: String },
    /// Copy the raw body: text when UTF-8, base-64 otherwise.
    ResponseBody { save_as: String },
    /// Unconditional literal set.
    Literal { key: String, value: String },
}

impl StateSaver {
    pub fn apply(&self, response: &ResponseCapture, state: &mut StateMap) {
        match self {
            StateSaver::ResponseHeader { header, save_as } => {
                match response.header(header) {
                    Some(value) => state.set(save_as.clone(), value),
                    None => warn!(
                        "State saver: header {} absent, nothing saved under '{}'",
                        header, save_as
                    ),
                }
            }
            StateSaver::JsonProperty { path, save_as } => {
                let token = response
                    .body_text()
                    .and_then(|text| serde_json::from_str::<serde_json::Value>(text).ok())
                    .and_then(|root| select_token(&root, path).cloned());
                match token {
                    Some(serde_json::Value::String(s)) => state.set(save_as.clone(), s),
                    Some(other) => state.set(save_as.clone(), other.to_string()),
                    None => warn!(
                        "State saver: JSON property {} absent, nothing saved under '{}'",
                        path, save_as
                    ),
                }
            }
            StateSaver::ResponseBody { save_as } => match response.body_text() {
                Some(text) => state.set(save_as.clone(), text),
                None => state.set(save_as.clone(), BASE64.encode(&response.body_bytes)),
            },
            StateSaver::Literal { key, value } => state.set(key.clone(), value.clone()),
        }
    }
}
