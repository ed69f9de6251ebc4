use std::collections::{BTreeMap, HashMap};

use crate::config::{
    ValidatorConfig, STATE_ACCESS_TOKEN, STATE_ACCESS_TOKEN_TTL, STATE_WOPI_ENDPOINT,
};
use crate::error::ValidatorError;

/// Per-case scratchpad: string keys written by state savers, read by
/// template expansion. Never crosses case boundaries.
#[derive(Debug, Clone, Default)]
pub struct StateMap {
    values: HashMap<String, String>,
}

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh map seeded with the endpoint context every case starts from.
    pub fn seeded(config: &ValidatorConfig) -> Self {
        let mut state = Self::new();
        state.set(STATE_WOPI_ENDPOINT, &config.wopi_endpoint);
        state.set(STATE_ACCESS_TOKEN, &config.access_token);
        state.set(STATE_ACCESS_TOKEN_TTL, config.token_ttl_secs.to_string());
        state
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Expand every `{name}` marker from the map, in a single pass.
    ///
    /// A marker is an identifier (`[A-Za-z_][A-Za-z0-9_]*`) enclosed in
    /// braces; anything else between braces (JSON bodies, format strings)
    /// is left alone. Replacement text is never re-scanned. A marker whose
    /// key is unset is an error.
    pub fn expand(&self, template: &str) -> Result<String, ValidatorError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if is_identifier(&after[..close]) => {
                    let name = &after[..close];
                    let value = self
                        .get(name)
                        .ok_or_else(|| ValidatorError::UnboundVariable(name.to_string()))?;
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Sorted copy for outcome snapshots, so diagnostics print stably.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
