use regex::Regex;
use serde_json::Value;

use crate::config::ACCESS_TOKEN_QUERY_PARAM;
use crate::state::StateMap;

/// One assertion over a JSON-path-selected token of the response body.
///
/// When both a literal and a state key are configured, the saved state
/// value wins if it is present and coercible to the property's type;
/// otherwise the literal applies. When neither yields a value and the
/// token is present, the property passes.
#[derive(Debug, Clone)]
pub struct JsonPropertyValidator {
    pub key: String,
    pub kind: JsonPropertyKind,
    pub is_required: bool,
    pub expected_value: Option<String>,
    pub expected_state_key: Option<String>,
}

#[derive(Debug, Clone)]
pub enum JsonPropertyKind {
    Integer,
    Boolean,
    String,
    StringEndsWith,
    StringRegex { should_match: bool },
    AbsoluteUrl { must_include_access_token: bool },
    ArrayContains,
}

impl JsonPropertyValidator {
    /// Returns a failure message, or `None` when the property passes.
    pub fn check(&self, root: &Value, state: &StateMap) -> Option<String> {
        let token = select_token(root, &self.key);
        let present = token.map(token_is_nonempty).unwrap_or(false);
        if !present {
            return if self.is_required {
                Some(format!("Required property missing: {}", self.key))
            } else {
                None
            };
        }
        let token = token.unwrap_or(&Value::Null);

        // The URL check needs no expected value; it applies to the token
        // itself whenever it is present.
        if let JsonPropertyKind::AbsoluteUrl {
            must_include_access_token,
        } = &self.kind
        {
            let actual = token_text(token);
            let url = match reqwest::Url::parse(&actual) {
                Ok(url) => url,
                Err(e) => {
                    return Some(format!(
                        "Property {}: '{}' is not an absolute URL: {}",
                        self.key, actual, e
                    ))
                }
            };
            if *must_include_access_token
                && !url.query_pairs().any(|(k, _)| k == ACCESS_TOKEN_QUERY_PARAM)
            {
                return Some(format!(
                    "Property {}: URL '{}' is missing the access_token query parameter",
                    self.key, actual
                ));
            }
            return None;
        }

        let expected = match self.resolve_expected(state) {
            Some(expected) => expected,
            None => return None,
        };

        match &self.kind {
            JsonPropertyKind::Integer => {
                let want: i64 = match expected.parse() {
                    Ok(n) => n,
                    Err(_) => {
                        return Some(format!(
                            "Property {}: expected value '{}' is not an integer",
                            self.key, expected
                        ))
                    }
                };
                match token_as_i64(token) {
                    Some(actual) if actual == want => None,
                    Some(actual) => Some(format!(
                        "Property {}: expected {}, got {}",
                        self.key, want, actual
                    )),
                    None => Some(format!(
                        "Property {}: expected integer {}, got {}",
                        self.key, want, token
                    )),
                }
            }
            JsonPropertyKind::Boolean => {
                let want: bool = match expected.parse() {
                    Ok(b) => b,
                    Err(_) => {
                        return Some(format!(
                            "Property {}: expected value '{}' is not a boolean",
                            self.key, expected
                        ))
                    }
                };
                match token.as_bool() {
                    Some(actual) if actual == want => None,
                    Some(actual) => Some(format!(
                        "Property {}: expected {}, got {}",
                        self.key, want, actual
                    )),
                    None => Some(format!(
                        "Property {}: expected boolean {}, got {}",
                        self.key, want, token
                    )),
                }
            }
            JsonPropertyKind::String => {
                let actual = token_text(token);
                if actual == expected {
                    None
                } else {
                    Some(format!(
                        "Property {}: expected '{}', got '{}'",
                        self.key, expected, actual
                    ))
                }
            }
            JsonPropertyKind::StringEndsWith => {
                let actual = token_text(token);
                if actual.ends_with(&expected) {
                    None
                } else {
                    Some(format!(
                        "Property {}: '{}' does not end with '{}'",
                        self.key, actual, expected
                    ))
                }
            }
            JsonPropertyKind::StringRegex { should_match } => {
                let re = match Regex::new(&expected) {
                    Ok(re) => re,
                    Err(e) => {
                        return Some(format!(
                            "Property {}: invalid pattern '{}': {}",
                            self.key, expected, e
                        ))
                    }
                };
                let actual = token_text(token);
                let matched = re.is_match(&actual);
                if matched == *should_match {
                    None
                } else if *should_match {
                    Some(format!(
                        "Property {}: '{}' does not match /{}/",
                        self.key, actual, expected
                    ))
                } else {
                    Some(format!(
                        "Property {}: '{}' must not match /{}/",
                        self.key, actual, expected
                    ))
                }
            }
            JsonPropertyKind::AbsoluteUrl { .. } => None,
            JsonPropertyKind::ArrayContains => {
                let items = match token.as_array() {
                    Some(items) => items,
                    None => {
                        return Some(format!("Property {}: expected an array, got {}", self.key, token))
                    }
                };
                let found = items
                    .iter()
                    .any(|item| token_text(item).eq_ignore_ascii_case(&expected));
                if found {
                    None
                } else {
                    Some(format!(
                        "Property {}: array does not contain '{}'",
                        self.key, expected
                    ))
                }
            }
        }
    }

    /// Saved state wins when present and coercible; literal otherwise.
    fn resolve_expected(&self, state: &StateMap) -> Option<String> {
        if let Some(key) = &self.expected_state_key {
            if let Some(value) = state.get(key) {
                if self.coercible(value) {
                    return Some(value.to_string());
                }
            }
        }
        self.expected_value.clone()
    }

    fn coercible(&self, value: &str) -> bool {
        match self.kind {
            JsonPropertyKind::Integer => value.parse::<i64>().is_ok(),
            JsonPropertyKind::Boolean => value.parse::<bool>().is_ok(),
            _ => true,
        }
    }
}

fn token_is_nonempty(token: &Value) -> bool {
    match token {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn token_as_i64(token: &Value) -> Option<i64> {
    match token {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Textual form of a token: strings verbatim, everything else rendered.
fn token_text(token: &Value) -> String {
    match token {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Walk a dot path with optional `[index]` array steps, e.g.
/// `Children[0].Url` or `UserInfo.UserId`.
pub fn select_token<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        let (name, indices) = split_segment(segment)?;
        if !name.is_empty() {
            current = current.get(name)?;
        }
        for index in indices {
            current = current.get(index)?;
        }
    }
    Some(current)
}

fn split_segment(segment: &str) -> Option<(&str, Vec<usize>)> {
    match segment.find('[') {
        None => Some((segment, Vec::new())),
        Some(open) => {
            let name = &segment[..open];
            let mut indices = Vec::new();
            let mut rest = &segment[open..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let close = stripped.find(']')?;
                indices.push(stripped[..close].parse().ok()?);
                rest = &stripped[close + 1..];
            }
            if rest.is_empty() {
                Some((name, indices))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator(kind: JsonPropertyKind, key: &str) -> JsonPropertyValidator {
        JsonPropertyValidator {
            key: key.to_string(),
            kind,
            is_required: false,
            expected_value: None,
            expected_state_key: None,
        }
    }

    #[test]
    fn select_token_walks_nested_paths() {
        let root = json!({"UserInfo": {"UserId": "abc"}, "Children": [{"Url": "u0"}]});
        assert_eq!(
            select_token(&root, "UserInfo.UserId"),
            Some(&json!("abc"))
        );
        assert_eq!(select_token(&root, "Children[0].Url"), Some(&json!("u0")));
        assert_eq!(select_token(&root, "Missing.Path"), None);
    }

    #[test]
    fn absent_optional_property_passes() {
        let root = json!({"BaseFileName": "x.docx"});
        let v = validator(JsonPropertyKind::String, "HostEditUrl");
        assert_eq!(v.check(&root, &StateMap::new()), None);
    }

    #[test]
    fn absent_required_property_fails() {
        let root = json!({});
        let mut v = validator(JsonPropertyKind::String, "HostEditUrl");
        v.is_required = true;
        let msg = v.check(&root, &StateMap::new()).unwrap();
        assert!(msg.contains("Required property missing"));
    }

    #[test]
    fn regex_negative_match_passes() {
        let root = json!({"UserId": "abc"});
        let mut v = validator(
            JsonPropertyKind::StringRegex {
                should_match: false,
            },
            "UserId",
        );
        v.expected_value = Some(r"^\d+$".to_string());
        assert_eq!(v.check(&root, &StateMap::new()), None);
    }

    #[test]
    fn regex_positive_mismatch_fails() {
        let root = json!({"UserId": "abc"});
        let mut v = validator(
            JsonPropertyKind::StringRegex { should_match: true },
            "UserId",
        );
        v.expected_value = Some(r"^\d+$".to_string());
        assert!(v.check(&root, &StateMap::new()).is_some());
    }

    #[test]
    fn state_value_wins_over_literal_when_coercible() {
        let root = json!({"Size": 7});
        let mut v = validator(JsonPropertyKind::Integer, "Size");
        v.expected_value = Some("99".to_string());
        v.expected_state_key = Some("SavedSize".to_string());
        let mut state = StateMap::new();
        state.set("SavedSize", "7");
        assert_eq!(v.check(&root, &state), None);
    }

    #[test]
    fn literal_applies_when_state_value_not_coercible() {
        let root = json!({"Size": 99});
        let mut v = validator(JsonPropertyKind::Integer, "Size");
        v.expected_value = Some("99".to_string());
        v.expected_state_key = Some("SavedSize".to_string());
        let mut state = StateMap::new();
        state.set("SavedSize", "not-a-number");
        assert_eq!(v.check(&root, &state), None);
    }

    #[test]
    fn no_expected_value_passes_when_token_present() {
        let root = json!({"Version": "v1"});
        let v = validator(JsonPropertyKind::String, "Version");
        assert_eq!(v.check(&root, &StateMap::new()), None);
    }

    #[test]
    fn boolean_mismatch_fails() {
        let root = json!({"SupportsLocks": false});
        let mut v = validator(JsonPropertyKind::Boolean, "SupportsLocks");
        v.expected_value = Some("true".to_string());
        assert!(v.check(&root, &StateMap::new()).is_some());
    }

    #[test]
    fn ends_with_checks_suffix() {
        let root = json!({"BaseFileName": "doc.wopitest"});
        let mut v = validator(JsonPropertyKind::StringEndsWith, "BaseFileName");
        v.expected_value = Some(".wopitest".to_string());
        assert_eq!(v.check(&root, &StateMap::new()), None);
        v.expected_value = Some(".docx".to_string());
        assert!(v.check(&root, &StateMap::new()).is_some());
    }

    #[test]
    fn absolute_url_property_parses_and_checks_token_param() {
        let root = json!({
            "HostViewUrl": "http://host/view?access_token=tok",
            "HostEditUrl": "http://host/edit",
            "DownloadUrl": "relative/path"
        });
        let ok = validator(
            JsonPropertyKind::AbsoluteUrl {
                must_include_access_token: true,
            },
            "HostViewUrl",
        );
        assert_eq!(ok.check(&root, &StateMap::new()), None);

        let missing_token = validator(
            JsonPropertyKind::AbsoluteUrl {
                must_include_access_token: true,
            },
            "HostEditUrl",
        );
        assert!(missing_token.check(&root, &StateMap::new()).is_some());

        let relative = validator(
            JsonPropertyKind::AbsoluteUrl {
                must_include_access_token: false,
            },
            "DownloadUrl",
        );
        assert!(relative.check(&root, &StateMap::new()).is_some());
    }

    #[test]
    fn array_contains_is_case_insensitive() {
        let root = json!({"SupportedShareUrlTypes": ["ReadOnly", "ReadWrite"]});
        let mut v = validator(JsonPropertyKind::ArrayContains, "SupportedShareUrlTypes");
        v.expected_value = Some("readonly".to_string());
        assert_eq!(v.check(&root, &StateMap::new()), None);
        v.expected_value = Some("EditOnly".to_string());
        assert!(v.check(&root, &StateMap::new()).is_some());
    }
}
