//! Input sanitization
//!
//! Strips every HTML tag from string values of JSON request bodies. Credential
//! fields are left byte-exact so that hashing and token lookup see exactly
//! what the client sent.

use super::{is_json, rewrite_json_request, RequestScope, Stage};
use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::Request, http::Method};
use serde_json::Value;
use std::collections::HashSet;

/// Object keys whose string values are never rewritten
pub const CREDENTIAL_FIELDS: &[&str] = &["password", "refresh_token", "refreshToken"];

pub struct SanitizeStage {
    cleaner: ammonia::Builder<'static>,
}

impl std::fmt::Debug for SanitizeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SanitizeStage").finish_non_exhaustive()
    }
}

impl Default for SanitizeStage {
    fn default() -> Self {
        Self::new()
    }
}

impl SanitizeStage {
    pub fn new() -> Self {
        let mut cleaner = ammonia::Builder::empty();
        // Drop the content of these along with the tag
        cleaner.clean_content_tags(HashSet::from(["script", "style"]));
        Self { cleaner }
    }

    /// Strip markup from one string
    pub fn clean(&self, input: &str) -> String {
        if !input.contains(['<', '>', '&']) {
            return input.to_string();
        }
        self.cleaner.clean(input).to_string()
    }

    /// Recursively clean every string value, skipping credential fields
    pub fn clean_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => *s = self.clean(s),
            Value::Array(items) => items.iter_mut().for_each(|v| self.clean_value(v)),
            Value::Object(map) => {
                for (key, v) in map.iter_mut() {
                    if !CREDENTIAL_FIELDS.contains(&key.as_str()) {
                        self.clean_value(v);
                    }
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Stage for SanitizeStage {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    async fn on_request(&self, _scope: &mut RequestScope, request: Request) -> Result<Request, AppError> {
        if matches!(*request.method(), Method::GET | Method::HEAD) || !is_json(request.headers()) {
            return Ok(request);
        }
        rewrite_json_request(request, |value| self.clean_value(value)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_tags_are_stripped() {
        let stage = SanitizeStage::new();
        assert_eq!(stage.clean("<b>Ada</b>"), "Ada");
        assert_eq!(stage.clean("<script>alert(1)</script>Ada"), "Ada");
        assert_eq!(stage.clean("<img src=x onerror=alert(1)>"), "");
    }

    #[test]
    fn test_credentials_are_untouched() {
        let stage = SanitizeStage::new();
        let mut body = json!({
            "first_name": "<i>Ada</i>",
            "password": "<p>ss&w0rd",
            "refreshToken": "a<b>c",
            "nested": [{"note": "<u>x</u>"}]
        });

        stage.clean_value(&mut body);

        assert_eq!(body["first_name"], "Ada");
        assert_eq!(body["password"], "<p>ss&w0rd");
        assert_eq!(body["refreshToken"], "a<b>c");
        assert_eq!(body["nested"][0]["note"], "x");
    }

    proptest! {
        #[test]
        fn prop_plain_text_is_unchanged(s in "[a-zA-Z0-9 @._'-]{0,64}") {
            let stage = SanitizeStage::new();
            prop_assert_eq!(stage.clean(&s), s);
        }

        #[test]
        fn prop_output_has_no_tags(s in ".{0,64}") {
            let stage = SanitizeStage::new();
            let cleaned = stage.clean(&s);
            prop_assert!(!cleaned.contains('<'));
        }
    }
}
