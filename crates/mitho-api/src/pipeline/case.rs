//! JSON key case normalization
//!
//! Clients speak camelCase, handlers speak snake_case. Inbound object keys are
//! converted to snake_case and outbound keys to camelCase, recursively.
//! Conversions are memoized per direction in a bounded concurrent map.

use super::{is_json, rewrite_json_request, rewrite_json_response, RequestScope, Stage};
use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use convert_case::{Case, Casing};
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Hard ceiling on memoized keys per direction
pub const KEY_CACHE_CAPACITY: usize = 10_000;

/// One conversion direction
///
/// `reserved` counts entries plus in-flight inserts, so it never drops below
/// the map length and never exceeds the capacity.
#[derive(Debug, Default)]
struct Memo {
    entries: DashMap<String, String>,
    reserved: AtomicUsize,
}

impl Memo {
    fn reserve(&self, capacity: usize) -> bool {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        self.reserved.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Memoized key conversions
///
/// Once a direction reaches its capacity new keys are still converted, just
/// not remembered. The capacity holds under concurrent use.
#[derive(Debug)]
pub struct KeyCache {
    to_snake: Memo,
    to_camel: Memo,
    capacity: usize,
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::with_capacity(KEY_CACHE_CAPACITY)
    }
}

impl KeyCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_snake: Memo::default(),
            to_camel: Memo::default(),
            capacity,
        }
    }

    pub fn snake(&self, key: &str) -> String {
        if !key.contains(|c: char| c.is_ascii_uppercase()) {
            return key.to_string();
        }
        self.convert(&self.to_snake, key, Case::Snake)
    }

    pub fn camel(&self, key: &str) -> String {
        if !key.contains('_') {
            return key.to_string();
        }
        self.convert(&self.to_camel, key, Case::Camel)
    }

    /// Number of memoized keys as (to_snake, to_camel)
    pub fn len(&self) -> (usize, usize) {
        (self.to_snake.entries.len(), self.to_camel.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.to_snake.entries.is_empty() && self.to_camel.entries.is_empty()
    }

    fn convert(&self, memo: &Memo, key: &str, case: Case) -> String {
        if let Some(hit) = memo.entries.get(key) {
            return hit.value().clone();
        }
        let converted = key.to_case(case);
        if memo.reserve(self.capacity) {
            match memo.entries.entry(key.to_string()) {
                // Another caller stored it first
                Entry::Occupied(_) => memo.release(),
                Entry::Vacant(slot) => {
                    slot.insert(converted.clone());
                }
            }
        }
        converted
    }

    /// Rewrite every object key in `value` with `convert`
    pub fn rewrite_keys(&self, value: &mut Value, convert: fn(&Self, &str) -> String) {
        match value {
            Value::Object(map) => {
                let old = std::mem::take(map);
                let mut renamed = Map::with_capacity(old.len());
                for (key, mut v) in old {
                    self.rewrite_keys(&mut v, convert);
                    renamed.insert(convert(self, &key), v);
                }
                *map = renamed;
            }
            Value::Array(items) => {
                for v in items {
                    self.rewrite_keys(v, convert);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaseNormalizeStage {
    cache: Arc<KeyCache>,
}

impl CaseNormalizeStage {
    pub fn new(cache: Arc<KeyCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Stage for CaseNormalizeStage {
    fn name(&self) -> &'static str {
        "case_normalize"
    }

    async fn on_request(&self, _scope: &mut RequestScope, request: Request) -> Result<Request, AppError> {
        if !is_json(request.headers()) {
            return Ok(request);
        }
        rewrite_json_request(request, |value| self.cache.rewrite_keys(value, KeyCache::snake)).await
    }

    async fn on_response(&self, scope: &mut RequestScope, response: Response) -> Response {
        if !is_json(response.headers()) {
            return response;
        }
        let status = response.status();
        match rewrite_json_response(response, |value| self.cache.rewrite_keys(value, KeyCache::camel)).await {
            Ok(response) => response,
            Err(e) => {
                scope.record(e);
                let mut response = Response::default();
                *response.status_mut() = status;
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_inbound_keys_become_snake_case() {
        let cache = KeyCache::default();
        let mut body = json!({"firstName": "Ada", "refreshToken": "t", "email": "a@x.com"});
        cache.rewrite_keys(&mut body, KeyCache::snake);

        assert_eq!(body, json!({"first_name": "Ada", "refresh_token": "t", "email": "a@x.com"}));
    }

    #[test]
    fn test_outbound_keys_become_camel_case() {
        let cache = KeyCache::default();
        let mut body = json!({
            "success": true,
            "data": {"access_token": "a", "expires_in": 60, "user": {"last_name": "L"}},
            "items": [{"created_at": 1}]
        });
        cache.rewrite_keys(&mut body, KeyCache::camel);

        assert_eq!(body["data"]["accessToken"], "a");
        assert_eq!(body["data"]["expiresIn"], 60);
        assert_eq!(body["data"]["user"]["lastName"], "L");
        assert_eq!(body["items"][0]["createdAt"], 1);
    }

    #[test]
    fn test_values_are_not_rewritten() {
        let cache = KeyCache::default();
        let mut body = json!({"token_type": "first_name"});
        cache.rewrite_keys(&mut body, KeyCache::camel);
        assert_eq!(body, json!({"tokenType": "first_name"}));
    }

    #[test]
    fn test_cache_is_bounded() {
        let cache = KeyCache::with_capacity(3);
        for i in 0..10 {
            let key = format!("key_number_{}", char::from(b'a' + i));
            assert!(!cache.camel(&key).contains('_'));
        }
        assert_eq!(cache.len(), (0, 3));
    }

    #[test]
    fn test_cache_bound_holds_across_threads() {
        let cache = KeyCache::with_capacity(16);
        std::thread::scope(|scope| {
            for t in 0..8 {
                let cache = &cache;
                scope.spawn(move || {
                    for i in 0..200 {
                        // Half the keys are shared between threads
                        let owner = if i % 2 == 0 { 0 } else { t };
                        let key = format!("field_{owner}_{i}");
                        assert_eq!(cache.camel(&key), key.to_case(Case::Camel));
                    }
                });
            }
        });

        let (snake, camel) = cache.len();
        assert_eq!(snake, 0);
        assert!(camel > 0 && camel <= 16, "cache grew to {camel}");
    }

    proptest! {
        #[test]
        fn prop_snake_keys_survive_a_round_trip(
            words in prop::collection::vec("[a-z]{2,8}", 1..4)
        ) {
            let cache = KeyCache::default();
            let key = words.join("_");
            prop_assert_eq!(cache.snake(&cache.camel(&key)), key);
        }
    }
}
