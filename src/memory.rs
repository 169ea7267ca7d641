// Copyright 2025 Cloudflare, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hash map based in memory provider
//!
//! For testing only, not for production use

use crate::key::CacheKey;
use crate::provider::{CacheHandle, Provider};
use crate::request::CacheRequest;

use async_trait::async_trait;
use http::header::HeaderMap;
use parking_lot::RwLock;
use pingora_error::Result;
use pingora_http::ResponseHeader;
use std::collections::HashMap;
use std::sync::Arc;

struct StoredEntity {
    req_hdrs: HeaderMap,
    resp_hdrs: ResponseHeader,
}

/// Hash map based in memory provider
///
/// For testing only, not for production use. Header snapshots are stored per
/// cache key; there is no body storage because the decision engine never
/// transports bytes.
pub struct MemProvider {
    name: String,
    cached: Arc<RwLock<HashMap<String, StoredEntity>>>,
    // entities with a size hint above this are not admitted
    max_size: Option<u64>,
}

impl MemProvider {
    /// Create a new [MemProvider] with the given provider name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        MemProvider {
            name: name.into(),
            cached: Arc::new(RwLock::new(HashMap::new())),
            max_size: None,
        }
    }

    /// Reject entities whose size hint exceeds `max_size` bytes.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Store an entity under `key` directly, bypassing the create path.
    pub fn put(&self, key: &CacheKey, req_hdrs: HeaderMap, resp_hdrs: ResponseHeader) {
        self.cached.write().insert(
            key.as_str().to_string(),
            StoredEntity {
                req_hdrs,
                resp_hdrs,
            },
        );
    }

    /// Whether an entity is currently stored under `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cached.read().contains_key(key.as_str())
    }
}

#[async_trait]
impl Provider for MemProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_entity(
        &self,
        key: &CacheKey,
        _req: &CacheRequest,
    ) -> Result<Option<CacheHandle>> {
        if !self.cached.read().contains_key(key.as_str()) {
            return Ok(None);
        }
        Ok(Some(CacheHandle::new(key.clone(), Box::new(()))?))
    }

    async fn create_entity(
        &self,
        _req: &CacheRequest,
        key: &CacheKey,
        size_hint: Option<u64>,
    ) -> Result<Option<CacheHandle>> {
        if let (Some(max), Some(size)) = (self.max_size, size_hint) {
            if size > max {
                return Ok(None);
            }
        }
        // an unknown size (None) and a known empty body (Some(0)) are both
        // admitted; the hint is not a correctness requirement
        let handle = CacheHandle::new(key.clone(), Box::new(()))?;
        self.cached.write().insert(
            key.as_str().to_string(),
            StoredEntity {
                req_hdrs: HeaderMap::new(),
                resp_hdrs: handle.resp_hdrs.clone(),
            },
        );
        Ok(Some(handle))
    }

    async fn recall_headers(&self, handle: &mut CacheHandle, _req: &CacheRequest) -> Result<()> {
        use pingora_error::{ErrorType, OkOrErr};

        let cached = self.cached.read();
        let entity = cached
            .get(handle.key.as_str())
            .or_err(ErrorType::new("CacheRecallError"), "no such entity")?;
        handle.req_hdrs = entity.req_hdrs.clone();
        handle.resp_hdrs = entity.resp_hdrs.clone();
        Ok(())
    }

    async fn remove_url(&self, handle: &CacheHandle) -> Result<()> {
        // removing an absent entity is success, not an error
        self.cached.write().remove(handle.key.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use pingora_http::RequestHeader;

    fn any_request() -> CacheRequest {
        CacheRequest::new(RequestHeader::build("GET", b"/", None).unwrap())
    }

    fn stored_response() -> ResponseHeader {
        let mut resp = ResponseHeader::build(StatusCode::OK, None).unwrap();
        resp.insert_header("X-Stored", "yes").unwrap();
        resp
    }

    #[tokio::test]
    async fn test_open_then_recall() {
        let provider = MemProvider::new("memory");
        let key = CacheKey::new("http://example.com:80/a?");
        provider.put(&key, HeaderMap::new(), stored_response());

        let req = any_request();
        let mut handle = provider.open_entity(&key, &req).await.unwrap().unwrap();
        provider.recall_headers(&mut handle, &req).await.unwrap();
        assert_eq!(handle.resp_hdrs.headers.get("x-stored").unwrap(), "yes");
    }

    #[tokio::test]
    async fn test_open_absent_key_declines() {
        let provider = MemProvider::new("memory");
        let key = CacheKey::new("http://example.com:80/missing?");
        assert!(provider
            .open_entity(&key, &any_request())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_admission_by_size_hint() {
        let provider = MemProvider::new("memory").with_max_size(1024);
        let key = CacheKey::new("http://example.com:80/big?");
        let req = any_request();

        // too large: declined
        assert!(provider
            .create_entity(&req, &key, Some(2048))
            .await
            .unwrap()
            .is_none());
        // unknown size and known empty body are both admitted
        assert!(provider
            .create_entity(&req, &key, None)
            .await
            .unwrap()
            .is_some());
        assert!(provider
            .create_entity(&req, &key, Some(0))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let provider = MemProvider::new("memory");
        let key = CacheKey::new("http://example.com:80/gone?");
        provider.put(&key, HeaderMap::new(), stored_response());

        let handle = CacheHandle::new(key.clone(), Box::new(())).unwrap();
        provider.remove_url(&handle).await.unwrap();
        assert!(!provider.contains(&key));
        // removing again is still success
        provider.remove_url(&handle).await.unwrap();
    }
}
