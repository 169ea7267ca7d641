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

//! The storage provider capability contract
//!
//! Providers own the stored bytes and their persistence; the decision engine
//! only drives them through this interface. Every call uses the same three-way
//! outcome: `Ok(Some(..))` / `Ok(())` is success, `Ok(None)` means the
//! provider declines ("not applicable", try the next provider in the chain),
//! and `Err` is a backend fault that aborts the whole operation.

use crate::key::CacheKey;
use crate::request::CacheRequest;

use async_trait::async_trait;
use http::header::HeaderMap;
use http::StatusCode;
use pingora_error::Result;
use pingora_http::ResponseHeader;
use std::any::Any;

/// One stored (or about to be stored) response entity.
///
/// A handle is exclusively owned by the request that opened or created it; the
/// provider keeps owning the backing object. The header snapshots start empty
/// and are filled in by [Provider::recall_headers].
pub struct CacheHandle {
    /// The key the entity is stored under
    pub key: CacheKey,
    /// The provider owned reference to the backing object
    pub object: Box<dyn Any + Send + Sync>,
    /// The request headers captured when the entity was stored, used for the
    /// `Vary` comparison
    pub req_hdrs: HeaderMap,
    /// The response headers the provider will emit on a hit
    pub resp_hdrs: ResponseHeader,
}

impl CacheHandle {
    /// Create a handle with empty header snapshots.
    pub fn new(key: CacheKey, object: Box<dyn Any + Send + Sync>) -> Result<Self> {
        Ok(CacheHandle {
            key,
            object,
            req_hdrs: HeaderMap::new(),
            resp_hdrs: ResponseHeader::build(StatusCode::OK, None)?,
        })
    }

    /// Downcast the provider owned object to a concrete type.
    pub fn object_as<T: 'static>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }
}

/// A pluggable storage backend.
///
/// Providers are registered in a fixed, configuration determined order on a
/// [crate::ProviderChain] and must behave consistently no matter which of them
/// ends up serving a request. Calls are potentially blocking I/O on the
/// backing store; within one request they are awaited strictly in chain order.
///
/// Cross request races (two requests creating the same key) are the provider's
/// responsibility: it must supply at-most-one-writer or last-write-wins
/// semantics internally. This engine does no locking of its own.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The configured name of this provider, for binding and logging.
    fn name(&self) -> &str;

    /// Open the stored entity for `key`, if this provider has one.
    ///
    /// `Ok(None)` when the provider has no usable entity for the key.
    async fn open_entity(&self, key: &CacheKey, req: &CacheRequest)
        -> Result<Option<CacheHandle>>;

    /// Establish a new entity under `key` for the response about to stream.
    ///
    /// `size_hint` is the expected response size in bytes when known; `None`
    /// means unknown and `Some(0)` means a known empty body. It is only an
    /// admission control hint, never a correctness requirement. `Ok(None)`
    /// when this provider declines to admit the entity. No bytes are written
    /// by this call.
    async fn create_entity(
        &self,
        req: &CacheRequest,
        key: &CacheKey,
        size_hint: Option<u64>,
    ) -> Result<Option<CacheHandle>>;

    /// Populate the handle's stored request/response header snapshots.
    async fn recall_headers(&self, handle: &mut CacheHandle, req: &CacheRequest) -> Result<()>;

    /// Remove the stored entity behind `handle`.
    ///
    /// Removing an entity that is already gone is success, not an error.
    async fn remove_url(&self, handle: &CacheHandle) -> Result<()>;
}
