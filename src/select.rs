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

//! Entity selection, creation and removal
//!
//! The three operations that drive the provider chain for one request. They
//! share the chain's traversal contract but differ in how far they go:
//! selection layers `Vary` validation, freshness evaluation and the
//! conditional-request rewrite on top of the open; creation only binds;
//! removal broadcasts to every provider instead of stopping at the first
//! success.

use crate::accept::accept_headers;
use crate::request::{CacheRequest, CacheResponse};
use crate::vary::request_matches_vary;
use crate::{CacheRequestState, CACHE_REMOVE_ERROR};

use http::header;
use log::{debug, warn};
use pingora_error::{Error, Result};

/// The outcome of [CacheRequestState::select].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// A fresh entity was found; its headers are already reconciled into the
    /// outgoing response.
    Hit,
    /// No entity can serve this request; fetch from the origin. When a stale
    /// handle was retained, the request now carries the engine's validators
    /// and the fetch doubles as revalidation.
    Miss,
    /// An entity was found but is unusable for this request.
    Declined(DeclineReason),
}

impl CacheDecision {
    /// For logging and debugging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Declined(reason) => reason.as_str(),
        }
    }
}

/// Why a found entity could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    /// The provider failed to recall the stored header snapshots
    RecallFailed,
    /// The entity's `Vary` dimensions do not match this request
    VaryMismatch,
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecallFailed => "recall_failed",
            Self::VaryMismatch => "vary_mismatch",
        }
    }
}

impl CacheRequestState {
    /// Resolve `req` to a stored entity.
    ///
    /// Generates the cache key, opens the chain, validates `Vary`, evaluates
    /// freshness and, on a hit, reconciles the cached headers into `resp`.
    /// When the entity is stale and carries a validator (`ETag` or
    /// `Last-Modified`), `req` is rewritten into a conditional request: the
    /// client's own conditional headers are stripped (a snapshot is kept on
    /// this state) and the entity's validators installed, the stale handle is
    /// retained for the revalidation that the surrounding pipeline performs,
    /// and the call reports [CacheDecision::Miss].
    ///
    /// Key generation failures and provider errors are returned verbatim; a
    /// provider error aborts the chain without consulting later providers.
    pub async fn select(
        &mut self,
        req: &mut CacheRequest,
        resp: &mut CacheResponse,
    ) -> Result<CacheDecision> {
        let key = self.chain.generate_key(req)?;

        let Some((mut handle, provider)) = self.chain.open_entity(&key, req).await? else {
            return Ok(CacheDecision::Miss);
        };

        if let Err(e) = provider.recall_headers(&mut handle, req).await {
            // the entry is unusable; do not scan other providers for this defect
            warn!("cache: provider {} failed to recall headers for {key}: {e}", provider.name());
            return Ok(CacheDecision::Declined(DeclineReason::RecallFailed));
        }

        // Make sure the entity we found is the one content negotiation would
        // deliver: a variant negotiated under different header values must not
        // be served by mistake. First match wins: no fallback to later
        // providers once the first open succeeded.
        if !request_matches_vary(&handle, req) {
            debug!("cache: Vary header mismatch for {key}");
            return Ok(CacheDecision::Declined(DeclineReason::VaryMismatch));
        }

        self.provider_name = Some(provider.name().to_string());
        self.provider = Some(provider);

        if self.chain.freshness().is_fresh(&handle, req) {
            accept_headers(&handle, resp, false)?;
            self.handle = Some(handle);
            return Ok(CacheDecision::Hit);
        }

        debug!("cache: response for {key} is not fresh, replacing conditional request headers");

        // We can only revalidate with our own conditionals: snapshot and then
        // remove the client's.
        self.stale_headers = Some(req.header().headers.clone());
        req.strip_conditional_headers();

        let etag = handle.resp_hdrs.headers.get(header::ETAG).cloned();
        let last_modified = handle.resp_hdrs.headers.get(header::LAST_MODIFIED).cloned();
        if etag.is_none() && last_modified.is_none() {
            // nothing to revalidate against, a plain fetch will replace it
            return Ok(CacheDecision::Miss);
        }
        if let Some(etag) = etag {
            req.header_mut().insert_header(header::IF_NONE_MATCH, etag)?;
        }
        if let Some(last_modified) = last_modified {
            req.header_mut()
                .insert_header(header::IF_MODIFIED_SINCE, last_modified)?;
        }
        self.stale_handle = Some(handle);
        Ok(CacheDecision::Miss)
    }

    /// Establish a new storable entity for `req` across the chain.
    ///
    /// `size_hint` is the expected response size when known; providers use it
    /// only for admission control. On success the handle and the winning
    /// provider are bound to this state and `true` is returned; `false` means
    /// every provider declined. Nothing is written to storage by this call.
    pub async fn create_entity(
        &mut self,
        req: &CacheRequest,
        size_hint: Option<u64>,
    ) -> Result<bool> {
        let key = self.chain.generate_key(req)?;
        match self.chain.create_entity(req, &key, size_hint).await? {
            Some((handle, provider)) => {
                self.provider_name = Some(provider.name().to_string());
                self.provider = Some(provider);
                self.handle = Some(handle);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Invalidate the entity this request resolved to, across all providers.
    ///
    /// Uses the stale handle when one exists (invalidation during a
    /// revalidation flow), otherwise the active handle; with neither there is
    /// nothing to remove and the call is a no-op success.
    ///
    /// Removal is broadcast to every provider unconditionally: the same URL
    /// may hold a historical entity in more than one provider (a prior
    /// configuration may have used a different one). Each removal is best
    /// effort; failures are logged and reported as one aggregate error after
    /// all providers were attempted.
    pub async fn remove_url(&mut self) -> Result<()> {
        let Some(handle) = self.stale_handle.as_ref().or(self.handle.as_ref()) else {
            return Ok(());
        };
        debug!("cache: removing URL {} from the cache", handle.key);

        let mut failed = 0usize;
        for provider in self.chain.providers() {
            if let Err(e) = provider.remove_url(handle).await {
                warn!(
                    "cache: provider {} failed to remove {}: {e}",
                    provider.name(),
                    handle.key
                );
                failed += 1;
            }
        }
        if failed > 0 {
            return Error::e_explain(
                CACHE_REMOVE_ERROR,
                format!("{failed} provider(s) failed to remove the entity"),
            );
        }
        Ok(())
    }
}
