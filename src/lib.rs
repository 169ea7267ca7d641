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

//! The HTTP response-cache decision engine.
//!
//! Given an inbound request, this crate decides whether a previously stored
//! response entity may satisfy it, prepares conditional revalidation when the
//! entity is stale, and manages entity creation and removal across an ordered
//! chain of interchangeable storage providers. It owns none of the actual
//! bytes: providers implement storage, the surrounding server implements the
//! HTTP pipeline, this crate implements the decision.
//!
//! The per-request entry point is [CacheRequestState]; the per-configuration
//! object is [ProviderChain]. A typical flow:
//!
//! ```ignore
//! let chain = Arc::new(ProviderChain::new(providers));
//! // per request:
//! let mut state = CacheRequestState::new(chain.clone());
//! match state.select(&mut req, &mut resp).await? {
//!     CacheDecision::Hit => { /* serve resp, body via state.handle() */ }
//!     CacheDecision::Miss | CacheDecision::Declined(_) => {
//!         // fetch from origin; req may now carry revalidation conditionals
//!     }
//! }
//! ```

use http::header::HeaderMap;
use pingora_error::ErrorType;
use std::sync::Arc;

pub mod accept;
pub mod chain;
pub mod freshness;
pub mod key;
pub mod memory;
pub mod provider;
pub mod request;
pub mod select;
mod vary;

pub use accept::accept_headers;
pub use chain::ProviderChain;
pub use freshness::{FreshnessEval, SimpleFreshness};
pub use key::{generate_key, CacheKey, KeyGenerator};
pub use memory::MemProvider;
pub use provider::{CacheHandle, Provider};
pub use request::{CacheRequest, CacheResponse, ProxyMode};
pub use select::{CacheDecision, DeclineReason};

/// Cache key generation failed before any provider was touched.
pub const KEY_GENERATION_ERROR: ErrorType = ErrorType::new("KeyGenerationError");
/// One or more providers failed during a removal broadcast.
pub const CACHE_REMOVE_ERROR: ErrorType = ErrorType::new("CacheRemoveError");

/// The per-request cache decision state.
///
/// Created at request start, mutated by [select](Self::select),
/// [create_entity](Self::create_entity) and [remove_url](Self::remove_url),
/// and discarded at request end. It is exclusively owned by its request and
/// never shared, so it needs no synchronization.
///
/// At most one active handle and one stale handle exist at any time. The
/// stale handle is set exactly when a freshness check failed for an otherwise
/// `Vary`-matching entity that carries a validator. Once a provider is bound
/// by a successful open or create, it stays bound for the rest of the request.
pub struct CacheRequestState {
    chain: Arc<ProviderChain>,
    provider: Option<Arc<dyn Provider>>,
    provider_name: Option<String>,
    handle: Option<CacheHandle>,
    stale_handle: Option<CacheHandle>,
    stale_headers: Option<HeaderMap>,
}

impl CacheRequestState {
    /// Create the decision state for one request over the given chain.
    pub fn new(chain: Arc<ProviderChain>) -> Self {
        CacheRequestState {
            chain,
            provider: None,
            provider_name: None,
            handle: None,
            stale_handle: None,
            stale_headers: None,
        }
    }

    /// The provider bound by the last successful open or create.
    pub fn provider(&self) -> Option<&Arc<dyn Provider>> {
        self.provider.as_ref()
    }

    /// The name of the bound provider.
    pub fn provider_name(&self) -> Option<&str> {
        self.provider_name.as_deref()
    }

    /// The active handle (set on a hit or a successful create).
    pub fn handle(&self) -> Option<&CacheHandle> {
        self.handle.as_ref()
    }

    /// Hand the active handle over to the surrounding pipeline.
    pub fn take_handle(&mut self) -> Option<CacheHandle> {
        self.handle.take()
    }

    /// The expired handle retained for revalidation, if any.
    pub fn stale_handle(&self) -> Option<&CacheHandle> {
        self.stale_handle.as_ref()
    }

    /// Hand the stale handle over, e.g. to freshen it after a 304.
    pub fn take_stale_handle(&mut self) -> Option<CacheHandle> {
        self.stale_handle.take()
    }

    /// The inbound headers as they were before the conditional rewrite.
    ///
    /// Set by [select](Self::select) when a stale entity was found; the
    /// pipeline restores these when answering the client after revalidation.
    pub fn stale_headers(&self) -> Option<&HeaderMap> {
        self.stale_headers.as_ref()
    }

    /// Take ownership of the saved inbound headers.
    pub fn take_stale_headers(&mut self) -> Option<HeaderMap> {
        self.stale_headers.take()
    }
}
