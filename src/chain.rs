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

//! The ordered provider chain
//!
//! The chain owns the configuration shared by every request: the ordered
//! providers, the optional key generator override and the freshness
//! evaluator. Creation and selection traverse it front to back and stop at the
//! first provider that succeeds; a decline yields to the next provider; any
//! error aborts the traversal verbatim. Correctness over availability: a
//! corrupt backend must surface, not be papered over by a later provider.

use crate::freshness::{FreshnessEval, SimpleFreshness};
use crate::key::{self, CacheKey, KeyGenerator};
use crate::provider::{CacheHandle, Provider};
use crate::request::CacheRequest;

use pingora_error::{Context, Result};
use std::sync::Arc;

/// An ordered sequence of [Provider]s plus the shared decision configuration.
///
/// The order is significant and preserved for the lifetime of the
/// configuration: the first provider to succeed wins.
pub struct ProviderChain {
    providers: Vec<Arc<dyn Provider>>,
    key_generator: Option<KeyGenerator>,
    freshness: Arc<dyn FreshnessEval>,
}

impl ProviderChain {
    /// Build a chain over the given providers, in the given order.
    ///
    /// Uses the default key generator ([key::generate_key]) and the
    /// `Expires` based [SimpleFreshness] evaluator until overridden.
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        ProviderChain {
            providers,
            key_generator: None,
            freshness: Arc::new(SimpleFreshness),
        }
    }

    /// Replace the default key generator.
    pub fn with_key_generator(mut self, generator: KeyGenerator) -> Self {
        self.key_generator = Some(generator);
        self
    }

    /// Replace the freshness evaluator.
    pub fn with_freshness(mut self, freshness: Arc<dyn FreshnessEval>) -> Self {
        self.freshness = freshness;
        self
    }

    /// The configured providers, in traversal order.
    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub(crate) fn freshness(&self) -> &dyn FreshnessEval {
        self.freshness.as_ref()
    }

    pub(crate) fn generate_key(&self, req: &CacheRequest) -> Result<CacheKey> {
        match self.key_generator.as_ref() {
            Some(generator) => generator(req).err_context(|| "while generating the cache key"),
            None => key::generate_key(req),
        }
    }

    /// Open `key` against the chain.
    ///
    /// Returns the handle and the provider that opened it, or `None` when the
    /// chain is exhausted. A provider error aborts the traversal: later
    /// providers are not consulted.
    pub(crate) async fn open_entity(
        &self,
        key: &CacheKey,
        req: &CacheRequest,
    ) -> Result<Option<(CacheHandle, Arc<dyn Provider>)>> {
        for provider in &self.providers {
            if let Some(handle) = provider.open_entity(key, req).await? {
                return Ok(Some((handle, provider.clone())));
            }
        }
        Ok(None)
    }

    /// Create a new entity for `key` against the chain, same traversal
    /// contract as [Self::open_entity].
    pub(crate) async fn create_entity(
        &self,
        req: &CacheRequest,
        key: &CacheKey,
        size_hint: Option<u64>,
    ) -> Result<Option<(CacheHandle, Arc<dyn Provider>)>> {
        for provider in &self.providers {
            if let Some(handle) = provider.create_entity(req, key, size_hint).await? {
                return Ok(Some((handle, provider.clone())));
            }
        }
        Ok(None)
    }
}
