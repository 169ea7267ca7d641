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

//! Response header reconciliation
//!
//! Merging a cached response's headers into the outgoing response is not a
//! plain header copy: `Content-Type` and `Last-Modified` flow through the
//! response's dedicated attributes, and `Set-Cookie` must survive as separate
//! occurrences because some clients cannot parse cookies merged into one
//! comma-joined value.

use crate::provider::CacheHandle;
use crate::request::CacheResponse;

use http::header::{self, HeaderName, HeaderValue};
use pingora_error::Result;

// handled out of band, excluded from the generic header merge
fn is_special_header(name: &HeaderName) -> bool {
    *name == header::CONTENT_TYPE || *name == header::LAST_MODIFIED || *name == header::SET_COOKIE
}

/// Merge the cached response headers from `handle` into `resp`.
///
/// - `Content-Type` becomes the response's content type attribute.
/// - `Last-Modified` raises the response's modification time through the same
///   clamp applied to locally generated responses ([CacheResponse::update_mtime]).
/// - Every `Set-Cookie`, from the cached response and from the already pending
///   error-path headers, is collected and reattached to the error-path set as
///   independent occurrences.
/// - Remaining cached headers are merged into the outgoing set. With
///   `preserve_orig` false (a true cache hit) cached values replace existing
///   ones; with `preserve_orig` true the server's pre-existing outgoing
///   headers win and cached headers only fill the gaps.
///
/// The handle's stored snapshot is never modified.
pub fn accept_headers(
    handle: &CacheHandle,
    resp: &mut CacheResponse,
    preserve_orig: bool,
) -> Result<()> {
    let cached = &handle.resp_hdrs.headers;

    if let Some(content_type) = cached.get(header::CONTENT_TYPE) {
        resp.set_content_type(content_type.clone());
    }

    // The cached Last-Modified cannot be passed on blindly because of the
    // restrictions on future values; malformed dates are dropped.
    if let Some(last_modified) = cached.get(header::LAST_MODIFIED) {
        if let Some(time) = last_modified
            .to_str()
            .ok()
            .and_then(|value| httpdate::parse_http_date(value).ok())
        {
            resp.update_mtime(time);
        }
    }

    // Collect every Set-Cookie occurrence first, pending error-path cookies
    // before cached ones, then reattach them one by one.
    let cookies: Vec<HeaderValue> = resp
        .err_headers
        .get_all(header::SET_COOKIE)
        .iter()
        .chain(cached.get_all(header::SET_COOKIE).iter())
        .cloned()
        .collect();
    resp.err_headers.remove(header::SET_COOKIE);
    for cookie in cookies {
        resp.err_headers.append(header::SET_COOKIE, cookie);
    }

    for name in cached.keys() {
        if is_special_header(name) {
            continue;
        }
        if preserve_orig {
            if resp.header.headers.contains_key(name) {
                // the request specific copy of the original headers wins
                continue;
            }
        } else {
            resp.header.remove_header(name);
        }
        for value in cached.get_all(name) {
            resp.header.append_header(name.clone(), value.clone())?;
        }
    }

    Ok(())
}
