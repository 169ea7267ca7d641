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

//! Freshness evaluation
//!
//! Whether a stored entity may be served without revalidation is a pure
//! predicate over the stored response metadata and the request context. The
//! engine only consumes the verdict; embedders plug in their own evaluator
//! (age computation, `Cache-Control` interpretation) via [FreshnessEval].

use crate::provider::CacheHandle;
use crate::request::CacheRequest;

use http::header::HeaderValue;
use log::warn;
use pingora_http::ResponseHeader;
use std::time::SystemTime;

/// The freshness predicate consulted by the entity selector.
pub trait FreshnessEval: Send + Sync {
    /// Whether the entity behind `handle` is fresh enough to serve `req`.
    fn is_fresh(&self, handle: &CacheHandle, req: &CacheRequest) -> bool;
}

/// An `Expires` based evaluator: fresh strictly until the stored `Expires`
/// time, stale when the header is absent, repeated or malformed.
///
/// This is deliberately minimal. It makes the engine usable out of the box and
/// keeps tests honest, but it is not an RFC 9111 age computation; production
/// embedders are expected to supply their own [FreshnessEval].
pub struct SimpleFreshness;

impl FreshnessEval for SimpleFreshness {
    fn is_fresh(&self, handle: &CacheHandle, _req: &CacheRequest) -> bool {
        expires_header_time(&handle.resp_hdrs)
            .map_or(false, |expires| SystemTime::now() < expires)
    }
}

/// Read the expiry time from the `Expires` header only.
///
/// Repeated `Expires` headers are invalid and yield `None`; an unparseable
/// date must be interpreted as a time in the past.
pub fn expires_header_time(resp: &ResponseHeader) -> Option<SystemTime> {
    fn parse_expires_value(value: &HeaderValue) -> Option<SystemTime> {
        let expires = value.to_str().ok()?;
        expires
            .parse::<httpdate::HttpDate>()
            .map_err(|e| warn!("invalid HttpDate in Expires: {expires}, error: {e}"))
            .ok()
            .map(SystemTime::from)
    }

    let mut expires_iter = resp.headers.get_all("expires").iter();
    let expires_header = expires_iter.next()?;
    if expires_iter.next().is_some() {
        return None;
    }
    parse_expires_value(expires_header).or(Some(SystemTime::UNIX_EPOCH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheKey;
    use http::StatusCode;
    use httpdate::fmt_http_date;
    use pingora_http::RequestHeader;
    use std::time::Duration;

    fn handle_with_expires(values: &[&str]) -> CacheHandle {
        let mut handle = CacheHandle::new(CacheKey::new("test"), Box::new(())).unwrap();
        handle.resp_hdrs = ResponseHeader::build(StatusCode::OK, None).unwrap();
        for value in values {
            handle.resp_hdrs.append_header("Expires", *value).unwrap();
        }
        handle
    }

    fn any_request() -> CacheRequest {
        CacheRequest::new(RequestHeader::build("GET", b"/", None).unwrap())
    }

    #[test]
    fn test_future_expires_is_fresh() {
        let future = SystemTime::now() + Duration::from_secs(60);
        let handle = handle_with_expires(&[&fmt_http_date(future)]);
        assert!(SimpleFreshness.is_fresh(&handle, &any_request()));
    }

    #[test]
    fn test_past_expires_is_stale() {
        let handle = handle_with_expires(&["Fri, 15 May 2015 15:34:21 GMT"]);
        assert!(!SimpleFreshness.is_fresh(&handle, &any_request()));
    }

    #[test]
    fn test_missing_expires_is_stale() {
        let handle = handle_with_expires(&[]);
        assert!(!SimpleFreshness.is_fresh(&handle, &any_request()));
    }

    #[test]
    fn test_repeated_expires_is_stale() {
        let future = SystemTime::now() + Duration::from_secs(60);
        let value = fmt_http_date(future);
        let handle = handle_with_expires(&[&value, &value]);
        assert!(!SimpleFreshness.is_fresh(&handle, &any_request()));
    }

    #[test]
    fn test_malformed_expires_is_stale() {
        let handle = handle_with_expires(&["0"]);
        let time = expires_header_time(&handle.resp_hdrs);
        assert_eq!(time, Some(SystemTime::UNIX_EPOCH));
        assert!(!SimpleFreshness.is_fresh(&handle, &any_request()));
    }
}
