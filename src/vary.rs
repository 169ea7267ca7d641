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

//! `Vary` based content negotiation validation
//!
//! Before a cached entity may serve a request, every header named by the
//! stored response's `Vary` header must carry the same value on the current
//! request as it did on the request the entity was stored under. Otherwise a
//! negotiated variant (say, a document in one language) would be served to a
//! client that negotiated a different one.

use crate::provider::CacheHandle;
use crate::request::CacheRequest;

use http::header;

/// Tokenize a `Vary` header value into header field names.
///
/// Field names are separated by commas and/or whitespace. The tokenizer
/// borrows from the header value, nothing is modified in place.
pub(crate) fn vary_fields(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c == ',' || c.is_ascii_whitespace())
        .filter(|name| !name.is_empty())
}

/// Whether the current request matches the stored entity's `Vary` dimensions.
///
/// For each field named by the stored response's `Vary` header, the current
/// request's value is compared with the value stored alongside the entity:
/// both absent is a match, both present and byte-equal is a match, anything
/// else is a mismatch. An entity without a `Vary` header matches any request.
pub(crate) fn request_matches_vary(handle: &CacheHandle, req: &CacheRequest) -> bool {
    let Some(vary) = handle.resp_hdrs.headers.get(header::VARY) else {
        return true;
    };
    let Ok(vary) = vary.to_str() else {
        // an unreadable Vary value makes the entity unusable
        return false;
    };

    for name in vary_fields(vary) {
        let current = req.header().headers.get(name);
        let stored = handle.req_hdrs.get(name);
        match (current, stored) {
            (None, None) => {}
            (Some(h1), Some(h2)) if h1 == h2 => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheKey;
    use pingora_http::RequestHeader;

    fn handle_with_vary(vary: &str, stored: &[(&'static str, &str)]) -> CacheHandle {
        let mut handle = CacheHandle::new(CacheKey::new("test"), Box::new(())).unwrap();
        handle.resp_hdrs.insert_header(header::VARY, vary).unwrap();
        for (name, value) in stored {
            handle
                .req_hdrs
                .insert(*name, value.parse().unwrap());
        }
        handle
    }

    fn request_with(headers: &[(&'static str, &str)]) -> CacheRequest {
        let mut header = RequestHeader::build("GET", b"/", None).unwrap();
        for (name, value) in headers {
            header.insert_header(*name, *value).unwrap();
        }
        CacheRequest::new(header)
    }

    #[test]
    fn test_vary_fields_tokenizer() {
        let fields: Vec<_> = vary_fields("Accept-Language, Accept-Encoding\tUser-Agent").collect();
        assert_eq!(
            fields,
            vec!["Accept-Language", "Accept-Encoding", "User-Agent"]
        );
        assert_eq!(vary_fields(" , ,, ").count(), 0);
    }

    #[test]
    fn test_no_vary_always_matches() {
        let handle = CacheHandle::new(CacheKey::new("test"), Box::new(())).unwrap();
        let req = request_with(&[("accept-language", "fr")]);
        assert!(request_matches_vary(&handle, &req));
    }

    #[test]
    fn test_vary_equal_values_match() {
        let handle = handle_with_vary("Accept-Language", &[("accept-language", "en")]);
        let req = request_with(&[("accept-language", "en")]);
        assert!(request_matches_vary(&handle, &req));
    }

    #[test]
    fn test_vary_different_values_mismatch() {
        let handle = handle_with_vary("Accept-Language", &[("accept-language", "en")]);
        let req = request_with(&[("accept-language", "fr")]);
        assert!(!request_matches_vary(&handle, &req));
    }

    #[test]
    fn test_vary_one_side_absent_mismatch() {
        let handle = handle_with_vary("Accept-Language", &[("accept-language", "en")]);
        let req = request_with(&[]);
        assert!(!request_matches_vary(&handle, &req));

        let handle = handle_with_vary("Accept-Language", &[]);
        let req = request_with(&[("accept-language", "en")]);
        assert!(!request_matches_vary(&handle, &req));
    }

    #[test]
    fn test_vary_both_absent_match() {
        let handle = handle_with_vary("Accept-Language", &[]);
        let req = request_with(&[]);
        assert!(request_matches_vary(&handle, &req));
    }

    #[test]
    fn test_vary_star_is_an_ordinary_field_name() {
        // "*" gets no special casing: it matches exactly when neither the
        // stored request nor the current one carries a "*" header
        let handle = handle_with_vary("*", &[]);
        let req = request_with(&[]);
        assert!(request_matches_vary(&handle, &req));

        let handle = handle_with_vary("*", &[]);
        let req = request_with(&[("*", "anything")]);
        assert!(!request_matches_vary(&handle, &req));
    }

    #[test]
    fn test_vary_multiple_fields() {
        let handle = handle_with_vary(
            "Accept-Language, Accept-Encoding",
            &[("accept-language", "en"), ("accept-encoding", "gzip")],
        );
        let req = request_with(&[("accept-language", "en"), ("accept-encoding", "gzip")]);
        assert!(request_matches_vary(&handle, &req));

        let req = request_with(&[("accept-language", "en"), ("accept-encoding", "br")]);
        assert!(!request_matches_vary(&handle, &req));
    }
}
