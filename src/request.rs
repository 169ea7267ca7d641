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

//! The request and response views the decision engine operates on.
//!
//! [CacheRequest] is the inbound view: the parsed request header plus the
//! server side facts (proxy mode, canonical name, listening port) that key
//! generation needs. [CacheResponse] is the outbound view that
//! [crate::accept::accept_headers] reconciles cached headers into.

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use pingora_error::Result;
use pingora_http::{RequestHeader, ResponseHeader};
use std::time::SystemTime;

/// How the request reached this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    /// Locally destined request
    None,
    /// Forward proxied: the client sent an absolute request-target
    Forward,
    /// Reverse proxied to an origin on behalf of the client
    Reverse,
}

impl ProxyMode {
    pub fn is_proxied(&self) -> bool {
        !matches!(self, ProxyMode::None)
    }

    pub fn is_forward_proxied(&self) -> bool {
        matches!(self, ProxyMode::Forward)
    }
}

/// The five conditional request header fields a client may send.
///
/// During revalidation the engine replaces all of them with its own validators,
/// the client's conditionals must never reach the origin alongside ours.
pub(crate) const CONDITIONAL_HEADERS: [HeaderName; 5] = [
    header::IF_MATCH,
    header::IF_MODIFIED_SINCE,
    header::IF_NONE_MATCH,
    header::IF_RANGE,
    header::IF_UNMODIFIED_SINCE,
];

/// The inbound request view.
pub struct CacheRequest {
    header: RequestHeader,
    proxy: ProxyMode,
    server_name: Option<String>,
    server_port: u16,
}

impl CacheRequest {
    /// Wrap a parsed request header.
    ///
    /// Defaults to a locally destined request on port 80 with no canonical
    /// server name.
    pub fn new(header: RequestHeader) -> Self {
        CacheRequest {
            header,
            proxy: ProxyMode::None,
            server_name: None,
            server_port: 80,
        }
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut RequestHeader {
        &mut self.header
    }

    pub fn proxy_mode(&self) -> ProxyMode {
        self.proxy
    }

    pub fn set_proxy_mode(&mut self, proxy: ProxyMode) {
        self.proxy = proxy;
    }

    /// The server's canonical name for this request, if one is configured.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn set_server_name(&mut self, name: Option<String>) {
        self.server_name = name;
    }

    /// The listening port this request arrived on.
    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn set_server_port(&mut self, port: u16) {
        self.server_port = port;
    }

    // Remove the client's conditional request headers so that only the
    // engine's own validators are presented to the origin.
    pub(crate) fn strip_conditional_headers(&mut self) {
        for name in &CONDITIONAL_HEADERS {
            self.header.remove_header(name);
        }
    }
}

/// The outbound response view.
///
/// `content_type` and `mtime` are dedicated attributes rather than generic
/// headers: the surrounding server renders them itself with its own
/// normalization, so cached values must flow through the same attributes that
/// locally generated responses use.
pub struct CacheResponse {
    /// The outgoing header set
    pub header: ResponseHeader,
    /// Headers that survive onto error responses, `Set-Cookie` lands here
    pub err_headers: HeaderMap,
    content_type: Option<HeaderValue>,
    mtime: Option<SystemTime>,
    request_time: SystemTime,
}

impl CacheResponse {
    /// Create an empty 200 response view, stamped with the current time as the
    /// request time.
    pub fn new() -> Result<Self> {
        Ok(Self::from_header(ResponseHeader::build(
            StatusCode::OK,
            None,
        )?))
    }

    /// Wrap an already built outgoing header set.
    pub fn from_header(header: ResponseHeader) -> Self {
        CacheResponse {
            header,
            err_headers: HeaderMap::new(),
            content_type: None,
            mtime: None,
            request_time: SystemTime::now(),
        }
    }

    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    pub fn set_content_type(&mut self, value: HeaderValue) {
        self.content_type = Some(value);
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    /// Raise the modification time of this response to `time`.
    ///
    /// Future dated values are clamped to the request time, the same rule the
    /// server applies before emitting `Last-Modified` for local content.
    pub fn update_mtime(&mut self, time: SystemTime) {
        let time = time.min(self.request_time);
        self.mtime = Some(self.mtime.map_or(time, |current| current.max(time)));
    }

    #[cfg(test)]
    pub(crate) fn set_request_time(&mut self, time: SystemTime) {
        self.request_time = time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_strip_conditional_headers() {
        let mut header = RequestHeader::build("GET", b"/", None).unwrap();
        header
            .insert_header(header::IF_NONE_MATCH, "\"abc\"")
            .unwrap();
        header
            .insert_header(header::IF_MODIFIED_SINCE, "Tue, 01 Jan 2030 00:00:00 GMT")
            .unwrap();
        header.insert_header(header::ACCEPT, "text/html").unwrap();
        let mut req = CacheRequest::new(header);

        req.strip_conditional_headers();
        for name in &CONDITIONAL_HEADERS {
            assert!(req.header().headers.get(name).is_none());
        }
        // non conditional headers are untouched
        assert_eq!(req.header().headers.get(header::ACCEPT).unwrap(), "text/html");
    }

    #[test]
    fn test_update_mtime_monotonic() {
        let now = SystemTime::now();
        let mut resp = CacheResponse::new().unwrap();
        resp.set_request_time(now);

        let older = now - Duration::from_secs(60);
        let oldest = now - Duration::from_secs(120);
        resp.update_mtime(older);
        assert_eq!(resp.mtime(), Some(older));
        // never moves backwards
        resp.update_mtime(oldest);
        assert_eq!(resp.mtime(), Some(older));
    }

    #[test]
    fn test_update_mtime_clamps_future_dates() {
        let now = SystemTime::now();
        let mut resp = CacheResponse::new().unwrap();
        resp.set_request_time(now);

        resp.update_mtime(now + Duration::from_secs(3600));
        assert_eq!(resp.mtime(), Some(now));
    }
}
