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

//! Cache key

use crate::request::CacheRequest;

use pingora_error::Result;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// The hostname used in keys when no hostname can be determined for the request.
pub const DEFAULT_HOSTNAME: &str = "_default_";

/// The canonical key of one cacheable resource.
///
/// The key is a readable URI of the form `scheme://host:port/path?query` so that
/// providers can log it and store it directly. Two requests with the same
/// scheme, host, port, path and query always produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key directly from its canonical string form.
    pub fn new<S: Into<String>>(key: S) -> Self {
        CacheKey(key.into())
    }

    /// The canonical string form of this key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// A caller supplied function to replace [generate_key] as the key generator.
pub type KeyGenerator = Box<dyn Fn(&CacheRequest) -> Result<CacheKey> + Send + Sync>;

// the registered default ports of the schemes this engine expects to see
fn scheme_default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        _ => None,
    }
}

/// Derive the canonical [CacheKey] for the given request.
///
/// The hostname is the server's canonical name for locally destined and reverse
/// proxied requests (so that lookup and store take the same code path), falling
/// back to [DEFAULT_HOSTNAME]. Forward proxied requests use the lower-cased
/// request-target host instead. The scheme is taken lower-cased from the
/// request-target when proxied, otherwise it is fixed to `http`. The port is
/// the server's listening port when not proxied; otherwise the explicit
/// request-target port, then the scheme's registered default port, then empty.
///
/// An empty port segment accepts a minor cache key blow-up instead of guessing
/// a default port for an unknown scheme.
pub fn generate_key(req: &CacheRequest) -> Result<CacheKey> {
    let uri = &req.header().uri;

    let hostname = if !req.proxy_mode().is_forward_proxied() {
        // Use the canonical name to improve the cache hit rate. Reverse proxied
        // requests take this path too: their lookup may happen before the
        // proxy rewrite marks them, so store and lookup must agree on the name.
        req.server_name().unwrap_or(DEFAULT_HOSTNAME).to_string()
    } else if let Some(host) = uri.host() {
        host.to_ascii_lowercase()
    } else {
        // a proxied request with no hostname is unlikely to get very far,
        // but key it consistently anyway
        DEFAULT_HOSTNAME.to_string()
    };

    let scheme = if req.proxy_mode().is_proxied() {
        match uri.scheme_str() {
            Some(s) => s.to_ascii_lowercase(),
            None => "http".to_string(),
        }
    } else {
        "http".to_string()
    };

    let port = if req.proxy_mode().is_proxied() {
        if let Some(port) = uri.port() {
            format!(":{}", port.as_str())
        } else if let Some(port) = scheme_default_port(&scheme) {
            format!(":{}", port)
        } else {
            String::new()
        }
    } else {
        // locally generated content is keyed under the listening port
        format!(":{}", req.server_port())
    };

    let path = uri.path();
    let query = uri.query().unwrap_or("");

    Ok(CacheKey(format!(
        "{}://{}{}{}?{}",
        scheme, hostname, port, path, query
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ProxyMode;
    use pingora_http::RequestHeader;

    fn local_request(path: &str) -> CacheRequest {
        let header = RequestHeader::build("GET", path.as_bytes(), None).unwrap();
        let mut req = CacheRequest::new(header);
        req.set_server_name(Some("www.example.com".into()));
        req.set_server_port(8080);
        req
    }

    fn proxied_request(target: &str, mode: ProxyMode) -> CacheRequest {
        let mut header = RequestHeader::build("GET", b"/", None).unwrap();
        header.set_uri(target.parse().unwrap());
        let mut req = CacheRequest::new(header);
        req.set_proxy_mode(mode);
        req
    }

    #[test]
    fn test_key_is_deterministic() {
        let req = local_request("/some/path?a=1&b=2");
        let key1 = generate_key(&req).unwrap();
        let key2 = generate_key(&req).unwrap();
        assert_eq!(key1, key2);
        assert_eq!(key1.as_str(), "http://www.example.com:8080/some/path?a=1&b=2");
    }

    #[test]
    fn test_key_without_query_keeps_separator() {
        let req = local_request("/index.html");
        let key = generate_key(&req).unwrap();
        assert_eq!(key.as_str(), "http://www.example.com:8080/index.html?");
    }

    #[test]
    fn test_local_request_without_server_name() {
        let header = RequestHeader::build("GET", b"/x", None).unwrap();
        let mut req = CacheRequest::new(header);
        req.set_server_port(80);
        let key = generate_key(&req).unwrap();
        assert_eq!(key.as_str(), "http://_default_:80/x?");
    }

    #[test]
    fn test_forward_proxy_host_is_lowercased() {
        let req = proxied_request("http://HOST.example/path", ProxyMode::Forward);
        let key = generate_key(&req).unwrap();
        assert_eq!(key.as_str(), "http://host.example:80/path?");
    }

    #[test]
    fn test_forward_proxy_explicit_port() {
        let req = proxied_request("https://host.example:8443/path?x=y", ProxyMode::Forward);
        let key = generate_key(&req).unwrap();
        assert_eq!(key.as_str(), "https://host.example:8443/path?x=y");
    }

    #[test]
    fn test_forward_proxy_default_port_of_scheme() {
        let req = proxied_request("https://host.example/path", ProxyMode::Forward);
        let key = generate_key(&req).unwrap();
        assert_eq!(key.as_str(), "https://host.example:443/path?");
    }

    #[test]
    fn test_reverse_proxy_uses_canonical_name() {
        let mut req = proxied_request("https://origin.internal:8443/path", ProxyMode::Reverse);
        req.set_server_name(Some("www.example.com".into()));
        let key = generate_key(&req).unwrap();
        // hostname from the canonical name, scheme and port from the request-target
        assert_eq!(key.as_str(), "https://www.example.com:8443/path?");
    }
}
