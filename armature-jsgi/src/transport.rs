//! Request and response carriers handed over by the hosting server.

use crate::continuation::Continuation;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri, Version};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;

/// An incoming HTTP request.
#[derive(Debug, Clone)]
pub struct JsgiRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    continuation: Option<Arc<Continuation>>,
}

impl JsgiRequest {
    /// Create a request with no headers and an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            continuation: None,
        }
    }

    /// Create a request from hyper/http parts and a collected body.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            remote_addr: None,
            continuation: None,
        }
    }

    /// Append a header. Names or values that are not valid HTTP are dropped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_continuation(mut self, continuation: Arc<Continuation>) -> Self {
        self.continuation = Some(continuation);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// The continuation attached by the server, if the request can be suspended.
    pub fn continuation(&self) -> Option<&Arc<Continuation>> {
        self.continuation.as_ref()
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> &str {
        self.uri.query().unwrap_or("")
    }

    pub fn scheme(&self) -> &str {
        self.uri.scheme_str().unwrap_or("http")
    }

    /// Host name from the URI authority or the `Host` header.
    pub fn host(&self) -> String {
        if let Some(host) = self.uri.host() {
            return host.to_string();
        }
        self.host_header()
            .map(|h| h.rsplit_once(':').map_or(h, |(host, _)| host).to_string())
            .unwrap_or_else(|| "localhost".to_string())
    }

    /// Port from the URI authority or the `Host` header, else the scheme default.
    pub fn port(&self) -> u16 {
        if let Some(port) = self.uri.port_u16() {
            return port;
        }
        self.host_header()
            .and_then(|h| h.rsplit_once(':'))
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or(if self.scheme() == "https" { 443 } else { 80 })
    }

    fn host_header(&self) -> Option<&str> {
        self.headers
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug)]
struct ResponseState {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    committed: bool,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
            committed: false,
        }
    }
}

/// The live response a handler writes into.
///
/// Clones share state, so the server keeps one handle while the environment
/// passed to the handler carries another.
#[derive(Debug, Clone, Default)]
pub struct JsgiResponse {
    state: Arc<Mutex<ResponseState>>,
}

impl JsgiResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: u16) {
        self.state.lock().status = status;
    }

    pub fn add_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state.lock().headers.push((name.into(), value.into()));
    }

    /// Append bytes to the body.
    pub fn write(&self, chunk: &[u8]) {
        self.state.lock().body.extend_from_slice(chunk);
    }

    /// Mark the response as complete.
    pub fn commit(&self) {
        self.state.lock().committed = true;
    }

    pub fn status(&self) -> u16 {
        self.state.lock().status
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.state.lock().headers.clone()
    }

    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.lock().body)
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    /// True if nothing has been written yet.
    pub fn is_untouched(&self) -> bool {
        let state = self.state.lock();
        !state.committed && state.headers.is_empty() && state.body.is_empty()
    }
}
