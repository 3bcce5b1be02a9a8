//! JSGI environment objects.
//!
//! [`EnvironmentPrototype`] is built once per servlet and holds everything
//! that does not depend on the request. Every request then gets a fresh
//! [`Environment`] that shares the prototype and carries its own request and
//! response.

use crate::engine::{ExecutionContext, ScriptEngine};
use crate::error::{JsgiError, Result};
use crate::transport::{JsgiRequest, JsgiResponse};
use rhai::{Dynamic, Map};
use std::sync::Arc;
use tracing::debug;

/// Request-independent part of every environment.
#[derive(Debug)]
pub struct EnvironmentPrototype {
    jsgi: Map,
    server_software: String,
    script_name: String,
}

impl EnvironmentPrototype {
    /// Build the prototype from the global scope of the context's engine.
    ///
    /// Fails with [`JsgiError::NoSuchMethod`] if the scope has no `jsgi`
    /// binding.
    pub fn new(cx: &ExecutionContext<'_>, script_name: &str) -> Result<Self> {
        let globals = cx.engine().scope();

        let mut jsgi = globals
            .get("jsgi")
            .and_then(|v| v.clone().try_cast::<Map>())
            .ok_or_else(|| JsgiError::no_such_method("jsgi"))?;
        jsgi.insert("multithread".into(), Dynamic::from(true));
        jsgi.insert("multiprocess".into(), Dynamic::from(false));
        jsgi.insert("runOnce".into(), Dynamic::from(false));
        jsgi.insert("cgi".into(), Dynamic::from(false));

        let server_software = globals
            .get("server")
            .map(|v| v.to_string())
            .unwrap_or_else(|| concat!("armature-jsgi/", env!("CARGO_PKG_VERSION")).to_string());

        Ok(Self {
            jsgi,
            server_software,
            script_name: script_name.trim_end_matches('/').to_string(),
        })
    }

    /// Enter a context on `engine`, build the prototype, and exit again.
    pub fn build(engine: &dyn ScriptEngine, script_name: &str) -> Result<Arc<Self>> {
        let cx = ExecutionContext::enter(engine)?;
        let prototype = Self::new(&cx, script_name)?;
        debug!(script_name = %prototype.script_name, "JSGI environment prototype built");
        Ok(Arc::new(prototype))
    }

    pub fn jsgi(&self) -> &Map {
        &self.jsgi
    }

    pub fn server_software(&self) -> &str {
        &self.server_software
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }
}

/// Per-request JSGI environment.
#[derive(Debug, Clone)]
pub struct Environment {
    prototype: Arc<EnvironmentPrototype>,
    request: Arc<JsgiRequest>,
    response: JsgiResponse,
}

impl Environment {
    /// Extend `prototype` with one request and its live response.
    pub fn new(
        request: JsgiRequest,
        response: JsgiResponse,
        prototype: &Arc<EnvironmentPrototype>,
    ) -> Self {
        Self {
            prototype: Arc::clone(prototype),
            request: Arc::new(request),
            response,
        }
    }

    pub fn prototype(&self) -> &Arc<EnvironmentPrototype> {
        &self.prototype
    }

    pub fn request(&self) -> &JsgiRequest {
        &self.request
    }

    pub fn response(&self) -> &JsgiResponse {
        &self.response
    }

    /// Request path below the script name.
    pub fn path_info(&self) -> &str {
        let path = self.request.path();
        let script_name = self.prototype.script_name();
        match path.strip_prefix(script_name) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    }

    pub(crate) fn get_method(&mut self) -> String {
        self.request.method().to_string()
    }

    pub(crate) fn get_scheme(&mut self) -> String {
        self.request.scheme().to_string()
    }

    pub(crate) fn get_host(&mut self) -> String {
        self.request.host()
    }

    pub(crate) fn get_port(&mut self) -> i64 {
        i64::from(self.request.port())
    }

    pub(crate) fn get_script_name(&mut self) -> String {
        self.prototype.script_name().to_string()
    }

    pub(crate) fn get_path_info(&mut self) -> String {
        self.path_info().to_string()
    }

    pub(crate) fn get_query_string(&mut self) -> String {
        self.request.query().to_string()
    }

    /// Headers with lower-cased names; repeated headers are joined with `", "`.
    pub(crate) fn get_headers(&mut self) -> Map {
        let mut map = Map::new();
        for name in self.request.headers().keys() {
            if let Some(value) = self.joined_header(name.as_str()) {
                map.insert(name.as_str().into(), Dynamic::from(value));
            }
        }
        map
    }

    pub(crate) fn header(&mut self, name: &str) -> Dynamic {
        self.joined_header(&name.to_lowercase())
            .map(Dynamic::from)
            .unwrap_or(Dynamic::UNIT)
    }

    pub(crate) fn get_remote_address(&mut self) -> Dynamic {
        self.request
            .remote_addr()
            .map(|addr| Dynamic::from(addr.ip().to_string()))
            .unwrap_or(Dynamic::UNIT)
    }

    pub(crate) fn get_input(&mut self) -> String {
        String::from_utf8_lossy(self.request.body()).into_owned()
    }

    pub(crate) fn get_input_bytes(&mut self) -> rhai::Blob {
        self.request.body().to_vec()
    }

    pub(crate) fn get_jsgi(&mut self) -> Map {
        self.prototype.jsgi().clone()
    }

    pub(crate) fn get_server_software(&mut self) -> String {
        self.prototype.server_software().to_string()
    }

    fn joined_header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .request
            .headers()
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        (!values.is_empty()).then(|| values.join(", "))
    }
}
