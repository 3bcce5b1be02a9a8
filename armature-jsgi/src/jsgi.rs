//! Built-in `ringo/jsgi` module.
//!
//! `handleRequest(handler, function, env)` runs the application handler and
//! writes the `{status, headers, body}` map it returns onto the live response.

use crate::engine::{Callable, ExecutionContext, NativeModule, missing};
use crate::env::Environment;
use crate::error::{JsgiError, Result};
use crate::transport::JsgiResponse;
use http::{HeaderName, HeaderValue};
use rhai::{Array, Blob, Dynamic, Map};
use tracing::trace;

/// Module id of the dispatch module.
pub const JSGI_MODULE: &str = "ringo/jsgi";

/// Dispatch function exported by [`JSGI_MODULE`].
pub const HANDLE_REQUEST: &str = "handleRequest";

/// The native JSGI dispatch module.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsgiModule;

impl NativeModule for JsgiModule {
    fn id(&self) -> &str {
        JSGI_MODULE
    }

    fn call(
        &self,
        cx: &ExecutionContext<'_>,
        function: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic> {
        match function {
            HANDLE_REQUEST => handle_request(cx, args),
            other => Err(missing(JSGI_MODULE, other)),
        }
    }
}

/// Run the handler and write its result; returns unit once committed.
pub fn handle_request(cx: &ExecutionContext<'_>, args: Vec<Dynamic>) -> Result<Dynamic> {
    let mut args = args.into_iter();
    let (Some(handler), Some(function), Some(env)) = (args.next(), args.next(), args.next())
    else {
        return Err(JsgiError::InvalidArgument {
            function: HANDLE_REQUEST.to_string(),
            expected: "(handler, function, env)".to_string(),
            actual: "too few arguments".to_string(),
        });
    };

    let env = env
        .try_cast::<Environment>()
        .ok_or_else(|| invalid_argument("Environment", "env"))?;
    let response = env.response().clone();
    let env_arg = Dynamic::from(env);

    let result = if handler.is_string() {
        let module = handler.to_string();
        let function = function
            .into_string()
            .map_err(|actual| invalid_argument("string", actual))?;
        trace!(module = %module, function = %function, "Dispatching named handler");
        cx.engine().invoke(cx, &module, &function, vec![env_arg])?
    } else if handler.is::<Callable>() {
        let callable = handler.cast::<Callable>();
        trace!(callable = callable.name(), "Dispatching bound handler");
        cx.engine().call(cx, &callable, vec![env_arg])?
    } else {
        return Err(invalid_argument("module id or callable", handler.type_name()));
    };

    ResponseParts::from_result(result)?.write_to(&response);
    Ok(Dynamic::UNIT)
}

fn invalid_argument(expected: &str, actual: &str) -> JsgiError {
    JsgiError::InvalidArgument {
        function: HANDLE_REQUEST.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// A validated handler result. Nothing is written until every part checks out.
#[derive(Debug, PartialEq)]
struct ResponseParts {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<Vec<u8>>,
}

impl ResponseParts {
    fn from_result(result: Dynamic) -> Result<Self> {
        let type_name = result.type_name();
        let mut map = result.try_cast::<Map>().ok_or_else(|| {
            JsgiError::invalid_response(format!("expected a map, got {type_name}"))
        })?;

        let status = map
            .remove("status")
            .ok_or_else(|| JsgiError::invalid_response("missing status"))?;
        let status = status
            .as_int()
            .ok()
            .filter(|code| (100..=999).contains(code))
            .ok_or_else(|| JsgiError::invalid_response(format!("invalid status {status}")))?;

        let headers = match map.remove("headers") {
            Some(headers) => Self::headers(headers)?,
            None => return Err(JsgiError::invalid_response("missing headers")),
        };
        let body = match map.remove("body") {
            Some(body) => Self::body(body)?,
            None => return Err(JsgiError::invalid_response("missing body")),
        };

        Ok(Self {
            status: status as u16,
            headers,
            body,
        })
    }

    fn headers(value: Dynamic) -> Result<Vec<(String, String)>> {
        let type_name = value.type_name();
        let map = value.try_cast::<Map>().ok_or_else(|| {
            JsgiError::invalid_response(format!("headers must be a map, got {type_name}"))
        })?;

        let mut headers = Vec::with_capacity(map.len());
        for (name, value) in map {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                JsgiError::invalid_response(format!("invalid header name {name:?}"))
            })?;
            if value.is_array() {
                let values: Array = value.cast();
                for item in values {
                    headers.push((name.to_string(), header_value(&name, item)?));
                }
            } else {
                headers.push((name.to_string(), header_value(&name, value)?));
            }
        }
        Ok(headers)
    }

    fn body(value: Dynamic) -> Result<Vec<Vec<u8>>> {
        if value.is_array() {
            let parts: Array = value.cast();
            parts.into_iter().map(body_chunk).collect()
        } else {
            Ok(vec![body_chunk(value)?])
        }
    }

    fn write_to(self, response: &JsgiResponse) {
        response.set_status(self.status);
        for (name, value) in &self.headers {
            response.add_header(name, value);
        }
        for chunk in &self.body {
            response.write(chunk);
        }
        response.commit();
    }
}

fn header_value(name: &str, value: Dynamic) -> Result<String> {
    let value = value.into_string().map_err(|actual| {
        JsgiError::invalid_response(format!("header {name} must be a string, got {actual}"))
    })?;
    HeaderValue::from_str(&value)
        .map_err(|_| JsgiError::invalid_response(format!("invalid value for header {name}")))?;
    Ok(value)
}

fn body_chunk(value: Dynamic) -> Result<Vec<u8>> {
    if value.is_string() {
        return Ok(value.to_string().into_bytes());
    }
    let type_name = value.type_name();
    value.try_cast::<Blob>().ok_or_else(|| {
        JsgiError::invalid_response(format!(
            "body parts must be strings or blobs, got {type_name}"
        ))
    })
}
