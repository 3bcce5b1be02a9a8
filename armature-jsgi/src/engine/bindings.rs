//! Rhai bindings for the JSGI environment.

use crate::env::Environment;
use rhai::{Dynamic, Engine, EvalAltResult, Map};
use serde_json::Value as JsonValue;

/// Register the `Environment` type and helper functions with the engine.
pub fn register_jsgi_api(engine: &mut Engine) {
    engine
        .register_type_with_name::<Environment>("Environment")
        .register_get("method", Environment::get_method)
        .register_get("scheme", Environment::get_scheme)
        .register_get("host", Environment::get_host)
        .register_get("port", Environment::get_port)
        .register_get("scriptName", Environment::get_script_name)
        .register_get("pathInfo", Environment::get_path_info)
        .register_get("queryString", Environment::get_query_string)
        .register_get("headers", Environment::get_headers)
        .register_get("remoteAddress", Environment::get_remote_address)
        .register_get("input", Environment::get_input)
        .register_get("inputBytes", Environment::get_input_bytes)
        .register_get("jsgi", Environment::get_jsgi)
        .register_get("serverSoftware", Environment::get_server_software)
        .register_fn("header", Environment::header);

    register_utility_functions(engine);
}

fn register_utility_functions(engine: &mut Engine) {
    engine.register_fn(
        "to_json",
        |data: Dynamic| -> Result<String, Box<EvalAltResult>> {
            let value = dynamic_to_json(data)?;
            serde_json::to_string(&value)
                .map_err(|e| Box::new(EvalAltResult::from(e.to_string())))
        },
    );

    engine.register_fn(
        "from_json",
        |text: &str| -> Result<Dynamic, Box<EvalAltResult>> {
            let value: JsonValue = serde_json::from_str(text)
                .map_err(|e| Box::new(EvalAltResult::from(e.to_string())))?;
            json_to_dynamic(value)
        },
    );

    engine.register_fn("log_info", |msg: &str| {
        tracing::info!(target: "armature_jsgi::script", "{}", msg);
    });

    engine.register_fn("log_warn", |msg: &str| {
        tracing::warn!(target: "armature_jsgi::script", "{}", msg);
    });

    engine.register_fn("log_error", |msg: &str| {
        tracing::error!(target: "armature_jsgi::script", "{}", msg);
    });

    engine.register_fn("log_debug", |msg: &str| {
        tracing::debug!(target: "armature_jsgi::script", "{}", msg);
    });
}

/// Convert JSON value to Rhai Dynamic.
fn json_to_dynamic(value: JsonValue) -> Result<Dynamic, Box<EvalAltResult>> {
    match value {
        JsonValue::Null => Ok(Dynamic::UNIT),
        JsonValue::Bool(b) => Ok(Dynamic::from(b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Dynamic::from(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Dynamic::from(f))
            } else {
                Err(Box::new(EvalAltResult::from("Invalid number")))
            }
        }
        JsonValue::String(s) => Ok(Dynamic::from(s)),
        JsonValue::Array(arr) => {
            let items = arr
                .into_iter()
                .map(json_to_dynamic)
                .collect::<Result<rhai::Array, _>>()?;
            Ok(Dynamic::from(items))
        }
        JsonValue::Object(obj) => {
            let mut map = Map::new();
            for (key, val) in obj {
                map.insert(key.into(), json_to_dynamic(val)?);
            }
            Ok(Dynamic::from(map))
        }
    }
}

/// Convert Rhai Dynamic to JSON value.
fn dynamic_to_json(value: Dynamic) -> Result<JsonValue, Box<EvalAltResult>> {
    if value.is_unit() {
        return Ok(JsonValue::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(JsonValue::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        return Ok(JsonValue::Number(i.into()));
    }
    if let Ok(f) = value.as_float() {
        return serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .ok_or_else(|| Box::new(EvalAltResult::from("Invalid float")));
    }
    if value.is_string() {
        return Ok(JsonValue::String(value.to_string()));
    }
    if value.is_array() {
        let arr: rhai::Array = value.cast();
        let items = arr
            .into_iter()
            .map(dynamic_to_json)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(JsonValue::Array(items));
    }
    if value.is_map() {
        let map: Map = value.cast();
        let mut obj = serde_json::Map::new();
        for (key, val) in map {
            obj.insert(key.to_string(), dynamic_to_json(val)?);
        }
        return Ok(JsonValue::Object(obj));
    }
    Ok(JsonValue::String(value.to_string()))
}
