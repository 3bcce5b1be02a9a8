//! Servlet configuration: init parameters and the hosting web application.
//!
//! Init parameters are plain strings, the way a servlet container hands them
//! over. They can be assembled in code, read from a TOML/JSON/`.env` file, or
//! picked up from environment variables carrying the `ARMATURE_JSGI_` prefix
//! (`ARMATURE_JSGI_MODULE_NAME` maps to `moduleName`).

use crate::error::{JsgiError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Handler module name.
pub const MODULE_NAME: &str = "moduleName";
/// Handler function name.
pub const FUNCTION_NAME: &str = "functionName";
/// Base location hint for application code.
pub const APP_HOME: &str = "appHome";
/// Older name for [`APP_HOME`], still honoured when `appHome` is unset.
pub const LEGACY_APP_HOME: &str = "ringoHome";
/// Path-separated list of module search paths.
pub const MODULE_PATH: &str = "modulePath";
/// Recompile modules whose source changed.
pub const RELOADING: &str = "reloading";
/// Rhai operation budget per call (`0` = unlimited).
pub const MAX_OPERATIONS: &str = "maxOperations";

pub const DEFAULT_MODULE_NAME: &str = "config";
pub const DEFAULT_FUNCTION_NAME: &str = "app";
pub const DEFAULT_APP_HOME: &str = "WEB-INF";
pub const DEFAULT_MODULE_PATH: &str = "app";
pub const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

/// Environment variable prefix for init parameters.
pub const ENV_PREFIX: &str = "ARMATURE_JSGI";

/// Init parameter file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }
}

/// String-valued init parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitParams {
    params: HashMap<String, String>,
}

impl InitParams {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a parameter.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Get a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Get a parameter, falling back to `default` when unset.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Get a boolean parameter.
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(JsgiError::config(format!(
                    "{key} must be a boolean, got {other:?}"
                ))),
            },
        }
    }

    /// Get an unsigned integer parameter.
    pub fn get_u64_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|_| {
                JsgiError::config(format!("{key} must be an unsigned integer, got {v:?}"))
            }),
        }
    }

    /// Check if a parameter is set.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Overlay `other` on top of this set; `other` wins on conflicts.
    pub fn merge(&mut self, other: InitParams) {
        self.params.extend(other.params);
    }

    /// Load parameters from a file, detecting the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(FileFormat::from_extension)
            .ok_or_else(|| {
                JsgiError::config(format!("Unsupported config file: {}", path.display()))
            })?;

        let content = fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse parameters from a string.
    pub fn parse(content: &str, format: FileFormat) -> Result<Self> {
        let value = match format {
            FileFormat::Json => serde_json::from_str::<Value>(content)?,
            FileFormat::Toml => {
                let toml_value: toml::Value = toml::from_str(content)
                    .map_err(|e| JsgiError::config(format!("TOML parse error: {e}")))?;
                serde_json::to_value(toml_value)?
            }
            FileFormat::Env => {
                let mut params = InitParams::new();
                for line in content.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((key, value)) = line.split_once('=') {
                        let value = value.trim().trim_matches('"').trim_matches('\'');
                        params.set(key.trim(), value);
                    }
                }
                return Ok(params);
            }
        };

        let Value::Object(map) = value else {
            return Err(JsgiError::config("Init parameters must be a table/object"));
        };

        let mut params = InitParams::new();
        for (key, value) in map {
            let value = match value {
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(JsgiError::config(format!(
                        "Init parameter {key} must be a scalar, got {other}"
                    )));
                }
            };
            params.set(key, value);
        }
        Ok(params)
    }

    /// Collect parameters from environment variables starting with `prefix`.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, env::vars())
    }

    /// Load a `.env` file into the process environment, then collect prefixed
    /// variables. A missing default `.env` is not an error.
    pub fn from_dotenv(prefix: &str, path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| JsgiError::config(e.to_string()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Ok(Self::from_env(prefix))
    }

    fn from_vars(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut params = InitParams::new();
        let marker = format!("{prefix}_");
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(&marker) {
                params.set(camel_case(name), value);
            }
        }
        params
    }
}

/// `MODULE_NAME` -> `moduleName`.
fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, part) in name.split('_').filter(|p| !p.is_empty()).enumerate() {
        let lower = part.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// The web application hosting the servlet.
#[derive(Debug, Clone, Default)]
pub struct ServletContext {
    context_path: String,
    deployment_root: Option<PathBuf>,
}

impl ServletContext {
    /// A context deployed from `root` and mounted at `context_path`.
    pub fn new(context_path: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            context_path: context_path.into(),
            deployment_root: Some(root.into()),
        }
    }

    /// A context with no unpacked deployment on disk.
    pub fn detached(context_path: impl Into<String>) -> Self {
        Self {
            context_path: context_path.into(),
            deployment_root: None,
        }
    }

    /// Mount path of the application; `""` for the root context.
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// Map a path inside the web application to the filesystem.
    pub fn real_path(&self, path: &str) -> Option<PathBuf> {
        let root = self.deployment_root.as_ref()?;
        Some(root.join(path.trim_start_matches('/')))
    }
}

/// Configuration handed to [`JsgiServletBuilder::init`](crate::JsgiServletBuilder::init).
#[derive(Debug, Clone, Default)]
pub struct ServletConfig {
    name: String,
    params: InitParams,
    context: ServletContext,
}

impl ServletConfig {
    pub fn new(name: impl Into<String>, params: InitParams, context: ServletContext) -> Self {
        Self {
            name: name.into(),
            params,
            context,
        }
    }

    pub fn servlet_name(&self) -> &str {
        &self.name
    }

    pub fn init_parameter(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    /// Init parameter with a default for unset keys.
    pub fn init_parameter_or(&self, key: &str, default: &str) -> String {
        self.params.get_or(key, default)
    }

    pub fn params(&self) -> &InitParams {
        &self.params
    }

    pub fn servlet_context(&self) -> &ServletContext {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_default() {
        let params = InitParams::new().with(MODULE_NAME, "main");
        assert_eq!(params.get_or(MODULE_NAME, DEFAULT_MODULE_NAME), "main");
        assert_eq!(params.get_or(FUNCTION_NAME, DEFAULT_FUNCTION_NAME), "app");
    }

    #[test]
    fn test_typed_params() {
        let params = InitParams::new()
            .with(RELOADING, "true")
            .with(MAX_OPERATIONS, "500");
        assert!(params.get_bool_or(RELOADING, false).unwrap());
        assert_eq!(params.get_u64_or(MAX_OPERATIONS, 1).unwrap(), 500);
        assert_eq!(params.get_u64_or("missing", 7).unwrap(), 7);

        let bad = InitParams::new().with(RELOADING, "maybe");
        assert!(bad.get_bool_or(RELOADING, false).is_err());
    }

    #[test]
    fn test_parse_toml() {
        let params = InitParams::parse(
            "moduleName = \"main\"\nreloading = true\nmaxOperations = 10\n",
            FileFormat::Toml,
        )
        .unwrap();
        assert_eq!(params.get(MODULE_NAME), Some("main"));
        assert_eq!(params.get(RELOADING), Some("true"));
        assert_eq!(params.get(MAX_OPERATIONS), Some("10"));
    }

    #[test]
    fn test_parse_json_rejects_nested() {
        let err = InitParams::parse(r#"{"modulePath": ["a", "b"]}"#, FileFormat::Json);
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_env_file() {
        let params = InitParams::parse(
            "# comment\nmoduleName=\"main\"\nfunctionName = handler\n",
            FileFormat::Env,
        )
        .unwrap();
        assert_eq!(params.get(MODULE_NAME), Some("main"));
        assert_eq!(params.get(FUNCTION_NAME), Some("handler"));
    }

    #[test]
    fn test_env_vars_map_to_camel_case() {
        let vars = vec![
            ("ARMATURE_JSGI_MODULE_NAME".to_string(), "main".to_string()),
            ("ARMATURE_JSGI_APP_HOME".to_string(), "/srv/app".to_string()),
            ("OTHER_VAR".to_string(), "ignored".to_string()),
        ];
        let params = InitParams::from_vars(ENV_PREFIX, vars);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get(MODULE_NAME), Some("main"));
        assert_eq!(params.get(APP_HOME), Some("/srv/app"));
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = InitParams::new().with(MODULE_NAME, "a").with(FUNCTION_NAME, "f");
        base.merge(InitParams::new().with(MODULE_NAME, "b"));
        assert_eq!(base.get(MODULE_NAME), Some("b"));
        assert_eq!(base.get(FUNCTION_NAME), Some("f"));
    }

    #[test]
    fn test_servlet_context_real_path() {
        let ctx = ServletContext::new("/shop", "/var/webapps/shop");
        assert_eq!(
            ctx.real_path("/WEB-INF"),
            Some(PathBuf::from("/var/webapps/shop/WEB-INF"))
        );
        assert_eq!(ServletContext::detached("").real_path("WEB-INF"), None);
    }
}
