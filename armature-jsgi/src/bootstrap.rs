//! Engine bootstrap from init parameters.

use crate::config::{
    APP_HOME, DEFAULT_APP_HOME, DEFAULT_MAX_OPERATIONS, DEFAULT_MODULE_PATH, LEGACY_APP_HOME,
    MAX_OPERATIONS, MODULE_PATH, RELOADING, ServletConfig, ServletContext,
};
use crate::engine::{EngineConfig, RhaiEngine, SYSTEM_MODULES};
use crate::error::Result;
use crate::repository::{FileRepository, Repository, WebappRepository};
use std::sync::Arc;
use tracing::{debug, info};

/// Separator between entries of `modulePath`.
#[cfg(windows)]
pub const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_SEPARATOR: char = ':';

/// Resolve the code root for `hint`: inside the web application if it exists
/// there, otherwise as a plain filesystem path.
pub fn resolve_code_root(context: &ServletContext, hint: &str) -> Arc<dyn Repository> {
    let webapp = WebappRepository::new(context, hint);
    if webapp.exists() {
        debug!(
            hint = webapp.hint(),
            root = %webapp.root().display(),
            "Using web application code root"
        );
        return Arc::new(webapp);
    }
    let file = FileRepository::new(hint);
    debug!(root = %file.root().display(), "Using filesystem code root");
    Arc::new(file)
}

/// The `appHome` init parameter, then `ringoHome`, then the default.
pub fn app_home(config: &ServletConfig) -> String {
    config
        .init_parameter(APP_HOME)
        .or_else(|| config.init_parameter(LEGACY_APP_HOME))
        .unwrap_or(DEFAULT_APP_HOME)
        .to_string()
}

/// Split a `modulePath` value into its trimmed, non-empty entries.
pub fn split_module_path(value: &str) -> Vec<String> {
    value
        .split(PATH_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the default engine from `appHome`, `modulePath`, `reloading` and
/// `maxOperations`.
pub fn bootstrap_engine(config: &ServletConfig) -> Result<RhaiEngine> {
    let params = config.params();
    let app_home = app_home(config);
    let module_path = config.init_parameter_or(MODULE_PATH, DEFAULT_MODULE_PATH);
    let reloading = params.get_bool_or(RELOADING, false)?;
    let max_operations = match params.get_u64_or(MAX_OPERATIONS, DEFAULT_MAX_OPERATIONS)? {
        0 => None,
        n => Some(n),
    };

    let home = resolve_code_root(config.servlet_context(), &app_home);
    let paths = split_module_path(&module_path);
    info!(
        home = %home.root().display(),
        module_path = ?paths,
        reloading,
        "Bootstrapping Rhai engine"
    );

    let engine_config = EngineConfig::new(home, paths.as_slice(), SYSTEM_MODULES)
        .with_reloading(reloading)
        .with_max_operations(max_operations);
    RhaiEngine::from_config(engine_config)
}
