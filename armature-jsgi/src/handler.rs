//! Application handler resolution.

use crate::config::{DEFAULT_FUNCTION_NAME, DEFAULT_MODULE_NAME, FUNCTION_NAME, MODULE_NAME, ServletConfig};
use crate::engine::Callable;
use crate::env::Environment;
use rhai::Dynamic;
use tracing::debug;

/// The application entry point the servlet dispatches to.
#[derive(Debug, Clone)]
pub enum HandlerRef {
    /// Looked up by the engine on every request.
    Named { module: String, function: String },
    /// Supplied ahead of configuration and used verbatim.
    Bound(Callable),
}

impl HandlerRef {
    /// Resolve the handler.
    ///
    /// A supplied callable always wins; otherwise the `moduleName` and
    /// `functionName` init parameters are read, falling back to `config` and
    /// `app`.
    pub fn resolve(callable: Option<Callable>, config: &ServletConfig) -> Self {
        if let Some(callable) = callable {
            debug!(callable = callable.name(), "Using bound JSGI handler");
            return HandlerRef::Bound(callable);
        }

        let module = config.init_parameter_or(MODULE_NAME, DEFAULT_MODULE_NAME);
        let function = config.init_parameter_or(FUNCTION_NAME, DEFAULT_FUNCTION_NAME);
        debug!(module = %module, function = %function, "Using named JSGI handler");
        HandlerRef::Named { module, function }
    }

    /// Arguments for `handleRequest`: handler, function name, environment.
    ///
    /// A bound handler passes an empty function name.
    pub fn dispatch_args(&self, env: Environment) -> Vec<Dynamic> {
        let (handler, function) = match self {
            HandlerRef::Named { module, function } => {
                (Dynamic::from(module.clone()), function.clone())
            }
            HandlerRef::Bound(callable) => (Dynamic::from(callable.clone()), String::new()),
        };
        vec![handler, Dynamic::from(function), Dynamic::from(env)]
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, HandlerRef::Bound(_))
    }
}
