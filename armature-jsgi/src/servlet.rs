//! The JSGI servlet: one-time initialisation and per-request dispatch.
//!
//! [`JsgiServletBuilder::init`] is the only way to obtain a [`JsgiServlet`], so
//! a servlet that exists is fully initialised. Everything it holds is shared
//! read-only across request threads.

use crate::bootstrap::bootstrap_engine;
use crate::config::ServletConfig;
use crate::continuation::{ContinuationSupport, RequestContinuations};
use crate::engine::{Callable, ExecutionContext, ScriptEngine};
use crate::env::{Environment, EnvironmentPrototype};
use crate::error::{Result, ServletError};
use crate::handler::HandlerRef;
use crate::jsgi::{HANDLE_REQUEST, JSGI_MODULE};
use crate::report::{ErrorReporter, TracingReporter};
use crate::transport::{JsgiRequest, JsgiResponse};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

/// How a request left the servlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request's continuation had expired; nothing was dispatched.
    Skipped,
    /// The handler ran and the response was written.
    Completed,
}

/// Collects the optional collaborators of a servlet.
pub struct JsgiServletBuilder {
    engine: Option<Arc<dyn ScriptEngine>>,
    callable: Option<Callable>,
    reporter: Arc<dyn ErrorReporter>,
    continuations: Arc<dyn ContinuationSupport>,
}

impl Default for JsgiServletBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsgiServletBuilder {
    pub fn new() -> Self {
        Self {
            engine: None,
            callable: None,
            reporter: Arc::new(TracingReporter),
            continuations: Arc::new(RequestContinuations),
        }
    }

    /// Use this engine instead of bootstrapping one from init parameters.
    pub fn engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Dispatch to this callable; `moduleName` and `functionName` are ignored.
    pub fn callable(mut self, callable: Callable) -> Self {
        self.callable = Some(callable);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn continuations(mut self, continuations: Arc<dyn ContinuationSupport>) -> Self {
        self.continuations = continuations;
        self
    }

    /// Resolve the handler, bootstrap the engine if none was supplied, and
    /// build the environment prototype.
    pub fn init(self, config: &ServletConfig) -> std::result::Result<JsgiServlet, ServletError> {
        let handler = HandlerRef::resolve(self.callable, config);

        let engine = match self.engine {
            Some(engine) => engine,
            None => Arc::new(bootstrap_engine(config).map_err(ServletError::Init)?),
        };

        let script_name = config.servlet_context().context_path();
        let prototype = EnvironmentPrototype::build(engine.as_ref(), script_name)
            .map_err(ServletError::Init)?;

        info!(
            servlet = config.servlet_name(),
            handler = ?handler,
            "JSGI servlet initialised"
        );

        Ok(JsgiServlet {
            name: config.servlet_name().to_string(),
            engine,
            handler,
            prototype,
            reporter: self.reporter,
            continuations: self.continuations,
        })
    }
}

/// An initialised JSGI servlet.
pub struct JsgiServlet {
    name: String,
    engine: Arc<dyn ScriptEngine>,
    handler: HandlerRef,
    prototype: Arc<EnvironmentPrototype>,
    reporter: Arc<dyn ErrorReporter>,
    continuations: Arc<dyn ContinuationSupport>,
}

impl JsgiServlet {
    pub fn builder() -> JsgiServletBuilder {
        JsgiServletBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    pub fn prototype(&self) -> &Arc<EnvironmentPrototype> {
        &self.prototype
    }

    pub fn engine(&self) -> &Arc<dyn ScriptEngine> {
        &self.engine
    }

    /// Serve one request.
    ///
    /// Expired continuations are skipped without touching the engine or the
    /// response. Any dispatch failure is reported once and returned as
    /// [`ServletError::Request`].
    pub fn service(
        &self,
        request: JsgiRequest,
        response: &JsgiResponse,
    ) -> std::result::Result<Outcome, ServletError> {
        if self.continuations.is_expired(&request) {
            return Ok(Outcome::Skipped);
        }

        match self.dispatch(request, response) {
            Ok(()) => Ok(Outcome::Completed),
            Err(err) => {
                self.reporter.report(&err);
                Err(ServletError::Request(err))
            }
        }
    }

    #[instrument(
        name = "jsgi_dispatch",
        skip_all,
        fields(servlet = %self.name, method = %request.method(), path = %request.path())
    )]
    fn dispatch(&self, request: JsgiRequest, response: &JsgiResponse) -> Result<()> {
        let cx = ExecutionContext::enter(self.engine.as_ref())?;
        let env = Environment::new(request, response.clone(), &self.prototype);
        let args = self.handler.dispatch_args(env);
        self.engine
            .invoke(&cx, JSGI_MODULE, HANDLE_REQUEST, args)
            .map(drop)
    }
}

impl fmt::Debug for JsgiServlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsgiServlet")
            .field("name", &self.name)
            .field("handler", &self.handler)
            .field("prototype", &self.prototype)
            .finish_non_exhaustive()
    }
}
