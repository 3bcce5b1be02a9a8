//! Shared fixtures for integration tests.

#![allow(dead_code)]

use armature_jsgi::continuation::ContinuationSupport;
use armature_jsgi::jsgi::{JSGI_MODULE, handle_request};
use armature_jsgi::rhai::{Dynamic, Map};
use armature_jsgi::{
    Callable, Environment, EnvironmentPrototype, ErrorReporter, ExecutionContext, GlobalScope,
    JsgiError, JsgiRequest, Result, ScriptEngine,
};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A `{status, headers, body}` map with a text body.
pub fn text_response(status: i64, body: &str) -> Dynamic {
    let mut headers = Map::new();
    headers.insert("content-type".into(), Dynamic::from("text/plain".to_string()));
    let mut map = Map::new();
    map.insert("status".into(), Dynamic::from(status));
    map.insert("headers".into(), Dynamic::from(headers));
    map.insert(
        "body".into(),
        Dynamic::from(vec![Dynamic::from(body.to_string())]),
    );
    Dynamic::from(map)
}

/// Records which handler an engine was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Named { module: String, function: String },
    Bound(String),
}

/// A scripted engine: `ringo/jsgi` is the real dispatch module, application
/// handlers answer with a fixed response or fail.
pub struct MockEngine {
    scope: GlobalScope,
    fail: bool,
    pub entered: AtomicUsize,
    pub exited: AtomicUsize,
    pub dispatches: AtomicUsize,
    pub invocations: Mutex<Vec<Invocation>>,
    pub prototypes: Mutex<Vec<Arc<EnvironmentPrototype>>>,
    pub paths: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        let mut jsgi = Map::new();
        jsgi.insert(
            "version".into(),
            Dynamic::from(vec![Dynamic::from(0_i64), Dynamic::from(3_i64)]),
        );
        Self::with_scope(GlobalScope::new().with("jsgi", Dynamic::from(jsgi)))
    }

    /// An engine whose scope lacks the `jsgi` binding.
    pub fn without_jsgi() -> Self {
        Self::with_scope(GlobalScope::new())
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn with_scope(scope: GlobalScope) -> Self {
        Self {
            scope,
            fail: false,
            entered: AtomicUsize::new(0),
            exited: AtomicUsize::new(0),
            dispatches: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
            prototypes: Mutex::new(Vec::new()),
            paths: Mutex::new(Vec::new()),
        }
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn exited(&self) -> usize {
        self.exited.load(Ordering::SeqCst)
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    fn record_env(&self, args: &[Dynamic]) {
        if let Some(env) = args.first().and_then(|a| a.clone().try_cast::<Environment>()) {
            self.prototypes.lock().push(Arc::clone(env.prototype()));
            self.paths.lock().push(env.path_info().to_string());
        }
    }

    fn answer(&self, module: &str) -> Result<Dynamic> {
        if self.fail {
            Err(JsgiError::execution(module, "boom"))
        } else {
            Ok(text_response(200, "Hello"))
        }
    }
}

impl ScriptEngine for MockEngine {
    fn enter_context(&self) -> Result<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exit_context(&self) {
        self.exited.fetch_add(1, Ordering::SeqCst);
    }

    fn scope(&self) -> &GlobalScope {
        &self.scope
    }

    fn invoke(
        &self,
        cx: &ExecutionContext<'_>,
        module: &str,
        function: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic> {
        if module == JSGI_MODULE {
            self.dispatches.fetch_add(1, Ordering::SeqCst);
            return handle_request(cx, args);
        }
        self.invocations.lock().push(Invocation::Named {
            module: module.to_string(),
            function: function.to_string(),
        });
        self.record_env(&args);
        self.answer(module)
    }

    fn call(
        &self,
        _cx: &ExecutionContext<'_>,
        callable: &Callable,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic> {
        self.invocations
            .lock()
            .push(Invocation::Bound(callable.name().to_string()));
        self.record_env(&args);
        match callable {
            Callable::Native { func, .. } => func(args),
            Callable::Script { .. } => self.answer("<callable>"),
        }
    }
}

/// Keeps every reported error.
#[derive(Default)]
pub struct RecordingReporter {
    pub reports: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn count(&self) -> usize {
        self.reports.lock().len()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &JsgiError) {
        self.reports.lock().push(error.to_string());
    }
}

/// Every continuation has expired.
pub struct AlwaysExpired;

impl ContinuationSupport for AlwaysExpired {
    fn is_expired(&self, _request: &JsgiRequest) -> bool {
        true
    }
}

/// Write `source` to `root/rel`, creating parent directories.
pub fn write_module(root: &Path, rel: &str, source: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, source).unwrap();
}
