//! Rhai-backed [`ScriptEngine`].

use super::bindings::register_jsgi_api;
use super::{Callable, ExecutionContext, GlobalScope, NativeModule, ScriptEngine, missing};
use crate::error::{JsgiError, Result};
use crate::jsgi::JsgiModule;
use crate::repository::Repository;
use parking_lot::RwLock;
use rhai::module_resolvers::{FileModuleResolver, ModuleResolversCollection};
use rhai::{AST, Dynamic, Engine, EvalAltResult, Map};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Directory below the code root holding system modules.
pub const SYSTEM_MODULES: &str = "modules";

/// JSGI version advertised to handlers.
const JSGI_VERSION: [i64; 2] = [0, 3];

const EXTENSION: &str = "rhai";

/// Rhai call-stack limit for handler code.
const MAX_CALL_DEPTH: usize = 64;

thread_local! {
    static CONTEXT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Engine configuration: where modules come from and how calls are limited.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    home: Arc<dyn Repository>,
    module_paths: Vec<PathBuf>,
    system_modules: String,
    reloading: bool,
    max_operations: Option<u64>,
}

impl EngineConfig {
    /// Create a configuration rooted at `home`, searching `paths` in order and
    /// then the `system_modules` directory.
    pub fn new<P: AsRef<str>>(
        home: Arc<dyn Repository>,
        paths: &[P],
        system_modules: impl Into<String>,
    ) -> Self {
        Self {
            home,
            module_paths: paths.iter().map(|p| PathBuf::from(p.as_ref())).collect(),
            system_modules: system_modules.into(),
            reloading: false,
            max_operations: Some(crate::config::DEFAULT_MAX_OPERATIONS),
        }
    }

    /// Recompile modules whose source changed since they were cached.
    pub fn with_reloading(mut self, enabled: bool) -> Self {
        self.reloading = enabled;
        self
    }

    /// Operation budget per call; `None` disables the limit.
    pub fn with_max_operations(mut self, max: Option<u64>) -> Self {
        self.max_operations = max;
        self
    }

    pub fn home(&self) -> &Arc<dyn Repository> {
        &self.home
    }

    pub fn module_paths(&self) -> &[PathBuf] {
        &self.module_paths
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    /// Directories searched for module sources, in lookup order.
    pub fn search_roots(&self) -> Vec<PathBuf> {
        self.module_paths
            .iter()
            .map(|p| self.home.resolve(p))
            .chain(std::iter::once(
                self.home.resolve(Path::new(&self.system_modules)),
            ))
            .collect()
    }
}

/// A compiled module.
#[derive(Debug)]
pub struct CompiledModule {
    /// Module id.
    pub id: String,
    /// Source file.
    pub path: PathBuf,
    ast: Arc<AST>,
    compiled_at: SystemTime,
}

impl CompiledModule {
    fn new(id: String, path: PathBuf, ast: AST) -> Self {
        Self {
            id,
            path,
            ast: Arc::new(ast),
            compiled_at: SystemTime::now(),
        }
    }

    pub fn ast(&self) -> &Arc<AST> {
        &self.ast
    }

    /// Check if the source file was modified after compilation.
    pub fn is_stale(&self, home: &dyn Repository) -> bool {
        home.modified(&self.path)
            .is_some_and(|modified| modified > self.compiled_at)
    }

    /// Whether the module defines a function with this name.
    pub fn exports(&self, function: &str) -> bool {
        self.ast.iter_functions().any(|f| f.name == function)
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cached modules.
    pub cached_modules: usize,
    /// Total cache hits.
    pub hits: u64,
    /// Total cache misses.
    pub misses: u64,
}

/// Rhai engine with JSGI bindings.
pub struct RhaiEngine {
    engine: Engine,
    config: EngineConfig,
    scope: GlobalScope,
    modules: RwLock<HashMap<String, Arc<CompiledModule>>>,
    natives: HashMap<String, Arc<dyn NativeModule>>,
    hits: AtomicU64,
    misses: AtomicU64,
    active_contexts: AtomicUsize,
}

impl RhaiEngine {
    /// Create an engine from configuration.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        if !config.home.exists() {
            return Err(JsgiError::CodeRoot {
                path: config.home.root().to_path_buf(),
                message: "code root does not exist".to_string(),
            });
        }

        let mut engine = Engine::new();

        if let Some(max_ops) = config.max_operations {
            engine.set_max_operations(max_ops);
        }
        engine.set_max_call_levels(MAX_CALL_DEPTH);

        // `import` statements inside modules resolve over the same roots
        let mut resolvers = ModuleResolversCollection::new();
        for root in config.search_roots() {
            resolvers.push(FileModuleResolver::new_with_path_and_extension(
                root, EXTENSION,
            ));
        }
        engine.set_module_resolver(resolvers);

        register_jsgi_api(&mut engine);

        let version: rhai::Array = JSGI_VERSION.iter().map(|v| Dynamic::from(*v)).collect();
        let mut jsgi = Map::new();
        jsgi.insert("version".into(), Dynamic::from(version));
        let scope = GlobalScope::new().with("jsgi", Dynamic::from(jsgi)).with(
            "server",
            Dynamic::from(format!("armature-jsgi/{}", env!("CARGO_PKG_VERSION"))),
        );

        debug!(
            home = %config.home.root().display(),
            roots = ?config.search_roots(),
            "Rhai engine configured"
        );

        let mut rhai_engine = Self {
            engine,
            config,
            scope,
            modules: RwLock::new(HashMap::new()),
            natives: HashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            active_contexts: AtomicUsize::new(0),
        };
        rhai_engine.register_native(Arc::new(JsgiModule));
        Ok(rhai_engine)
    }

    /// Register a native module; it shadows any script module with the same id.
    pub fn register_native(&mut self, module: Arc<dyn NativeModule>) {
        self.natives.insert(module.id().to_string(), module);
    }

    /// Get a reference to the underlying Rhai engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compile `source` and bind `function` from it as a [`Callable`].
    pub fn compile_callable(&self, source: &str, function: &str) -> Result<Callable> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| JsgiError::Compilation {
                module: "<callable>".to_string(),
                message: e.to_string(),
            })?;
        if !ast.iter_functions().any(|f| f.name == function) {
            return Err(missing("<callable>", function));
        }
        Ok(Callable::Script {
            name: function.to_string(),
            ast: Arc::new(ast),
        })
    }

    /// Load a module by id, from cache when possible.
    pub fn load_module(&self, id: &str) -> Result<Arc<CompiledModule>> {
        if let Some(module) = self.modules.read().get(id) {
            if !(self.config.reloading && module.is_stale(self.config.home.as_ref())) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(module.clone());
            }
            debug!(module = id, "Module source changed, recompiling");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let path = self
            .locate(id)
            .ok_or_else(|| JsgiError::ModuleNotFound { id: id.to_string() })?;
        let source = self.config.home.read(&path)?;
        let ast = self
            .engine
            .compile(&source)
            .map_err(|e| JsgiError::Compilation {
                module: id.to_string(),
                message: e.to_string(),
            })?;

        let module = Arc::new(CompiledModule::new(id.to_string(), path, ast));
        self.modules.write().insert(id.to_string(), module.clone());
        Ok(module)
    }

    /// Find the source file for a module id.
    fn locate(&self, id: &str) -> Option<PathBuf> {
        let relative = PathBuf::from(format!("{id}.{EXTENSION}"));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return None;
        }
        self.config
            .search_roots()
            .into_iter()
            .map(|root| root.join(&relative))
            .find(|candidate| candidate.is_file())
    }

    /// Drop every cached module.
    pub fn clear_cache(&self) {
        self.modules.write().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            cached_modules: self.modules.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Contexts currently entered, across all threads.
    pub fn active_contexts(&self) -> usize {
        self.active_contexts.load(Ordering::SeqCst)
    }

    /// Context nesting depth on the calling thread.
    pub fn context_depth() -> usize {
        CONTEXT_DEPTH.with(Cell::get)
    }

    fn run(
        &self,
        module: &str,
        ast: &AST,
        function: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic> {
        let mut scope = self.scope.to_scope();
        self.engine
            .call_fn::<Dynamic>(&mut scope, ast, function, args)
            .map_err(|err| map_eval_error(module, function, *err))
    }
}

fn map_eval_error(module: &str, function: &str, err: EvalAltResult) -> JsgiError {
    match err {
        EvalAltResult::ErrorFunctionNotFound(ref signature, _)
            if signature.split(' ').next() == Some(function) =>
        {
            missing(module, function)
        }
        other => JsgiError::execution(module, other.to_string()),
    }
}

impl ScriptEngine for RhaiEngine {
    fn enter_context(&self) -> Result<()> {
        CONTEXT_DEPTH.with(|depth| depth.set(depth.get() + 1));
        self.active_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exit_context(&self) {
        CONTEXT_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
        self.active_contexts.fetch_sub(1, Ordering::SeqCst);
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
        if let Some(native) = self.natives.get(module) {
            trace!(module, function, "Invoking native module");
            return native.call(cx, function, args);
        }

        let compiled = self.load_module(module)?;
        if !compiled.exports(function) {
            return Err(missing(module, function));
        }
        trace!(module, function, path = %compiled.path.display(), "Invoking script module");
        self.run(module, compiled.ast(), function, args)
    }

    fn call(
        &self,
        _cx: &ExecutionContext<'_>,
        callable: &Callable,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic> {
        match callable {
            Callable::Script { name, ast } => self.run("<callable>", ast, name, args),
            Callable::Native { func, .. } => func(args),
        }
    }
}
