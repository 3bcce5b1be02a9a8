//! The script engine seam.
//!
//! The dispatch core talks to the runtime only through [`ScriptEngine`]. Every
//! engine operation requires an [`ExecutionContext`], which is entered from the
//! engine and exited when the guard drops, on every path.

mod bindings;
mod runtime;

pub use self::bindings::register_jsgi_api;
pub use self::runtime::{CacheStats, CompiledModule, EngineConfig, RhaiEngine, SYSTEM_MODULES};

use crate::error::{JsgiError, Result};
use rhai::{AST, Dynamic, Scope};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// An embedded runtime able to run application handlers.
pub trait ScriptEngine: Send + Sync {
    /// Attach the calling thread to the engine.
    fn enter_context(&self) -> Result<()>;

    /// Detach the calling thread. Called once per successful enter.
    fn exit_context(&self);

    /// Global bindings shared by every call.
    fn scope(&self) -> &GlobalScope;

    /// Call `function` exported by `module`.
    fn invoke(
        &self,
        cx: &ExecutionContext<'_>,
        module: &str,
        function: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic>;

    /// Call a pre-bound callable.
    fn call(
        &self,
        cx: &ExecutionContext<'_>,
        callable: &Callable,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic>;
}

/// Scoped, thread-bound engine context.
///
/// Dropping the guard exits the context.
pub struct ExecutionContext<'a> {
    engine: &'a dyn ScriptEngine,
    _thread_bound: PhantomData<*const ()>,
}

impl<'a> ExecutionContext<'a> {
    /// Enter a context on the current thread.
    pub fn enter(engine: &'a dyn ScriptEngine) -> Result<Self> {
        engine.enter_context()?;
        Ok(Self {
            engine,
            _thread_bound: PhantomData,
        })
    }

    /// The engine this context belongs to.
    pub fn engine(&self) -> &'a dyn ScriptEngine {
        self.engine
    }
}

impl Drop for ExecutionContext<'_> {
    fn drop(&mut self) {
        self.engine.exit_context();
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext").finish_non_exhaustive()
    }
}

/// Read-only global bindings of an engine.
#[derive(Debug, Clone, Default)]
pub struct GlobalScope {
    bindings: BTreeMap<String, Dynamic>,
}

impl GlobalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding, builder style.
    pub fn with(mut self, name: impl Into<String>, value: Dynamic) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dynamic)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A fresh Rhai scope holding every binding as a constant.
    pub fn to_scope(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        for (name, value) in &self.bindings {
            scope.push_constant_dynamic(name.clone(), value.clone());
        }
        scope
    }
}

type NativeFn = dyn Fn(Vec<Dynamic>) -> Result<Dynamic> + Send + Sync;

/// A handler bound once, ahead of configuration.
#[derive(Clone)]
pub enum Callable {
    /// A function defined in a compiled script.
    Script { name: String, ast: Arc<AST> },
    /// A Rust closure.
    Native { name: String, func: Arc<NativeFn> },
}

impl Callable {
    /// Wrap a Rust closure.
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Dynamic>) -> Result<Dynamic> + Send + Sync + 'static,
    {
        Callable::Native {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Callable::Script { name, .. } | Callable::Native { name, .. } => name,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Script { name, .. } => f.debug_tuple("Script").field(name).finish(),
            Callable::Native { name, .. } => f.debug_tuple("Native").field(name).finish(),
        }
    }
}

/// A module implemented in Rust and registered with the engine by id.
pub trait NativeModule: Send + Sync {
    fn id(&self) -> &str;

    fn call(
        &self,
        cx: &ExecutionContext<'_>,
        function: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic>;
}

/// Build a missing-method error for `module.function`.
pub(crate) fn missing(module: &str, function: &str) -> JsgiError {
    JsgiError::no_such_method(format!("{module}.{function}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEngine {
        entered: AtomicUsize,
        exited: AtomicUsize,
        scope: GlobalScope,
    }

    impl ScriptEngine for CountingEngine {
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
            _cx: &ExecutionContext<'_>,
            module: &str,
            function: &str,
            _args: Vec<Dynamic>,
        ) -> Result<Dynamic> {
            Err(missing(module, function))
        }

        fn call(
            &self,
            _cx: &ExecutionContext<'_>,
            callable: &Callable,
            args: Vec<Dynamic>,
        ) -> Result<Dynamic> {
            match callable {
                Callable::Native { func, .. } => func(args),
                Callable::Script { name, .. } => Err(missing("script", name)),
            }
        }
    }

    #[test]
    fn test_context_exits_on_drop() {
        let engine = CountingEngine::default();
        {
            let _cx = ExecutionContext::enter(&engine).unwrap();
            assert_eq!(engine.entered.load(Ordering::SeqCst), 1);
            assert_eq!(engine.exited.load(Ordering::SeqCst), 0);
        }
        assert_eq!(engine.exited.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_context_exits_on_error_path() {
        let engine = CountingEngine::default();
        let run = || -> Result<Dynamic> {
            let cx = ExecutionContext::enter(&engine)?;
            engine.invoke(&cx, "config", "app", vec![])
        };
        assert!(run().unwrap_err().is_missing_method());
        assert_eq!(engine.exited.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_native_callable() {
        let engine = CountingEngine::default();
        let callable = Callable::native("double", |args| {
            let n = args[0].as_int().map_err(|t| JsgiError::invalid_response(t))?;
            Ok(Dynamic::from(n * 2))
        });
        let cx = ExecutionContext::enter(&engine).unwrap();
        let out = engine.call(&cx, &callable, vec![Dynamic::from(21_i64)]).unwrap();
        assert_eq!(out.as_int().unwrap(), 42);
        assert_eq!(callable.name(), "double");
    }

    #[test]
    fn test_global_scope_to_scope() {
        let globals = GlobalScope::new().with("answer", Dynamic::from(42_i64));
        assert!(globals.contains("answer"));
        let scope = globals.to_scope();
        assert_eq!(scope.get_value::<i64>("answer"), Some(42));
        assert!(scope.is_constant("answer").unwrap_or(false));
    }
}
