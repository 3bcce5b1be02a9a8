//! # Armature JSGI
//!
//! A JSGI bridge for Armature: every HTTP request is handed to one Rhai
//! application handler as an environment object, and the handler answers with
//! a `{status, headers, body}` map.
//!
//! ## Features
//!
//! - **Single handler**: `moduleName`/`functionName` init parameters, or a
//!   callable bound in code
//! - **Shared prototype**: request-independent environment data is built once
//!   per servlet
//! - **Scoped contexts**: engine contexts are RAII guards, released on every path
//! - **Continuations**: requests whose continuation expired are skipped silently
//! - **Hosting**: a hyper HTTP/1.1 server running each dispatch on the blocking pool
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use armature_jsgi::config::{InitParams, ServletConfig, ServletContext};
//! use armature_jsgi::{JsgiServer, JsgiServlet};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = InitParams::new().with("modulePath", "app:lib");
//!     let config = ServletConfig::new("jsgi", params, ServletContext::new("", "./webapp"));
//!     let servlet = JsgiServlet::builder().init(&config)?;
//!
//!     JsgiServer::new(servlet).listen("127.0.0.1:8080".parse()?).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Handler Example
//!
//! ```rhai
//! // webapp/WEB-INF/app/config.rhai
//! fn app(env) {
//!     #{
//!         status: 200,
//!         headers: #{ "content-type": "text/plain" },
//!         body: [`Hello from ${env.pathInfo}`]
//!     }
//! }
//! ```

pub mod bootstrap;
pub mod config;
pub mod continuation;
pub mod engine;
pub mod env;
mod error;
pub mod handler;
pub mod jsgi;
pub mod logging;
pub mod report;
pub mod repository;
pub mod server;
pub mod servlet;
pub mod transport;

pub use engine::{Callable, ExecutionContext, GlobalScope, NativeModule, RhaiEngine, ScriptEngine};
pub use env::{Environment, EnvironmentPrototype};
pub use error::{JsgiError, Result, ServletError};
pub use handler::HandlerRef;
pub use report::{ErrorReporter, TracingReporter};
pub use server::JsgiServer;
pub use servlet::{JsgiServlet, JsgiServletBuilder, Outcome};
pub use transport::{JsgiRequest, JsgiResponse};

// Re-export rhai for handlers bound in Rust
pub use rhai;
