//! Error types for the JSGI bridge.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, JsgiError>;

/// Errors raised while booting the engine or dispatching a request.
#[derive(Debug, Error)]
pub enum JsgiError {
    /// The code-resolution root could not be used.
    #[error("Code root unavailable at {path}: {message}")]
    CodeRoot { path: PathBuf, message: String },

    /// A required function or scope binding does not exist.
    #[error("No such method: {name}")]
    NoSuchMethod { name: String },

    /// No script or native module is registered under this id.
    #[error("Module not found: {id}")]
    ModuleNotFound { id: String },

    /// Module source failed to compile.
    #[error("Compilation error in module {module}: {message}")]
    Compilation { module: String, message: String },

    /// The application handler raised an error.
    #[error("Handler error in {module}: {message}")]
    HandlerExecution { module: String, message: String },

    /// The handler returned something that is not a JSGI response.
    #[error("Invalid JSGI response: {message}")]
    InvalidResponse { message: String },

    /// A dispatch function received an argument of the wrong shape.
    #[error("Invalid argument to {function}: expected {expected}, got {actual}")]
    InvalidArgument {
        function: String,
        expected: String,
        actual: String,
    },

    /// Init parameter could not be loaded or parsed.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JsgiError {
    /// Create a missing-method error.
    pub fn no_such_method(name: impl Into<String>) -> Self {
        JsgiError::NoSuchMethod { name: name.into() }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        JsgiError::Config {
            message: message.into(),
        }
    }

    /// Create an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        JsgiError::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a handler execution error.
    pub fn execution(module: impl Into<String>, message: impl Into<String>) -> Self {
        JsgiError::HandlerExecution {
            module: module.into(),
            message: message.into(),
        }
    }

    /// True if the expected entry point could not be located.
    pub fn is_missing_method(&self) -> bool {
        matches!(self, JsgiError::NoSuchMethod { .. })
    }
}

/// Failure surfaced to the hosting server.
///
/// `Init` aborts startup; `Request` fails a single request after it has been
/// reported.
#[derive(Debug, Error)]
pub enum ServletError {
    #[error("JSGI servlet initialization failed: {0}")]
    Init(#[source] JsgiError),

    #[error("JSGI request processing failed: {0}")]
    Request(#[source] JsgiError),
}

impl ServletError {
    /// The underlying bridge error.
    pub fn cause(&self) -> &JsgiError {
        match self {
            ServletError::Init(err) | ServletError::Request(err) => err,
        }
    }
}
