//! Error reporting for failed requests.

use crate::error::JsgiError;
use std::error::Error as _;
use tracing::error;

/// Receives every per-request failure exactly once, before it is surfaced to
/// the hosting server.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &JsgiError);
}

/// Logs failures through `tracing` at `error` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, err: &JsgiError) {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        error!(error = %err, causes = ?chain, "JSGI request failed");
    }
}
