//! Continuation (long-poll) expiry.
//!
//! The bridge only ever asks one question of a continuation: has it already
//! expired? Expired requests are skipped without dispatching, since the
//! application detects its own continuation timeouts.

use crate::transport::JsgiRequest;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Suspension state of a single request.
#[derive(Debug)]
pub struct Continuation {
    deadline: Option<Instant>,
    expired: AtomicBool,
    resumed: AtomicBool,
}

impl Default for Continuation {
    fn default() -> Self {
        Self::new()
    }
}

impl Continuation {
    /// A continuation with no timeout.
    pub fn new() -> Self {
        Self {
            deadline: None,
            expired: AtomicBool::new(false),
            resumed: AtomicBool::new(false),
        }
    }

    /// A continuation that expires `timeout` from now unless resumed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            ..Self::new()
        }
    }

    /// Force expiry.
    pub fn expire(&self) {
        self.expired.store(true, Ordering::Release);
    }

    /// Resume the request; a resumed continuation never times out.
    pub fn resume(&self) {
        self.resumed.store(true, Ordering::Release);
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed.load(Ordering::Acquire)
    }

    pub fn is_expired(&self) -> bool {
        if self.expired.load(Ordering::Acquire) {
            return true;
        }
        !self.is_resumed() && self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Answers whether a request's continuation has expired.
pub trait ContinuationSupport: Send + Sync {
    fn is_expired(&self, request: &JsgiRequest) -> bool;
}

/// Reads the continuation the server attached to the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContinuations;

impl ContinuationSupport for RequestContinuations {
    fn is_expired(&self, request: &JsgiRequest) -> bool {
        request.continuation().is_some_and(|c| c.is_expired())
    }
}
