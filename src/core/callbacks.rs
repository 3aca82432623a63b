//! Error callback registry

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// Callback receiving a device error message
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Multicast list of error callbacks
///
/// Callbacks run synchronously on the dispatcher. A panicking callback is
/// logged and the remaining callbacks still run.
#[derive(Default, Clone)]
pub struct ErrorCallbacks {
    callbacks: Arc<RwLock<Vec<ErrorCallback>>>,
}

impl ErrorCallbacks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// Call every callback with `message`
    pub fn invoke(&self, message: &str) {
        let callbacks: Vec<ErrorCallback> = self.callbacks.read().clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
                error!(message, "error callback panicked");
            }
        }
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Whether no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }
}

impl std::fmt::Debug for ErrorCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorCallbacks")
            .field("len", &self.len())
            .finish()
    }
}
