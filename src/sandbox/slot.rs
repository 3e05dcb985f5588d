use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;

/// Lazily created, resettable handle to an expensive runtime.
///
/// The first caller of [`get_or_try_init`](Self::get_or_try_init) runs the
/// initializer while holding the slot lock, so callers arriving during the
/// load wait for it and share the result instead of starting a second load.
/// A failed load leaves the slot empty and the next caller retries.
pub struct RuntimeSlot<T> {
    name: &'static str,
    inner: Mutex<Option<Arc<T>>>,
}

impl<T> RuntimeSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(None),
        }
    }

    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut guard = self.inner.lock().await;
        if let Some(runtime) = guard.as_ref() {
            return Ok(Arc::clone(runtime));
        }

        info!(runtime = self.name, "Loading runtime");
        let runtime = Arc::new(init().await?);
        *guard = Some(Arc::clone(&runtime));
        info!(runtime = self.name, "Runtime ready");

        Ok(runtime)
    }

    /// Drop the current instance. Runs still holding it finish on the old one.
    pub async fn reset(&self) -> bool {
        let discarded = self.inner.lock().await.take().is_some();
        if discarded {
            info!(runtime = self.name, "Runtime discarded");
        }
        discarded
    }
}
