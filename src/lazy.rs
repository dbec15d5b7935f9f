//! One-time, on-demand model loading.
//!
//! Local inference models are expensive to load. `LazyModel` defers loading
//! until the first request that needs the model, runs the loader on the
//! blocking pool, and hands every caller the same shared instance. Concurrent
//! first requests wait on a single load. The model is released when the last
//! handle is dropped.

use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Loader invoked once to build the model.
type Loader<T> = Arc<dyn Fn() -> Result<T, String> + Send + Sync>;

/// Lazily initialized, shared model instance.
pub struct LazyModel<T> {
    cell: OnceCell<Arc<Mutex<T>>>,
    loader: Loader<T>,
}

impl<T: Send + 'static> LazyModel<T> {
    /// Create a handle that will build the model with `loader` on first use.
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<T, String> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Arc::new(loader),
        }
    }

    /// Get the model, loading it if this is the first call.
    ///
    /// A failed load is not cached; the next call tries again.
    pub async fn get(&self) -> Result<Arc<Mutex<T>>, String> {
        let model = self
            .cell
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                let model = tokio::task::spawn_blocking(move || loader())
                    .await
                    .map_err(|e| format!("model loader panicked: {}", e))??;
                tracing::info!("model loaded");
                Ok::<_, String>(Arc::new(Mutex::new(model)))
            })
            .await?;
        Ok(Arc::clone(model))
    }

    /// Whether the model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_loads_once_across_concurrent_callers() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let lazy = Arc::new(LazyModel::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1u8, 2, 3])
        }));

        assert!(!lazy.is_loaded());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                tokio::spawn(async move {
                    let model = lazy.get().await.unwrap();
                    let len = model.lock().unwrap().len();
                    len
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 3);
        }

        assert!(lazy.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let lazy = LazyModel::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("download failed".to_string())
            } else {
                Ok(42u32)
            }
        });

        assert!(lazy.get().await.is_err());
        assert!(!lazy.is_loaded());

        let model = lazy.get().await.unwrap();
        assert_eq!(*model.lock().unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
