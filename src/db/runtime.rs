//! Driver runtime.
//!
//! Every driver connection of a `Sql` instance lives on one dedicated multi-thread
//! runtime. Blocking calls enter it with `block_on`; async calls spawn onto it and
//! await the join handle, so driver sockets never migrate between reactors.

use crate::error::{SqlError, SqlResult};
use std::future::Future;
use tokio::runtime::{Handle, Runtime};

const DRIVER_THREADS: usize = 2;

/// Owner of the driver runtime. Dropping it shuts the runtime down in the background.
pub(crate) struct DriverRuntime {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl DriverRuntime {
    pub(crate) fn new() -> SqlResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(DRIVER_THREADS)
            .thread_name("sqlmagic-driver")
            .enable_all()
            .build()
            .map_err(|e| SqlError::internal(format!("Failed to start driver runtime: {e}")))?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub(crate) fn handle(&self) -> DriverHandle {
        DriverHandle(self.handle.clone())
    }
}

impl Drop for DriverRuntime {
    fn drop(&mut self) {
        // A plain drop would block, which panics inside an async context
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Check whether the calling thread is inside a tokio runtime, where blocking on
/// the driver runtime would panic.
pub(crate) fn in_async_context() -> bool {
    Handle::try_current().is_ok()
}

/// Cloneable handle used by connections and factories to reach the driver runtime.
#[derive(Clone)]
pub(crate) struct DriverHandle(Handle);

impl DriverHandle {
    /// Run a driver future to completion on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async execution context; use the `_async`
    /// variant of the operation there.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.0.block_on(future)
    }

    /// Run a driver future on the driver runtime and await its result.
    pub(crate) async fn run<F, T>(&self, future: F) -> SqlResult<T>
    where
        F: Future<Output = SqlResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.0
            .spawn(future)
            .await
            .map_err(|e| SqlError::internal(format!("Driver task failed: {e}")))?
    }

    /// Spawn a driver future without waiting for it.
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.0.spawn(future);
    }
}
