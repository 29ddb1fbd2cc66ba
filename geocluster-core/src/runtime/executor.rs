//! Tokio runtime for the fetch phase
//!
//! Fetch workers spend their time waiting on rate-limiter slots and the
//! network, so they run on a dedicated multi-threaded I/O runtime. The
//! clustering phase uses its own thread pool and never touches it.

use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

use crate::error::{GeoClusterError, Result};

/// Configuration for the pipeline runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of threads for I/O operations
    pub io_threads: usize,
    /// Time allowed for in-flight tasks at shutdown
    pub shutdown_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            io_threads: num_cpus::get().clamp(2, 8),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// I/O runtime owned by the pipeline
pub struct PipelineRuntime {
    io_runtime: Runtime,
    config: RuntimeConfig,
}

impl PipelineRuntime {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let io_runtime = Builder::new_multi_thread()
            .worker_threads(config.io_threads.max(1))
            .thread_name("geocluster-io")
            .enable_all()
            .build()
            .map_err(|e| GeoClusterError::Internal {
                message: format!("Failed to create I/O runtime: {}", e),
            })?;

        Ok(Self { io_runtime, config })
    }

    /// Spawn an I/O-bound task
    pub fn spawn_io<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.io_runtime.spawn(future)
    }

    /// Run a future on the I/O runtime, blocking until complete
    pub fn block_on_io<F: std::future::Future>(&self, future: F) -> F::Output {
        self.io_runtime.block_on(future)
    }

    pub fn io_handle(&self) -> tokio::runtime::Handle {
        self.io_runtime.handle().clone()
    }

    /// Stop the runtime, waiting up to the configured timeout
    pub fn shutdown(self) {
        self.io_runtime.shutdown_timeout(self.config.shutdown_timeout);
    }
}
