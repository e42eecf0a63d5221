//! Capture session: one trace file shared by every worker thread.

use crate::buffer::ThreadBuffer;
use crate::config::CaptureConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::flush::{FlushCoordinator, FlushStats, TraceSink};
use drtrace_core::ThreadId;
use std::fs::File;
use std::sync::Arc;

/// Owns the flush coordinator and hands out per-thread buffers
pub struct CaptureSession<S: TraceSink = File> {
    config: CaptureConfig,
    coordinator: Arc<FlushCoordinator<S>>,
}

impl CaptureSession<File> {
    /// Create (truncating) the configured trace file.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the file cannot be
    /// created.
    pub fn create(config: CaptureConfig) -> CaptureResult<Self> {
        config.validate()?;
        let file = File::create(&config.trace_file).map_err(|source| CaptureError::Open {
            path: config.trace_file.display().to_string(),
            source,
        })?;
        tracing::info!(
            path = %config.trace_file.display(),
            buffer_size = config.buffer_size,
            "trace file opened"
        );
        Ok(Self {
            config,
            coordinator: Arc::new(FlushCoordinator::new(file)),
        })
    }
}

impl<S: TraceSink> CaptureSession<S> {
    /// Capture into an arbitrary sink
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn with_sink(config: CaptureConfig, sink: S) -> CaptureResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            coordinator: Arc::new(FlushCoordinator::new(sink)),
        })
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Shared flush coordinator
    #[must_use]
    pub fn coordinator(&self) -> &Arc<FlushCoordinator<S>> {
        &self.coordinator
    }

    /// Allocate the buffer for a newly started thread
    #[must_use]
    pub fn thread_buffer(&self, thread_id: ThreadId) -> ThreadBuffer<S> {
        tracing::info!(thread = %thread_id, size = self.config.buffer_size, "initializing thread buffer");
        ThreadBuffer::new(
            thread_id,
            self.config.buffer_size,
            Arc::clone(&self.coordinator),
        )
    }

    /// Push everything written so far to storage and report the counters.
    ///
    /// Buffers still alive keep the sink open; their records land when they
    /// are finished or dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the sink cannot be synced.
    pub fn close(self) -> CaptureResult<FlushStats> {
        self.coordinator.sync()?;
        let stats = self.coordinator.stats();
        tracing::info!(flushes = stats.flushes, bytes = stats.bytes, "capture session closed");
        Ok(stats)
    }
}
