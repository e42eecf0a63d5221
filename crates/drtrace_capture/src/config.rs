//! Capture configuration.

use crate::error::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default per-thread buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Smallest buffer that still holds a header, a thread id and a few ids
pub const MIN_BUFFER_SIZE: usize = 64;

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Bytes staged per thread before a flush
    pub buffer_size: usize,
    /// Trace file, truncated when the session starts
    pub trace_file: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            trace_file: PathBuf::from("./trace.out"),
        }
    }
}

impl CaptureConfig {
    /// Set the per-thread buffer size
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the trace file path
    #[must_use]
    pub fn with_trace_file(mut self, trace_file: impl Into<PathBuf>) -> Self {
        self.trace_file = trace_file.into();
        self
    }

    /// Check the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the buffer is too small for useful records or too
    /// large for the 32-bit record length field.
    pub fn validate(&self) -> CaptureResult<()> {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(CaptureError::InvalidConfig(format!(
                "buffer_size {} is below the minimum of {}",
                self.buffer_size, MIN_BUFFER_SIZE
            )));
        }
        if u32::try_from(self.buffer_size).is_err() {
            return Err(CaptureError::InvalidConfig(format!(
                "buffer_size {} exceeds the {}-byte record length limit",
                self.buffer_size,
                u32::MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert_eq!(config.buffer_size, 128 * 1024);
        assert_eq!(config.trace_file, PathBuf::from("./trace.out"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CaptureConfig::default()
            .with_buffer_size(4096)
            .with_trace_file("/tmp/t.out");
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.trace_file, PathBuf::from("/tmp/t.out"));
    }

    #[test]
    fn test_too_small_rejected() {
        let config = CaptureConfig::default().with_buffer_size(16);
        assert!(matches!(
            config.validate(),
            Err(CaptureError::InvalidConfig(_))
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_too_large_rejected() {
        let config = CaptureConfig::default().with_buffer_size(u32::MAX as usize + 1);
        assert!(config.validate().is_err());
    }
}
