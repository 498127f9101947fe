//! Process-wide runtime configuration
//!
//! Configuration is resolved once, on first use, from the environment
//! (`HCRT_*` variables) unless an embedder installed one explicitly with
//! [`set_global`] before that.

use crate::error::{Error, Result};
use std::sync::OnceLock;
use tracing::warn;

/// Environment variable selecting the GPU used for new contexts
pub const ENV_GPU_DEVICE: &str = "HCRT_GPU_DEVICE";
/// Environment variable capping outstanding operations per queue
pub const ENV_MAX_PENDING_OPS: &str = "HCRT_MAX_PENDING_OPS";
/// Environment variable setting the alignment of runtime-owned host memory
pub const ENV_HOST_ALIGNMENT: &str = "HCRT_HOST_ALIGNMENT";

static GLOBAL: OnceLock<RuntimeConfig> = OnceLock::new();

/// Runtime tuning knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// GPU ordinal used when a GPU or AUTO context is created
    pub gpu_device_index: u32,

    /// Maximum number of enqueued-but-unfinished operations per task queue.
    ///
    /// Enqueueing blocks while a queue is at the cap.
    pub max_pending_ops: usize,

    /// Alignment in bytes of host allocations made by the runtime
    pub host_alignment: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gpu_device_index: 0,
            max_pending_ops: 1024,
            host_alignment: 64, // AVX-512 alignment
        }
    }
}

impl RuntimeConfig {
    /// Build a configuration from `HCRT_*` environment variables.
    ///
    /// Unparsable or invalid values are logged and replaced by defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(index) = read_env::<u32>(ENV_GPU_DEVICE) {
            config.gpu_device_index = index;
        }
        if let Some(cap) = read_env::<usize>(ENV_MAX_PENDING_OPS) {
            config.max_pending_ops = cap;
        }
        if let Some(align) = read_env::<usize>(ENV_HOST_ALIGNMENT) {
            config.host_alignment = align;
        }

        if let Err(e) = config.validate() {
            warn!("Ignoring invalid HCRT environment configuration: {}", e);
            return Self::default();
        }
        config
    }

    /// Set the GPU ordinal used for new contexts
    pub fn with_gpu_device_index(mut self, index: u32) -> Self {
        self.gpu_device_index = index;
        self
    }

    /// Set the per-queue outstanding operation cap
    pub fn with_max_pending_ops(mut self, cap: usize) -> Self {
        self.max_pending_ops = cap;
        self
    }

    /// Set the host allocation alignment
    pub fn with_host_alignment(mut self, align: usize) -> Self {
        self.host_alignment = align;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_pending_ops == 0 {
            return Err(Error::invalid_argument(
                "max_pending_ops",
                "must be greater than 0",
            ));
        }
        if !self.host_alignment.is_power_of_two() {
            return Err(Error::invalid_argument(
                "host_alignment",
                format!("{} is not a power of two", self.host_alignment),
            ));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

/// Get the process-wide configuration, resolving it from the environment on first use
pub fn global() -> &'static RuntimeConfig {
    GLOBAL.get_or_init(RuntimeConfig::from_env)
}

/// Install the process-wide configuration.
///
/// Fails if the configuration is invalid or one was already resolved.
pub fn set_global(config: RuntimeConfig) -> Result<()> {
    config.validate()?;
    GLOBAL.set(config).map_err(|_| {
        Error::runtime(
            crate::error::ErrorKind::InvalidOperation,
            "Runtime configuration already initialized",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = RuntimeConfig::default()
            .with_gpu_device_index(2)
            .with_max_pending_ops(8)
            .with_host_alignment(128);
        assert_eq!(config.gpu_device_index, 2);
        assert_eq!(config.max_pending_ops, 8);
        assert_eq!(config.host_alignment, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(
            RuntimeConfig::default()
                .with_max_pending_ops(0)
                .validate()
                .is_err()
        );
        assert!(
            RuntimeConfig::default()
                .with_host_alignment(48)
                .validate()
                .is_err()
        );
    }
}
