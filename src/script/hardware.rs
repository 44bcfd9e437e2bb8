use crate::config::{PerfProfile, PerformanceConfig};

/// Cache size used by the `auto` profile.
pub const AUTO_RAM_CACHE_MB: u64 = 4000;

/// Resolved VapourSynth core settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareSettings {
    pub cpu_threads: usize,
    pub ram_cache_mb: u64,
    pub use_gpu_opencl: bool,
}

impl HardwareSettings {
    /// Resolve settings for `config`, probing the host for the `auto`
    /// profile.
    pub fn detect(config: &PerformanceConfig) -> Self {
        let settings = match config.profile {
            PerfProfile::Manual => Self::from_config(config),
            PerfProfile::Auto => Self {
                cpu_threads: std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(config.cpu_threads),
                ram_cache_mb: AUTO_RAM_CACHE_MB,
                use_gpu_opencl: which::which("nvidia-smi").is_ok(),
            },
        };

        tracing::info!(
            "Performance profile {:?}: {} threads, {} MB cache, OpenCL {}",
            config.profile,
            settings.cpu_threads,
            settings.ram_cache_mb,
            if settings.use_gpu_opencl { "enabled" } else { "disabled" }
        );
        settings
    }

    /// Settings exactly as configured.
    pub fn from_config(config: &PerformanceConfig) -> Self {
        Self {
            cpu_threads: config.cpu_threads.max(1),
            ram_cache_mb: config.ram_cache_mb,
            use_gpu_opencl: config.use_gpu_opencl,
        }
    }
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self::from_config(&PerformanceConfig::default())
    }
}
