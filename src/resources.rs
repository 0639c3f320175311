//! # Host Resource Detection
//!
//! Samples the CPU and memory figures the executor pool sizing formula
//! consumes. The probe is a trait because "available memory" is a policy
//! decision as much as a measurement: the default [`SystemProbe`] samples the
//! OS-level figure at construction time, and deployments with different
//! accounting (cgroup limits, reservation systems) can plug in their own
//! probe without touching the sizing formula.

use chrono::{DateTime, Utc};
use sysinfo::System;
use tracing::debug;

/// A point-in-time sample of the host resources relevant to pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct SystemResources {
    /// Logical CPU count.
    pub cpu_count: usize,

    /// Memory currently available for new work, in bytes.
    pub available_memory_bytes: u64,

    /// When the sample was taken.
    pub sampled_at: DateTime<Utc>,
}

/// Source of host resource samples.
pub trait ResourceProbe: Send + Sync {
    fn snapshot(&self) -> SystemResources;
}

/// Probe backed by OS-level metrics.
#[derive(Debug, Default)]
pub struct SystemProbe;

impl SystemProbe {
    pub fn new() -> Self {
        Self
    }

    /// Effective available memory in bytes.
    ///
    /// Some platforms account cache/buffer pages as unavailable, reporting a
    /// very low available figure on otherwise idle hosts. When the reported
    /// figure is under 20% of total, fall back to a conservative estimate of
    /// 70% of total minus what processes actually use.
    fn detect_available_memory() -> u64 {
        let mut sys = System::new();
        sys.refresh_memory();

        let total = sys.total_memory();
        let available = sys.available_memory();
        let used = sys.used_memory();

        if total == 0 {
            return available;
        }

        let available_percentage = (available as f64 / total as f64) * 100.0;
        let effective = if available_percentage > 20.0 {
            available
        } else {
            let conservative_total = (total as f64 * 0.7) as u64;
            let realistic = conservative_total.saturating_sub(used);

            debug!(
                "reported available memory ({} MB, {:.1}%) looks too low, using conservative estimate ({} MB)",
                available / (1024 * 1024),
                available_percentage,
                realistic / (1024 * 1024)
            );

            realistic
        };

        debug!(
            "memory detection - total: {} MB, used: {} MB, effective available: {} MB",
            total / (1024 * 1024),
            used / (1024 * 1024),
            effective / (1024 * 1024)
        );

        effective
    }

    fn detect_cpu_count() -> usize {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    }
}

impl ResourceProbe for SystemProbe {
    fn snapshot(&self) -> SystemResources {
        SystemResources {
            cpu_count: Self::detect_cpu_count(),
            available_memory_bytes: Self::detect_available_memory(),
            sampled_at: Utc::now(),
        }
    }
}

/// Probe returning fixed figures; for tests and static deployments.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe {
    cpu_count: usize,
    available_memory_bytes: u64,
}

impl FixedProbe {
    pub fn new(cpu_count: usize, available_memory_bytes: u64) -> Self {
        Self {
            cpu_count,
            available_memory_bytes,
        }
    }
}

impl ResourceProbe for FixedProbe {
    fn snapshot(&self) -> SystemResources {
        SystemResources {
            cpu_count: self.cpu_count,
            available_memory_bytes: self.available_memory_bytes,
            sampled_at: Utc::now(),
        }
    }
}
