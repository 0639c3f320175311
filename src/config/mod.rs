//! # Worker Configuration
//!
//! Typed configuration for the worker control plane. Values are produced once
//! at process start (normally from `WORKER_*` environment variables, see
//! [`loader`]) and passed by value into [`WorkerProcess`] construction; there
//! is no ambient configuration registry.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use range_worker::config::WorkerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WorkerConfig::from_env()?;
//! println!("thread-number factor: {}", config.thread_num_factor);
//! # Ok(())
//! # }
//! ```
//!
//! [`WorkerProcess`]: crate::process::WorkerProcess

pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};

pub use loader::{load_from_env, load_with_prefix};

/// Separator for the coordinator address list.
pub const ADDRESS_LIST_SEPARATOR: char = ',';

/// Default flush delay between releasing resources and closing the channel.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 3;

/// Default upper bound on waiting for in-flight slots during drain.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 300;

/// Validated configuration for one worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Coordinator endpoints the channel may connect to.
    pub coordinator_addresses: Vec<String>,

    /// Port used for the coordinator channel.
    pub coordinator_port: u16,

    /// This worker's own address, used for registration.
    pub worker_address: String,

    /// The distributed job this worker serves.
    pub task_id: String,

    /// Rows per unit of work range, consumed by the slot logic.
    pub partition_page_size: u32,

    /// Threads per core share dedicated to this worker; multiplier in the
    /// pool sizing formula.
    pub thread_num_factor: u32,

    /// Memory budget for a single worker process of this kind, in MB.
    /// Divisor in the coresident-worker estimate of the sizing formula.
    pub memory_budget_mb: u64,

    /// Flush delay near the end of the shutdown sequence.
    pub shutdown_grace: Duration,

    /// Upper bound on waiting for in-flight slots during drain.
    pub drain_timeout: Duration,
}

impl WorkerConfig {
    /// Load and validate configuration from `WORKER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config = loader::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// The per-worker memory budget in bytes.
    pub fn memory_budget_bytes(&self) -> u64 {
        self.memory_budget_mb * 1024 * 1024
    }

    /// Validate every required value, naming the broken key on failure.
    pub fn validate(&self) -> Result<()> {
        if self.coordinator_addresses.is_empty() {
            return Err(WorkerError::Configuration(
                "coordinator_addresses must name at least one endpoint".to_string(),
            ));
        }
        if self.coordinator_addresses.iter().any(|a| a.is_empty()) {
            return Err(WorkerError::Configuration(
                "coordinator_addresses contains an empty endpoint".to_string(),
            ));
        }
        if self.coordinator_port == 0 {
            return Err(WorkerError::Configuration(
                "coordinator_port must be non-zero".to_string(),
            ));
        }
        if self.worker_address.is_empty() {
            return Err(WorkerError::Configuration(
                "worker_address must not be empty".to_string(),
            ));
        }
        if self.task_id.is_empty() {
            return Err(WorkerError::Configuration(
                "task_id must not be empty".to_string(),
            ));
        }
        if self.partition_page_size == 0 {
            return Err(WorkerError::Configuration(
                "partition_page_size must be at least 1".to_string(),
            ));
        }
        if self.thread_num_factor == 0 {
            return Err(WorkerError::Configuration(
                "thread_num_factor must be at least 1".to_string(),
            ));
        }
        if self.memory_budget_mb == 0 {
            return Err(WorkerError::Configuration(
                "memory_budget_mb must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Split a comma-separated address list, dropping surrounding whitespace
    /// and empty entries.
    pub fn parse_address_list(raw: &str) -> Vec<String> {
        raw.split(ADDRESS_LIST_SEPARATOR)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }
}
