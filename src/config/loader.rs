//! # Configuration Loader
//!
//! Environment-based configuration loading. The worker reads its settings
//! from `WORKER_*` environment variables (the process-level equivalent of the
//! per-process properties a deployment tool hands each worker), deserializes
//! them into a raw struct, and converts into the validated [`WorkerConfig`].

use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;

use super::{WorkerConfig, DEFAULT_DRAIN_TIMEOUT_SECS, DEFAULT_SHUTDOWN_GRACE_SECS};
use crate::error::{Result, WorkerError};

/// Environment variable prefix for all worker settings.
pub const ENV_PREFIX: &str = "WORKER";

/// Raw shape of the environment configuration before validation.
#[derive(Debug, Deserialize)]
struct RawWorkerConfig {
    coordinator_addresses: String,
    coordinator_port: u16,
    address: String,
    task_id: String,
    partition_page_size: u32,
    thread_num_factor: u32,
    memory_budget_mb: u64,
    shutdown_grace_secs: u64,
    drain_timeout_secs: u64,
}

/// Load configuration from `WORKER_*` environment variables.
///
/// Required: `WORKER_COORDINATOR_ADDRESSES` (comma-separated),
/// `WORKER_COORDINATOR_PORT`, `WORKER_ADDRESS`, `WORKER_TASK_ID`,
/// `WORKER_PARTITION_PAGE_SIZE`, `WORKER_THREAD_NUM_FACTOR`,
/// `WORKER_MEMORY_BUDGET_MB`. Optional: `WORKER_SHUTDOWN_GRACE_SECS`,
/// `WORKER_DRAIN_TIMEOUT_SECS`.
pub fn load_from_env() -> Result<WorkerConfig> {
    load_with_prefix(ENV_PREFIX)
}

/// Load configuration from environment variables under an explicit prefix.
pub fn load_with_prefix(prefix: &str) -> Result<WorkerConfig> {
    let settings = Config::builder()
        .set_default("shutdown_grace_secs", DEFAULT_SHUTDOWN_GRACE_SECS)
        .map_err(|e| WorkerError::Configuration(e.to_string()))?
        .set_default("drain_timeout_secs", DEFAULT_DRAIN_TIMEOUT_SECS)
        .map_err(|e| WorkerError::Configuration(e.to_string()))?
        .add_source(Environment::with_prefix(prefix).try_parsing(true))
        .build()
        .map_err(|e| WorkerError::Configuration(e.to_string()))?;

    let raw: RawWorkerConfig = settings
        .try_deserialize()
        .map_err(|e| WorkerError::Configuration(e.to_string()))?;

    Ok(WorkerConfig {
        coordinator_addresses: WorkerConfig::parse_address_list(&raw.coordinator_addresses),
        coordinator_port: raw.coordinator_port,
        worker_address: raw.address,
        task_id: raw.task_id,
        partition_page_size: raw.partition_page_size,
        thread_num_factor: raw.thread_num_factor,
        memory_budget_mb: raw.memory_budget_mb,
        shutdown_grace: Duration::from_secs(raw.shutdown_grace_secs),
        drain_timeout: Duration::from_secs(raw.drain_timeout_secs),
    })
}
