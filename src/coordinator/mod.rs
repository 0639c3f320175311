//! # Coordinator Collaborators
//!
//! Narrow interfaces to everything the worker control plane talks to but does
//! not own: the coordinator channel, presence registration, progress
//! reporting, and persistent resource handles. The lifecycle state machine
//! drives these through trait objects so the wire protocol, reporting
//! transport, and persistence layer stay outside the core.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Connection to the coordinator.
///
/// The channel owns endpoint selection among the configured addresses;
/// the worker only hands it the full list and the port.
#[async_trait]
pub trait CoordinatorChannel: Send + Sync {
    /// Establish the connection used for registration and task traffic.
    async fn connect(&self, addresses: &[String], port: u16) -> Result<()>;

    /// Close the connection. Called last in the shutdown sequence.
    async fn shutdown(&self) -> Result<()>;
}

/// Active-worker presence counter on the coordinator side.
#[async_trait]
pub trait PresenceAnnouncer: Send + Sync {
    async fn increase(&self) -> Result<()>;

    async fn decrease(&self) -> Result<()>;
}

/// Background progress/heartbeat transmission.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Begin reporting. Runs concurrently with slot execution; invoked only
    /// after every slot has been submitted.
    async fn start(&self) -> Result<()>;

    /// Stop reporting and flush whatever is pending.
    async fn shutdown(&self) -> Result<()>;
}

/// Owner of pooled persistent resources (for example database connections)
/// that must be released during worker shutdown.
#[async_trait]
pub trait PersistentResourceManager: Send + Sync {
    async fn destroy(&self) -> Result<()>;
}

/// The collaborator bundle a worker process owns for its lifetime.
#[derive(Clone)]
pub struct CoordinatorServices {
    pub channel: Arc<dyn CoordinatorChannel>,
    pub announcer: Arc<dyn PresenceAnnouncer>,
    pub reporter: Arc<dyn ProgressReporter>,
    pub resources: Arc<dyn PersistentResourceManager>,
}

impl CoordinatorServices {
    pub fn new(
        channel: Arc<dyn CoordinatorChannel>,
        announcer: Arc<dyn PresenceAnnouncer>,
        reporter: Arc<dyn ProgressReporter>,
        resources: Arc<dyn PersistentResourceManager>,
    ) -> Self {
        Self {
            channel,
            announcer,
            reporter,
            resources,
        }
    }
}
