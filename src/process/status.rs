//! Worker lifecycle status and the atomic cell that owns its transitions.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle status of a worker process.
///
/// Monotonic: NotStarted -> Running -> Shutdown, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Constructed but `start()` has not been called.
    NotStarted,
    /// `start()` won the transition; slots may be executing.
    Running,
    /// `shutdown()` won the transition; no further transitions exist.
    Shutdown,
}

impl WorkerStatus {
    /// Check if no further transitions are allowed from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::Shutdown => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::NotStarted,
            1 => Self::Running,
            _ => Self::Shutdown,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Atomic holder of a [`WorkerStatus`].
///
/// All status changes go through [`transition`](Self::transition), a single
/// compare-and-swap; whichever caller wins a transition owns the work gated
/// behind it. This is what makes shutdown exactly-once when it races between
/// the termination hook and the normal completion path.
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(WorkerStatus::NotStarted.as_u8()))
    }

    pub(crate) fn load(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Attempt `from` -> `to`; true if this caller performed the change.
    pub(crate) fn transition(&self, from: WorkerStatus, to: WorkerStatus) -> bool {
        self.0
            .compare_exchange(
                from.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
