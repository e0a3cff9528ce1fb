//! Worker-rank gating for multi-process runs.
//!
//! Each worker resolves its own rank once, then either fully participates
//! or fully no-ops. The start-up barrier is best-effort: an unavailable
//! primitive means tracing proceeds unsynchronized.

use std::error::Error;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use lorgnette_types::RankInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    Unsupported { backend: &'static str },
    Failed { message: String },
}

impl fmt::Display for BarrierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { backend } => {
                write!(f, "coordination backend `{backend}` has no barrier primitive")
            }
            Self::Failed { message } => write!(f, "start-up barrier failed: {message}"),
        }
    }
}

impl Error for BarrierError {}

/// A multi-process coordination backend: rank resolution plus an optional
/// one-time start-up barrier.
pub trait Coordinator: Send + Sync {
    /// This worker's identity within the coordination group, if known.
    fn rank(&self) -> Option<RankInfo>;

    /// One-time start-up alignment across workers. Best-effort; callers
    /// treat failure as "skip synchronization and proceed".
    fn barrier(&self) -> Result<(), BarrierError>;
}

/// Environment-derived coordination, the convention shared by distributed
/// launchers: the launcher exports each worker's rank and the world size.
#[derive(Debug, Clone)]
pub struct EnvCoordinator {
    rank_var: String,
    world_var: String,
}

impl EnvCoordinator {
    pub const DEFAULT_RANK_VAR: &'static str = "RANK";
    pub const DEFAULT_WORLD_VAR: &'static str = "WORLD_SIZE";

    pub fn new() -> Self {
        Self::with_vars(Self::DEFAULT_RANK_VAR, Self::DEFAULT_WORLD_VAR)
    }

    pub fn with_vars(rank_var: impl Into<String>, world_var: impl Into<String>) -> Self {
        Self {
            rank_var: rank_var.into(),
            world_var: world_var.into(),
        }
    }
}

impl Default for EnvCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator for EnvCoordinator {
    fn rank(&self) -> Option<RankInfo> {
        let rank = std::env::var(&self.rank_var).ok()?.trim().parse().ok()?;
        let world_size = std::env::var(&self.world_var)
            .ok()
            .and_then(|value| value.trim().parse().ok());
        Some(RankInfo { rank, world_size })
    }

    fn barrier(&self) -> Result<(), BarrierError> {
        // The environment convention carries identity only; there is
        // nothing to rendezvous on.
        Err(BarrierError::Unsupported { backend: "env" })
    }
}

// ── The gate ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Resolution {
    admitted: bool,
    rank: Option<RankInfo>,
}

/// Per-dispatcher rank gate. Resolution happens lazily on the first
/// notification and is permanent for the worker's lifetime.
pub struct RankGate {
    coordinator: Option<Arc<dyn Coordinator>>,
    allowed: Vec<u32>,
    resolved: OnceLock<Resolution>,
}

impl RankGate {
    pub fn new(coordinator: Option<Arc<dyn Coordinator>>, allowed: Vec<u32>) -> Self {
        Self {
            coordinator,
            allowed,
            resolved: OnceLock::new(),
        }
    }

    /// An always-open gate with no coordination backend.
    pub fn open() -> Self {
        Self::new(None, Vec::new())
    }

    /// `None`: this worker is permanently gated out. `Some(info)`: the
    /// worker participates; `info` rides on every emitted event.
    pub fn admit(&self) -> Option<Option<RankInfo>> {
        let resolution = self.resolved.get_or_init(|| self.resolve());
        resolution.admitted.then_some(resolution.rank)
    }

    fn resolve(&self) -> Resolution {
        let rank = self.coordinator.as_ref().and_then(|c| c.rank());
        if self.allowed.is_empty() {
            return Resolution {
                admitted: true,
                rank,
            };
        }
        match rank {
            Some(info) => {
                let admitted = self.allowed.contains(&info.rank);
                if !admitted {
                    debug!(
                        rank = info.rank,
                        "worker rank not in allow-list; tracing disabled for this process"
                    );
                }
                Resolution {
                    admitted,
                    rank: Some(info),
                }
            }
            None => {
                warn!("rank allow-list configured but worker rank could not be resolved; tracing anyway");
                Resolution {
                    admitted: true,
                    rank: None,
                }
            }
        }
    }

}
