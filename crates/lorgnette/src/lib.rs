//! Selective live execution tracing for instrumented programs.
//!
//! A host delivers step-level execution notifications (enter/exit/step
//! with observed bindings); lorgnette decides per step whether to act,
//! tracks call depth, and reports every attribute, local, and global
//! mutation it observes, classified as updated, appended-to, or shrunk.
//!
//! Module split:
//! - `hook`: process-wide step intake with explicit install/uninstall
//! - `dispatch`: admission, depth bookkeeping, snapshot routing
//! - `diff`: the snapshot/diff engine shared by all three domains
//! - `weakmap`: identity-keyed snapshot store with lazy eviction
//! - `rank`: worker gating for multi-process runs
//! - `sink`: the change-event consumer boundary
//!
//! ```no_run
//! use lorgnette::{TraceConfig, Tracer};
//!
//! let config = TraceConfig::builder()
//!     .target_str("app.train:Trainer")
//!     .exclude_str("app.train:Trainer.log_metrics()")
//!     .track_globals(true)
//!     .build()?;
//! let tracer = Tracer::new(config)?;
//! let _session = tracer.start_scoped()?;
//! // ... run the instrumented workload ...
//! # Ok::<(), lorgnette::TraceError>(())
//! ```

pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod hook;
pub mod rank;
pub mod sink;
mod tracer;
pub mod weakmap;

pub use config::{FrameworkBackend, OutputOptions, TraceConfig, TraceConfigBuilder, Verbosity};
pub use dispatch::{Dispatcher, MethodDecision};
pub use error::{ConfigError, TraceError};
pub use rank::{BarrierError, Coordinator, EnvCoordinator, RankGate};
pub use sink::{EventSink, FileSink, LogSink, MemorySink};
pub use tracer::{TraceGuard, Tracer};
pub use weakmap::{RemovalSink, WeakIdMap, WeakKeyError};

pub use lorgnette_index as index;
pub use lorgnette_types as types;
